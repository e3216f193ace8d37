// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Upload/analyze session state machine
//!
//! All state (both upload slots, the option set, the loading flag, the last
//! result or error) lives in [`Session`] and changes only through
//! [`Session::apply`]. Submitting hands out a [`Ticket`] tagged with a
//! monotonically increasing request id; completions carrying any other id
//! are discarded, so a late response can never overwrite a newer one.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::client::AnalysisService;
use crate::options::{AnalysisConfig, OptionKey, OptionValue};
use crate::result::AnalysisResult;
use crate::upload::{Slot, SlotState, UploadedImage};
use crate::{FrameShiftError, Result};

/// Validation message when a slot is not ready at submit time
pub const MISSING_IMAGES: &str = "Please upload both images";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Status {
    #[default]
    Idle,
    Submitting { request_id: u64 },
}

/// A successful analysis as stored in the session
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompletedAnalysis {
    pub request_id: u64,
    pub received_at: DateTime<Utc>,
    pub result: AnalysisResult,
}

/// Everything needed to perform one submission, detached from the session
#[derive(Debug, Clone)]
pub struct Ticket {
    pub request_id: u64,
    pub image1: UploadedImage,
    pub image2: UploadedImage,
    pub config: AnalysisConfig,
}

impl Ticket {
    /// Issue the single network call for this ticket.
    pub async fn execute(&self, service: &dyn AnalysisService) -> Result<AnalysisResult> {
        service.analyze(&self.image1, &self.image2, &self.config).await
    }
}

/// Inputs to the session
#[derive(Debug)]
pub enum Event {
    ImageSelected(Slot, UploadedImage),
    ImageFailed { slot: Slot, file_name: String, reason: String },
    SetOption(OptionKey, OptionValue),
    ReplaceConfig(AnalysisConfig),
    Submit,
    Completed { request_id: u64, outcome: Result<AnalysisResult> },
    /// Clear both slots and any outcome; an in-flight request is abandoned.
    Reset,
}

/// What a single event did
#[derive(Debug)]
pub enum Transition {
    Updated,
    /// The event was refused; session state describes why where relevant.
    Rejected(FrameShiftError),
    /// Caller must execute the ticket and feed back `Event::Completed`.
    Dispatch(Ticket),
    Succeeded,
    Failed(FrameShiftError),
    /// Completion for a request that is no longer current
    Stale,
}

#[derive(Debug, Clone, Default)]
pub struct Session {
    before: SlotState,
    after: SlotState,
    config: AnalysisConfig,
    status: Status,
    result: Option<CompletedAnalysis>,
    error: Option<String>,
    last_issued: u64,
}

impl Session {
    pub fn new(config: AnalysisConfig) -> Self {
        Self {
            config,
            ..Default::default()
        }
    }

    pub fn slot(&self, slot: Slot) -> &SlotState {
        match slot {
            Slot::Before => &self.before,
            Slot::After => &self.after,
        }
    }

    fn slot_mut(&mut self, slot: Slot) -> &mut SlotState {
        match slot {
            Slot::Before => &mut self.before,
            Slot::After => &mut self.after,
        }
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    pub fn status(&self) -> Status {
        self.status
    }

    pub fn is_loading(&self) -> bool {
        matches!(self.status, Status::Submitting { .. })
    }

    /// Both slots decoded and nothing in flight
    pub fn can_submit(&self) -> bool {
        self.before.is_ready() && self.after.is_ready() && !self.is_loading()
    }

    pub fn result(&self) -> Option<&CompletedAnalysis> {
        self.result.as_ref()
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// The single transition function.
    pub fn apply(&mut self, event: Event) -> Transition {
        match event {
            Event::ImageSelected(slot, image) => {
                *self.slot_mut(slot) = SlotState::Ready(image);
                Transition::Updated
            }
            Event::ImageFailed { slot, file_name, reason } => {
                *self.slot_mut(slot) = SlotState::DecodeFailed { file_name, reason };
                Transition::Updated
            }
            Event::SetOption(key, value) => match self.config.set_option(key, value) {
                Ok(next) => {
                    self.config = next;
                    Transition::Updated
                }
                Err(e) => Transition::Rejected(e),
            },
            Event::ReplaceConfig(config) => {
                self.config = config;
                Transition::Updated
            }
            Event::Submit => self.submit(),
            Event::Completed { request_id, outcome } => self.complete(request_id, outcome),
            Event::Reset => {
                if let Status::Submitting { request_id } = self.status {
                    info!("Abandoning in-flight request #{}", request_id);
                }
                self.before = SlotState::Empty;
                self.after = SlotState::Empty;
                self.status = Status::Idle;
                self.result = None;
                self.error = None;
                Transition::Updated
            }
        }
    }

    fn submit(&mut self) -> Transition {
        if self.is_loading() {
            return Transition::Rejected(FrameShiftError::Busy);
        }

        // A new attempt discards whatever the previous one left behind.
        self.result = None;
        self.error = None;

        let (image1, image2) = match (self.before.image(), self.after.image()) {
            (Some(a), Some(b)) => (a.clone(), b.clone()),
            _ => {
                self.error = Some(MISSING_IMAGES.to_string());
                debug!(
                    "Submit refused: before ready={}, after ready={}",
                    self.before.is_ready(),
                    self.after.is_ready()
                );
                return Transition::Rejected(FrameShiftError::Validation(MISSING_IMAGES.to_string()));
            }
        };

        self.last_issued += 1;
        let request_id = self.last_issued;
        self.status = Status::Submitting { request_id };
        info!("Submitting analysis request #{}", request_id);

        Transition::Dispatch(Ticket {
            request_id,
            image1,
            image2,
            config: self.config,
        })
    }

    fn complete(&mut self, request_id: u64, outcome: Result<AnalysisResult>) -> Transition {
        if self.status != (Status::Submitting { request_id }) {
            warn!("Discarding stale response for request #{} (current: {:?})", request_id, self.status);
            return Transition::Stale;
        }

        self.status = Status::Idle;
        match outcome {
            Ok(result) => {
                info!(
                    "Request #{} complete: {} changes, ssim {:?}",
                    request_id,
                    result.changes_count.unwrap_or(result.changes.len() as u64),
                    result.ssim_score
                );
                self.result = Some(CompletedAnalysis {
                    request_id,
                    received_at: Utc::now(),
                    result,
                });
                self.error = None;
                Transition::Succeeded
            }
            Err(e) => {
                error!("Request #{} failed: {}", request_id, e);
                self.error = Some(e.user_message());
                Transition::Failed(e)
            }
        }
    }

    /// Submit, execute and complete in one go.
    pub async fn analyze(&mut self, service: &dyn AnalysisService) -> Transition {
        match self.apply(Event::Submit) {
            Transition::Dispatch(ticket) => {
                let outcome = ticket.execute(service).await;
                self.apply(Event::Completed {
                    request_id: ticket.request_id,
                    outcome,
                })
            }
            other => other,
        }
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            slots: Slot::BOTH.iter().map(|s| SlotSnapshot::of(*s, self.slot(*s))).collect(),
            config: self.config,
            loading: self.is_loading(),
            can_submit: self.can_submit(),
            error: self.error.clone(),
            result: self.result.clone(),
        }
    }
}

/// Serializable view of the session for the JSON API
#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    pub slots: Vec<SlotSnapshot>,
    pub config: AnalysisConfig,
    pub loading: bool,
    pub can_submit: bool,
    pub error: Option<String>,
    pub result: Option<CompletedAnalysis>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SlotSnapshot {
    pub slot: Slot,
    pub state: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dimensions: Option<(u32, u32)>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl SlotSnapshot {
    fn of(slot: Slot, state: &SlotState) -> Self {
        let blank = Self {
            slot,
            state: "empty",
            file_name: None,
            dimensions: None,
            reason: None,
        };
        match state {
            SlotState::Empty => blank,
            SlotState::Ready(img) => Self {
                state: "ready",
                file_name: Some(img.file_name.clone()),
                dimensions: Some((img.width, img.height)),
                ..blank
            },
            SlotState::DecodeFailed { file_name, reason } => Self {
                state: "decode_failed",
                file_name: Some(file_name.clone()),
                reason: Some(reason.clone()),
                ..blank
            },
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::client::tests::sample_images;
    use crate::error::GENERIC_FAILURE;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Service double that counts calls and replays canned outcomes
    pub(crate) struct ScriptedService {
        pub calls: AtomicUsize,
        pub outcomes: Mutex<Vec<Result<AnalysisResult>>>,
    }

    impl ScriptedService {
        pub(crate) fn new(outcomes: Vec<Result<AnalysisResult>>) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                outcomes: Mutex::new(outcomes),
            }
        }

        pub(crate) fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl AnalysisService for ScriptedService {
        async fn analyze(
            &self,
            _image1: &UploadedImage,
            _image2: &UploadedImage,
            _config: &AnalysisConfig,
        ) -> Result<AnalysisResult> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut outcomes = self.outcomes.lock().unwrap();
            if outcomes.is_empty() {
                Ok(AnalysisResult::default())
            } else {
                outcomes.remove(0)
            }
        }
    }

    fn loaded_session() -> Session {
        let (before, after) = sample_images();
        let mut session = Session::default();
        session.apply(Event::ImageSelected(Slot::Before, before));
        session.apply(Event::ImageSelected(Slot::After, after));
        session
    }

    fn server_error() -> FrameShiftError {
        FrameShiftError::Service(reqwest::StatusCode::INTERNAL_SERVER_ERROR)
    }

    #[test]
    fn test_initial_state() {
        let session = Session::default();
        assert_eq!(session.status(), Status::Idle);
        assert!(session.result().is_none());
        assert!(session.error().is_none());
        assert!(!session.can_submit());
    }

    #[tokio::test]
    async fn test_only_first_image_never_calls_service() {
        let (before, _) = sample_images();
        let mut session = Session::default();
        session.apply(Event::ImageSelected(Slot::Before, before));

        let service = ScriptedService::new(vec![]);
        let transition = session.analyze(&service).await;

        assert!(matches!(transition, Transition::Rejected(FrameShiftError::Validation(_))));
        assert_eq!(service.calls(), 0);
        assert_eq!(session.error(), Some(MISSING_IMAGES));
        assert!(!session.is_loading());
    }

    #[tokio::test]
    async fn test_decode_failed_slot_blocks_submit() {
        let (before, _) = sample_images();
        let mut session = Session::default();
        session.apply(Event::ImageSelected(Slot::Before, before));
        session.apply(Event::ImageFailed {
            slot: Slot::After,
            file_name: "after.txt".into(),
            reason: "not an image".into(),
        });

        let service = ScriptedService::new(vec![]);
        session.analyze(&service).await;
        assert_eq!(service.calls(), 0);
        assert_eq!(session.error(), Some(MISSING_IMAGES));
    }

    #[tokio::test]
    async fn test_success_stores_result_and_clears_loading() {
        let mut session = loaded_session();
        let result = AnalysisResult {
            changes_count: Some(3),
            ..Default::default()
        };
        let service = ScriptedService::new(vec![Ok(result.clone())]);

        assert!(matches!(session.analyze(&service).await, Transition::Succeeded));
        assert_eq!(service.calls(), 1);
        assert!(!session.is_loading());
        assert!(session.error().is_none());
        assert_eq!(session.result().unwrap().result, result);
    }

    #[tokio::test]
    async fn test_server_error_leaves_result_absent() {
        let mut session = loaded_session();
        let service = ScriptedService::new(vec![Err(server_error())]);

        assert!(matches!(session.analyze(&service).await, Transition::Failed(_)));
        assert_eq!(session.error(), Some(GENERIC_FAILURE));
        assert!(session.result().is_none());
        assert!(!session.is_loading());
    }

    #[tokio::test]
    async fn test_new_attempt_discards_previous_outcome() {
        let mut session = loaded_session();
        let service = ScriptedService::new(vec![
            Err(server_error()),
            Ok(AnalysisResult::default()),
            Err(server_error()),
        ]);

        session.analyze(&service).await;
        assert!(session.error().is_some());

        session.analyze(&service).await;
        assert!(session.error().is_none());
        assert!(session.result().is_some());

        session.analyze(&service).await;
        assert!(session.result().is_none());
        assert!(session.error().is_some());
    }

    #[test]
    fn test_resubmit_while_loading_is_rejected() {
        let mut session = loaded_session();
        let first = match session.apply(Event::Submit) {
            Transition::Dispatch(ticket) => ticket,
            other => panic!("Expected dispatch, got {:?}", other),
        };
        assert!(session.is_loading());
        assert!(!session.can_submit());
        assert!(matches!(session.apply(Event::Submit), Transition::Rejected(FrameShiftError::Busy)));

        session.apply(Event::Completed {
            request_id: first.request_id,
            outcome: Ok(AnalysisResult::default()),
        });
        assert!(!session.is_loading());
    }

    #[test]
    fn test_stale_completion_is_discarded() {
        let mut session = loaded_session();
        let first = match session.apply(Event::Submit) {
            Transition::Dispatch(ticket) => ticket,
            other => panic!("Expected dispatch, got {:?}", other),
        };
        session.apply(Event::Reset);
        let (before, after) = sample_images();
        session.apply(Event::ImageSelected(Slot::Before, before));
        session.apply(Event::ImageSelected(Slot::After, after));

        let second = match session.apply(Event::Submit) {
            Transition::Dispatch(ticket) => ticket,
            other => panic!("Expected dispatch, got {:?}", other),
        };
        assert!(second.request_id > first.request_id);

        let fresh = AnalysisResult { changes_count: Some(1), ..Default::default() };
        assert!(matches!(
            session.apply(Event::Completed { request_id: second.request_id, outcome: Ok(fresh.clone()) }),
            Transition::Succeeded
        ));

        let late = AnalysisResult { changes_count: Some(99), ..Default::default() };
        assert!(matches!(
            session.apply(Event::Completed { request_id: first.request_id, outcome: Ok(late) }),
            Transition::Stale
        ));
        assert_eq!(session.result().unwrap().result, fresh);
    }

    #[test]
    fn test_ticket_snapshots_live_config() {
        let mut session = loaded_session();
        session.apply(Event::SetOption(OptionKey::Sensitivity, OptionValue::Float(0.9)));
        session.apply(Event::SetOption(OptionKey::UseRoi, OptionValue::Bool(true)));

        match session.apply(Event::Submit) {
            Transition::Dispatch(ticket) => {
                assert!(ticket.config.use_roi);
                assert_eq!(ticket.config.sensitivity.value(), 0.3);
            }
            other => panic!("Expected dispatch, got {:?}", other),
        }
    }

    #[test]
    fn test_bad_option_is_rejected_without_change() {
        let mut session = Session::default();
        let before = *session.config();
        assert!(matches!(
            session.apply(Event::SetOption(OptionKey::Sensitivity, OptionValue::Bool(true))),
            Transition::Rejected(_)
        ));
        assert_eq!(*session.config(), before);
    }

    #[test]
    fn test_snapshot_reports_slots() {
        let (before, _) = sample_images();
        let mut session = Session::default();
        session.apply(Event::ImageSelected(Slot::Before, before));

        let snapshot = session.snapshot();
        assert_eq!(snapshot.slots[0].state, "ready");
        assert_eq!(snapshot.slots[1].state, "empty");
        assert!(!snapshot.can_submit);

        let json = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(json["slots"][0]["slot"], "before");
        assert_eq!(json["config"]["sensitivity"], 0.15);
    }
}
