// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Projection of an analysis result into something displayable

use serde::Serialize;
use std::fmt;

use crate::result::{AnalysisResult, ChangeRecord, ImageArtifact};

/// How many changes are listed
pub const TOP_CHANGES: usize = 5;

/// Display model for one result. Building it never fails; fields the
/// service left out are simply absent.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResultView<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub changes_count: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ssim_score: Option<f64>,
    #[serde(skip)]
    pub artifacts: Vec<ImageArtifact<'a>>,
    pub top_changes: Vec<ChangeRow>,
    /// Length of the full change list, of which `top_changes` is a prefix
    pub total_changes: usize,
}

/// One numbered line of the change list, rounded for display
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ChangeRow {
    pub rank: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<(i64, i64)>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<(i64, i64)>,
    pub area: i64,
}

impl ChangeRow {
    fn new(rank: usize, change: &ChangeRecord) -> Self {
        let round = |v: f64| v.round() as i64;
        Self {
            rank,
            location: change.origin().map(|(x, y)| (round(x), round(y))),
            size: change.size().map(|(w, h)| (round(w), round(h))),
            area: round(change.area),
        }
    }

    /// `(10, 20) • 150 px²`
    pub fn summary(&self) -> String {
        let location = match self.location {
            Some((x, y)) => format!("({}, {})", x, y),
            None => "(?, ?)".to_string(),
        };
        format!("{} • {} px²", location, self.area)
    }
}

impl<'a> ResultView<'a> {
    pub fn new(result: &'a AnalysisResult) -> Self {
        Self {
            changes_count: result.changes_count,
            ssim_score: result.ssim_score,
            artifacts: result.artifacts(),
            // Service order is significance order; never re-sorted here.
            top_changes: result
                .changes
                .iter()
                .take(TOP_CHANGES)
                .enumerate()
                .map(|(i, c)| ChangeRow::new(i + 1, c))
                .collect(),
            total_changes: result.changes.len(),
        }
    }

    pub fn has_summary(&self) -> bool {
        self.changes_count.is_some() || self.ssim_score.is_some()
    }

    pub fn ssim_display(&self) -> Option<String> {
        self.ssim_score.map(|s| format!("{:.3}", s))
    }
}

impl fmt::Display for ResultView<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Analysis Results")?;

        if let Some(count) = self.changes_count {
            writeln!(f, "  Changes Detected: {}", count)?;
        }
        if let Some(ssim) = self.ssim_display() {
            writeln!(f, "  SSIM Score: {}", ssim)?;
        }

        for artifact in &self.artifacts {
            writeln!(f, "  {}: available", artifact.title)?;
        }

        if !self.top_changes.is_empty() {
            writeln!(f, "\nTop Changes:")?;
            for row in &self.top_changes {
                writeln!(f, "  #{} {}", row.rank, row.summary())?;
            }
            if self.total_changes > self.top_changes.len() {
                writeln!(f, "  ... and {} more", self.total_changes - self.top_changes.len())?;
            }
        }

        Ok(())
    }
}
