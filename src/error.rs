// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Error types for FrameShift

use thiserror::Error;

/// Result type alias for FrameShift operations
pub type Result<T> = std::result::Result<T, FrameShiftError>;

/// Message shown for every failure after the request has been issued.
pub const GENERIC_FAILURE: &str = "Failed to analyze images. Please try again.";

/// FrameShift error types
#[derive(Error, Debug)]
pub enum FrameShiftError {
    #[error("{0}")]
    Validation(String),

    #[error("An analysis is already in progress")]
    Busy,

    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Analysis service returned status {0}")]
    Service(reqwest::StatusCode),

    #[error("Analysis service reported failure: {0}")]
    ServiceReported(String),

    #[error("Malformed response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Image error: {0}")]
    ImageDecode(#[from] image::ImageError),

    #[error("Background task failed: {0}")]
    Task(String),

    #[error("Unknown option: {0}")]
    UnknownOption(String),

    #[error("Invalid value for {key}: {reason}")]
    InvalidOption { key: String, reason: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("File system error: {0}")]
    FileSystem(#[from] std::io::Error),

    #[error("Artifact error: {0}")]
    Artifact(#[from] base64::DecodeError),
}

impl FrameShiftError {
    /// Whether the error came back from the analysis round trip
    /// (network, HTTP status or response body).
    pub fn is_request_failure(&self) -> bool {
        matches!(
            self,
            Self::Transport(_) | Self::Service(_) | Self::ServiceReported(_) | Self::Decode(_)
        )
    }

    /// Text suitable for the user-facing surface. Request failures are
    /// deliberately undifferentiated; the detail only goes to the log.
    pub fn user_message(&self) -> String {
        if self.is_request_failure() {
            GENERIC_FAILURE.to_string()
        } else {
            self.to_string()
        }
    }
}
