// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! FrameShift: Visual Comparison Client
//!
//! Uploads a "before" and an "after" image to the FrameShift analysis
//! service and renders the comparison it returns. Ships a CLI and a small
//! web front end over the same session state machine.

pub mod client;
pub mod config;
pub mod error;
pub mod options;
pub mod render;
pub mod result;
pub mod session;
pub mod upload;
pub mod web;

pub use config::AppConfig;
pub use error::{FrameShiftError, Result};
