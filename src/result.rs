// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Response shape returned by the comparison service

use base64::{engine::general_purpose, Engine as _};
use serde::{Deserialize, Serialize};

use crate::Result;

/// Result of one comparison. Every field is optional on the wire; absent
/// fields are simply not displayed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub success: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub changes_count: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ssim_score: Option<f64>,
    /// Base64 PNG, colour-mapped difference map
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub difference_map: Option<String>,
    /// Base64 PNG, the "after" image with detected changes boxed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub annotated_image: Option<String>,
    /// Detected changes, most significant first
    #[serde(default)]
    pub changes: Vec<ChangeRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl AnalysisResult {
    /// Parse a response body.
    pub fn from_json(body: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(body)?)
    }

    /// True when the service explicitly flagged the analysis as failed.
    pub fn reported_failure(&self) -> bool {
        self.success == Some(false)
    }

    pub fn difference_map(&self) -> Option<ImageArtifact<'_>> {
        ImageArtifact::new("Difference Map", "difference_map", self.difference_map.as_deref())
    }

    pub fn annotated_image(&self) -> Option<ImageArtifact<'_>> {
        ImageArtifact::new("Detected Changes", "annotated_image", self.annotated_image.as_deref())
    }

    pub fn artifacts(&self) -> Vec<ImageArtifact<'_>> {
        self.difference_map()
            .into_iter()
            .chain(self.annotated_image())
            .collect()
    }
}

/// One detected change
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChangeRecord {
    /// `[x, y]` or `[x, y, width, height]`
    #[serde(default)]
    pub bbox: Vec<f64>,
    #[serde(default)]
    pub area: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aspect_ratio: Option<f64>,
}

impl ChangeRecord {
    /// Top-left corner, if the bbox carries one
    pub fn origin(&self) -> Option<(f64, f64)> {
        match self.bbox.as_slice() {
            [x, y, ..] => Some((*x, *y)),
            _ => None,
        }
    }

    pub fn size(&self) -> Option<(f64, f64)> {
        match self.bbox.as_slice() {
            [_, _, w, h, ..] => Some((*w, *h)),
            _ => None,
        }
    }
}

/// A base64 image payload returned for display
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ImageArtifact<'a> {
    pub title: &'static str,
    /// Field name, also used as the file stem when saving
    pub name: &'static str,
    pub base64: &'a str,
}

impl<'a> ImageArtifact<'a> {
    /// `None` for absent or blank payloads
    fn new(title: &'static str, name: &'static str, payload: Option<&'a str>) -> Option<Self> {
        payload
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(|base64| Self { title, name, base64 })
    }

    pub fn data_uri(&self) -> String {
        format!("data:image/png;base64,{}", self.base64)
    }

    pub fn decode(&self) -> Result<Vec<u8>> {
        Ok(general_purpose::STANDARD.decode(self.base64)?)
    }

    pub fn file_name(&self) -> String {
        format!("{}.png", self.name)
    }
}
