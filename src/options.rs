// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Analysis options forwarded verbatim to the comparison service

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::{FrameShiftError, Result};

/// Sensitivity threshold for change detection, always within
/// [`Sensitivity::MIN`, `Sensitivity::MAX`] and on a 0.01 grid.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(try_from = "f64", into = "f64")]
pub struct Sensitivity(f64);

impl Sensitivity {
    pub const MIN: f64 = 0.05;
    pub const MAX: f64 = 0.30;
    pub const STEP: f64 = 0.01;
    pub const DEFAULT: f64 = 0.15;

    /// Clamp into range and snap to the step grid. NaN and infinities are
    /// rejected rather than clamped.
    pub fn new(value: f64) -> Result<Self> {
        if !value.is_finite() {
            return Err(FrameShiftError::InvalidOption {
                key: OptionKey::Sensitivity.to_string(),
                reason: format!("{} is not a finite number", value),
            });
        }
        let clamped = value.clamp(Self::MIN, Self::MAX);
        let steps = (1.0 / Self::STEP).round();
        let snapped = (clamped * steps).round() / steps;
        Ok(Self(snapped.clamp(Self::MIN, Self::MAX)))
    }

    pub fn value(self) -> f64 {
        self.0
    }
}

impl Default for Sensitivity {
    fn default() -> Self {
        Self(Self::DEFAULT)
    }
}

impl TryFrom<f64> for Sensitivity {
    type Error = FrameShiftError;

    fn try_from(value: f64) -> Result<Self> {
        Self::new(value)
    }
}

impl From<Sensitivity> for f64 {
    fn from(s: Sensitivity) -> f64 {
        s.0
    }
}

impl fmt::Display for Sensitivity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2}", self.0)
    }
}

/// The configuration object sent as the `config` multipart field
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AnalysisConfig {
    #[serde(default)]
    pub use_roi: bool,
    #[serde(default = "default_true")]
    pub remove_background: bool,
    #[serde(default = "default_true")]
    pub use_edge_detection: bool,
    #[serde(default = "default_true")]
    pub filter_text_regions: bool,
    #[serde(default)]
    pub sensitivity: Sensitivity,
}

fn default_true() -> bool { true }

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            use_roi: false,
            remove_background: true,
            use_edge_detection: true,
            filter_text_regions: true,
            sensitivity: Sensitivity::default(),
        }
    }
}

/// Names of the individual options
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OptionKey {
    UseRoi,
    RemoveBackground,
    UseEdgeDetection,
    FilterTextRegions,
    Sensitivity,
}

impl OptionKey {
    pub const ALL: [OptionKey; 5] = [
        OptionKey::UseRoi,
        OptionKey::RemoveBackground,
        OptionKey::UseEdgeDetection,
        OptionKey::FilterTextRegions,
        OptionKey::Sensitivity,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            OptionKey::UseRoi => "use_roi",
            OptionKey::RemoveBackground => "remove_background",
            OptionKey::UseEdgeDetection => "use_edge_detection",
            OptionKey::FilterTextRegions => "filter_text_regions",
            OptionKey::Sensitivity => "sensitivity",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            OptionKey::UseRoi => "ROI Selection",
            OptionKey::RemoveBackground => "Background Removal",
            OptionKey::UseEdgeDetection => "Edge Detection",
            OptionKey::FilterTextRegions => "Filter Text Regions",
            OptionKey::Sensitivity => "Sensitivity",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            OptionKey::UseRoi => "Select specific region for analysis",
            OptionKey::RemoveBackground => "Remove background before comparison",
            OptionKey::UseEdgeDetection => "Detect texture changes (tire wear, etc.)",
            OptionKey::FilterTextRegions => "Ignore text labels and overlays",
            OptionKey::Sensitivity => "Lower is more sensitive, higher is less sensitive",
        }
    }

    pub fn is_toggle(self) -> bool {
        !matches!(self, OptionKey::Sensitivity)
    }
}

impl fmt::Display for OptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OptionKey {
    type Err = FrameShiftError;

    fn from_str(s: &str) -> Result<Self> {
        let normalized = s.trim().replace('-', "_").to_ascii_lowercase();
        OptionKey::ALL
            .into_iter()
            .find(|k| k.as_str() == normalized)
            .ok_or_else(|| FrameShiftError::UnknownOption(s.to_string()))
    }
}

/// A value for one option
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OptionValue {
    Bool(bool),
    Float(f64),
}

impl OptionValue {
    /// Parse `raw` as the type `key` expects.
    pub fn parse_for(key: OptionKey, raw: &str) -> Result<Self> {
        let raw = raw.trim();
        let invalid = |reason: String| FrameShiftError::InvalidOption {
            key: key.to_string(),
            reason,
        };

        if key.is_toggle() {
            match raw.to_ascii_lowercase().as_str() {
                "true" | "on" | "yes" | "1" => Ok(OptionValue::Bool(true)),
                "false" | "off" | "no" | "0" => Ok(OptionValue::Bool(false)),
                other => Err(invalid(format!("expected a boolean, got '{}'", other))),
            }
        } else {
            raw.parse::<f64>()
                .map(OptionValue::Float)
                .map_err(|e| invalid(format!("expected a number, got '{}': {}", raw, e)))
        }
    }
}

impl AnalysisConfig {
    /// Merge one option into a copy of this configuration.
    pub fn set_option(&self, key: OptionKey, value: OptionValue) -> Result<Self> {
        let mut next = *self;
        match (key, value) {
            (OptionKey::UseRoi, OptionValue::Bool(v)) => next.use_roi = v,
            (OptionKey::RemoveBackground, OptionValue::Bool(v)) => next.remove_background = v,
            (OptionKey::UseEdgeDetection, OptionValue::Bool(v)) => next.use_edge_detection = v,
            (OptionKey::FilterTextRegions, OptionValue::Bool(v)) => next.filter_text_regions = v,
            (OptionKey::Sensitivity, OptionValue::Float(v)) => next.sensitivity = Sensitivity::new(v)?,
            (key, value) => {
                return Err(FrameShiftError::InvalidOption {
                    key: key.to_string(),
                    reason: format!("value {:?} has the wrong type", value),
                })
            }
        }
        Ok(next)
    }

    /// Apply a `key=value` assignment, as given to `--set`.
    pub fn apply_assignment(&self, assignment: &str) -> Result<Self> {
        let (key, raw) = assignment.split_once('=').ok_or_else(|| {
            FrameShiftError::InvalidOption {
                key: assignment.to_string(),
                reason: "expected key=value".to_string(),
            }
        })?;
        let key: OptionKey = key.parse()?;
        let value = OptionValue::parse_for(key, raw)?;
        self.set_option(key, value)
    }

    pub fn get(&self, key: OptionKey) -> OptionValue {
        match key {
            OptionKey::UseRoi => OptionValue::Bool(self.use_roi),
            OptionKey::RemoveBackground => OptionValue::Bool(self.remove_background),
            OptionKey::UseEdgeDetection => OptionValue::Bool(self.use_edge_detection),
            OptionKey::FilterTextRegions => OptionValue::Bool(self.filter_text_regions),
            OptionKey::Sensitivity => OptionValue::Float(self.sensitivity.value()),
        }
    }

    /// JSON text for the `config` field of the analysis request
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Recommended option sets for common footage
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Preset {
    /// Edge detection + background removal
    TireWear,
    /// ROI selection + background removal
    DifferentPov,
    /// Filter text regions
    Broadcast,
}

impl Preset {
    pub fn title(self) -> &'static str {
        match self {
            Preset::TireWear => "For F1 Tire Wear",
            Preset::DifferentPov => "For Different POV",
            Preset::Broadcast => "For Broadcast Footage",
        }
    }

    pub fn enables(self) -> &'static [OptionKey] {
        match self {
            Preset::TireWear => &[OptionKey::UseEdgeDetection, OptionKey::RemoveBackground],
            Preset::DifferentPov => &[OptionKey::UseRoi, OptionKey::RemoveBackground],
            Preset::Broadcast => &[OptionKey::FilterTextRegions],
        }
    }

    /// Switch on this preset's toggles, leaving the rest untouched.
    pub fn apply(self, config: &AnalysisConfig) -> AnalysisConfig {
        self.enables().iter().fold(*config, |acc, key| {
            acc.set_option(*key, OptionValue::Bool(true)).unwrap_or(acc)
        })
    }
}
