// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

#![no_main]

use frameshift::render::{ResultView, TOP_CHANGES};
use frameshift::result::AnalysisResult;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(result) = AnalysisResult::from_json(data) {
        let view = ResultView::new(&result);
        assert!(view.top_changes.len() <= TOP_CHANGES);
        let _ = view.to_string();
        for artifact in result.artifacts() {
            let _ = artifact.decode();
        }
    }
});
