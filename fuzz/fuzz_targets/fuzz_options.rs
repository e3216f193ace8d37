// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

#![no_main]

use arbitrary::Arbitrary;
use frameshift::options::{AnalysisConfig, Sensitivity};
use libfuzzer_sys::fuzz_target;

#[derive(Arbitrary, Debug)]
struct Input<'a> {
    assignments: Vec<&'a str>,
    sensitivity: f64,
}

fuzz_target!(|input: Input<'_>| {
    let mut config = AnalysisConfig::default();
    for assignment in input.assignments {
        if let Ok(next) = config.apply_assignment(assignment) {
            config = next;
        }
    }
    if let Ok(s) = Sensitivity::new(input.sensitivity) {
        assert!((Sensitivity::MIN..=Sensitivity::MAX).contains(&s.value()));
    }
    let s = config.sensitivity.value();
    assert!((Sensitivity::MIN..=Sensitivity::MAX).contains(&s));
});
