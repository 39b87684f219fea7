// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Extraction of date-style OpenSCAD versions from free-form `--version` output

use regex::Regex;
use std::sync::OnceLock;

fn date_version_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"\b(20\d{2}(?:\.\d{2}){1,2})\b").expect("version pattern is valid")
    })
}

/// Find the first `YYYY.MM` or `YYYY.MM.DD` token (year 2000-2099).
///
/// Returns `None` when nothing matches. Never panics, whatever the input.
pub fn normalize(raw: &str) -> Option<String> {
    date_version_pattern()
        .captures(raw)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}
