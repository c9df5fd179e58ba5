//! Setting assertions carried by layer content.
//!
//! Free-text content asserts a setting with a marker line:
//!
//! ```text
//! <!-- setting: quote-style = single -->
//! ```
//!
//! Instruction rules may also carry a typed `setting`; both forms are collected.

use crate::primitives::{Directive, SettingAssertion};

const MARKER_OPEN: &str = "<!--";
const MARKER_CLOSE: &str = "-->";
const MARKER_KEY: &str = "setting:";

/// Parse one line as a setting marker.
fn parse_marker(line: &str) -> Option<SettingAssertion> {
    let inner = line
        .trim()
        .strip_prefix(MARKER_OPEN)?
        .strip_suffix(MARKER_CLOSE)?
        .trim();
    let rest = inner.strip_prefix(MARKER_KEY)?;
    let (name, value) = rest.split_once('=')?;
    let (name, value) = (name.trim(), value.trim());
    if name.is_empty() || value.is_empty() {
        return None;
    }
    Some(SettingAssertion::new(name, value))
}

/// Setting assertions found in free-text content, in order of appearance.
pub fn extract_settings(content: &str) -> Vec<SettingAssertion> {
    content.lines().filter_map(parse_marker).collect()
}

/// Setting assertions declared by instruction rules (typed field first, then markers in text).
pub fn rule_settings(rules: &[Directive]) -> Vec<SettingAssertion> {
    let mut out = Vec::new();
    for rule in rules {
        if let Some(s) = &rule.setting {
            out.push(s.clone());
        }
        out.extend(extract_settings(&rule.text));
    }
    out
}
