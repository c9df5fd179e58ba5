//! Context bundle: the per-request, ordered composition of applicable primitive content.

use serde::Serialize;
use std::collections::BTreeSet;

use crate::primitives::PrimitiveKind;

/// Layer priorities. Higher wins when two layers disagree.
pub mod priority {
    pub const BASE: u8 = 0;
    pub const TOPIC: u8 = 1;
    pub const TASK: u8 = 2;
    pub const PERSONA: u8 = 3;
}

/// One primitive's contribution to a bundle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Layer {
    pub source: PrimitiveKind,
    pub identifier: String,
    pub priority: u8,
    pub content: String,
}

impl Layer {
    pub fn reference(&self) -> LayerRef {
        LayerRef {
            source: self.source,
            identifier: self.identifier.clone(),
            priority: self.priority,
        }
    }
}

/// Points at a layer without its content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LayerRef {
    pub source: PrimitiveKind,
    pub identifier: String,
    pub priority: u8,
}

/// A layer's assertion of a value for a contested setting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SettingValue {
    pub layer: LayerRef,
    pub value: String,
}

/// Non-fatal issue attached to a bundle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Warning {
    /// Layers assert different values for the same setting; `authoritative` wins.
    #[serde(rename_all = "camelCase")]
    Conflict {
        setting: String,
        assertions: Vec<SettingValue>,
        authoritative: LayerRef,
        description: String,
    },
    /// Persona declares tools the capability index does not offer.
    #[serde(rename_all = "camelCase")]
    ScopeViolation {
        persona: String,
        /// Known tool names (built-in vocabulary or connector-qualified) that are not offered now.
        unavailable: Vec<String>,
        /// Names that match nothing known at all; likely typos.
        unrecognized: Vec<String>,
    },
    /// Persona declared tools but none of them is offered.
    #[serde(rename_all = "camelCase")]
    NoToolsAvailable { persona: String },
}

/// Whether the effective tool set was narrowed by a persona.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolScope {
    Unrestricted,
    Restricted,
}

/// Output of one resolution. Layers are sorted by priority, general to specific.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextBundle {
    pub layers: Vec<Layer>,
    pub conflicts: Vec<Warning>,
    pub effective_tools: BTreeSet<String>,
    pub tool_scope: ToolScope,
}

impl ContextBundle {
    /// Layer whose value wins for `setting`, when that setting is contested.
    pub fn authoritative_for(&self, setting: &str) -> Option<&LayerRef> {
        let setting = crate::primitives::normalize_setting_name(setting);
        self.conflicts.iter().find_map(|w| match w {
            Warning::Conflict {
                setting: s,
                authoritative,
                ..
            } if *s == setting => Some(authoritative),
            _ => None,
        })
    }

    pub fn scope_violation(&self) -> Option<(&[String], &[String])> {
        self.conflicts.iter().find_map(|w| match w {
            Warning::ScopeViolation {
                unavailable,
                unrecognized,
                ..
            } => Some((unavailable.as_slice(), unrecognized.as_slice())),
            _ => None,
        })
    }
}
