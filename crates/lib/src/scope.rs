//! Scope enforcer: narrow a persona's declared tools to what the capability index offers.
//!
//! Tool scopes are advisory. Missing tools produce warnings and never fail a resolution; callers
//! that need real access control should wrap the result in their own authorization layer.

use std::collections::BTreeSet;

use crate::bundle::{ToolScope, Warning};
use crate::capabilities::CapabilityIndex;
use crate::primitives::AgentPersona;

/// Effective tool set for one persona plus any warnings raised while computing it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScopeOutcome {
    pub effective_tools: BTreeSet<String>,
    pub tool_scope: ToolScope,
    pub warnings: Vec<Warning>,
}

/// Tool set when no persona narrows it: everything the index offers.
pub fn unrestricted(index: &CapabilityIndex) -> ScopeOutcome {
    ScopeOutcome {
        effective_tools: index.all_capabilities(),
        tool_scope: ToolScope::Unrestricted,
        warnings: Vec::new(),
    }
}

/// Intersect `persona.declared_tools` with `index`.
///
/// `builtin` is the tool vocabulary known independently of connectors; it only decides whether a
/// missing tool is reported as unavailable or unrecognized.
pub fn enforce(persona: &AgentPersona, index: &CapabilityIndex, builtin: &[String]) -> ScopeOutcome {
    if persona.declared_tools.is_empty() {
        return unrestricted(index);
    }

    let mut effective = BTreeSet::new();
    let mut unavailable = Vec::new();
    let mut unrecognized = Vec::new();
    for tool in &persona.declared_tools {
        if index.offers(tool) {
            effective.insert(tool.clone());
        } else if tool.contains('/') || builtin.iter().any(|b| b == tool) {
            unavailable.push(tool.clone());
        } else {
            unrecognized.push(tool.clone());
        }
    }

    let mut warnings = Vec::new();
    if !unavailable.is_empty() || !unrecognized.is_empty() {
        log::debug!(
            "persona {}: unavailable tools {:?}, unrecognized tools {:?}",
            persona.name,
            unavailable,
            unrecognized
        );
        warnings.push(Warning::ScopeViolation {
            persona: persona.name.clone(),
            unavailable,
            unrecognized,
        });
    }
    if effective.is_empty() {
        warnings.push(Warning::NoToolsAvailable {
            persona: persona.name.clone(),
        });
    }

    ScopeOutcome {
        effective_tools: effective,
        tool_scope: ToolScope::Restricted,
        warnings,
    }
}
