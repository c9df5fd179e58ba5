//! Error taxonomy: load-time, binding-time and resolution-time failures.
//!
//! Scope and conflict issues are not errors; they are `Warning`s carried on the bundle.

use crate::primitives::PrimitiveKind;

/// A primitive that could not be admitted into a registry snapshot.
///
/// Only `MissingInstructions` and failures on an instruction document are fatal for a load;
/// everything else skips the offending primitive and is reported.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LoadError {
    #[error("{kind} record has an empty name")]
    EmptyName { kind: PrimitiveKind },
    #[error("duplicate {kind} name {name:?}; keeping the first declaration")]
    DuplicateName { kind: PrimitiveKind, name: String },
    #[error("prompt {template:?}: placeholder ${{{placeholder}}} references an undeclared parameter")]
    UndeclaredPlaceholder {
        template: String,
        placeholder: String,
    },
    #[error("prompt {template:?}: parameter {parameter} has an empty allowed-values set")]
    EmptyAllowedValues { template: String, parameter: String },
    #[error("prompt {template:?}: default {default:?} for {parameter} is not one of {allowed:?}")]
    DefaultNotAllowed {
        template: String,
        parameter: String,
        default: String,
        allowed: Vec<String>,
    },
    #[error("prompt {template:?}: unterminated placeholder at byte {offset}")]
    UnterminatedPlaceholder { template: String, offset: usize },
    #[error("skill {name:?} declares no trigger topics")]
    NoTriggerTopics { name: String },
    #[error("{kind} {name:?} has an empty body")]
    EmptyBody { kind: PrimitiveKind, name: String },
    #[error("{kind} record at index {index} could not be read: {reason}")]
    Malformed {
        kind: PrimitiveKind,
        index: usize,
        reason: String,
    },
    #[error("instruction document {id:?} is malformed: {reason}")]
    MalformedInstructions { id: String, reason: String },
    #[error("workspace declares no instruction document")]
    MissingInstructions,
}

impl LoadError {
    /// Fatal errors abort the whole load; the previous snapshot (if any) stays current.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            LoadError::MalformedInstructions { .. } | LoadError::MissingInstructions
        )
    }
}

/// Failure to bind parameters for an invoked prompt template.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BindingError {
    #[error("prompt {template:?}: missing required parameter {parameter}")]
    MissingRequiredParameter { template: String, parameter: String },
    #[error("prompt {template:?}: invalid value {value:?} for {parameter}; allowed: {}", .allowed.join(", "))]
    InvalidParameterValue {
        template: String,
        parameter: String,
        value: String,
        allowed: Vec<String>,
    },
    #[error("prompt {template:?}: unknown parameter {parameter}")]
    UnknownParameter { template: String, parameter: String },
}

impl BindingError {
    /// Name of the parameter the error is about.
    pub fn parameter(&self) -> &str {
        match self {
            BindingError::MissingRequiredParameter { parameter, .. }
            | BindingError::InvalidParameterValue { parameter, .. }
            | BindingError::UnknownParameter { parameter, .. } => parameter,
        }
    }
}

/// Failure of a single resolution request. No partial bundle is produced.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ResolveError {
    #[error(transparent)]
    Binding(#[from] BindingError),
    #[error("unknown prompt {0:?}")]
    UnknownPrompt(String),
    #[error("unknown agent persona {0:?}")]
    UnknownPersona(String),
    #[error("resolution cancelled before stage {0}")]
    Cancelled(&'static str),
}

/// Failure to refresh the capability index from its source.
#[derive(Debug, thiserror::Error)]
pub enum RefreshError {
    #[error("capability refresh timed out after {0:?}")]
    Timeout(std::time::Duration),
    #[error("capability source failed: {0:#}")]
    Source(anyhow::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_instruction_failures_are_fatal() {
        assert!(LoadError::MissingInstructions.is_fatal());
        assert!(LoadError::MalformedInstructions {
            id: "base".into(),
            reason: "no rules".into()
        }
        .is_fatal());
        assert!(!LoadError::NoTriggerTopics { name: "s".into() }.is_fatal());
        assert!(!LoadError::EmptyName {
            kind: PrimitiveKind::Agent
        }
        .is_fatal());
    }

    #[test]
    fn invalid_value_message_lists_allowed_set() {
        let e = BindingError::InvalidParameterValue {
            template: "blueprint".into(),
            parameter: "DEPTH_LEVEL".into(),
            value: "Extreme".into(),
            allowed: vec!["Basic".into(), "Standard".into()],
        };
        let msg = e.to_string();
        assert!(msg.contains("DEPTH_LEVEL"));
        assert!(msg.contains("Basic, Standard"));
        assert_eq!(e.parameter(), "DEPTH_LEVEL");
    }
}
