//! Workspace manifest and connector file loading.
//!
//! The manifest holds already-parsed primitive records (`instructions`, `prompts`, `agents`,
//! `skills`); turning markdown/front-matter documents into records is the loader's job upstream.
//! Files ending in `.yaml`/`.yml` are read as YAML, anything else as JSON.
//!
//! Each list element is decoded on its own. A prompt, agent or skill that does not decode is
//! reported as `LoadError::Malformed` and the rest still load; an instruction document that does
//! not decode fails the whole manifest.

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;

use crate::error::LoadError;
use crate::primitives::{ConnectorDescriptor, PrimitiveKind, WorkspaceRecords};

fn is_yaml(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("yaml") | Some("yml")
    )
}

/// Manifest with every record left undecoded.
#[derive(Default, Deserialize)]
#[serde(default)]
struct RawManifest {
    instructions: Vec<Value>,
    prompts: Vec<Value>,
    agents: Vec<Value>,
    skills: Vec<Value>,
}

fn decode_each<T: DeserializeOwned>(
    kind: PrimitiveKind,
    values: Vec<Value>,
    errors: &mut Vec<LoadError>,
) -> Vec<T> {
    values
        .into_iter()
        .enumerate()
        .filter_map(|(index, v)| match serde_json::from_value(v) {
            Ok(record) => Some(record),
            Err(e) => {
                errors.push(LoadError::Malformed {
                    kind,
                    index,
                    reason: e.to_string(),
                });
                None
            }
        })
        .collect()
}

/// Parse manifest text; `path` picks the format and labels errors. Records that fail to decode
/// are returned as non-fatal load errors.
pub fn parse_manifest(s: &str, path: &Path) -> Result<(WorkspaceRecords, Vec<LoadError>)> {
    let raw: RawManifest = if is_yaml(path) {
        serde_yaml::from_str(s).with_context(|| format!("parsing manifest {}", path.display()))?
    } else {
        serde_json::from_str(s).with_context(|| format!("parsing manifest {}", path.display()))?
    };

    let mut fatal = Vec::new();
    let instructions = decode_each(PrimitiveKind::Instruction, raw.instructions, &mut fatal);
    if let Some(LoadError::Malformed { index, reason, .. }) = fatal.into_iter().next() {
        let err = LoadError::MalformedInstructions {
            id: format!("instructions[{}]", index),
            reason,
        };
        return Err(anyhow::Error::new(err).context(format!("parsing manifest {}", path.display())));
    }

    let mut errors = Vec::new();
    let records = WorkspaceRecords {
        instructions,
        prompts: decode_each(PrimitiveKind::Prompt, raw.prompts, &mut errors),
        agents: decode_each(PrimitiveKind::Agent, raw.agents, &mut errors),
        skills: decode_each(PrimitiveKind::Skill, raw.skills, &mut errors),
    };
    for e in &errors {
        log::warn!("{}: {}", path.display(), e);
    }
    Ok((records, errors))
}

pub fn load_manifest(path: &Path) -> Result<(WorkspaceRecords, Vec<LoadError>)> {
    let s = std::fs::read_to_string(path)
        .with_context(|| format!("reading manifest from {}", path.display()))?;
    parse_manifest(&s, path)
}

/// Connector file: a list of descriptors or a map of connector id -> capability names.
#[derive(Deserialize)]
#[serde(untagged)]
enum ConnectorFile {
    List(Vec<ConnectorDescriptor>),
    Map(BTreeMap<String, Vec<String>>),
}

impl From<ConnectorFile> for Vec<ConnectorDescriptor> {
    fn from(f: ConnectorFile) -> Self {
        match f {
            ConnectorFile::List(list) => list,
            ConnectorFile::Map(map) => map
                .into_iter()
                .map(|(id, caps)| ConnectorDescriptor::new(id, caps))
                .collect(),
        }
    }
}

pub fn parse_connectors(s: &str, path: &Path) -> Result<Vec<ConnectorDescriptor>> {
    let file: ConnectorFile = if is_yaml(path) {
        serde_yaml::from_str(s).with_context(|| format!("parsing connectors {}", path.display()))?
    } else {
        serde_json::from_str(s).with_context(|| format!("parsing connectors {}", path.display()))?
    };
    Ok(file.into())
}

/// Load connectors; a missing file means no connectors are attached.
pub fn load_connectors(path: &Path) -> Result<Vec<ConnectorDescriptor>> {
    if !path.exists() {
        log::debug!("connectors file not found, using empty index: {}", path.display());
        return Ok(Vec::new());
    }
    let s = std::fs::read_to_string(path)
        .with_context(|| format!("reading connectors from {}", path.display()))?;
    parse_connectors(&s, path)
}

/// Modification time of `path`, used to detect when a reload is due.
pub fn modified_at(path: &Path) -> Option<std::time::SystemTime> {
    std::fs::metadata(path).and_then(|m| m.modified()).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    const MANIFEST: &str = r#"
instructions:
  - id: copilot-instructions
    rules:
      - use single quotes
      - text: keep functions small
        tags: [structure]
prompts:
  - name: blueprint-generator
    parameters:
      DEPTH_LEVEL:
        allowedValues: [Basic, Standard, Comprehensive, Implementation-Ready]
        default: Standard
    body: "Depth: ${DEPTH_LEVEL}"
agents:
  - name: green-coding-optimizer
    tools: [read, search, edit, azure/azure-mcp/search]
    body: Optimise for energy use.
skills:
  - name: unit-testing
    triggerTopics: [testing, unit test, jest]
    body: Write focused tests.
"#;

    #[test]
    fn parses_yaml_manifest() {
        let (r, errors) = parse_manifest(MANIFEST, Path::new("workspace.yaml")).unwrap();
        assert!(errors.is_empty());
        assert_eq!(r.instructions[0].rules.len(), 2);
        assert_eq!(
            r.prompts[0].parameters["DEPTH_LEVEL"].default.as_deref(),
            Some("Standard")
        );
        assert!(r.agents[0].declared_tools.contains("azure/azure-mcp/search"));
        assert!(r.skills[0].trigger_topics.contains("unit test"));
    }

    #[test]
    fn json_manifest_uses_json_parser() {
        let (r, _) = parse_manifest(
            r#"{"instructions":[{"rules":["use tabs"]}]}"#,
            Path::new("workspace.json"),
        )
        .unwrap();
        assert_eq!(r.instructions.len(), 1);
        assert!(r.prompts.is_empty());
    }

    #[test]
    fn undecodable_skill_is_reported_and_others_load() {
        let manifest = r#"
instructions:
  - rules: [use single quotes]
skills:
  - name: unit-testing
    triggerTopics: [testing]
    body: Write focused tests.
  - name: no-body
    triggerTopics: [css]
agents:
  - tools: [read]
    body: nameless
"#;
        let (r, errors) = parse_manifest(manifest, Path::new("w.yaml")).unwrap();
        assert_eq!(r.skills.len(), 1);
        assert_eq!(r.skills[0].name, "unit-testing");
        assert!(r.agents.is_empty());
        assert_eq!(errors.len(), 2);
        assert!(matches!(
            &errors[0],
            LoadError::Malformed { kind: PrimitiveKind::Agent, index: 0, .. }
        ));
        assert!(matches!(
            &errors[1],
            LoadError::Malformed { kind: PrimitiveKind::Skill, index: 1, reason } if reason.contains("body")
        ));
        assert!(errors.iter().all(|e| !e.is_fatal()));
    }

    #[test]
    fn undecodable_instruction_fails_the_manifest() {
        let manifest = "instructions:\n  - rules: 42\n";
        let err = parse_manifest(manifest, Path::new("w.yaml")).unwrap_err();
        let load = err.downcast_ref::<LoadError>().expect("typed load error");
        assert!(load.is_fatal());
    }

    #[test]
    fn connectors_accept_list_or_map() {
        let list = parse_connectors(
            r#"[{"id":"builtin","capabilities":["read","search"]}]"#,
            Path::new("connectors.json"),
        )
        .unwrap();
        let map = parse_connectors("builtin: [read, search]\n", Path::new("connectors.yaml")).unwrap();
        assert_eq!(list, map);
    }

    #[test]
    fn missing_connectors_file_is_empty() {
        let path = std::env::temp_dir().join("ctxres-no-such-connectors.json");
        assert!(load_connectors(&path).unwrap().is_empty());
    }
}
