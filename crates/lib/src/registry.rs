//! Primitive registry: validated, immutable snapshots of a workspace's primitives.
//!
//! Loading is per-primitive: a malformed prompt, agent or skill is skipped and reported while the
//! rest load. Instruction documents are always-on, so a problem there fails the whole load and
//! the previous snapshot (if any) stays current.

use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use parking_lot::Mutex;
use std::sync::Arc;

use crate::error::LoadError;
use crate::primitives::{
    AgentPersona, InstructionDocument, PrimitiveKind, PromptTemplate, SkillDocument,
    WorkspaceRecords,
};
use crate::snapshot::SnapshotCell;
use crate::template;

/// One immutable view of the registry. Resolutions hold an `Arc` to it for their whole run.
#[derive(Debug, Clone)]
pub struct RegistrySnapshot {
    pub generation: u64,
    pub loaded_at: DateTime<Utc>,
    /// In declaration order.
    pub instructions: Vec<InstructionDocument>,
    pub prompts: BTreeMap<String, PromptTemplate>,
    pub agents: BTreeMap<String, AgentPersona>,
    pub skills: BTreeMap<String, SkillDocument>,
}

impl RegistrySnapshot {
    pub fn prompt(&self, name: &str) -> Option<&PromptTemplate> {
        self.prompts.get(name)
    }

    pub fn agent(&self, name: &str) -> Option<&AgentPersona> {
        self.agents.get(name)
    }

    pub fn skill(&self, name: &str) -> Option<&SkillDocument> {
        self.skills.get(name)
    }
}

fn check_instructions(docs: Vec<InstructionDocument>) -> Result<Vec<InstructionDocument>, LoadError> {
    if docs.is_empty() {
        return Err(LoadError::MissingInstructions);
    }
    let mut out: Vec<InstructionDocument> = Vec::with_capacity(docs.len());
    for (i, mut doc) in docs.into_iter().enumerate() {
        doc.id = doc.id.trim().to_string();
        if doc.id.is_empty() {
            doc.id = format!("instructions-{}", i + 1);
        }
        if doc.rules.is_empty() {
            return Err(LoadError::MalformedInstructions {
                id: doc.id,
                reason: "no rules".to_string(),
            });
        }
        if let Some(n) = doc.rules.iter().position(|r| r.text.trim().is_empty()) {
            return Err(LoadError::MalformedInstructions {
                id: doc.id,
                reason: format!("rule {} is empty", n + 1),
            });
        }
        if out.iter().any(|d| d.id == doc.id) {
            return Err(LoadError::MalformedInstructions {
                reason: "duplicate id".to_string(),
                id: doc.id,
            });
        }
        out.push(doc);
    }
    Ok(out)
}

/// Insert named records, skipping empty names, empty bodies, duplicates and anything `extra`
/// rejects. Names are trimmed in place so the record and its key always agree.
fn admit<T>(
    kind: PrimitiveKind,
    records: Vec<T>,
    name_of: impl Fn(&mut T) -> &mut String,
    body_of: impl Fn(&T) -> &str,
    extra: impl Fn(&T) -> Vec<LoadError>,
    errors: &mut Vec<LoadError>,
) -> BTreeMap<String, T> {
    let mut out = BTreeMap::new();
    for mut r in records {
        let name = {
            let slot = name_of(&mut r);
            *slot = slot.trim().to_string();
            slot.clone()
        };
        if name.is_empty() {
            errors.push(LoadError::EmptyName { kind });
            continue;
        }
        if body_of(&r).trim().is_empty() {
            errors.push(LoadError::EmptyBody { kind, name });
            continue;
        }
        if out.contains_key(&name) {
            errors.push(LoadError::DuplicateName { kind, name });
            continue;
        }
        let problems = extra(&r);
        if !problems.is_empty() {
            errors.extend(problems);
            continue;
        }
        out.insert(name, r);
    }
    out
}

/// Validate `records` into a snapshot. Non-fatal problems are returned alongside it.
pub fn build_snapshot(
    records: WorkspaceRecords,
    generation: u64,
) -> Result<(RegistrySnapshot, Vec<LoadError>), LoadError> {
    let instructions = check_instructions(records.instructions)?;
    let mut errors = Vec::new();

    let prompts = admit(
        PrimitiveKind::Prompt,
        records.prompts,
        |p| &mut p.name,
        |p| p.body.as_str(),
        template::validate,
        &mut errors,
    );
    let agents = admit(
        PrimitiveKind::Agent,
        records.agents,
        |a| &mut a.name,
        |a| a.body.as_str(),
        |_| Vec::new(),
        &mut errors,
    );
    let skills = admit(
        PrimitiveKind::Skill,
        records.skills,
        |s| &mut s.name,
        |s| s.body.as_str(),
        |s| {
            if s.trigger_topics.iter().all(|t| t.trim().is_empty()) {
                vec![LoadError::NoTriggerTopics {
                    name: s.name.clone(),
                }]
            } else {
                Vec::new()
            }
        },
        &mut errors,
    );

    Ok((
        RegistrySnapshot {
            generation,
            loaded_at: Utc::now(),
            instructions,
            prompts,
            agents,
            skills,
        },
        errors,
    ))
}

/// Shared handle to the current registry snapshot. Cloning shares the same snapshot pointer.
#[derive(Clone)]
pub struct RegistryHandle {
    cell: SnapshotCell<RegistrySnapshot>,
    generation: Arc<AtomicU64>,
    /// Held for the whole of a reload so generations are assigned and stored in order.
    reloading: Arc<Mutex<()>>,
}

impl RegistryHandle {
    /// Build the first snapshot. Fails only on a fatal (instruction) error.
    pub fn load(records: WorkspaceRecords) -> Result<(Self, Vec<LoadError>), LoadError> {
        let (snapshot, errors) = build_snapshot(records, 1)?;
        log_loaded(&snapshot, &errors);
        Ok((
            Self {
                cell: SnapshotCell::new(snapshot),
                generation: Arc::new(AtomicU64::new(1)),
                reloading: Arc::new(Mutex::new(())),
            },
            errors,
        ))
    }

    /// Snapshot to resolve against. Later reloads do not affect it.
    pub fn current(&self) -> Arc<RegistrySnapshot> {
        self.cell.load()
    }

    /// Replace the snapshot wholesale. On a fatal error the current snapshot is kept.
    pub fn reload(&self, records: WorkspaceRecords) -> Result<Vec<LoadError>, LoadError> {
        let _guard = self.reloading.lock();
        let generation = self.generation.load(Ordering::SeqCst) + 1;
        let (snapshot, errors) = build_snapshot(records, generation).map_err(|e| {
            log::warn!("registry reload rejected, keeping current snapshot: {}", e);
            e
        })?;
        self.generation.store(generation, Ordering::SeqCst);
        log_loaded(&snapshot, &errors);
        self.cell.store(snapshot);
        Ok(errors)
    }
}

fn log_loaded(snapshot: &RegistrySnapshot, errors: &[LoadError]) {
    for e in errors {
        log::warn!("skipped primitive: {}", e);
    }
    log::info!(
        "registry generation {} loaded: {} instruction doc(s), {} prompt(s), {} agent(s), {} skill(s)",
        snapshot.generation,
        snapshot.instructions.len(),
        snapshot.prompts.len(),
        snapshot.agents.len(),
        snapshot.skills.len()
    );
}
