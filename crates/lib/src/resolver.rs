//! Precedence resolver: compose instructions, matched skills, a bound prompt and a persona into one
//! ordered, conflict-annotated context bundle.
//!
//! Pipeline per request: base -> topic -> task -> persona -> conflicts -> emit. Each stage checks
//! the cancel token on entry. The resolver is stateless; identical snapshots and requests produce
//! identical bundles.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::bundle::{priority, ContextBundle, Layer, LayerRef, SettingValue, Warning};
use crate::capabilities::CapabilityIndex;
use crate::directives;
use crate::error::ResolveError;
use crate::primitives::{PrimitiveKind, SettingAssertion};
use crate::registry::RegistrySnapshot;
use crate::scope;
use crate::template;
use crate::trigger::{self, MatchLimit, MatchMode};

/// Explicit prompt invocation: template name plus supplied parameters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptInvocation {
    pub name: String,
    #[serde(default)]
    pub parameters: BTreeMap<String, String>,
}

/// How many skills the topic stage may include for one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SkillSelection {
    TopK(usize),
    All,
}

/// One resolution request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolutionRequest {
    #[serde(default)]
    pub free_text: String,
    #[serde(default)]
    pub prompt_invocation: Option<PromptInvocation>,
    #[serde(default)]
    pub persona_invocation: Option<String>,
    /// Overrides the configured skill limit. `All` takes every nonzero match, uncapped.
    #[serde(default)]
    pub skills: Option<SkillSelection>,
}

impl ResolutionRequest {
    pub fn new(free_text: impl Into<String>) -> Self {
        Self {
            free_text: free_text.into(),
            ..Self::default()
        }
    }

    pub fn with_prompt<I, K, V>(mut self, name: impl Into<String>, parameters: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.prompt_invocation = Some(PromptInvocation {
            name: name.into(),
            parameters: parameters
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        });
        self
    }

    pub fn with_persona(mut self, name: impl Into<String>) -> Self {
        self.persona_invocation = Some(name.into());
        self
    }

    pub fn with_skills(mut self, selection: SkillSelection) -> Self {
        self.skills = Some(selection);
        self
    }
}

/// Cooperative cancellation flag, checked on entry to each pipeline stage.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    fn check(&self, stage: &'static str) -> Result<(), ResolveError> {
        if self.is_cancelled() {
            log::debug!("resolution cancelled before {} stage", stage);
            return Err(ResolveError::Cancelled(stage));
        }
        Ok(())
    }
}

/// Tunables for the resolver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolverOptions {
    pub match_mode: MatchMode,
    /// Cap on skills included per request (default 3).
    pub max_skills: usize,
    /// Tool vocabulary known without any connector; see `scope::enforce`.
    pub builtin_tools: Vec<String>,
}

impl Default for ResolverOptions {
    fn default() -> Self {
        Self {
            match_mode: MatchMode::default(),
            max_skills: 3,
            builtin_tools: crate::config::default_builtin_tools(),
        }
    }
}

/// A layer under construction with the settings its content asserts.
struct Staged {
    layer: Layer,
    settings: Vec<SettingAssertion>,
}

/// Stateless resolver; cheap to share across threads.
#[derive(Debug, Clone, Default)]
pub struct Resolver {
    options: ResolverOptions,
}

impl Resolver {
    pub fn new(options: ResolverOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &ResolverOptions {
        &self.options
    }

    fn match_limit(&self, request: &ResolutionRequest) -> MatchLimit {
        match request.skills {
            Some(SkillSelection::TopK(k)) => MatchLimit::TopK(k),
            Some(SkillSelection::All) => MatchLimit::AllNonzero { cap: usize::MAX },
            None => MatchLimit::AllNonzero {
                cap: self.options.max_skills,
            },
        }
    }

    /// Resolve `request` against one registry snapshot and one capability snapshot.
    pub fn resolve(
        &self,
        registry: &RegistrySnapshot,
        capabilities: &CapabilityIndex,
        request: &ResolutionRequest,
        cancel: &CancelToken,
    ) -> Result<ContextBundle, ResolveError> {
        let mut staged: Vec<Staged> = Vec::new();
        let mut warnings: Vec<Warning> = Vec::new();

        cancel.check("base")?;
        for doc in &registry.instructions {
            let content = doc
                .rules
                .iter()
                .map(|r| r.text.as_str())
                .collect::<Vec<_>>()
                .join("\n");
            staged.push(Staged {
                layer: Layer {
                    source: PrimitiveKind::Instruction,
                    identifier: doc.id.clone(),
                    priority: priority::BASE,
                    content,
                },
                settings: directives::rule_settings(&doc.rules),
            });
        }

        cancel.check("topic")?;
        let matches = trigger::match_skills(
            &request.free_text,
            registry.skills.values(),
            self.options.match_mode,
            self.match_limit(request),
        );
        for m in &matches {
            // Registry keys and record names are the same trimmed string, so this always hits.
            let Some(skill) = registry.skill(&m.name) else {
                log::warn!("matched skill {:?} is not keyed in the registry snapshot", m.name);
                continue;
            };
            staged.push(Staged {
                layer: Layer {
                    source: PrimitiveKind::Skill,
                    identifier: skill.name.clone(),
                    priority: priority::TOPIC,
                    content: skill.body.clone(),
                },
                settings: directives::extract_settings(&skill.body),
            });
        }

        cancel.check("task")?;
        if let Some(inv) = &request.prompt_invocation {
            let template = registry
                .prompt(&inv.name)
                .ok_or_else(|| ResolveError::UnknownPrompt(inv.name.clone()))?;
            let text = template::bind(template, &inv.parameters).map_err(|e| {
                log::debug!("prompt {} rejected at parameter {}", template.name, e.parameter());
                e
            })?;
            let settings = directives::extract_settings(&text);
            staged.push(Staged {
                layer: Layer {
                    source: PrimitiveKind::Prompt,
                    identifier: template.name.clone(),
                    priority: priority::TASK,
                    content: text,
                },
                settings,
            });
        }

        cancel.check("persona")?;
        let outcome = match &request.persona_invocation {
            Some(name) => {
                let persona = registry
                    .agent(name)
                    .ok_or_else(|| ResolveError::UnknownPersona(name.clone()))?;
                let outcome = scope::enforce(persona, capabilities, &self.options.builtin_tools);
                staged.push(Staged {
                    layer: Layer {
                        source: PrimitiveKind::Agent,
                        identifier: persona.name.clone(),
                        priority: priority::PERSONA,
                        content: persona.body.clone(),
                    },
                    settings: directives::extract_settings(&persona.body),
                });
                outcome
            }
            None => scope::unrestricted(capabilities),
        };
        warnings.extend(outcome.warnings);

        cancel.check("conflicts")?;
        warnings.extend(detect_conflicts(&staged));

        cancel.check("emit")?;
        let mut layers: Vec<Layer> = staged.into_iter().map(|s| s.layer).collect();
        layers.sort_by_key(|l| l.priority);
        log::debug!(
            "resolved bundle: {} layer(s), {} warning(s), {} effective tool(s)",
            layers.len(),
            warnings.len(),
            outcome.effective_tools.len()
        );
        Ok(ContextBundle {
            layers,
            conflicts: warnings,
            effective_tools: outcome.effective_tools,
            tool_scope: outcome.tool_scope,
        })
    }
}

/// Group setting assertions by name and report every setting with more than one distinct value.
/// The highest-priority layer wins; among equal priorities the later layer wins.
fn detect_conflicts(staged: &[Staged]) -> Vec<Warning> {
    let mut by_setting: BTreeMap<&str, Vec<(usize, &Layer, &SettingAssertion)>> = BTreeMap::new();
    for (pos, s) in staged.iter().enumerate() {
        for a in &s.settings {
            by_setting
                .entry(a.name.as_str())
                .or_default()
                .push((pos, &s.layer, a));
        }
    }

    let mut out = Vec::new();
    for (setting, entries) in by_setting {
        let Some((_, _, first)) = entries.first() else {
            continue;
        };
        if !entries.iter().any(|(_, _, a)| first.contradicts(a)) {
            continue;
        }
        let Some(&(_, winner, winning)) = entries
            .iter()
            .max_by_key(|(pos, layer, _)| (layer.priority, *pos))
        else {
            continue;
        };
        let authoritative: LayerRef = winner.reference();
        let description = format!(
            "{} layers disagree on {}; {} {:?} wins with {:?}",
            entries.len(),
            setting,
            winner.source,
            winner.identifier,
            winning.value
        );
        out.push(Warning::Conflict {
            setting: setting.to_string(),
            assertions: entries
                .iter()
                .map(|(_, layer, a)| SettingValue {
                    layer: layer.reference(),
                    value: a.value.clone(),
                })
                .collect(),
            authoritative,
            description,
        });
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::primitives::{
        AgentPersona, ConnectorDescriptor, Directive, InstructionDocument, ParameterDecl,
        PromptTemplate, SkillDocument, WorkspaceRecords,
    };
    use crate::registry::build_snapshot;
    use std::collections::BTreeSet;

    fn snapshot() -> RegistrySnapshot {
        let mut parameters = BTreeMap::new();
        parameters.insert(
            "OUTPUT_FORMAT".to_string(),
            ParameterDecl::optional(Some("Markdown")).one_of(["Markdown", "JSON", "YAML", "HTML"]),
        );
        let records = WorkspaceRecords {
            instructions: vec![InstructionDocument {
                id: "copilot-instructions".to_string(),
                scope: Default::default(),
                rules: vec![Directive::new("use single quotes").with_setting("quote-style", "single")],
            }],
            prompts: vec![PromptTemplate {
                name: "readme".to_string(),
                description: None,
                parameters,
                body: "Write a README as ${OUTPUT_FORMAT}.".to_string(),
            }],
            agents: vec![AgentPersona {
                name: "python-dev".to_string(),
                description: None,
                declared_tools: ["read", "edit"].iter().map(|s| s.to_string()).collect(),
                expertise_topics: BTreeSet::new(),
                body: "Follow PEP 8.\n<!-- setting: quote-style = double -->".to_string(),
            }],
            skills: vec![SkillDocument {
                name: "unit-testing".to_string(),
                description: None,
                trigger_topics: ["testing", "unit test", "jest"].iter().map(|s| s.to_string()).collect(),
                body: "Write focused tests.".to_string(),
            }],
        };
        build_snapshot(records, 1).unwrap().0
    }

    fn index() -> CapabilityIndex {
        CapabilityIndex::new([ConnectorDescriptor::new("builtin", ["read", "search"])])
    }

    #[test]
    fn stages_are_ordered_by_priority() {
        let req = ResolutionRequest::new("test the toggle")
            .with_prompt("readme", [("OUTPUT_FORMAT", "JSON")])
            .with_persona("python-dev");
        let b = Resolver::default()
            .resolve(&snapshot(), &index(), &req, &CancelToken::new())
            .unwrap();
        let order: Vec<(u8, &str)> = b
            .layers
            .iter()
            .map(|l| (l.priority, l.identifier.as_str()))
            .collect();
        assert_eq!(
            order,
            vec![
                (0, "copilot-instructions"),
                (1, "unit-testing"),
                (2, "readme"),
                (3, "python-dev"),
            ]
        );
        assert_eq!(b.layers[2].content, "Write a README as JSON.");
    }

    #[test]
    fn persona_wins_setting_conflict() {
        let req = ResolutionRequest::new("hello").with_persona("python-dev");
        let b = Resolver::default()
            .resolve(&snapshot(), &index(), &req, &CancelToken::new())
            .unwrap();
        let winner = b.authoritative_for("quote style").unwrap();
        assert_eq!(winner.source, PrimitiveKind::Agent);
        assert_eq!(winner.identifier, "python-dev");
    }

    #[test]
    fn unknown_names_abort() {
        let r = Resolver::default();
        let err = r
            .resolve(
                &snapshot(),
                &index(),
                &ResolutionRequest::new("x").with_prompt("nope", Vec::<(String, String)>::new()),
                &CancelToken::new(),
            )
            .unwrap_err();
        assert_eq!(err, ResolveError::UnknownPrompt("nope".to_string()));
        let err = r
            .resolve(
                &snapshot(),
                &index(),
                &ResolutionRequest::new("x").with_persona("nobody"),
                &CancelToken::new(),
            )
            .unwrap_err();
        assert_eq!(err, ResolveError::UnknownPersona("nobody".to_string()));
    }

    #[test]
    fn cancelled_token_stops_at_first_stage() {
        let cancel = CancelToken::new();
        cancel.cancel();
        let err = Resolver::default()
            .resolve(&snapshot(), &index(), &ResolutionRequest::new("x"), &cancel)
            .unwrap_err();
        assert_eq!(err, ResolveError::Cancelled("base"));
    }

    #[test]
    fn top_k_selection_overrides_cap() {
        let req = ResolutionRequest::new("unit testing with jest").with_skills(SkillSelection::TopK(0));
        let b = Resolver::default()
            .resolve(&snapshot(), &index(), &req, &CancelToken::new())
            .unwrap();
        assert_eq!(b.layers.len(), 1);
    }

    fn many_testing_skills(names: &[&str]) -> RegistrySnapshot {
        let records = WorkspaceRecords {
            instructions: vec![InstructionDocument {
                id: "base".to_string(),
                scope: Default::default(),
                rules: vec![Directive::new("keep it short")],
            }],
            skills: names
                .iter()
                .map(|n| SkillDocument {
                    name: n.to_string(),
                    description: None,
                    trigger_topics: ["testing".to_string()].into_iter().collect(),
                    body: format!("{} notes", n.trim()),
                })
                .collect(),
            ..WorkspaceRecords::default()
        };
        build_snapshot(records, 1).unwrap().0
    }

    #[test]
    fn all_selection_is_not_capped() {
        let snap = many_testing_skills(&["s1", "s2", "s3", "s4", "s5"]);
        let r = Resolver::default();
        let all = r
            .resolve(
                &snap,
                &index(),
                &ResolutionRequest::new("testing").with_skills(SkillSelection::All),
                &CancelToken::new(),
            )
            .unwrap();
        assert_eq!(all.layers.len(), 6);
        let default = r
            .resolve(&snap, &index(), &ResolutionRequest::new("testing"), &CancelToken::new())
            .unwrap();
        assert_eq!(default.layers.len(), 4);
    }

    #[test]
    fn padded_skill_name_still_lands_in_bundle() {
        let snap = many_testing_skills(&[" unit-testing "]);
        let b = Resolver::default()
            .resolve(&snap, &index(), &ResolutionRequest::new("testing"), &CancelToken::new())
            .unwrap();
        assert_eq!(b.layers.len(), 2);
        assert_eq!(b.layers[1].identifier, "unit-testing");
    }

    #[test]
    fn same_value_in_different_case_is_not_a_conflict() {
        let records = WorkspaceRecords {
            instructions: vec![
                InstructionDocument {
                    id: "a".to_string(),
                    scope: Default::default(),
                    rules: vec![Directive::new("quotes").with_setting("quote-style", "Single")],
                },
                InstructionDocument {
                    id: "b".to_string(),
                    scope: Default::default(),
                    rules: vec![Directive::new("quotes").with_setting("quote_style", "single")],
                },
            ],
            ..WorkspaceRecords::default()
        };
        let snap = build_snapshot(records, 1).unwrap().0;
        let b = Resolver::default()
            .resolve(&snap, &index(), &ResolutionRequest::new(""), &CancelToken::new())
            .unwrap();
        assert!(b.conflicts.is_empty());
    }

    #[test]
    fn request_deserializes_from_camel_case() {
        let req: ResolutionRequest = serde_json::from_str(
            r#"{"freeText":"hi","promptInvocation":{"name":"readme","parameters":{"OUTPUT_FORMAT":"YAML"}},"personaInvocation":"python-dev","skills":{"topK":2}}"#,
        )
        .unwrap();
        assert_eq!(req.persona_invocation.as_deref(), Some("python-dev"));
        assert_eq!(req.skills, Some(SkillSelection::TopK(2)));
        assert_eq!(
            req.prompt_invocation.unwrap().parameters.get("OUTPUT_FORMAT").map(String::as_str),
            Some("YAML")
        );
    }
}
