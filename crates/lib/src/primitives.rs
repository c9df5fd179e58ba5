//! Typed records for the five primitive kinds: instructions, prompts, agents, skills, connectors.
//!
//! Records arrive pre-parsed from an external loader (see `workspace` for the manifest form).
//! They are immutable once placed in a registry snapshot.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Which kind of primitive a layer or record comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrimitiveKind {
    Instruction,
    Prompt,
    Agent,
    Skill,
    Connector,
}

impl PrimitiveKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PrimitiveKind::Instruction => "instruction",
            PrimitiveKind::Prompt => "prompt",
            PrimitiveKind::Agent => "agent",
            PrimitiveKind::Skill => "skill",
            PrimitiveKind::Connector => "connector",
        }
    }
}

impl std::fmt::Display for PrimitiveKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where an instruction document applies. Only workspace-global instructions exist today.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InstructionScope {
    #[default]
    Global,
}

/// Semantic tag on an instruction rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DirectiveTag {
    Style,
    Structure,
    Routing,
    Testing,
    Security,
    General,
}

/// A directive asserting a value for a named setting (e.g. `quote-style = single`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettingAssertion {
    pub name: String,
    pub value: String,
}

impl SettingAssertion {
    /// Build an assertion with the setting name normalised (lowercase, `_`/whitespace -> `-`).
    pub fn new(name: &str, value: &str) -> Self {
        Self {
            name: normalize_setting_name(name),
            value: value.trim().to_string(),
        }
    }

    /// True when both assertions target the same setting with different values.
    pub fn contradicts(&self, other: &SettingAssertion) -> bool {
        self.name == other.name && !self.value.eq_ignore_ascii_case(&other.value)
    }
}

pub(crate) fn normalize_setting_name(name: &str) -> String {
    name.trim()
        .split(|c: char| c.is_whitespace() || c == '_' || c == '-')
        .filter(|s| !s.is_empty())
        .map(|s| s.to_lowercase())
        .collect::<Vec<_>>()
        .join("-")
}

/// One rule of an instruction document. Accepts either a bare string or a full record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "DirectiveRecord")]
pub struct Directive {
    pub text: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<DirectiveTag>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub setting: Option<SettingAssertion>,
}

impl Directive {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            tags: Vec::new(),
            setting: None,
        }
    }

    pub fn with_tag(mut self, tag: DirectiveTag) -> Self {
        self.tags.push(tag);
        self
    }

    pub fn with_setting(mut self, name: &str, value: &str) -> Self {
        self.setting = Some(SettingAssertion::new(name, value));
        self
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum DirectiveRecord {
    Text(String),
    Full {
        text: String,
        #[serde(default)]
        tags: Vec<DirectiveTag>,
        #[serde(default)]
        setting: Option<SettingAssertion>,
    },
}

impl From<DirectiveRecord> for Directive {
    fn from(r: DirectiveRecord) -> Self {
        match r {
            DirectiveRecord::Text(text) => Directive::new(text),
            DirectiveRecord::Full { text, tags, setting } => Directive {
                text,
                tags,
                setting: setting.map(|s| SettingAssertion::new(&s.name, &s.value)),
            },
        }
    }
}

/// Always-on instructions (e.g. copilot-instructions.md). Several are merged by concatenation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstructionDocument {
    /// Identifier used for the bundle layer. Filled with `instructions-N` when the loader omits it.
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub scope: InstructionScope,
    #[serde(default)]
    pub rules: Vec<Directive>,
}

/// Declaration of one prompt template parameter.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParameterDecl {
    #[serde(default)]
    pub required: bool,
    /// Allowed values in declaration order. `None` means any value is accepted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allowed_values: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,
}

impl ParameterDecl {
    pub fn required() -> Self {
        Self {
            required: true,
            ..Self::default()
        }
    }

    pub fn optional(default: Option<&str>) -> Self {
        Self {
            required: false,
            allowed_values: None,
            default: default.map(str::to_string),
        }
    }

    pub fn one_of<I, S>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed_values = Some(values.into_iter().map(Into::into).collect());
        self
    }

    /// True when `value` is acceptable for this parameter (exact, case-sensitive).
    pub fn accepts(&self, value: &str) -> bool {
        match &self.allowed_values {
            Some(allowed) => allowed.iter().any(|a| a == value),
            None => true,
        }
    }
}

/// On-demand task template (e.g. a `*.prompt.md` file).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptTemplate {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub parameters: BTreeMap<String, ParameterDecl>,
    pub body: String,
}

/// Specialised agent persona with an advisory tool scope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentPersona {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Capability names the persona may use. Empty means no explicit restriction.
    #[serde(default, alias = "tools")]
    pub declared_tools: BTreeSet<String>,
    #[serde(default)]
    pub expertise_topics: BTreeSet<String>,
    pub body: String,
}

/// Reference document pulled in when the request text touches one of its trigger topics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SkillDocument {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub trigger_topics: BTreeSet<String>,
    pub body: String,
}

/// External tool connector (MCP server) and the capabilities it exposes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectorDescriptor {
    pub id: String,
    #[serde(default, alias = "capabilities")]
    pub exposed_capabilities: BTreeSet<String>,
}

impl ConnectorDescriptor {
    pub fn new<I, S>(id: impl Into<String>, capabilities: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            id: id.into(),
            exposed_capabilities: capabilities.into_iter().map(Into::into).collect(),
        }
    }
}

/// Raw record set for one workspace, as produced by the loader.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkspaceRecords {
    #[serde(default)]
    pub instructions: Vec<InstructionDocument>,
    #[serde(default)]
    pub prompts: Vec<PromptTemplate>,
    #[serde(default)]
    pub agents: Vec<AgentPersona>,
    #[serde(default)]
    pub skills: Vec<SkillDocument>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn setting_names_are_normalized() {
        let a = SettingAssertion::new("String_Quote  Style", "single");
        assert_eq!(a.name, "string-quote-style");
    }

    #[test]
    fn contradiction_ignores_value_case() {
        let a = SettingAssertion::new("quote-style", "Single");
        let b = SettingAssertion::new("quote_style", "single");
        let c = SettingAssertion::new("quote-style", "double");
        assert!(!a.contradicts(&b));
        assert!(a.contradicts(&c));
    }

    #[test]
    fn directive_accepts_bare_string_or_record() {
        let yaml = r#"
- use single quotes
- text: prefer tabs
  tags: [style]
  setting: { name: Indent_Style, value: tabs }
"#;
        let rules: Vec<Directive> = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(rules[0], Directive::new("use single quotes"));
        assert_eq!(rules[1].tags, vec![DirectiveTag::Style]);
        assert_eq!(
            rules[1].setting,
            Some(SettingAssertion {
                name: "indent-style".to_string(),
                value: "tabs".to_string()
            })
        );
    }

    #[test]
    fn parameter_accepts_only_allowed_values() {
        let p = ParameterDecl::optional(Some("Markdown")).one_of(["Markdown", "JSON"]);
        assert!(p.accepts("JSON"));
        assert!(!p.accepts("json"));
        assert!(ParameterDecl::required().accepts("anything"));
    }
}
