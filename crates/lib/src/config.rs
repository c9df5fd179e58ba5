//! Configuration types and loading.
//!
//! Config is loaded from a JSON file (e.g. `~/.ctxres/config.json`) and environment.
//! Every field has a default, so a missing file is a valid configuration.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::resolver::ResolverOptions;
use crate::trigger::MatchMode;

/// Top-level application config.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Where the workspace manifest and connector list live.
    #[serde(default)]
    pub workspace: WorkspaceConfig,

    /// Resolver tunables (skill cap, match mode, capability refresh timeout).
    #[serde(default)]
    pub resolver: ResolverConfig,

    /// Tool vocabulary settings.
    #[serde(default)]
    pub tools: ToolsConfig,
}

/// Workspace input files. Relative paths resolve against the config file's parent.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkspaceConfig {
    /// Manifest of instruction, prompt, agent and skill records (default `workspace.yaml`).
    /// Overridden by CTXRES_WORKSPACE_MANIFEST env.
    #[serde(default)]
    pub manifest: Option<PathBuf>,

    /// Connector descriptors for the capability index (default `connectors.json`).
    #[serde(default)]
    pub connectors: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolverConfig {
    /// Maximum skills included per request (default 3).
    #[serde(default = "default_max_skills")]
    pub max_skills: usize,

    /// "exact" or "stemmed" (default). Exact compares lowercased terms only.
    #[serde(default)]
    pub match_mode: MatchMode,

    /// Timeout for a capability index refresh, in milliseconds (default 2000).
    #[serde(default = "default_capability_timeout_ms")]
    pub capability_timeout_ms: u64,
}

fn default_max_skills() -> usize {
    3
}

fn default_capability_timeout_ms() -> u64 {
    2000
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            max_skills: default_max_skills(),
            match_mode: MatchMode::default(),
            capability_timeout_ms: default_capability_timeout_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolsConfig {
    /// Tool names known without any connector (editor built-ins). A persona tool missing from the
    /// capability index is "unavailable" when listed here and "unrecognized" otherwise.
    #[serde(default = "default_builtin_tools")]
    pub builtin: Vec<String>,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            builtin: default_builtin_tools(),
        }
    }
}

pub fn default_builtin_tools() -> Vec<String> {
    [
        "read",
        "edit",
        "search",
        "runCommands",
        "fetch",
        "problems",
        "usages",
        "changes",
        "terminal",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

impl Config {
    pub fn resolver_options(&self) -> ResolverOptions {
        ResolverOptions {
            match_mode: self.resolver.match_mode,
            max_skills: self.resolver.max_skills,
            builtin_tools: self.tools.builtin.clone(),
        }
    }

    pub fn capability_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.resolver.capability_timeout_ms)
    }
}

/// Resolve config path from env or default.
pub fn default_config_path() -> PathBuf {
    std::env::var("CTXRES_CONFIG_PATH").map(PathBuf::from).unwrap_or_else(|_| {
        dirs::home_dir()
            .map(|h| h.join(".ctxres").join("config.json"))
            .unwrap_or_else(|| PathBuf::from("config.json"))
    })
}

/// Load config from the given path, or the default path (or CTXRES_CONFIG_PATH). Missing file =>
/// default config. Returns the config and the path that was used.
pub fn load_config(path: Option<PathBuf>) -> Result<(Config, PathBuf)> {
    let path = path.unwrap_or_else(default_config_path);
    let config = if !path.exists() {
        log::debug!("config file not found, using defaults: {}", path.display());
        Config::default()
    } else {
        let s = std::fs::read_to_string(&path)
            .with_context(|| format!("reading config from {}", path.display()))?;
        serde_json::from_str(&s)
            .with_context(|| format!("parsing config from {}", path.display()))?
    };
    Ok((config, path))
}

fn config_parent(config_path: &Path) -> &Path {
    config_path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."))
}

fn resolve_relative(configured: Option<&PathBuf>, config_path: &Path, default_name: &str) -> PathBuf {
    let parent = config_parent(config_path);
    match configured {
        Some(p) if !p.as_os_str().is_empty() => {
            if p.is_absolute() {
                p.clone()
            } else {
                parent.join(p)
            }
        }
        _ => parent.join(default_name),
    }
}

/// Resolve the manifest path: env CTXRES_WORKSPACE_MANIFEST overrides config, which overrides
/// `workspace.yaml` next to the config file.
pub fn resolve_manifest_path(config: &Config, config_path: &Path) -> PathBuf {
    std::env::var("CTXRES_WORKSPACE_MANIFEST")
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| {
            resolve_relative(config.workspace.manifest.as_ref(), config_path, "workspace.yaml")
        })
}

/// Resolve the connectors file path (`connectors.json` next to the config file by default).
pub fn resolve_connectors_path(config: &Config, config_path: &Path) -> PathBuf {
    resolve_relative(config.workspace.connectors.as_ref(), config_path, "connectors.json")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_resolver_settings() {
        let r = ResolverConfig::default();
        assert_eq!(r.max_skills, 3);
        assert_eq!(r.match_mode, MatchMode::Stemmed);
        assert_eq!(r.capability_timeout_ms, 2000);
    }

    #[test]
    fn partial_json_fills_defaults() {
        let c: Config =
            serde_json::from_str(r#"{"resolver":{"matchMode":"exact"},"tools":{}}"#).unwrap();
        assert_eq!(c.resolver.match_mode, MatchMode::Exact);
        assert_eq!(c.resolver.max_skills, 3);
        assert!(c.tools.builtin.iter().any(|t| t == "edit"));
        assert_eq!(c.resolver_options().max_skills, 3);
    }

    #[test]
    fn resolve_connectors_default() {
        let config = Config::default();
        let path = Path::new("/home/user/.ctxres/config.json");
        assert_eq!(
            resolve_connectors_path(&config, path),
            PathBuf::from("/home/user/.ctxres/connectors.json")
        );
    }

    #[test]
    fn resolve_connectors_override_relative() {
        let mut config = Config::default();
        config.workspace.connectors = Some(PathBuf::from("mcp/connectors.yaml"));
        let path = Path::new("/home/user/.ctxres/config.json");
        assert_eq!(
            resolve_connectors_path(&config, path),
            PathBuf::from("/home/user/.ctxres/mcp/connectors.yaml")
        );
    }

    #[test]
    fn resolve_manifest_override_absolute() {
        let mut config = Config::default();
        config.workspace.manifest = Some(PathBuf::from("/repo/.github/workspace.yaml"));
        let path = Path::new("/home/user/.ctxres/config.json");
        assert_eq!(
            resolve_relative(config.workspace.manifest.as_ref(), path, "workspace.yaml"),
            PathBuf::from("/repo/.github/workspace.yaml")
        );
    }

    #[test]
    fn missing_config_file_is_default() {
        let path = std::env::temp_dir().join("ctxres-config-does-not-exist.json");
        let (config, used) = load_config(Some(path.clone())).unwrap();
        assert_eq!(used, path);
        assert_eq!(config.resolver.max_skills, 3);
    }
}
