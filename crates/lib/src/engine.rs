//! Engine: registry handle + capability handle + resolver, shared by every request.
//!
//! Each resolution takes the current snapshots once on entry and runs against them to the end,
//! so reloads and capability refreshes never mix into an in-flight request.

use anyhow::{Context, Result};
use std::path::Path;
use std::time::Duration;

use crate::bundle::ContextBundle;
use crate::capabilities::{
    refresh_capabilities, CapabilityHandle, CapabilityIndex, CapabilitySource,
};
use crate::config::{self, Config};
use crate::error::{LoadError, RefreshError, ResolveError};
use crate::primitives::{ConnectorDescriptor, WorkspaceRecords};
use crate::registry::RegistryHandle;
use crate::resolver::{CancelToken, ResolutionRequest, Resolver, ResolverOptions};
use crate::trigger::{self, MatchLimit, SkillMatch};
use crate::workspace;

#[derive(Clone)]
pub struct Engine {
    registry: RegistryHandle,
    capabilities: CapabilityHandle,
    resolver: Resolver,
}

impl Engine {
    /// Build an engine from in-memory records. Non-fatal load errors are returned for reporting.
    pub fn new(
        records: WorkspaceRecords,
        connectors: Vec<ConnectorDescriptor>,
        options: ResolverOptions,
    ) -> Result<(Self, Vec<LoadError>), LoadError> {
        let (registry, errors) = RegistryHandle::load(records)?;
        Ok((
            Self {
                registry,
                capabilities: CapabilityHandle::new(CapabilityIndex::new(connectors)),
                resolver: Resolver::new(options),
            },
            errors,
        ))
    }

    /// Load the manifest and connectors named by `config` (paths relative to `config_path`).
    /// Records that fail to decode are reported with the registry's own load errors.
    pub fn open(config: &Config, config_path: &Path) -> Result<(Self, Vec<LoadError>)> {
        let manifest = config::resolve_manifest_path(config, config_path);
        let connectors = config::resolve_connectors_path(config, config_path);
        let (records, mut errors) = workspace::load_manifest(&manifest)?;
        let descriptors = workspace::load_connectors(&connectors)?;
        let (engine, load_errors) = Self::new(records, descriptors, config.resolver_options())
            .with_context(|| format!("loading workspace {}", manifest.display()))?;
        errors.extend(load_errors);
        Ok((engine, errors))
    }

    /// Re-read the manifest at `path` and swap it in. Fatal problems keep the current snapshot.
    pub fn reload_from(&self, path: &Path) -> Result<Vec<LoadError>> {
        let (records, mut errors) = workspace::load_manifest(path)?;
        let load_errors = self
            .reload(records)
            .with_context(|| format!("reloading workspace {}", path.display()))?;
        errors.extend(load_errors);
        Ok(errors)
    }

    pub fn registry(&self) -> &RegistryHandle {
        &self.registry
    }

    pub fn capabilities(&self) -> &CapabilityHandle {
        &self.capabilities
    }

    pub fn resolve(&self, request: &ResolutionRequest) -> Result<ContextBundle, ResolveError> {
        self.resolve_with_cancel(request, &CancelToken::new())
    }

    pub fn resolve_with_cancel(
        &self,
        request: &ResolutionRequest,
        cancel: &CancelToken,
    ) -> Result<ContextBundle, ResolveError> {
        let registry = self.registry.current();
        let capabilities = self.capabilities.current();
        self.resolver
            .resolve(&registry, &capabilities, request, cancel)
    }

    /// Rank skills for `text` without building a bundle.
    pub fn match_skills(&self, text: &str, limit: MatchLimit) -> Vec<SkillMatch> {
        let registry = self.registry.current();
        trigger::match_skills(
            text,
            registry.skills.values(),
            self.resolver.options().match_mode,
            limit,
        )
    }

    /// Swap in a new record set. See `RegistryHandle::reload`.
    pub fn reload(&self, records: WorkspaceRecords) -> Result<Vec<LoadError>, LoadError> {
        self.registry.reload(records)
    }

    pub async fn refresh_capabilities(
        &self,
        source: &dyn CapabilitySource,
        timeout: Duration,
    ) -> Result<usize, RefreshError> {
        refresh_capabilities(&self.capabilities, source, timeout).await
    }
}
