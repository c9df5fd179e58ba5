//! Tool capability index: connector id -> capability names it exposes.
//!
//! The index is owned by the connector layer and refreshed on its own cadence; resolutions only
//! read a point-in-time snapshot. Refreshes run under a timeout and keep the previous snapshot
//! when the source fails.

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::error::RefreshError;
use crate::primitives::ConnectorDescriptor;
use crate::snapshot::SnapshotCell;

/// Immutable capability snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CapabilityIndex {
    connectors: BTreeMap<String, BTreeSet<String>>,
}

impl CapabilityIndex {
    /// Build from descriptors. Repeated connector ids merge their capability sets.
    pub fn new(descriptors: impl IntoIterator<Item = ConnectorDescriptor>) -> Self {
        let mut connectors: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        for d in descriptors {
            connectors
                .entry(d.id)
                .or_default()
                .extend(d.exposed_capabilities);
        }
        Self { connectors }
    }

    /// Union of capabilities across every connector.
    pub fn all_capabilities(&self) -> BTreeSet<String> {
        self.connectors.values().flatten().cloned().collect()
    }

    /// True when `tool` is offered: either a bare capability name exposed by any connector, or
    /// `<connectorId>/<capability>` for a connector exposing `<capability>`.
    pub fn offers(&self, tool: &str) -> bool {
        if self.connectors.values().any(|caps| caps.contains(tool)) {
            return true;
        }
        match tool.rsplit_once('/') {
            Some((connector, capability)) => self
                .connectors
                .get(connector)
                .is_some_and(|caps| caps.contains(capability)),
            None => false,
        }
    }

    pub fn connector_ids(&self) -> impl Iterator<Item = &String> {
        self.connectors.keys()
    }

    pub fn len(&self) -> usize {
        self.connectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connectors.is_empty()
    }
}

/// Shared handle to the current capability snapshot.
#[derive(Clone)]
pub struct CapabilityHandle {
    cell: SnapshotCell<CapabilityIndex>,
}

impl CapabilityHandle {
    pub fn new(index: CapabilityIndex) -> Self {
        Self {
            cell: SnapshotCell::new(index),
        }
    }

    pub fn current(&self) -> Arc<CapabilityIndex> {
        self.cell.load()
    }

    pub fn replace(&self, index: CapabilityIndex) {
        self.cell.store(index);
    }
}

impl Default for CapabilityHandle {
    fn default() -> Self {
        Self::new(CapabilityIndex::default())
    }
}

/// Where connector descriptors come from (live MCP registry, a file, a test double).
#[async_trait]
pub trait CapabilitySource: Send + Sync {
    async fn fetch(&self) -> Result<Vec<ConnectorDescriptor>>;
}

/// Reads connector descriptors from a JSON or YAML file.
pub struct FileCapabilitySource {
    path: PathBuf,
}

impl FileCapabilitySource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl CapabilitySource for FileCapabilitySource {
    async fn fetch(&self) -> Result<Vec<ConnectorDescriptor>> {
        let s = tokio::fs::read_to_string(&self.path)
            .await
            .with_context(|| format!("reading connectors from {}", self.path.display()))?;
        crate::workspace::parse_connectors(&s, &self.path)
    }
}

/// Fetch a fresh index from `source` and swap it in. On timeout or failure the previous
/// snapshot stays current.
pub async fn refresh_capabilities(
    handle: &CapabilityHandle,
    source: &dyn CapabilitySource,
    timeout: Duration,
) -> Result<usize, RefreshError> {
    let descriptors = match tokio::time::timeout(timeout, source.fetch()).await {
        Ok(Ok(d)) => d,
        Ok(Err(e)) => {
            log::warn!("capability refresh failed, keeping previous index: {:#}", e);
            return Err(RefreshError::Source(e));
        }
        Err(_) => {
            log::warn!(
                "capability refresh timed out after {:?}, keeping previous index",
                timeout
            );
            return Err(RefreshError::Timeout(timeout));
        }
    };
    let index = CapabilityIndex::new(descriptors);
    let count = index.len();
    handle.replace(index);
    log::info!("capability index refreshed: {} connector(s)", count);
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed(Vec<ConnectorDescriptor>);

    #[async_trait]
    impl CapabilitySource for Fixed {
        async fn fetch(&self) -> Result<Vec<ConnectorDescriptor>> {
            Ok(self.0.clone())
        }
    }

    struct Failing;

    #[async_trait]
    impl CapabilitySource for Failing {
        async fn fetch(&self) -> Result<Vec<ConnectorDescriptor>> {
            anyhow::bail!("connector registry unreachable")
        }
    }

    struct Slow;

    #[async_trait]
    impl CapabilitySource for Slow {
        async fn fetch(&self) -> Result<Vec<ConnectorDescriptor>> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(Vec::new())
        }
    }

    fn sample() -> CapabilityIndex {
        CapabilityIndex::new([
            ConnectorDescriptor::new("builtin", ["read", "search"]),
            ConnectorDescriptor::new("azure/azure-mcp", ["search", "deploy"]),
        ])
    }

    #[test]
    fn offers_bare_and_qualified_names() {
        let idx = sample();
        assert!(idx.offers("read"));
        assert!(idx.offers("deploy"));
        assert!(idx.offers("azure/azure-mcp/search"));
        assert!(!idx.offers("azure/azure-mcp/read"));
        assert!(!idx.offers("github/search"));
        assert!(!idx.offers("edit"));
    }

    #[test]
    fn repeated_connector_ids_merge() {
        let idx = CapabilityIndex::new([
            ConnectorDescriptor::new("builtin", ["read"]),
            ConnectorDescriptor::new("builtin", ["edit"]),
        ]);
        assert_eq!(idx.len(), 1);
        assert_eq!(
            idx.all_capabilities(),
            ["edit", "read"].iter().map(|s| s.to_string()).collect::<BTreeSet<String>>()
        );
    }

    #[tokio::test]
    async fn refresh_swaps_index() {
        let handle = CapabilityHandle::default();
        let n = refresh_capabilities(
            &handle,
            &Fixed(vec![ConnectorDescriptor::new("builtin", ["read"])]),
            Duration::from_secs(1),
        )
        .await
        .unwrap();
        assert_eq!(n, 1);
        assert!(handle.current().offers("read"));
    }

    #[tokio::test]
    async fn failed_refresh_keeps_previous_index() {
        let handle = CapabilityHandle::new(sample());
        let err = refresh_capabilities(&handle, &Failing, Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, RefreshError::Source(_)));
        assert_eq!(*handle.current(), sample());
    }

    #[tokio::test]
    async fn slow_refresh_times_out() {
        let handle = CapabilityHandle::new(sample());
        let err = refresh_capabilities(&handle, &Slow, Duration::from_millis(100))
            .await
            .unwrap_err();
        assert!(matches!(err, RefreshError::Timeout(_)));
        assert_eq!(*handle.current(), sample());
    }
}
