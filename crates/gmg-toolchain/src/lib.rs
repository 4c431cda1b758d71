//! Host toolchain adapter for gmg.
//!
//! This crate defines the narrow contract the graph and resolver crates
//! consume ([`ModuleHost`]) and provides two implementations: the real Go
//! toolchain ([`GoToolchain`]) and an in-memory fake for tests
//! ([`testing::FakeHost`]).

pub mod go;
pub mod testing;

use async_trait::async_trait;
use serde::Deserialize;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;

use gmg_core::{ModuleId, Result};

pub use go::GoToolchain;

/// Largest number of module ids passed to a single batched metadata lookup,
/// chosen to stay comfortably under ARG_MAX.
pub const MAX_BATCH: usize = 500;

/// One module's metadata as reported by the host toolchain
/// (`go list -json -m`).
#[derive(Debug, Clone, Deserialize)]
pub struct ModuleMeta {
    #[serde(rename = "Path")]
    pub path: String,
    #[serde(rename = "Version", default)]
    pub version: String,
    /// Extracted module contents in the module cache, if downloaded.
    #[serde(rename = "Dir", default)]
    pub dir: Option<PathBuf>,
    /// Path of the module's go.mod. May point at a manifest synthesized by
    /// the module proxy for legacy non-module code.
    #[serde(rename = "GoMod", default)]
    pub go_mod: Option<PathBuf>,
}

/// One edge of the host's pruned requirement graph. A `None` child records a
/// parent that appeared only with language pseudo-edges (which is how a
/// module with no requirements shows up at all).
#[derive(Debug, Clone)]
pub struct GraphEdge {
    pub parent: ModuleId,
    pub child: Option<ModuleId>,
}

/// The operations the graph builders and resolvers need from the host
/// toolchain. Any command set supplying equivalents is acceptable.
#[async_trait]
pub trait ModuleHost: Send + Sync {
    /// Resolve a version query (`latest`, `v1.2`, `<v1.3.0`, ...) to a
    /// canonical version. The query is the id's version field.
    async fn resolve_version(&self, cancel: &CancellationToken, id: &ModuleId) -> Result<ModuleId>;

    /// Batched metadata lookup. Returns one record per known module; modules
    /// the host cannot resolve may be absent from the result (the caller
    /// treats missing records as an error for the affected requests).
    async fn module_metadata(
        &self,
        cancel: &CancellationToken,
        ids: &[ModuleId],
    ) -> Result<Vec<ModuleMeta>>;

    /// Populate the module cache for one module. Serialized process-wide to
    /// one concurrent download; the host toolchain misbehaves when the same
    /// module is downloaded concurrently.
    async fn download(&self, cancel: &CancellationToken, id: &ModuleId) -> Result<()>;

    /// Emit the pruned requirement graph of the given root, with language
    /// pseudo-edges already filtered and the root's empty-version spelling
    /// already mapped to `root`. Every returned id is canonical.
    async fn requirement_edges(
        &self,
        cancel: &CancellationToken,
        root: &ModuleId,
    ) -> Result<Vec<GraphEdge>>;

    /// Enumerate the host's own MVS selection for the given root (one id per
    /// selected module path, the root included).
    async fn selection(&self, cancel: &CancellationToken, root: &ModuleId) -> Result<Vec<ModuleId>>;
}

/// Resolve `latest` and other version query strings to an actual version.
/// An empty version is treated as `latest`.
pub async fn resolve_version(
    cancel: &CancellationToken,
    host: &dyn ModuleHost,
    id: &ModuleId,
) -> Result<ModuleId> {
    let mut id = id.clone();
    if id.version.is_empty() {
        id.version = "latest".to_string();
    }
    host.resolve_version(cancel, &id).await
}
