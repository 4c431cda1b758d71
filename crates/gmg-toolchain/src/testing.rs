//! In-memory module host for tests.
//!
//! [`FakeHost`] stands in for the Go toolchain so that graph and resolver
//! tests run without a Go installation or a module proxy. Manifests are
//! materialized as real go.mod files in a temporary directory, which keeps
//! the lazy graph's manifest-reading path honest.

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::path::PathBuf;

use async_trait::async_trait;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

use gmg_core::{version, Error, ModFile, ModuleId, Require, Result};

use crate::{GraphEdge, ModuleHost, ModuleMeta};

/// A fake module host populated with a fixed set of modules.
///
/// Construction is panicky by design; this type exists for test setup only.
pub struct FakeHost {
    dir: TempDir,
    mods: BTreeMap<ModuleId, FakeModule>,
}

struct FakeModule {
    manifest: ModFile,
    go_mod: PathBuf,
}

impl FakeHost {
    pub fn new() -> Self {
        Self {
            dir: tempfile::tempdir().expect("create fake host directory"),
            mods: BTreeMap::new(),
        }
    }

    /// Add a module. `id` has the form `path@version`; each requirement is a
    /// `(path@version, indirect)` pair. A module with no requirements mimics
    /// a proxy-synthesized manifest when `go_version` is absent, but tests
    /// rarely care; every fake module gets a language directive by default.
    pub fn add(mut self, id: &str, requires: &[(&str, bool)]) -> Self {
        let id = ModuleId::parse(id);
        id.check().expect("fake module id must be canonical");
        let manifest = ModFile {
            module: id.path.clone(),
            go_version: Some("1.26.0".to_string()),
            require: requires
                .iter()
                .map(|(req, indirect)| Require {
                    id: ModuleId::parse(req),
                    indirect: *indirect,
                })
                .collect(),
        };
        let file_name = format!("{}.mod", id.to_string().replace('/', "_"));
        let go_mod = self.dir.path().join(file_name);
        std::fs::write(&go_mod, manifest.filtered()).expect("write fake go.mod");
        self.mods.insert(id, FakeModule { manifest, go_mod });
        self
    }

    /// Add a synthetic module: a manifest with only the module directive,
    /// the way a proxy synthesizes go.mod for legacy non-module code.
    pub fn add_synthetic(mut self, id: &str) -> Self {
        let id = ModuleId::parse(id);
        id.check().expect("fake module id must be canonical");
        let manifest = ModFile {
            module: id.path.clone(),
            go_version: None,
            require: Vec::new(),
        };
        let file_name = format!("{}.mod", id.to_string().replace('/', "_"));
        let go_mod = self.dir.path().join(file_name);
        std::fs::write(&go_mod, manifest.filtered()).expect("write fake go.mod");
        self.mods.insert(id, FakeModule { manifest, go_mod });
        self
    }

    fn module(&self, id: &ModuleId) -> Result<&FakeModule> {
        self.mods
            .get(id)
            .ok_or_else(|| Error::CommandFailed {
                command: format!("go list -json -m {id}"),
                exit_code: Some(1),
                stderr: format!("module {id}: not found"),
            })
    }

    /// The pruned requirement graph: the root's requirement edges plus the
    /// requirement edges of every module listed in the root's own manifest.
    /// Manifests of deeper modules are not loaded, which is what elides
    /// their requirements from the graph.
    fn pruned_edges(&self, root: &ModuleId) -> Result<Vec<GraphEdge>> {
        let root_manifest = &self.module(root)?.manifest;
        let mut expand: Vec<ModuleId> = vec![root.clone()];
        for req in &root_manifest.require {
            if req.id != *root && !expand.contains(&req.id) {
                expand.push(req.id.clone());
            }
        }
        let mut edges = Vec::new();
        for id in expand {
            let manifest = &self.module(&id)?.manifest;
            // Every module has a language pseudo-edge in the real output;
            // its trace here is a childless entry registering the node.
            edges.push(GraphEdge {
                parent: id.clone(),
                child: None,
            });
            for req in &manifest.require {
                edges.push(GraphEdge {
                    parent: id.clone(),
                    child: Some(req.id.clone()),
                });
            }
        }
        Ok(edges)
    }
}

impl Default for FakeHost {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ModuleHost for FakeHost {
    async fn resolve_version(&self, _cancel: &CancellationToken, id: &ModuleId) -> Result<ModuleId> {
        if id.version == "latest" {
            let newest = self
                .mods
                .keys()
                .filter(|m| m.path == id.path)
                .max_by(|a, b| version::compare(&a.version, &b.version))
                .ok_or_else(|| Error::inconsistent(format!("no versions of {}", id.path)))?;
            return Ok(newest.clone());
        }
        self.module(id).map(|_| id.clone())
    }

    async fn module_metadata(
        &self,
        _cancel: &CancellationToken,
        ids: &[ModuleId],
    ) -> Result<Vec<ModuleMeta>> {
        // Unknown modules are silently absent, which exercises the batch
        // loader's missing-results path.
        Ok(ids
            .iter()
            .filter_map(|id| {
                self.mods.get(id).map(|m| ModuleMeta {
                    path: id.path.clone(),
                    version: id.version.clone(),
                    dir: None,
                    go_mod: Some(m.go_mod.clone()),
                })
            })
            .collect())
    }

    async fn download(&self, _cancel: &CancellationToken, id: &ModuleId) -> Result<()> {
        self.module(id).map(|_| ())
    }

    async fn requirement_edges(
        &self,
        _cancel: &CancellationToken,
        root: &ModuleId,
    ) -> Result<Vec<GraphEdge>> {
        self.pruned_edges(root)
    }

    async fn selection(&self, _cancel: &CancellationToken, root: &ModuleId) -> Result<Vec<ModuleId>> {
        // MVS over the pruned graph: walk it from the root, keeping the
        // maximum version seen per path.
        let edges = self.pruned_edges(root)?;
        let mut adjacent: HashMap<ModuleId, Vec<ModuleId>> = HashMap::new();
        for edge in &edges {
            let entry = adjacent.entry(edge.parent.clone()).or_default();
            if let Some(child) = &edge.child {
                entry.push(child.clone());
            }
        }
        let mut selected: HashMap<String, String> = HashMap::new();
        let mut queue = VecDeque::from([root.clone()]);
        let mut seen: HashSet<ModuleId> = HashSet::from([root.clone()]);
        while let Some(id) = queue.pop_front() {
            let newer = match selected.get(&id.path) {
                Some(cur) => version::compare(&id.version, cur).is_gt(),
                None => true,
            };
            if newer {
                selected.insert(id.path.clone(), id.version.clone());
            }
            for child in adjacent.get(&id).cloned().unwrap_or_default() {
                if seen.insert(child.clone()) {
                    queue.push_back(child);
                }
            }
        }
        let mut ids: Vec<ModuleId> = selected
            .into_iter()
            .map(|(path, ver)| ModuleId::new(path, ver))
            .collect();
        ids.sort();
        Ok(ids)
    }
}
