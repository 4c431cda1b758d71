//! The real Go toolchain adapter.

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use async_trait::async_trait;
use tempfile::TempDir;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use gmg_core::{CommandRunner, Error, ModFile, ModuleId, Result};

use crate::{GraphEdge, ModuleHost, ModuleMeta};

/// One concurrent `go mod download` across the whole process.
fn download_gate() -> &'static Semaphore {
    static GATE: OnceLock<Semaphore> = OnceLock::new();
    GATE.get_or_init(|| Semaphore::new(1))
}

/// Adapter that shells out to the `go` binary.
#[derive(Debug, Clone, Default)]
pub struct GoToolchain {
    go: Option<PathBuf>,
    env: Vec<(String, String)>,
}

impl GoToolchain {
    /// Create an adapter using `go` from `PATH`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a specific `go` executable.
    pub fn with_go_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.go = Some(path.into());
        self
    }

    /// Add an environment override for every spawned command. Tests use this
    /// to point the toolchain at a fake module proxy (`GOPROXY`, `GOMODCACHE`,
    /// `GOSUMDB=off`, ...).
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    fn go_bin(&self) -> &Path {
        self.go.as_deref().unwrap_or(Path::new("go"))
    }

    fn runner(&self, working_dir: Option<&Path>) -> CommandRunner {
        let mut runner = CommandRunner::new().with_envs(self.env.iter().cloned());
        if let Some(dir) = working_dir {
            runner = runner.with_working_dir(dir);
        }
        runner
    }

    /// `go list -json -m <args>` in the given directory, decoding the JSON
    /// record stream.
    async fn list_modules(
        &self,
        cancel: &CancellationToken,
        working_dir: Option<&Path>,
        args: &[String],
    ) -> Result<Vec<ModuleMeta>> {
        let mut cmd = vec!["list".to_string(), "-json".to_string(), "-m".to_string()];
        cmd.extend(args.iter().cloned());
        self.runner(working_dir)
            .run_json(cancel, self.go_bin(), cmd)
            .await
    }

    async fn module_info(&self, cancel: &CancellationToken, id: &ModuleId) -> Result<ModuleMeta> {
        let mut metas = self.list_modules(cancel, None, &[id.to_string()]).await?;
        if metas.len() != 1 {
            return Err(Error::inconsistent(format!(
                "got {} results for {id}, want 1",
                metas.len()
            )));
        }
        let meta = metas.remove(0);
        if meta.path != id.path {
            return Err(Error::inconsistent(format!(
                "got path {}, want {}",
                meta.path, id.path
            )));
        }
        Ok(meta)
    }

    /// Make a dummy copy of the named module in a temporary directory. The
    /// copy has no source files, just a filtered go.mod (so directives that
    /// only apply to the root module are stripped) and a copy of go.sum if
    /// the module has one. The clone stays alive as long as the returned
    /// [`TempDir`].
    async fn filtered_clone(&self, cancel: &CancellationToken, id: &ModuleId) -> Result<TempDir> {
        self.download(cancel, id).await?;
        let meta = self.module_info(cancel, id).await?;
        let tmp = tempfile::Builder::new()
            .prefix(&format!("gmg-{}-", id.to_string().replace('/', "_")))
            .tempdir()
            .map_err(|e| Error::Io {
                message: "failed to create temporary module clone".to_string(),
                path: None,
                source: e,
            })?;
        // The go.mod reported by the host may have been synthesized by the
        // proxy; it then has no requirements and copying it is still valid.
        let go_mod = meta
            .go_mod
            .as_ref()
            .ok_or_else(|| Error::inconsistent(format!("no go.mod reported for {id}")))?;
        let data = tokio::fs::read_to_string(go_mod)
            .await
            .map_err(|e| Error::io_at("failed to read go.mod", go_mod, e))?;
        let modfile = ModFile::parse(&go_mod.display().to_string(), &data)?;
        let dst = tmp.path().join("go.mod");
        tokio::fs::write(&dst, modfile.filtered())
            .await
            .map_err(|e| Error::io_at("failed to write filtered go.mod", &dst, e))?;
        // Copy go.sum when one exists; without it the toolchain re-downloads
        // modules it already has just to rebuild the sums.
        let dir = meta
            .dir
            .as_ref()
            .ok_or_else(|| Error::inconsistent(format!("missing contents of downloaded module {id}")))?;
        let go_sum = dir.join("go.sum");
        match tokio::fs::read(&go_sum).await {
            Ok(data) => {
                let dst = tmp.path().join("go.sum");
                tokio::fs::write(&dst, data)
                    .await
                    .map_err(|e| Error::io_at("failed to write go.sum", &dst, e))?;
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(Error::io_at("failed to read go.sum", &go_sum, e)),
        }
        Ok(tmp)
    }
}

/// Parse one `go mod graph` output line. Returns `None` for language
/// pseudo-edge lines that should be dropped entirely.
fn parse_graph_line(root: &ModuleId, line: &str) -> Result<Option<GraphEdge>> {
    if is_pseudo(line) {
        return Ok(None);
    }
    let (parent, child) = line
        .split_once(' ')
        .ok_or_else(|| Error::parse(format!("unexpected `go mod graph` output: {line:?}")))?;
    let mut parent_id = ModuleId::parse(parent);
    // The root module is printed without a version.
    if parent_id.path == root.path && parent_id.version.is_empty() {
        parent_id = root.clone();
    }
    parent_id.check()?;
    let child_id = if is_pseudo(child) {
        None
    } else {
        let id = ModuleId::parse(child);
        id.check()?;
        Some(id)
    };
    Ok(Some(GraphEdge {
        parent: parent_id,
        child: child_id,
    }))
}

fn is_pseudo(s: &str) -> bool {
    s.starts_with("go@") || s.starts_with("toolchain@")
}

#[async_trait]
impl ModuleHost for GoToolchain {
    async fn resolve_version(&self, cancel: &CancellationToken, id: &ModuleId) -> Result<ModuleId> {
        let metas = self
            .list_modules(cancel, None, &[id.to_string()])
            .await?;
        match metas.as_slice() {
            [meta] if meta.path == id.path => Ok(ModuleId::new(&meta.path, &meta.version)),
            [meta] => Err(Error::inconsistent(format!(
                "got path {}, want {}",
                meta.path, id.path
            ))),
            other => Err(Error::inconsistent(format!(
                "got {} results for {id}, want 1",
                other.len()
            ))),
        }
    }

    async fn module_metadata(
        &self,
        cancel: &CancellationToken,
        ids: &[ModuleId],
    ) -> Result<Vec<ModuleMeta>> {
        let args: Vec<String> = ids.iter().map(|id| id.to_string()).collect();
        self.list_modules(cancel, None, &args).await
    }

    async fn download(&self, cancel: &CancellationToken, id: &ModuleId) -> Result<()> {
        let _permit = download_gate()
            .acquire()
            .await
            .expect("download gate is never closed");
        debug!(module = %id, "downloading module");
        let id_arg = id.to_string();
        self.runner(None)
            .run_checked(cancel, self.go_bin(), ["mod", "download", id_arg.as_str()])
            .await?;
        Ok(())
    }

    async fn requirement_edges(
        &self,
        cancel: &CancellationToken,
        root: &ModuleId,
    ) -> Result<Vec<GraphEdge>> {
        let tmp = self.filtered_clone(cancel, root).await?;
        let output = self
            .runner(Some(tmp.path()))
            .run_checked(cancel, self.go_bin(), ["mod", "graph"])
            .await?;
        let mut edges = Vec::new();
        for line in output.stdout.lines() {
            debug!(line, "go mod graph output");
            if let Some(edge) = parse_graph_line(root, line)? {
                edges.push(edge);
            }
        }
        Ok(edges)
    }

    async fn selection(&self, cancel: &CancellationToken, root: &ModuleId) -> Result<Vec<ModuleId>> {
        let tmp = self.filtered_clone(cancel, root).await?;
        let metas = self
            .list_modules(cancel, Some(tmp.path()), &["all".to_string()])
            .await?;
        let mut ids = Vec::new();
        for meta in metas {
            // The dummy clone itself is listed with an empty version; it
            // stands for the root module.
            let id = if meta.path == root.path && meta.version.is_empty() {
                root.clone()
            } else {
                ModuleId::new(&meta.path, &meta.version)
            };
            id.check()?;
            ids.push(id);
        }
        Ok(ids)
    }
}
