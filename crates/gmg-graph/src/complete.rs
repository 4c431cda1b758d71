//! The complete (non-pruned) requirement graph.
//!
//! [`CompleteGraph`] walks the full transitive closure of requirements by
//! parsing each module's go.mod. Nothing is pruned, so for complex modules
//! this is a much bigger graph than the host's own, and operations on it can
//! take considerable time; unification can shrink it at the cost of
//! reproducibility. Manifest lookups are funneled through a batching loader
//! so that concurrent loads become few large `go list -m` invocations.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot, watch, Semaphore};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use gmg_core::{Error, ModFile, ModuleId, Result};
use gmg_toolchain::{ModuleHost, ModuleMeta, MAX_BATCH};

use crate::requirement::{ReqEdges, Requirement};
use crate::RequirementGraph;

/// How many batch-load workers run at once.
const LOAD_CONCURRENCY: usize = 1;

struct LoadRequest {
    id: ModuleId,
    reply: oneshot::Sender<Result<ModuleMeta>>,
}

/// Per-node load state. Success is sticky; an error clears the cell so a
/// concurrent or later caller can retry. This deliberately violates normal
/// once-semantics for the error case only.
enum Cell {
    /// A load is running; the receiver wakes when it concludes.
    InFlight(watch::Receiver<bool>),
    Loaded(Arc<ReqEdges>),
}

/// A lazy [`RequirementGraph`] of the complete transitive closure of
/// requirements in each module's go.mod. go.mod directives that only apply
/// to the root (replace, exclude) are ignored.
///
/// Dropping the graph (or canceling the token passed to
/// [`CompleteGraph::build`]) shuts down the batching loader; in-progress and
/// future loads then fail with a cancellation error.
pub struct CompleteGraph {
    root: Requirement,
    cells: Mutex<HashMap<Requirement, Cell>>,
    queue: mpsc::UnboundedSender<LoadRequest>,
    cancel: CancellationToken,
}

impl CompleteGraph {
    /// Start the batching loader and return the (as yet unloaded) graph.
    /// The root id must be canonical.
    pub fn build(
        host: Arc<dyn ModuleHost>,
        root: ModuleId,
        cancel: &CancellationToken,
    ) -> Result<Arc<Self>> {
        root.check()?;
        let cancel = cancel.child_token();
        let (queue, rx) = mpsc::unbounded_channel();
        tokio::spawn(batcher(host, rx, cancel.clone()));
        Ok(Arc::new(Self {
            root: Requirement::new(root),
            cells: Mutex::new(HashMap::new()),
            queue,
            cancel,
        }))
    }

    /// Request this module's metadata through the batching loader, then read
    /// and parse the manifest it points at.
    async fn fetch(&self, cancel: &CancellationToken, id: &ModuleId) -> Result<ReqEdges> {
        id.check()?;
        if self.cancel.is_cancelled() {
            return Err(Error::Canceled);
        }
        let (reply_tx, reply_rx) = oneshot::channel();
        self.queue
            .send(LoadRequest {
                id: id.clone(),
                reply: reply_tx,
            })
            .map_err(|_| Error::Canceled)?;
        let meta = tokio::select! {
            _ = cancel.cancelled() => return Err(Error::Canceled),
            reply = reply_rx => reply.map_err(|_| Error::Canceled)??,
        };
        if meta.path != id.path {
            return Err(Error::inconsistent(format!(
                "module path mismatch; got {}, want {}",
                meta.path, id.path
            )));
        }
        if meta.version != id.version {
            return Err(Error::inconsistent(format!(
                "module {} version mismatch; got {}, want {}",
                id.path, meta.version, id.version
            )));
        }
        // The manifest may have been synthesized by the module proxy for
        // legacy non-module code; it then has no requirements.
        let go_mod = meta
            .go_mod
            .as_ref()
            .ok_or_else(|| Error::inconsistent(format!("no go.mod reported for {id}")))?;
        let data = tokio::fs::read_to_string(go_mod)
            .await
            .map_err(|e| Error::io_at("failed to read go.mod", go_mod, e))?;
        let modfile = ModFile::parse(&go_mod.display().to_string(), &data)?;
        let mut edges = ReqEdges::default();
        for req in modfile.require {
            edges.insert(Requirement::new(req.id), req.indirect);
        }
        Ok(edges)
    }

    fn loaded(&self, req: &Requirement) -> Arc<ReqEdges> {
        match self.cells.lock().unwrap().get(req) {
            Some(Cell::Loaded(edges)) => edges.clone(),
            _ => panic!("module {req} not yet loaded"),
        }
    }
}

#[async_trait]
impl RequirementGraph for CompleteGraph {
    fn root(&self) -> Requirement {
        self.root.clone()
    }

    fn req(&self, id: &ModuleId) -> Option<Requirement> {
        id.check().ok()?;
        Some(Requirement::new(id.clone()))
    }

    async fn load(&self, cancel: &CancellationToken, req: &Requirement) -> Result<()> {
        loop {
            enum Next {
                Done,
                Fetch(watch::Sender<bool>),
                Wait(watch::Receiver<bool>),
            }
            let next = {
                let mut cells = self.cells.lock().unwrap();
                match cells.get(req) {
                    Some(Cell::Loaded(_)) => Next::Done,
                    Some(Cell::InFlight(rx)) => Next::Wait(rx.clone()),
                    None => {
                        let (tx, rx) = watch::channel(false);
                        cells.insert(req.clone(), Cell::InFlight(rx));
                        Next::Fetch(tx)
                    }
                }
            };
            match next {
                Next::Done => return Ok(()),
                Next::Fetch(done) => {
                    let result = self.fetch(cancel, req.id()).await;
                    let mut cells = self.cells.lock().unwrap();
                    return match result {
                        Ok(edges) => {
                            cells.insert(req.clone(), Cell::Loaded(Arc::new(edges)));
                            let _ = done.send(true);
                            Ok(())
                        }
                        Err(err) => {
                            // Clear the cell so a later caller can retry.
                            // Dropping `done` wakes the waiters.
                            cells.remove(req);
                            Err(err)
                        }
                    };
                }
                Next::Wait(mut rx) => {
                    tokio::select! {
                        _ = cancel.cancelled() => return Err(Error::Canceled),
                        // Woken by success or by the loser's cell being
                        // cleared; either way, re-examine the cell.
                        _ = rx.changed() => {}
                    }
                    // Give the failed loader a chance to report before this
                    // caller re-dispatches the same fetch.
                    tokio::task::yield_now().await;
                }
            }
        }
    }

    fn direct_reqs(&self, req: &Requirement) -> Vec<Requirement> {
        self.loaded(req).direct.iter().cloned().collect()
    }

    fn indirect_reqs(&self, req: &Requirement) -> Vec<Requirement> {
        self.loaded(req).indirect.iter().cloned().collect()
    }
}

impl Drop for CompleteGraph {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Accumulates load requests until the downstream worker is free or the
/// batch is full, then hands the batch to a bounded number of workers that
/// invoke the host's batched metadata lookup.
async fn batcher(
    host: Arc<dyn ModuleHost>,
    mut rx: mpsc::UnboundedReceiver<LoadRequest>,
    cancel: CancellationToken,
) {
    let workers_gate = Arc::new(Semaphore::new(LOAD_CONCURRENCY));
    let mut workers: JoinSet<()> = JoinSet::new();
    let mut batch: HashMap<ModuleId, oneshot::Sender<Result<ModuleMeta>>> = HashMap::new();
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            request = rx.recv(), if batch.len() < MAX_BATCH => match request {
                Some(LoadRequest { id, reply }) => {
                    batch.insert(id, reply);
                }
                None => break,
            },
            permit = workers_gate.clone().acquire_owned(), if !batch.is_empty() => {
                let permit = permit.expect("load gate is never closed");
                let ready = std::mem::take(&mut batch);
                let host = host.clone();
                let cancel = cancel.clone();
                workers.spawn(async move {
                    load_batch(host, &cancel, ready).await;
                    drop(permit);
                });
            }
        }
    }
    // Shutdown: every outstanding request gets a cancellation error.
    for (_, reply) in batch {
        let _ = reply.send(Err(Error::Canceled));
    }
    rx.close();
    while let Some(LoadRequest { reply, .. }) = rx.recv().await {
        let _ = reply.send(Err(Error::Canceled));
    }
    while workers.join_next().await.is_some() {}
}

async fn load_batch(
    host: Arc<dyn ModuleHost>,
    cancel: &CancellationToken,
    mut batch: HashMap<ModuleId, oneshot::Sender<Result<ModuleMeta>>>,
) {
    // Requesters that have gone away would not receive a result anyway.
    batch.retain(|_, reply| !reply.is_closed());
    if batch.is_empty() {
        return;
    }
    let ids: Vec<ModuleId> = batch.keys().cloned().collect();
    debug!(batch_size = ids.len(), "looking up module metadata");
    match host.module_metadata(cancel, &ids).await {
        Ok(metas) => {
            for meta in metas {
                let id = ModuleId::new(&meta.path, &meta.version);
                match batch.remove(&id) {
                    Some(reply) => {
                        let _ = reply.send(Ok(meta));
                    }
                    None => error!(module = %id, "unexpected metadata lookup result"),
                }
            }
        }
        Err(err) => error!(error = %err, "batched module metadata lookup failed"),
    }
    // Whatever the host did not report is an error for its requester.
    for (id, reply) in batch {
        let _ = reply.send(Err(Error::inconsistent(format!(
            "batch metadata lookup missing results for {id}"
        ))));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gmg_toolchain::testing::FakeHost;

    fn id(s: &str) -> ModuleId {
        ModuleId::parse(s)
    }

    #[tokio::test]
    async fn test_build_rejects_version_query() {
        let host = Arc::new(FakeHost::new().add("example.com/root@v1.0.0", &[]));
        let cancel = CancellationToken::new();
        match CompleteGraph::build(host, id("example.com/root@latest"), &cancel) {
            Err(err) => {
                assert!(err.to_string().contains("not a canonical semantic version"))
            }
            Ok(_) => panic!("a version query must not build a graph"),
        }
    }

    #[tokio::test]
    async fn test_load_and_edges() {
        let host = Arc::new(
            FakeHost::new()
                .add("example.com/dep@v1.0.0", &[])
                .add(
                    "example.com/root@v1.0.0",
                    &[
                        ("example.com/dep@v1.0.0", false),
                        ("example.com/ind@v1.0.0", true),
                    ],
                )
                .add("example.com/ind@v1.0.0", &[]),
        );
        let cancel = CancellationToken::new();
        let rg = CompleteGraph::build(host, id("example.com/root@v1.0.0"), &cancel).unwrap();
        let root = rg.root();
        rg.load(&cancel, &root).await.unwrap();
        let direct: Vec<String> = rg.direct_reqs(&root).iter().map(|r| r.to_string()).collect();
        let indirect: Vec<String> = rg
            .indirect_reqs(&root)
            .iter()
            .map(|r| r.to_string())
            .collect();
        assert_eq!(direct, ["example.com/dep@v1.0.0"]);
        assert_eq!(indirect, ["example.com/ind@v1.0.0"]);
        // Loading again is a no-op.
        rg.load(&cancel, &root).await.unwrap();
    }

    #[tokio::test]
    async fn test_missing_module_load_fails_and_is_retryable() {
        let host = Arc::new(FakeHost::new().add(
            "example.com/root@v1.0.0",
            &[("example.com/ghost@v1.0.0", false)],
        ));
        let cancel = CancellationToken::new();
        let rg = CompleteGraph::build(host, id("example.com/root@v1.0.0"), &cancel).unwrap();
        let ghost = rg.req(&id("example.com/ghost@v1.0.0")).unwrap();
        let err = rg.load(&cancel, &ghost).await.unwrap_err();
        assert!(err.to_string().contains("missing results"), "{err}");
        // The failure cleared the cell: a retry re-dispatches (and fails the
        // same way here, but does not observe a poisoned cell).
        let err = rg.load(&cancel, &ghost).await.unwrap_err();
        assert!(err.to_string().contains("missing results"), "{err}");
    }

    #[tokio::test]
    async fn test_canceled_graph_fails_loads() {
        let host = Arc::new(FakeHost::new().add("example.com/root@v1.0.0", &[]));
        let outer = CancellationToken::new();
        let rg = CompleteGraph::build(host, id("example.com/root@v1.0.0"), &outer).unwrap();
        outer.cancel();
        let caller = CancellationToken::new();
        let root = rg.root();
        let err = rg.load(&caller, &root).await.unwrap_err();
        assert!(err.is_canceled(), "{err}");
    }

    #[tokio::test]
    async fn test_caller_cancellation() {
        let host = Arc::new(FakeHost::new().add("example.com/root@v1.0.0", &[]));
        let graph_cancel = CancellationToken::new();
        let rg =
            CompleteGraph::build(host, id("example.com/root@v1.0.0"), &graph_cancel).unwrap();
        let caller = CancellationToken::new();
        caller.cancel();
        let root = rg.root();
        let err = rg.load(&caller, &root).await.unwrap_err();
        assert!(err.is_canceled(), "{err}");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_loads_collapse() {
        let host = Arc::new(
            FakeHost::new()
                .add("example.com/dep@v1.0.0", &[])
                .add("example.com/root@v1.0.0", &[("example.com/dep@v1.0.0", false)]),
        );
        let cancel = CancellationToken::new();
        let rg = CompleteGraph::build(host, id("example.com/root@v1.0.0"), &cancel).unwrap();
        let mut tasks = JoinSet::new();
        for _ in 0..8 {
            let rg = rg.clone();
            let cancel = cancel.clone();
            tasks.spawn(async move {
                let root = rg.root();
                rg.load(&cancel, &root).await
            });
        }
        while let Some(res) = tasks.join_next().await {
            res.unwrap().unwrap();
        }
        assert_eq!(rg.direct_reqs(&rg.root()).len(), 1);
    }
}
