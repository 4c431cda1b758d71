//! Concurrent, topologically ordered graph traversal.
//!
//! [`walk_graph`] visits every node and edge reachable from a start node at
//! most once, in parallel, with the guarantee that an edge is visited only
//! after both of its endpoints' node visits have returned. The guarantee
//! holds over cyclic graphs too, which the requirement and dependency graphs
//! both can be.

use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::Hash;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use gmg_core::{Error, Result};

/// Supplies a node's outgoing edges to the walker. `edges` may only be
/// called for a node after `load` has returned successfully for it.
#[async_trait]
pub trait EdgeSource<N: Sync, E>: Send + Sync {
    /// Load the node's edges into memory (from disk, network, another
    /// process, ...). Called exactly once per descended node, after its node
    /// visit and before its outgoing edges are enumerated.
    async fn load(&self, cancel: &CancellationToken, node: &N) -> Result<()> {
        let _ = (cancel, node);
        Ok(())
    }

    /// The node's outgoing edges, each tagged with an edge color.
    fn edges(&self, node: &N) -> Result<Vec<(N, E)>>;
}

/// Receives node and edge visits from the walker. Callbacks run concurrently
/// across different nodes and edges; implementations synchronize internally.
#[async_trait]
pub trait GraphVisitor<N: Sync, E: Sync>: Send + Sync {
    /// Visit a node. Return `false` to skip loading the node and visiting
    /// its outgoing edges (edges *into* the node are still visited).
    async fn visit_node(&self, cancel: &CancellationToken, node: &N) -> Result<bool> {
        let _ = (cancel, node);
        Ok(true)
    }

    /// Visit an edge. Runs only after the node visits of both endpoints
    /// have returned.
    async fn visit_edge(&self, cancel: &CancellationToken, parent: &N, child: &N, color: &E) -> Result<()> {
        let _ = (cancel, parent, child, color);
        Ok(())
    }
}

struct QueueEntry<N, E> {
    /// `None` for the start node.
    parent: Option<N>,
    node: N,
    color: Option<E>,
    /// Keeps the queue open while this entry (and any node task spawned for
    /// it) can still enqueue more entries. The walk terminates when the last
    /// sender drops and the queue drains.
    tx: mpsc::UnboundedSender<QueueEntry<N, E>>,
}

/// Walk the graph reachable from `start`, calling the visitor's callbacks in
/// parallel under the ordering guarantee described in the module docs.
///
/// If any callback fails or the token is canceled, the walker stops
/// enqueuing work, waits for in-flight callbacks to conclude, and returns
/// the first real error it observed.
pub async fn walk_graph<N, E>(
    cancel: &CancellationToken,
    start: N,
    source: Arc<dyn EdgeSource<N, E>>,
    visitor: Arc<dyn GraphVisitor<N, E>>,
) -> Result<()>
where
    N: Clone + Eq + Hash + Debug + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    let cancel = cancel.child_token();
    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut tasks: JoinSet<Result<()>> = JoinSet::new();
    let mut walk = Walk {
        cancel: cancel.clone(),
        source,
        visitor,
        seen: HashMap::new(),
        first_err: None,
        nodes: 0,
        edges: 0,
    };
    let _ = tx.send(QueueEntry {
        parent: None,
        node: start,
        color: None,
        tx: tx.clone(),
    });
    drop(tx);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                walk.first_err.get_or_insert(Error::Canceled);
                break;
            }
            entry = rx.recv() => match entry {
                Some(entry) => walk.process(&mut tasks, entry),
                None => break,
            },
            Some(joined) = tasks.join_next(), if !tasks.is_empty() => {
                walk.record(joined);
            }
        }
    }
    // Stop accepting queued work; in-flight callbacks conclude (observing
    // the canceled token where they block) before the walk returns.
    drop(rx);
    while let Some(joined) = tasks.join_next().await {
        walk.record(joined);
    }
    debug!(nodes = walk.nodes, edges = walk.edges, "graph walk done");
    match walk.first_err {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

struct Walk<N, E> {
    cancel: CancellationToken,
    source: Arc<dyn EdgeSource<N, E>>,
    visitor: Arc<dyn GraphVisitor<N, E>>,
    /// Per-node readiness: the signal fires once the node's visit returns.
    seen: HashMap<N, watch::Receiver<bool>>,
    first_err: Option<Error>,
    nodes: usize,
    edges: usize,
}

impl<N, E> Walk<N, E>
where
    N: Clone + Eq + Hash + Debug + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    fn process(&mut self, tasks: &mut JoinSet<Result<()>>, entry: QueueEntry<N, E>) {
        let QueueEntry {
            parent,
            node,
            color,
            tx,
        } = entry;
        self.edges += 1;
        let child_ready = match self.seen.get(&node) {
            Some(ready) => ready.clone(),
            None => {
                self.nodes += 1;
                let (ready_tx, ready_rx) = watch::channel(false);
                self.seen.insert(node.clone(), ready_rx.clone());
                let cancel = self.cancel.clone();
                let source = self.source.clone();
                let visitor = self.visitor.clone();
                let node = node.clone();
                tasks.spawn(async move {
                    let descend = visitor.visit_node(&cancel, &node).await?;
                    let _ = ready_tx.send(true);
                    if descend {
                        source.load(&cancel, &node).await?;
                        for (child, color) in source.edges(&node)? {
                            let _ = tx.send(QueueEntry {
                                parent: Some(node.clone()),
                                node: child,
                                color: Some(color),
                                tx: tx.clone(),
                            });
                        }
                    }
                    Ok(())
                });
                ready_rx
            }
        };
        if let Some(parent) = parent {
            let color = color.expect("non-start queue entries always carry a color");
            let parent_ready = self
                .seen
                .get(&parent)
                .unwrap_or_else(|| {
                    panic!("parent {parent:?} was not visited before its edge to {node:?}")
                })
                .clone();
            let cancel = self.cancel.clone();
            let visitor = self.visitor.clone();
            let mut child_ready = child_ready;
            tasks.spawn(async move {
                tokio::select! {
                    _ = cancel.cancelled() => return Err(Error::Canceled),
                    ready = child_ready.wait_for(|ready| *ready) => {
                        // A dropped sender means the node visit failed; the
                        // error is reported by that task.
                        if ready.is_err() {
                            return Err(Error::Canceled);
                        }
                    }
                }
                if !*parent_ready.borrow() {
                    panic!("parent {parent:?} not visited before visiting edge to {node:?}");
                }
                visitor.visit_edge(&cancel, &parent, &node, &color).await
            });
        }
    }

    fn record(&mut self, joined: std::result::Result<Result<()>, tokio::task::JoinError>) {
        let result = match joined {
            Ok(result) => result,
            Err(join_err) => {
                if join_err.is_panic() {
                    std::panic::resume_unwind(join_err.into_panic());
                }
                return;
            }
        };
        if let Err(err) = result {
            // The first real error wins; cancellation errors triggered by it
            // must not mask it, whatever order the tasks finish in.
            let replace = match &self.first_err {
                None => true,
                Some(Error::Canceled) => !err.is_canceled(),
                Some(_) => false,
            };
            if replace {
                self.first_err = Some(err);
                self.cancel.cancel();
            }
        }
    }
}
