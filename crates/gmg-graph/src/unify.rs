//! Requirement version unification.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use gmg_core::{version, ModuleId, Result};

use crate::graph::{walk_requirements, MemoryGraph};
use crate::requirement::{ReqEdges, Requirement};
use crate::walk::GraphVisitor;
use crate::RequirementGraph;

/// Rewrite the graph so that every requirement uses the newest version of
/// each module path encountered during the walk. Paths through older module
/// versions are skipped, so the output can be much smaller than the input;
/// feeding a complete graph through unification before MVS avoids loading
/// manifests behind stale versions.
///
/// Warning: unification can turn an acyclic graph into a cyclic one
/// (`X@v1.1 -> Y -> X@v1.0` becomes `X@v1.1 -> Y -> X@v1.1`).
///
/// Warning: because some input edges are pruned, newer versions of other
/// modules required behind them can become unreachable. The resulting
/// selection still satisfies every requirement of the output graph, but
/// which graph comes out depends on traversal order, and the walk is
/// non-deterministic. Do not use this when reproducibility matters.
pub async fn unify_requirements(
    cancel: &CancellationToken,
    rg: Arc<dyn RequirementGraph>,
) -> Result<MemoryGraph> {
    let mut max = HashMap::new();
    let mut current = rg;
    loop {
        let (unified, restart, carry) = unify_pass(cancel, current, max).await?;
        max = carry;
        if restart {
            debug!("unify: newer versions were discovered mid-walk; re-walking");
            current = Arc::new(unified);
            continue;
        }
        return Ok(unified);
    }
}

/// One bounded walk. Returns the partially unified graph and whether a newer
/// version of an already-encountered module was seen (in which case the
/// caller re-walks the partial result exactly once more rather than
/// restarting mid-flight over and over).
async fn unify_pass(
    cancel: &CancellationToken,
    rg: Arc<dyn RequirementGraph>,
    max: HashMap<String, String>,
) -> Result<(MemoryGraph, bool, HashMap<String, String>)> {
    let root_id = rg.root().id().clone();
    let visitor = Arc::new(UnifyVisitor {
        root_id: root_id.clone(),
        state: Mutex::new(UnifyState {
            max,
            nodes: HashMap::new(),
            root: None,
            restart: false,
        }),
    });
    let start = rg.root();
    walk_requirements(cancel, rg, start, visitor.clone()).await?;
    let state = std::mem::take(&mut *visitor.state.lock().unwrap());
    let root = state
        .root
        .expect("the walk always visits the start node, which is the root");
    Ok((
        MemoryGraph::from_parts(root, state.nodes),
        state.restart,
        state.max,
    ))
}

struct UnifyVisitor {
    root_id: ModuleId,
    state: Mutex<UnifyState>,
}

#[derive(Default)]
struct UnifyState {
    /// Newest observed version per module path.
    max: HashMap<String, String>,
    nodes: HashMap<Requirement, ReqEdges>,
    root: Option<Requirement>,
    restart: bool,
}

#[async_trait]
impl GraphVisitor<Requirement, bool> for UnifyVisitor {
    async fn visit_node(&self, _cancel: &CancellationToken, node: &Requirement) -> Result<bool> {
        let id = node.id();
        let mut state = self.state.lock().unwrap();
        if let Some(newest) = state.max.get(&id.path) {
            match version::compare(&id.version, newest) {
                std::cmp::Ordering::Less => {
                    // An older version; the newest version's own edges cover
                    // this subtree.
                    return Ok(false);
                }
                std::cmp::Ordering::Greater => {
                    debug!(old = %newest, new = %id, "unify: version bump");
                    state.restart = true;
                }
                // Equal can happen when re-walking a partially unified
                // graph; the walker never visits the same node twice within
                // one walk, so continuing is safe.
                std::cmp::Ordering::Equal => {}
            }
        }
        state.max.insert(id.path.clone(), id.version.clone());
        state.nodes.entry(node.clone()).or_default();
        if *id == self.root_id {
            state.root = Some(node.clone());
        }
        Ok(true)
    }

    async fn visit_edge(
        &self,
        _cancel: &CancellationToken,
        parent: &Requirement,
        child: &Requirement,
        indirect: &bool,
    ) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        let parent_id = parent.id();
        if state.max.get(&parent_id.path).map(String::as_str) != Some(parent_id.version.as_str()) {
            // The parent was the newest observed version when this edge was
            // queued, but a newer one has been discovered since. The walk
            // will reach these children through the newer parent.
            debug!(parent = %parent, child = %child, "unify: ignoring edge from stale parent");
            return Ok(());
        }
        let mut child_id = child.id().clone();
        if let Some(newest) = state.max.get(&child_id.path) {
            child_id.version = newest.clone();
        }
        let unified_child = Requirement::new(child_id);
        state
            .nodes
            .get_mut(parent)
            .expect("a non-stale parent was recorded by its node visit")
            .insert(unified_child, *indirect);
        Ok(())
    }
}
