//! The requirement graph abstraction and its eager implementation.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use gmg_core::{Error, ModuleId, Result};

use crate::requirement::{ReqEdges, Requirement};
use crate::walk::{walk_graph, EdgeSource, GraphVisitor};

/// A directed graph (possibly cyclic) representing the transitive closure of
/// module requirements starting at a root module.
///
/// The graph is lazy: a node's edge sets are defined only after a successful
/// [`RequirementGraph::load`] of that node. Loading is idempotent on
/// success; a failed load may be retried.
#[async_trait]
pub trait RequirementGraph: Send + Sync {
    /// The root node.
    fn root(&self) -> Requirement;

    /// The requirement in this graph with the given module id, or `None` if
    /// the id is invalid or (for eager graphs) not a member. The returned
    /// requirement is not necessarily reachable from the root.
    fn req(&self, id: &ModuleId) -> Option<Requirement>;

    /// Load the module's requirements into memory. Must return successfully
    /// before [`RequirementGraph::direct_reqs`] or
    /// [`RequirementGraph::indirect_reqs`] is called for the module.
    async fn load(&self, cancel: &CancellationToken, req: &Requirement) -> Result<()>;

    /// The requirement's own direct requirements.
    ///
    /// Together with [`RequirementGraph::indirect_reqs`] these are the edges
    /// out of the node. They can differ from the module's go.mod, because
    /// requirements may have been pruned by the host or adjusted by
    /// unification. Cycles are possible, especially after unification.
    fn direct_reqs(&self, req: &Requirement) -> Vec<Requirement>;

    /// The requirement's own immediate indirect requirements.
    fn indirect_reqs(&self, req: &Requirement) -> Vec<Requirement>;
}

/// Both edge sets of a requirement, tagged `true` for immediate indirect.
pub fn reqs(rg: &dyn RequirementGraph, r: &Requirement) -> Vec<(Requirement, bool)> {
    let mut out: Vec<(Requirement, bool)> = rg
        .direct_reqs(r)
        .into_iter()
        .map(|child| (child, false))
        .collect();
    out.extend(rg.indirect_reqs(r).into_iter().map(|child| (child, true)));
    out
}

/// An eager in-memory requirement graph. Loading is a membership check.
#[derive(Debug, Clone)]
pub struct MemoryGraph {
    root: Requirement,
    nodes: HashMap<Requirement, ReqEdges>,
}

impl MemoryGraph {
    /// Create a graph containing just the root node.
    pub fn new(root: ModuleId) -> Self {
        let root = Requirement::new(root);
        let mut nodes = HashMap::new();
        nodes.insert(root.clone(), ReqEdges::default());
        Self { root, nodes }
    }

    pub(crate) fn from_parts(root: Requirement, nodes: HashMap<Requirement, ReqEdges>) -> Self {
        debug_assert!(nodes.contains_key(&root));
        Self { root, nodes }
    }

    /// Ensure a node exists.
    pub fn insert_node(&mut self, id: ModuleId) {
        self.nodes.entry(Requirement::new(id)).or_default();
    }

    /// Add an edge, creating either endpoint as needed.
    pub fn insert_edge(&mut self, parent: &ModuleId, child: ModuleId, indirect: bool) {
        let child = Requirement::new(child);
        self.nodes.entry(child.clone()).or_default();
        self.nodes
            .entry(Requirement::new(parent.clone()))
            .or_default()
            .insert(child, indirect);
    }
}

#[async_trait]
impl RequirementGraph for MemoryGraph {
    fn root(&self) -> Requirement {
        self.root.clone()
    }

    fn req(&self, id: &ModuleId) -> Option<Requirement> {
        id.check().ok()?;
        let req = Requirement::new(id.clone());
        self.nodes.contains_key(&req).then_some(req)
    }

    async fn load(&self, _cancel: &CancellationToken, req: &Requirement) -> Result<()> {
        if !self.nodes.contains_key(req) {
            return Err(Error::inconsistent(format!(
                "module {req} is not in this requirement graph"
            )));
        }
        Ok(())
    }

    fn direct_reqs(&self, req: &Requirement) -> Vec<Requirement> {
        self.nodes
            .get(req)
            .map(|edges| edges.direct.iter().cloned().collect())
            .unwrap_or_default()
    }

    fn indirect_reqs(&self, req: &Requirement) -> Vec<Requirement> {
        self.nodes
            .get(req)
            .map(|edges| edges.indirect.iter().cloned().collect())
            .unwrap_or_default()
    }
}

/// Adapts a requirement graph to the walker's edge-source contract: edges
/// are the direct and immediate indirect requirements, colored `true` for
/// indirect.
struct ReqSource(Arc<dyn RequirementGraph>);

#[async_trait]
impl EdgeSource<Requirement, bool> for ReqSource {
    async fn load(&self, cancel: &CancellationToken, node: &Requirement) -> Result<()> {
        self.0.load(cancel, node).await
    }

    fn edges(&self, node: &Requirement) -> Result<Vec<(Requirement, bool)>> {
        Ok(reqs(self.0.as_ref(), node))
    }
}

/// Walk the requirement graph from `start`, visiting each node and edge at
/// most once in topological order. See [`walk_graph`] for the concurrency
/// and error contract.
pub async fn walk_requirements(
    cancel: &CancellationToken,
    rg: Arc<dyn RequirementGraph>,
    start: Requirement,
    visitor: Arc<dyn GraphVisitor<Requirement, bool>>,
) -> Result<()> {
    walk_graph(cancel, start, Arc::new(ReqSource(rg)), visitor).await
}

/// Collects visited nodes.
#[derive(Default)]
struct Collector {
    nodes: Mutex<Vec<Requirement>>,
}

#[async_trait]
impl GraphVisitor<Requirement, bool> for Collector {
    async fn visit_node(&self, _cancel: &CancellationToken, node: &Requirement) -> Result<bool> {
        self.nodes.lock().unwrap().push(node.clone());
        Ok(true)
    }
}

/// Every requirement reachable from the root, in topological completion
/// order. Each returned requirement has been loaded.
pub async fn all_requirements(
    cancel: &CancellationToken,
    rg: Arc<dyn RequirementGraph>,
) -> Result<Vec<Requirement>> {
    let collector = Arc::new(Collector::default());
    let start = rg.root();
    walk_requirements(cancel, rg, start, collector.clone()).await?;
    let mut nodes = collector.nodes.lock().unwrap();
    Ok(std::mem::take(&mut *nodes))
}
