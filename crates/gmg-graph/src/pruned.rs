//! The host-pruned requirement graph.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use gmg_core::{Error, ModuleId, Result};
use gmg_toolchain::ModuleHost;

use crate::complete::CompleteGraph;
use crate::graph::MemoryGraph;
use crate::requirement::{ReqEdges, Requirement};
use crate::RequirementGraph;

/// A requirement graph reproducing the host toolchain's own (pruned) view.
///
/// This is the only graph the host resolver accepts: its selection oracle is
/// only consistent with the pruning the host itself performed.
#[derive(Debug)]
pub struct GoGraph(MemoryGraph);

#[async_trait]
impl RequirementGraph for GoGraph {
    fn root(&self) -> Requirement {
        self.0.root()
    }

    fn req(&self, id: &ModuleId) -> Option<Requirement> {
        self.0.req(id)
    }

    async fn load(&self, cancel: &CancellationToken, req: &Requirement) -> Result<()> {
        self.0.load(cancel, req).await
    }

    fn direct_reqs(&self, req: &Requirement) -> Vec<Requirement> {
        self.0.direct_reqs(req)
    }

    fn indirect_reqs(&self, req: &Requirement) -> Vec<Requirement> {
        self.0.indirect_reqs(req)
    }
}

/// Build a [`GoGraph`] from the host's pruned requirement-graph emission.
///
/// The emission does not say whether a requirement carries an `// indirect`
/// marker, so every edge is cross-referenced against a [`CompleteGraph`]
/// used purely as a classification oracle (its lazy loads batch up nicely
/// because the edges are classified concurrently). An edge the parent's own
/// manifest does not list is a consistency error.
pub async fn requirements_go(
    cancel: &CancellationToken,
    host: Arc<dyn ModuleHost>,
    root: &ModuleId,
) -> Result<GoGraph> {
    root.check()?;
    let oracle = CompleteGraph::build(host.clone(), root.clone(), cancel)?;
    let edges = host.requirement_edges(cancel, root).await?;

    let state = Arc::new(Mutex::new(BuildState::default()));
    let cancel = cancel.child_token();
    let mut tasks: JoinSet<Result<()>> = JoinSet::new();
    for edge in edges {
        let oracle = oracle.clone();
        let state = state.clone();
        let cancel = cancel.clone();
        let root = root.clone();
        tasks.spawn(async move {
            let indirect = match &edge.child {
                Some(child) => Some(classify(&oracle, &cancel, &edge.parent, child).await?),
                None => None,
            };
            let mut state = state.lock().unwrap();
            if edge.parent == root {
                state.root_seen = true;
            }
            let parent = Requirement::new(edge.parent);
            state.nodes.entry(parent.clone()).or_default();
            if let (Some(child), Some(indirect)) = (edge.child, indirect) {
                let child = Requirement::new(child);
                state.nodes.entry(child.clone()).or_default();
                state
                    .nodes
                    .get_mut(&parent)
                    .expect("parent inserted above")
                    .insert(child, indirect);
            }
            Ok(())
        });
    }
    let mut first_err: Option<Error> = None;
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(Ok(())) => {}
            Ok(Err(err)) => {
                let replace = match &first_err {
                    None => true,
                    Some(Error::Canceled) => !err.is_canceled(),
                    Some(_) => false,
                };
                if replace {
                    first_err = Some(err);
                    cancel.cancel();
                }
            }
            Err(join_err) => {
                if join_err.is_panic() {
                    std::panic::resume_unwind(join_err.into_panic());
                }
            }
        }
    }
    if let Some(err) = first_err {
        return Err(err);
    }

    let state = std::mem::take(&mut *state.lock().unwrap());
    if !state.root_seen {
        return Err(Error::inconsistent(format!(
            "the host's requirement graph did not contain the root node {root}"
        )));
    }
    Ok(GoGraph(MemoryGraph::from_parts(
        Requirement::new(root.clone()),
        state.nodes,
    )))
}

#[derive(Default)]
struct BuildState {
    nodes: HashMap<Requirement, ReqEdges>,
    root_seen: bool,
}

/// Whether `parent` requires `child` with an `// indirect` marker, according
/// to the parent's own manifest.
async fn classify(
    oracle: &Arc<CompleteGraph>,
    cancel: &CancellationToken,
    parent: &ModuleId,
    child: &ModuleId,
) -> Result<bool> {
    let parent_req = oracle
        .req(parent)
        .ok_or_else(|| Error::invalid_id(parent, "not a resolvable requirement"))?;
    oracle.load(cancel, &parent_req).await?;
    let child_req = Requirement::new(child.clone());
    if oracle.indirect_reqs(&parent_req).contains(&child_req) {
        return Ok(true);
    }
    if oracle.direct_reqs(&parent_req).contains(&child_req) {
        return Ok(false);
    }
    Err(Error::inconsistent(format!(
        "the host emitted a requirement not listed in go.mod: {parent} -> {child}"
    )))
}
