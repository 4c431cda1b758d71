//! Native Minimal Version Selection.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use gmg_core::{version, Result};
use gmg_graph::{walk_requirements, GraphVisitor, Requirement, RequirementGraph};

use crate::dependency::{Dependency, DependencyGraph};

/// Run the Minimal Version Selection algorithm over the requirement graph:
/// for every module path, select the maximum version any reachable
/// requirement asks for.
///
/// This behaves like the host's own resolver, except it works with any
/// [`RequirementGraph`] (the host resolver only accepts the host's pruned
/// graph) and does not change behavior when the host toolchain does.
pub async fn resolve_mvs(
    cancel: &CancellationToken,
    rg: Arc<dyn RequirementGraph>,
) -> Result<DependencyGraph> {
    let visitor = Arc::new(SelectMax {
        selected: Mutex::new(HashMap::new()),
    });
    let start = rg.root();
    walk_requirements(cancel, rg.clone(), start, visitor.clone()).await?;
    let selected = std::mem::take(&mut *visitor.selected.lock().unwrap());
    DependencyGraph::assemble(cancel, rg, selected).await
}

struct SelectMax {
    selected: Mutex<HashMap<String, Dependency>>,
}

#[async_trait]
impl GraphVisitor<Requirement, bool> for SelectMax {
    async fn visit_node(&self, _cancel: &CancellationToken, node: &Requirement) -> Result<bool> {
        let id = node.id();
        let mut selected = self.selected.lock().unwrap();
        let newer = match selected.get(&id.path) {
            Some(current) => version::compare(&id.version, &current.id().version).is_gt(),
            None => true,
        };
        if newer {
            selected.insert(id.path.clone(), Dependency::new(id.clone()));
        }
        Ok(true)
    }
}
