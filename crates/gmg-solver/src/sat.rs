//! Resolution as a satisfiability problem.

use std::collections::HashMap;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::debug;

use gmg_core::{Error, Result};
use gmg_graph::{all_requirements, reqs, Requirement, RequirementGraph};

use crate::cnf::{lit, Formula};
use crate::dependency::{Dependency, DependencyGraph};

/// Construct a Boolean satisfiability problem from the requirement graph
/// and use a clause solver to select the dependencies.
///
/// One variable per reachable requirement; the constraints say the root is
/// selected, at most one version per module path is selected, and a
/// selected module's requirements are each satisfied by some version at
/// least as new as required. The solver minimizes the number of selected
/// modules, so the result never selects more than MVS does.
pub async fn resolve_sat(
    cancel: &CancellationToken,
    rg: Arc<dyn RequirementGraph>,
) -> Result<DependencyGraph> {
    let (formula, nodes) = encode(cancel, rg.clone()).await?;
    debug!(vars = nodes.len(), "solving dependency selection");
    let model = formula.solve_minimize().ok_or(Error::Unsatisfiable)?;
    let selected: HashMap<String, Dependency> = nodes
        .iter()
        .zip(&model)
        .filter(|(_, selected)| **selected)
        .map(|(node, _)| {
            let id = node.id().clone();
            (id.path.clone(), Dependency::new(id))
        })
        .collect();
    DependencyGraph::assemble(cancel, rg, selected).await
}

/// Encode the graph. Returns the formula and the requirement for each
/// variable, sorted by path then version so that each path's variables are
/// contiguous and every "version >= r" set is a suffix of its path group.
async fn encode(
    cancel: &CancellationToken,
    rg: Arc<dyn RequirementGraph>,
) -> Result<(Formula, Vec<Requirement>)> {
    let mut nodes = all_requirements(cancel, rg.clone()).await?;
    nodes.sort();
    let vars: HashMap<&Requirement, usize> =
        nodes.iter().enumerate().map(|(v, node)| (node, v)).collect();

    let mut formula = Formula::new(nodes.len());

    // The root module is always selected.
    let root = rg.root();
    let root_var = *vars
        .get(&root)
        .ok_or_else(|| Error::inconsistent(format!("root {root} missing from the walk")))?;
    formula.clause(vec![lit(root_var)]);

    // At most one version of each path.
    let mut group: Vec<usize> = Vec::new();
    for (v, node) in nodes.iter().enumerate() {
        group.push(v);
        let last_of_path = match nodes.get(v + 1) {
            Some(next) => next.id().path != node.id().path,
            None => true,
        };
        if last_of_path {
            if group.len() > 1 {
                formula.at_most_one(&group);
            }
            group.clear();
        }
    }

    // A selected module's requirements must each be satisfied: either the
    // module is not selected, or some sufficient version of the required
    // path is. Sort order makes the sufficient versions a contiguous range
    // starting at the required version itself.
    for (v, node) in nodes.iter().enumerate() {
        for (child, _) in reqs(rg.as_ref(), node) {
            let start = *vars.get(&child).ok_or_else(|| {
                Error::inconsistent(format!("requirement {child} missing from the walk"))
            })?;
            let mut clause = vec![-lit(v)];
            for (w, candidate) in nodes.iter().enumerate().skip(start) {
                if candidate.id().path != child.id().path {
                    break;
                }
                clause.push(lit(w));
            }
            formula.clause(clause);
        }
    }

    Ok((formula, nodes))
}
