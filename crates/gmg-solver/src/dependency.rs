//! The dependency graph: selected modules and their relationships.

use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use gmg_core::{version, Error, ModuleId, Result};
use gmg_graph::{reqs, EdgeSource, GraphVisitor, RequirementGraph};

/// A node in a [`DependencyGraph`]: a module at the specific version that
/// was selected to satisfy one or more requirements.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Dependency(ModuleId);

impl Dependency {
    pub fn new(id: ModuleId) -> Self {
        Self(id)
    }

    /// The module's path and selected version.
    pub fn id(&self) -> &ModuleId {
        &self.0
    }
}

impl fmt::Display for Dependency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// A directed graph (often cyclic) of the modules selected to satisfy every
/// requirement in a requirement graph, organized with a similar topology.
pub struct DependencyGraph {
    rg: Arc<dyn RequirementGraph>,
    root: Dependency,
    selected: Arc<HashMap<String, Dependency>>,
    surprise: HashMap<Dependency, BTreeSet<Dependency>>,
}

impl DependencyGraph {
    /// Build the graph from a selection (one dependency per module path),
    /// computing every dependency's surprise set in parallel.
    pub(crate) async fn assemble(
        cancel: &CancellationToken,
        rg: Arc<dyn RequirementGraph>,
        selected: HashMap<String, Dependency>,
    ) -> Result<Self> {
        let selected = Arc::new(selected);
        let root_req = rg.root();
        let root = lookup(&selected, root_req.id()).ok_or_else(|| {
            Error::inconsistent(format!(
                "the root requirement {root_req} is not satisfied by the selection"
            ))
        })?;

        let cancel = cancel.child_token();
        let mut tasks: JoinSet<Result<(Dependency, BTreeSet<Dependency>)>> = JoinSet::new();
        for dep in selected.values() {
            let cancel = cancel.clone();
            let rg = rg.clone();
            let selected = selected.clone();
            let dep = dep.clone();
            tasks.spawn(async move {
                let surprise = surprise_for(&cancel, rg.as_ref(), &selected, &dep).await?;
                Ok((dep, surprise))
            });
        }
        let mut surprise = HashMap::new();
        let mut first_err: Option<Error> = None;
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Ok((dep, set))) => {
                    surprise.insert(dep, set);
                }
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
        Ok(Self {
            rg,
            root,
            selected,
            surprise,
        })
    }

    /// The dependency selected to satisfy the root requirement.
    pub fn root(&self) -> Dependency {
        self.root.clone()
    }

    /// The dependency satisfying the requirement indicated by `req`, or
    /// `None` when no selected module does (the selected version of the path
    /// must be at least the required version).
    pub fn selected(&self, req: &ModuleId) -> Option<Dependency> {
        lookup(&self.selected, req)
    }

    /// Every selected dependency: the selection set.
    pub fn all(&self) -> Vec<Dependency> {
        let mut deps: Vec<Dependency> = self.selected.values().cloned().collect();
        deps.sort();
        deps
    }

    /// The modules selected to satisfy this dependency's direct
    /// requirements. Surprise dependencies are not included.
    pub fn direct_deps(&self, dep: &Dependency) -> Result<Vec<Dependency>> {
        let req = self.rg.req(dep.id()).ok_or_else(|| {
            Error::inconsistent(format!("no corresponding requirement for dependency {dep}"))
        })?;
        self.rg
            .direct_reqs(&req)
            .into_iter()
            .map(|r| {
                self.selected(r.id()).ok_or_else(|| {
                    Error::inconsistent(format!(
                        "requirement {r} not satisfied by the selection of dependencies"
                    ))
                })
            })
            .collect()
    }

    /// This dependency's surprise dependencies: selected modules that
    /// satisfy one of its immediate indirect requirements but are not
    /// reachable from it through direct dependencies.
    pub fn surprise_deps(&self, dep: &Dependency) -> Vec<Dependency> {
        self.surprise
            .get(dep)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Direct and surprise dependencies together, tagged `true` for
    /// surprises.
    pub fn deps(&self, dep: &Dependency) -> Result<Vec<(Dependency, bool)>> {
        let mut out: Vec<(Dependency, bool)> = self
            .direct_deps(dep)?
            .into_iter()
            .map(|d| (d, false))
            .collect();
        out.extend(self.surprise_deps(dep).into_iter().map(|d| (d, true)));
        Ok(out)
    }
}

fn lookup(selected: &HashMap<String, Dependency>, req: &ModuleId) -> Option<Dependency> {
    let dep = selected.get(&req.path)?;
    if version::compare(&dep.id().version, &req.version).is_lt() {
        return None;
    }
    Some(dep.clone())
}

/// Discover one dependency's surprise set.
///
/// The selected targets of the dependency's immediate indirect requirements
/// are the needles; a breadth-first search over direct-dependency edges,
/// seeded with the direct targets, removes every needle it reaches. BFS
/// rather than DFS: a needle that is reachable at all is usually only a hop
/// or two from the direct frontier, because of how the host records
/// `// indirect` requirements.
async fn surprise_for(
    cancel: &CancellationToken,
    rg: &dyn RequirementGraph,
    selected: &HashMap<String, Dependency>,
    dep: &Dependency,
) -> Result<BTreeSet<Dependency>> {
    if cancel.is_cancelled() {
        return Err(Error::Canceled);
    }
    dep.id().check()?;
    let req = rg.req(dep.id()).ok_or_else(|| {
        Error::inconsistent(format!("no corresponding requirement for dependency {dep}"))
    })?;
    rg.load(cancel, &req).await?;

    let resolve = |r: &gmg_graph::Requirement| -> Result<Dependency> {
        lookup(selected, r.id()).ok_or_else(|| {
            Error::inconsistent(format!(
                "requirement {r} not satisfied by the selection of dependencies"
            ))
        })
    };

    let mut needles: BTreeSet<Dependency> = BTreeSet::new();
    let mut haystack: VecDeque<Dependency> = VecDeque::new();
    let mut seen: HashSet<Dependency> = HashSet::new();
    for (child, indirect) in reqs(rg, &req) {
        let target = resolve(&child)?;
        if indirect {
            needles.insert(target);
        } else {
            seen.insert(target.clone());
            haystack.push_back(target);
        }
    }
    // The dependency itself is marked seen so a dependency cycle back into
    // it does not traverse a dep -> needle edge.
    seen.insert(dep.clone());
    while let Some(current) = haystack.pop_front() {
        needles.remove(&current);
        if needles.is_empty() {
            break;
        }
        let current_req = rg.req(current.id()).ok_or_else(|| {
            Error::inconsistent(format!(
                "no corresponding requirement for dependency {current}"
            ))
        })?;
        for child in rg.direct_reqs(&current_req) {
            let target = resolve(&child)?;
            if seen.insert(target.clone()) {
                haystack.push_back(target);
            }
        }
    }
    Ok(needles)
}

/// Adapts a dependency graph to the walker: edges are the direct and
/// surprise dependencies, colored `true` for surprises.
struct DepSource(Arc<DependencyGraph>);

#[async_trait]
impl EdgeSource<Dependency, bool> for DepSource {
    fn edges(&self, node: &Dependency) -> Result<Vec<(Dependency, bool)>> {
        self.0.deps(node)
    }
}

/// Walk the dependency graph from its root, visiting each dependency and
/// edge at most once in topological order. See
/// [`gmg_graph::walk_graph`] for the concurrency and error contract.
pub async fn walk_dependencies(
    cancel: &CancellationToken,
    dg: Arc<DependencyGraph>,
    visitor: Arc<dyn GraphVisitor<Dependency, bool>>,
) -> Result<()> {
    let start = dg.root();
    gmg_graph::walk_graph(cancel, start, Arc::new(DepSource(dg)), visitor).await
}
