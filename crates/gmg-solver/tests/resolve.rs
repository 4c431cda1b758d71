//! End-to-end resolution scenarios against the fake module host.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use gmg_core::{ModuleId, Result};
use gmg_graph::{requirements_go, unify_requirements, CompleteGraph, GraphVisitor, RequirementGraph};
use gmg_solver::{resolve_go, resolve_mvs, resolve_sat, walk_dependencies, Dependency, DependencyGraph};
use gmg_toolchain::testing::FakeHost;

type Graph = BTreeMap<String, BTreeMap<String, bool>>;

#[derive(Default)]
struct Reconstruct {
    graph: Mutex<Graph>,
}

#[async_trait]
impl GraphVisitor<Dependency, bool> for Reconstruct {
    async fn visit_node(&self, _cancel: &CancellationToken, node: &Dependency) -> Result<bool> {
        self.graph
            .lock()
            .unwrap()
            .insert(node.to_string(), BTreeMap::new());
        Ok(true)
    }

    async fn visit_edge(
        &self,
        _cancel: &CancellationToken,
        parent: &Dependency,
        child: &Dependency,
        surprise: &bool,
    ) -> Result<()> {
        self.graph
            .lock()
            .unwrap()
            .get_mut(&parent.to_string())
            .expect("parent visited before edge")
            .insert(child.to_string(), *surprise);
        Ok(())
    }
}

async fn reconstruct(dg: DependencyGraph) -> Graph {
    let cancel = CancellationToken::new();
    let visitor = Arc::new(Reconstruct::default());
    walk_dependencies(&cancel, Arc::new(dg), visitor.clone())
        .await
        .unwrap();
    let graph = visitor.graph.lock().unwrap();
    graph.clone()
}

fn graph(entries: &[(&str, &[(&str, bool)])]) -> Graph {
    entries
        .iter()
        .map(|(node, edges)| {
            (
                node.to_string(),
                edges
                    .iter()
                    .map(|(child, surprise)| (child.to_string(), *surprise))
                    .collect(),
            )
        })
        .collect()
}

struct Case {
    root: &'static str,
    host: FakeHost,
    want_go: Graph,
    want_mvs: Graph,
    want_sat: Graph,
}

impl Case {
    fn new(root: &'static str, host: FakeHost, want_go: Graph) -> Self {
        let want_mvs = want_go.clone();
        let want_sat = want_go.clone();
        Self {
            root,
            host,
            want_go,
            want_mvs,
            want_sat,
        }
    }

    /// Expectation for the mvs and sat resolvers over the complete graph,
    /// when it differs from the host resolver's (pruning shows through).
    fn complete(mut self, want: Graph) -> Self {
        self.want_sat = want.clone();
        self.want_mvs = want;
        self
    }

    async fn check(self) {
        let cancel = CancellationToken::new();
        let host = Arc::new(self.host);
        let root = ModuleId::parse(self.root);

        let rg = Arc::new(requirements_go(&cancel, host.clone(), &root).await.unwrap());
        let dg = resolve_go(&cancel, host.clone(), rg).await.unwrap();
        assert_eq!(reconstruct(dg).await, self.want_go, "resolve_go");

        let complete: Arc<dyn RequirementGraph> =
            CompleteGraph::build(host.clone(), root.clone(), &cancel).unwrap();
        let dg = resolve_mvs(&cancel, complete.clone()).await.unwrap();
        assert_eq!(reconstruct(dg).await, self.want_mvs, "resolve_mvs");

        let complete: Arc<dyn RequirementGraph> =
            CompleteGraph::build(host.clone(), root, &cancel).unwrap();
        let dg = resolve_sat(&cancel, complete).await.unwrap();
        assert_eq!(reconstruct(dg).await, self.want_sat, "resolve_sat");
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_single_node() {
    Case::new(
        "example.com/root@v1.0.0",
        FakeHost::new().add("example.com/root@v1.0.0", &[]),
        graph(&[("example.com/root@v1.0.0", &[])]),
    )
    .check()
    .await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_simple_dep() {
    Case::new(
        "example.com/root@v1.0.0",
        FakeHost::new()
            .add("example.com/dep@v1.0.0", &[])
            .add("example.com/root@v1.0.0", &[("example.com/dep@v1.0.0", false)]),
        graph(&[
            (
                "example.com/root@v1.0.0",
                &[("example.com/dep@v1.0.0", false)],
            ),
            ("example.com/dep@v1.0.0", &[]),
        ]),
    )
    .check()
    .await;
}

/// An immediate indirect requirement whose target is also reachable through
/// a direct dependency: the root -> dep2 edge is neither a direct dep edge
/// nor a surprise.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_immediate_indirect_non_surprise() {
    Case::new(
        "example.com/root@v1.0.0",
        FakeHost::new()
            .add("example.com/dep2@v1.0.0", &[])
            .add("example.com/dep1@v1.0.0", &[("example.com/dep2@v1.0.0", false)])
            .add(
                "example.com/root@v1.0.0",
                &[
                    ("example.com/dep1@v1.0.0", false),
                    ("example.com/dep2@v1.0.0", true),
                ],
            ),
        graph(&[
            (
                "example.com/root@v1.0.0",
                &[("example.com/dep1@v1.0.0", false)],
            ),
            (
                "example.com/dep1@v1.0.0",
                &[("example.com/dep2@v1.0.0", false)],
            ),
            ("example.com/dep2@v1.0.0", &[]),
        ]),
    )
    .check()
    .await;
}

/// An indirect-only requirement with no direct path to it is a surprise.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_surprise_dep() {
    Case::new(
        "example.com/root@v1.0.0",
        FakeHost::new()
            .add("example.com/dep@v1.0.0", &[])
            .add("example.com/root@v1.0.0", &[("example.com/dep@v1.0.0", true)]),
        graph(&[
            (
                "example.com/root@v1.0.0",
                &[("example.com/dep@v1.0.0", true)],
            ),
            ("example.com/dep@v1.0.0", &[]),
        ]),
    )
    .check()
    .await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_pruned_requirement() {
    Case::new(
        "example.com/root@v1.0.0",
        FakeHost::new()
            .add("example.com/dep3@v1.0.0", &[])
            .add("example.com/dep2@v1.0.0", &[("example.com/dep3@v1.0.0", false)])
            .add("example.com/dep1@v1.0.0", &[("example.com/dep2@v1.0.0", false)])
            .add("example.com/root@v1.0.0", &[("example.com/dep1@v1.0.0", false)]),
        // The host's graph and selection omit dep3.
        graph(&[
            (
                "example.com/root@v1.0.0",
                &[("example.com/dep1@v1.0.0", false)],
            ),
            (
                "example.com/dep1@v1.0.0",
                &[("example.com/dep2@v1.0.0", false)],
            ),
            ("example.com/dep2@v1.0.0", &[]),
        ]),
    )
    // The complete graph reaches dep3, so mvs and sat select it.
    .complete(graph(&[
        (
            "example.com/root@v1.0.0",
            &[("example.com/dep1@v1.0.0", false)],
        ),
        (
            "example.com/dep1@v1.0.0",
            &[("example.com/dep2@v1.0.0", false)],
        ),
        (
            "example.com/dep2@v1.0.0",
            &[("example.com/dep3@v1.0.0", false)],
        ),
        ("example.com/dep3@v1.0.0", &[]),
    ]))
    .check()
    .await;
}

/// A dependency requires an older version of the root path; the selection
/// maps it back onto the root, forming a dependency cycle.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_cycle_via_version_bump() {
    Case::new(
        "example.com/root@v1.1.0",
        FakeHost::new()
            .add("example.com/root@v1.0.0", &[])
            .add("example.com/dep@v1.0.0", &[("example.com/root@v1.0.0", false)])
            .add("example.com/root@v1.1.0", &[("example.com/dep@v1.0.0", false)]),
        graph(&[
            (
                "example.com/root@v1.1.0",
                &[("example.com/dep@v1.0.0", false)],
            ),
            (
                "example.com/dep@v1.0.0",
                &[("example.com/root@v1.1.0", false)],
            ),
        ]),
    )
    .check()
    .await;
}

/// Resolving a unified graph with mvs: same selection as resolving the
/// complete graph directly, in this fixture.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_mvs_over_unified_graph() {
    let cancel = CancellationToken::new();
    let host = Arc::new(
        FakeHost::new()
            .add("example.com/root@v1.0.0", &[])
            .add("example.com/dep@v1.0.0", &[("example.com/root@v1.0.0", false)])
            .add("example.com/root@v1.1.0", &[("example.com/dep@v1.0.0", false)]),
    );
    let root = ModuleId::parse("example.com/root@v1.1.0");
    let complete = CompleteGraph::build(host, root, &cancel).unwrap();
    let unified = unify_requirements(&cancel, complete).await.unwrap();
    let dg = resolve_mvs(&cancel, Arc::new(unified)).await.unwrap();
    assert_eq!(
        reconstruct(dg).await,
        graph(&[
            (
                "example.com/root@v1.1.0",
                &[("example.com/dep@v1.0.0", false)],
            ),
            (
                "example.com/dep@v1.0.0",
                &[("example.com/root@v1.1.0", false)],
            ),
        ])
    );
}

/// MVS picks the maximum required version per path, even when the root asks
/// for an older one.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_mvs_selects_max_version() {
    let cancel = CancellationToken::new();
    let host = Arc::new(
        FakeHost::new()
            .add("example.com/shared@v1.0.0", &[])
            .add("example.com/shared@v1.5.0", &[])
            .add("example.com/mid@v1.0.0", &[("example.com/shared@v1.5.0", false)])
            .add(
                "example.com/root@v1.0.0",
                &[
                    ("example.com/mid@v1.0.0", false),
                    ("example.com/shared@v1.0.0", false),
                ],
            ),
    );
    let root = ModuleId::parse("example.com/root@v1.0.0");
    let complete = CompleteGraph::build(host, root, &cancel).unwrap();
    let dg = resolve_mvs(&cancel, complete).await.unwrap();
    let selected: Vec<String> = dg.all().iter().map(|d| d.to_string()).collect();
    assert_eq!(
        selected,
        [
            "example.com/mid@v1.0.0",
            "example.com/root@v1.0.0",
            "example.com/shared@v1.5.0",
        ]
    );
    // The root's shared@v1.0.0 requirement is satisfied by v1.5.0.
    assert_eq!(
        dg.selected(&ModuleId::parse("example.com/shared@v1.0.0"))
            .unwrap()
            .to_string(),
        "example.com/shared@v1.5.0"
    );
    // A requirement above the selected version is not satisfied.
    assert!(dg
        .selected(&ModuleId::parse("example.com/shared@v2.0.0"))
        .is_none());
}

/// The surprise partition: surprises are disjoint from the transitive
/// direct-dependency closure.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_surprise_disjoint_from_direct_closure() {
    let cancel = CancellationToken::new();
    let host = Arc::new(
        FakeHost::new()
            .add("example.com/deep@v1.0.0", &[])
            .add("example.com/tool@v1.0.0", &[])
            .add("example.com/lib@v1.0.0", &[("example.com/deep@v1.0.0", false)])
            .add(
                "example.com/root@v1.0.0",
                &[
                    ("example.com/lib@v1.0.0", false),
                    ("example.com/deep@v1.0.0", true),
                    ("example.com/tool@v1.0.0", true),
                ],
            ),
    );
    let root = ModuleId::parse("example.com/root@v1.0.0");
    let complete = CompleteGraph::build(host, root, &cancel).unwrap();
    let dg = resolve_mvs(&cancel, complete).await.unwrap();
    let root_dep = dg.root();
    let surprises: Vec<String> = dg
        .surprise_deps(&root_dep)
        .iter()
        .map(|d| d.to_string())
        .collect();
    // deep is reachable via lib, so only tool is a surprise.
    assert_eq!(surprises, ["example.com/tool@v1.0.0"]);

    // And no surprise is in the direct closure.
    let mut closure = Vec::new();
    let mut queue = vec![root_dep];
    while let Some(d) = queue.pop() {
        for child in dg.direct_deps(&d).unwrap() {
            if !closure.contains(&child) {
                closure.push(child.clone());
                queue.push(child);
            }
        }
    }
    for s in &surprises {
        assert!(!closure.iter().any(|c| &c.to_string() == s));
    }
}
