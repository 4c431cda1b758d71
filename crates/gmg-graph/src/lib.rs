//! Requirement graph construction and traversal for gmg.
//!
//! The requirements of a Go module are listed in its go.mod; transitively
//! they form a directed (and occasionally cyclic) requirement graph. This
//! crate builds that graph two ways: from the host toolchain's pruned
//! emission ([`requirements_go`]), or by walking every manifest in the
//! complete closure ([`CompleteGraph`]). It also provides the concurrent
//! topological walker the builders and resolvers share, plus requirement
//! version unification.

pub mod complete;
pub mod graph;
pub mod pruned;
pub mod requirement;
pub mod unify;
pub mod walk;

pub use complete::CompleteGraph;
pub use graph::{all_requirements, reqs, walk_requirements, MemoryGraph, RequirementGraph};
pub use pruned::{requirements_go, GoGraph};
pub use requirement::{ReqEdges, Requirement};
pub use unify::unify_requirements;
pub use walk::{walk_graph, EdgeSource, GraphVisitor};
