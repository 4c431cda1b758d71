//! Dependency resolution for gmg.
//!
//! A [`gmg_graph::RequirementGraph`] records what modules *ask for*; this
//! crate turns that into what actually gets *selected*:
//!
//! - [`resolve_go`] trusts the host toolchain's own selection output
//! - [`resolve_mvs`] runs Minimal Version Selection natively over any graph
//! - [`resolve_sat`] encodes the requirements as a satisfiability problem
//!   and minimizes the number of selected modules
//!
//! All three produce a [`DependencyGraph`], which keeps enough structure to
//! answer which selected module satisfies which requirement, and which
//! selected modules are "surprises" (satisfying only immediate indirect
//! requirements without being reachable through any direct dependency).

pub mod cnf;
pub mod dependency;
pub mod host;
pub mod mvs;
pub mod sat;

pub use dependency::{walk_dependencies, Dependency, DependencyGraph};
pub use host::resolve_go;
pub use mvs::resolve_mvs;
pub use sat::resolve_sat;
