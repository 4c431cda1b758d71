//! Resolution via the host toolchain's own selection output.

use std::collections::HashMap;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use gmg_core::{Error, Result};
use gmg_graph::{GoGraph, RequirementGraph};
use gmg_toolchain::ModuleHost;

use crate::dependency::{Dependency, DependencyGraph};

/// Resolve dependencies by asking the host toolchain for its own MVS
/// selection (the equivalent of `go list -m all` run in a filtered clone of
/// the root module).
///
/// Only a [`GoGraph`] is accepted: the host's selection is computed over the
/// pruning the host itself performed, and pairing it with any other
/// requirement graph would leave requirements the selection does not
/// satisfy. The type signature makes the invalid pairing unrepresentable.
pub async fn resolve_go(
    cancel: &CancellationToken,
    host: Arc<dyn ModuleHost>,
    rg: Arc<GoGraph>,
) -> Result<DependencyGraph> {
    let root = rg.root();
    let ids = host.selection(cancel, root.id()).await?;
    let mut selected = HashMap::new();
    for id in ids {
        id.check()?;
        if rg.req(&id).is_none() {
            return Err(Error::inconsistent(format!(
                "selected dependency {id} missing from requirement graph"
            )));
        }
        selected.insert(id.path.clone(), Dependency::new(id));
    }
    DependencyGraph::assemble(cancel, rg, selected).await
}
