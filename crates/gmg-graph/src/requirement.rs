//! Requirement graph nodes.

use std::collections::BTreeSet;
use std::fmt;

use gmg_core::ModuleId;

/// A node in a requirement graph: the path and minimum acceptable version
/// that would appear in a go.mod `require` directive. Any greater version
/// also satisfies the requirement.
///
/// Equality is by module id; it is only semantically meaningful between
/// requirements of the same graph.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Requirement(ModuleId);

impl Requirement {
    pub fn new(id: ModuleId) -> Self {
        Self(id)
    }

    /// The required module's path and minimum acceptable version.
    pub fn id(&self) -> &ModuleId {
        &self.0
    }

    pub fn into_id(self) -> ModuleId {
        self.0
    }
}

impl fmt::Display for Requirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// A node's outgoing edges, partitioned into direct requirements and
/// immediate indirect requirements. A child appears in at most one of the
/// two sets.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReqEdges {
    pub direct: BTreeSet<Requirement>,
    pub indirect: BTreeSet<Requirement>,
}

impl ReqEdges {
    /// Insert a child into the set selected by `indirect`.
    pub fn insert(&mut self, child: Requirement, indirect: bool) {
        if indirect {
            self.indirect.insert(child);
        } else {
            self.direct.insert(child);
        }
    }
}
