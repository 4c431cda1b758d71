//! Module identity.

use std::cmp::Ordering;
use std::fmt;

use crate::error::{Error, Result};
use crate::version;

/// Identifies a specific version of a specific module, or a module
/// requirement (path and minimum acceptable version).
///
/// Some uses allow [`ModuleId::version`] to be `latest`, empty (equivalent to
/// `latest`), or any other version query accepted by the host toolchain;
/// those must be resolved to a canonical version before the id passes
/// [`ModuleId::check`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ModuleId {
    /// Module path, e.g. `example.com/foo`.
    pub path: String,
    /// Semantic version, e.g. `v1.2.3`, or a version query.
    pub version: String,
}

impl ModuleId {
    /// Construct a module id from its path and version components.
    pub fn new(path: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            version: version.into(),
        }
    }

    /// Break a `path[@version]` string into its components. A missing
    /// `@version` leaves the version empty.
    pub fn parse(path_ver: &str) -> Self {
        match path_ver.split_once('@') {
            Some((path, version)) => Self::new(path, version),
            None => Self::new(path_ver, ""),
        }
    }

    /// Assert that the path is plausible and the version is a canonical
    /// semantic version (not empty, not a version query). An id that passes
    /// this check is assumed to be fully resolved.
    pub fn check(&self) -> Result<()> {
        if self.path.is_empty() {
            return Err(Error::invalid_id(self, "module path is the empty string"));
        }
        if self.path.starts_with('/') || self.path.ends_with('/') {
            return Err(Error::invalid_id(self, "module path has a leading or trailing slash"));
        }
        if self.path.chars().any(|c| c.is_whitespace() || c == '@') {
            return Err(Error::invalid_id(self, "module path contains invalid characters"));
        }
        if self.version.is_empty() {
            return Err(Error::invalid_id(self, "version is the empty string"));
        }
        if !version::is_canonical(&self.version) {
            return Err(Error::invalid_id(
                self,
                format!("version {:?} is not a canonical semantic version", self.version),
            ));
        }
        Ok(())
    }
}

impl fmt::Display for ModuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.version.is_empty() {
            write!(f, "{}", self.path)
        } else {
            write!(f, "{}@{}", self.path, self.version)
        }
    }
}

impl Ord for ModuleId {
    fn cmp(&self, other: &Self) -> Ordering {
        self.path
            .cmp(&other.path)
            .then_with(|| version::compare(&self.version, &other.version))
            .then_with(|| self.version.cmp(&other.version))
    }
}

impl PartialOrd for ModuleId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
