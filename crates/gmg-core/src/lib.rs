//! Core types and utilities for gmg.
//!
//! This crate provides the module identity type, Go-flavored semantic version
//! handling, the go.mod subset reader, error types, and the toolchain process
//! runner shared across all gmg crates.

pub mod command;
pub mod error;
pub mod modfile;
pub mod module;
pub mod version;

pub use command::{CommandOutput, CommandRunner};
pub use error::{Error, Result};
pub use modfile::{ModFile, Require};
pub use module::ModuleId;
