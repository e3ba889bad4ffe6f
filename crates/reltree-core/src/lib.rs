//! Core dependency-tree machinery for the reltree toolkit.
//!
//! A module's RELEASE-style config file binds macros to the paths of the
//! modules it depends on. This crate parses those files into an in-memory
//! dependency tree, resolves macro references, detects version clashes
//! across the tree, and rewrites single config lines when a module's bound
//! path changes.
//!
//! This crate is fully synchronous; all file access is blocking and no
//! process-global state (in particular the working directory) is mutated.

pub mod clash;
pub mod macros;
pub mod patch;
pub mod release;
pub mod tree;

pub use clash::{clashes, ClashGroup, ClashReport};
pub use macros::MacroTable;
pub use tree::{BuildOptions, DependencyTree, ModuleNode, NodeId};
