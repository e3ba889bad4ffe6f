//! Version resolution for dependency trees: which newer releases exist for
//! each module, and the backtracking downgrade algorithm that reaches a
//! clash-free ("consistent") set of versions.
//!
//! The algorithm is a documented heuristic, not a complete solver: it only
//! rewrites locally defined references, reverting the highest conflicting
//! version one step at a time and walking upward when a clash is inherited.

pub mod candidates;
pub mod update;

pub use update::TreeUpdate;
