//! Site environment policy for the reltree toolkit.
//!
//! A site lays its modules out under per-area "work" (development) and
//! "prod" (released) root directories, parameterized by the active EPICS
//! version and platform. This crate knows those conventions: it maps area
//! names to root paths, classifies an arbitrary filesystem path back into a
//! `(module, version)` pair, and defines the total order over release tags
//! that the rest of the toolkit sorts by.

pub mod environment;
pub mod release_tag;
pub mod site;

pub use environment::{Domain, Environment};
pub use release_tag::ReleaseKey;
pub use site::SiteConfig;
