use miette::Diagnostic;
use thiserror::Error;

/// Unified error type for all reltree operations.
#[derive(Debug, Error, Diagnostic)]
pub enum ReltreeError {
    /// I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Site configuration file was malformed.
    #[error("Site configuration error: {message}")]
    #[diagnostic(help("Check the site TOML file for syntax errors"))]
    SiteConfig { message: String },

    /// An area name outside the site's known layout was requested.
    #[error("Unknown area: {area}")]
    #[diagnostic(help("Only the following areas are supported: {known}"))]
    UnknownArea { area: String, known: String },

    /// Macro definitions form a reference cycle and cannot be resolved.
    #[error("Macro cycle: {chain}")]
    MacroCycle { chain: String },

    /// A child module was passed to the patcher but is not a member of the
    /// parent it was claimed to belong to.
    #[error("Module not listed in this tree, can't replace it: {path}")]
    NotListed { path: String },

    /// The consistency algorithm ran out of versions to revert to.
    #[error("No consistent set found: {message}")]
    NoConsistentSet { message: String },

    /// Catch-all for miscellaneous errors.
    #[error("{message}")]
    Generic { message: String },
}

/// Convenience alias for `miette::Result<T>`.
pub type ReltreeResult<T> = miette::Result<T>;
