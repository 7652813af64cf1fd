//! Application-wide error types.
//!
//! Library modules use specific error types via `thiserror`
//! ([`CatalogError`], [`ConfigError`]), while the binary uses `anyhow`
//! for convenient error propagation.
//!
//! # Example
//!
//! ```ignore
//! use catalog_fusion::error::{Result, ResultExt};
//!
//! fn persist(config: &Config, path: &Path) -> Result<()> {
//!     config::save_to(config, path).with_context("while saving credentials")?;
//!     Ok(())
//! }
//! ```

use crate::catalog::domain::CatalogError;
use crate::config::ConfigError;

/// Application-wide result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level application error.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// File I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration load/save error
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Catalog access error
    #[error("Catalog error: {0}")]
    Catalog(#[from] CatalogError),

    /// Bad command-line input
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Generic error with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    /// Create an invalid argument error.
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }

    /// Add context to an error.
    pub fn context(self, ctx: impl Into<String>) -> Self {
        Self::WithContext {
            context: ctx.into(),
            source: Box::new(self),
        }
    }

    /// The catalog error at the root of this error, if any.
    pub fn catalog(&self) -> Option<&CatalogError> {
        match self {
            Error::Catalog(e) => Some(e),
            Error::WithContext { source, .. } => source.catalog(),
            _ => None,
        }
    }
}

/// Extension trait for adding context to Results.
pub trait ResultExt<T> {
    /// Add context to an error result.
    fn with_context(self, ctx: impl Into<String>) -> Result<T>;
}

impl<T> ResultExt<T> for Result<T> {
    fn with_context(self, ctx: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.context(ctx))
    }
}

impl<T> ResultExt<T> for std::result::Result<T, std::io::Error> {
    fn with_context(self, ctx: impl Into<String>) -> Result<T> {
        self.map_err(|e| Error::Io(e).context(ctx))
    }
}

impl<T> ResultExt<T> for std::result::Result<T, ConfigError> {
    fn with_context(self, ctx: impl Into<String>) -> Result<T> {
        self.map_err(|e| Error::Config(e).context(ctx))
    }
}

impl<T> ResultExt<T> for std::result::Result<T, CatalogError> {
    fn with_context(self, ctx: impl Into<String>) -> Result<T> {
        self.map_err(|e| Error::Catalog(e).context(ctx))
    }
}
