//! Crate-level error type

use thiserror::Error;

use crate::registry::{ConfigError, RegistryError};
use crate::session::SourceError;

/// Result type for fan-out operations
pub type Result<T> = std::result::Result<T, Error>;

/// Any error surfaced by this crate
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Source(#[from] SourceError),

    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
}
