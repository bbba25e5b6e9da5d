//! Error types for assembling, rendering and exporting a site stack.

use thiserror::Error;

use crate::provision::ProvisionError;
use crate::topology::EntityId;

#[derive(Debug, Error)]
pub enum Error {
    /// invalid or missing user input. Always raised before any
    /// provisioning call is made.
    #[error("invalid configuration for '{field}': {reason}")]
    Configuration { field: String, reason: String },

    /// the assembled topology broke one of its own invariants.
    /// This is a bug in the assembler, not in the user's input.
    #[error("inconsistent topology at '{entity}': {reason}")]
    Reference { entity: String, reason: String },

    #[error("no resolved value for entity '{entity}' (needed by output '{output}')")]
    MissingResolvedValue { entity: EntityId, output: String },

    #[error("output name '{name}' is exported more than once")]
    DuplicateOutput { name: String },

    #[error("asset source '{path}': {reason}")]
    Asset { path: String, reason: String },

    #[error(transparent)]
    Provisioning(#[from] ProvisionError),

    #[error("failed to serialize template: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    pub(crate) fn config(field: &str, reason: impl Into<String>) -> Self {
        Error::Configuration { field: field.to_string(), reason: reason.into() }
    }

    pub(crate) fn reference(entity: impl ToString, reason: impl Into<String>) -> Self {
        Error::Reference { entity: entity.to_string(), reason: reason.into() }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
