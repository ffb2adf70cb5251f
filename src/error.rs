use std::path::PathBuf;
use thiserror::Error;

use crate::{store::StoreError, CollectionName};

/// Everything that can go wrong while migrating.
///
/// Identity errors abort the whole run. The per-collection variants are
/// recorded into that collection's result and the run moves on.
#[derive(Debug, Error)]
pub enum MigrationError {
    #[error("no account found for {0}")]
    IdentityNotFound(String),

    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("failed to read source collection {collection}: {source}")]
    SourceRead {
        collection: CollectionName,
        #[source]
        source: StoreError,
    },

    #[error("failed to read destination {path}: {source}")]
    DestinationRead {
        path: String,
        #[source]
        source: StoreError,
    },

    #[error("batch {index} of {collection} failed: {source}")]
    BatchWrite {
        collection: CollectionName,
        index: usize,
        #[source]
        source: StoreError,
    },

    #[error("validation mismatch for {collection}: {detail}")]
    ValidationMismatch {
        collection: CollectionName,
        detail: String,
    },

    #[error("failed to write snapshot {}: {source}", path.display())]
    Snapshot {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write report {}: {source}", path.display())]
    ReportWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid owner id {0:?}")]
    InvalidOwnerId(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
}

impl MigrationError {
    /// Whether this error ends the run rather than a single collection.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::IdentityNotFound(_)
                | Self::AuthenticationFailed(_)
                | Self::InvalidOwnerId(_)
                | Self::Config(_)
                | Self::Transport(_)
        )
    }
}
