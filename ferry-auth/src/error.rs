//! Error types for ferry-auth.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use thiserror::Error;

/// Why a provider could not hand out a credential.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// The provider has nothing to offer (unset variable, missing file).
    #[error("{provider}: {what} not found")]
    NotFound { provider: String, what: String },

    /// The credential exists but is already past its expiry.
    #[error("{provider}: token expired at {expired_at}")]
    Expired {
        provider: String,
        expired_at: DateTime<Utc>,
    },

    /// The credential source is malformed.
    #[error("{provider}: {reason}")]
    Invalid { provider: String, reason: String },

    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Every provider of a chain failed; one entry per provider, in order.
    #[error("could not retrieve token from any provider: {}", format_causes(.0))]
    Exhausted(Vec<(String, ProviderError)>),
}

fn format_causes(causes: &[(String, ProviderError)]) -> String {
    if causes.is_empty() {
        return "no providers configured".to_string();
    }
    causes
        .iter()
        .map(|(name, err)| format!("[{name}] {err}"))
        .collect::<Vec<_>>()
        .join("; ")
}

/// Convenience constructor for [`ProviderError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> ProviderError {
    ProviderError::Io {
        path: path.into(),
        source,
    }
}
