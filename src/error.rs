//! Error taxonomy for remote resolution, shared dependencies and mounting.

/// Errors surfaced by the federation runtime.
///
/// One in-flight fetch hands the same error to every caller waiting on it.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FederationError {
    #[error("Failed to fetch '{uri}' for remote '{remote}': {reason}")]
    Network {
        remote: String,
        uri: String,
        reason: String,
    },

    #[error("Remote '{0}' is not registered")]
    RemoteNotFound(String),

    #[error("Remote '{remote}' does not expose '{path}'")]
    ExportNotFound { remote: String, path: String },

    #[error("Shared library '{library}' requires '{required}', available: {available}")]
    VersionMismatch {
        library: String,
        required: String,
        available: String,
    },

    #[error("Remote '{remote}' has an invalid entry: {reason}")]
    InvalidEntry { remote: String, reason: String },

    #[error("Failed to evaluate '{remote}/{path}': {reason}")]
    Evaluation {
        remote: String,
        path: String,
        reason: String,
    },

    #[error("Failed to initialize shared library '{library}': {reason}")]
    SharedInit { library: String, reason: String },

    #[error("Mount failed: {0}")]
    Mount(String),
}

impl FederationError {
    /// Network failures are the only errors a host may reasonably retry.
    pub fn is_network(&self) -> bool {
        matches!(self, FederationError::Network { .. })
    }
}

pub type Result<T, E = FederationError> = std::result::Result<T, E>;
