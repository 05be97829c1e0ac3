/// Why a bulk write did not persist the batch.
///
/// Both variants mean the whole batch failed; they are kept apart because
/// an unreachable node and rejected documents call for different retry
/// policies upstream.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum WriteFailure {
    /// The request never got a usable answer (connect error, timeout,
    /// non-success HTTP status, node marked dead).
    #[error("backend unreachable: {0}")]
    Unreachable(String),

    /// The backend answered but flagged some of the documents as failed.
    #[error("{failed} of {total} documents rejected: {reason}")]
    Rejected {
        failed: usize,
        total: usize,
        reason: String,
    },
}

/// Errors surfaced by the shipper and its collaborators.
#[derive(thiserror::Error, Debug)]
pub enum ShipperError {
    /// No connection target could be resolved, or the configuration is
    /// unusable. Fatal to `open`.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The target index could not be confirmed or created.
    #[error("failed to prepare index {index}: {reason}")]
    IndexCreation { index: String, reason: String },

    /// The bulk write of a log batch failed.
    #[error("failed to persist logs: {0}")]
    StorageWrite(#[from] WriteFailure),

    /// A non-empty batch arrived while no backend session is open.
    #[error("log shipper is not open")]
    NotOpen,

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ShipperError {
    /// Marker used when the resolver cannot produce a connection target.
    pub const NO_CONNECTION: &'static str = "NO_CONNECTION";

    pub fn no_connection() -> Self {
        ShipperError::Configuration(Self::NO_CONNECTION.to_string())
    }
}
