use thiserror::Error;

use crate::kv::KvError;

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors surfaced by the webhook store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Key absent or already expired.
    #[error("key not found: {0}")]
    NotFound(String),

    /// Malformed request data or a missing required field.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// A batch item that is not a JSON object.
    #[error("item {index} must be a JSON object")]
    InvalidItemType { index: usize },

    /// Admitting the payload would push the ledger over the configured limit.
    #[error("storage limit exceeded: {current} + {candidate} bytes > {limit} bytes")]
    StorageLimitExceeded {
        current: u64,
        candidate: u64,
        limit: u64,
    },

    /// A single payload is larger than the per-item cap.
    #[error("payload too large: {size} bytes > {limit} bytes")]
    PayloadTooLarge { size: u64, limit: u64 },

    /// The key-value backend failed or returned something unusable.
    #[error("store backend error: {0}")]
    Backend(#[from] KvError),
}

impl StoreError {
    /// Stable machine-readable code, also used as the per-item failure reason.
    pub fn error_code(&self) -> &'static str {
        match self {
            StoreError::NotFound(_) => "KEY_NOT_FOUND",
            StoreError::InvalidInput(_) => "INVALID_INPUT",
            StoreError::InvalidItemType { .. } => "INVALID_ITEM_TYPE",
            StoreError::StorageLimitExceeded { .. } => "STORAGE_LIMIT_EXCEEDED",
            StoreError::PayloadTooLarge { .. } => "PAYLOAD_TOO_LARGE",
            StoreError::Backend(_) => "STORE_ERROR",
        }
    }

    /// Whether the error should abort a whole batch rather than a single item.
    pub fn is_fatal(&self) -> bool {
        matches!(self, StoreError::Backend(_))
    }
}
