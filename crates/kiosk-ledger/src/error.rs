//! # Ledger Error Types

use kiosk_core::ErrorKind;
use thiserror::Error;

/// Result type alias for ledger calls.
pub type LedgerResult<T> = Result<T, LedgerError>;

/// Ledger call failure.
///
/// Every variant is reported under [`ErrorKind::LedgerSyncFailed`]; the
/// split only matters for the log line.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// The remote side refused or failed the call.
    #[error("Ledger sync failed: {0}")]
    SyncFailed(String),

    /// Reading or writing the backing store failed.
    #[error("Ledger I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The backing document could not be encoded or decoded.
    #[error("Ledger serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A record the call refers to does not exist.
    #[error("{entity} not found in ledger: {id}")]
    NotFound { entity: &'static str, id: String },

    /// The ledger cannot be reached at all.
    #[error("Ledger unavailable: {0}")]
    Unavailable(String),
}

impl LedgerError {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::LedgerSyncFailed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_variant_is_ledger_sync_failed() {
        let errors = [
            LedgerError::SyncFailed("rejected".into()),
            LedgerError::Unavailable("offline".into()),
            LedgerError::NotFound {
                entity: "product",
                id: "A1".into(),
            },
        ];
        for err in errors {
            assert_eq!(err.kind(), ErrorKind::LedgerSyncFailed);
        }
    }

    #[test]
    fn test_not_found_message() {
        let err = LedgerError::NotFound {
            entity: "product",
            id: "ZZ".into(),
        };
        assert_eq!(err.to_string(), "product not found in ledger: ZZ");
    }
}
