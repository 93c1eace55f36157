// ABOUTME: Error taxonomy for table replication and scheduling
// ABOUTME: Every error surfaced to a caller renders as a descriptive string

use thiserror::Error;

/// Errors produced by the replication core.
///
/// Variants map one-to-one onto the failure classes a caller has to tell
/// apart: input rejected before any mutation, a missing source object, an
/// untranslatable schema, a failed remote call, a failing source driver, or
/// unreadable persisted state.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Missing or blank identifiers, invalid schedule expression, bad config.
    #[error("{0}")]
    Validation(String),

    /// Database or table absent on the source.
    #[error("{0}")]
    NotFound(String),

    /// No columns or no derivable key.
    #[error("{0}")]
    Schema(String),

    /// Remote ingestion endpoint returned a non-success status or the
    /// request could not be delivered.
    #[error("Ingestion API error ({}): {message}", status_label(.status))]
    Transport {
        status: Option<u16>,
        message: String,
        body: Option<serde_json::Value>,
    },

    /// The source database driver failed.
    #[error("Source error: {0:#}")]
    Source(#[from] anyhow::Error),

    /// A persisted document could not be read or written.
    #[error("Persistence error: {0}")]
    Persistence(String),
}

impl SyncError {
    pub fn validation(msg: impl Into<String>) -> Self {
        SyncError::Validation(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        SyncError::NotFound(msg.into())
    }

    /// Short machine-friendly label, used in log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            SyncError::Validation(_) => "validation",
            SyncError::NotFound(_) => "not_found",
            SyncError::Schema(_) => "schema",
            SyncError::Transport { .. } => "transport",
            SyncError::Source(_) => "source",
            SyncError::Persistence(_) => "persistence",
        }
    }
}

fn status_label(status: &Option<u16>) -> String {
    match status {
        Some(code) => code.to_string(),
        None => "network".to_string(),
    }
}

pub type SyncResult<T> = std::result::Result<T, SyncError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_error_message_includes_status() {
        let err = SyncError::Transport {
            status: Some(422),
            message: "unique_keys missing".to_string(),
            body: None,
        };
        assert_eq!(
            err.to_string(),
            "Ingestion API error (422): unique_keys missing"
        );
        assert_eq!(err.kind(), "transport");
    }

    #[test]
    fn test_transport_error_without_status_is_network() {
        let err = SyncError::Transport {
            status: None,
            message: "connection refused".to_string(),
            body: None,
        };
        assert!(err.to_string().contains("(network)"));
    }

    #[test]
    fn test_validation_error_is_plain_message() {
        let err = SyncError::validation("Database name is required.");
        assert_eq!(err.to_string(), "Database name is required.");
    }
}
