//! Error types for achievement-ledger

use thiserror::Error;

use crate::types::AchievementStatus;

/// Errors raised by the store adapters.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("No record matched {0}")]
    NoMatch(String),

    #[error("Status of {id} changed concurrently (expected {expected})")]
    StatusConflict {
        id: String,
        expected: AchievementStatus,
    },

    #[error("Corrupt record {id}: {reason}")]
    Corrupt { id: String, reason: String },
}

/// Errors surfaced by the lifecycle and aggregation engines.
///
/// Validation, state and ownership errors are always raised before any
/// store write. `Persistence` may arrive after an earlier step of the same
/// operation already committed; `committed` then names that step and the
/// affected id so the record can be repaired by hand.
#[derive(Error, Debug)]
pub enum AchievementError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Cannot {operation} an achievement in {status} status")]
    InvalidState {
        operation: &'static str,
        status: AchievementStatus,
    },

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Persistence error during {step}: {message}{}", committed_note(.committed))]
    Persistence {
        step: &'static str,
        message: String,
        committed: Option<String>,
    },
}

fn committed_note(committed: &Option<String>) -> String {
    match committed {
        Some(done) => format!(" (already committed: {})", done),
        None => String::new(),
    }
}

impl AchievementError {
    /// Store failure on a step with nothing committed before it
    pub fn persistence(step: &'static str, err: StoreError) -> Self {
        Self::Persistence {
            step,
            message: err.to_string(),
            committed: None,
        }
    }

    /// Store failure on a step that followed an already-committed write
    pub fn partial(step: &'static str, err: StoreError, committed: String) -> Self {
        Self::Persistence {
            step,
            message: err.to_string(),
            committed: Some(committed),
        }
    }

    /// Short machine-readable kind, used in HTTP error bodies
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::NotFound(_) => "not_found",
            Self::InvalidState { .. } => "invalid_state",
            Self::Unauthorized(_) => "unauthorized",
            Self::Persistence { .. } => "persistence",
        }
    }
}

pub type Result<T, E = AchievementError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_write_message_names_committed_step() {
        let err = AchievementError::partial(
            "reference insert",
            StoreError::Database("disk full".into()),
            "content 64b7f0c2a1b2c3d4e5f60718".into(),
        );
        let msg = err.to_string();
        assert!(msg.contains("reference insert"));
        assert!(msg.contains("disk full"));
        assert!(msg.contains("already committed: content 64b7f0c2a1b2c3d4e5f60718"));
        assert_eq!(err.kind(), "persistence");
    }

    #[test]
    fn test_invalid_state_message() {
        let err = AchievementError::InvalidState {
            operation: "submit",
            status: AchievementStatus::Verified,
        };
        assert_eq!(err.to_string(), "Cannot submit an achievement in verified status");
    }
}
