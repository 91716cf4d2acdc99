//! Error types for the rating ledger service
//!
//! This module defines all error types using anyhow for consistent error handling
//! throughout the application. Domain failures are carried as [`LedgerError`]
//! inside `anyhow::Error` and classified by downcasting.

use crate::types::{MatchId, TransportId};

/// Result type alias for convenience
pub type Result<T> = anyhow::Result<T>;

/// Broad classification of a [`LedgerError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Malformed or disallowed input, rejected before any state change
    Validation,
    /// Unknown or already settled match identifier
    NotFound,
    /// Actor is not allowed to decide on the match
    NotAuthorized,
    /// Settlement stopped midway; the pending entry is retained for retry
    PartialFailure,
    /// Collaborator or infrastructure failure
    Internal,
}

impl ErrorKind {
    /// Stable label used for metrics
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Validation => "validation",
            ErrorKind::NotFound => "not_found",
            ErrorKind::NotAuthorized => "not_authorized",
            ErrorKind::PartialFailure => "partial_failure",
            ErrorKind::Internal => "internal",
        }
    }
}

/// Custom error types for specific ledger scenarios
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("A match cannot be reported against yourself")]
    SelfMatch { player: TransportId },

    #[error("Player is not registered: {player}")]
    UnregisteredPlayer { player: String },

    #[error("No player with index {index}")]
    UnknownPlayerIndex { index: String },

    #[error("Invalid score: 0-0 is not allowed")]
    DegenerateScore,

    #[error("Invalid player index '{input}': expected a 6-digit number")]
    InvalidPublicIndex { input: String },

    #[error("Invalid score '{input}': expected format like 3-1")]
    InvalidScore { input: String },

    #[error("Invalid command: {reason}")]
    InvalidCommand { reason: String },

    #[error("Player already registered: {player}")]
    DuplicatePlayer { player: TransportId },

    #[error("Game not found or already processed: {match_id}")]
    MatchNotFound { match_id: MatchId },

    #[error("Player {actor} is not authorized to decide on match {match_id}")]
    NotAuthorized { actor: TransportId, match_id: MatchId },

    #[error("Settlement of match {match_id} incomplete, retry to finish: {reason}")]
    PartialFailure { match_id: MatchId, reason: String },

    #[error("Storage operation failed: {message}")]
    StorageFailure { message: String },

    #[error("AMQP connection failed: {message}")]
    AmqpConnectionFailed { message: String },

    #[error("Configuration error: {message}")]
    ConfigurationError { message: String },

    #[error("Internal service error: {message}")]
    InternalError { message: String },
}

impl LedgerError {
    /// Classify this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            LedgerError::SelfMatch { .. }
            | LedgerError::UnregisteredPlayer { .. }
            | LedgerError::UnknownPlayerIndex { .. }
            | LedgerError::DegenerateScore
            | LedgerError::InvalidPublicIndex { .. }
            | LedgerError::InvalidScore { .. }
            | LedgerError::InvalidCommand { .. }
            | LedgerError::DuplicatePlayer { .. } => ErrorKind::Validation,
            LedgerError::MatchNotFound { .. } => ErrorKind::NotFound,
            LedgerError::NotAuthorized { .. } => ErrorKind::NotAuthorized,
            LedgerError::PartialFailure { .. } => ErrorKind::PartialFailure,
            LedgerError::StorageFailure { .. }
            | LedgerError::AmqpConnectionFailed { .. }
            | LedgerError::ConfigurationError { .. }
            | LedgerError::InternalError { .. } => ErrorKind::Internal,
        }
    }
}

/// Classify an arbitrary error, treating anything that is not a
/// [`LedgerError`] as internal
pub fn error_kind(error: &anyhow::Error) -> ErrorKind {
    error
        .downcast_ref::<LedgerError>()
        .map(LedgerError::kind)
        .unwrap_or(ErrorKind::Internal)
}
