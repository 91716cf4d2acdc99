//! AMQP message definitions and serialization

use crate::error::{LedgerError, Result};
use crate::types::*;
use serde_json;

/// Queue the transport publishes player commands to
pub const COMMAND_QUEUE: &str = "rally_ledger.commands";

/// Topic exchange notifications are published on
pub const NOTIFICATION_EXCHANGE: &str = "rally_ledger.notifications";

/// Longest accepted name or surname
pub const MAX_NAME_LENGTH: usize = 64;

/// Message envelope with metadata
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct MessageEnvelope<T> {
    pub payload: T,
    pub correlation_id: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub routing_key: String,
}

impl<T> MessageEnvelope<T>
where
    T: serde::Serialize + serde::de::DeserializeOwned,
{
    pub fn new(payload: T, routing_key: impl Into<String>) -> Self {
        Self {
            payload,
            correlation_id: crate::utils::generate_correlation_id(),
            timestamp: chrono::Utc::now(),
            routing_key: routing_key.into(),
        }
    }

    /// Serialize the envelope to JSON bytes
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| {
            LedgerError::InternalError {
                message: format!("Failed to serialize message: {}", e),
            }
            .into()
        })
    }

    /// Deserialize envelope from JSON bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes).map_err(|e| {
            LedgerError::InternalError {
                message: format!("Failed to deserialize message: {}", e),
            }
            .into()
        })
    }
}

/// Message serialization and validation utilities
pub struct MessageUtils;

impl MessageUtils {
    /// Serialize a command request to bytes
    pub fn serialize_command(request: &CommandRequest) -> Result<Vec<u8>> {
        Self::validate_command(request)?;
        Self::serialize_message(request)
    }

    /// Deserialize a command request from bytes.
    ///
    /// Accepts either a bare request or one wrapped in a [`MessageEnvelope`].
    pub fn deserialize_command(bytes: &[u8]) -> Result<CommandRequest> {
        let request = match serde_json::from_slice::<CommandRequest>(bytes) {
            Ok(request) => request,
            Err(bare_error) => MessageEnvelope::<CommandRequest>::from_bytes(bytes)
                .map(|envelope| envelope.payload)
                .map_err(|_| LedgerError::InvalidCommand {
                    reason: format!("Failed to deserialize command: {}", bare_error),
                })?,
        };

        Self::validate_command(&request)?;
        Ok(request)
    }

    /// Structural checks that need no directory access
    pub fn validate_command(request: &CommandRequest) -> Result<()> {
        if let Command::Register { name, surname, .. } = &request.command {
            for (field, value) in [("name", name), ("surname", surname)] {
                let trimmed = value.trim();
                if trimmed.is_empty() || trimmed.chars().count() > MAX_NAME_LENGTH {
                    return Err(LedgerError::InvalidCommand {
                        reason: format!(
                            "Registration {} must be 1 to {} characters",
                            field, MAX_NAME_LENGTH
                        ),
                    }
                    .into());
                }
            }
        }

        if let Command::MatchHistory { limit } = request.command {
            if limit == 0 {
                return Err(LedgerError::InvalidCommand {
                    reason: "History limit must be positive".to_string(),
                }
                .into());
            }
        }

        Ok(())
    }

    /// Wrap a notification for publishing
    pub fn serialize_notification(notification: &Notification) -> Result<Vec<u8>> {
        MessageEnvelope::new(notification.clone(), notification.kind.routing_key()).to_bytes()
    }

    /// Serialize any AMQP message to bytes
    pub fn serialize_message<T: serde::Serialize>(message: &T) -> Result<Vec<u8>> {
        serde_json::to_vec(message).map_err(|e| {
            LedgerError::InternalError {
                message: format!("Failed to serialize message: {}", e),
            }
            .into()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn request(command: Command) -> CommandRequest {
        CommandRequest {
            actor: 42,
            username: Some("alice".to_string()),
            command,
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn test_deserialize_bare_command() {
        let json = r#"{
            "actor": 7,
            "command": {"type": "submit_match", "opponent_index": "123456", "score": "3-1"},
            "timestamp": "2024-05-01T12:00:00Z"
        }"#;

        let parsed = MessageUtils::deserialize_command(json.as_bytes()).unwrap();
        assert_eq!(parsed.actor, 7);
        assert_eq!(parsed.username, None);
        assert_eq!(
            parsed.command,
            Command::SubmitMatch {
                opponent_index: "123456".to_string(),
                score: "3-1".to_string(),
            }
        );
    }

    #[test]
    fn test_deserialize_enveloped_command() {
        let envelope = MessageEnvelope::new(request(Command::ConfirmMatch { match_id: 9 }), "cmd");
        let bytes = envelope.to_bytes().unwrap();

        let parsed = MessageUtils::deserialize_command(&bytes).unwrap();
        assert_eq!(parsed.command, Command::ConfirmMatch { match_id: 9 });
    }

    #[test]
    fn test_history_limit_defaults() {
        let json = r#"{"actor": 1, "command": {"type": "match_history"}, "timestamp": "2024-05-01T12:00:00Z"}"#;
        let parsed = MessageUtils::deserialize_command(json.as_bytes()).unwrap();
        assert_eq!(parsed.command, Command::MatchHistory { limit: 10 });
    }

    #[test]
    fn test_command_validation() {
        assert!(MessageUtils::validate_command(&request(Command::MyStats)).is_ok());

        let blank_name = request(Command::Register {
            name: "  ".to_string(),
            surname: "Smith".to_string(),
            position: Position::Student,
        });
        assert!(MessageUtils::validate_command(&blank_name).is_err());

        let zero_limit = request(Command::MatchHistory { limit: 0 });
        assert!(MessageUtils::validate_command(&zero_limit).is_err());
    }

    #[test]
    fn test_garbage_is_rejected() {
        assert!(MessageUtils::deserialize_command(b"not json").is_err());
        assert!(MessageUtils::deserialize_command(br#"{"actor": 1}"#).is_err());
    }

    #[test]
    fn test_notification_envelope_routing() {
        let notification =
            Notification::new(5, NotificationKind::MatchConfirmed, "Game confirmed!").for_match(3);
        let bytes = MessageUtils::serialize_notification(&notification).unwrap();

        let envelope = MessageEnvelope::<Notification>::from_bytes(&bytes).unwrap();
        assert_eq!(envelope.routing_key, "notification.match.confirmed");
        assert_eq!(envelope.payload.match_id, Some(3));
        assert!(!envelope.correlation_id.is_empty());
    }
}
