//! Common types used throughout the rating ledger service

use crate::error::{LedgerError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Opaque identity assigned by the transport, used to route notifications
pub type TransportId = i64;

/// Identifier of a reported match
pub type MatchId = u64;

/// Number of digits in a public player index
pub const PUBLIC_INDEX_DIGITS: usize = 6;

/// Rating assigned to newly registered players
pub const DEFAULT_RATING: i32 = 1500;

/// Stable, human-shareable player identifier (a fixed-width numeric string)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PublicIndex(String);

impl PublicIndex {
    /// Validate a user-supplied index
    pub fn parse(input: &str) -> Result<Self> {
        let trimmed = input.trim();
        if trimmed.len() != PUBLIC_INDEX_DIGITS || !trimmed.bytes().all(|b| b.is_ascii_digit()) {
            return Err(LedgerError::InvalidPublicIndex {
                input: input.to_string(),
            }
            .into());
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for PublicIndex {
    type Error = anyhow::Error;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<PublicIndex> for String {
    fn from(index: PublicIndex) -> Self {
        index.0
    }
}

impl std::fmt::Display for PublicIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Affiliation a player declares at registration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Position {
    Student,
    Staff,
    Professor,
    Other,
}

impl std::fmt::Display for Position {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Position::Student => write!(f, "Student"),
            Position::Staff => write!(f, "Staff"),
            Position::Professor => write!(f, "Professor"),
            Position::Other => write!(f, "Other"),
        }
    }
}

impl FromStr for Position {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "student" => Ok(Position::Student),
            "staff" => Ok(Position::Staff),
            "professor" => Ok(Position::Professor),
            "other" => Ok(Position::Other),
            _ => Err(anyhow::anyhow!("Unknown position: {}", s)),
        }
    }
}

/// A registered player
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Player {
    pub transport_id: TransportId,
    pub public_index: PublicIndex,
    pub name: String,
    pub surname: String,
    pub position: Position,
    pub rating: i32,
    pub games_played: u32,
    pub registered_at: DateTime<Utc>,
}

impl Player {
    pub fn display_name(&self) -> String {
        format!("{} {}", self.name, self.surname)
    }
}

/// Raw score pair of a reported match, reporter's score first
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreLine {
    pub reporter: u32,
    pub opponent: u32,
}

impl ScoreLine {
    pub fn new(reporter: u32, opponent: u32) -> Self {
        Self { reporter, opponent }
    }

    /// Total points played; widened so two `u32` sides never overflow
    pub fn total(&self) -> u64 {
        u64::from(self.reporter) + u64::from(self.opponent)
    }

    /// A 0-0 report carries no result
    pub fn is_degenerate(&self) -> bool {
        self.total() == 0
    }
}

impl FromStr for ScoreLine {
    type Err = anyhow::Error;

    /// Parse `"3-1"` style input
    fn from_str(s: &str) -> Result<Self> {
        let invalid = || LedgerError::InvalidScore {
            input: s.to_string(),
        };

        let side = |digits: &str| -> Result<u32> {
            if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
                return Err(invalid().into());
            }
            digits.parse::<u32>().map_err(|_| invalid().into())
        };

        let (left, right) = s.trim().split_once('-').ok_or_else(invalid)?;
        let reporter = side(left)?;
        let opponent = side(right)?;

        Ok(Self { reporter, opponent })
    }
}

impl std::fmt::Display for ScoreLine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{}", self.reporter, self.opponent)
    }
}

/// Rating movement of one player in a settlement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RatingChange {
    pub player: TransportId,
    pub old_rating: i32,
    pub new_rating: i32,
}

impl RatingChange {
    pub fn delta(&self) -> i32 {
        self.new_rating - self.old_rating
    }
}

/// Computed result of confirming a match
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlementOutcome {
    pub reporter: RatingChange,
    pub opponent: RatingChange,
}

impl SettlementOutcome {
    pub fn changes(&self) -> [RatingChange; 2] {
        [self.reporter, self.opponent]
    }
}

/// A reported match awaiting the opponent's decision
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingMatch {
    pub match_id: MatchId,
    pub reporter: TransportId,
    pub opponent: TransportId,
    pub score: ScoreLine,
    pub created_at: DateTime<Utc>,
    /// Outcome computed by an interrupted confirmation, reused on retry
    #[serde(default)]
    pub staged: Option<SettlementOutcome>,
}

impl PendingMatch {
    /// Whether `actor` may confirm or reject this report
    pub fn is_decided_by(&self, actor: TransportId) -> bool {
        self.opponent == actor
    }

    pub fn involves(&self, player: TransportId) -> bool {
        self.reporter == player || self.opponent == player
    }
}

/// Persisted match row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchRecord {
    pub match_id: MatchId,
    pub reporter: TransportId,
    pub opponent: TransportId,
    pub score: ScoreLine,
    pub timestamp: DateTime<Utc>,
    pub confirmed: bool,
}

impl MatchRecord {
    pub fn to_pending(&self) -> PendingMatch {
        PendingMatch {
            match_id: self.match_id,
            reporter: self.reporter,
            opponent: self.opponent,
            score: self.score,
            created_at: self.timestamp,
            staged: None,
        }
    }
}

/// One row of the rating table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeaderboardEntry {
    pub rank: usize,
    pub public_index: PublicIndex,
    pub name: String,
    pub surname: String,
    pub rating: i32,
    pub games_played: u32,
}

/// Category of an outbound notification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    MatchReported,
    MatchConfirmed,
    MatchRejected,
    RejectionAcknowledged,
    CommandReply,
    CommandFailed,
}

impl NotificationKind {
    /// AMQP routing key for this kind
    pub fn routing_key(&self) -> &'static str {
        match self {
            NotificationKind::MatchReported => "notification.match.reported",
            NotificationKind::MatchConfirmed => "notification.match.confirmed",
            NotificationKind::MatchRejected => "notification.match.rejected",
            NotificationKind::RejectionAcknowledged => "notification.match.rejection_ack",
            NotificationKind::CommandReply => "notification.reply",
            NotificationKind::CommandFailed => "notification.error",
        }
    }
}

/// Message addressed to a single player; delivery is the transport's job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub recipient: TransportId,
    pub kind: NotificationKind,
    pub text: String,
    pub match_id: Option<MatchId>,
    pub timestamp: DateTime<Utc>,
}

impl Notification {
    pub fn new(recipient: TransportId, kind: NotificationKind, text: impl Into<String>) -> Self {
        Self {
            recipient,
            kind,
            text: text.into(),
            match_id: None,
            timestamp: Utc::now(),
        }
    }

    pub fn for_match(mut self, match_id: MatchId) -> Self {
        self.match_id = Some(match_id);
        self
    }
}

fn default_history_limit() -> usize {
    10
}

/// Inbound command from the transport
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Command {
    Register {
        name: String,
        surname: String,
        position: Position,
    },
    SubmitMatch {
        opponent_index: String,
        score: String,
    },
    ConfirmMatch {
        match_id: MatchId,
    },
    RejectMatch {
        match_id: MatchId,
    },
    MyStats,
    AllStats,
    MatchHistory {
        #[serde(default = "default_history_limit")]
        limit: usize,
    },
    PendingMatches,
}

impl Command {
    /// Stable label used in logs and metrics
    pub fn name(&self) -> &'static str {
        match self {
            Command::Register { .. } => "register",
            Command::SubmitMatch { .. } => "submit_match",
            Command::ConfirmMatch { .. } => "confirm_match",
            Command::RejectMatch { .. } => "reject_match",
            Command::MyStats => "my_stats",
            Command::AllStats => "all_stats",
            Command::MatchHistory { .. } => "match_history",
            Command::PendingMatches => "pending_matches",
        }
    }
}

/// Command together with the identity the transport authenticated
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandRequest {
    pub actor: TransportId,
    /// Transport-level handle, only used in notification text
    #[serde(default)]
    pub username: Option<String>,
    pub command: Command,
    pub timestamp: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_public_index_validation() {
        assert!(PublicIndex::parse("123456").is_ok());
        assert_eq!(PublicIndex::parse(" 654321 ").unwrap().as_str(), "654321");
        assert!(PublicIndex::parse("12345").is_err());
        assert!(PublicIndex::parse("1234567").is_err());
        assert!(PublicIndex::parse("12a456").is_err());
        assert!(PublicIndex::parse("").is_err());
        assert!(PublicIndex::parse("١٢٣٤٥٦").is_err());
    }

    #[test]
    fn test_score_line_parsing() {
        let score: ScoreLine = "3-1".parse().unwrap();
        assert_eq!(score, ScoreLine::new(3, 1));
        assert_eq!(score.total(), 4);

        let padded: ScoreLine = " 2-2 ".parse().unwrap();
        assert_eq!(padded, ScoreLine::new(2, 2));

        let zero: ScoreLine = "0-0".parse().unwrap();
        assert!(zero.is_degenerate());

        assert!("3:1".parse::<ScoreLine>().is_err());
        assert!("-1-2".parse::<ScoreLine>().is_err());
        assert!("3-".parse::<ScoreLine>().is_err());
        assert!("three-one".parse::<ScoreLine>().is_err());
        assert!("+3-+1".parse::<ScoreLine>().is_err());
        assert!("3 - 1".parse::<ScoreLine>().is_err());
        assert!("3-1-0".parse::<ScoreLine>().is_err());
        assert!("4294967296-1".parse::<ScoreLine>().is_err());
    }

    #[test]
    fn test_score_line_total_does_not_saturate() {
        let score: ScoreLine = "4294967295-4294967295".parse().unwrap();
        assert_eq!(score.total(), 2 * u64::from(u32::MAX));
        assert!(!score.is_degenerate());
    }

    #[test]
    fn test_position_parsing() {
        assert_eq!("student".parse::<Position>().unwrap(), Position::Student);
        assert_eq!("Professor".parse::<Position>().unwrap(), Position::Professor);
        assert!("janitor".parse::<Position>().is_err());
    }

    #[test]
    fn test_command_deserialization() {
        let json = r#"{
            "actor": 42,
            "command": {"type": "submit_match", "opponent_index": "123456", "score": "3-1"},
            "timestamp": "2024-05-01T12:00:00Z"
        }"#;
        let request: CommandRequest = serde_json::from_str(json).unwrap();
        assert_eq!(request.actor, 42);
        assert_eq!(request.username, None);
        assert_eq!(request.command.name(), "submit_match");

        let history: Command = serde_json::from_str(r#"{"type": "match_history"}"#).unwrap();
        assert_eq!(history, Command::MatchHistory { limit: 10 });
    }

    #[test]
    fn test_public_index_rejected_on_deserialize() {
        let ok: std::result::Result<PublicIndex, _> = serde_json::from_str(r#""100200""#);
        assert!(ok.is_ok());
        let bad: std::result::Result<PublicIndex, _> = serde_json::from_str(r#""12""#);
        assert!(bad.is_err());
    }

    #[test]
    fn test_pending_match_authorization() {
        let pending = PendingMatch {
            match_id: 1,
            reporter: 10,
            opponent: 20,
            score: ScoreLine::new(3, 1),
            created_at: Utc::now(),
            staged: None,
        };
        assert!(pending.is_decided_by(20));
        assert!(!pending.is_decided_by(10));
        assert!(pending.involves(10));
        assert!(!pending.involves(30));
    }
}
