//! Reply text for the command surface

use crate::error::LedgerError;
use crate::types::{
    LeaderboardEntry, MatchId, MatchRecord, PendingMatch, Player, PublicIndex, TransportId,
};

pub fn registered(index: &PublicIndex, rating: i32) -> String {
    format!(
        "Registration successful! Your starting ELO is {}.\nYour player index is: {}",
        rating, index
    )
}

pub const MATCH_SUBMITTED: &str = "Game reported! Waiting for opponent's confirmation.";

pub fn my_stats(player: &Player) -> String {
    format!(
        "Your statistics:\nName: {}\nPosition: {}\nELO Rating: {}\nGames played: {}\nPlayer Index: {}",
        player.display_name(),
        player.position,
        player.rating,
        player.games_played,
        player.public_index
    )
}

pub fn leaderboard(entries: &[LeaderboardEntry]) -> String {
    if entries.is_empty() {
        return "No players registered yet.".to_string();
    }

    let mut text = String::from("All players' ratings:");
    for entry in entries {
        text.push_str(&format!(
            "\n{}. {} {}: {}",
            entry.rank, entry.name, entry.surname, entry.rating
        ));
    }
    text
}

/// One line per confirmed match, scores from `player`'s side
pub fn history<F>(player: TransportId, records: &[MatchRecord], opponent_name: F) -> String
where
    F: Fn(TransportId) -> String,
{
    if records.is_empty() {
        return "You have no confirmed games yet.".to_string();
    }

    let mut text = format!("Your last {} games:", records.len());
    for record in records {
        let (own, other, opponent) = if record.reporter == player {
            (record.score.reporter, record.score.opponent, record.opponent)
        } else {
            (record.score.opponent, record.score.reporter, record.reporter)
        };
        let result = match own.cmp(&other) {
            std::cmp::Ordering::Greater => "win",
            std::cmp::Ordering::Less => "loss",
            std::cmp::Ordering::Equal => "draw",
        };
        text.push_str(&format!(
            "\n#{} {}: vs {} {}-{} ({})",
            record.match_id,
            record.timestamp.format("%Y-%m-%d"),
            opponent_name(opponent),
            own,
            other,
            result
        ));
    }
    text
}

pub fn pending<F>(entries: &[PendingMatch], reporter_name: F) -> String
where
    F: Fn(TransportId) -> String,
{
    if entries.is_empty() {
        return "No games are waiting for your confirmation.".to_string();
    }

    let mut text = String::from("Games awaiting your confirmation:");
    for entry in entries {
        text.push_str(&format!(
            "\n#{} from {}: {}-{} ('opponent_score-your_score'). /confirm_{} or /reject_{}",
            entry.match_id,
            reporter_name(entry.reporter),
            entry.score.reporter,
            entry.score.opponent,
            entry.match_id,
            entry.match_id
        ));
    }
    text
}

pub const NOT_REGISTERED: &str = "You need to register first! Use /register command.";
pub const OPPONENT_NOT_FOUND: &str =
    "Opponent not found. Please check the player index and try again.";

/// Text sent back to the actor when `command` fails with `error`
pub fn failure(command: &str, error: &anyhow::Error) -> String {
    let Some(ledger_error) = error.downcast_ref::<LedgerError>() else {
        return "Something went wrong. Please try again later.".to_string();
    };

    match ledger_error {
        LedgerError::SelfMatch { .. } => "You cannot report a game against yourself.".to_string(),
        LedgerError::UnregisteredPlayer { .. } => NOT_REGISTERED.to_string(),
        LedgerError::UnknownPlayerIndex { .. } => OPPONENT_NOT_FOUND.to_string(),
        LedgerError::DegenerateScore => {
            "Invalid score: 0-0 is not allowed. Please enter a valid score.".to_string()
        }
        LedgerError::InvalidPublicIndex { .. } => {
            "Invalid player index. Please enter a valid 6-digit number.".to_string()
        }
        LedgerError::InvalidScore { .. } => {
            "Invalid score format. Please use format: 3-1".to_string()
        }
        LedgerError::InvalidCommand { reason } => format!("Invalid command: {}", reason),
        LedgerError::DuplicatePlayer { .. } => {
            "Registration failed. You might be already registered.".to_string()
        }
        LedgerError::MatchNotFound { .. } => "Game not found or already processed.".to_string(),
        LedgerError::NotAuthorized { .. } => {
            let verb = if command == "reject_match" {
                "reject"
            } else {
                "confirm"
            };
            format!("You are not authorized to {} this game.", verb)
        }
        LedgerError::PartialFailure { match_id, .. } => retry_hint(*match_id),
        LedgerError::StorageFailure { .. }
        | LedgerError::AmqpConnectionFailed { .. }
        | LedgerError::ConfigurationError { .. }
        | LedgerError::InternalError { .. } => {
            "Something went wrong. Please try again later.".to_string()
        }
    }
}

fn retry_hint(match_id: MatchId) -> String {
    format!(
        "Your confirmation could not be completed. Please send /confirm_{} again.",
        match_id
    )
}
