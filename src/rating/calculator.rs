//! Rating calculator trait and implementations
//!
//! This module defines the interface the settlement path uses to turn a
//! confirmed score into rating changes, plus a recording mock for tests.

use crate::error::Result;
use crate::types::{RatingChange, ScoreLine, SettlementOutcome, TransportId, DEFAULT_RATING};

/// Trait for calculating rating changes after a confirmed match
pub trait RatingCalculator: Send + Sync {
    /// Calculate both players' new ratings
    ///
    /// # Arguments
    /// * `reporter` - (transport id, current rating) of the player who reported
    /// * `opponent` - (transport id, current rating) of the confirming player
    /// * `score` - raw score pair, reporter's score first
    ///
    /// # Returns
    /// Both rating changes, or a validation error for a 0-0 score
    fn settle(
        &self,
        reporter: (TransportId, i32),
        opponent: (TransportId, i32),
        score: ScoreLine,
    ) -> Result<SettlementOutcome>;

    /// Get the initial rating for new players
    fn initial_rating(&self) -> i32;

    /// Get current configuration as JSON
    fn config(&self) -> serde_json::Value;
}

type SettleCall = ((TransportId, i32), (TransportId, i32), ScoreLine);

/// Mock rating calculator for testing
#[derive(Debug, Default)]
pub struct MockRatingCalculator {
    calls: std::sync::Mutex<Vec<SettleCall>>,
    fixed_delta: std::sync::RwLock<Option<i32>>,
}

impl MockRatingCalculator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Move the reporter up and the opponent down by `delta` on every call
    pub fn set_fixed_delta(&self, delta: i32) {
        if let Ok(mut fixed) = self.fixed_delta.write() {
            *fixed = Some(delta);
        }
    }

    /// Get all calls made (for testing)
    pub fn get_calls(&self) -> Vec<SettleCall> {
        self.calls
            .lock()
            .map(|calls| calls.clone())
            .unwrap_or_default()
    }
}

impl RatingCalculator for MockRatingCalculator {
    fn settle(
        &self,
        reporter: (TransportId, i32),
        opponent: (TransportId, i32),
        score: ScoreLine,
    ) -> Result<SettlementOutcome> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push((reporter, opponent, score));
        }

        if score.is_degenerate() {
            return Err(crate::error::LedgerError::DegenerateScore.into());
        }

        let delta = self
            .fixed_delta
            .read()
            .ok()
            .and_then(|fixed| *fixed)
            .unwrap_or(0);

        Ok(SettlementOutcome {
            reporter: RatingChange {
                player: reporter.0,
                old_rating: reporter.1,
                new_rating: reporter.1 + delta,
            },
            opponent: RatingChange {
                player: opponent.0,
                old_rating: opponent.1,
                new_rating: opponent.1 - delta,
            },
        })
    }

    fn initial_rating(&self) -> i32 {
        DEFAULT_RATING
    }

    fn config(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "mock",
            "initial_rating": DEFAULT_RATING
        })
    }
}
