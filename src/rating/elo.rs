//! Margin-weighted Elo rating system
//!
//! Ratings move by `K * (actual - expected) * m`, where the margin multiplier
//! `m = (4/π)·atan(total points)` grows with the length of the encounter and
//! is bounded below 2. Rating deltas are rounded half to even.

use crate::error::{LedgerError, Result};
use crate::rating::calculator::RatingCalculator;
use crate::types::{RatingChange, ScoreLine, SettlementOutcome, TransportId, DEFAULT_RATING};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// Default K factor
pub const DEFAULT_K_FACTOR: f64 = 32.0;

/// Configuration for the margin-weighted Elo system
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EloConfig {
    /// Maximum swing for a decisive result at multiplier 1
    pub k_factor: f64,
    /// Rating for newly registered players
    pub initial_rating: i32,
}

impl Default for EloConfig {
    fn default() -> Self {
        Self {
            k_factor: DEFAULT_K_FACTOR,
            initial_rating: DEFAULT_RATING,
        }
    }
}

impl EloConfig {
    /// Validate configuration parameters
    pub fn validate(&self) -> Result<()> {
        if !self.k_factor.is_finite() || self.k_factor <= 0.0 {
            return Err(LedgerError::ConfigurationError {
                message: "K factor must be a positive number".to_string(),
            }
            .into());
        }

        if self.initial_rating <= 0 {
            return Err(LedgerError::ConfigurationError {
                message: "Initial rating must be positive".to_string(),
            }
            .into());
        }

        Ok(())
    }
}

/// Scale factor for the rating swing, `(4/π)·atan(total)`.
///
/// Zero for an empty match, 1 for a single point, and approaching 2 as the
/// number of points grows.
pub fn margin_multiplier(total: u64) -> f64 {
    4.0 / PI * (total as f64).atan()
}

/// Logistic expectation of `rating` scoring against `opponent`
pub fn expected_score(rating: i32, opponent: i32) -> f64 {
    1.0 / (1.0 + 10f64.powf(f64::from(opponent - rating) / 400.0))
}

/// Fractional scores `(reporter, opponent)`; they sum to one
pub fn actual_scores(score: ScoreLine) -> Result<(f64, f64)> {
    if score.is_degenerate() {
        return Err(LedgerError::DegenerateScore.into());
    }

    let total = score.total() as f64;
    Ok((
        f64::from(score.reporter) / total,
        f64::from(score.opponent) / total,
    ))
}

/// Round a fractional rating delta half to even
pub fn round_rating_delta(delta: f64) -> i32 {
    delta.round_ties_even() as i32
}

/// Compute both players' new ratings.
///
/// Both expectations use the same logistic formula, so swapping both ratings
/// and both scores swaps the result exactly.
pub fn update(rating_a: i32, rating_b: i32, score_a: u32, score_b: u32, k_factor: f64) -> Result<(i32, i32)> {
    let score = ScoreLine::new(score_a, score_b);
    let (actual_a, actual_b) = actual_scores(score)?;
    let multiplier = margin_multiplier(score.total());

    let expected_a = expected_score(rating_a, rating_b);
    let expected_b = expected_score(rating_b, rating_a);

    let delta_a = k_factor * (actual_a - expected_a) * multiplier;
    let delta_b = k_factor * (actual_b - expected_b) * multiplier;

    Ok((
        rating_a + round_rating_delta(delta_a),
        rating_b + round_rating_delta(delta_b),
    ))
}

/// Rating calculator backed by the margin-weighted Elo formula
#[derive(Debug, Clone)]
pub struct MarginEloCalculator {
    config: EloConfig,
}

impl MarginEloCalculator {
    /// Create a new calculator
    pub fn new(config: EloConfig) -> Result<Self> {
        config.validate()?;

        Ok(Self { config })
    }

    pub fn k_factor(&self) -> f64 {
        self.config.k_factor
    }
}

impl Default for MarginEloCalculator {
    fn default() -> Self {
        Self {
            config: EloConfig::default(),
        }
    }
}

impl RatingCalculator for MarginEloCalculator {
    fn settle(
        &self,
        reporter: (TransportId, i32),
        opponent: (TransportId, i32),
        score: ScoreLine,
    ) -> Result<SettlementOutcome> {
        let (new_reporter, new_opponent) = update(
            reporter.1,
            opponent.1,
            score.reporter,
            score.opponent,
            self.config.k_factor,
        )?;

        Ok(SettlementOutcome {
            reporter: RatingChange {
                player: reporter.0,
                old_rating: reporter.1,
                new_rating: new_reporter,
            },
            opponent: RatingChange {
                player: opponent.0,
                old_rating: opponent.1,
                new_rating: new_opponent,
            },
        })
    }

    fn initial_rating(&self) -> i32 {
        self.config.initial_rating
    }

    fn config(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "margin_elo",
            "k_factor": self.config.k_factor,
            "initial_rating": self.config.initial_rating,
            "rounding": "half_to_even"
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_equal_ratings_three_one() {
        let (a, b) = update(1500, 1500, 3, 1, 32.0).unwrap();
        assert_eq!((a, b), (1514, 1486));
        assert!(a > 1500);
        assert!(b < 1500);
    }

    #[test]
    fn test_known_outcomes() {
        assert_eq!(update(1500, 1500, 1, 0, 32.0).unwrap(), (1516, 1484));
        assert_eq!(update(1500, 1500, 3, 0, 32.0).unwrap(), (1525, 1475));
        assert_eq!(update(1500, 1500, 5, 0, 32.0).unwrap(), (1528, 1472));
        assert_eq!(update(1800, 1200, 0, 3, 32.0).unwrap(), (1751, 1249));
        assert_eq!(update(1400, 1600, 3, 2, 32.0).unwrap(), (1420, 1580));
        assert_eq!(update(1450, 1700, 11, 9, 32.0).unwrap(), (1472, 1678));
    }

    #[test]
    fn test_draw_depends_on_rating_gap() {
        // Equal ratings, equal scores: nobody moves
        assert_eq!(update(1500, 1500, 2, 2, 32.0).unwrap(), (1500, 1500));

        // The favourite loses points on a draw
        assert_eq!(update(1600, 1400, 2, 2, 32.0).unwrap(), (1586, 1414));
    }

    #[test]
    fn test_heavy_favourite_barely_moves() {
        assert_eq!(update(2000, 1000, 1, 0, 32.0).unwrap(), (2000, 1000));
    }

    #[test]
    fn test_degenerate_score_rejected() {
        let err = update(1500, 1500, 0, 0, 32.0).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<LedgerError>(),
            Some(LedgerError::DegenerateScore)
        ));
    }

    #[test]
    fn test_rounding_is_half_to_even() {
        assert_eq!(round_rating_delta(2.5), 2);
        assert_eq!(round_rating_delta(3.5), 4);
        assert_eq!(round_rating_delta(-2.5), -2);
        assert_eq!(round_rating_delta(-3.5), -4);
        assert_eq!(round_rating_delta(0.5), 0);
        assert_eq!(round_rating_delta(13.504), 14);
        assert_eq!(round_rating_delta(-0.49), 0);
    }

    #[test]
    fn test_margin_multiplier_values() {
        assert_eq!(margin_multiplier(0), 0.0);
        assert!((margin_multiplier(1) - 1.0).abs() < 1e-12);
        assert!((margin_multiplier(4) - 1.688083478490523).abs() < 1e-12);
        assert!(margin_multiplier(2 * u64::from(u32::MAX)) < 2.0);
    }

    #[test]
    fn test_huge_scores_stay_zero_sum() {
        let max = u32::MAX;
        assert_eq!(actual_scores(ScoreLine::new(max, max)).unwrap(), (0.5, 0.5));
        assert_eq!(update(1500, 1500, max, max, 32.0).unwrap(), (1500, 1500));

        let (a, b) = update(1500, 1500, 3_000_000_000, 2_000_000_000, 32.0).unwrap();
        assert!(a > 1500);
        assert_eq!(a + b, 3000);
    }

    #[test]
    fn test_more_decisive_reports_move_more() {
        let (one_nil, _) = update(1500, 1500, 1, 0, 32.0).unwrap();
        let (three_nil, _) = update(1500, 1500, 3, 0, 32.0).unwrap();
        assert!(three_nil > one_nil);
    }

    #[test]
    fn test_config_validation() {
        assert!(EloConfig::default().validate().is_ok());

        let bad_k = EloConfig {
            k_factor: 0.0,
            ..EloConfig::default()
        };
        assert!(bad_k.validate().is_err());
        assert!(MarginEloCalculator::new(bad_k).is_err());

        let bad_initial = EloConfig {
            initial_rating: 0,
            ..EloConfig::default()
        };
        assert!(bad_initial.validate().is_err());
    }

    #[test]
    fn test_settle_reports_changes() {
        let calculator = MarginEloCalculator::default();
        let outcome = calculator
            .settle((10, 1500), (20, 1500), ScoreLine::new(3, 1))
            .unwrap();

        assert_eq!(outcome.reporter.player, 10);
        assert_eq!(outcome.reporter.old_rating, 1500);
        assert_eq!(outcome.reporter.new_rating, 1514);
        assert_eq!(outcome.reporter.delta(), 14);
        assert_eq!(outcome.opponent.player, 20);
        assert_eq!(outcome.opponent.delta(), -14);
        assert_eq!(calculator.initial_rating(), 1500);
        assert_eq!(calculator.config()["k_factor"], 32.0);
    }

    proptest! {
        #[test]
        fn prop_actual_scores_sum_to_one(a in any::<u32>(), b in any::<u32>()) {
            prop_assume!(u64::from(a) + u64::from(b) > 0);
            let (actual_a, actual_b) = actual_scores(ScoreLine::new(a, b)).unwrap();
            prop_assert_eq!(actual_a + actual_b, 1.0);
        }

        #[test]
        fn prop_update_is_antisymmetric(
            ra in 100i32..3000,
            rb in 100i32..3000,
            sa in 0u32..50,
            sb in 0u32..50,
        ) {
            prop_assume!(sa + sb > 0);
            let (na, nb) = update(ra, rb, sa, sb, 32.0).unwrap();
            let (swapped_b, swapped_a) = update(rb, ra, sb, sa, 32.0).unwrap();
            prop_assert_eq!((na, nb), (swapped_a, swapped_b));
        }

        #[test]
        fn prop_multiplier_monotone_and_bounded(total in 0u64..100_000) {
            let current = margin_multiplier(total);
            let next = margin_multiplier(total + 1);
            prop_assert!(current >= 0.0);
            prop_assert!(current < 2.0);
            prop_assert!(next >= current);
        }

        #[test]
        fn prop_winner_never_loses_points(
            ra in 100i32..3000,
            rb in 100i32..3000,
            sa in 1u32..20,
        ) {
            let (na, nb) = update(ra, rb, sa, 0, 32.0).unwrap();
            prop_assert!(na >= ra);
            prop_assert!(nb <= rb);
        }
    }
}
