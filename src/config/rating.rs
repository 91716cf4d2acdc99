//! Rating system configuration

use crate::rating::elo::DEFAULT_K_FACTOR;
use crate::rating::EloConfig;
use crate::types::DEFAULT_RATING;
use serde::{Deserialize, Serialize};

/// Settings for the margin-weighted Elo calculator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RatingSettings {
    /// Maximum rating movement per match before the margin multiplier
    pub k_factor: f64,
    /// Rating given to newly registered players
    pub initial_rating: i32,
}

impl Default for RatingSettings {
    fn default() -> Self {
        Self {
            k_factor: DEFAULT_K_FACTOR,
            initial_rating: DEFAULT_RATING,
        }
    }
}

impl RatingSettings {
    pub fn to_elo_config(&self) -> EloConfig {
        EloConfig {
            k_factor: self.k_factor,
            initial_rating: self.initial_rating,
        }
    }
}
