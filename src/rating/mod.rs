//! Rating system using a margin-weighted Elo update
//!
//! This module provides the pure rating formula and the calculator
//! interface used by the settlement path.

pub mod calculator;
pub mod elo;

// Re-export commonly used types
pub use calculator::{MockRatingCalculator, RatingCalculator};
pub use elo::{EloConfig, MarginEloCalculator};
