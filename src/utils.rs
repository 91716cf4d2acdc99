//! Utility functions for the rating ledger service

use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Generate a new unique correlation ID for outbound messages
pub fn generate_correlation_id() -> String {
    Uuid::new_v4().to_string()
}

/// Get the current UTC timestamp
pub fn current_timestamp() -> DateTime<Utc> {
    Utc::now()
}

/// Format a signed rating delta, e.g. `+14` or `-9`
pub fn format_delta(delta: i32) -> String {
    if delta >= 0 {
        format!("+{}", delta)
    } else {
        delta.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_unique_ids() {
        let id1 = generate_correlation_id();
        let id2 = generate_correlation_id();
        assert_ne!(id1, id2);
    }

    #[test]
    fn test_format_delta() {
        assert_eq!(format_delta(14), "+14");
        assert_eq!(format_delta(0), "+0");
        assert_eq!(format_delta(-9), "-9");
    }
}
