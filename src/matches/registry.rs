//! Pending match registry
//!
//! In-memory index of reports awaiting the opponent's decision, keyed by
//! match id. Entries are inserted on submit and removed exactly once, on
//! confirm or reject; a second removal sees nothing.

use crate::error::{LedgerError, Result};
use crate::types::{MatchId, PendingMatch, SettlementOutcome, TransportId};
use std::collections::HashMap;
use std::sync::Mutex;
use tracing::{debug, info};

#[derive(Debug, Default)]
struct RegistryState {
    entries: HashMap<MatchId, PendingMatch>,
    /// Highest id ever inserted
    high_water: Option<MatchId>,
}

/// Registry of pending matches
#[derive(Debug, Default)]
pub struct PendingMatchRegistry {
    state: Mutex<RegistryState>,
}

impl PendingMatchRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, RegistryState>> {
        self.state.lock().map_err(|_| {
            LedgerError::InternalError {
                message: "Failed to acquire pending registry lock".to_string(),
            }
            .into()
        })
    }

    /// Add a new pending report.
    ///
    /// Fails if the id is already pending, or if it is not above every id
    /// this registry has seen.
    pub fn insert(&self, record: PendingMatch) -> Result<()> {
        let mut state = self.lock()?;

        if state.entries.contains_key(&record.match_id) {
            return Err(LedgerError::InternalError {
                message: format!("Match {} is already pending", record.match_id),
            }
            .into());
        }
        if state
            .high_water
            .is_some_and(|highest| record.match_id <= highest)
        {
            return Err(LedgerError::InternalError {
                message: format!("Match id {} was already issued", record.match_id),
            }
            .into());
        }

        state.high_water = Some(record.match_id);
        state.entries.insert(record.match_id, record);
        Ok(())
    }

    pub fn get(&self, match_id: MatchId) -> Result<Option<PendingMatch>> {
        Ok(self.lock()?.entries.get(&match_id).cloned())
    }

    /// Take an entry out; `None` if it was never there or already removed
    pub fn remove(&self, match_id: MatchId) -> Result<Option<PendingMatch>> {
        Ok(self.lock()?.entries.remove(&match_id))
    }

    /// Record the outcome a confirmation computed, for reuse on retry
    pub fn stage(&self, match_id: MatchId, outcome: SettlementOutcome) -> Result<bool> {
        let mut state = self.lock()?;

        match state.entries.get_mut(&match_id) {
            Some(entry) => {
                entry.staged = Some(outcome);
                debug!("Staged settlement outcome for match {}", match_id);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub fn len(&self) -> Result<usize> {
        Ok(self.lock()?.entries.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// All pending entries ordered by id
    pub fn list(&self) -> Result<Vec<PendingMatch>> {
        let state = self.lock()?;
        let mut entries: Vec<PendingMatch> = state.entries.values().cloned().collect();
        entries.sort_by_key(|entry| entry.match_id);
        Ok(entries)
    }

    /// Entries waiting for `player` to confirm or reject
    pub fn awaiting(&self, player: TransportId) -> Result<Vec<PendingMatch>> {
        Ok(self
            .list()?
            .into_iter()
            .filter(|entry| entry.is_decided_by(player))
            .collect())
    }

    /// Rebuild entries from persisted rows; returns how many were added
    pub fn restore(&self, records: Vec<PendingMatch>) -> Result<usize> {
        let mut state = self.lock()?;
        let mut restored = 0;

        for record in records {
            state.high_water = Some(
                state
                    .high_water
                    .map_or(record.match_id, |highest| highest.max(record.match_id)),
            );
            if state.entries.insert(record.match_id, record).is_none() {
                restored += 1;
            }
        }

        info!(
            "Restored {} pending matches (highest id: {:?})",
            restored, state.high_water
        );
        Ok(restored)
    }

    /// Highest id ever inserted or restored
    pub fn high_water(&self) -> Result<Option<MatchId>> {
        Ok(self.lock()?.high_water)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{RatingChange, ScoreLine};
    use chrono::Utc;

    fn pending(match_id: MatchId, reporter: TransportId, opponent: TransportId) -> PendingMatch {
        PendingMatch {
            match_id,
            reporter,
            opponent,
            score: ScoreLine::new(3, 1),
            created_at: Utc::now(),
            staged: None,
        }
    }

    #[test]
    fn test_insert_get_remove() {
        let registry = PendingMatchRegistry::new();
        registry.insert(pending(1, 10, 20)).unwrap();

        assert_eq!(registry.len().unwrap(), 1);
        assert_eq!(registry.get(1).unwrap().unwrap().reporter, 10);

        assert!(registry.remove(1).unwrap().is_some());
        assert!(registry.remove(1).unwrap().is_none());
        assert!(registry.is_empty().unwrap());
    }

    #[test]
    fn test_ids_are_never_reissued() {
        let registry = PendingMatchRegistry::new();
        registry.insert(pending(5, 10, 20)).unwrap();
        assert!(registry.insert(pending(5, 10, 20)).is_err());

        registry.remove(5).unwrap();
        assert!(registry.insert(pending(5, 10, 20)).is_err());
        assert!(registry.insert(pending(4, 10, 20)).is_err());
        assert!(registry.insert(pending(6, 10, 20)).is_ok());
    }

    #[test]
    fn test_stage_outcome() {
        let registry = PendingMatchRegistry::new();
        registry.insert(pending(1, 10, 20)).unwrap();

        let outcome = SettlementOutcome {
            reporter: RatingChange {
                player: 10,
                old_rating: 1500,
                new_rating: 1514,
            },
            opponent: RatingChange {
                player: 20,
                old_rating: 1500,
                new_rating: 1486,
            },
        };

        assert!(registry.stage(1, outcome).unwrap());
        assert!(!registry.stage(2, outcome).unwrap());
        assert_eq!(registry.get(1).unwrap().unwrap().staged, Some(outcome));
    }

    #[test]
    fn test_restore_and_awaiting() {
        let registry = PendingMatchRegistry::new();
        let restored = registry
            .restore(vec![pending(3, 10, 20), pending(7, 30, 20), pending(5, 20, 10)])
            .unwrap();

        assert_eq!(restored, 3);
        assert_eq!(registry.high_water().unwrap(), Some(7));

        let ids: Vec<MatchId> = registry.list().unwrap().iter().map(|p| p.match_id).collect();
        assert_eq!(ids, vec![3, 5, 7]);

        let for_twenty: Vec<MatchId> = registry
            .awaiting(20)
            .unwrap()
            .iter()
            .map(|p| p.match_id)
            .collect();
        assert_eq!(for_twenty, vec![3, 7]);

        // New ids must clear the restored ones
        assert!(registry.insert(pending(6, 1, 2)).is_err());
        assert!(registry.insert(pending(8, 1, 2)).is_ok());
    }
}
