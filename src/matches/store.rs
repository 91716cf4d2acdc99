//! Persisted match rows
//!
//! A row is created unconfirmed when a report is submitted, flipped to
//! confirmed on settlement and deleted outright on rejection. The store
//! allocates match ids.

use crate::error::{LedgerError, Result};
use crate::types::{MatchId, MatchRecord, ScoreLine, TransportId};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::RwLock;

/// Trait for match row persistence
#[async_trait]
pub trait MatchStore: Send + Sync {
    /// Insert an unconfirmed row under a freshly allocated id
    async fn create(
        &self,
        reporter: TransportId,
        opponent: TransportId,
        score: ScoreLine,
        timestamp: DateTime<Utc>,
    ) -> Result<MatchRecord>;

    /// Flip the confirmed flag; confirming twice is not an error
    async fn mark_confirmed(&self, match_id: MatchId) -> Result<()>;

    /// Remove a row, returning whether it existed
    async fn delete(&self, match_id: MatchId) -> Result<bool>;

    async fn get(&self, match_id: MatchId) -> Result<Option<MatchRecord>>;

    /// Rows still awaiting a decision, oldest first
    async fn unconfirmed(&self) -> Result<Vec<MatchRecord>>;

    /// Confirmed rows involving `player`, newest first
    async fn history_for(&self, player: TransportId, limit: usize) -> Result<Vec<MatchRecord>>;
}

#[derive(Debug)]
struct StoreState {
    rows: BTreeMap<MatchId, MatchRecord>,
    next_id: MatchId,
}

fn poisoned(kind: &str) -> LedgerError {
    LedgerError::InternalError {
        message: format!("Failed to acquire match store {} lock", kind),
    }
}

/// In-memory match store implementation
#[derive(Debug)]
pub struct InMemoryMatchStore {
    state: RwLock<StoreState>,
}

impl InMemoryMatchStore {
    pub fn new() -> Self {
        Self::starting_at(1)
    }

    /// Create a store whose first allocated id is `first_id`
    pub fn starting_at(first_id: MatchId) -> Self {
        Self {
            state: RwLock::new(StoreState {
                rows: BTreeMap::new(),
                next_id: first_id,
            }),
        }
    }

    /// Insert a row verbatim, as loaded from an earlier run
    pub fn insert_record(&self, record: MatchRecord) -> Result<()> {
        let mut state = self.state.write().map_err(|_| poisoned("write"))?;
        state.next_id = state.next_id.max(record.match_id + 1);
        state.rows.insert(record.match_id, record);
        Ok(())
    }

    pub fn len(&self) -> Result<usize> {
        let state = self.state.read().map_err(|_| poisoned("read"))?;
        Ok(state.rows.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }
}

impl Default for InMemoryMatchStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MatchStore for InMemoryMatchStore {
    async fn create(
        &self,
        reporter: TransportId,
        opponent: TransportId,
        score: ScoreLine,
        timestamp: DateTime<Utc>,
    ) -> Result<MatchRecord> {
        let mut state = self.state.write().map_err(|_| poisoned("write"))?;

        let match_id = state.next_id;
        state.next_id += 1;

        let record = MatchRecord {
            match_id,
            reporter,
            opponent,
            score,
            timestamp,
            confirmed: false,
        };
        state.rows.insert(match_id, record.clone());

        Ok(record)
    }

    async fn mark_confirmed(&self, match_id: MatchId) -> Result<()> {
        let mut state = self.state.write().map_err(|_| poisoned("write"))?;

        let row = state
            .rows
            .get_mut(&match_id)
            .ok_or_else(|| LedgerError::StorageFailure {
                message: format!("No match row with id {}", match_id),
            })?;
        row.confirmed = true;

        Ok(())
    }

    async fn delete(&self, match_id: MatchId) -> Result<bool> {
        let mut state = self.state.write().map_err(|_| poisoned("write"))?;
        Ok(state.rows.remove(&match_id).is_some())
    }

    async fn get(&self, match_id: MatchId) -> Result<Option<MatchRecord>> {
        let state = self.state.read().map_err(|_| poisoned("read"))?;
        Ok(state.rows.get(&match_id).cloned())
    }

    async fn unconfirmed(&self) -> Result<Vec<MatchRecord>> {
        let state = self.state.read().map_err(|_| poisoned("read"))?;

        Ok(state
            .rows
            .values()
            .filter(|row| !row.confirmed)
            .cloned()
            .collect())
    }

    async fn history_for(&self, player: TransportId, limit: usize) -> Result<Vec<MatchRecord>> {
        let state = self.state.read().map_err(|_| poisoned("read"))?;

        // Ids are allocated in time order
        Ok(state
            .rows
            .values()
            .rev()
            .filter(|row| row.confirmed && (row.reporter == player || row.opponent == player))
            .take(limit)
            .cloned()
            .collect())
    }
}

/// Mock match store for testing, with failure injection
#[derive(Debug, Default)]
pub struct MockMatchStore {
    inner: InMemoryMatchStore,
    failing_confirms: RwLock<usize>,
    failing_creates: RwLock<usize>,
    confirm_calls: RwLock<Vec<MatchId>>,
}

impl MockMatchStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `count` confirmed-flag writes fail
    pub fn fail_next_confirms(&self, count: usize) {
        if let Ok(mut failing) = self.failing_confirms.write() {
            *failing = count;
        }
    }

    /// Make the next `count` row inserts fail
    pub fn fail_next_creates(&self, count: usize) {
        if let Ok(mut failing) = self.failing_creates.write() {
            *failing = count;
        }
    }

    /// Get all mark_confirmed calls made (for testing)
    pub fn get_confirm_calls(&self) -> Vec<MatchId> {
        self.confirm_calls
            .read()
            .map(|calls| calls.clone())
            .unwrap_or_default()
    }

    /// Preset a row for testing
    pub fn preset_record(&self, record: MatchRecord) -> Result<()> {
        self.inner.insert_record(record)
    }

    fn take_failure(counter: &RwLock<usize>) -> bool {
        match counter.write() {
            Ok(mut failing) if *failing > 0 => {
                *failing -= 1;
                true
            }
            _ => false,
        }
    }
}

#[async_trait]
impl MatchStore for MockMatchStore {
    async fn create(
        &self,
        reporter: TransportId,
        opponent: TransportId,
        score: ScoreLine,
        timestamp: DateTime<Utc>,
    ) -> Result<MatchRecord> {
        if Self::take_failure(&self.failing_creates) {
            return Err(LedgerError::StorageFailure {
                message: "injected insert failure".to_string(),
            }
            .into());
        }
        self.inner.create(reporter, opponent, score, timestamp).await
    }

    async fn mark_confirmed(&self, match_id: MatchId) -> Result<()> {
        if let Ok(mut calls) = self.confirm_calls.write() {
            calls.push(match_id);
        }
        if Self::take_failure(&self.failing_confirms) {
            return Err(LedgerError::StorageFailure {
                message: "injected confirm failure".to_string(),
            }
            .into());
        }
        self.inner.mark_confirmed(match_id).await
    }

    async fn delete(&self, match_id: MatchId) -> Result<bool> {
        self.inner.delete(match_id).await
    }

    async fn get(&self, match_id: MatchId) -> Result<Option<MatchRecord>> {
        self.inner.get(match_id).await
    }

    async fn unconfirmed(&self) -> Result<Vec<MatchRecord>> {
        self.inner.unconfirmed().await
    }

    async fn history_for(&self, player: TransportId, limit: usize) -> Result<Vec<MatchRecord>> {
        self.inner.history_for(player, limit).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_create_allocates_increasing_ids() {
        let store = InMemoryMatchStore::new();
        let first = store
            .create(1, 2, ScoreLine::new(3, 1), Utc::now())
            .await
            .unwrap();
        let second = store
            .create(2, 1, ScoreLine::new(0, 2), Utc::now())
            .await
            .unwrap();

        assert_eq!(first.match_id, 1);
        assert_eq!(second.match_id, 2);
        assert!(!first.confirmed);
        assert_eq!(store.unconfirmed().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_ids_not_reused_after_delete() {
        let store = InMemoryMatchStore::new();
        let first = store
            .create(1, 2, ScoreLine::new(1, 0), Utc::now())
            .await
            .unwrap();
        assert!(store.delete(first.match_id).await.unwrap());
        assert!(!store.delete(first.match_id).await.unwrap());

        let next = store
            .create(1, 2, ScoreLine::new(1, 0), Utc::now())
            .await
            .unwrap();
        assert!(next.match_id > first.match_id);
    }

    #[tokio::test]
    async fn test_mark_confirmed_is_idempotent() {
        let store = InMemoryMatchStore::new();
        let row = store
            .create(1, 2, ScoreLine::new(2, 2), Utc::now())
            .await
            .unwrap();

        store.mark_confirmed(row.match_id).await.unwrap();
        store.mark_confirmed(row.match_id).await.unwrap();

        assert!(store.get(row.match_id).await.unwrap().unwrap().confirmed);
        assert!(store.unconfirmed().await.unwrap().is_empty());
        assert!(store.mark_confirmed(99).await.is_err());
    }

    #[tokio::test]
    async fn test_history_newest_first() {
        let store = InMemoryMatchStore::new();
        for reporter in [1, 2, 1, 3] {
            let row = store
                .create(reporter, 9, ScoreLine::new(1, 0), Utc::now())
                .await
                .unwrap();
            store.mark_confirmed(row.match_id).await.unwrap();
        }
        // Unconfirmed rows stay out of history
        store
            .create(1, 9, ScoreLine::new(1, 0), Utc::now())
            .await
            .unwrap();

        let history = store.history_for(1, 10).await.unwrap();
        let ids: Vec<MatchId> = history.iter().map(|row| row.match_id).collect();
        assert_eq!(ids, vec![3, 1]);

        assert_eq!(store.history_for(9, 2).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_insert_record_advances_allocator() {
        let store = InMemoryMatchStore::new();
        store
            .insert_record(MatchRecord {
                match_id: 40,
                reporter: 1,
                opponent: 2,
                score: ScoreLine::new(1, 0),
                timestamp: Utc::now(),
                confirmed: false,
            })
            .unwrap();

        let next = store
            .create(1, 2, ScoreLine::new(1, 0), Utc::now())
            .await
            .unwrap();
        assert_eq!(next.match_id, 41);
    }

    #[tokio::test]
    async fn test_mock_store_failure_injection() {
        let store = MockMatchStore::new();
        store.fail_next_creates(1);
        assert!(store
            .create(1, 2, ScoreLine::new(1, 0), Utc::now())
            .await
            .is_err());

        let row = store
            .create(1, 2, ScoreLine::new(1, 0), Utc::now())
            .await
            .unwrap();
        store.fail_next_confirms(1);
        assert!(store.mark_confirmed(row.match_id).await.is_err());
        assert!(store.mark_confirmed(row.match_id).await.is_ok());
        assert_eq!(store.get_confirm_calls(), vec![row.match_id, row.match_id]);
    }
}
