//! Player directory interface and implementations
//!
//! The directory owns player records and is the only place ratings are
//! persisted. Paired rating writes go through [`PlayerDirectory::apply_settlement`],
//! which is atomic and idempotent per match id so an interrupted settlement
//! can be retried safely.

use crate::directory::index::allocate_public_index;
use crate::error::{LedgerError, Result};
use crate::types::{
    LeaderboardEntry, MatchId, Player, Position, PublicIndex, RatingChange, TransportId,
    DEFAULT_RATING,
};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::{HashMap, HashSet};
use std::sync::RwLock;
use tracing::{debug, info};

/// Trait for player directory operations
#[async_trait]
pub trait PlayerDirectory: Send + Sync {
    /// Look up a player by their shareable index
    async fn get_by_public_index(&self, index: &PublicIndex) -> Result<Option<Player>>;

    /// Look up a player by transport identity
    async fn get_by_transport_id(&self, transport_id: TransportId) -> Result<Option<Player>>;

    /// Overwrite one player's rating, counting one more game
    async fn set_rating(&self, transport_id: TransportId, rating: i32) -> Result<()>;

    /// Write both sides of a settlement at once.
    ///
    /// Returns `false` without touching anything when `match_id` was
    /// already applied.
    async fn apply_settlement(&self, match_id: MatchId, changes: &[RatingChange]) -> Result<bool>;

    /// Whether the settlement for `match_id` has been written
    async fn is_settled(&self, match_id: MatchId) -> Result<bool>;

    /// Register a new player and return the index issued to them
    async fn register(
        &self,
        transport_id: TransportId,
        name: &str,
        surname: &str,
        position: Position,
    ) -> Result<PublicIndex>;

    /// All players by rating descending, ties in registration order
    async fn leaderboard(&self) -> Result<Vec<LeaderboardEntry>>;

    /// Number of registered players
    async fn player_count(&self) -> Result<usize>;
}

#[derive(Debug, Default)]
struct DirectoryState {
    players: HashMap<TransportId, Player>,
    by_index: HashMap<PublicIndex, TransportId>,
    registration_order: Vec<TransportId>,
    applied_matches: HashSet<MatchId>,
}

impl DirectoryState {
    fn write_rating(&mut self, transport_id: TransportId, rating: i32) -> Result<()> {
        let player = self
            .players
            .get_mut(&transport_id)
            .ok_or_else(|| LedgerError::UnregisteredPlayer {
                player: transport_id.to_string(),
            })?;

        player.rating = rating;
        player.games_played = player.games_played.saturating_add(1);
        Ok(())
    }

    fn leaderboard(&self) -> Vec<LeaderboardEntry> {
        let mut ranked: Vec<&Player> = self
            .registration_order
            .iter()
            .filter_map(|id| self.players.get(id))
            .collect();

        // Stable: equal ratings keep registration order
        ranked.sort_by(|a, b| b.rating.cmp(&a.rating));

        ranked
            .into_iter()
            .enumerate()
            .map(|(position, player)| LeaderboardEntry {
                rank: position + 1,
                public_index: player.public_index.clone(),
                name: player.name.clone(),
                surname: player.surname.clone(),
                rating: player.rating,
                games_played: player.games_played,
            })
            .collect()
    }
}

fn poisoned(kind: &str) -> LedgerError {
    LedgerError::InternalError {
        message: format!("Failed to acquire directory {} lock", kind),
    }
}

/// In-memory player directory implementation
#[derive(Debug)]
pub struct InMemoryPlayerDirectory {
    state: RwLock<DirectoryState>,
    initial_rating: i32,
}

impl InMemoryPlayerDirectory {
    /// Create an empty directory issuing `initial_rating` to new players
    pub fn new(initial_rating: i32) -> Self {
        Self {
            state: RwLock::new(DirectoryState::default()),
            initial_rating,
        }
    }

    /// Insert a fully formed player, bypassing index allocation
    pub fn insert_player(&self, player: Player) -> Result<()> {
        let mut state = self.state.write().map_err(|_| poisoned("write"))?;

        if state.players.contains_key(&player.transport_id) {
            return Err(LedgerError::DuplicatePlayer {
                player: player.transport_id,
            }
            .into());
        }
        if state.by_index.contains_key(&player.public_index) {
            return Err(LedgerError::InternalError {
                message: format!("Player index already issued: {}", player.public_index),
            }
            .into());
        }

        state
            .by_index
            .insert(player.public_index.clone(), player.transport_id);
        state.registration_order.push(player.transport_id);
        state.players.insert(player.transport_id, player);
        Ok(())
    }
}

impl Default for InMemoryPlayerDirectory {
    fn default() -> Self {
        Self::new(DEFAULT_RATING)
    }
}

#[async_trait]
impl PlayerDirectory for InMemoryPlayerDirectory {
    async fn get_by_public_index(&self, index: &PublicIndex) -> Result<Option<Player>> {
        let state = self.state.read().map_err(|_| poisoned("read"))?;

        Ok(state
            .by_index
            .get(index)
            .and_then(|id| state.players.get(id))
            .cloned())
    }

    async fn get_by_transport_id(&self, transport_id: TransportId) -> Result<Option<Player>> {
        let state = self.state.read().map_err(|_| poisoned("read"))?;
        Ok(state.players.get(&transport_id).cloned())
    }

    async fn set_rating(&self, transport_id: TransportId, rating: i32) -> Result<()> {
        let mut state = self.state.write().map_err(|_| poisoned("write"))?;
        state.write_rating(transport_id, rating)
    }

    async fn apply_settlement(&self, match_id: MatchId, changes: &[RatingChange]) -> Result<bool> {
        let mut state = self.state.write().map_err(|_| poisoned("write"))?;

        if state.applied_matches.contains(&match_id) {
            debug!("Settlement for match {} already applied, skipping", match_id);
            return Ok(false);
        }

        // Validate every participant before the first write
        if let Some(missing) = changes
            .iter()
            .find(|change| !state.players.contains_key(&change.player))
        {
            return Err(LedgerError::UnregisteredPlayer {
                player: missing.player.to_string(),
            }
            .into());
        }

        for change in changes {
            state.write_rating(change.player, change.new_rating)?;
        }
        state.applied_matches.insert(match_id);

        Ok(true)
    }

    async fn is_settled(&self, match_id: MatchId) -> Result<bool> {
        let state = self.state.read().map_err(|_| poisoned("read"))?;
        Ok(state.applied_matches.contains(&match_id))
    }

    async fn register(
        &self,
        transport_id: TransportId,
        name: &str,
        surname: &str,
        position: Position,
    ) -> Result<PublicIndex> {
        let mut state = self.state.write().map_err(|_| poisoned("write"))?;

        if state.players.contains_key(&transport_id) {
            return Err(LedgerError::DuplicatePlayer {
                player: transport_id,
            }
            .into());
        }

        let public_index = allocate_public_index(&mut rand::thread_rng(), |candidate| {
            state.by_index.contains_key(candidate)
        })?;

        let player = Player {
            transport_id,
            public_index: public_index.clone(),
            name: name.to_string(),
            surname: surname.to_string(),
            position,
            rating: self.initial_rating,
            games_played: 0,
            registered_at: Utc::now(),
        };

        state.by_index.insert(public_index.clone(), transport_id);
        state.registration_order.push(transport_id);
        state.players.insert(transport_id, player);

        info!(
            "Registered player {} ({} {}) with index {}",
            transport_id, name, surname, public_index
        );

        Ok(public_index)
    }

    async fn leaderboard(&self) -> Result<Vec<LeaderboardEntry>> {
        let state = self.state.read().map_err(|_| poisoned("read"))?;
        Ok(state.leaderboard())
    }

    async fn player_count(&self) -> Result<usize> {
        let state = self.state.read().map_err(|_| poisoned("read"))?;
        Ok(state.players.len())
    }
}

/// Mock player directory for testing, with failure injection
#[derive(Debug, Default)]
pub struct MockPlayerDirectory {
    inner: InMemoryPlayerDirectory,
    settlement_calls: RwLock<Vec<(MatchId, Vec<RatingChange>)>>,
    failing_settlements: RwLock<usize>,
}

impl MockPlayerDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Preset a player for testing
    pub fn preset_player(&self, player: Player) -> Result<()> {
        self.inner.insert_player(player)
    }

    /// Make the next `count` settlement writes fail
    pub fn fail_next_settlements(&self, count: usize) {
        if let Ok(mut failing) = self.failing_settlements.write() {
            *failing = count;
        }
    }

    /// Get all settlement calls made (for testing)
    pub fn get_settlement_calls(&self) -> Vec<(MatchId, Vec<RatingChange>)> {
        self.settlement_calls
            .read()
            .map(|calls| calls.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl PlayerDirectory for MockPlayerDirectory {
    async fn get_by_public_index(&self, index: &PublicIndex) -> Result<Option<Player>> {
        self.inner.get_by_public_index(index).await
    }

    async fn get_by_transport_id(&self, transport_id: TransportId) -> Result<Option<Player>> {
        self.inner.get_by_transport_id(transport_id).await
    }

    async fn set_rating(&self, transport_id: TransportId, rating: i32) -> Result<()> {
        self.inner.set_rating(transport_id, rating).await
    }

    async fn apply_settlement(&self, match_id: MatchId, changes: &[RatingChange]) -> Result<bool> {
        if let Ok(mut calls) = self.settlement_calls.write() {
            calls.push((match_id, changes.to_vec()));
        }

        let should_fail = match self.failing_settlements.write() {
            Ok(mut failing) if *failing > 0 => {
                *failing -= 1;
                true
            }
            _ => false,
        };
        if should_fail {
            return Err(LedgerError::StorageFailure {
                message: "injected rating write failure".to_string(),
            }
            .into());
        }

        self.inner.apply_settlement(match_id, changes).await
    }

    async fn is_settled(&self, match_id: MatchId) -> Result<bool> {
        self.inner.is_settled(match_id).await
    }

    async fn register(
        &self,
        transport_id: TransportId,
        name: &str,
        surname: &str,
        position: Position,
    ) -> Result<PublicIndex> {
        self.inner
            .register(transport_id, name, surname, position)
            .await
    }

    async fn leaderboard(&self) -> Result<Vec<LeaderboardEntry>> {
        self.inner.leaderboard().await
    }

    async fn player_count(&self) -> Result<usize> {
        self.inner.player_count().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn player(transport_id: TransportId, index: &str, rating: i32) -> Player {
        Player {
            transport_id,
            public_index: PublicIndex::parse(index).unwrap(),
            name: format!("Name{}", transport_id),
            surname: format!("Surname{}", transport_id),
            position: Position::Student,
            rating,
            games_played: 0,
            registered_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_register_and_lookup() {
        let directory = InMemoryPlayerDirectory::default();

        let index = directory
            .register(42, "Ada", "Lovelace", Position::Professor)
            .await
            .unwrap();

        let by_id = directory.get_by_transport_id(42).await.unwrap().unwrap();
        assert_eq!(by_id.rating, 1500);
        assert_eq!(by_id.games_played, 0);
        assert_eq!(by_id.public_index, index);

        let by_index = directory.get_by_public_index(&index).await.unwrap().unwrap();
        assert_eq!(by_index.transport_id, 42);
        assert_eq!(by_index.display_name(), "Ada Lovelace");
        assert_eq!(directory.player_count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_duplicate_registration_rejected() {
        let directory = InMemoryPlayerDirectory::default();
        directory
            .register(1, "A", "B", Position::Staff)
            .await
            .unwrap();

        let err = directory
            .register(1, "C", "D", Position::Staff)
            .await
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<LedgerError>(),
            Some(LedgerError::DuplicatePlayer { player: 1 })
        ));
        assert_eq!(directory.player_count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_unknown_lookups_are_absent() {
        let directory = InMemoryPlayerDirectory::default();
        assert!(directory.get_by_transport_id(9).await.unwrap().is_none());
        let index = PublicIndex::parse("123456").unwrap();
        assert!(directory.get_by_public_index(&index).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_apply_settlement_is_idempotent() {
        let directory = InMemoryPlayerDirectory::default();
        directory.insert_player(player(1, "111111", 1500)).unwrap();
        directory.insert_player(player(2, "222222", 1500)).unwrap();

        let changes = [
            RatingChange {
                player: 1,
                old_rating: 1500,
                new_rating: 1514,
            },
            RatingChange {
                player: 2,
                old_rating: 1500,
                new_rating: 1486,
            },
        ];

        assert!(directory.apply_settlement(7, &changes).await.unwrap());
        assert!(!directory.apply_settlement(7, &changes).await.unwrap());
        assert!(directory.is_settled(7).await.unwrap());

        let first = directory.get_by_transport_id(1).await.unwrap().unwrap();
        let second = directory.get_by_transport_id(2).await.unwrap().unwrap();
        assert_eq!((first.rating, first.games_played), (1514, 1));
        assert_eq!((second.rating, second.games_played), (1486, 1));
    }

    #[tokio::test]
    async fn test_apply_settlement_is_all_or_nothing() {
        let directory = InMemoryPlayerDirectory::default();
        directory.insert_player(player(1, "111111", 1500)).unwrap();

        let changes = [
            RatingChange {
                player: 1,
                old_rating: 1500,
                new_rating: 1510,
            },
            RatingChange {
                player: 99,
                old_rating: 1500,
                new_rating: 1490,
            },
        ];

        assert!(directory.apply_settlement(3, &changes).await.is_err());
        let untouched = directory.get_by_transport_id(1).await.unwrap().unwrap();
        assert_eq!((untouched.rating, untouched.games_played), (1500, 0));
        assert!(!directory.is_settled(3).await.unwrap());
    }

    #[tokio::test]
    async fn test_leaderboard_is_stable() {
        let directory = InMemoryPlayerDirectory::default();
        directory.insert_player(player(1, "111111", 1500)).unwrap();
        directory.insert_player(player(2, "222222", 1600)).unwrap();
        directory.insert_player(player(3, "333333", 1500)).unwrap();
        directory.insert_player(player(4, "444444", 1400)).unwrap();

        let board = directory.leaderboard().await.unwrap();
        let order: Vec<&str> = board.iter().map(|e| e.public_index.as_str()).collect();
        assert_eq!(order, vec!["222222", "111111", "333333", "444444"]);
        assert_eq!(board[0].rank, 1);
        assert_eq!(board[3].rank, 4);
    }

    #[tokio::test]
    async fn test_set_rating_counts_a_game() {
        let directory = InMemoryPlayerDirectory::default();
        directory.insert_player(player(5, "555555", 1500)).unwrap();

        directory.set_rating(5, 1520).await.unwrap();
        let updated = directory.get_by_transport_id(5).await.unwrap().unwrap();
        assert_eq!((updated.rating, updated.games_played), (1520, 1));

        assert!(directory.set_rating(6, 1520).await.is_err());
    }

    #[tokio::test]
    async fn test_mock_directory_failure_injection() {
        let directory = MockPlayerDirectory::new();
        directory.preset_player(player(1, "111111", 1500)).unwrap();
        directory.preset_player(player(2, "222222", 1500)).unwrap();
        directory.fail_next_settlements(1);

        let changes = [RatingChange {
            player: 1,
            old_rating: 1500,
            new_rating: 1501,
        }];

        assert!(directory.apply_settlement(1, &changes).await.is_err());
        assert!(directory.apply_settlement(1, &changes).await.unwrap());
        assert_eq!(directory.get_settlement_calls().len(), 2);
    }
}
