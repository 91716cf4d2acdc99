//! Match settlement coordinator
//!
//! Drives every report through `Reported -> Confirmed | Rejected`. It is the
//! only writer of ratings.
//!
//! A confirmation runs in a fixed order so that any failure can be retried:
//! compute (or reuse) the outcome and stage it on the pending entry, write
//! both ratings, flip the persisted row to confirmed, and only then remove the
//! pending entry. If a write fails the entry stays put and the caller sees
//! [`LedgerError::PartialFailure`].

use crate::directory::PlayerDirectory;
use crate::error::{LedgerError, Result};
use crate::matches::locks::KeyedLocks;
use crate::matches::registry::PendingMatchRegistry;
use crate::matches::store::MatchStore;
use crate::metrics::MetricsCollector;
use crate::rating::RatingCalculator;
use crate::types::{
    MatchId, Notification, NotificationKind, PendingMatch, Player, RatingChange, ScoreLine,
    SettlementOutcome, TransportId,
};
use chrono::Utc;
use std::sync::{Arc, RwLock};
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, error, info, warn};

/// Result of accepting a report
#[derive(Debug, Clone)]
pub struct SubmitOutcome {
    pub pending: PendingMatch,
    /// Addressed to the opponent
    pub notification: Notification,
}

/// Result of a completed confirmation
#[derive(Debug, Clone)]
pub struct ConfirmOutcome {
    pub match_id: MatchId,
    pub settlement: SettlementOutcome,
    /// One per participant, reporter first
    pub notifications: Vec<Notification>,
}

/// Result of a rejection
#[derive(Debug, Clone)]
pub struct RejectOutcome {
    pub match_id: MatchId,
    /// Reporter's notice first, then the opponent's acknowledgement
    pub notifications: Vec<Notification>,
}

/// Statistics about coordinator operations
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CoordinatorStats {
    /// Reports accepted
    pub matches_reported: u64,
    /// Reports confirmed and settled
    pub matches_confirmed: u64,
    /// Reports rejected
    pub matches_rejected: u64,
    /// Confirmations that stopped midway
    pub partial_failures: u64,
    /// Entries rebuilt at startup
    pub matches_restored: u64,
}

/// The settlement coordinator
pub struct SettlementCoordinator {
    directory: Arc<dyn PlayerDirectory>,
    store: Arc<dyn MatchStore>,
    registry: Arc<PendingMatchRegistry>,
    calculator: Arc<dyn RatingCalculator>,
    metrics_collector: Arc<MetricsCollector>,
    /// Held for the whole of a confirm or reject
    match_locks: KeyedLocks<MatchId>,
    /// Held around the read-compute-write of a rating pair
    player_locks: KeyedLocks<TransportId>,
    /// Keeps row allocation and registry insertion in id order
    submit_lock: AsyncMutex<()>,
    stats: RwLock<CoordinatorStats>,
}

impl SettlementCoordinator {
    /// Create a new coordinator with its own metrics collector
    pub fn new(
        directory: Arc<dyn PlayerDirectory>,
        store: Arc<dyn MatchStore>,
        registry: Arc<PendingMatchRegistry>,
        calculator: Arc<dyn RatingCalculator>,
    ) -> Result<Self> {
        let metrics_collector = Arc::new(MetricsCollector::new()?);
        Ok(Self::with_metrics(
            directory,
            store,
            registry,
            calculator,
            metrics_collector,
        ))
    }

    /// Create a new coordinator reporting into `metrics_collector`
    pub fn with_metrics(
        directory: Arc<dyn PlayerDirectory>,
        store: Arc<dyn MatchStore>,
        registry: Arc<PendingMatchRegistry>,
        calculator: Arc<dyn RatingCalculator>,
        metrics_collector: Arc<MetricsCollector>,
    ) -> Self {
        Self {
            directory,
            store,
            registry,
            calculator,
            metrics_collector,
            match_locks: KeyedLocks::new(),
            player_locks: KeyedLocks::new(),
            submit_lock: AsyncMutex::new(()),
            stats: RwLock::new(CoordinatorStats::default()),
        }
    }

    pub fn directory(&self) -> Arc<dyn PlayerDirectory> {
        self.directory.clone()
    }

    pub fn store(&self) -> Arc<dyn MatchStore> {
        self.store.clone()
    }

    pub fn registry(&self) -> Arc<PendingMatchRegistry> {
        self.registry.clone()
    }

    pub fn metrics(&self) -> Arc<MetricsCollector> {
        self.metrics_collector.clone()
    }

    /// Accept a score report from `reporter` against `opponent`
    pub async fn submit(
        &self,
        reporter: TransportId,
        opponent: TransportId,
        score: ScoreLine,
    ) -> Result<SubmitOutcome> {
        self.submit_with_handle(reporter, None, opponent, score)
            .await
    }

    /// Accept a score report, naming the reporter by transport handle in the
    /// opponent's notification
    pub async fn submit_with_handle(
        &self,
        reporter: TransportId,
        reporter_handle: Option<&str>,
        opponent: TransportId,
        score: ScoreLine,
    ) -> Result<SubmitOutcome> {
        info!(
            "Processing match report - reporter: {}, opponent: {}, score: {}",
            reporter, opponent, score
        );

        if reporter == opponent {
            return Err(LedgerError::SelfMatch { player: reporter }.into());
        }

        let reporter_player = self.require_player(reporter).await?;
        self.require_player(opponent).await?;

        if score.is_degenerate() {
            return Err(LedgerError::DegenerateScore.into());
        }

        let pending = {
            let _guard = self.submit_lock.lock().await;

            let record = self
                .store
                .create(reporter, opponent, score, Utc::now())
                .await?;
            let pending = record.to_pending();

            if let Err(e) = self.registry.insert(pending.clone()) {
                error!(
                    "Failed to register pending match {}, removing row: {}",
                    record.match_id, e
                );
                if let Err(cleanup) = self.store.delete(record.match_id).await {
                    error!(
                        "Failed to remove orphaned match row {}: {}",
                        record.match_id, cleanup
                    );
                }
                return Err(e);
            }

            pending
        };

        self.update_stats(|stats| stats.matches_reported += 1);
        self.metrics_collector.record_match_reported();

        let reporter_label = match reporter_handle {
            Some(handle) => format!("@{} ({})", handle, reporter_player.display_name()),
            None => reporter_player.display_name(),
        };
        let text = format!(
            "Game report received from {}!\nScore: {}-{} ('opponent_score-your_score')\nType /confirm_{} to confirm or /reject_{} to reject",
            reporter_label, score.reporter, score.opponent, pending.match_id, pending.match_id
        );
        let notification = Notification::new(opponent, NotificationKind::MatchReported, text)
            .for_match(pending.match_id);

        info!(
            "Match {} pending - reporter: {}, opponent: {}, score: {}",
            pending.match_id, reporter, opponent, score
        );

        Ok(SubmitOutcome {
            pending,
            notification,
        })
    }

    /// Confirm a pending report and settle both ratings
    pub async fn confirm(&self, actor: TransportId, match_id: MatchId) -> Result<ConfirmOutcome> {
        let timer = self.metrics_collector.start_timer();
        let _match_guard = self.match_locks.lock(&match_id).await?;

        let pending = self.authorize(actor, match_id)?;

        info!(
            "Confirming match {} - reporter: {}, opponent: {}, score: {}",
            match_id, pending.reporter, pending.opponent, pending.score
        );

        let (settlement, recovered, reporter_player, opponent_player) = {
            let _player_guards = self
                .player_locks
                .lock_all(&[pending.reporter, pending.opponent])
                .await?;

            let reporter_player = self.require_player(pending.reporter).await?;
            let opponent_player = self.require_player(pending.opponent).await?;

            let (settlement, recovered) = self
                .settlement_for(&pending, &reporter_player, &opponent_player)
                .await?;
            if !recovered {
                self.registry.stage(match_id, settlement)?;
            }

            if let Err(e) = self
                .directory
                .apply_settlement(match_id, &settlement.changes())
                .await
            {
                return Err(self.partial_failure(match_id, "rating write", e));
            }

            (settlement, recovered, reporter_player, opponent_player)
        };

        if let Err(e) = self.store.mark_confirmed(match_id).await {
            return Err(self.partial_failure(match_id, "confirmed flag write", e));
        }

        // Last effect: the id can no longer be decided on
        if self.registry.remove(match_id)?.is_none() {
            warn!("Pending entry for match {} vanished during settlement", match_id);
        }

        let duration = timer.stop();
        self.update_stats(|stats| stats.matches_confirmed += 1);
        if recovered {
            self.metrics_collector.record_match_confirmed(&[], &[], duration);
        } else {
            self.metrics_collector.record_match_confirmed(
                &[settlement.reporter.delta(), settlement.opponent.delta()],
                &[settlement.reporter.new_rating, settlement.opponent.new_rating],
                duration,
            );
        }

        info!(
            "Match {} settled in {:?} - {}: {} -> {}, {}: {} -> {}",
            match_id,
            duration,
            pending.reporter,
            settlement.reporter.old_rating,
            settlement.reporter.new_rating,
            pending.opponent,
            settlement.opponent.old_rating,
            settlement.opponent.new_rating
        );

        let heading = if recovered {
            "Game confirmed! Ratings were already updated by an earlier attempt:"
        } else {
            "Game confirmed! New ratings:"
        };
        let text = format!(
            "{}\n{}: {}\n{}: {}",
            heading,
            reporter_player.display_name(),
            settlement.reporter.new_rating,
            opponent_player.display_name(),
            settlement.opponent.new_rating
        );
        let notifications = vec![
            Notification::new(pending.reporter, NotificationKind::MatchConfirmed, text.clone())
                .for_match(match_id),
            Notification::new(pending.opponent, NotificationKind::MatchConfirmed, text)
                .for_match(match_id),
        ];

        Ok(ConfirmOutcome {
            match_id,
            settlement,
            notifications,
        })
    }

    /// Reject a pending report; ratings are untouched
    pub async fn reject(&self, actor: TransportId, match_id: MatchId) -> Result<RejectOutcome> {
        let _match_guard = self.match_locks.lock(&match_id).await?;

        let pending = self.authorize(actor, match_id)?;

        // Ratings already written: only a retried confirm may finish this match
        if self.directory.is_settled(match_id).await? {
            warn!(
                "Player {} attempted to reject match {} after its ratings were applied",
                actor, match_id
            );
            return Err(LedgerError::PartialFailure {
                match_id,
                reason: "ratings already applied, confirmation must be retried".to_string(),
            }
            .into());
        }

        info!(
            "Rejecting match {} - reporter: {}, opponent: {}",
            match_id, pending.reporter, pending.opponent
        );

        // A missing row is fine: an earlier attempt may have deleted it
        if !self.store.delete(match_id).await? {
            debug!("Match row {} already deleted", match_id);
        }
        self.registry.remove(match_id)?;

        self.update_stats(|stats| stats.matches_rejected += 1);
        self.metrics_collector.record_match_rejected();

        let notifications = vec![
            Notification::new(
                pending.reporter,
                NotificationKind::MatchRejected,
                "Your opponent rejected the game report.",
            )
            .for_match(match_id),
            Notification::new(
                pending.opponent,
                NotificationKind::RejectionAcknowledged,
                "You have rejected the game report.",
            )
            .for_match(match_id),
        ];

        Ok(RejectOutcome {
            match_id,
            notifications,
        })
    }

    /// Rebuild the pending registry from unconfirmed rows
    pub async fn restore_pending(&self) -> Result<usize> {
        let rows = self.store.unconfirmed().await?;
        let pending: Vec<PendingMatch> = rows.iter().map(|row| row.to_pending()).collect();

        let restored = self.registry.restore(pending)?;
        self.update_stats(|stats| stats.matches_restored += restored as u64);
        self.metrics_collector
            .matches()
            .pending_matches
            .set(self.registry.len()? as i64);

        Ok(restored)
    }

    /// Reports waiting for `player` to confirm or reject
    pub fn pending_for(&self, player: TransportId) -> Result<Vec<PendingMatch>> {
        self.registry.awaiting(player)
    }

    /// Get current coordinator statistics
    pub fn get_stats(&self) -> Result<CoordinatorStats> {
        let stats = self.stats.read().map_err(|_| LedgerError::InternalError {
            message: "Failed to acquire stats lock".to_string(),
        })?;

        Ok(stats.clone())
    }

    fn authorize(&self, actor: TransportId, match_id: MatchId) -> Result<PendingMatch> {
        let pending = self
            .registry
            .get(match_id)?
            .ok_or(LedgerError::MatchNotFound { match_id })?;

        if !pending.is_decided_by(actor) {
            warn!(
                "Player {} attempted to decide match {} (opponent is {})",
                actor, match_id, pending.opponent
            );
            return Err(LedgerError::NotAuthorized { actor, match_id }.into());
        }

        Ok(pending)
    }

    async fn require_player(&self, transport_id: TransportId) -> Result<Player> {
        self.directory
            .get_by_transport_id(transport_id)
            .await?
            .ok_or_else(|| {
                LedgerError::UnregisteredPlayer {
                    player: transport_id.to_string(),
                }
                .into()
            })
    }

    /// Fresh outcome from current ratings, or the staged one if the ratings
    /// were already written by an interrupted attempt.
    ///
    /// The flag is set when the ratings were written but the staged outcome
    /// is gone (e.g. after a restart); the outcome then only carries the
    /// current ratings.
    async fn settlement_for(
        &self,
        pending: &PendingMatch,
        reporter: &Player,
        opponent: &Player,
    ) -> Result<(SettlementOutcome, bool)> {
        if self.directory.is_settled(pending.match_id).await? {
            if let Some(staged) = pending.staged {
                debug!("Reusing staged outcome for match {}", pending.match_id);
                return Ok((staged, false));
            }

            warn!(
                "Ratings for match {} already written but no staged outcome, reporting current ratings",
                pending.match_id
            );
            let current = SettlementOutcome {
                reporter: RatingChange {
                    player: reporter.transport_id,
                    old_rating: reporter.rating,
                    new_rating: reporter.rating,
                },
                opponent: RatingChange {
                    player: opponent.transport_id,
                    old_rating: opponent.rating,
                    new_rating: opponent.rating,
                },
            };
            return Ok((current, true));
        }

        let fresh = self.calculator.settle(
            (reporter.transport_id, reporter.rating),
            (opponent.transport_id, opponent.rating),
            pending.score,
        )?;
        Ok((fresh, false))
    }

    fn partial_failure(&self, match_id: MatchId, step: &str, cause: anyhow::Error) -> anyhow::Error {
        error!(
            "Settlement of match {} failed at {}, pending entry kept for retry: {}",
            match_id, step, cause
        );

        self.update_stats(|stats| stats.partial_failures += 1);
        self.metrics_collector.record_partial_failure();

        LedgerError::PartialFailure {
            match_id,
            reason: format!("{} failed: {}", step, cause),
        }
        .into()
    }

    fn update_stats<F: FnOnce(&mut CoordinatorStats)>(&self, update: F) {
        if let Ok(mut stats) = self.stats.write() {
            update(&mut stats);
        }
    }
}
