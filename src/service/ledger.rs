//! Ledger component wiring
//!
//! Builds the directory, match store, pending registry, calculator,
//! coordinator and command router as one unit, all reporting into a shared
//! metrics collector.

use crate::commands::CommandRouter;
use crate::config::RatingSettings;
use crate::directory::{InMemoryPlayerDirectory, PlayerDirectory};
use crate::error::Result;
use crate::matches::{InMemoryMatchStore, MatchStore, PendingMatchRegistry, SettlementCoordinator};
use crate::metrics::{LedgerSnapshot, MetricsCollector};
use crate::rating::{MarginEloCalculator, RatingCalculator};
use std::sync::Arc;
use tracing::info;

/// The ledger's collaborating components
pub struct Ledger {
    directory: Arc<dyn PlayerDirectory>,
    store: Arc<dyn MatchStore>,
    registry: Arc<PendingMatchRegistry>,
    coordinator: Arc<SettlementCoordinator>,
    router: Arc<CommandRouter>,
}

impl Ledger {
    /// In-memory ledger using the margin-weighted Elo calculator
    pub fn new(rating: &RatingSettings, metrics_collector: Arc<MetricsCollector>) -> Result<Self> {
        let elo_config = rating.to_elo_config();
        let calculator = Arc::new(MarginEloCalculator::new(elo_config)?);
        let directory = Arc::new(InMemoryPlayerDirectory::new(calculator.initial_rating()));
        let store = Arc::new(InMemoryMatchStore::new());

        info!(
            "Ledger initialized - k_factor: {}, initial_rating: {}",
            calculator.k_factor(),
            calculator.initial_rating()
        );

        Ok(Self::with_components(
            directory,
            store,
            calculator,
            metrics_collector,
        ))
    }

    /// Assemble a ledger around existing collaborators
    pub fn with_components(
        directory: Arc<dyn PlayerDirectory>,
        store: Arc<dyn MatchStore>,
        calculator: Arc<dyn RatingCalculator>,
        metrics_collector: Arc<MetricsCollector>,
    ) -> Self {
        let registry = Arc::new(PendingMatchRegistry::new());
        let coordinator = Arc::new(SettlementCoordinator::with_metrics(
            directory.clone(),
            store.clone(),
            registry.clone(),
            calculator,
            metrics_collector,
        ));
        let router = Arc::new(CommandRouter::new(coordinator.clone()));

        Self {
            directory,
            store,
            registry,
            coordinator,
            router,
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

    pub fn coordinator(&self) -> Arc<SettlementCoordinator> {
        self.coordinator.clone()
    }

    pub fn router(&self) -> Arc<CommandRouter> {
        self.router.clone()
    }

    /// Rebuild pending reports from the match store
    pub async fn restore(&self) -> Result<usize> {
        let restored = self.coordinator.restore_pending().await?;
        info!("Restored {} pending matches from the match store", restored);
        Ok(restored)
    }

    /// Current figures for the gauges
    pub async fn snapshot(&self) -> Result<LedgerSnapshot> {
        Ok(LedgerSnapshot {
            registered_players: self.directory.player_count().await?,
            pending_matches: self.registry.len()?,
        })
    }
}
