//! Test fixtures for integration testing

#![allow(dead_code)]

use chrono::Utc;
use rally_ledger::amqp::{MessageHandler, RecordingNotificationPublisher};
use rally_ledger::config::RatingSettings;
use rally_ledger::directory::{MockPlayerDirectory, PlayerDirectory};
use rally_ledger::matches::{MatchStore, MockMatchStore};
use rally_ledger::metrics::MetricsCollector;
use rally_ledger::rating::MarginEloCalculator;
use rally_ledger::service::{Ledger, LedgerMessageHandler};
use rally_ledger::types::{
    Command, CommandRequest, MatchId, Notification, NotificationKind, Player, Position,
    PublicIndex, TransportId,
};
use std::sync::Arc;

/// A ledger wired to a recording publisher, driven through the message handler
pub struct TestSystem {
    pub ledger: Ledger,
    pub handler: LedgerMessageHandler,
    pub publisher: Arc<RecordingNotificationPublisher>,
}

impl TestSystem {
    /// In-memory ledger with default rating settings
    pub fn new() -> Self {
        let metrics = Arc::new(MetricsCollector::new().expect("metrics collector"));
        let ledger = Ledger::new(&RatingSettings::default(), metrics.clone()).expect("ledger");
        Self::around(ledger, metrics)
    }

    /// Ledger over failure-injecting directory and store
    pub fn with_mocks(directory: Arc<MockPlayerDirectory>, store: Arc<MockMatchStore>) -> Self {
        let metrics = Arc::new(MetricsCollector::new().expect("metrics collector"));
        let ledger = Ledger::with_components(
            directory,
            store,
            Arc::new(MarginEloCalculator::default()),
            metrics.clone(),
        );
        Self::around(ledger, metrics)
    }

    fn around(ledger: Ledger, metrics: Arc<MetricsCollector>) -> Self {
        let publisher = Arc::new(RecordingNotificationPublisher::new());
        let handler = LedgerMessageHandler::new(ledger.router(), publisher.clone(), metrics);

        Self {
            ledger,
            handler,
            publisher,
        }
    }

    /// Handle a command as if it arrived from the queue, returning what was
    /// published in response
    pub async fn send(&self, actor: TransportId, command: Command) -> Vec<Notification> {
        let before = self.publisher.get_published().len();
        self.handler
            .handle_command(request(actor, command))
            .await
            .expect("handler never fails a decoded command");
        self.publisher.get_published().split_off(before)
    }

    /// Register a player and return their public index
    pub async fn register(&self, actor: TransportId, name: &str, surname: &str) -> PublicIndex {
        let replies = self
            .send(
                actor,
                Command::Register {
                    name: name.to_string(),
                    surname: surname.to_string(),
                    position: Position::Student,
                },
            )
            .await;
        assert_eq!(replies.len(), 1);
        assert_eq!(replies[0].kind, NotificationKind::CommandReply);

        self.player(actor).await.public_index
    }

    /// Report a match and return the allocated id
    pub async fn submit(&self, reporter: TransportId, opponent: &PublicIndex, score: &str) -> MatchId {
        let replies = self
            .send(
                reporter,
                Command::SubmitMatch {
                    opponent_index: opponent.as_str().to_string(),
                    score: score.to_string(),
                },
            )
            .await;
        assert_eq!(replies.len(), 2, "unexpected replies: {:?}", replies);
        replies[0].match_id.expect("submit reply carries the match id")
    }

    pub async fn player(&self, actor: TransportId) -> Player {
        self.ledger
            .directory()
            .get_by_transport_id(actor)
            .await
            .expect("directory read")
            .expect("player registered")
    }

    pub async fn rating(&self, actor: TransportId) -> i32 {
        self.player(actor).await.rating
    }

    pub async fn store_row_confirmed(&self, match_id: MatchId) -> Option<bool> {
        self.ledger
            .store()
            .get(match_id)
            .await
            .expect("store read")
            .map(|row| row.confirmed)
    }
}

pub fn request(actor: TransportId, command: Command) -> CommandRequest {
    CommandRequest {
        actor,
        username: None,
        command,
        timestamp: Utc::now(),
    }
}
