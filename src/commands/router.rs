//! Command dispatch
//!
//! Turns a [`CommandRequest`] into the notifications it produces. Input
//! formats are checked here, before anything reaches the coordinator, and
//! every failure becomes a reply to the actor instead of an error.

use crate::commands::replies;
use crate::directory::PlayerDirectory;
use crate::error::{error_kind, ErrorKind, LedgerError, Result};
use crate::matches::{MatchStore, SettlementCoordinator};
use crate::metrics::MetricsCollector;
use crate::types::*;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Routes commands to the directory, store and coordinator
pub struct CommandRouter {
    coordinator: Arc<SettlementCoordinator>,
    directory: Arc<dyn PlayerDirectory>,
    store: Arc<dyn MatchStore>,
    metrics_collector: Arc<MetricsCollector>,
}

impl CommandRouter {
    pub fn new(coordinator: Arc<SettlementCoordinator>) -> Self {
        Self {
            directory: coordinator.directory(),
            store: coordinator.store(),
            metrics_collector: coordinator.metrics(),
            coordinator,
        }
    }

    pub fn coordinator(&self) -> Arc<SettlementCoordinator> {
        self.coordinator.clone()
    }

    /// Run one command and collect every notification it produces.
    ///
    /// Never fails: errors turn into a `CommandFailed` reply to the actor.
    pub async fn dispatch(&self, request: &CommandRequest) -> Vec<Notification> {
        let command = request.command.name();
        let timer = self.metrics_collector.start_timer();

        debug!("Dispatching {} for actor {}", command, request.actor);

        let (notifications, outcome) = match self.execute(request).await {
            Ok(notifications) => (notifications, None),
            Err(e) => {
                let kind = error_kind(&e);
                match kind {
                    ErrorKind::Internal | ErrorKind::PartialFailure => warn!(
                        "Command {} from {} failed ({}): {:#}",
                        command,
                        request.actor,
                        kind.as_str(),
                        e
                    ),
                    _ => info!(
                        "Command {} from {} rejected ({}): {}",
                        command,
                        request.actor,
                        kind.as_str(),
                        e
                    ),
                }

                let mut reply = Notification::new(
                    request.actor,
                    NotificationKind::CommandFailed,
                    replies::failure(command, &e),
                );
                if let Some(match_id) = match_id_of(&request.command) {
                    reply = reply.for_match(match_id);
                }
                (vec![reply], Some(kind))
            }
        };

        self.metrics_collector
            .record_command(command, outcome, timer.stop());

        notifications
    }

    async fn execute(&self, request: &CommandRequest) -> Result<Vec<Notification>> {
        let actor = request.actor;

        match &request.command {
            Command::Register {
                name,
                surname,
                position,
            } => self.register(actor, name, surname, *position).await,
            Command::SubmitMatch {
                opponent_index,
                score,
            } => {
                self.submit(actor, request.username.as_deref(), opponent_index, score)
                    .await
            }
            Command::ConfirmMatch { match_id } => {
                let outcome = self.coordinator.confirm(actor, *match_id).await?;
                Ok(outcome.notifications)
            }
            Command::RejectMatch { match_id } => {
                let outcome = self.coordinator.reject(actor, *match_id).await?;
                Ok(outcome.notifications)
            }
            Command::MyStats => {
                let player = self.registered(actor).await?;
                Ok(vec![reply(actor, replies::my_stats(&player))])
            }
            Command::AllStats => {
                let entries = self.directory.leaderboard().await?;
                Ok(vec![reply(actor, replies::leaderboard(&entries))])
            }
            Command::MatchHistory { limit } => self.history(actor, *limit).await,
            Command::PendingMatches => self.pending(actor).await,
        }
    }

    async fn register(
        &self,
        actor: TransportId,
        name: &str,
        surname: &str,
        position: Position,
    ) -> Result<Vec<Notification>> {
        let index = self
            .directory
            .register(actor, name.trim(), surname.trim(), position)
            .await?;
        self.metrics_collector.record_registration();

        let player = self.registered(actor).await?;
        Ok(vec![reply(actor, replies::registered(&index, player.rating))])
    }

    async fn submit(
        &self,
        actor: TransportId,
        username: Option<&str>,
        opponent_index: &str,
        score: &str,
    ) -> Result<Vec<Notification>> {
        let index = PublicIndex::parse(opponent_index)?;
        let score: ScoreLine = score.parse()?;

        self.registered(actor).await?;
        let opponent = self
            .directory
            .get_by_public_index(&index)
            .await?
            .ok_or_else(|| LedgerError::UnknownPlayerIndex {
                index: index.to_string(),
            })?;

        let outcome = self
            .coordinator
            .submit_with_handle(actor, username, opponent.transport_id, score)
            .await?;

        Ok(vec![
            reply(actor, replies::MATCH_SUBMITTED).for_match(outcome.pending.match_id),
            outcome.notification,
        ])
    }

    async fn history(&self, actor: TransportId, limit: usize) -> Result<Vec<Notification>> {
        self.registered(actor).await?;

        let records = self.store.history_for(actor, limit).await?;
        let ids: Vec<TransportId> = records
            .iter()
            .flat_map(|r| [r.reporter, r.opponent])
            .collect();
        let names = self.names_of(&ids).await?;

        let text = replies::history(actor, &records, |id| display(&names, id));
        Ok(vec![reply(actor, text)])
    }

    async fn pending(&self, actor: TransportId) -> Result<Vec<Notification>> {
        self.registered(actor).await?;

        let entries = self.coordinator.pending_for(actor)?;
        let ids: Vec<TransportId> = entries.iter().map(|e| e.reporter).collect();
        let names = self.names_of(&ids).await?;

        let text = replies::pending(&entries, |id| display(&names, id));
        Ok(vec![reply(actor, text)])
    }

    async fn registered(&self, actor: TransportId) -> Result<Player> {
        self.directory
            .get_by_transport_id(actor)
            .await?
            .ok_or_else(|| {
                LedgerError::UnregisteredPlayer {
                    player: actor.to_string(),
                }
                .into()
            })
    }

    async fn names_of(&self, ids: &[TransportId]) -> Result<HashMap<TransportId, String>> {
        let mut names = HashMap::new();
        for &id in ids {
            if names.contains_key(&id) {
                continue;
            }
            if let Some(player) = self.directory.get_by_transport_id(id).await? {
                names.insert(id, player.display_name());
            }
        }
        Ok(names)
    }
}

fn reply(actor: TransportId, text: impl Into<String>) -> Notification {
    Notification::new(actor, NotificationKind::CommandReply, text)
}

fn display(names: &HashMap<TransportId, String>, id: TransportId) -> String {
    names
        .get(&id)
        .cloned()
        .unwrap_or_else(|| "Unknown player".to_string())
}

fn match_id_of(command: &Command) -> Option<MatchId> {
    match command {
        Command::ConfirmMatch { match_id } | Command::RejectMatch { match_id } => Some(*match_id),
        _ => None,
    }
}
