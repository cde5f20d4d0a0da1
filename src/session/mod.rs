//! Per-session state machine
//!
//! A [`Lobby`] owns everything about one running game: roster, phase, votes,
//! shared code, sabotage progress and its own timers. Every mutation goes
//! through `&mut Lobby`, and the lobby lives behind a [`SessionHandle`] mutex,
//! so all events for one session are serialized while different sessions run
//! independently.
//!
//! Methods never talk to sockets. They return [`Outbound`] envelopes that the
//! caller hands to the hub, ideally while still holding the lock so a session's
//! messages leave in the order its state changed.

pub mod roles;
pub mod sabotage;
pub mod timers;
pub mod vote;

use crate::broadcast::Outbound;
use crate::catalog::ChallengeCatalog;
use crate::config::GameConfig;
use crate::error::{GameError, GameResult};
use crate::protocol::ServerMessage;
use crate::types::*;
use rand::rngs::StdRng;
use sabotage::SabotageEngine;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::AbortHandle;
use vote::CategoryVoteTally;

pub type SessionHandle = Arc<Mutex<Lobby>>;

/// Scheduled work owned by a session.
///
/// Every phase change bumps `generation` and aborts outstanding tasks. A timer
/// that already fired and is waiting on the lock sees a stale generation and
/// does nothing.
#[derive(Debug, Default)]
struct SessionTimers {
    generation: u64,
    voting: Option<AbortHandle>,
    reveal: Option<AbortHandle>,
}

/// Result of one countdown tick
#[derive(Debug)]
pub struct VotingTick {
    pub outbound: Vec<Outbound>,
    /// True when this tick closed voting and moved the session to role reveal
    pub resolved: bool,
}

pub struct Lobby {
    code: SessionCode,
    participants: Vec<Participant>,
    status: SessionStatus,
    category: Option<Category>,
    voting_seconds_remaining: Option<u32>,
    shared_code: String,
    votes: CategoryVoteTally,
    sabotage: SabotageEngine,
    saboteur_connection_id: Option<ConnectionId>,
    timers: SessionTimers,
    alive: bool,
    config: GameConfig,
    catalog: Arc<ChallengeCatalog>,
    rng: StdRng,
}

impl Lobby {
    pub fn new(
        code: SessionCode,
        host: Participant,
        config: GameConfig,
        catalog: Arc<ChallengeCatalog>,
        rng: StdRng,
    ) -> Self {
        let mut host = host;
        host.is_host = true;

        Self {
            code,
            participants: vec![host],
            status: SessionStatus::Waiting,
            category: None,
            voting_seconds_remaining: None,
            shared_code: String::new(),
            votes: CategoryVoteTally::new(),
            sabotage: SabotageEngine::default(),
            saboteur_connection_id: None,
            timers: SessionTimers::default(),
            alive: true,
            config,
            catalog,
            rng,
        }
    }

    pub fn code(&self) -> &SessionCode {
        &self.code
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    pub fn category(&self) -> Option<Category> {
        self.category
    }

    pub fn shared_code(&self) -> &str {
        &self.shared_code
    }

    pub fn voting_seconds_remaining(&self) -> Option<u32> {
        self.voting_seconds_remaining
    }

    pub fn participants(&self) -> &[Participant] {
        &self.participants
    }

    pub fn participant(&self, connection_id: &ConnectionId) -> Option<&Participant> {
        self.participants
            .iter()
            .find(|p| p.connection_id == *connection_id)
    }

    pub fn has_connection(&self, connection_id: &ConnectionId) -> bool {
        self.participant(connection_id).is_some()
    }

    pub fn host(&self) -> Option<&Participant> {
        self.participants.iter().find(|p| p.is_host)
    }

    pub fn saboteur_connection_id(&self) -> Option<&ConnectionId> {
        self.saboteur_connection_id.as_ref()
    }

    pub fn sabotage_tasks(&self) -> Vec<SabotageTaskState> {
        self.sabotage.tasks()
    }

    pub fn len(&self) -> usize {
        self.participants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.participants.is_empty()
    }

    /// False once the session has been shut down for destruction
    pub fn is_alive(&self) -> bool {
        self.alive
    }

    pub fn config(&self) -> &GameConfig {
        &self.config
    }

    pub fn timer_generation(&self) -> u64 {
        self.timers.generation
    }

    pub fn connection_ids(&self) -> Vec<ConnectionId> {
        self.participants
            .iter()
            .map(|p| p.connection_id.clone())
            .collect()
    }

    fn connection_ids_except(&self, excluded: &ConnectionId) -> Vec<ConnectionId> {
        self.participants
            .iter()
            .filter(|p| p.connection_id != *excluded)
            .map(|p| p.connection_id.clone())
            .collect()
    }

    /// Roster and phase as every participant may see it
    pub fn view(&self) -> SessionView {
        let vote_counts = if self.status == SessionStatus::VotingCategory {
            self.votes.counts()
        } else {
            BTreeMap::new()
        };

        SessionView {
            code: self.code.clone(),
            participants: self.participants.iter().map(Participant::view).collect(),
            status: self.status,
            category: self.category,
            voting_seconds_remaining: self.voting_seconds_remaining,
            shared_code: self.shared_code.clone(),
            vote_counts,
        }
    }

    /// `session_update` addressed to the whole session
    pub fn state_broadcast(&self) -> Outbound {
        self.to_all(ServerMessage::SessionUpdate {
            session: self.view(),
        })
    }

    fn to_all(&self, message: ServerMessage) -> Outbound {
        Outbound::to_many(self.connection_ids(), message)
    }

    fn require_participant(&self, connection_id: &ConnectionId) -> GameResult<&Participant> {
        self.participant(connection_id).ok_or(GameError::NotInSession)
    }

    pub fn add_participant(&mut self, participant: Participant) -> GameResult<Vec<Outbound>> {
        if !self.alive {
            return Err(GameError::NotFound);
        }
        if self.status != SessionStatus::Waiting {
            return Err(GameError::WrongPhase {
                expected: SessionStatus::Waiting,
                actual: self.status,
            });
        }
        if self.participants.len() >= self.config.max_participants {
            return Err(GameError::Capacity);
        }
        if self.has_connection(&participant.connection_id) {
            return Err(GameError::AlreadyInSession);
        }

        let mut participant = participant;
        participant.is_host = false;
        participant.role = None;
        tracing::info!(
            "{} joined session {} ({} players)",
            participant.display_name,
            self.code,
            self.participants.len() + 1
        );
        self.participants.push(participant);

        Ok(vec![self.state_broadcast()])
    }

    /// Remove a participant, handing the host flag to the next in join order.
    ///
    /// When the last participant leaves, the returned batch is empty and the
    /// caller is expected to [`shutdown`](Self::shutdown) and destroy the session.
    pub fn remove_participant(
        &mut self,
        connection_id: &ConnectionId,
    ) -> Option<(Participant, Vec<Outbound>)> {
        let index = self
            .participants
            .iter()
            .position(|p| p.connection_id == *connection_id)?;
        let removed = self.participants.remove(index);

        self.votes.remove(&removed.id);
        if self.saboteur_connection_id.as_ref() == Some(&removed.connection_id) {
            self.saboteur_connection_id = None;
        }

        if removed.is_host {
            if let Some(next) = self.participants.first_mut() {
                next.is_host = true;
                tracing::info!("Host of {} is now {}", self.code, next.display_name);
            }
        }

        let mut outbound = Vec::new();
        if !self.participants.is_empty() {
            if self.status != SessionStatus::Waiting {
                outbound.push(self.to_all(ServerMessage::ChatMessage(ChatMessage::system(
                    format!("{} left the game", removed.display_name),
                ))));
            }
            outbound.push(self.state_broadcast());
        }

        Some((removed, outbound))
    }

    /// Host-only: open category voting.
    ///
    /// The caller arms the countdown afterwards with
    /// [`timers::arm_voting_countdown`].
    pub fn start(&mut self, requester: &ConnectionId) -> GameResult<Vec<Outbound>> {
        let participant = self.require_participant(requester)?;
        if !participant.is_host {
            return Err(GameError::Forbidden("start the game".to_string()));
        }
        if self.status != SessionStatus::Waiting {
            return Err(GameError::WrongPhase {
                expected: SessionStatus::Waiting,
                actual: self.status,
            });
        }
        if self.participants.len() < self.config.min_participants {
            return Err(GameError::NotEnoughParticipants {
                have: self.participants.len(),
                need: self.config.min_participants,
            });
        }

        self.invalidate_timers();
        self.votes.clear();
        self.category = None;
        self.voting_seconds_remaining = Some(self.config.voting_seconds);
        self.status = SessionStatus::VotingCategory;
        tracing::info!("Session {} started category voting", self.code);

        Ok(vec![self.state_broadcast()])
    }

    /// Record or overwrite a participant's category vote
    pub fn vote(&mut self, voter: &ConnectionId, category_id: &str) -> GameResult<Vec<Outbound>> {
        if self.status != SessionStatus::VotingCategory {
            return Err(GameError::InvalidVote("voting is not open".to_string()));
        }
        let voter_id = self.require_participant(voter)?.id.clone();
        let category: Category = category_id.parse().map_err(GameError::InvalidVote)?;

        self.votes.record(&voter_id, category);
        tracing::debug!("{} voted {} in {}", voter_id, category, self.code);

        Ok(vec![self.state_broadcast()])
    }

    /// Advance the voting countdown by one second.
    ///
    /// Returns `None` when `generation` no longer matches, i.e. the timer that
    /// called this was superseded or the session is gone.
    pub fn tick_voting(&mut self, generation: u64) -> Option<VotingTick> {
        if !self.timer_is_current(generation) || self.status != SessionStatus::VotingCategory {
            return None;
        }

        let remaining = self
            .voting_seconds_remaining
            .unwrap_or(0)
            .saturating_sub(1);
        self.voting_seconds_remaining = Some(remaining);

        if remaining > 0 {
            return Some(VotingTick {
                outbound: vec![self.state_broadcast()],
                resolved: false,
            });
        }

        // The countdown task is the caller; drop its handle without aborting it
        self.timers.voting = None;
        Some(VotingTick {
            outbound: self.resolve_voting(),
            resolved: true,
        })
    }

    /// Close voting: pick the category, assign roles, load the challenge.
    fn resolve_voting(&mut self) -> Vec<Outbound> {
        self.invalidate_timers();

        let category = self.votes.resolve(&mut self.rng);
        self.category = Some(category);
        self.voting_seconds_remaining = None;
        self.status = SessionStatus::RoleReveal;

        let saboteur = roles::assign_roles(&mut self.participants, &mut self.rng);
        self.saboteur_connection_id =
            saboteur.map(|i| self.participants[i].connection_id.clone());

        self.shared_code = self.catalog.starter_code(category).to_string();
        self.sabotage = match self.catalog.challenge(category) {
            Some(challenge) => SabotageEngine::from_challenge(challenge),
            None => {
                tracing::warn!("No challenge for category {}", category);
                SabotageEngine::default()
            }
        };

        tracing::info!(
            "Session {} voted for {} ({} votes cast)",
            self.code,
            category,
            self.votes.len()
        );

        let mut outbound = vec![self.state_broadcast()];
        for p in &self.participants {
            if let Some(role) = p.role {
                outbound.push(Outbound::to_one(
                    &p.connection_id,
                    ServerMessage::RoleAssigned { role, category },
                ));
            }
        }
        if let Some(saboteur) = &self.saboteur_connection_id {
            outbound.push(Outbound::to_one(
                saboteur,
                ServerMessage::SabotageTasks {
                    tasks: self.sabotage.tasks(),
                },
            ));
        }
        outbound
    }

    /// Reveal delay elapsed: move to `playing`
    pub fn finish_reveal(&mut self, generation: u64) -> Option<Vec<Outbound>> {
        if !self.timer_is_current(generation) || self.status != SessionStatus::RoleReveal {
            return None;
        }

        self.timers.reveal = None;
        self.invalidate_timers();
        self.status = SessionStatus::Playing;
        tracing::info!("Session {} is now playing", self.code);

        Some(vec![self.state_broadcast()])
    }

    /// Replace the shared code and run sabotage detection.
    ///
    /// The sync goes to everyone except the author.
    pub fn update_code(&mut self, sender: &ConnectionId, code: String) -> GameResult<Vec<Outbound>> {
        let sender_id = self.require_participant(sender)?.id.clone();
        self.shared_code = code;

        let mut outbound = vec![Outbound::to_many(
            self.connection_ids_except(sender),
            ServerMessage::CodeSync {
                code: self.shared_code.clone(),
                sender_id,
            },
        )];

        if let Some(saboteur) = &self.saboteur_connection_id {
            if !self.sabotage.is_empty() && self.sabotage.evaluate(&self.shared_code) {
                tracing::info!(
                    "Saboteur in {} completed a task ({}/{})",
                    self.code,
                    self.sabotage.completed_count(),
                    self.sabotage.tasks().len()
                );
                outbound.push(Outbound::to_one(
                    saboteur,
                    ServerMessage::SabotageUpdate {
                        tasks: self.sabotage.tasks(),
                    },
                ));
            }
        }

        Ok(outbound)
    }

    /// Broadcast a chat line, truncated to the configured length
    pub fn chat(&mut self, sender: &ConnectionId, text: &str) -> GameResult<Vec<Outbound>> {
        let participant = self.require_participant(sender)?;
        let text = text.trim();
        if text.is_empty() {
            return Err(GameError::BadRequest("empty chat message".to_string()));
        }
        let text: String = text.chars().take(self.config.max_chat_chars).collect();

        let message = ChatMessage::from_participant(participant, text);
        Ok(vec![self.to_all(ServerMessage::ChatMessage(message))])
    }

    pub fn call_meeting(&mut self, caller: &ConnectionId) -> GameResult<Vec<Outbound>> {
        let caller_name = self.require_participant(caller)?.display_name.clone();
        tracing::info!("{} called a meeting in {}", caller_name, self.code);

        Ok(vec![
            self.to_all(ServerMessage::MeetingCalled {
                caller_name: caller_name.clone(),
            }),
            self.to_all(ServerMessage::ChatMessage(ChatMessage::system(format!(
                "{} called an emergency meeting",
                caller_name
            )))),
        ])
    }

    /// Stop all timers and refuse further joins. Safe to call repeatedly.
    pub fn shutdown(&mut self) {
        if self.alive {
            tracing::debug!("Shutting down session {}", self.code);
        }
        self.alive = false;
        self.invalidate_timers();
    }

    pub(crate) fn set_voting_timer(&mut self, handle: AbortHandle) {
        if let Some(old) = self.timers.voting.replace(handle) {
            old.abort();
        }
    }

    pub(crate) fn set_reveal_timer(&mut self, handle: AbortHandle) {
        if let Some(old) = self.timers.reveal.replace(handle) {
            old.abort();
        }
    }

    fn timer_is_current(&self, generation: u64) -> bool {
        self.alive && self.timers.generation == generation
    }

    fn invalidate_timers(&mut self) {
        self.timers.generation += 1;
        if let Some(handle) = self.timers.voting.take() {
            handle.abort();
        }
        if let Some(handle) = self.timers.reveal.take() {
            handle.abort();
        }
    }
}
