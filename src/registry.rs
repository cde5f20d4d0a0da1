//! Live session registry
//!
//! Maps session codes to lobbies. Owned by [`AppState`](crate::state::AppState)
//! rather than living in a global, so every test builds its own.

use crate::catalog::ChallengeCatalog;
use crate::config::GameConfig;
use crate::error::{GameError, GameResult};
use crate::session::{Lobby, SessionHandle};
use crate::types::{ConnectionId, Participant, SessionCode};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};

/// Session code alphabet without look-alikes (no I/1, O/0)
const CODE_CHARS: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";
const CODE_LENGTH: usize = 6;

fn generate_code<R: Rng + ?Sized>(rng: &mut R) -> SessionCode {
    (0..CODE_LENGTH)
        .map(|_| CODE_CHARS[rng.random_range(0..CODE_CHARS.len())] as char)
        .collect()
}

pub struct SessionRegistry {
    sessions: RwLock<HashMap<SessionCode, SessionHandle>>,
    rng: std::sync::Mutex<StdRng>,
    config: GameConfig,
    catalog: Arc<ChallengeCatalog>,
}

impl SessionRegistry {
    /// `seed` makes codes, tie-breaks and role picks reproducible
    pub fn new(config: GameConfig, catalog: Arc<ChallengeCatalog>, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };

        Self {
            sessions: RwLock::new(HashMap::new()),
            rng: std::sync::Mutex::new(rng),
            config,
            catalog,
        }
    }

    fn with_rng<T>(&self, f: impl FnOnce(&mut StdRng) -> T) -> T {
        let mut rng = self.rng.lock().unwrap_or_else(|e| e.into_inner());
        f(&mut rng)
    }

    /// Create a session with `host` as its only participant
    pub async fn create_session(&self, host: Participant) -> (SessionCode, SessionHandle) {
        let mut sessions = self.sessions.write().await;

        let code = loop {
            let code = self.with_rng(|rng| generate_code(rng));
            if !sessions.contains_key(&code) {
                break code;
            }
            tracing::debug!("Session code collision on {}, regenerating", code);
        };

        let lobby_rng = self.with_rng(|rng| StdRng::seed_from_u64(rng.random()));
        tracing::info!("Session {} created by {}", code, host.display_name);

        let lobby = Lobby::new(
            code.clone(),
            host,
            self.config.clone(),
            self.catalog.clone(),
            lobby_rng,
        );
        let handle = Arc::new(Mutex::new(lobby));
        sessions.insert(code.clone(), handle.clone());

        (code, handle)
    }

    /// Resolve a code for a join request.
    ///
    /// Capacity and phase are checked by [`Lobby::add_participant`] under the
    /// session's own lock.
    pub async fn join_session(&self, code: &str) -> GameResult<SessionHandle> {
        self.get_session(code).await.ok_or(GameError::NotFound)
    }

    pub async fn get_session(&self, code: &str) -> Option<SessionHandle> {
        self.sessions.read().await.get(code).cloned()
    }

    /// Linear scan over every live session's roster
    pub async fn find_session_by_connection(
        &self,
        connection_id: &ConnectionId,
    ) -> Option<SessionHandle> {
        let sessions = self.sessions.read().await;
        for handle in sessions.values() {
            let lobby = handle.lock().await;
            if lobby.is_alive() && lobby.has_connection(connection_id) {
                return Some(handle.clone());
            }
        }
        None
    }

    /// Unregister a session. Its timers must already be stopped via
    /// [`Lobby::shutdown`]; the caller must not hold the lobby lock.
    pub async fn destroy_session(&self, code: &str) -> Option<SessionHandle> {
        let removed = self.sessions.write().await.remove(code);
        if removed.is_some() {
            tracing::info!("Session {} removed", code);
        }
        removed
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }

    pub async fn codes(&self) -> Vec<SessionCode> {
        self.sessions.read().await.keys().cloned().collect()
    }
}
