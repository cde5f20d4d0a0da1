//! Session membership handlers
//!
//! Create, join, start and leave. Leaving and disconnecting share
//! [`remove_from_session`], which also tears the session down once it is empty.

use crate::error::{GameError, GameResult};
use crate::protocol::ServerMessage;
use crate::session::timers;
use crate::state::AppState;
use crate::types::{ConnectionId, Participant, SessionCode};
use std::sync::Arc;

use super::handlers::find_session;

/// Trim and cap a display name; empty names are rejected
fn clean_display_name(raw: &str, max_chars: usize) -> GameResult<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(GameError::BadRequest(
            "display name must not be empty".to_string(),
        ));
    }
    Ok(trimmed.chars().take(max_chars).collect())
}

async fn ensure_not_in_session(state: &Arc<AppState>, connection_id: &ConnectionId) -> GameResult<()> {
    match state.registry.find_session_by_connection(connection_id).await {
        Some(_) => Err(GameError::AlreadyInSession),
        None => Ok(()),
    }
}

pub async fn handle_create_session(
    state: &Arc<AppState>,
    connection_id: &ConnectionId,
    display_name: String,
) -> GameResult<Option<ServerMessage>> {
    let name = clean_display_name(&display_name, state.config.max_name_chars)?;
    ensure_not_in_session(state, connection_id).await?;

    let host = Participant::new(connection_id.clone(), name, true);
    let (code, handle) = state.registry.create_session(host).await;

    let lobby = handle.lock().await;
    state.hub.deliver(lobby.state_broadcast()).await;

    Ok(Some(ServerMessage::SessionCreated {
        code,
        participant_id: connection_id.clone(),
    }))
}

pub async fn handle_join_session(
    state: &Arc<AppState>,
    connection_id: &ConnectionId,
    code: SessionCode,
    display_name: String,
) -> GameResult<Option<ServerMessage>> {
    let name = clean_display_name(&display_name, state.config.max_name_chars)?;
    ensure_not_in_session(state, connection_id).await?;

    let code = code.trim().to_uppercase();
    let handle = state.registry.join_session(&code).await?;

    let mut lobby = handle.lock().await;
    let outbound = lobby.add_participant(Participant::new(connection_id.clone(), name, false))?;
    state.hub.deliver_all(outbound).await;

    Ok(Some(ServerMessage::SessionJoined {
        code,
        participant_id: connection_id.clone(),
    }))
}

/// Host only: open category voting and arm the countdown
pub async fn handle_start_session(
    state: &Arc<AppState>,
    connection_id: &ConnectionId,
) -> GameResult<Option<ServerMessage>> {
    let handle = find_session(state, connection_id).await?;

    let mut lobby = handle.lock().await;
    let outbound = lobby.start(connection_id)?;
    timers::arm_voting_countdown(&mut lobby, &handle, &state.hub);
    state.hub.deliver_all(outbound).await;

    Ok(None)
}

pub async fn handle_leave_session(
    state: &Arc<AppState>,
    connection_id: &ConnectionId,
) -> GameResult<Option<ServerMessage>> {
    let code = remove_from_session(state, connection_id)
        .await
        .ok_or(GameError::NotInSession)?;

    Ok(Some(ServerMessage::SessionLeft { code }))
}

/// Socket closed: drop the connection from its session and the hub
pub async fn handle_disconnect(state: &Arc<AppState>, connection_id: &ConnectionId) {
    if let Some(code) = remove_from_session(state, connection_id).await {
        tracing::info!("{} disconnected from session {}", connection_id, code);
    }
    state.hub.unregister(connection_id).await;
}

/// Remove `connection_id` from whatever session it is in.
///
/// An emptied session is shut down and unregistered. Returns the session code,
/// or `None` if the connection was not in a session.
async fn remove_from_session(state: &Arc<AppState>, connection_id: &ConnectionId) -> Option<SessionCode> {
    let handle = state
        .registry
        .find_session_by_connection(connection_id)
        .await?;

    let (code, now_empty) = {
        let mut lobby = handle.lock().await;
        let (removed, outbound) = lobby.remove_participant(connection_id)?;
        tracing::info!("{} left session {}", removed.display_name, lobby.code());
        state.hub.deliver_all(outbound).await;

        let now_empty = lobby.is_empty();
        if now_empty {
            lobby.shutdown();
        }
        (lobby.code().clone(), now_empty)
    };

    // Registry lock is taken only after the lobby guard is gone
    if now_empty {
        state.registry.destroy_session(&code).await;
    }
    Some(code)
}
