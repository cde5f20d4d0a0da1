//! In-game handlers: voting, shared editing, chat, meetings and grading

use crate::broadcast::Outbound;
use crate::catalog::Challenge;
use crate::error::{GameError, GameResult};
use crate::protocol::ServerMessage;
use crate::state::AppState;
use crate::types::{ConnectionId, SessionCode};
use std::sync::Arc;

use super::handlers::find_session;

pub async fn handle_vote_category(
    state: &Arc<AppState>,
    connection_id: &ConnectionId,
    category_id: String,
) -> GameResult<Option<ServerMessage>> {
    let handle = find_session(state, connection_id).await?;
    let mut lobby = handle.lock().await;
    let outbound = lobby.vote(connection_id, &category_id)?;
    state.hub.deliver_all(outbound).await;
    Ok(None)
}

/// Replace the shared code; the author gets no echo
pub async fn handle_code_update(
    state: &Arc<AppState>,
    connection_id: &ConnectionId,
    code: String,
) -> GameResult<Option<ServerMessage>> {
    let handle = find_session(state, connection_id).await?;
    let mut lobby = handle.lock().await;
    let outbound = lobby.update_code(connection_id, code)?;
    state.hub.deliver_all(outbound).await;
    Ok(None)
}

pub async fn handle_chat_message(
    state: &Arc<AppState>,
    connection_id: &ConnectionId,
    text: String,
) -> GameResult<Option<ServerMessage>> {
    let handle = find_session(state, connection_id).await?;
    let mut lobby = handle.lock().await;
    let outbound = lobby.chat(connection_id, &text)?;
    state.hub.deliver_all(outbound).await;
    Ok(None)
}

pub async fn handle_call_meeting(
    state: &Arc<AppState>,
    connection_id: &ConnectionId,
) -> GameResult<Option<ServerMessage>> {
    let handle = find_session(state, connection_id).await?;
    let mut lobby = handle.lock().await;
    let outbound = lobby.call_meeting(connection_id)?;
    state.hub.deliver_all(outbound).await;
    Ok(None)
}

/// Grade `code` against the session's challenge.
///
/// The session hears `tests_running` right away; grading itself runs in a
/// spawned task that publishes `test_results` when done.
pub async fn handle_run_tests(
    state: &Arc<AppState>,
    connection_id: &ConnectionId,
    code: String,
) -> GameResult<Option<ServerMessage>> {
    let handle = find_session(state, connection_id).await?;

    let (session_code, challenge) = {
        let lobby = handle.lock().await;
        let requester = lobby
            .participant(connection_id)
            .ok_or(GameError::NotInSession)?
            .display_name
            .clone();
        let challenge = lobby
            .category()
            .and_then(|category| state.catalog.challenge(category))
            .cloned()
            .ok_or(GameError::NoChallenge)?;

        if !state.grader.is_available() {
            // Clients leave their "running" state on any test_results
            state
                .hub
                .deliver(Outbound::to_many(
                    lobby.connection_ids(),
                    ServerMessage::TestResults {
                        results: Vec::new(),
                    },
                ))
                .await;
            return Err(GameError::Grading(
                "no grading provider is configured".to_string(),
            ));
        }

        tracing::info!(
            "{} requested grading in {} ({})",
            requester,
            lobby.code(),
            challenge.category
        );
        state
            .hub
            .deliver(Outbound::to_many(
                lobby.connection_ids(),
                ServerMessage::TestsRunning {
                    requested_by: requester,
                },
            ))
            .await;

        (lobby.code().clone(), challenge)
    };

    tokio::spawn(grade_and_publish(
        state.clone(),
        connection_id.clone(),
        session_code,
        code,
        challenge,
    ));

    Ok(None)
}

async fn grade_and_publish(
    state: Arc<AppState>,
    requester: ConnectionId,
    session_code: SessionCode,
    code: String,
    challenge: Challenge,
) {
    let results = match state.grader.run_tests(&code, &challenge).await {
        Ok(results) => results,
        Err(e) => {
            tracing::error!("Grading for {} failed: {}", session_code, e);
            state
                .hub
                .send(&requester, GameError::Grading(e.to_string()).into())
                .await;
            Vec::new()
        }
    };

    // The session may have emptied out while grading ran
    let Some(handle) = state.registry.get_session(&session_code).await else {
        tracing::debug!("Session {} is gone, dropping test results", session_code);
        return;
    };
    let lobby = handle.lock().await;
    if !lobby.is_alive() {
        return;
    }
    state
        .hub
        .deliver(Outbound::to_many(
            lobby.connection_ids(),
            ServerMessage::TestResults { results },
        ))
        .await;
}
