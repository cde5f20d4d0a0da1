//! WebSocket message dispatch
//!
//! Entry point for every parsed client message. Handlers live in [`lobby`] and
//! [`game`] and return `GameResult<Option<ServerMessage>>`: the optional message
//! is the direct reply to the sender, everything else goes out through the hub.
//! Rejections are turned into a private `error` reply here.

use crate::error::{GameError, GameResult};
use crate::protocol::{ClientMessage, ServerMessage};
use crate::session::SessionHandle;
use crate::state::AppState;
use crate::types::ConnectionId;
use std::sync::Arc;

use super::{game, lobby};

/// Handle a client message and return the optional direct reply
pub async fn handle_message(
    msg: ClientMessage,
    connection_id: &ConnectionId,
    state: &Arc<AppState>,
) -> Option<ServerMessage> {
    let result = match msg {
        ClientMessage::Ping => {
            return Some(ServerMessage::Pong {
                server_now: chrono::Utc::now().to_rfc3339(),
            })
        }

        // Session membership
        ClientMessage::CreateSession { display_name } => {
            lobby::handle_create_session(state, connection_id, display_name).await
        }

        ClientMessage::JoinSession { code, display_name } => {
            lobby::handle_join_session(state, connection_id, code, display_name).await
        }

        ClientMessage::StartSession => lobby::handle_start_session(state, connection_id).await,

        ClientMessage::LeaveSession => lobby::handle_leave_session(state, connection_id).await,

        // In-game actions
        ClientMessage::VoteCategory { category_id } => {
            game::handle_vote_category(state, connection_id, category_id).await
        }

        ClientMessage::CodeUpdate { code } => {
            game::handle_code_update(state, connection_id, code).await
        }

        ClientMessage::ChatMessage { text } => {
            game::handle_chat_message(state, connection_id, text).await
        }

        ClientMessage::CallMeeting => game::handle_call_meeting(state, connection_id).await,

        ClientMessage::RunTests { code } => game::handle_run_tests(state, connection_id, code).await,
    };

    match result {
        Ok(reply) => reply,
        Err(e) => {
            tracing::warn!("Rejected message from {}: {}", connection_id, e);
            Some(e.into())
        }
    }
}

/// The live session this connection belongs to
pub(super) async fn find_session(
    state: &Arc<AppState>,
    connection_id: &ConnectionId,
) -> GameResult<SessionHandle> {
    state
        .registry
        .find_session_by_connection(connection_id)
        .await
        .ok_or(GameError::NotInSession)
}
