use crate::protocol::ServerMessage;
use crate::types::SessionStatus;

pub type GameResult<T> = Result<T, GameError>;

/// Rejected client actions. None of these mutate session state.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GameError {
    #[error("Session not found")]
    NotFound,

    #[error("You are not in a session")]
    NotInSession,

    #[error("Only the host can {0}")]
    Forbidden(String),

    #[error("Session is full")]
    Capacity,

    #[error("Invalid vote: {0}")]
    InvalidVote(String),

    #[error("Need at least {need} players to start, have {have}")]
    NotEnoughParticipants { have: usize, need: usize },

    #[error("Session is in {actual:?}, expected {expected:?}")]
    WrongPhase {
        expected: SessionStatus,
        actual: SessionStatus,
    },

    #[error("Already in a session")]
    AlreadyInSession,

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("No challenge available for this session")]
    NoChallenge,

    #[error("Grading failed: {0}")]
    Grading(String),
}

impl GameError {
    /// Stable machine-readable code sent to clients
    pub fn code(&self) -> &'static str {
        match self {
            GameError::NotFound | GameError::NotInSession => "NOT_FOUND",
            GameError::Forbidden(_) => "FORBIDDEN",
            GameError::Capacity => "LOBBY_FULL",
            GameError::InvalidVote(_) => "INVALID_VOTE",
            GameError::NotEnoughParticipants { .. } => "NOT_ENOUGH_PLAYERS",
            GameError::WrongPhase { .. } => "WRONG_PHASE",
            GameError::AlreadyInSession => "ALREADY_IN_SESSION",
            GameError::BadRequest(_) => "BAD_REQUEST",
            GameError::NoChallenge => "NO_CHALLENGE",
            GameError::Grading(_) => "GRADING_FAILED",
        }
    }
}

impl From<GameError> for ServerMessage {
    fn from(err: GameError) -> Self {
        ServerMessage::Error {
            code: err.code().to_string(),
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_to_server_message() {
        let msg: ServerMessage = GameError::Forbidden("start the game".to_string()).into();
        match msg {
            ServerMessage::Error { code, message } => {
                assert_eq!(code, "FORBIDDEN");
                assert_eq!(message, "Only the host can start the game");
            }
            _ => panic!("Expected Error message"),
        }
    }

    #[test]
    fn test_not_enough_participants_message() {
        let err = GameError::NotEnoughParticipants { have: 2, need: 3 };
        assert_eq!(err.code(), "NOT_ENOUGH_PLAYERS");
        assert!(err.to_string().contains("at least 3"));
    }
}
