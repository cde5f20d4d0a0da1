use crate::types::*;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "t", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum ClientMessage {
    CreateSession {
        display_name: String,
    },
    JoinSession {
        code: SessionCode,
        display_name: String,
    },
    /// Host only: begin category voting
    StartSession,
    VoteCategory {
        category_id: String,
    },
    CodeUpdate {
        code: String,
    },
    ChatMessage {
        text: String,
    },
    CallMeeting,
    RunTests {
        code: String,
    },
    /// Leave the current session but keep the socket open
    LeaveSession,
    Ping,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "t", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum ServerMessage {
    Connected {
        participant_id: ParticipantId,
        server_now: String,
    },
    SessionCreated {
        code: SessionCode,
        participant_id: ParticipantId,
    },
    SessionJoined {
        code: SessionCode,
        participant_id: ParticipantId,
    },
    SessionLeft {
        code: SessionCode,
    },
    SessionUpdate {
        session: SessionView,
    },
    /// Private: sent only to the participant the role belongs to
    RoleAssigned {
        role: Role,
        category: Category,
    },
    /// Private: saboteur only
    SabotageTasks {
        tasks: Vec<SabotageTaskState>,
    },
    /// Private: saboteur only
    SabotageUpdate {
        tasks: Vec<SabotageTaskState>,
    },
    CodeSync {
        code: String,
        sender_id: ParticipantId,
    },
    ChatMessage(ChatMessage),
    TestsRunning {
        requested_by: String,
    },
    TestResults {
        results: Vec<TestResult>,
    },
    MeetingCalled {
        caller_name: String,
    },
    Pong {
        server_now: String,
    },
    Error {
        code: String,
        message: String,
    },
}
