use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Opaque ID types for type safety
pub type SessionCode = String;
pub type ConnectionId = String;
pub type ParticipantId = String;
pub type MessageId = String;
pub type TaskId = String;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Waiting,
    VotingCategory,
    RoleReveal,
    Playing,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Regular,
    Saboteur,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Dsa,
    Oop,
    Security,
    Frontend,
    Backend,
}

impl Category {
    /// Every votable category, in display order
    pub const ALL: [Category; 5] = [
        Category::Dsa,
        Category::Oop,
        Category::Security,
        Category::Frontend,
        Category::Backend,
    ];

    pub fn id(&self) -> &'static str {
        match self {
            Category::Dsa => "dsa",
            Category::Oop => "oop",
            Category::Security => "security",
            Category::Frontend => "frontend",
            Category::Backend => "backend",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Category::Dsa => "Data Structures & Algorithms",
            Category::Oop => "Object-Oriented Programming",
            Category::Security => "Security",
            Category::Frontend => "Front-End",
            Category::Backend => "Back-End",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

impl FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Category::ALL
            .into_iter()
            .find(|c| c.id() == s)
            .ok_or_else(|| format!("Unknown category '{}'", s))
    }
}

/// A connected player inside a session.
///
/// `id` and `connection_id` are the same value: one socket is one participant.
/// `role` never leaves the server through a session broadcast, see [`ParticipantView`].
#[derive(Debug, Clone)]
pub struct Participant {
    pub id: ParticipantId,
    pub display_name: String,
    pub is_host: bool,
    pub role: Option<Role>,
    pub connection_id: ConnectionId,
}

impl Participant {
    pub fn new(connection_id: ConnectionId, display_name: String, is_host: bool) -> Self {
        Self {
            id: connection_id.clone(),
            display_name,
            is_host,
            role: None,
            connection_id,
        }
    }

    pub fn view(&self) -> ParticipantView {
        ParticipantView {
            id: self.id.clone(),
            display_name: self.display_name.clone(),
            is_host: self.is_host,
        }
    }
}

/// Roster entry as other clients see it (no role)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantView {
    pub id: ParticipantId,
    pub display_name: String,
    pub is_host: bool,
}

/// Full session snapshot sent with every `session_update`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SessionView {
    pub code: SessionCode,
    pub participants: Vec<ParticipantView>,
    pub status: SessionStatus,
    pub category: Option<Category>,
    pub voting_seconds_remaining: Option<u32>,
    pub shared_code: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub vote_counts: BTreeMap<Category, u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub id: MessageId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sender_id: Option<ParticipantId>,
    pub sender_name: String,
    pub text: String,
    pub is_system: bool,
    pub sent_at: String,
}

impl ChatMessage {
    pub fn from_participant(sender: &Participant, text: String) -> Self {
        Self {
            id: ulid::Ulid::new().to_string(),
            sender_id: Some(sender.id.clone()),
            sender_name: sender.display_name.clone(),
            text,
            is_system: false,
            sent_at: chrono::Utc::now().to_rfc3339(),
        }
    }

    pub fn system(text: String) -> Self {
        Self {
            id: ulid::Ulid::new().to_string(),
            sender_id: None,
            sender_name: "System".to_string(),
            text,
            is_system: true,
            sent_at: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// Saboteur-facing progress for one covert task
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SabotageTaskState {
    pub id: TaskId,
    pub description: String,
    pub completed: bool,
}

/// Outcome of grading one test case
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TestResult {
    pub name: String,
    pub passed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}
