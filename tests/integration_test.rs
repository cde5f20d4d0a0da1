use async_trait::async_trait;
use codemole::broadcast::ConnectionReceiver;
use codemole::config::GameConfig;
use codemole::grading::{GradingPipeline, RetryPolicy};
use codemole::llm::{GenerateRequest, GenerateResponse, LlmProvider, LlmResult, ResponseMetadata};
use codemole::protocol::{ClientMessage, ServerMessage};
use codemole::state::AppState;
use codemole::types::{Category, ConnectionId, Role, SessionStatus};
use codemole::ws::handlers::handle_message;
use codemole::ws::lobby::handle_disconnect;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

fn conn(id: &str) -> ConnectionId {
    id.to_string()
}

fn drain(rx: &mut ConnectionReceiver) -> Vec<ServerMessage> {
    let mut messages = Vec::new();
    while let Ok(msg) = rx.try_recv() {
        messages.push(msg);
    }
    messages
}

fn error_code(reply: Option<ServerMessage>) -> String {
    match reply {
        Some(ServerMessage::Error { code, .. }) => code,
        other => panic!("Expected Error message, got {:?}", other),
    }
}

/// Registers every id with the hub, creates a session hosted by the first and
/// joins the rest. Receivers are returned drained.
async fn setup_session(
    state: &Arc<AppState>,
    ids: &[&str],
) -> (String, Vec<ConnectionReceiver>) {
    let mut receivers = Vec::new();
    for id in ids {
        receivers.push(state.hub.register(&conn(id)).await);
    }

    let code = match handle_message(
        ClientMessage::CreateSession {
            display_name: ids[0].to_uppercase(),
        },
        &conn(ids[0]),
        state,
    )
    .await
    {
        Some(ServerMessage::SessionCreated { code, .. }) => code,
        other => panic!("Expected SessionCreated, got {:?}", other),
    };

    for id in &ids[1..] {
        let reply = handle_message(
            ClientMessage::JoinSession {
                code: code.clone(),
                display_name: id.to_uppercase(),
            },
            &conn(id),
            state,
        )
        .await;
        assert!(
            matches!(reply, Some(ServerMessage::SessionJoined { .. })),
            "join failed for {}: {:?}",
            id,
            reply
        );
    }

    for rx in receivers.iter_mut() {
        drain(rx);
    }
    (code, receivers)
}

async fn vote(state: &Arc<AppState>, id: &str, category: &str) {
    let reply = handle_message(
        ClientMessage::VoteCategory {
            category_id: category.to_string(),
        },
        &conn(id),
        state,
    )
    .await;
    assert!(reply.is_none(), "vote by {} rejected: {:?}", id, reply);
}

/// Start with the host, cast the given votes and run the clock to `playing`
async fn play_to_playing(state: &Arc<AppState>, host: &str, votes: &[(&str, &str)]) {
    assert!(handle_message(ClientMessage::StartSession, &conn(host), state)
        .await
        .is_none());
    for (id, category) in votes {
        vote(state, id, category).await;
    }
    tokio::time::sleep(Duration::from_millis(15_500)).await;
}

/// End-to-end flow from lobby to sabotage detection
#[tokio::test(start_paused = true)]
async fn test_full_session_flow() {
    let state = Arc::new(AppState::with_config(
        GameConfig::default(),
        Some(7),
        GradingPipeline::disabled(),
    ));
    let ids = ["alice", "bob", "carol"];

    // 1. Lobby with three participants
    let (code, mut rx) = setup_session(&state, &ids).await;
    let handle = state.registry.get_session(&code).await.unwrap();
    assert_eq!(handle.lock().await.len(), 3);

    // 2. Host starts; voting opens at ten seconds
    let reply = handle_message(ClientMessage::StartSession, &conn("alice"), &state).await;
    assert!(reply.is_none());
    match drain(&mut rx[1]).last() {
        Some(ServerMessage::SessionUpdate { session }) => {
            assert_eq!(session.status, SessionStatus::VotingCategory);
            assert_eq!(session.voting_seconds_remaining, Some(10));
        }
        other => panic!("Expected SessionUpdate, got {:?}", other),
    }

    // 3. Two votes for dsa, one for oop; a revote is an overwrite
    vote(&state, "alice", "oop").await;
    vote(&state, "alice", "dsa").await;
    vote(&state, "bob", "dsa").await;
    vote(&state, "carol", "oop").await;
    {
        let lobby = handle.lock().await;
        let counts = lobby.view().vote_counts;
        assert_eq!(counts.get(&Category::Dsa), Some(&2));
        assert_eq!(counts.get(&Category::Oop), Some(&1));
    }

    // 4. Countdown expires and roles are revealed
    tokio::time::sleep(Duration::from_millis(10_500)).await;
    {
        let lobby = handle.lock().await;
        assert_eq!(lobby.status(), SessionStatus::RoleReveal);
        assert_eq!(lobby.category(), Some(Category::Dsa));
        assert!(lobby.shared_code().contains("def binary_search"));
    }

    let mut saboteur = None;
    for (i, receiver) in rx.iter_mut().enumerate() {
        let messages = drain(receiver);
        let roles: Vec<Role> = messages
            .iter()
            .filter_map(|m| match m {
                ServerMessage::RoleAssigned { role, category } => {
                    assert_eq!(*category, Category::Dsa);
                    Some(*role)
                }
                _ => None,
            })
            .collect();
        assert_eq!(roles.len(), 1, "{} should get exactly one role", ids[i]);

        let got_tasks = messages
            .iter()
            .any(|m| matches!(m, ServerMessage::SabotageTasks { tasks } if tasks.len() == 3));
        if roles[0] == Role::Saboteur {
            assert!(saboteur.is_none(), "only one saboteur");
            assert!(got_tasks);
            saboteur = Some(i);
        } else {
            assert!(!got_tasks);
        }
    }
    let saboteur = saboteur.expect("a saboteur is assigned");

    // 5. Reveal delay ends in playing
    tokio::time::sleep(Duration::from_secs(5)).await;
    {
        let lobby = handle.lock().await;
        assert_eq!(lobby.status(), SessionStatus::Playing);
        assert_eq!(
            lobby.shared_code(),
            state.catalog.starter_code(Category::Dsa)
        );
    }
    for receiver in rx.iter_mut() {
        drain(receiver);
    }

    // 6. The saboteur edits the loop condition
    let sabotaged = handle
        .lock()
        .await
        .shared_code()
        .replace("while low <= high:", "while low < high:");
    let reply = handle_message(
        ClientMessage::CodeUpdate { code: sabotaged },
        &conn(ids[saboteur]),
        &state,
    )
    .await;
    assert!(reply.is_none());

    for (i, receiver) in rx.iter_mut().enumerate() {
        let messages = drain(receiver);
        let syncs = messages
            .iter()
            .filter(|m| matches!(m, ServerMessage::CodeSync { .. }))
            .count();
        let update = messages.iter().find_map(|m| match m {
            ServerMessage::SabotageUpdate { tasks } => Some(tasks.clone()),
            _ => None,
        });

        if i == saboteur {
            assert_eq!(syncs, 0, "author must not get an echo");
            let tasks = update.expect("saboteur is told about progress");
            let done: Vec<&str> = tasks
                .iter()
                .filter(|t| t.completed)
                .map(|t| t.id.as_str())
                .collect();
            assert_eq!(done, ["dsa-exclusive-loop"]);
        } else {
            assert_eq!(syncs, 1);
            assert!(update.is_none());
        }
    }

    // 7. Reverting the edit keeps the task completed
    let reverted = handle
        .lock()
        .await
        .shared_code()
        .replace("while low < high:", "while low <= high:");
    handle_message(
        ClientMessage::CodeUpdate { code: reverted },
        &conn(ids[saboteur]),
        &state,
    )
    .await;
    let lobby = handle.lock().await;
    let tasks = lobby.sabotage_tasks();
    assert!(tasks.iter().any(|t| t.id == "dsa-exclusive-loop" && t.completed));
}

#[tokio::test]
async fn test_capacity_and_phase_rejections() {
    let state = Arc::new(AppState::new());
    let (code, _rx) = setup_session(&state, &["p1", "p2", "p3", "p4", "p5"]).await;

    let reply = handle_message(
        ClientMessage::JoinSession {
            code: code.clone(),
            display_name: "Sixth".to_string(),
        },
        &conn("p6"),
        &state,
    )
    .await;
    assert_eq!(error_code(reply), "LOBBY_FULL");

    // Nobody was added by the rejected join
    let handle = state.registry.get_session(&code).await.unwrap();
    assert_eq!(handle.lock().await.len(), 5);

    // After a slot frees up, joining mid-game is still refused
    handle_disconnect(&state, &conn("p5")).await;
    handle_message(ClientMessage::StartSession, &conn("p1"), &state).await;
    let reply = handle_message(
        ClientMessage::JoinSession {
            code,
            display_name: "Late".to_string(),
        },
        &conn("p6"),
        &state,
    )
    .await;
    assert_eq!(error_code(reply), "WRONG_PHASE");
}

#[tokio::test]
async fn test_host_leaves_then_everyone_leaves() {
    let state = Arc::new(AppState::new());
    let (code, mut rx) = setup_session(&state, &["a", "b", "c"]).await;

    // 1. Host disconnects; the next participant in join order takes over
    handle_disconnect(&state, &conn("a")).await;
    match drain(&mut rx[1]).last() {
        Some(ServerMessage::SessionUpdate { session }) => {
            assert_eq!(session.participants.len(), 2);
            assert_eq!(session.participants[0].id, "b");
            assert!(session.participants[0].is_host);
            assert!(!session.participants[1].is_host);
        }
        other => panic!("Expected SessionUpdate, got {:?}", other),
    }

    // 2. The new host may act as host
    let reply = handle_message(ClientMessage::StartSession, &conn("b"), &state).await;
    assert_eq!(error_code(reply), "NOT_ENOUGH_PLAYERS");

    // 3. Last one out destroys the session
    handle_disconnect(&state, &conn("b")).await;
    let reply = handle_message(ClientMessage::LeaveSession, &conn("c"), &state).await;
    assert!(matches!(reply, Some(ServerMessage::SessionLeft { .. })));
    assert!(state.registry.get_session(&code).await.is_none());

    let reply = handle_message(
        ClientMessage::JoinSession {
            code,
            display_name: "D".to_string(),
        },
        &conn("d"),
        &state,
    )
    .await;
    assert_eq!(error_code(reply), "NOT_FOUND");
}

#[tokio::test(start_paused = true)]
async fn test_departed_voter_loses_vote() {
    let state = Arc::new(AppState::with_config(
        GameConfig::default(),
        Some(3),
        GradingPipeline::disabled(),
    ));
    let (code, mut rx) = setup_session(&state, &["a", "b", "c", "d"]).await;

    handle_message(ClientMessage::StartSession, &conn("a"), &state).await;
    vote(&state, "a", "frontend").await;
    vote(&state, "b", "backend").await;
    vote(&state, "c", "backend").await;
    handle_disconnect(&state, &conn("c")).await;
    vote(&state, "d", "frontend").await;

    // A system line announces the departure mid-game
    let messages = drain(&mut rx[0]);
    assert!(messages.iter().any(
        |m| matches!(m, ServerMessage::ChatMessage(chat) if chat.is_system && chat.text.contains("C"))
    ));

    tokio::time::sleep(Duration::from_millis(10_500)).await;
    let handle = state.registry.get_session(&code).await.unwrap();
    let lobby = handle.lock().await;
    assert_eq!(lobby.category(), Some(Category::Frontend));
    assert_eq!(lobby.len(), 3);
}

/// Times out twice on the first call of a run, then answers
struct FlakyGrader {
    calls: AtomicU32,
}

#[async_trait]
impl LlmProvider for FlakyGrader {
    async fn generate(&self, request: GenerateRequest) -> LlmResult<GenerateResponse> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call < 2 {
            std::future::pending::<()>().await;
        }

        let text = if request.prompt.contains("binary_search([1,2,3,4,5], 3)") {
            "```json\n{\"passed\": true, \"output\": \"2\", \"error\": null}\n```"
        } else {
            r#"{"passed": false, "output": "None", "error": "expected -1"}"#
        };
        Ok(GenerateResponse {
            text: text.to_string(),
            metadata: ResponseMetadata {
                provider: "flaky".to_string(),
                model: "test".to_string(),
                tokens_used: None,
                latency_ms: 0,
            },
        })
    }

    fn name(&self) -> &str {
        "flaky"
    }
}

#[tokio::test(start_paused = true)]
async fn test_grading_retries_and_keeps_order() {
    let provider = Arc::new(FlakyGrader {
        calls: AtomicU32::new(0),
    });
    let grader = GradingPipeline::new(
        Some(provider.clone()),
        RetryPolicy {
            timeout: Duration::from_secs(12),
            max_attempts: 3,
        },
        256,
    );
    let state = Arc::new(AppState::with_config(GameConfig::default(), Some(11), grader));
    let (_, mut rx) = setup_session(&state, &["a", "b", "c"]).await;
    play_to_playing(&state, "a", &[("a", "dsa"), ("b", "dsa"), ("c", "oop")]).await;
    for receiver in rx.iter_mut() {
        drain(receiver);
    }

    // 1. Request grading; everyone hears that tests are running
    let reply = handle_message(
        ClientMessage::RunTests {
            code: "def binary_search(arr, target): return -1".to_string(),
        },
        &conn("b"),
        &state,
    )
    .await;
    assert!(reply.is_none());
    for receiver in rx.iter_mut() {
        assert!(matches!(
            receiver.try_recv(),
            Ok(ServerMessage::TestsRunning { requested_by }) if requested_by == "B"
        ));
    }

    // 2. Two 12s timeouts on the first case, then results for both cases
    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(provider.calls.load(Ordering::SeqCst), 4);

    for receiver in rx.iter_mut() {
        let results = drain(receiver)
            .into_iter()
            .find_map(|m| match m {
                ServerMessage::TestResults { results } => Some(results),
                _ => None,
            })
            .expect("test results are broadcast");

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].name, "finds middle");
        assert!(results[0].passed);
        assert_eq!(results[0].output.as_deref(), Some("2"));
        assert_eq!(results[1].name, "not found");
        assert!(!results[1].passed);
        assert_eq!(results[1].error.as_deref(), Some("expected -1"));
    }
}

#[tokio::test(start_paused = true)]
async fn test_grading_without_credentials() {
    let state = Arc::new(AppState::with_config(
        GameConfig::default(),
        Some(5),
        GradingPipeline::disabled(),
    ));
    let (_, mut rx) = setup_session(&state, &["a", "b", "c"]).await;
    play_to_playing(&state, "a", &[("a", "security")]).await;
    for receiver in rx.iter_mut() {
        drain(receiver);
    }

    let reply = handle_message(
        ClientMessage::RunTests {
            code: "query = 1".to_string(),
        },
        &conn("c"),
        &state,
    )
    .await;
    assert_eq!(error_code(reply), "GRADING_FAILED");

    // Everyone still gets an empty result set
    for receiver in rx.iter_mut() {
        assert!(matches!(
            receiver.try_recv(),
            Ok(ServerMessage::TestResults { results }) if results.is_empty()
        ));
    }
}

#[tokio::test(start_paused = true)]
async fn test_results_for_vanished_session_are_dropped() {
    let provider = Arc::new(FlakyGrader {
        calls: AtomicU32::new(0),
    });
    let grader = GradingPipeline::new(Some(provider), RetryPolicy::default(), 256);
    let state = Arc::new(AppState::with_config(GameConfig::default(), Some(2), grader));
    let (code, _rx) = setup_session(&state, &["a", "b", "c"]).await;
    play_to_playing(&state, "a", &[("b", "dsa")]).await;

    handle_message(
        ClientMessage::RunTests {
            code: "pass".to_string(),
        },
        &conn("a"),
        &state,
    )
    .await;
    for id in ["a", "b", "c"] {
        handle_disconnect(&state, &conn(id)).await;
    }
    assert!(state.registry.get_session(&code).await.is_none());

    // Grading finishes into nothing without disturbing new sessions
    tokio::time::sleep(Duration::from_secs(60)).await;
    let (_, _rx) = setup_session(&state, &["x", "y", "z"]).await;
    assert_eq!(state.registry.len().await, 1);
}

#[tokio::test]
async fn test_chat_limits() {
    let state = Arc::new(AppState::new());
    let (_, mut rx) = setup_session(&state, &["a", "b", "c"]).await;

    let reply = handle_message(
        ClientMessage::ChatMessage {
            text: "   ".to_string(),
        },
        &conn("a"),
        &state,
    )
    .await;
    assert_eq!(error_code(reply), "BAD_REQUEST");

    handle_message(
        ClientMessage::ChatMessage {
            text: "x".repeat(500),
        },
        &conn("b"),
        &state,
    )
    .await;
    match rx[2].try_recv() {
        Ok(ServerMessage::ChatMessage(chat)) => {
            assert_eq!(chat.text.chars().count(), 300);
            assert_eq!(chat.sender_id.as_deref(), Some("b"));
        }
        other => panic!("Expected ChatMessage, got {:?}", other),
    }
}
