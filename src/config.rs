//! Process and game configuration loaded from the environment

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

/// Tunables for a single session's rules and timers
#[derive(Debug, Clone)]
pub struct GameConfig {
    pub voting_seconds: u32,
    pub reveal_delay: Duration,
    pub tick: Duration,
    pub min_participants: usize,
    pub max_participants: usize,
    pub max_chat_chars: usize,
    pub max_name_chars: usize,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            voting_seconds: 10,
            reveal_delay: Duration::from_secs(5),
            tick: Duration::from_secs(1),
            min_participants: 3,
            max_participants: 5,
            max_chat_chars: 300,
            max_name_chars: 24,
        }
    }
}

impl GameConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            voting_seconds: env_parse("VOTING_SECONDS").unwrap_or(defaults.voting_seconds),
            reveal_delay: env_parse("REVEAL_SECONDS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.reveal_delay),
            tick: defaults.tick,
            min_participants: env_parse("MIN_PLAYERS").unwrap_or(defaults.min_participants),
            max_participants: env_parse("MAX_PLAYERS").unwrap_or(defaults.max_participants),
            max_chat_chars: env_parse("MAX_CHAT_CHARS").unwrap_or(defaults.max_chat_chars),
            max_name_chars: env_parse("MAX_NAME_CHARS").unwrap_or(defaults.max_name_chars),
        }
    }
}

/// Listener and process-wide settings
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_addr: SocketAddr,
    /// Allowed CORS origin; permissive when unset
    pub client_origin: Option<String>,
    /// Seed for all session randomness (codes, tie-breaks, saboteur pick)
    pub seed: Option<u64>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 3001)),
            client_origin: None,
            seed: None,
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> Self {
        let ip: IpAddr = env_parse("BIND_ADDR").unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED));
        let port: u16 = env_parse("PORT").unwrap_or(3001);

        Self {
            bind_addr: SocketAddr::new(ip, port),
            client_origin: env_string("CLIENT_URL"),
            seed: env_parse("GAME_SEED"),
        }
    }
}

/// Read a trimmed, non-empty env var
pub(crate) fn env_string(key: &str) -> Option<String> {
    std::env::var(key).ok().and_then(|value| {
        let trimmed = value.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    })
}

pub(crate) fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    env_string(key).and_then(|s| s.parse().ok())
}
