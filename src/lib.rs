// Public API for integration tests and potential library usage

pub mod api;
pub mod broadcast;
pub mod catalog;
pub mod config;
pub mod error;
pub mod grading;
pub mod llm;
pub mod protocol;
pub mod registry;
pub mod session;
pub mod state;
pub mod types;
pub mod ws;
