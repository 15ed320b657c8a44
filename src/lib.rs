//! # dc-advisor
//!
//! Back end for a chat assistant that answers Desktop Central licensing
//! questions through a hosted AI agent.
//!
//! This library provides:
//! - A Desktop Central session: OAuth2 authorization-code login, pasted
//!   bearer tokens, persistence and refresh
//! - An execute-then-poll client for the licensing agent
//! - An HTTP API tying the two together for the browser UI
//!
//! ## Request Flow
//!
//! ```text
//!  browser ──POST /api/chat──▶ SessionManager::get_current_token
//!                                    │ user token
//!                                    ▼
//!                             ExecutionClient::run ──execute──▶ agent platform
//!                                    │ ◀──────status (poll)────┘
//!                                    ▼
//!                             AgentAnswer (structured | plain)
//! ```
//!
//! ## Modules
//! - `session`: token lifecycle and OAuth flow
//! - `agent`: agent platform client and answer typing
//! - `storage`: key-value persistence
//! - `api`: axum routes

pub mod agent;
pub mod api;
pub mod config;
pub mod session;
pub mod storage;

pub use agent::{AgentAnswer, AgentError, ExecutionClient};
pub use config::Config;
pub use session::{SessionError, SessionManager, SessionState};
