//! HTTP API for the licensing advisor.
//!
//! ## Endpoints
//!
//! - `GET /api/health` - Health check
//! - `GET /api/auth/status` - Current Desktop Central session
//! - `POST /api/auth/login` - Start OAuth login, returns the consent URL
//! - `GET /oauth/callback` - OAuth redirect target
//! - `POST /api/auth/token` - Use a pasted bearer token
//! - `POST /api/auth/refresh` - Refresh the OAuth access token
//! - `POST /api/auth/logout` - Forget stored tokens
//! - `POST /api/chat` - Ask the licensing agent

mod auth;
mod chat;
mod routes;
pub mod types;

pub use routes::{router, serve, AppState};
pub use types::*;
