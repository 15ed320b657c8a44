//! Desktop Central session: OAuth2 authorization-code login, manual
//! bearer tokens, and token persistence.
//!
//! ## Lifecycle
//!
//! ```text
//!  Unauthenticated ──begin_oauth_login──▶ AwaitingCallback
//!        │  ▲                                  │
//!        │  └──── state mismatch / exchange ───┤
//!        │        or network failure           │ complete_oauth_callback
//!        │                                     ▼
//!        └────────set_manual_token──────▶ Authenticated ──logout──▶ Unauthenticated
//! ```

mod error;
mod manager;
pub mod oauth;
mod types;

pub use error::SessionError;
pub use manager::{CallbackParams, SessionManager};
pub use oauth::{HttpTokenEndpoint, TokenEndpoint, TokenGrant, TokenResponse};
pub use types::{
    is_valid, Credential, SessionPhase, SessionState, TokenSet, CREDENTIAL_STORAGE_KEY,
    EXPIRY_BUFFER_MS, OAUTH_STATE_STORAGE_KEY, TOKEN_STORAGE_KEY,
};
