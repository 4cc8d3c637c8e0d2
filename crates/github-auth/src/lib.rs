//! GitHub OAuth login library
//!
//! Provides PKCE flow generation, code exchange via a token proxy, local
//! token/user storage, and the session state machine for the login
//! gateway. This crate is a standalone library with no dependency on the
//! gateway binary — it can be tested and used independently.
//!
//! Login flow:
//! 1. `AuthSession::begin_login()` generates verifier + state and returns
//!    the GitHub authorization URL
//! 2. User authorizes; GitHub redirects back with `code` and `state`
//! 3. `CallbackGuard::begin()` admits the delivery once
//! 4. `AuthSession::complete_login()` validates the state, exchanges the
//!    code via `token::exchange_code()`, fetches the identity via
//!    `token::fetch_user()`, and persists both through `AuthStorage`
//! 5. On restart, `AuthSession::bootstrap()` rehydrates from storage

pub mod callback;
pub mod constants;
pub mod error;
pub mod pkce;
pub mod session;
pub mod storage;
pub mod token;

pub use callback::{CallbackGuard, CallbackParams};
pub use constants::*;
pub use error::{Error, Result};
pub use pkce::{build_authorization_url, compute_challenge, generate_state, generate_verifier};
pub use session::{AuthConfig, AuthSession, AuthSnapshot};
pub use storage::{AuthStorage, GitHubUser, StoredToken};
pub use token::{ExchangeRequest, TokenData, TokenEnvelope, exchange_code, fetch_user};
