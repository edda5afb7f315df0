//! Credentials and token acquisition for provider accounts
//!
//! Loads provider credentials from indexed environment entries and turns a
//! credential into a bearer token. Standalone library with no dependency on
//! the pool or the orchestrator.
//!
//! Token flow:
//! 1. Startup and reloads call `credentials::load_indexed_from()` per provider
//!    with an env lookup
//! 2. The orchestrator asks `TokenBroker::get_token()` for the selected credential
//! 3. The broker returns a cached token, or mints one (client-credentials
//!    exchange via `token::exchange_client_credentials()`, or a local HS256
//!    token via `jwt::sign_hs256()`, or the raw API key)
//! 4. On 401/403 from the provider, the orchestrator calls `TokenBroker::invalidate()`

pub mod broker;
pub mod constants;
pub mod credentials;
pub mod error;
pub mod jwt;
pub mod token;

pub use broker::{AuthScheme, Token, TokenBroker};
pub use constants::*;
pub use credentials::{Credential, load_indexed_from};
pub use error::{Error, Result};
pub use jwt::sign_hs256;
pub use token::{TokenResponse, exchange_client_credentials};
