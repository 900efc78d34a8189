//! Session credential library for the talent platform API
//!
//! Owns the access/refresh credential pair of a signed-in session and the
//! wire types of the refresh endpoint. This crate has no network code; the
//! gateway crate decides when to refresh and how to send the call.
//!
//! Credential lifecycle:
//! 1. Sign-in stores a pair via `CredentialStore::set()`
//! 2. Every outgoing call reads a snapshot via `CredentialStore::get()`
//! 3. On expiry the gateway posts `token::RefreshTokenRequest` to `REFRESH_TOKEN_PATH`
//! 4. The decoded `token::TokenPairResponse` replaces the pair wholesale
//! 5. Sign-out or an unrecoverable refresh failure calls `CredentialStore::clear()`

pub mod constants;
pub mod credentials;
pub mod error;
pub mod token;

pub use constants::*;
pub use credentials::{CredentialPair, CredentialStore};
pub use error::{Error, Result};
pub use token::{RefreshTokenRequest, TokenPairResponse, parse_refresh_response, refresh_request_body};
