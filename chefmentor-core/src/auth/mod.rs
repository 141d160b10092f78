//! Session authentication.
//!
//! This module provides:
//! - Credential storage (SQLite-backed and in-memory)
//! - The refresh token exchange used by the gateway

pub mod refresh;
pub mod storage;

pub use refresh::{exchange_refresh_token, RefreshRequest, RefreshResponse};
pub use storage::{
    keys, CredentialStore, CredentialStoreError, MemoryCredentialStore, SessionCredentials,
    SqliteCredentialStore,
};
