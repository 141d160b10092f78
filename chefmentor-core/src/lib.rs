//! ChefMentor Core Library
//!
//! Client-side plumbing for the ChefMentor cooking assistant backend. It
//! includes:
//!
//! - An authenticated HTTP gateway with coordinated access-token refresh
//! - Credential storage (SQLite-backed, with an in-memory fallback)
//! - Configuration: backend URL resolution, timeouts, persisted settings
//! - Typed services for recipes, cooking sessions, voice, and failure analysis
//! - Connectivity diagnostics for development setups

pub mod auth;
pub mod config;
pub mod db;
pub mod diagnostics;
pub mod http;
pub mod services;

// Re-exports for convenience
pub use config::{resolve_base_url, ClientConfig, Environment, Platform, Settings, Timeouts};
pub use db::Database;

// Re-export auth
pub use auth::{
    CredentialStore, CredentialStoreError, MemoryCredentialStore, SessionCredentials,
    SqliteCredentialStore,
};

// Re-export the gateway
pub use http::{
    ApiClient, ApiError, ApiRequest, ApiResponse, ErrorKind, MultipartForm, RequestBody,
    RequestOptions, ReqwestTransport, Transport, TransportError,
};

// Re-export services
pub use services::{AnalysisService, CookingService, RecipeService, VoiceService};

// Re-export diagnostics
pub use diagnostics::{
    connection_instructions, test_backend_connection, ConnectionTestResult, DeviceType,
    NetworkDebugInfo,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
