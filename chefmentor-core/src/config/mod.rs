//! Configuration module for ChefMentor.
//!
//! Resolves the backend location and timeouts, and persists client settings
//! in SQLite.

mod client;
mod settings;

pub use client::{ClientConfig, DEFAULT_REFRESH_PATH};
pub use settings::{
    resolve_base_url, DeviceHints, Environment, Platform, Settings, Timeouts,
    ANDROID_EMULATOR_HOST, DEV_BACKEND_PORT, PRODUCTION_API_URL,
};
