//! Persisted client settings for ChefMentor.
//!
//! Settings are stored in the SQLite database as JSON and can be overlaid
//! from the process environment.

use std::time::Duration;

use serde::{Deserialize, Serialize};

const SETTINGS_KEY: &str = "client_settings";

/// Production backend.
pub const PRODUCTION_API_URL: &str = "https://chefmentor-production.up.railway.app/api/v1";

/// Port the development backend listens on.
pub const DEV_BACKEND_PORT: u16 = 8000;

/// Host alias the Android emulator uses for the development machine.
pub const ANDROID_EMULATOR_HOST: &str = "10.0.2.2";

const API_PREFIX: &str = "/api/v1";

// =============================================================================
// Environment / Platform
// =============================================================================

/// Deployment environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Environment {
    Production,
    Development,
}

impl Default for Environment {
    fn default() -> Self {
        if cfg!(debug_assertions) {
            Self::Development
        } else {
            Self::Production
        }
    }
}

impl Environment {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "production" | "prod" => Some(Self::Production),
            "development" | "dev" => Some(Self::Development),
            _ => None,
        }
    }

    pub fn is_dev(self) -> bool {
        self == Self::Development
    }
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Production => write!(f, "production"),
            Self::Development => write!(f, "development"),
        }
    }
}

/// Host platform the client runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Platform {
    Android,
    Ios,
    Web,
    Other,
}

impl Platform {
    /// Platform of the current build target.
    pub fn detect() -> Self {
        if cfg!(target_os = "android") {
            Self::Android
        } else if cfg!(target_os = "ios") {
            Self::Ios
        } else if cfg!(target_family = "wasm") {
            Self::Web
        } else {
            Self::Other
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "android" => Some(Self::Android),
            "ios" => Some(Self::Ios),
            "web" => Some(Self::Web),
            "other" => Some(Self::Other),
            _ => None,
        }
    }
}

impl Default for Platform {
    fn default() -> Self {
        Self::detect()
    }
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Android => write!(f, "android"),
            Self::Ios => write!(f, "ios"),
            Self::Web => write!(f, "web"),
            Self::Other => write!(f, "other"),
        }
    }
}

/// Hints about how to reach a development backend from this device.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceHints {
    /// Explicit backend origin, e.g. `http://192.168.1.100:8000`.
    pub backend_url_override: Option<String>,
    /// Dev-server host reported by the bundler, e.g. `192.168.1.20:19000`.
    pub debugger_host: Option<String>,
}

impl DeviceHints {
    fn host_ip(&self) -> Option<&str> {
        self.debugger_host
            .as_deref()
            .and_then(|host| host.split(':').next())
            .filter(|ip| !ip.is_empty())
    }
}

/// Resolve the API base URL for an environment and platform.
pub fn resolve_base_url(env: Environment, platform: Platform, hints: &DeviceHints) -> String {
    if env == Environment::Production {
        return PRODUCTION_API_URL.to_string();
    }

    if let Some(origin) = hints.backend_url_override.as_deref() {
        let origin = origin.trim_end_matches('/');
        tracing::debug!(backend_url = %origin, "Using custom backend URL");
        return format!("{origin}{API_PREFIX}");
    }

    let host = match platform {
        Platform::Android => match hints.host_ip() {
            Some(ip) => {
                tracing::debug!(host_ip = %ip, "Android physical device detected");
                ip
            }
            None => {
                tracing::debug!("Android emulator detected");
                ANDROID_EMULATOR_HOST
            }
        },
        Platform::Ios => {
            let on_lan = hints
                .debugger_host
                .as_deref()
                .is_some_and(|host| !host.contains("localhost"));
            match hints.host_ip().filter(|_| on_lan) {
                Some(ip) => {
                    tracing::debug!(host_ip = %ip, "iOS physical device detected");
                    ip
                }
                None => {
                    tracing::debug!("iOS simulator detected");
                    "localhost"
                }
            }
        }
        Platform::Web | Platform::Other => "localhost",
    };

    format!("http://{host}:{DEV_BACKEND_PORT}{API_PREFIX}")
}

// =============================================================================
// Timeouts
// =============================================================================

/// Per-category request timeouts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    /// General API requests.
    pub general: Duration,
    /// AI-backed endpoints, which can be slow.
    pub ai: Duration,
    /// Image and audio uploads.
    pub upload: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            general: Duration::from_millis(DEFAULT_API_TIMEOUT_MS),
            ai: Duration::from_millis(DEFAULT_AI_TIMEOUT_MS),
            upload: Duration::from_millis(DEFAULT_UPLOAD_TIMEOUT_MS),
        }
    }
}

const DEFAULT_API_TIMEOUT_MS: u64 = 15_000;
const DEFAULT_AI_TIMEOUT_MS: u64 = 30_000;
const DEFAULT_UPLOAD_TIMEOUT_MS: u64 = 60_000;

const MIN_TIMEOUT_MS: u64 = 1_000;
const MAX_TIMEOUT_MS: u64 = 300_000;

// =============================================================================
// Settings
// =============================================================================

/// Client settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub environment: Environment,
    pub platform: Platform,
    /// Development backend origin override.
    pub backend_url_override: Option<String>,
    /// Dev-server host used to find the backend from a physical device.
    pub debugger_host: Option<String>,
    pub api_timeout_ms: u64,
    pub ai_timeout_ms: u64,
    pub upload_timeout_ms: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            environment: Environment::default(),
            platform: Platform::default(),
            backend_url_override: None,
            debugger_host: None,
            api_timeout_ms: DEFAULT_API_TIMEOUT_MS,
            ai_timeout_ms: DEFAULT_AI_TIMEOUT_MS,
            upload_timeout_ms: DEFAULT_UPLOAD_TIMEOUT_MS,
        }
    }
}

impl Settings {
    /// Load settings from database, using defaults for missing values.
    ///
    /// If settings don't exist or can't be parsed, returns defaults.
    pub fn load(db: &crate::db::Database) -> Self {
        let mut settings = Self::default();

        if let Ok(Some(json)) = db.get_setting(SETTINGS_KEY) {
            match serde_json::from_str::<Settings>(&json) {
                Ok(loaded) => settings = loaded,
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to parse settings, using defaults");
                }
            }
        }

        settings
    }

    /// Save settings to database.
    pub fn save(&self, db: &crate::db::Database) -> anyhow::Result<()> {
        let json = serde_json::to_string(self)?;
        db.set_setting(SETTINGS_KEY, &json)?;
        Ok(())
    }

    /// Overlay values from `CHEFMENTOR_*` environment variables.
    pub fn apply_env(&mut self) {
        self.apply_env_with(|name| std::env::var(name).ok());
    }

    /// Overlay values from an arbitrary variable lookup.
    pub fn apply_env_with(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(value) = lookup("CHEFMENTOR_ENV") {
            match Environment::parse(&value) {
                Some(env) => self.environment = env,
                None => tracing::warn!(value = %value, "Ignoring unknown CHEFMENTOR_ENV"),
            }
        }
        if let Some(value) = lookup("CHEFMENTOR_PLATFORM") {
            match Platform::parse(&value) {
                Some(platform) => self.platform = platform,
                None => tracing::warn!(value = %value, "Ignoring unknown CHEFMENTOR_PLATFORM"),
            }
        }
        if let Some(value) = lookup("CHEFMENTOR_BACKEND_URL").filter(|v| !v.trim().is_empty()) {
            self.backend_url_override = Some(value.trim().to_string());
        }
        if let Some(value) = lookup("CHEFMENTOR_DEBUGGER_HOST").filter(|v| !v.trim().is_empty()) {
            self.debugger_host = Some(value.trim().to_string());
        }
    }

    /// Clamp timeouts to valid ranges.
    pub fn validate(&mut self) {
        self.api_timeout_ms = self.api_timeout_ms.clamp(MIN_TIMEOUT_MS, MAX_TIMEOUT_MS);
        self.ai_timeout_ms = self.ai_timeout_ms.clamp(MIN_TIMEOUT_MS, MAX_TIMEOUT_MS);
        self.upload_timeout_ms = self.upload_timeout_ms.clamp(MIN_TIMEOUT_MS, MAX_TIMEOUT_MS);

        if self
            .backend_url_override
            .as_deref()
            .is_some_and(|url| url.trim().is_empty())
        {
            self.backend_url_override = None;
        }
    }

    pub fn device_hints(&self) -> DeviceHints {
        DeviceHints {
            backend_url_override: self.backend_url_override.clone(),
            debugger_host: self.debugger_host.clone(),
        }
    }

    /// Resolved API base URL.
    pub fn api_url(&self) -> String {
        resolve_base_url(self.environment, self.platform, &self.device_hints())
    }

    pub fn timeouts(&self) -> Timeouts {
        Timeouts {
            general: Duration::from_millis(self.api_timeout_ms),
            ai: Duration::from_millis(self.ai_timeout_ms),
            upload: Duration::from_millis(self.upload_timeout_ms),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    fn setup_test_db() -> (TempDir, crate::db::Database) {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("test.db");
        let db = crate::db::Database::open_at(db_path).unwrap();
        db.migrate().unwrap();
        (temp_dir, db)
    }

    fn hints(override_url: Option<&str>, debugger_host: Option<&str>) -> DeviceHints {
        DeviceHints {
            backend_url_override: override_url.map(str::to_string),
            debugger_host: debugger_host.map(str::to_string),
        }
    }

    // -------------------------------------------------------------------------
    // Base URL Resolution
    // -------------------------------------------------------------------------

    #[test]
    fn test_production_ignores_hints() {
        let url = resolve_base_url(
            Environment::Production,
            Platform::Android,
            &hints(Some("http://10.1.1.1:9000"), Some("192.168.1.5:19000")),
        );
        assert_eq!(url, PRODUCTION_API_URL);
    }

    #[test]
    fn test_development_override_wins() {
        let url = resolve_base_url(
            Environment::Development,
            Platform::Ios,
            &hints(Some("http://192.168.1.100:8000/"), Some("192.168.1.5:19000")),
        );
        assert_eq!(url, "http://192.168.1.100:8000/api/v1");
    }

    #[test]
    fn test_android_emulator_and_device() {
        assert_eq!(
            resolve_base_url(Environment::Development, Platform::Android, &hints(None, None)),
            "http://10.0.2.2:8000/api/v1"
        );
        assert_eq!(
            resolve_base_url(
                Environment::Development,
                Platform::Android,
                &hints(None, Some("192.168.1.20:19000"))
            ),
            "http://192.168.1.20:8000/api/v1"
        );
    }

    #[test]
    fn test_ios_simulator_and_device() {
        assert_eq!(
            resolve_base_url(
                Environment::Development,
                Platform::Ios,
                &hints(None, Some("localhost:19000"))
            ),
            "http://localhost:8000/api/v1"
        );
        assert_eq!(
            resolve_base_url(Environment::Development, Platform::Ios, &hints(None, None)),
            "http://localhost:8000/api/v1"
        );
        assert_eq!(
            resolve_base_url(
                Environment::Development,
                Platform::Ios,
                &hints(None, Some("192.168.1.30:8081"))
            ),
            "http://192.168.1.30:8000/api/v1"
        );
    }

    #[test]
    fn test_web_uses_localhost() {
        assert_eq!(
            resolve_base_url(
                Environment::Development,
                Platform::Web,
                &hints(None, Some("192.168.1.30:8081"))
            ),
            "http://localhost:8000/api/v1"
        );
    }

    // -------------------------------------------------------------------------
    // Settings
    // -------------------------------------------------------------------------

    #[test]
    fn test_settings_default_timeouts() {
        let settings = Settings::default();
        assert_eq!(settings.timeouts(), Timeouts::default());
        assert_eq!(settings.timeouts().general, Duration::from_secs(15));
        assert_eq!(settings.timeouts().ai, Duration::from_secs(30));
        assert_eq!(settings.timeouts().upload, Duration::from_secs(60));
    }

    #[test]
    fn test_settings_save_and_load_roundtrip() {
        let (_temp, db) = setup_test_db();

        let original = Settings {
            environment: Environment::Development,
            platform: Platform::Android,
            backend_url_override: Some("http://192.168.0.2:8000".to_string()),
            api_timeout_ms: 5_000,
            ..Settings::default()
        };
        original.save(&db).unwrap();

        let loaded = Settings::load(&db);
        assert_eq!(loaded, original);
        assert_eq!(loaded.api_url(), "http://192.168.0.2:8000/api/v1");
    }

    #[test]
    fn test_settings_load_returns_defaults_on_invalid_json() {
        let (_temp, db) = setup_test_db();
        db.set_setting(SETTINGS_KEY, "not valid json {{").unwrap();

        assert_eq!(Settings::load(&db), Settings::default());
    }

    #[test]
    fn test_settings_partial_json_fills_defaults() {
        let (_temp, db) = setup_test_db();
        db.set_setting(SETTINGS_KEY, r#"{"environment":"Production"}"#)
            .unwrap();

        let loaded = Settings::load(&db);
        assert_eq!(loaded.environment, Environment::Production);
        assert_eq!(loaded.ai_timeout_ms, 30_000);
    }

    #[test]
    fn test_apply_env_overlays_known_values() {
        let vars: HashMap<&str, &str> = HashMap::from([
            ("CHEFMENTOR_ENV", "dev"),
            ("CHEFMENTOR_PLATFORM", "Android"),
            ("CHEFMENTOR_DEBUGGER_HOST", "192.168.1.7:19000"),
        ]);
        let mut settings = Settings {
            environment: Environment::Production,
            ..Settings::default()
        };

        settings.apply_env_with(|name| vars.get(name).map(|v| v.to_string()));

        assert_eq!(settings.environment, Environment::Development);
        assert_eq!(settings.platform, Platform::Android);
        assert_eq!(settings.api_url(), "http://192.168.1.7:8000/api/v1");
    }

    #[test]
    fn test_apply_env_ignores_unknown_values() {
        let mut settings = Settings {
            environment: Environment::Production,
            platform: Platform::Web,
            ..Settings::default()
        };

        settings.apply_env_with(|name| match name {
            "CHEFMENTOR_ENV" => Some("staging".to_string()),
            "CHEFMENTOR_PLATFORM" => Some("tizen".to_string()),
            "CHEFMENTOR_BACKEND_URL" => Some("   ".to_string()),
            _ => None,
        });

        assert_eq!(settings.environment, Environment::Production);
        assert_eq!(settings.platform, Platform::Web);
        assert!(settings.backend_url_override.is_none());
    }

    #[test]
    fn test_validate_clamps_timeouts() {
        let mut settings = Settings {
            api_timeout_ms: 10,
            ai_timeout_ms: 10_000_000,
            backend_url_override: Some(String::new()),
            ..Settings::default()
        };
        settings.validate();

        assert_eq!(settings.api_timeout_ms, MIN_TIMEOUT_MS);
        assert_eq!(settings.ai_timeout_ms, MAX_TIMEOUT_MS);
        assert_eq!(settings.upload_timeout_ms, DEFAULT_UPLOAD_TIMEOUT_MS);
        assert!(settings.backend_url_override.is_none());
    }

    #[test]
    fn test_environment_and_platform_parse() {
        assert_eq!(Environment::parse("PROD"), Some(Environment::Production));
        assert_eq!(Environment::parse("nope"), None);
        assert_eq!(Platform::parse(" ios "), Some(Platform::Ios));
        assert_eq!(Platform::Ios.to_string(), "ios");
    }
}
