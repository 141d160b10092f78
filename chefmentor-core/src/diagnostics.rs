//! Connectivity diagnostics for development setups.
//!
//! Reaching a backend on a laptop from an emulator or a phone is the usual
//! source of "Network error" reports. These helpers describe the resolved
//! configuration, probe the backend health endpoint, and explain how to fix
//! the common setups.

use std::fmt;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use reqwest::Method;
use serde::Serialize;
use tracing::{debug, info};
use url::Url;

use crate::config::{Environment, Platform, Settings, ANDROID_EMULATOR_HOST, DEV_BACKEND_PORT};
use crate::http::{PreparedRequest, RequestBody, Transport, TransportError};

/// Health checks fail fast.
pub const HEALTH_CHECK_TIMEOUT: Duration = Duration::from_secs(5);

/// What kind of device the client is running on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceType {
    Simulator,
    Emulator,
    Physical,
    Web,
    Desktop,
}

impl DeviceType {
    /// Guess from the platform and the dev-server host. A missing or
    /// `localhost` host means a simulator or emulator.
    pub fn infer(platform: Platform, debugger_host: Option<&str>) -> Self {
        let local = debugger_host.map_or(true, |host| host.contains("localhost"));
        match platform {
            Platform::Ios if local => Self::Simulator,
            Platform::Android if local => Self::Emulator,
            Platform::Ios | Platform::Android => Self::Physical,
            Platform::Web => Self::Web,
            Platform::Other => Self::Desktop,
        }
    }
}

impl fmt::Display for DeviceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Simulator => "simulator",
            Self::Emulator => "emulator",
            Self::Physical => "physical",
            Self::Web => "web",
            Self::Desktop => "desktop",
        };
        f.write_str(name)
    }
}

/// Snapshot of the resolved network configuration.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NetworkDebugInfo {
    pub platform: Platform,
    pub api_url: String,
    pub debugger_host: Option<String>,
    pub device_type: DeviceType,
    pub environment: Environment,
    pub timestamp: DateTime<Utc>,
}

impl NetworkDebugInfo {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            platform: settings.platform,
            api_url: settings.api_url(),
            debugger_host: settings.debugger_host.clone(),
            device_type: DeviceType::infer(settings.platform, settings.debugger_host.as_deref()),
            environment: settings.environment,
            timestamp: Utc::now(),
        }
    }

    /// `api_url` with the API prefix swapped for `/health`.
    pub fn health_url(&self) -> String {
        self.api_url.replacen("/api/v1", "/health", 1)
    }

    /// Log the configuration at info level.
    pub fn log(&self) {
        info!(
            platform = %self.platform,
            device_type = %self.device_type,
            environment = %self.environment,
            api_url = %self.api_url,
            debugger_host = self.debugger_host.as_deref().unwrap_or("N/A"),
            "Network configuration"
        );
    }
}

/// Outcome of [`test_backend_connection`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectionTestResult {
    pub success: bool,
    pub status: Option<u16>,
    pub message: String,
    pub latency_ms: u64,
    /// Address the backend reports for itself.
    pub server_ip: Option<String>,
}

/// GET the backend health endpoint straight through `transport`.
///
/// Never fails; problems are described in the result.
pub async fn test_backend_connection(
    transport: &dyn Transport,
    info: &NetworkDebugInfo,
) -> ConnectionTestResult {
    let health_url = info.health_url();
    debug!(url = %health_url, "Testing backend connection");

    let url = match Url::parse(&health_url) {
        Ok(url) => url,
        Err(e) => {
            return ConnectionTestResult {
                success: false,
                status: None,
                message: format!("Connection failed: invalid URL {}: {}", health_url, e),
                latency_ms: 0,
                server_ip: None,
            }
        }
    };

    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    let request = PreparedRequest {
        method: Method::GET,
        url,
        headers,
        body: RequestBody::Empty,
        timeout: HEALTH_CHECK_TIMEOUT,
    };

    let started = Instant::now();
    let result = transport.send(request).await;
    let latency_ms = started.elapsed().as_millis() as u64;

    match result {
        Ok(response) if response.is_success() => {
            let server_ip = response
                .json_value()
                .get("server_ip")
                .and_then(|ip| ip.as_str())
                .map(str::to_string);
            ConnectionTestResult {
                success: true,
                status: Some(response.status.as_u16()),
                message: format!(
                    "Connected successfully! Server: {} ({}ms)",
                    server_ip.as_deref().unwrap_or("unknown"),
                    latency_ms
                ),
                latency_ms,
                server_ip,
            }
        }
        Ok(response) => ConnectionTestResult {
            success: false,
            status: Some(response.status.as_u16()),
            message: format!("Server responded with status {}", response.status.as_u16()),
            latency_ms,
            server_ip: None,
        },
        Err(err) => ConnectionTestResult {
            success: false,
            status: None,
            message: failure_message(&err, info),
            latency_ms,
            server_ip: None,
        },
    }
}

fn failure_message(err: &TransportError, info: &NetworkDebugInfo) -> String {
    let mut message = String::from("Connection failed: ");
    match err {
        TransportError::Timeout(_) => message.push_str("Request timeout. Check if backend is running."),
        TransportError::Connect(_) => {
            message.push_str("Network error.");
            let emulator = match info.platform {
                Platform::Android => Some(("Android", "Emulator", ANDROID_EMULATOR_HOST)),
                Platform::Ios => Some(("iOS", "Simulator", "localhost")),
                Platform::Web | Platform::Other => None,
            };
            if let Some((platform, kind, host)) = emulator {
                message.push_str(&format!(
                    "\n\n{platform} tips:\n\
                     - {kind}: Backend should be at {host}:{DEV_BACKEND_PORT}\n\
                     - Physical: Use your computer's LAN IP\n\
                     - Current URL: {}",
                    info.api_url
                ));
            }
        }
        TransportError::Build(detail) | TransportError::Request(detail) => {
            message.push_str(detail)
        }
    }
    message
}

/// Setup steps for reaching the backend from this device.
pub fn connection_instructions(info: &NetworkDebugInfo) -> String {
    if info.environment == Environment::Production {
        return "Using production backend. No setup required.".to_string();
    }

    let lan_steps = [
        "Connect phone and computer to the same WiFi".to_string(),
        format!("Start backend with: uvicorn app.main:app --host 0.0.0.0 --port {DEV_BACKEND_PORT}"),
        format!("Check backend logs for \"Server running at: http://XXX.XXX.XXX.XXX:{DEV_BACKEND_PORT}\""),
        format!("Ensure firewall allows port {DEV_BACKEND_PORT}"),
    ];

    let steps: Vec<String> = match (info.platform, info.device_type) {
        (Platform::Android, DeviceType::Emulator) => vec![
            "Ensure backend is running on your computer".to_string(),
            format!("Backend should be accessible at: http://{ANDROID_EMULATOR_HOST}:{DEV_BACKEND_PORT}"),
            format!("Run: uvicorn app.main:app --host 0.0.0.0 --port {DEV_BACKEND_PORT}"),
        ],
        (Platform::Ios, DeviceType::Simulator) => vec![
            "Ensure backend is running on your computer".to_string(),
            format!("Backend should be accessible at: http://localhost:{DEV_BACKEND_PORT}"),
            format!("Run: uvicorn app.main:app --host 127.0.0.1 --port {DEV_BACKEND_PORT}"),
        ],
        (Platform::Android | Platform::Ios, _) => lan_steps.to_vec(),
        _ => vec![
            format!("Ensure backend is running at: http://localhost:{DEV_BACKEND_PORT}"),
            format!("Run: uvicorn app.main:app --port {DEV_BACKEND_PORT}"),
        ],
    };

    let mut out = String::from("Development mode setup:\n\n");
    for (i, step) in steps.iter().enumerate() {
        out.push_str(&format!("{}. {}\n", i + 1, step));
    }
    out
}
