//! ChefMentor Probe
//!
//! Inspects the client configuration, checks that the backend is reachable,
//! and issues authenticated requests through the gateway.

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use chefmentor_core::{
    connection_instructions, test_backend_connection, ApiClient, ClientConfig, CredentialStore,
    Database, Environment, NetworkDebugInfo, RequestOptions, ReqwestTransport, Settings,
    SqliteCredentialStore,
};

#[derive(Debug, Parser)]
#[command(name = "chefmentor-probe", version, about = "Probe a ChefMentor backend")]
struct Cli {
    /// Backend origin, e.g. http://192.168.1.100:8000
    #[arg(long, global = true)]
    backend_url: Option<String>,

    /// Force the environment (production or development)
    #[arg(long, global = true, value_parser = parse_environment)]
    env: Option<Environment>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Print the resolved configuration
    Config {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
    /// Test connectivity to the backend health endpoint
    Check,
    /// Authenticated GET through the gateway
    Get {
        /// Path relative to the API base URL
        path: String,
        /// Query parameter as key=value (repeatable)
        #[arg(short, long = "query", value_parser = parse_key_value)]
        query: Vec<(String, String)>,
    },
    /// Store session tokens
    Login {
        #[arg(long)]
        access_token: String,
        #[arg(long)]
        refresh_token: Option<String>,
    },
    /// Clear the stored session
    Logout,
}

fn parse_environment(value: &str) -> Result<Environment, String> {
    Environment::parse(value).ok_or_else(|| format!("unknown environment '{value}'"))
}

fn parse_key_value(value: &str) -> Result<(String, String), String> {
    value
        .split_once('=')
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .ok_or_else(|| format!("expected key=value, got '{value}'"))
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("chefmentor_core=info".parse()?)
                .add_directive(tracing::Level::WARN.into()),
        )
        .init();

    let cli = Cli::parse();
    tracing::debug!("Starting chefmentor-probe v{}", chefmentor_core::VERSION);

    let db = Database::open().context("Failed to open database")?;
    db.migrate().context("Failed to migrate database")?;

    let mut settings = Settings::load(&db);
    settings.apply_env();
    if let Some(env) = cli.env {
        settings.environment = env;
    }
    if let Some(url) = cli.backend_url {
        settings.backend_url_override = Some(url);
    }
    settings.validate();

    match cli.command {
        Command::Config { json } => print_config(&settings, &db, json),
        Command::Check => check(&settings).await,
        Command::Get { path, query } => {
            let store = SqliteCredentialStore::new(db)?;
            get(&settings, Arc::new(store), &path, query).await
        }
        Command::Login {
            access_token,
            refresh_token,
        } => {
            let store = SqliteCredentialStore::new(db)?;
            store
                .set_tokens(&access_token, refresh_token.as_deref())
                .await?;
            println!("Session stored");
            Ok(())
        }
        Command::Logout => {
            SqliteCredentialStore::new(db)?.clear_auth_data().await?;
            println!("Session cleared");
            Ok(())
        }
    }
}

fn print_config(settings: &Settings, db: &Database, json: bool) -> Result<()> {
    let info = NetworkDebugInfo::from_settings(settings);
    if json {
        let mut value = serde_json::Map::new();
        value.insert("settings".into(), serde_json::to_value(settings)?);
        value.insert("network".into(), serde_json::to_value(&info)?);
        value.insert("database".into(), db.path().display().to_string().into());
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }

    let timeouts = settings.timeouts();
    println!("Environment:   {}", info.environment);
    println!("Platform:      {}", info.platform);
    println!("Device type:   {}", info.device_type);
    println!("API URL:       {}", info.api_url);
    println!("Health URL:    {}", info.health_url());
    println!(
        "Debugger host: {}",
        info.debugger_host.as_deref().unwrap_or("N/A")
    );
    println!(
        "Timeouts:      general {:?}, ai {:?}, upload {:?}",
        timeouts.general, timeouts.ai, timeouts.upload
    );
    println!("Database:      {}", db.path().display());
    Ok(())
}

async fn check(settings: &Settings) -> Result<()> {
    let info = NetworkDebugInfo::from_settings(settings);
    info.log();

    let result = test_backend_connection(&ReqwestTransport::new(), &info).await;
    println!("{}", result.message);
    if !result.success {
        println!();
        print!("{}", connection_instructions(&info));
        bail!("Backend at {} is not reachable", info.health_url());
    }
    Ok(())
}

async fn get(
    settings: &Settings,
    store: Arc<dyn CredentialStore>,
    path: &str,
    query: Vec<(String, String)>,
) -> Result<()> {
    let client = ApiClient::with_reqwest(ClientConfig::from_settings(settings), store);

    let mut options = RequestOptions::new();
    for (key, value) in query {
        options = options.query(key, value);
    }

    match client.get(path, options).await {
        Ok(response) => {
            println!("{}", response.status);
            println!("{}", serde_json::to_string_pretty(&response.json_value())?);
            Ok(())
        }
        Err(err) => {
            if let Some(status) = err.status {
                println!("{}", status);
            }
            if !err.data.is_null() {
                println!("{}", serde_json::to_string_pretty(&err.data)?);
            }
            let kind = err.kind;
            Err(err).with_context(|| format!("GET {} failed ({:?})", path, kind))
        }
    }
}
