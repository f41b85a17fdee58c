//! Configuration settings for ConnSync
//!
//! Defines the CLI arguments, the monitor configuration and its defaults,
//! and loading of JSON configuration files.

use crate::error::{Result, SyncError};
use clap::{Parser, Subcommand, ValueEnum};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default subscription reservation endpoint
pub const DEFAULT_RESERVATIONS_URL: &str = "http://syndesis-server/api/v1/event/reservations";

/// Default websocket stream base; the reservation token is appended
pub const DEFAULT_STREAM_URL: &str = "ws://syndesis-server/api/v1/event/streams.ws/";

/// Default catalog listing endpoint
pub const DEFAULT_CATALOG_URL: &str = "http://syndesis-server/api/v1/connections";

/// Default delay between maintenance iterations
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(30);

/// Default retry budget for a failing change handler
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// ConnSync - keep a virtualization workspace in sync with a connection catalog
#[derive(Parser, Debug, Clone)]
#[command(name = "connsync")]
#[command(author = "ConnSync Team")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Mirror catalog connection events into a data-virtualization workspace")]
#[command(long_about = r#"
ConnSync subscribes to a connection catalog's event stream and applies
connection lifecycle changes to a local workspace.

Features:
  - Websocket subscription with automatic reconnect
  - Idempotent change handlers with bounded retries
  - Full reconciliation after every (re)connect
  - One-shot reconciliation and frame decoding tools

Examples:
  connsync monitor --workspace ws.json           # Run the monitor
  connsync reconcile --workspace ws.json         # One-shot full sync
  connsync decode '{"event":"message","data":"connected"}'
"#)]
pub struct CliArgs {
    /// JSON configuration file
    #[arg(short = 'c', long, global = true, value_name = "PATH", env = "CONNSYNC_CONFIG")]
    pub config: Option<PathBuf>,

    /// Workspace file (JSON); in-memory when omitted
    #[arg(short = 'w', long, global = true, value_name = "PATH")]
    pub workspace: Option<PathBuf>,

    /// Verbose output (can be repeated: -v, -vv, -vvv)
    #[arg(short = 'v', long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Quiet mode (errors only)
    #[arg(short = 'q', long, global = true)]
    pub quiet: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    pub log_json: bool,

    /// Subcommand
    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Run the connection event monitor until interrupted
    #[command(name = "monitor")]
    Monitor {
        /// Reservation endpoint
        #[arg(long, value_name = "URL")]
        reservations_url: Option<String>,
        /// Websocket stream base URL
        #[arg(long, value_name = "URL")]
        stream_url: Option<String>,
        /// Catalog listing endpoint
        #[arg(long, value_name = "URL")]
        catalog_url: Option<String>,
        /// Delay between maintenance iterations (e.g. 30s, 1m)
        #[arg(long, value_name = "DURATION")]
        poll_interval: Option<String>,
        /// Retries for a failing change handler
        #[arg(long, value_name = "NUM")]
        max_retries: Option<u32>,
        /// What to do with handlers still running when inspected
        #[arg(long, value_enum)]
        in_flight: Option<InFlightPolicy>,
    },

    /// Run one full reconciliation and exit
    #[command(name = "reconcile")]
    Reconcile {
        /// Catalog listing endpoint
        #[arg(long, value_name = "URL")]
        catalog_url: Option<String>,
        /// Report format
        #[arg(long, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Decode a frame (argument or stdin) and show how it is classified
    #[command(name = "decode")]
    Decode {
        /// Frame text; read from stdin when omitted
        frame: Option<String>,
    },

    /// Print the effective configuration as JSON
    #[command(name = "show-config")]
    ShowConfig,
}

/// Handling of a pending entry whose task is still running when inspected
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum InFlightPolicy {
    /// Put the entry back unchanged so its outcome is still checked
    #[default]
    Requeue,
    /// Stop tracking the entry; the task finishes unobserved
    Forget,
}

/// Output format for reports
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    /// Human-readable text
    #[default]
    Text,
    /// JSON format
    Json,
}

/// Runtime configuration of the monitor and its collaborators
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Subscription reservation endpoint (POST)
    pub reservations_url: String,
    /// Websocket base URL; the reservation token is appended
    pub stream_url: String,
    /// Catalog listing endpoint (GET)
    pub catalog_url: String,
    /// Value of the forwarded-user header
    pub forwarded_user: String,
    /// Value of the forwarded-access-token header
    pub access_token: String,
    /// Name of the XSRF header
    pub xsrf_header: String,
    /// Value of the XSRF header
    pub xsrf_token: String,
    /// Delay between maintenance iterations
    #[serde(with = "duration_str")]
    pub poll_interval: Duration,
    /// Retries for a failing change handler
    pub max_retries: u32,
    /// Handling of entries still running when inspected
    pub in_flight_policy: InFlightPolicy,
    /// Timeout of HTTP requests
    #[serde(with = "duration_str")]
    pub request_timeout: Duration,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            reservations_url: DEFAULT_RESERVATIONS_URL.to_string(),
            stream_url: DEFAULT_STREAM_URL.to_string(),
            catalog_url: DEFAULT_CATALOG_URL.to_string(),
            forwarded_user: "user".to_string(),
            access_token: "supersecret".to_string(),
            xsrf_header: "SYNDESIS-XSRF-TOKEN".to_string(),
            xsrf_token: "awesome".to_string(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            max_retries: DEFAULT_MAX_RETRIES,
            in_flight_policy: InFlightPolicy::default(),
            request_timeout: Duration::from_secs(30),
        }
    }
}

impl MonitorConfig {
    /// Load configuration from a JSON file; missing fields keep their defaults
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content =
            std::fs::read_to_string(path).map_err(|e| SyncError::io(path, e))?;
        let config: Self = serde_json::from_str(&content)
            .map_err(|e| SyncError::config(format!("{}: {}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Build the effective configuration from CLI args
    pub fn from_cli(args: &CliArgs) -> Result<Self> {
        let mut config = match &args.config {
            Some(path) => Self::load(path)?,
            None => Self::default(),
        };

        match &args.command {
            Commands::Monitor {
                reservations_url,
                stream_url,
                catalog_url,
                poll_interval,
                max_retries,
                in_flight,
            } => {
                if let Some(url) = reservations_url {
                    config.reservations_url = url.clone();
                }
                if let Some(url) = stream_url {
                    config.stream_url = url.clone();
                }
                if let Some(url) = catalog_url {
                    config.catalog_url = url.clone();
                }
                if let Some(interval) = poll_interval {
                    config.poll_interval = humantime::parse_duration(interval).map_err(|e| {
                        SyncError::config(format!("Invalid poll interval '{}': {}", interval, e))
                    })?;
                }
                if let Some(retries) = max_retries {
                    config.max_retries = *retries;
                }
                if let Some(policy) = in_flight {
                    config.in_flight_policy = *policy;
                }
            }
            Commands::Reconcile {
                catalog_url: Some(url),
                ..
            } => {
                config.catalog_url = url.clone();
            }
            _ => {}
        }

        config.validate()?;
        Ok(config)
    }

    /// Reject configurations the monitor cannot run with
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("reservations_url", &self.reservations_url),
            ("stream_url", &self.stream_url),
            ("catalog_url", &self.catalog_url),
        ] {
            if value.trim().is_empty() {
                return Err(SyncError::config(format!("{} must not be empty", name)));
            }
        }
        if self.poll_interval.is_zero() {
            return Err(SyncError::config("poll_interval must be greater than zero"));
        }
        Ok(())
    }

    /// Websocket URL for a reservation token
    pub fn stream_url_for(&self, token: &str) -> String {
        format!("{}{}", self.stream_url, token)
    }

    /// Headers sent with every request to the catalog service
    pub fn request_headers(&self) -> Vec<(String, String)> {
        vec![
            ("Content-Type".to_string(), "application/json".to_string()),
            ("Accept".to_string(), "application/json".to_string()),
            ("X-Forwarded-User".to_string(), self.forwarded_user.clone()),
            (self.xsrf_header.clone(), self.xsrf_token.clone()),
            ("X-Forwarded-Access-Token".to_string(), self.access_token.clone()),
        ]
    }
}

/// Serde adapter storing durations as humantime strings ("30s", "1m 30s")
mod duration_str {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&humantime::format_duration(*value).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let s = String::deserialize(deserializer)?;
        humantime::parse_duration(&s).map_err(serde::de::Error::custom)
    }
}
