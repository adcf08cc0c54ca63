use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub sqlserver: SqlServerConfig,
    pub channel: ChannelConfig,
    #[serde(default)]
    pub receiver: ReceiverConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SqlServerConfig {
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    pub database: String,
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub encrypt: bool,
    #[serde(default = "default_trust_server_certificate")]
    pub trust_server_certificate: bool,
    #[serde(default = "default_application_name")]
    pub application_name: String,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
}

/// The watched table and, optionally, explicit names for its broker objects.
///
/// Any name left unset is derived from the table name.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ChannelConfig {
    #[serde(default = "default_schema")]
    pub schema: String,
    pub table: String,
    #[serde(default)]
    pub queue: Option<String>,
    #[serde(default)]
    pub message_type: Option<String>,
    #[serde(default)]
    pub contract: Option<String>,
    #[serde(default)]
    pub service: Option<String>,
    #[serde(default)]
    pub event_notification: Option<String>,
    #[serde(default)]
    pub trigger: Option<String>,
    #[serde(default)]
    pub randomize_trigger_name: bool,
}

impl ChannelConfig {
    pub fn new(schema: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            table: table.into(),
            queue: None,
            message_type: None,
            contract: None,
            service: None,
            event_notification: None,
            trigger: None,
            randomize_trigger_name: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ReceiverConfig {
    #[serde(default = "default_wait_timeout_ms")]
    pub wait_timeout_ms: u64,
    #[serde(default = "default_idle_interval_ms")]
    pub idle_interval_ms: u64,
    #[serde(default)]
    pub on_decode_error: DecodeErrorPolicy,
    #[serde(default = "default_teardown_on_shutdown")]
    pub teardown_on_shutdown: bool,
}

impl Default for ReceiverConfig {
    fn default() -> Self {
        Self {
            wait_timeout_ms: default_wait_timeout_ms(),
            idle_interval_ms: default_idle_interval_ms(),
            on_decode_error: DecodeErrorPolicy::default(),
            teardown_on_shutdown: default_teardown_on_shutdown(),
        }
    }
}

impl ReceiverConfig {
    pub fn wait_timeout(&self) -> Duration {
        Duration::from_millis(self.wait_timeout_ms)
    }

    pub fn idle_interval(&self) -> Duration {
        Duration::from_millis(self.idle_interval_ms)
    }
}

/// What the receiver does with a payload it cannot decode.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DecodeErrorPolicy {
    /// Stop the receiver and return the error.
    #[default]
    Fail,
    /// Log, count the message as skipped and keep polling.
    Skip,
}

impl Config {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, config::ConfigError> {
        let settings = config::Config::builder()
            .add_source(config::File::from(path.as_ref()))
            .add_source(
                config::Environment::with_prefix("MSSQL_CAPTURE")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()?;

        settings.try_deserialize()
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.sqlserver.connect_timeout_secs)
    }
}

fn default_port() -> u16 {
    1433
}

fn default_trust_server_certificate() -> bool {
    true
}

fn default_application_name() -> String {
    "mssql-capture".to_string()
}

fn default_connect_timeout() -> u64 {
    30
}

fn default_schema() -> String {
    "dbo".to_string()
}

fn default_wait_timeout_ms() -> u64 {
    1000
}

fn default_idle_interval_ms() -> u64 {
    1000
}

fn default_teardown_on_shutdown() -> bool {
    true
}
