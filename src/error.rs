//! Error types and result handling for mssql-capture.
//!
//! This module defines the main error type [`Error`] and a convenience
//! [`Result`] type alias used throughout the crate.
//!
//! # Example
//!
//! ```rust
//! use mssql_capture::{Error, Result};
//!
//! fn connect_to_database() -> Result<()> {
//!     // Simulating a connection error
//!     Err(Error::Connection("Failed to connect".to_string()))
//! }
//!
//! match connect_to_database() {
//!     Ok(()) => println!("Connected"),
//!     Err(Error::Connection(msg)) => eprintln!("Connection error: {}", msg),
//!     Err(e) => eprintln!("Other error: {}", e),
//! }
//! ```

use std::fmt;
use thiserror::Error;

/// The main error type for mssql-capture operations.
///
/// Every failure surfaces here as a value; nothing in the library aborts the
/// process. The host decides whether to retry, log or terminate.
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error, from the config file, environment or CLI.
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    /// SQL Server client or TDS protocol error.
    #[error("SQL Server error: {0}")]
    SqlServer(#[from] tiberius::error::Error),

    /// Malformed markup in a change payload.
    #[error("Decode error: {0}")]
    Decode(#[from] quick_xml::Error),

    /// JSON serialization error when rendering change records.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O error, typically from the TCP connect.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic connection error not covered by specific types.
    #[error("Connection error: {0}")]
    Connection(String),

    /// A channel name failed validation.
    #[error("Invalid channel: {0}")]
    InvalidChannel(String),

    /// A provisioning or teardown statement failed.
    ///
    /// `step` names the statement; steps issued before it are not rolled back.
    #[error("Provisioning failed at {step}: {source}")]
    Provision {
        /// The statement that failed
        step: ProvisionStep,
        /// The underlying failure
        source: Box<Error>,
    },

    /// Well-formed markup that is not a change payload.
    #[error("Invalid message format: {message}")]
    InvalidMessage {
        /// Description of what was invalid
        message: String,
    },

    /// A textual value could not be parsed into the field's numeric type.
    #[error("Cannot coerce {value:?} into {target} field '{field}'")]
    Coercion {
        /// Field name on the target record
        field: &'static str,
        /// The offending source text
        value: String,
        /// Name of the target kind
        target: &'static str,
    },

    /// Operation timeout.
    #[error("Timeout error: {message}")]
    Timeout {
        /// Description of what timed out
        message: String,
    },
}

impl Error {
    pub(crate) fn provision(step: ProvisionStep, source: Error) -> Self {
        Error::Provision {
            step,
            source: Box::new(source),
        }
    }

    /// The provisioning step that failed, if this is a provisioning error.
    pub fn provision_step(&self) -> Option<ProvisionStep> {
        match self {
            Error::Provision { step, .. } => Some(*step),
            _ => None,
        }
    }
}

/// One statement of the channel provisioning / teardown sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProvisionStep {
    DropTriggers,
    DropEventNotification,
    DropService,
    DropContract,
    DropMessageType,
    DropQueue,
    CreateQueue,
    CreateMessageType,
    CreateContract,
    CreateService,
    CreateEventNotification,
    CreateTrigger,
}

impl fmt::Display for ProvisionStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ProvisionStep::DropTriggers => "drop triggers",
            ProvisionStep::DropEventNotification => "drop event notification",
            ProvisionStep::DropService => "drop service",
            ProvisionStep::DropContract => "drop contract",
            ProvisionStep::DropMessageType => "drop message type",
            ProvisionStep::DropQueue => "drop queue",
            ProvisionStep::CreateQueue => "create queue",
            ProvisionStep::CreateMessageType => "create message type",
            ProvisionStep::CreateContract => "create contract",
            ProvisionStep::CreateService => "create service",
            ProvisionStep::CreateEventNotification => "create event notification",
            ProvisionStep::CreateTrigger => "create trigger",
        };
        f.write_str(name)
    }
}

/// A convenient Result type alias for mssql-capture operations.
///
/// This is equivalent to `std::result::Result<T, mssql_capture::Error>`.
///
/// # Example
///
/// ```rust
/// use mssql_capture::Result;
///
/// fn do_something() -> Result<String> {
///     Ok("Success".to_string())
/// }
/// ```
pub type Result<T> = std::result::Result<T, Error>;
