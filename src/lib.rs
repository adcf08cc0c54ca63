pub mod broker;
pub mod channel;
pub mod config;
pub mod error;
pub mod mapper;
pub mod payload;
pub mod service;

pub use channel::NotificationChannel;
pub use config::Config;
pub use error::{Error, Result};
pub use mapper::{scan, scan_into, Mappable, MapReport};
pub use payload::{ChangeOperation, ChangeRecord};
pub use service::NotificationService;
