//! Naming of the broker objects bound to one watched table.
//!
//! Every object name is a deterministic function of the table name unless the
//! configuration supplies it explicitly, so repeated configuration targets the
//! same objects. The trigger name may carry a random suffix so that a freshly
//! created trigger never collides with an older generation still being dropped.

use crate::config::ChannelConfig;
use crate::{Error, Result};
use rand::distributions::Alphanumeric;
use rand::Rng;

/// Prefix shared by every trigger this crate installs. Teardown drops any
/// trigger on the watched table whose name starts with it.
pub const TRIGGER_PREFIX: &str = "tr_sbg_";

const TRIGGER_SUFFIX_LEN: usize = 8;

/// SQL Server `sysname` limit.
const MAX_NAME_LENGTH: usize = 128;

/// The provisioned set of Service Broker objects for one table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationChannel {
    pub schema: String,
    pub table: String,
    pub queue: String,
    pub message_type: String,
    pub contract: String,
    pub service: String,
    pub event_notification: String,
    trigger_base: String,
    trigger: String,
    randomize_trigger: bool,
}

impl NotificationChannel {
    /// Channel for `schema.table` with every name derived from the table.
    pub fn new(schema: impl Into<String>, table: impl Into<String>) -> Result<Self> {
        Self::from_config(&ChannelConfig::new(schema, table))
    }

    /// Build the channel from configuration, deriving any name not supplied.
    ///
    /// With `randomize_trigger_name` set, the trigger name stays at its base
    /// until [`next_trigger_generation`](Self::next_trigger_generation) draws
    /// a suffix.
    pub fn from_config(config: &ChannelConfig) -> Result<Self> {
        let stem = capitalize(&config.table);
        let trigger_base = pick(&config.trigger, || format!("{}{}", TRIGGER_PREFIX, stem));

        let channel = Self {
            schema: config.schema.clone(),
            table: config.table.clone(),
            queue: pick(&config.queue, || format!("Change{}Queue", stem)),
            message_type: pick(&config.message_type, || format!("OnUpdate{}", stem)),
            contract: pick(&config.contract, || format!("{}ProcessingContract", stem)),
            service: pick(&config.service, || format!("Change{}Service", stem)),
            event_notification: pick(&config.event_notification, || format!("Change{}", stem)),
            trigger: trigger_base.clone(),
            trigger_base,
            randomize_trigger: config.randomize_trigger_name,
        };
        channel.validate()?;
        Ok(channel)
    }

    /// Current trigger name.
    pub fn trigger(&self) -> &str {
        &self.trigger
    }

    /// Trigger name before any random suffix. Every generation of this
    /// channel's trigger is either this name or this name plus `_suffix`.
    pub fn trigger_base(&self) -> &str {
        &self.trigger_base
    }

    pub fn randomizes_trigger(&self) -> bool {
        self.randomize_trigger
    }

    /// Draw a new trigger generation from `rng`, if randomisation is enabled.
    ///
    /// Returns the trigger name to install.
    pub fn next_trigger_generation<R: Rng + ?Sized>(&mut self, rng: &mut R) -> &str {
        if self.randomize_trigger {
            let suffix: String = (0..TRIGGER_SUFFIX_LEN)
                .map(|_| rng.sample(Alphanumeric) as char)
                .collect();
            self.trigger = format!("{}_{}", self.trigger_base, suffix);
        }
        &self.trigger
    }

    fn validate(&self) -> Result<()> {
        let names = [
            ("schema", &self.schema),
            ("table", &self.table),
            ("queue", &self.queue),
            ("message type", &self.message_type),
            ("contract", &self.contract),
            ("service", &self.service),
            ("event notification", &self.event_notification),
            ("trigger", &self.trigger_base),
        ];

        for (what, name) in names {
            if name.trim().is_empty() {
                return Err(Error::InvalidChannel(format!("{} name cannot be empty", what)));
            }
            // Leave room for the random suffix on the trigger.
            let limit = if what == "trigger" {
                MAX_NAME_LENGTH - TRIGGER_SUFFIX_LEN - 1
            } else {
                MAX_NAME_LENGTH
            };
            if name.chars().count() > limit {
                return Err(Error::InvalidChannel(format!(
                    "{} name '{}' exceeds {} characters",
                    what, name, limit
                )));
            }
        }
        Ok(())
    }
}

fn pick(explicit: &Option<String>, derive: impl FnOnce() -> String) -> String {
    match explicit {
        Some(name) if !name.is_empty() => name.clone(),
        _ => derive(),
    }
}

/// Upper-case the first character, lower-case the rest.
pub(crate) fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first
            .to_uppercase()
            .chain(chars.flat_map(char::to_lowercase))
            .collect(),
        None => String::new(),
    }
}
