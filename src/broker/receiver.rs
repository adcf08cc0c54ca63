use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use super::client::BrokerClient;
use super::statements;
use crate::channel::NotificationChannel;
use crate::config::{DecodeErrorPolicy, ReceiverConfig};
use crate::payload::{self, ChangeRecord};
use crate::Result;

/// One message taken off the queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceivedMessage {
    pub message_type: String,
    pub body: Option<String>,
}

/// Counters reported when the receive loop stops.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReceiverStats {
    /// Wait-and-receive round trips issued.
    pub polls: u64,
    /// Polls that timed out without a message.
    pub empty_polls: u64,
    /// Change messages decoded and handed to the handler.
    pub messages: u64,
    /// Row images delivered across all messages, old and new sections
    /// counted once per affected row.
    pub rows: u64,
    /// Messages dropped: foreign message types, empty bodies, or undecodable
    /// payloads under [`DecodeErrorPolicy::Skip`].
    pub skipped: u64,
}

/// Polls a channel's queue and hands decoded change records to a handler.
pub struct Receiver {
    receive_sql: String,
    message_type: String,
    idle_interval: Duration,
    on_decode_error: DecodeErrorPolicy,
    stats: ReceiverStats,
}

impl Receiver {
    pub fn new(channel: &NotificationChannel, config: &ReceiverConfig) -> Self {
        Self {
            receive_sql: statements::receive(channel, config.wait_timeout()),
            message_type: channel.message_type.clone(),
            idle_interval: config.idle_interval(),
            on_decode_error: config.on_decode_error,
            stats: ReceiverStats::default(),
        }
    }

    pub fn stats(&self) -> ReceiverStats {
        self.stats
    }

    /// Wait for at most one message on the queue.
    ///
    /// `Ok(None)` means the bounded wait elapsed with nothing to receive.
    pub async fn receive<C>(&mut self, client: &mut C) -> Result<Option<ReceivedMessage>>
    where
        C: BrokerClient + ?Sized,
    {
        self.stats.polls += 1;
        let rows = client.query(&self.receive_sql).await?;

        let message = rows.into_iter().next().and_then(|row| {
            let mut columns = row.into_iter();
            let message_type = columns.next().flatten()?;
            let body = columns.next().flatten();
            Some(ReceivedMessage { message_type, body })
        });

        if message.is_none() {
            self.stats.empty_polls += 1;
        }
        Ok(message)
    }

    /// Run until `cancel` fires.
    ///
    /// Each iteration polls, decodes and dispatches before checking for
    /// cancellation again, so an in-flight message is always delivered. The
    /// handler runs inline and receives one record per change message, one at
    /// a time in queue order.
    /// Driver errors end the loop; decode errors end it unless the policy is
    /// [`DecodeErrorPolicy::Skip`].
    pub async fn run<C, F>(
        &mut self,
        client: &mut C,
        mut handler: F,
        cancel: CancellationToken,
    ) -> Result<ReceiverStats>
    where
        C: BrokerClient + ?Sized,
        F: FnMut(ChangeRecord),
    {
        info!("Receiver started");

        while !cancel.is_cancelled() {
            trace!("Polling");
            let Some(message) = self.receive(client).await? else {
                trace!("Empty poll");
                tokio::select! {
                    _ = cancel.cancelled() => {}
                    _ = tokio::time::sleep(self.idle_interval) => {}
                }
                continue;
            };

            if message.message_type != self.message_type {
                debug!(message_type = %message.message_type, "Skipping broker message");
                self.stats.skipped += 1;
                continue;
            }

            let Some(body) = message.body else {
                debug!("Skipping change message without a body");
                self.stats.skipped += 1;
                continue;
            };

            trace!("Decoding {} bytes", body.len());
            let record = match payload::decode_change(&body) {
                Ok(record) => record,
                Err(e) if self.on_decode_error == DecodeErrorPolicy::Skip => {
                    warn!("Skipping undecodable change message: {}", e);
                    self.stats.skipped += 1;
                    continue;
                }
                Err(e) => return Err(e),
            };

            let rows = record.row_count();
            if rows == 0 {
                debug!("Change message affected no rows");
            }

            trace!(operation = ?record.operation(), rows, "Dispatching");
            self.stats.messages += 1;
            self.stats.rows += rows as u64;
            handler(record);
        }

        info!(
            polls = self.stats.polls,
            messages = self.stats.messages,
            rows = self.stats.rows,
            skipped = self.stats.skipped,
            "Receiver stopped"
        );
        Ok(self.stats)
    }
}
