use rand::rngs::StdRng;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::broker::{self, BrokerClient, Receiver, ReceiverStats};
use crate::channel::NotificationChannel;
use crate::config::ReceiverConfig;
use crate::payload::ChangeRecord;
use crate::Result;

/// Change notifications for one table over one connection.
///
/// Owns the client, so provisioning and receiving never overlap.
pub struct NotificationService<C: BrokerClient> {
    client: C,
    channel: NotificationChannel,
    receiver_config: ReceiverConfig,
    rng: StdRng,
}

impl<C: BrokerClient> NotificationService<C> {
    pub fn new(
        client: C,
        channel: NotificationChannel,
        receiver_config: ReceiverConfig,
        rng: StdRng,
    ) -> Self {
        Self {
            client,
            channel,
            receiver_config,
            rng,
        }
    }

    pub fn channel(&self) -> &NotificationChannel {
        &self.channel
    }

    /// Tear down whatever the channel left behind and provision it afresh.
    ///
    /// With trigger randomization on, each call installs the trigger under a
    /// new name; the previous one is removed by the prefix sweep.
    pub async fn configure(&mut self) -> Result<()> {
        if self.channel.randomizes_trigger() {
            let trigger = self.channel.next_trigger_generation(&mut self.rng);
            info!(trigger, "Drew trigger name");
        }
        broker::configure(&mut self.client, &self.channel).await
    }

    pub async fn teardown(&mut self) -> Result<()> {
        broker::teardown(&mut self.client, &self.channel).await
    }

    /// Receive until `cancel` fires, handing each change to `handler`.
    pub async fn run<F>(&mut self, handler: F, cancel: CancellationToken) -> Result<ReceiverStats>
    where
        F: FnMut(ChangeRecord),
    {
        let mut receiver = Receiver::new(&self.channel, &self.receiver_config);
        receiver.run(&mut self.client, handler, cancel).await
    }

    pub fn into_client(self) -> C {
        self.client
    }
}
