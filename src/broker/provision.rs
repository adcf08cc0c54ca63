use tracing::{debug, info, instrument, warn};

use super::client::BrokerClient;
use super::statements;
use crate::channel::NotificationChannel;
use crate::error::ProvisionStep;
use crate::{Error, Result};

/// Bring the channel's broker objects into existence.
///
/// Runs [`teardown`] first so stale objects from an earlier run never
/// survive, then creates queue, message type, contract, service, event
/// notification and trigger, in that order. The first failing statement stops
/// the sequence; objects created before it are left in place.
#[instrument(skip_all, fields(schema = %channel.schema, table = %channel.table))]
pub async fn configure<C>(client: &mut C, channel: &NotificationChannel) -> Result<()>
where
    C: BrokerClient + ?Sized,
{
    teardown(client, channel).await?;

    let steps = [
        (ProvisionStep::CreateQueue, statements::create_queue(channel)),
        (
            ProvisionStep::CreateMessageType,
            statements::create_message_type(channel),
        ),
        (ProvisionStep::CreateContract, statements::create_contract(channel)),
        (ProvisionStep::CreateService, statements::create_service(channel)),
        (
            ProvisionStep::CreateEventNotification,
            statements::create_event_notification(channel),
        ),
        (ProvisionStep::CreateTrigger, statements::create_trigger(channel)),
    ];

    for (step, sql) in steps {
        run_step(client, step, &sql).await?;
    }

    info!(
        queue = %channel.queue,
        service = %channel.service,
        trigger = %channel.trigger(),
        "Notification channel configured"
    );
    Ok(())
}

/// Remove the channel's broker objects.
///
/// Triggers go first so nothing new is emitted, then event notification,
/// service, contract, message type and queue, each guarded by an existence
/// check. Safe to call repeatedly or on a channel that was never configured.
#[instrument(skip_all, fields(schema = %channel.schema, table = %channel.table))]
pub async fn teardown<C>(client: &mut C, channel: &NotificationChannel) -> Result<()>
where
    C: BrokerClient + ?Sized,
{
    drop_triggers(client, channel)
        .await
        .map_err(|e| Error::provision(ProvisionStep::DropTriggers, e))?;

    let steps = [
        (
            ProvisionStep::DropEventNotification,
            statements::drop_event_notification(channel),
        ),
        (ProvisionStep::DropService, statements::drop_service(channel)),
        (ProvisionStep::DropContract, statements::drop_contract(channel)),
        (
            ProvisionStep::DropMessageType,
            statements::drop_message_type(channel),
        ),
        (ProvisionStep::DropQueue, statements::drop_queue(channel)),
    ];

    for (step, sql) in steps {
        run_step(client, step, &sql).await?;
    }

    info!("Notification channel torn down");
    Ok(())
}

async fn drop_triggers<C>(client: &mut C, channel: &NotificationChannel) -> Result<()>
where
    C: BrokerClient + ?Sized,
{
    let rows = client.query(&statements::find_triggers(channel)).await?;

    let names: Vec<String> = rows
        .into_iter()
        .filter_map(|row| row.into_iter().next().flatten())
        .collect();

    if names.is_empty() {
        debug!("No triggers to drop");
        return Ok(());
    }

    for name in names {
        if name != channel.trigger() {
            warn!(trigger = %name, "Dropping orphaned trigger");
        }
        client
            .execute(&statements::drop_trigger(&channel.schema, &name))
            .await?;
        debug!(trigger = %name, "Dropped trigger");
    }
    Ok(())
}

async fn run_step<C>(client: &mut C, step: ProvisionStep, sql: &str) -> Result<()>
where
    C: BrokerClient + ?Sized,
{
    debug!(%step, "Running provisioning step");
    client
        .execute(sql)
        .await
        .map_err(|e| Error::provision(step, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::test_utils::MockBrokerClient;

    fn product_channel() -> NotificationChannel {
        NotificationChannel::new("dbo", "product").unwrap()
    }

    #[tokio::test]
    async fn test_configure_runs_teardown_then_creates_in_order() {
        let channel = product_channel();
        let mut client = MockBrokerClient::new();

        configure(&mut client, &channel).await.unwrap();

        let log = client.statements();
        assert_eq!(log.len(), 1 + 5 + 6);
        assert!(log[0].starts_with("SELECT tr.name"));
        assert!(log[1].contains("DROP EVENT NOTIFICATION"));
        assert!(log[2].contains("DROP SERVICE"));
        assert!(log[3].contains("DROP CONTRACT"));
        assert!(log[4].contains("DROP MESSAGE TYPE"));
        assert!(log[5].contains("DROP QUEUE"));
        assert!(log[6].starts_with("CREATE QUEUE"));
        assert!(log[7].starts_with("CREATE MESSAGE TYPE"));
        assert!(log[8].starts_with("CREATE CONTRACT"));
        assert!(log[9].starts_with("CREATE SERVICE"));
        assert!(log[10].starts_with("CREATE EVENT NOTIFICATION"));
        assert!(log[11].starts_with("CREATE TRIGGER"));
    }

    #[tokio::test]
    async fn test_teardown_is_idempotent() {
        let channel = product_channel();
        let mut client = MockBrokerClient::new();

        teardown(&mut client, &channel).await.unwrap();
        teardown(&mut client, &channel).await.unwrap();

        let log = client.statements();
        assert_eq!(log.len(), 12);
        assert_eq!(log[..6], log[6..]);
    }

    #[tokio::test]
    async fn test_teardown_drops_found_triggers_first() {
        let channel = product_channel();
        let mut client = MockBrokerClient::new().with_query_result(
            "SELECT tr.name",
            vec![
                vec![Some("tr_sbg_Product".to_string())],
                vec![Some("tr_sbg_Product_Ab12Cd34".to_string())],
            ],
        );

        teardown(&mut client, &channel).await.unwrap();

        let log = client.statements();
        assert_eq!(log[1], "DROP TRIGGER [dbo].[tr_sbg_Product];");
        assert_eq!(log[2], "DROP TRIGGER [dbo].[tr_sbg_Product_Ab12Cd34];");
        assert!(log[3].contains("DROP EVENT NOTIFICATION"));
    }

    #[tokio::test]
    async fn test_no_creation_after_failed_teardown() {
        let channel = product_channel();
        let mut client = MockBrokerClient::new().fail_on("DROP CONTRACT");

        let err = configure(&mut client, &channel).await.unwrap_err();

        assert_eq!(err.provision_step(), Some(ProvisionStep::DropContract));
        assert!(client
            .statements()
            .iter()
            .all(|sql| !sql.starts_with("CREATE")));
    }

    #[tokio::test]
    async fn test_trigger_lookup_failure_is_reported() {
        let channel = product_channel();
        let mut client = MockBrokerClient::new().fail_on("SELECT tr.name");

        let err = teardown(&mut client, &channel).await.unwrap_err();
        assert_eq!(err.provision_step(), Some(ProvisionStep::DropTriggers));
        assert_eq!(client.statements().len(), 1);
    }

    #[tokio::test]
    async fn test_configure_stops_at_first_failed_creation() {
        let channel = product_channel();
        let mut client = MockBrokerClient::new().fail_on("CREATE SERVICE");

        let err = configure(&mut client, &channel).await.unwrap_err();

        assert_eq!(err.provision_step(), Some(ProvisionStep::CreateService));
        let log = client.statements();
        assert!(log.last().unwrap().starts_with("CREATE SERVICE"));
        assert!(log.iter().all(|sql| !sql.starts_with("CREATE EVENT NOTIFICATION")));
        assert!(log.iter().all(|sql| !sql.starts_with("CREATE TRIGGER")));
        // Nothing is rolled back.
        assert!(log.iter().any(|sql| sql.starts_with("CREATE CONTRACT")));
    }
}
