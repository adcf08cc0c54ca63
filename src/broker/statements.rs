//! T-SQL text for provisioning, teardown and polling.
//!
//! Statements are parameterised only by the channel's names, which are
//! interpolated as bracket-quoted identifiers or N'' literals.

use std::time::Duration;

use crate::channel::{NotificationChannel, TRIGGER_PREFIX};

/// Message type Service Broker sends when the far side ends a dialog.
pub const END_DIALOG_MESSAGE_TYPE: &str =
    "http://schemas.microsoft.com/SQL/ServiceBroker/EndDialog";

/// Quote an identifier as `[name]`, doubling any `]`.
pub fn quote_ident(name: &str) -> String {
    format!("[{}]", name.replace(']', "]]"))
}

/// Quote a string literal as `N'text'`, doubling any `'`.
pub fn quote_literal(text: &str) -> String {
    format!("N'{}'", text.replace('\'', "''"))
}

fn qualified(schema: &str, name: &str) -> String {
    format!("{}.{}", quote_ident(schema), quote_ident(name))
}

/// Escape `LIKE` wildcards so the prefix matches literally.
fn like_prefix(prefix: &str) -> String {
    let mut escaped = String::with_capacity(prefix.len() + 4);
    for c in prefix.chars() {
        match c {
            '_' | '%' | '[' => {
                escaped.push('[');
                escaped.push(c);
                escaped.push(']');
            }
            _ => escaped.push(c),
        }
    }
    escaped.push('%');
    escaped
}

pub fn create_queue(channel: &NotificationChannel) -> String {
    format!("CREATE QUEUE {};", qualified(&channel.schema, &channel.queue))
}

pub fn create_message_type(channel: &NotificationChannel) -> String {
    format!(
        "CREATE MESSAGE TYPE {} VALIDATION = NONE;",
        quote_ident(&channel.message_type)
    )
}

pub fn create_contract(channel: &NotificationChannel) -> String {
    format!(
        "CREATE CONTRACT {} ({} SENT BY INITIATOR);",
        quote_ident(&channel.contract),
        quote_ident(&channel.message_type)
    )
}

pub fn create_service(channel: &NotificationChannel) -> String {
    format!(
        "CREATE SERVICE {} ON QUEUE {} ({});",
        quote_ident(&channel.service),
        qualified(&channel.schema, &channel.queue),
        quote_ident(&channel.contract)
    )
}

pub fn create_event_notification(channel: &NotificationChannel) -> String {
    format!(
        "CREATE EVENT NOTIFICATION {} ON QUEUE {} FOR QUEUE_ACTIVATION TO SERVICE '{}', 'current database';",
        quote_ident(&channel.event_notification),
        qualified(&channel.schema, &channel.queue),
        channel.service.replace('\'', "''")
    )
}

/// The row trigger: one message per firing, holding the deleted image under
/// `OldValues` and the inserted image under `NewValues`, wrapped in `row`.
pub fn create_trigger(channel: &NotificationChannel) -> String {
    format!(
        r#"CREATE TRIGGER {trigger}
ON {table}
AFTER INSERT, UPDATE, DELETE
AS
BEGIN
    SET NOCOUNT ON;

    DECLARE @message XML;
    SET @message = (
        SELECT
            (SELECT * FROM deleted FOR XML PATH('OldValues'), TYPE),
            (SELECT * FROM inserted FOR XML PATH('NewValues'), TYPE)
        FOR XML PATH('row'), TYPE
    );

    DECLARE @handle UNIQUEIDENTIFIER;
    BEGIN DIALOG CONVERSATION @handle
        FROM SERVICE {service}
        TO SERVICE '{service_name}'
        ON CONTRACT {contract}
        WITH ENCRYPTION = OFF;

    SEND ON CONVERSATION @handle
        MESSAGE TYPE {message_type} (@message);
    END CONVERSATION @handle;
END;"#,
        trigger = qualified(&channel.schema, channel.trigger()),
        table = qualified(&channel.schema, &channel.table),
        service = quote_ident(&channel.service),
        service_name = channel.service.replace('\'', "''"),
        contract = quote_ident(&channel.contract),
        message_type = quote_ident(&channel.message_type),
    )
}

/// Names of every trigger on the watched table installed by this crate,
/// including orphans left behind by earlier generations.
///
/// Matches the shared `tr_sbg_` prefix, the channel's trigger base name and
/// any `<base>_<suffix>` generation of it, so custom trigger names are swept
/// as well.
pub fn find_triggers(channel: &NotificationChannel) -> String {
    format!(
        r#"SELECT tr.name
FROM sys.triggers AS tr
JOIN sys.tables AS t ON tr.parent_id = t.object_id
JOIN sys.schemas AS s ON t.schema_id = s.schema_id
WHERE s.name = {schema}
  AND t.name = {table}
  AND (tr.name LIKE {prefix}
    OR tr.name = {base}
    OR tr.name LIKE {generations}
    OR tr.name = {current});"#,
        schema = quote_literal(&channel.schema),
        table = quote_literal(&channel.table),
        prefix = quote_literal(&like_prefix(TRIGGER_PREFIX)),
        base = quote_literal(channel.trigger_base()),
        generations = quote_literal(&like_prefix(&format!("{}_", channel.trigger_base()))),
        current = quote_literal(channel.trigger()),
    )
}

pub fn drop_trigger(schema: &str, trigger: &str) -> String {
    format!("DROP TRIGGER {};", qualified(schema, trigger))
}

pub fn drop_event_notification(channel: &NotificationChannel) -> String {
    format!(
        "IF EXISTS (SELECT * FROM sys.event_notifications WHERE name = {}) DROP EVENT NOTIFICATION {} ON QUEUE {};",
        quote_literal(&channel.event_notification),
        quote_ident(&channel.event_notification),
        qualified(&channel.schema, &channel.queue)
    )
}

pub fn drop_service(channel: &NotificationChannel) -> String {
    format!(
        "IF EXISTS (SELECT * FROM sys.services WHERE name = {}) DROP SERVICE {};",
        quote_literal(&channel.service),
        quote_ident(&channel.service)
    )
}

pub fn drop_contract(channel: &NotificationChannel) -> String {
    format!(
        "IF EXISTS (SELECT * FROM sys.service_contracts WHERE name = {}) DROP CONTRACT {};",
        quote_literal(&channel.contract),
        quote_ident(&channel.contract)
    )
}

pub fn drop_message_type(channel: &NotificationChannel) -> String {
    format!(
        "IF EXISTS (SELECT * FROM sys.service_message_types WHERE name = {}) DROP MESSAGE TYPE {};",
        quote_literal(&channel.message_type),
        quote_ident(&channel.message_type)
    )
}

pub fn drop_queue(channel: &NotificationChannel) -> String {
    format!(
        "IF EXISTS (SELECT * FROM sys.service_queues WHERE name = {} AND schema_id = SCHEMA_ID({})) DROP QUEUE {};",
        quote_literal(&channel.queue),
        quote_literal(&channel.schema),
        qualified(&channel.schema, &channel.queue)
    )
}

/// Wait up to `timeout` for the next message on the channel's queue.
///
/// Yields at most one row of (`message_type_name`, `message_body`). The
/// receiving side ends the conversation when the message is an `EndDialog`.
pub fn receive(channel: &NotificationChannel, timeout: Duration) -> String {
    format!(
        r#"SET NOCOUNT ON;
DECLARE @handle UNIQUEIDENTIFIER, @type SYSNAME, @body NVARCHAR(MAX);
WAITFOR (
    RECEIVE TOP(1)
        @handle = conversation_handle,
        @type = message_type_name,
        @body = CAST(CAST(message_body AS XML) AS NVARCHAR(MAX))
    FROM {queue}
), TIMEOUT {timeout_ms};
IF @type = {end_dialog} END CONVERSATION @handle;
SELECT @type AS message_type_name, @body AS message_body WHERE @handle IS NOT NULL;"#,
        queue = qualified(&channel.schema, &channel.queue),
        timeout_ms = timeout.as_millis(),
        end_dialog = quote_literal(END_DIALOG_MESSAGE_TYPE),
    )
}
