#![allow(dead_code)]

use mssql_capture::config::{ChannelConfig, Config, ReceiverConfig, SqlServerConfig};
use std::env;

/// Get test configuration from environment variables
pub fn get_test_config(table: &str) -> Config {
    // Use TEST_ prefix for test environment variables
    let sqlserver = SqlServerConfig {
        host: env::var("TEST_MSSQL_HOST").unwrap_or_else(|_| "localhost".to_string()),
        port: env::var("TEST_MSSQL_PORT")
            .unwrap_or_else(|_| "1433".to_string())
            .parse()
            .unwrap_or(1433),
        database: env::var("TEST_MSSQL_DATABASE").unwrap_or_else(|_| "master".to_string()),
        username: env::var("TEST_MSSQL_USERNAME").unwrap_or_else(|_| "sa".to_string()),
        password: env::var("TEST_MSSQL_PASSWORD")
            .unwrap_or_else(|_| "YourStrong!Passw0rd".to_string()),
        encrypt: false,
        trust_server_certificate: true,
        application_name: "mssql-capture-tests".to_string(),
        connect_timeout_secs: 10,
    };

    let receiver = ReceiverConfig {
        wait_timeout_ms: 500, // Short waits keep cancellation snappy
        idle_interval_ms: 50,
        ..ReceiverConfig::default()
    };

    Config {
        sqlserver,
        channel: ChannelConfig::new("dbo", table),
        receiver,
    }
}

/// A table name unique to this test process
pub fn test_table(name: &str) -> String {
    format!("{}_{}", name, std::process::id())
}

pub const PRODUCT_PAYLOAD_UPDATE: &str = "<row>\
    <OldValues><product_id>1</product_id><SKU>W-1</SKU><name>Widget</name><price>10.0</price></OldValues>\
    <NewValues><product_id>1</product_id><SKU>W-1</SKU><name>Widget</name><price>12.5</price></NewValues>\
    </row>";
