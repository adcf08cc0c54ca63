use clap::Parser;
use mssql_capture::broker::SqlServerClient;
use mssql_capture::{ChangeRecord, Config, Error, NotificationChannel, NotificationService, Result};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

#[derive(Parser, Debug)]
#[command(name = "mssql-capture")]
#[command(about = "SQL Server Service Broker change capture", long_about = None)]
struct Args {
    #[arg(short, long, value_name = "FILE", default_value = "config.toml")]
    config: PathBuf,

    #[arg(short, long, help = "Enable JSON output for logs")]
    json_logs: bool,

    #[arg(short, long, help = "Verbose logging")]
    verbose: bool,

    #[arg(long, help = "Remove the channel's broker objects and exit")]
    teardown: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(args.json_logs, args.verbose);

    info!("Starting mssql-capture");
    info!("Loading configuration from {:?}", args.config);

    let config = match Config::from_file(&args.config) {
        Ok(cfg) => {
            info!("Configuration loaded successfully");
            cfg
        }
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            return Err(Error::Config(e));
        }
    };

    info!(
        sqlserver_host = %config.sqlserver.host,
        sqlserver_port = %config.sqlserver.port,
        sqlserver_database = %config.sqlserver.database,
        schema = %config.channel.schema,
        table = %config.channel.table,
        "Configuration summary"
    );

    let channel = NotificationChannel::from_config(&config.channel).inspect_err(|e| {
        error!("Invalid channel configuration: {}", e);
    })?;

    let client = match tokio::time::timeout(
        config.connect_timeout(),
        SqlServerClient::connect(&config.sqlserver),
    )
    .await
    {
        Ok(Ok(client)) => client,
        Ok(Err(e)) => {
            error!("Failed to connect to SQL Server: {}", e);
            return Err(e);
        }
        Err(_) => {
            error!("Timed out connecting to SQL Server");
            return Err(Error::Timeout {
                message: format!(
                    "no connection to {}:{} within {}s",
                    config.sqlserver.host, config.sqlserver.port, config.sqlserver.connect_timeout_secs
                ),
            });
        }
    };

    let mut service = NotificationService::new(
        client,
        channel,
        config.receiver.clone(),
        StdRng::from_entropy(),
    );

    if args.teardown {
        service.teardown().await?;
        info!("Channel removed");
        return service.into_client().close().await;
    }

    if let Err(e) = service.configure().await {
        error!("Failed to configure channel: {}", e);
        return Err(e);
    }

    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            wait_for_shutdown_signal().await;
            cancel.cancel();
        }
    });

    info!(
        queue = %service.channel().queue,
        trigger = service.channel().trigger(),
        "Listening for changes"
    );
    let result = service.run(log_change, cancel).await;

    if config.receiver.teardown_on_shutdown {
        if let Err(e) = service.teardown().await {
            error!("Teardown failed: {}", e);
        }
    }

    let stats = result.inspect_err(|e| error!("Receiver failed: {}", e))?;
    info!(
        messages = stats.messages,
        rows = stats.rows,
        skipped = stats.skipped,
        "Shutdown complete"
    );

    service.into_client().close().await
}

fn log_change(record: ChangeRecord) {
    match serde_json::to_string(&record) {
        Ok(json) => info!(operation = ?record.operation(), "{}", json),
        Err(e) => warn!("Failed to render change record: {}", e),
    }
}

async fn wait_for_shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C"),
        _ = terminate => info!("Received SIGTERM"),
    }
}

fn init_logging(json: bool, verbose: bool) {
    let env_filter = if verbose {
        EnvFilter::new("mssql_capture=debug,info")
    } else {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("mssql_capture=info,warn"))
    };

    let fmt_layer = if json {
        tracing_subscriber::fmt::layer()
            .json()
            .flatten_event(true)
            .with_current_span(false)
            .with_span_list(false)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .with_target(false)
            .with_thread_ids(false)
            .with_thread_names(false)
            .boxed()
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();
}
