//! Supervisor process entry point.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use alarmflow_bus::kafka::{KafkaPublisher, KafkaSubscriber};
use alarmflow_cdb::{CdbReader, JsonCdbReader};
use alarmflow_core::TransferFunctionRegistry;
use alarmflow_supervisor::{Settings, Supervisor};
use alarmflow_types::{Identifier, IdentifierKind};

/// Runs one supervisor and the distributed units it deploys.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Id of the supervisor to deploy, as configured in the CDB.
    supervisor_id: String,

    /// Root of the file-based configuration store.
    #[arg(short = 'j', long = "jcdb", default_value = "cdb")]
    jcdb: PathBuf,

    /// Log level override (TRACE|DEBUG|INFO|WARN|ERROR).
    #[arg(short = 'x', long = "logLevel")]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let cdb = JsonCdbReader::new(&args.jcdb);
    let ias = cdb
        .ias_config()
        .with_context(|| format!("reading global configuration under {}", args.jcdb.display()))?;

    let level = args
        .log_level
        .or_else(|| ias.log_level.clone())
        .unwrap_or_else(|| "info".to_string());
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("alarmflow={}", level.to_lowercase()).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("starting supervisor '{}'", args.supervisor_id);
    info!("version: {}", env!("CARGO_PKG_VERSION"));
    info!("configuration store: {}", args.jcdb.display());

    let settings = Settings::resolve(&ias);
    let identifier = Identifier::new(&args.supervisor_id, IdentifierKind::Supervisor, None)
        .context("invalid supervisor id")?;

    let publisher = Arc::new(KafkaPublisher::new(settings.brokers.clone()));
    let subscriber = Arc::new(KafkaSubscriber::new(
        settings.brokers.clone(),
        identifier.running_id(),
    ));

    let supervisor = Arc::new(
        Supervisor::new(
            identifier,
            &cdb,
            publisher,
            subscriber,
            &TransferFunctionRegistry::with_defaults(),
            &settings,
        )
        .context("building the supervisor from the configuration store")?,
    );

    supervisor
        .start()
        .await
        .context("starting the supervisor")?;

    wait_for_termination().await;
    supervisor.cleanup().await;
    Ok(())
}

/// Blocks until SIGINT or SIGTERM.
async fn wait_for_termination() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm =
            signal(SignalKind::terminate()).expect("installing the SIGTERM handler");
        tokio::select! {
            _ = tokio::signal::ctrl_c() => info!("SIGINT received"),
            _ = sigterm.recv() => info!("SIGTERM received"),
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
        info!("interrupt received");
    }
}
