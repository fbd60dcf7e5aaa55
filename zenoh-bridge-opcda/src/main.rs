//! Zenoh bridge for classic DA tag servers.
//!
//! Polls tags from a DA source and republishes the latest reading of each
//! tag to Zenoh, either as published messages or as a served attribute
//! table with optional write-back.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{debug, info, warn};

use dabridge_common::{LoggingConfig, current_timestamp_millis};
use dabridge_engine::{BridgeHealth, DaSource, PollScheduler, Sink, TagCatalog};
use zenoh_bridge_opcda::config::{OpcdaBridgeConfig, SinkConfig};
use zenoh_bridge_opcda::console::ConsoleSink;
use zenoh_bridge_opcda::memory;
use zenoh_bridge_opcda::publish::ZenohPublisher;
use zenoh_bridge_opcda::serve::ServedTarget;
use zenoh_bridge_opcda::sim::SimulatedSource;

/// Reserved exit status telling the supervisor to restart the process.
const EXIT_RESTART: u8 = 3;

/// Zenoh bridge for classic DA tag servers.
#[derive(Parser, Debug)]
#[command(name = "zenoh-bridge-opcda")]
#[command(about = "Polls a DA tag server and republishes to Zenoh")]
#[command(version)]
struct Args {
    /// Path to configuration file (JSON5 format)
    #[arg(short, long, default_value = "opcda.json5")]
    config: PathBuf,

    /// Override log level (trace, debug, info, warn, error).
    #[arg(long)]
    log_level: Option<String>,
}

/// Why the bridge stopped.
enum StopReason {
    /// Operator-initiated stop; exit 0.
    Signal,
    /// Resource ceiling tripped; exit with the reserved restart status.
    MemoryCeiling,
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(StopReason::Signal) => ExitCode::SUCCESS,
        Ok(StopReason::MemoryCeiling) => ExitCode::from(EXIT_RESTART),
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<StopReason> {
    let args = Args::parse();

    // Load configuration
    let config = OpcdaBridgeConfig::load_from_file(&args.config)
        .with_context(|| format!("Failed to load config from {:?}", args.config))?;

    // Initialize logging
    let log_config = LoggingConfig {
        level: args
            .log_level
            .clone()
            .unwrap_or_else(|| config.logging.level.clone()),
        format: config.logging.format,
    };
    dabridge_common::init_tracing(&log_config)
        .map_err(|e| anyhow::anyhow!("Failed to init tracing: {}", e))?;

    info!("Starting zenoh-bridge-opcda");
    info!("Loaded configuration from {:?}", args.config);

    // The built-in backend simulates a DA namespace under the ProgID; real
    // transports implement the same DaSource seam.
    let source: Arc<dyn DaSource> = Arc::new(SimulatedSource::new(
        &config.source.prog_id,
        current_timestamp_millis() as u64,
    ));
    info!(
        host = %config.source.host,
        prog_id = %config.source.prog_id,
        "DA source ready (simulated)"
    );

    // Resolve the tag catalog; failure here is fatal and non-restartable.
    let catalog_spec = config.catalog_spec();
    let catalog = TagCatalog::resolve(&catalog_spec, source.as_ref())
        .await
        .context("Failed to resolve tag catalog")?;
    info!("Monitoring {} tags", catalog.len());
    for tag in catalog.tags() {
        debug!(tag = %tag, "Monitoring tag");
    }

    let health = Arc::new(BridgeHealth::new());

    // Connect to Zenoh unless this is a console dry run
    let session = if config.sink.needs_session() {
        Some(Arc::new(
            dabridge_common::connect(&config.zenoh)
                .await
                .map_err(|e| anyhow::anyhow!("Failed to connect to Zenoh: {}", e))?,
        ))
    } else {
        None
    };

    // Build the sink
    let mut health_publisher: Option<ZenohPublisher> = None;
    let sink: Arc<dyn Sink> = match &config.sink {
        SinkConfig::Publish {
            key_prefix,
            serialization,
        } => {
            let session = session.clone().context("publish sink requires a session")?;
            let publisher = ZenohPublisher::new(session, key_prefix.clone(), *serialization);

            if let Err(e) = publisher.publish_status("running").await {
                warn!(error = %e, "Failed to publish bridge status");
            }

            health_publisher = Some(publisher.clone());
            Arc::new(publisher)
        }
        SinkConfig::Serve {
            key_prefix,
            readonly,
        } => {
            let session = session.clone().context("serve sink requires a session")?;
            let target = ServedTarget::serve(
                session,
                key_prefix,
                catalog.tags(),
                source.clone(),
                *readonly,
                health.clone(),
            )
            .await
            .context("Failed to start served target")?;
            Arc::new(target)
        }
        SinkConfig::Console {} => {
            info!("Dry-run mode: logging readings instead of publishing");
            Arc::new(ConsoleSink::new(&config.source.prog_id))
        }
    };

    // Start the scheduler
    let scheduler = PollScheduler::new(
        catalog,
        source.clone(),
        sink,
        health.clone(),
        config.scheduler_config(),
    );
    let shutdown = scheduler.shutdown_handle();
    let catalog_handle = scheduler.catalog_handle();
    let mut scheduler_task = tokio::spawn(scheduler.run());

    // Periodic discovery refresh, on its own timer
    if let Some(secs) = config.tags.refresh_secs {
        let source = source.clone();
        let spec = catalog_spec.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_secs(secs.max(1)));
            ticker.tick().await; // the startup resolution already happened
            loop {
                ticker.tick().await;
                match TagCatalog::resolve(&spec, source.as_ref()).await {
                    Ok(fresh) => {
                        debug!(tags = fresh.len(), "Discovery refresh");
                        catalog_handle.update(fresh);
                    }
                    Err(e) => warn!(error = %e, "Discovery refresh failed"),
                }
            }
        });
    }

    // Periodic health snapshots: published on the fabric for the publish
    // sink, logged otherwise
    {
        let health = health.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_secs(10));
            loop {
                ticker.tick().await;
                let snapshot = health.snapshot();
                match &health_publisher {
                    Some(publisher) => {
                        if let Err(e) = publisher.publish_health(&snapshot).await {
                            warn!(error = %e, "Failed to publish health snapshot");
                        }
                    }
                    None => debug!(
                        status = %snapshot.status,
                        reads_ok = snapshot.reads_ok,
                        reads_failed = snapshot.reads_failed,
                        "Health"
                    ),
                }
            }
        });
    }

    // Resource ceiling watcher
    let restart_requested = Arc::new(AtomicBool::new(false));
    if config.limits.max_memory_mb > 0 {
        let flag = restart_requested.clone();
        let shutdown = shutdown.clone();
        let ceiling = config.limits.max_memory_mb;
        info!(ceiling_mb = ceiling, "Memory ceiling watcher enabled");
        tokio::spawn(async move {
            if memory::watch_ceiling(ceiling, shutdown).await {
                flag.store(true, Ordering::SeqCst);
            }
        });
    }

    info!("Bridge running. Press Ctrl+C to stop.");

    // Run until the operator stops us or the scheduler drains on its own
    // (the memory watcher path ends there too).
    tokio::select! {
        res = &mut scheduler_task => {
            res.context("Scheduler task failed")?;
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received shutdown signal");
            shutdown.signal();
            scheduler_task.await.context("Scheduler task failed")?;
        }
    }

    // Idempotent teardown: the scheduler has already drained and closed
    // the sink; releasing the session is all that is left.
    if let Some(session) = session {
        session
            .close()
            .await
            .map_err(|e| anyhow::anyhow!("Failed to close Zenoh session: {}", e))?;
    }

    if restart_requested.load(Ordering::SeqCst) {
        info!("Bridge stopped, restart requested");
        Ok(StopReason::MemoryCeiling)
    } else {
        info!("Bridge stopped");
        Ok(StopReason::Signal)
    }
}
