use anyhow::{Context, Result};
use clap::builder::FalseyValueParser;
use clap::Parser;
use netapp_common::config::{EnvSource, FileSource, FilerSource};
use netapp_common::{ExporterMetrics, MetricsRegistry, MetricsServer};
use netapp_exporter::{
    CachePolicy, CollectorSettings, DiscoveryController, DiscoverySchedule, EnabledKinds,
    ExporterSettings, NetAppConnector, ResourcePolicies,
};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about = "Prometheus exporter for NetApp filers", long_about = None)]
struct Args {
    /// Listen address for the metrics endpoint
    #[arg(short, long, default_value = "0.0.0.0:9108")]
    listen: SocketAddr,

    /// Filer list (YAML). Without it a single filer is read from NETAPP_* variables
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, env = "DEV", value_parser = FalseyValueParser::new())]
    debug: bool,

    /// Background refresh period for volumes, in seconds
    #[arg(long, default_value_t = 120)]
    volume_fetch_period: u64,

    /// Cache aggregates for this many seconds instead of fetching on every scrape
    #[arg(long)]
    aggregate_max_age: Option<u64>,

    /// Discovery interval before the first filer registers, in seconds
    #[arg(long, default_value_t = 10)]
    discovery_fast_interval: u64,

    /// Maximum number of fast discovery ticks
    #[arg(long, default_value_t = 10)]
    discovery_fast_attempts: u32,

    /// Discovery interval once a filer is registered, in seconds
    #[arg(long, default_value_t = 300)]
    discovery_interval: u64,

    /// Management API request timeout, in seconds
    #[arg(long, default_value_t = 30)]
    timeout: u64,

    #[arg(long)]
    disable_aggregate: bool,

    #[arg(long)]
    disable_volume: bool,

    #[arg(long)]
    disable_system: bool,
}

impl Args {
    fn settings(&self) -> ExporterSettings {
        let aggregate = match self.aggregate_max_age {
            Some(secs) => CachePolicy::OnDemand {
                max_age: Duration::from_secs(secs),
            },
            None => CachePolicy::Synchronous,
        };
        ExporterSettings {
            listen: self.listen,
            collectors: CollectorSettings {
                policies: ResourcePolicies {
                    aggregate,
                    volume: CachePolicy::Background {
                        period: Duration::from_secs(self.volume_fetch_period.max(1)),
                    },
                    system: CachePolicy::Synchronous,
                },
                enabled: EnabledKinds {
                    aggregate: !self.disable_aggregate,
                    volume: !self.disable_volume,
                    system: !self.disable_system,
                },
            },
            schedule: DiscoverySchedule {
                fast_interval: Duration::from_secs(self.discovery_fast_interval),
                fast_attempts: self.discovery_fast_attempts,
                slow_interval: Duration::from_secs(self.discovery_interval.max(1)),
            },
            client_timeout: Duration::from_secs(self.timeout),
        }
    }

    fn source(&self) -> Arc<dyn FilerSource> {
        match &self.config {
            Some(path) => Arc::new(FileSource::new(path.clone())),
            None => Arc::new(EnvSource),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let log_level = if args.debug { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(true)
        .with_line_number(true)
        .init();

    info!("Starting NetApp API exporter v{}", netapp_common::EXPORTER_VERSION);

    let settings = args.settings();
    let source = args.source();
    info!("Filers from: {}", source.describe());
    info!("Collectors: {:?}", settings.collectors);

    let registry = Arc::new(MetricsRegistry::new());
    registry.register_process_collector()?;
    let metrics = ExporterMetrics::new(&registry)?;

    // Failing to bind the listener is fatal, filer problems never are
    let server = MetricsServer::bind(Arc::clone(&registry), settings.listen)
        .await
        .with_context(|| format!("cannot listen on {}", settings.listen))?;

    let cancel = CancellationToken::new();
    let controller = Arc::new(DiscoveryController::new(
        source,
        Arc::new(NetAppConnector::new(settings.client_timeout)),
        Arc::clone(&registry),
        metrics,
        settings.collectors.clone(),
        settings.schedule,
        cancel.clone(),
    ));
    let discovery = Arc::clone(&controller).spawn();

    let shutdown = {
        let cancel = cancel.clone();
        async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Cannot listen for shutdown signal: {}", e);
                cancel.cancelled().await;
            }
            info!("Received shutdown signal");
            cancel.cancel();
        }
    };

    let served = server.run(shutdown).await;

    controller.shutdown().await;
    if let Err(e) = discovery.await {
        error!("Discovery task ended abnormally: {}", e);
    }

    match served {
        Ok(()) => {
            info!("NetApp API exporter shut down gracefully");
            Ok(())
        }
        Err(e) => {
            error!("Metrics server error: {}", e);
            Err(e.into())
        }
    }
}
