//! Shared building blocks of the NetApp API exporter: records, filer
//! configuration, the error type and the metrics registry with its HTTP server.

pub mod types;
pub mod error;
pub mod config;
pub mod metrics;
pub mod metrics_server;

pub use types::*;
pub use error::{ExporterError, Result};
pub use config::{Credentials, EnvSource, FileSource, Filer, FilerConfig, FilerSource};
pub use metrics::{ExporterMetrics, MetricsRegistry, ScrapeCollector};
pub use metrics_server::MetricsServer;
