//! NetApp API exporter core: per-filer polling caches with single-flight
//! fetches, background refresh with a staleness watchdog, filer health
//! classification and the discovery controller that wires it together.

pub mod cache;
pub mod collectors;
pub mod config;
pub mod discovery;
pub mod fetch;
pub mod health_checker;
pub mod scheduler;
pub mod scrape;
pub mod single_flight;

pub use cache::PollingCache;
pub use config::{CachePolicy, CollectorSettings, EnabledKinds, ExporterSettings, ResourcePolicies};
pub use discovery::{DiscoveryController, DiscoverySchedule, FilerConnector, NetAppConnector};
pub use fetch::{ApiFetcher, FilerApi, InstrumentedFetcher, ResourceFetcher};
pub use health_checker::{FailureReason, FilerHealth, HealthClassifier};
pub use scheduler::{BackgroundRefresher, Watchdog};
pub use scrape::SyncFetcher;
pub use single_flight::{FlightError, SingleFlight};
