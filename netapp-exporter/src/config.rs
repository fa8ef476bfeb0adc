//! Exporter runtime settings

use netapp_common::types::{ResourceKind, DEFAULT_LISTEN_PORT};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use crate::discovery::DiscoverySchedule;

/// How a resource kind is read on scrape
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CachePolicy {
    /// Fetch inside every scrape
    Synchronous,
    /// Fetch on scrape when the cached snapshot is older than `max_age`
    OnDemand { max_age: Duration },
    /// Refresh on a timer; scrapes read whatever is cached
    Background { period: Duration },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResourcePolicies {
    pub aggregate: CachePolicy,
    pub volume: CachePolicy,
    pub system: CachePolicy,
}

impl ResourcePolicies {
    pub fn policy(&self, kind: ResourceKind) -> CachePolicy {
        match kind {
            ResourceKind::Aggregate => self.aggregate,
            ResourceKind::Volume => self.volume,
            ResourceKind::System => self.system,
        }
    }
}

impl Default for ResourcePolicies {
    fn default() -> Self {
        Self {
            aggregate: CachePolicy::Synchronous,
            volume: CachePolicy::Background {
                period: Duration::from_secs(120),
            },
            system: CachePolicy::Synchronous,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnabledKinds {
    pub aggregate: bool,
    pub volume: bool,
    pub system: bool,
}

impl EnabledKinds {
    pub fn is_enabled(&self, kind: ResourceKind) -> bool {
        match kind {
            ResourceKind::Aggregate => self.aggregate,
            ResourceKind::Volume => self.volume,
            ResourceKind::System => self.system,
        }
    }

    /// Enabled kinds in a stable order
    pub fn kinds(&self) -> Vec<ResourceKind> {
        [ResourceKind::Aggregate, ResourceKind::Volume, ResourceKind::System]
            .into_iter()
            .filter(|kind| self.is_enabled(*kind))
            .collect()
    }
}

impl Default for EnabledKinds {
    fn default() -> Self {
        Self {
            aggregate: true,
            volume: true,
            system: true,
        }
    }
}

/// What the discovery controller needs to build per-filer collectors
#[derive(Debug, Clone, Default)]
pub struct CollectorSettings {
    pub policies: ResourcePolicies,
    pub enabled: EnabledKinds,
}

#[derive(Debug, Clone)]
pub struct ExporterSettings {
    pub listen: SocketAddr,
    pub collectors: CollectorSettings,
    pub schedule: DiscoverySchedule,
    pub client_timeout: Duration,
}

impl Default for ExporterSettings {
    fn default() -> Self {
        Self {
            listen: SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), DEFAULT_LISTEN_PORT),
            collectors: CollectorSettings::default(),
            schedule: DiscoverySchedule::default(),
            client_timeout: netapp_client::config::DEFAULT_TIMEOUT,
        }
    }
}
