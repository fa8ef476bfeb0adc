//! Filer reachability classification
//!
//! Outcomes are checked in a fixed order: a 2xx answer is reachable, then
//! authentication statuses, then name resolution, then deadlines. Everything
//! else is `Unknown`. Each failed check is counted per host and reason.

use netapp_client::{is_success, ClientError};
use netapp_common::config::Filer;
use netapp_common::ExporterMetrics;
use std::fmt;
use tracing::{debug, warn};

use crate::fetch::FilerApi;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureReason {
    Dns,
    Timeout,
    AuthFailure,
    Unknown,
}

impl FailureReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureReason::Dns => "dns",
            FailureReason::Timeout => "timeout",
            FailureReason::AuthFailure => "auth_failure",
            FailureReason::Unknown => "unknown",
        }
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FilerHealth {
    #[default]
    Unknown,
    Checking,
    Healthy,
    Unhealthy(FailureReason),
}

impl FilerHealth {
    pub fn is_healthy(&self) -> bool {
        matches!(self, FilerHealth::Healthy)
    }
}

fn is_auth_status(status: u16) -> bool {
    status == 401 || status == 403
}

/// Classify the outcome of a cluster probe
pub fn classify(outcome: &Result<u16, ClientError>) -> Result<(), FailureReason> {
    match outcome {
        Ok(status) if is_success(*status) => Ok(()),
        Ok(status) if is_auth_status(*status) => Err(FailureReason::AuthFailure),
        Ok(_) => Err(FailureReason::Unknown),
        Err(e) if e.status().is_some_and(is_auth_status) => Err(FailureReason::AuthFailure),
        Err(e) if e.is_dns() => Err(FailureReason::Dns),
        Err(e) if e.is_timeout() => Err(FailureReason::Timeout),
        Err(_) => Err(FailureReason::Unknown),
    }
}

/// Probes filers and records failures
#[derive(Clone)]
pub struct HealthClassifier {
    metrics: ExporterMetrics,
}

impl HealthClassifier {
    pub fn new(metrics: ExporterMetrics) -> Self {
        Self { metrics }
    }

    /// One probe, no internal retry
    pub async fn check(&self, filer: &Filer, api: &dyn FilerApi) -> FilerHealth {
        let outcome = api.check_cluster().await;
        match classify(&outcome) {
            Ok(()) => {
                debug!("Filer {} ({}) is reachable", filer.name, filer.host);
                FilerHealth::Healthy
            }
            Err(reason) => {
                self.record_failure(&filer.host, reason);
                match &outcome {
                    Ok(status) => warn!(
                        "Filer {} ({}) answered status {}: {}",
                        filer.name, filer.host, status, reason
                    ),
                    Err(e) => warn!("Filer {} ({}) unreachable: {}", filer.name, filer.host, e),
                }
                FilerHealth::Unhealthy(reason)
            }
        }
    }

    /// Count a failure that happened before a probe could be sent
    pub fn record_failure(&self, host: &str, reason: FailureReason) {
        self.metrics.record_health_failure(host, reason.as_str());
    }
}
