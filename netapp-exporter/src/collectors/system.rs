use netapp_common::config::Filer;
use netapp_common::types::{ResourceKind, SystemInfo};

use super::{RecordCollector, RecordMetric, ResourceReader};

pub const LABELS: &[&str] = &["full_version", "version"];

pub fn metrics() -> Vec<RecordMetric<SystemInfo>> {
    vec![RecordMetric {
        name: "netapp_filer_system_version",
        help: "Netapp System Metrics: release version, carried in labels",
        value: |_: &SystemInfo| 0.0,
    }]
}

fn label_values(s: &SystemInfo) -> Vec<String> {
    vec![s.full_version.clone(), s.version.clone()]
}

pub fn collector(filer: &Filer, reader: ResourceReader<SystemInfo>) -> RecordCollector<SystemInfo> {
    RecordCollector::new(
        filer,
        ResourceKind::System,
        reader,
        metrics(),
        LABELS,
        label_values,
    )
}
