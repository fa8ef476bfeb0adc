use netapp_common::config::Filer;
use netapp_common::types::{ResourceKind, Volume};

use super::{flag, RecordCollector, RecordMetric, ResourceReader};

pub const LABELS: &[&str] = &[
    "vserver",
    "volume",
    "volume_type",
    "project_id",
    "share_id",
    "share_name",
    "share_type",
];

pub fn metrics() -> Vec<RecordMetric<Volume>> {
    vec![
        RecordMetric {
            name: "netapp_volume_state",
            help: "Netapp Volume Metrics: state (1=online, 2=restricted, 3=offline, 4=quiesced)",
            value: |v: &Volume| v.state.as_f64(),
        },
        RecordMetric {
            name: "netapp_volume_total_bytes",
            help: "Netapp Volume Metrics: total size",
            value: |v: &Volume| v.size_total,
        },
        RecordMetric {
            name: "netapp_volume_used_bytes",
            help: "Netapp Volume Metrics: used size",
            value: |v: &Volume| v.size_used,
        },
        RecordMetric {
            name: "netapp_volume_available_bytes",
            help: "Netapp Volume Metrics: available size",
            value: |v: &Volume| v.size_available,
        },
        RecordMetric {
            name: "netapp_volume_snapshot_used_bytes",
            help: "Netapp Volume Metrics: size used by snapshots",
            value: |v: &Volume| v.size_used_by_snapshots,
        },
        RecordMetric {
            name: "netapp_volume_snapshot_available_bytes",
            help: "Netapp Volume Metrics: size available for snapshots",
            value: |v: &Volume| v.size_available_for_snapshots,
        },
        RecordMetric {
            name: "netapp_volume_snapshot_reserved_bytes",
            help: "Netapp Volume Metrics: size reserved for snapshots",
            value: |v: &Volume| v.snapshot_reserve_size,
        },
        RecordMetric {
            name: "netapp_volume_used_percentage",
            help: "Netapp Volume Metrics: used percentage",
            value: |v: &Volume| v.percentage_size_used,
        },
        RecordMetric {
            name: "netapp_volume_saved_total_percentage",
            help: "Netapp Volume Metrics: percentage of space saved in total",
            value: |v: &Volume| v.percentage_total_space_saved,
        },
        RecordMetric {
            name: "netapp_volume_saved_compression_percentage",
            help: "Netapp Volume Metrics: percentage of space saved by compression",
            value: |v: &Volume| v.percentage_compression_space_saved,
        },
        RecordMetric {
            name: "netapp_volume_saved_deduplication_percentage",
            help: "Netapp Volume Metrics: percentage of space saved by deduplication",
            value: |v: &Volume| v.percentage_deduplication_space_saved,
        },
        RecordMetric {
            name: "netapp_volume_inode_files_total",
            help: "Netapp Volume Metrics: maximum number of files",
            value: |v: &Volume| v.inode_files_total,
        },
        RecordMetric {
            name: "netapp_volume_inode_files_used",
            help: "Netapp Volume Metrics: number of files in use",
            value: |v: &Volume| v.inode_files_used,
        },
        RecordMetric {
            name: "netapp_volume_logical_used_bytes",
            help: "Netapp Volume Metrics: logical used size",
            value: |v: &Volume| v.logical_used,
        },
        RecordMetric {
            name: "netapp_volume_is_encrypted",
            help: "Netapp Volume Metrics: encryption enabled",
            value: |v: &Volume| flag(v.is_encrypted),
        },
    ]
}

fn label_values(v: &Volume) -> Vec<String> {
    vec![
        v.vserver.clone(),
        v.volume.clone(),
        v.volume_type.clone(),
        v.project_id.clone(),
        v.share_id.clone(),
        v.share_name.clone(),
        v.share_type.clone(),
    ]
}

pub fn collector(filer: &Filer, reader: ResourceReader<Volume>) -> RecordCollector<Volume> {
    RecordCollector::new(
        filer,
        ResourceKind::Volume,
        reader,
        metrics(),
        LABELS,
        label_values,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use netapp_common::types::VolumeState;

    #[test]
    fn test_table_covers_labels() {
        assert_eq!(LABELS.len(), label_values(&Volume::default()).len());
        assert_eq!(metrics().len(), 15);
    }

    #[test]
    fn test_state_value() {
        let volume = Volume {
            state: VolumeState::Restricted,
            ..Default::default()
        };
        let state = metrics()
            .into_iter()
            .find(|m| m.name == "netapp_volume_state")
            .unwrap();
        assert_eq!((state.value)(&volume), 2.0);
    }
}
