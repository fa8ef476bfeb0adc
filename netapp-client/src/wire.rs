//! Wire shapes of the management REST API and their conversion into records
//!
//! Numeric attributes are kept as raw JSON values until record construction:
//! depending on the release they arrive as numbers or as strings.

use netapp_common::types::{parse_flag, parse_number, Aggregate, SystemInfo, Volume, VolumeState};
use regex::Regex;
use serde::Deserialize;
use serde_json::Value;
use std::sync::OnceLock;
use tracing::{debug, warn};

/// Fields requested from `/api/storage/aggregates`
pub const AGGREGATE_FIELDS: &str = "name,node.name,space,data_encryption";

/// Fields requested from `/api/storage/volumes`
pub const VOLUME_FIELDS: &str = "name,svm.name,type,state,comment,aggregates.name,space,files,efficiency,encryption.enabled";

#[derive(Debug, Default, Deserialize)]
pub struct Collection<T> {
    #[serde(default = "Vec::new")]
    pub records: Vec<T>,
    #[serde(default, rename = "_links")]
    pub links: Option<Links>,
}

#[derive(Debug, Default, Deserialize)]
pub struct Links {
    pub next: Option<Href>,
}

#[derive(Debug, Default, Deserialize)]
pub struct Href {
    pub href: String,
}

impl<T> Collection<T> {
    pub fn next_href(&self) -> Option<&str> {
        self.links
            .as_ref()
            .and_then(|l| l.next.as_ref())
            .map(|n| n.href.as_str())
            .filter(|href| !href.is_empty())
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct NamedRef {
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct AggregateRecord {
    pub name: Option<String>,
    pub node: Option<NamedRef>,
    pub space: AggregateSpace,
    pub data_encryption: AggregateEncryption,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct AggregateSpace {
    pub block_storage: BlockStorage,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct BlockStorage {
    pub size: Option<Value>,
    pub available: Option<Value>,
    pub used: Option<Value>,
    pub full_threshold_percent: Option<Value>,
    pub physical_used: Option<Value>,
    pub physical_used_percent: Option<Value>,
    pub used_percent: Option<Value>,
    pub reserved: Option<Value>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct AggregateEncryption {
    pub software_encryption_enabled: Option<Value>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct VolumeRecord {
    pub name: Option<String>,
    pub svm: Option<NamedRef>,
    #[serde(rename = "type")]
    pub volume_type: Option<String>,
    pub state: Option<String>,
    pub comment: Option<String>,
    pub aggregates: Vec<NamedRef>,
    pub space: VolumeSpace,
    pub files: VolumeFiles,
    pub efficiency: VolumeEfficiency,
    pub encryption: VolumeEncryption,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct VolumeSpace {
    pub size: Option<Value>,
    pub available: Option<Value>,
    pub used: Option<Value>,
    pub percent_used: Option<Value>,
    pub snapshot: VolumeSnapshotSpace,
    pub logical_space: LogicalSpace,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct VolumeSnapshotSpace {
    pub used: Option<Value>,
    pub reserve_size: Option<Value>,
    pub reserve_available: Option<Value>,
    pub reserve_percent: Option<Value>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct LogicalSpace {
    pub used: Option<Value>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct VolumeFiles {
    pub maximum: Option<Value>,
    pub used: Option<Value>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct VolumeEfficiency {
    pub compression_space_saved_percent: Option<Value>,
    pub dedupe_space_saved_percent: Option<Value>,
    pub total_space_saved_percent: Option<Value>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct VolumeEncryption {
    pub enabled: Option<Value>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ClusterRecord {
    pub name: Option<String>,
    pub version: ClusterVersion,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ClusterVersion {
    pub full: Option<String>,
}

/// Numeric attribute to `f64`, missing or unparsable values become 0
pub fn number(field: &str, value: &Option<Value>) -> f64 {
    match value {
        None | Some(Value::Null) => 0.0,
        Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0),
        Some(Value::String(s)) => parse_number(field, s),
        Some(other) => {
            debug!("Unexpected {} value {}, defaulting to 0", field, other);
            0.0
        }
    }
}

fn flag(value: &Option<Value>) -> bool {
    match value {
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => parse_flag(s),
        Some(Value::Number(n)) => n.as_f64().map_or(false, |v| v != 0.0),
        _ => false,
    }
}

impl AggregateRecord {
    /// Convert into a record; aggregates without a name are dropped
    pub fn into_aggregate(self) -> Option<Aggregate> {
        let Some(name) = self.name.filter(|n| !n.is_empty()) else {
            warn!("Skipping aggregate record without name");
            return None;
        };
        let storage = &self.space.block_storage;
        Some(Aggregate {
            owner_name: self.node.and_then(|n| n.name).unwrap_or_default(),
            size_used: number("size_used", &storage.used),
            size_total: number("size_total", &storage.size),
            size_available: number("size_available", &storage.available),
            total_reserved_space: number("total_reserved_space", &storage.reserved),
            percent_used_capacity: number("percent_used_capacity", &storage.used_percent),
            physical_used: number("physical_used", &storage.physical_used),
            physical_used_percent: number("physical_used_percent", &storage.physical_used_percent),
            is_encrypted: flag(&self.data_encryption.software_encryption_enabled),
            name,
        })
    }
}

impl VolumeRecord {
    /// Convert into a record; volumes without name or SVM are dropped
    pub fn into_volume(self) -> Option<Volume> {
        let name = self.name.filter(|n| !n.is_empty());
        let vserver = self.svm.and_then(|s| s.name).filter(|n| !n.is_empty());
        let (Some(volume), Some(vserver)) = (name, vserver) else {
            warn!("Skipping volume record without name or svm");
            return None;
        };

        let comment = self.comment.unwrap_or_default();
        let share = parse_volume_comment(&comment);
        let space = &self.space;
        Some(Volume {
            volume_type: self.volume_type.unwrap_or_default(),
            aggregate: self
                .aggregates
                .into_iter()
                .find_map(|a| a.name)
                .unwrap_or_default(),
            project_id: share.project_id,
            share_id: share.share_id,
            share_name: share.share_name,
            share_type: share.share_type,
            state: VolumeState::from_api(self.state.as_deref().unwrap_or_default()),
            size_total: number("size_total", &space.size),
            size_available: number("size_available", &space.available),
            size_used: number("size_used", &space.used),
            size_used_by_snapshots: number("size_used_by_snapshots", &space.snapshot.used),
            size_available_for_snapshots: number(
                "size_available_for_snapshots",
                &space.snapshot.reserve_available,
            ),
            snapshot_reserve_size: number("snapshot_reserve_size", &space.snapshot.reserve_size),
            percentage_size_used: number("percentage_size_used", &space.percent_used),
            percentage_snapshot_reserve: number(
                "percentage_snapshot_reserve",
                &space.snapshot.reserve_percent,
            ),
            percentage_compression_space_saved: number(
                "percentage_compression_space_saved",
                &self.efficiency.compression_space_saved_percent,
            ),
            percentage_deduplication_space_saved: number(
                "percentage_deduplication_space_saved",
                &self.efficiency.dedupe_space_saved_percent,
            ),
            percentage_total_space_saved: number(
                "percentage_total_space_saved",
                &self.efficiency.total_space_saved_percent,
            ),
            inode_files_total: number("inode_files_total", &self.files.maximum),
            inode_files_used: number("inode_files_used", &self.files.used),
            logical_used: number("logical_used", &space.logical_space.used),
            is_encrypted: flag(&self.encryption.enabled),
            comment,
            volume,
            vserver,
        })
    }
}

impl ClusterRecord {
    pub fn into_system_info(self) -> SystemInfo {
        SystemInfo::from_full_version(self.version.full.unwrap_or_default())
    }
}

/// Share correlation fields carried in a volume comment
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShareComment {
    pub share_id: String,
    pub share_name: String,
    pub share_type: String,
    pub project_id: String,
}

fn comment_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    // Literal pattern, compiling it cannot fail
    PATTERN.get_or_init(|| Regex::new(r"(\w+): ([\w-]+)").expect("valid comment pattern"))
}

/// Decode `key: value` pairs such as
/// `share_id: 1a2b, share_name: data, project: 0f9e`.
/// Without both `share_id` and `project` all fields stay empty.
pub fn parse_volume_comment(comment: &str) -> ShareComment {
    let mut share = ShareComment::default();
    if comment.is_empty() {
        return share;
    }
    for caps in comment_pattern().captures_iter(comment) {
        let value = caps[2].to_string();
        match &caps[1] {
            "share_id" => share.share_id = value,
            "share_name" => share.share_name = value,
            "share_type" => share.share_type = value,
            "project" => share.project_id = value,
            _ => {}
        }
    }
    if share.share_id.is_empty() || share.project_id.is_empty() {
        warn!("Failed to parse share_id/project from volume comment {:?}", comment);
        return ShareComment::default();
    }
    share
}
