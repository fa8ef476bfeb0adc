use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

/// Exporter version information
pub const EXPORTER_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default management API version applied when a filer entry leaves it unset
pub const DEFAULT_API_VERSION: &str = "1.7";

/// Default listen port, shared with the original exporter deployment
pub const DEFAULT_LISTEN_PORT: u16 = 9108;

/// Category of backend entity fetched and cached independently
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Aggregate,
    Volume,
    System,
}

impl ResourceKind {
    /// Label value used on exporter metrics
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Aggregate => "aggregate",
            ResourceKind::Volume => "volume",
            ResourceKind::System => "system",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Storage aggregate as reported by the filer
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Aggregate {
    pub name: String,
    pub owner_name: String,
    pub size_used: f64,
    pub size_total: f64,
    pub size_available: f64,
    pub total_reserved_space: f64,
    pub percent_used_capacity: f64,
    pub physical_used: f64,
    pub physical_used_percent: f64,
    pub is_encrypted: bool,
}

/// Volume state as exported in `netapp_volume_state`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[repr(u8)]
pub enum VolumeState {
    #[default]
    Unknown = 0,
    Online = 1,
    Restricted = 2,
    Offline = 3,
    Quiesced = 4,
}

impl VolumeState {
    pub fn from_api(state: &str) -> Self {
        match state {
            "online" => VolumeState::Online,
            "restricted" => VolumeState::Restricted,
            "offline" => VolumeState::Offline,
            "quiesced" => VolumeState::Quiesced,
            _ => VolumeState::Unknown,
        }
    }

    pub fn as_f64(&self) -> f64 {
        *self as u8 as f64
    }
}

/// Flexible volume with space, efficiency and share correlation attributes
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Volume {
    pub vserver: String,
    pub volume: String,
    pub volume_type: String,
    pub aggregate: String,
    pub comment: String,

    // Share correlation decoded from the volume comment
    pub project_id: String,
    pub share_id: String,
    pub share_name: String,
    pub share_type: String,

    pub state: VolumeState,
    pub size_total: f64,
    pub size_available: f64,
    pub size_used: f64,
    pub size_used_by_snapshots: f64,
    pub size_available_for_snapshots: f64,
    pub snapshot_reserve_size: f64,
    pub percentage_size_used: f64,
    pub percentage_snapshot_reserve: f64,
    pub percentage_compression_space_saved: f64,
    pub percentage_deduplication_space_saved: f64,
    pub percentage_total_space_saved: f64,
    pub inode_files_total: f64,
    pub inode_files_used: f64,
    pub logical_used: f64,
    pub is_encrypted: bool,
}

/// One-shot system/version information of a filer
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemInfo {
    pub full_version: String,
    pub version: String,
}

impl SystemInfo {
    /// Build from the release string, e.g. `NetApp Release 9.8P4: Mon Apr 12 2021`.
    /// The short version is everything before the first colon.
    pub fn from_full_version(full_version: impl Into<String>) -> Self {
        let full_version = full_version.into();
        let version = match full_version.find(':') {
            Some(idx) => full_version[..idx].to_string(),
            None => full_version.clone(),
        };
        Self { full_version, version }
    }
}

/// Parse a numeric attribute that the API may deliver as text.
/// Anything unparsable counts as zero.
pub fn parse_number(field: &str, raw: &str) -> f64 {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return 0.0;
    }
    match trimmed.parse::<f64>() {
        Ok(value) if value.is_finite() => value,
        Ok(_) | Err(_) => {
            debug!("Cannot parse {} value {:?}, defaulting to 0", field, raw);
            0.0
        }
    }
}

/// Parse a boolean attribute that may be encoded as text
pub fn parse_flag(raw: &str) -> bool {
    matches!(raw.trim().to_ascii_lowercase().as_str(), "true" | "1" | "yes")
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_system_version_split() {
        let info = SystemInfo::from_full_version("NetApp Release 9.8P4: Mon Apr 12 08:23:31 UTC 2021");
        assert_eq!(info.version, "NetApp Release 9.8P4");

        let info = SystemInfo::from_full_version("9.13.1");
        assert_eq!(info.version, "9.13.1");
        assert_eq!(info.full_version, "9.13.1");
    }

    #[test]
    fn test_parse_number_defaults() {
        assert_eq!(parse_number("size", "1024"), 1024.0);
        assert_eq!(parse_number("size", " 12.5 "), 12.5);
        assert_eq!(parse_number("size", ""), 0.0);
        assert_eq!(parse_number("size", "n/a"), 0.0);
        assert_eq!(parse_number("size", "NaN"), 0.0);
    }

    #[test]
    fn test_volume_state_mapping() {
        assert_eq!(VolumeState::from_api("online").as_f64(), 1.0);
        assert_eq!(VolumeState::from_api("quiesced").as_f64(), 4.0);
        assert_eq!(VolumeState::from_api("mixed"), VolumeState::Unknown);
    }

    proptest! {
        #[test]
        fn parse_number_never_yields_non_finite(raw in ".*") {
            let value = parse_number("prop", &raw);
            prop_assert!(value.is_finite());
        }

        #[test]
        fn parse_number_roundtrips_integers(n in 0u64..u64::MAX / 2) {
            prop_assert_eq!(parse_number("prop", &n.to_string()), n as f64);
        }
    }
}
