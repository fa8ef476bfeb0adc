//! Filer configuration loading
//!
//! Filers come either from a YAML file holding a top-level list of entries or
//! from `NETAPP_*` environment variables. Sources are re-read on every
//! discovery tick, so a [`FilerSource`] is cheap to call repeatedly.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, error, warn};

use crate::error::{ExporterError, Result};
use crate::types::DEFAULT_API_VERSION;

pub const ENV_NAME: &str = "NETAPP_NAME";
pub const ENV_HOST: &str = "NETAPP_HOST";
pub const ENV_USERNAME: &str = "NETAPP_USERNAME";
pub const ENV_PASSWORD: &str = "NETAPP_PASSWORD";
pub const ENV_AZ: &str = "NETAPP_AZ";
pub const ENV_API_VERSION: &str = "NETAPP_API_VERSION";

/// One entry of the filer YAML file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilerConfig {
    pub name: String,
    pub host: String,
    pub availability_zone: String,
    pub username: String,
    pub password: String,
    #[serde(alias = "api_version")]
    pub version: String,
    pub aggregate_pattern: Option<String>,
}

/// Credentials used when a filer entry leaves username or password empty
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    /// Read `NETAPP_USERNAME` / `NETAPP_PASSWORD`
    pub fn from_env() -> Self {
        Self {
            username: std::env::var(ENV_USERNAME).unwrap_or_default(),
            password: std::env::var(ENV_PASSWORD).unwrap_or_default(),
        }
    }
}

/// A fully resolved filer, immutable once registered
#[derive(Debug, Clone)]
pub struct Filer {
    pub name: String,
    pub host: String,
    pub availability_zone: String,
    pub username: String,
    pub password: String,
    pub api_version: String,
    pub aggregate_pattern: Option<Regex>,
}

impl Filer {
    /// Whether an aggregate name passes this filer's filter
    pub fn aggregate_matches(&self, aggregate: &str) -> bool {
        self.aggregate_pattern
            .as_ref()
            .map_or(true, |pattern| pattern.is_match(aggregate))
    }
}

impl PartialEq for Filer {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
            && self.host == other.host
            && self.availability_zone == other.availability_zone
            && self.username == other.username
            && self.password == other.password
            && self.api_version == other.api_version
            && self.aggregate_pattern.as_ref().map(Regex::as_str)
                == other.aggregate_pattern.as_ref().map(Regex::as_str)
    }
}

impl FilerConfig {
    /// Apply credential fallback and defaults, and compile the aggregate filter
    pub fn resolve(self, fallback: &Credentials) -> Result<Filer> {
        if self.name.trim().is_empty() {
            return Err(ExporterError::Config(format!(
                "filer entry for host {:?} has no name",
                self.host
            )));
        }
        if self.host.trim().is_empty() {
            return Err(ExporterError::Config(format!("filer {} has no host", self.name)));
        }

        // Both come from the environment when either is missing, as a pair
        let (username, password) = if self.username.is_empty() || self.password.is_empty() {
            debug!("Filer {} uses credentials from the environment", self.name);
            (fallback.username.clone(), fallback.password.clone())
        } else {
            (self.username, self.password)
        };

        let api_version = if self.version.trim().is_empty() {
            DEFAULT_API_VERSION.to_string()
        } else {
            self.version
        };

        let aggregate_pattern = match self.aggregate_pattern.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(pattern) => Some(Regex::new(pattern).map_err(|source| {
                ExporterError::InvalidPattern {
                    filer: self.name.clone(),
                    pattern: pattern.to_string(),
                    source,
                }
            })?),
        };

        Ok(Filer {
            name: self.name,
            host: self.host,
            availability_zone: self.availability_zone,
            username,
            password,
            api_version,
            aggregate_pattern,
        })
    }
}

/// Parse the YAML filer list. Entries that fail to resolve are logged and
/// skipped so the remaining filers still load.
pub fn parse_filers(yaml: &str, fallback: &Credentials) -> Result<Vec<Filer>> {
    let entries: Vec<FilerConfig> = serde_yaml::from_str(yaml)?;
    let mut filers = Vec::with_capacity(entries.len());
    for entry in entries {
        match entry.resolve(fallback) {
            Ok(filer) => {
                if filers.iter().any(|f: &Filer| f.name == filer.name) {
                    warn!("Duplicate filer name {} in configuration, keeping the first", filer.name);
                    continue;
                }
                filers.push(filer);
            }
            Err(e) => error!("Skipping filer entry: {}", e),
        }
    }
    Ok(filers)
}

/// Load filers from a YAML file
pub fn load_filers_from_file(path: &Path, fallback: &Credentials) -> Result<Vec<Filer>> {
    let content = std::fs::read_to_string(path)?;
    parse_filers(&content, fallback)
}

/// Build a single filer from `NETAPP_*` environment variables.
/// Returns `None` when `NETAPP_HOST` is unset.
pub fn load_filer_from_env() -> Result<Option<Filer>> {
    let host = std::env::var(ENV_HOST).unwrap_or_default();
    if host.is_empty() {
        return Ok(None);
    }
    let config = FilerConfig {
        name: std::env::var(ENV_NAME).unwrap_or_else(|_| host.clone()),
        host,
        availability_zone: std::env::var(ENV_AZ).unwrap_or_default(),
        username: String::new(),
        password: String::new(),
        version: std::env::var(ENV_API_VERSION).unwrap_or_default(),
        aggregate_pattern: None,
    };
    config.resolve(&Credentials::from_env()).map(Some)
}

/// Where the discovery controller reads its filer list from
pub trait FilerSource: Send + Sync {
    fn load(&self) -> Result<Vec<Filer>>;

    fn describe(&self) -> String;
}

/// YAML file source, re-read on every call
#[derive(Debug, Clone)]
pub struct FileSource {
    path: PathBuf,
}

impl FileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl FilerSource for FileSource {
    fn load(&self) -> Result<Vec<Filer>> {
        load_filers_from_file(&self.path, &Credentials::from_env())
    }

    fn describe(&self) -> String {
        format!("file {}", self.path.display())
    }
}

/// Single filer defined by environment variables
#[derive(Debug, Clone, Default)]
pub struct EnvSource;

impl FilerSource for EnvSource {
    fn load(&self) -> Result<Vec<Filer>> {
        Ok(load_filer_from_env()?.into_iter().collect())
    }

    fn describe(&self) -> String {
        "environment".to_string()
    }
}
