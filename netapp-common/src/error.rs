use thiserror::Error;

/// Main error type for the exporter's shared layer
#[derive(Error, Debug)]
pub enum ExporterError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid aggregate pattern {pattern:?} for filer {filer}: {source}")]
    InvalidPattern {
        filer: String,
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("Metrics error: {0}")]
    Metrics(#[from] prometheus::Error),

    #[error("Encoding error: {0}")]
    Encoding(#[from] std::string::FromUtf8Error),

    #[error("Filer {0} is already registered")]
    AlreadyRegistered(String),
}

pub type Result<T> = std::result::Result<T, ExporterError>;
