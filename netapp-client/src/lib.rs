//! Client for the ONTAP management REST API, turning its JSON into
//! exporter records.

pub mod client;
pub mod config;
pub mod error;
pub mod wire;

pub use client::{is_success, NetAppClient};
pub use config::ClientConfig;
pub use error::{ClientError, Result};
