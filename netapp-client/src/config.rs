use netapp_common::Filer;
use std::time::Duration;

/// Default request timeout, matching the exporter's health probe deadline
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Page size requested from collection endpoints
pub const DEFAULT_MAX_RECORDS: usize = 100;

#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL of the management interface, e.g. `https://filer.example.com`
    pub base_url: String,

    pub username: String,
    pub password: String,

    /// Management API version advertised in the user agent
    pub api_version: String,

    /// Whole-request timeout
    pub timeout: Duration,

    /// Filers commonly run with self-signed certificates
    pub accept_invalid_certs: bool,

    /// Records per page on collection endpoints
    pub max_records: usize,
}

impl ClientConfig {
    /// Build a client configuration for a resolved filer
    pub fn for_filer(filer: &Filer) -> Self {
        Self {
            base_url: base_url_for_host(&filer.host),
            username: filer.username.clone(),
            password: filer.password.clone(),
            api_version: filer.api_version.clone(),
            ..Default::default()
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            username: String::new(),
            password: String::new(),
            api_version: netapp_common::DEFAULT_API_VERSION.to_string(),
            timeout: DEFAULT_TIMEOUT,
            accept_invalid_certs: true,
            max_records: DEFAULT_MAX_RECORDS,
        }
    }
}

/// Hosts without a scheme are reached over HTTPS
pub fn base_url_for_host(host: &str) -> String {
    let host = host.trim().trim_end_matches('/');
    if host.starts_with("http://") || host.starts_with("https://") {
        host.to_string()
    } else {
        format!("https://{}", host)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_for_host() {
        assert_eq!(base_url_for_host("filer.example.com"), "https://filer.example.com");
        assert_eq!(base_url_for_host("http://127.0.0.1:8080/"), "http://127.0.0.1:8080");
    }

    #[test]
    fn test_defaults() {
        let config = ClientConfig::default();
        assert_eq!(config.timeout, Duration::from_secs(30));
        assert!(config.accept_invalid_certs);
        assert_eq!(config.api_version, "1.7");
    }
}
