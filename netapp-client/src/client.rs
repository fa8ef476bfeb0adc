//! Management REST API client for a single filer

use netapp_common::types::{Aggregate, SystemInfo, Volume};
use reqwest::{header, Client, StatusCode, Url};
use serde::de::DeserializeOwned;
use std::collections::HashSet;
use tracing::{debug, info};

use crate::config::ClientConfig;
use crate::error::{ClientError, Result};
use crate::wire::{
    AggregateRecord, ClusterRecord, Collection, VolumeRecord, AGGREGATE_FIELDS, VOLUME_FIELDS,
};

/// Upper bound on followed `next` links per listing
const MAX_PAGES: usize = 10_000;

#[derive(Debug, Clone)]
pub struct NetAppClient {
    http: Client,
    base_url: Url,
    host: String,
    config: ClientConfig,
}

impl NetAppClient {
    /// Create a new client; no request is made until an operation is called
    pub fn new(config: ClientConfig) -> Result<Self> {
        let base_url = Url::parse(&config.base_url)
            .map_err(|e| ClientError::InvalidUrl(format!("{}: {}", config.base_url, e)))?;
        let host = base_url
            .host_str()
            .ok_or_else(|| ClientError::InvalidUrl(format!("{}: missing host", config.base_url)))?
            .to_string();

        let user_agent = format!(
            "netapp-api-exporter/{} (api {})",
            netapp_common::EXPORTER_VERSION,
            config.api_version
        );
        let http = Client::builder()
            .timeout(config.timeout)
            .danger_accept_invalid_certs(config.accept_invalid_certs)
            .user_agent(user_agent)
            .build()
            .map_err(|e| ClientError::Transport(e.to_string()))?;

        Ok(Self {
            http,
            base_url,
            host,
            config,
        })
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Resolve the host and call `/api/cluster`, returning the HTTP status.
    /// Non-2xx answers are not errors here; callers classify them.
    pub async fn check_cluster(&self) -> Result<u16> {
        self.resolve_host().await?;
        let url = self.url("/api/cluster")?;
        let response = self
            .authorized(self.http.get(url))
            .send()
            .await
            .map_err(|e| ClientError::from_reqwest(&self.host, e))?;
        let status = response.status().as_u16();
        debug!("Cluster check on {} answered {}", self.host, status);
        Ok(status)
    }

    /// All aggregates, following pagination
    pub async fn list_aggregates(&self) -> Result<Vec<Aggregate>> {
        let records: Vec<AggregateRecord> = self
            .list_all("/api/storage/aggregates", AGGREGATE_FIELDS)
            .await?;
        let aggregates: Vec<Aggregate> = records
            .into_iter()
            .filter_map(AggregateRecord::into_aggregate)
            .collect();
        info!("{}: fetched {} aggregates", self.host, aggregates.len());
        Ok(aggregates)
    }

    /// All volumes, following pagination
    pub async fn list_volumes(&self) -> Result<Vec<Volume>> {
        let records: Vec<VolumeRecord> = self
            .list_all("/api/storage/volumes", VOLUME_FIELDS)
            .await?;
        let volumes: Vec<Volume> = records
            .into_iter()
            .filter_map(VolumeRecord::into_volume)
            .collect();
        info!("{}: fetched {} volumes", self.host, volumes.len());
        Ok(volumes)
    }

    /// Release string and short version of the cluster
    pub async fn system_version(&self) -> Result<SystemInfo> {
        let mut url = self.url("/api/cluster")?;
        url.query_pairs_mut().append_pair("fields", "version");
        let cluster: ClusterRecord = self.get_json(url).await?;
        let info = cluster.into_system_info();
        debug!("{}: system version {:?}", self.host, info.version);
        Ok(info)
    }

    async fn list_all<T: DeserializeOwned>(&self, path: &str, fields: &str) -> Result<Vec<T>> {
        let mut url = self.url(path)?;
        url.query_pairs_mut()
            .append_pair("fields", fields)
            .append_pair("max_records", &self.config.max_records.to_string());

        let mut records = Vec::new();
        let mut seen = HashSet::new();
        for _ in 0..MAX_PAGES {
            seen.insert(url.to_string());
            let page: Collection<T> = self.get_json(url.clone()).await?;
            let next = page.next_href().map(str::to_string);
            records.extend(page.records);

            match next {
                Some(href) => {
                    let next_url = self.base_url.join(&href).map_err(|e| {
                        ClientError::InvalidUrl(format!("{}: {}", href, e))
                    })?;
                    if seen.contains(next_url.as_str()) {
                        return Err(ClientError::Decode(format!(
                            "pagination loop at {}",
                            next_url
                        )));
                    }
                    url = next_url;
                }
                None => return Ok(records),
            }
        }
        Err(ClientError::Decode(format!(
            "{} exceeded {} pages",
            path, MAX_PAGES
        )))
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<T> {
        let response = self
            .authorized(self.http.get(url))
            .header(header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| ClientError::from_reqwest(&self.host, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ClientError::Http {
                status: status.as_u16(),
            });
        }
        let body = response
            .bytes()
            .await
            .map_err(|e| ClientError::from_reqwest(&self.host, e))?;
        serde_json::from_slice(&body).map_err(|e| ClientError::Decode(e.to_string()))
    }

    fn authorized(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        request.basic_auth(&self.config.username, Some(&self.config.password))
    }

    fn url(&self, path: &str) -> Result<Url> {
        self.base_url
            .join(path)
            .map_err(|e| ClientError::InvalidUrl(format!("{}: {}", path, e)))
    }

    /// Name resolution ahead of the request so it fails as a typed DNS error
    async fn resolve_host(&self) -> Result<()> {
        let port = self.base_url.port_or_known_default().unwrap_or(443);
        let lookup = tokio::net::lookup_host((self.host.as_str(), port));
        match tokio::time::timeout(self.config.timeout, lookup).await {
            Ok(Ok(mut addrs)) => {
                if addrs.next().is_none() {
                    return Err(ClientError::Dns {
                        host: self.host.clone(),
                        message: "no addresses".to_string(),
                    });
                }
                Ok(())
            }
            Ok(Err(e)) => Err(ClientError::Dns {
                host: self.host.clone(),
                message: e.to_string(),
            }),
            Err(_) => Err(ClientError::Timeout(self.host.clone())),
        }
    }
}

/// Whether a status answers the cluster check successfully
pub fn is_success(status: u16) -> bool {
    StatusCode::from_u16(status).map_or(false, |s| s.is_success())
}
