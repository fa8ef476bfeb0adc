//! HTTP server for exposing Prometheus metrics

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{Html, IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde_json::json;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info};

use crate::error::Result;
use crate::metrics::MetricsRegistry;

const INDEX_HTML: &str = r#"<html>
<head><title>NetApp API Exporter</title></head>
<body>
    <h1>NetApp API Exporter</h1>
    <p>Available endpoints:</p>
    <ul>
        <li><a href="/metrics">/metrics</a> - Prometheus metrics</li>
        <li><a href="/health">/health</a> - Health check</li>
    </ul>
</body>
</html>
"#;

/// HTTP metrics server bound to a listening socket
pub struct MetricsServer {
    registry: Arc<MetricsRegistry>,
    listener: TcpListener,
}

impl MetricsServer {
    /// Bind the listening socket. Failing here is the exporter's only fatal error.
    pub async fn bind(registry: Arc<MetricsRegistry>, addr: SocketAddr) -> Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self { registry, listener })
    }

    /// Address actually bound, useful with port 0
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Serve requests until `shutdown` resolves
    pub async fn run<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = self.listener.local_addr()?;
        info!("Metrics server listening on http://{}", addr);

        axum::serve(self.listener, router(self.registry))
            .with_graceful_shutdown(shutdown)
            .await?;

        info!("Metrics server on {} stopped", addr);
        Ok(())
    }
}

/// Routes for `/metrics`, `/health` and the index page
pub fn router(registry: Arc<MetricsRegistry>) -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .route("/health", get(health_handler))
        .route("/", get(index_handler))
        .with_state(registry)
}

async fn metrics_handler(State(registry): State<Arc<MetricsRegistry>>) -> Response {
    match registry.export_metrics().await {
        Ok(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
            body,
        )
            .into_response(),
        Err(e) => {
            error!("Failed to export metrics: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, format!("Error: {}", e)).into_response()
        }
    }
}

async fn health_handler() -> impl IntoResponse {
    Json(json!({ "status": "healthy" }))
}

async fn index_handler() -> Html<&'static str> {
    Html(INDEX_HTML)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::ExporterMetrics;

    async fn spawn_server(registry: Arc<MetricsRegistry>) -> SocketAddr {
        let server = MetricsServer::bind(registry, "127.0.0.1:0".parse().unwrap())
            .await
            .unwrap();
        let addr = server.local_addr().unwrap();
        tokio::spawn(server.run(std::future::pending()));
        addr
    }

    async fn get(addr: SocketAddr, path: &str) -> String {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let mut stream = tokio::net::TcpStream::connect(addr).await.unwrap();
        let request = format!("GET {} HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n", path);
        stream.write_all(request.as_bytes()).await.unwrap();
        let mut response = String::new();
        stream.read_to_string(&mut response).await.unwrap();
        response
    }

    #[tokio::test]
    async fn test_endpoints() {
        let registry = Arc::new(MetricsRegistry::new());
        let metrics = ExporterMetrics::new(&registry).unwrap();
        metrics.registered_filers.set(3);
        let addr = spawn_server(registry).await;

        let response = get(addr, "/metrics").await;
        assert!(response.starts_with("HTTP/1.1 200"));
        assert!(response.contains("netapp_registered_filers 3"));

        let response = get(addr, "/health").await;
        assert!(response.contains(r#"{"status":"healthy"}"#));

        let response = get(addr, "/").await;
        assert!(response.contains("NetApp API Exporter"));

        let response = get(addr, "/missing").await;
        assert!(response.starts_with("HTTP/1.1 404"));
    }

    #[tokio::test]
    async fn test_bind_conflict_is_error() {
        let registry = Arc::new(MetricsRegistry::new());
        let first = MetricsServer::bind(registry.clone(), "127.0.0.1:0".parse().unwrap())
            .await
            .unwrap();
        let addr = first.local_addr().unwrap();
        assert!(MetricsServer::bind(registry, addr).await.is_err());
    }
}
