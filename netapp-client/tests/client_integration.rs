//! Client tests against a local mock of the management REST API

use axum::{
    extract::Query,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use netapp_client::{ClientConfig, ClientError, NetAppClient};
use serde_json::json;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpListener;

async fn spawn(app: Router) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

fn client_for(addr: SocketAddr) -> NetAppClient {
    NetAppClient::new(ClientConfig {
        base_url: format!("http://{}", addr),
        username: "monitor".to_string(),
        password: "secret".to_string(),
        timeout: Duration::from_secs(2),
        max_records: 2,
        ..Default::default()
    })
    .unwrap()
}

async fn cluster(headers: HeaderMap, Query(query): Query<HashMap<String, String>>) -> impl IntoResponse {
    if headers.get("authorization").is_none() {
        return (StatusCode::UNAUTHORIZED, Json(json!({}))).into_response();
    }
    if query.get("fields").map(String::as_str) == Some("version") {
        return Json(json!({
            "version": { "full": "NetApp Release 9.8P4: Mon Apr 12 08:23:31 UTC 2021" }
        }))
        .into_response();
    }
    Json(json!({ "name": "cluster-a" })).into_response()
}

async fn volumes(Query(query): Query<HashMap<String, String>>) -> Json<serde_json::Value> {
    match query.get("start").map(String::as_str) {
        None => Json(json!({
            "records": [
                { "name": "vol_a", "svm": { "name": "vs1" }, "state": "online",
                  "space": { "size": "100", "used": 40 } },
                { "name": "vol_orphan" }
            ],
            "_links": { "next": { "href": "/api/storage/volumes?start=2" } }
        })),
        Some(_) => Json(json!({
            "records": [
                { "name": "vol_b", "svm": { "name": "vs1" }, "state": "restricted",
                  "comment": "share_id: s-1, share_name: web, project: p-1" }
            ]
        })),
    }
}

async fn aggregates() -> Json<serde_json::Value> {
    Json(json!({
        "records": [
            { "name": "aggr_ssd_01", "node": { "name": "node-01" },
              "space": { "block_storage": { "size": 1000, "used": 250, "available": 750 } } }
        ]
    }))
}

fn api() -> Router {
    Router::new()
        .route("/api/cluster", get(cluster))
        .route("/api/storage/volumes", get(volumes))
        .route("/api/storage/aggregates", get(aggregates))
}

#[tokio::test]
async fn test_check_cluster_returns_status() {
    let addr = spawn(api()).await;
    assert_eq!(client_for(addr).check_cluster().await.unwrap(), 200);
}

#[tokio::test]
async fn test_check_cluster_auth_failure_is_status() {
    let app = Router::new().route(
        "/api/cluster",
        get(|| async { StatusCode::UNAUTHORIZED }),
    );
    let addr = spawn(app).await;
    assert_eq!(client_for(addr).check_cluster().await.unwrap(), 401);
}

#[tokio::test]
async fn test_list_volumes_follows_pagination() {
    let addr = spawn(api()).await;
    let volumes = client_for(addr).list_volumes().await.unwrap();

    let names: Vec<_> = volumes.iter().map(|v| v.volume.as_str()).collect();
    assert_eq!(names, vec!["vol_a", "vol_b"]);
    assert_eq!(volumes[0].size_total, 100.0);
    assert_eq!(volumes[0].size_used, 40.0);
    assert_eq!(volumes[1].share_name, "web");
    assert_eq!(volumes[1].project_id, "p-1");
}

#[tokio::test]
async fn test_list_aggregates() {
    let addr = spawn(api()).await;
    let aggregates = client_for(addr).list_aggregates().await.unwrap();
    assert_eq!(aggregates.len(), 1);
    assert_eq!(aggregates[0].owner_name, "node-01");
    assert_eq!(aggregates[0].size_available, 750.0);
}

#[tokio::test]
async fn test_system_version() {
    let addr = spawn(api()).await;
    let info = client_for(addr).system_version().await.unwrap();
    assert_eq!(info.version, "NetApp Release 9.8P4");
}

#[tokio::test]
async fn test_server_error_is_http_error() {
    let app = Router::new().route(
        "/api/storage/aggregates",
        get(|| async { StatusCode::SERVICE_UNAVAILABLE }),
    );
    let addr = spawn(app).await;
    let err = client_for(addr).list_aggregates().await.unwrap_err();
    assert_eq!(err, ClientError::Http { status: 503 });
}

#[tokio::test]
async fn test_slow_backend_times_out() {
    let app = Router::new().route(
        "/api/storage/volumes",
        get(|| async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Json(json!({ "records": [] }))
        }),
    );
    let addr = spawn(app).await;
    let client = NetAppClient::new(ClientConfig {
        base_url: format!("http://{}", addr),
        timeout: Duration::from_millis(200),
        ..Default::default()
    })
    .unwrap();
    assert!(client.list_volumes().await.unwrap_err().is_timeout());
}

#[tokio::test]
async fn test_unresolvable_host_is_dns_error() {
    let client = NetAppClient::new(ClientConfig {
        base_url: "https://filer.does-not-exist.invalid".to_string(),
        timeout: Duration::from_secs(5),
        ..Default::default()
    })
    .unwrap();
    assert!(client.check_cluster().await.unwrap_err().is_dns());
}
