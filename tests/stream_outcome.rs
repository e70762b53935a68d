//! Stream outcome metrics over real connections. Lives in its own test
//! binary because it installs the process-wide metrics recorder.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::Router;
use metrics_exporter_prometheus::PrometheusHandle;
use videoflow::core::config::StreamingConfig;
use videoflow::core::types::ServiceRole;
use videoflow::delivery::router::{self, HealthState, StorageState};
use videoflow::observability::metrics as obs;
use videoflow::resolver::PassthroughResolver;
use videoflow::storage::memory::InMemoryVideoStore;

const KEY: &str = "SampleVideo_1280x720_1mb.mp4";

async fn spawn(app: Router) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

fn health(role: ServiceRole, handle: &PrometheusHandle) -> HealthState {
    HealthState {
        role,
        start_time: Instant::now(),
        metrics_handle: Some(handle.clone()),
    }
}

/// Value of `videoflow_stream_completed_total` for one service and outcome.
fn completed(rendered: &str, service: &str, outcome: &str) -> u64 {
    let service = format!("service=\"{}\"", service);
    let outcome = format!("outcome=\"{}\"", outcome);
    rendered
        .lines()
        .filter(|line| line.starts_with("videoflow_stream_completed_total{"))
        .filter(|line| line.contains(&service) && line.contains(&outcome))
        .filter_map(|line| line.rsplit(' ').next()?.parse::<f64>().ok())
        .map(|v| v as u64)
        .sum()
}

#[tokio::test]
async fn fully_delivered_bodies_count_as_complete() {
    let handle = obs::install_prometheus_recorder().unwrap();
    obs::describe_all_metrics();

    let store = Arc::new(InMemoryVideoStore::with_chunk_size(16 * 1024));
    let data: Vec<u8> = (0..200_000).map(|i| (i % 251) as u8).collect();
    store.put("videos", KEY, data.clone(), None).await;

    let storage_addr = spawn(router::build_storage_router(
        StorageState {
            store,
            bucket: "videos".to_string(),
            key_param: "path".to_string(),
        },
        health(ServiceRole::Storage, &handle),
    ))
    .await;

    let mut config = StreamingConfig::default();
    config.upstream_url = storage_addr.to_string();
    let state = router::streaming_state(Arc::new(PassthroughResolver), &config).unwrap();
    let streaming_addr = spawn(router::build_streaming_router(
        state,
        health(ServiceRole::Streaming, &handle),
    ))
    .await;

    for _ in 0..3 {
        let body = reqwest::get(format!("http://{}/video?path={}", storage_addr, KEY))
            .await
            .unwrap()
            .bytes()
            .await
            .unwrap();
        assert_eq!(body.len(), data.len());
    }
    let body = reqwest::get(format!("http://{}/video?id={}", streaming_addr, KEY))
        .await
        .unwrap()
        .bytes()
        .await
        .unwrap();
    assert_eq!(body.len(), data.len());

    // Bodies are dropped by the server tasks shortly after the last byte.
    // Three direct requests plus the one made by the streaming hop.
    let mut rendered = handle.render();
    for _ in 0..100 {
        if completed(&rendered, "storage", "complete") >= 4
            && completed(&rendered, "streaming", "complete") >= 1
        {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
        rendered = handle.render();
    }

    assert_eq!(completed(&rendered, "storage", "complete"), 4, "{}", rendered);
    assert_eq!(completed(&rendered, "streaming", "complete"), 1, "{}", rendered);
    assert_eq!(completed(&rendered, "storage", "aborted"), 0, "{}", rendered);
    assert_eq!(completed(&rendered, "streaming", "aborted"), 0, "{}", rendered);
}
