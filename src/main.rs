use std::net::SocketAddr;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Context;
use axum::Router;
use tracing::{error, info, warn};

use videoflow::core::config::{AppConfig, ResolverKind, StorageBackend};
use videoflow::core::redact::{redact_access_key, Redacted};
use videoflow::core::shutdown::{ShutdownCoordinator, HTTP_DRAIN_TIMEOUT_SECS};
use videoflow::core::types::ServiceRole;
use videoflow::delivery::router::{self, HealthState, StorageState};
use videoflow::observability::metrics as obs_metrics;
use videoflow::resolver::{MetadataResolver, PassthroughResolver};
use videoflow::storage::memory::InMemoryVideoStore;
use videoflow::storage::VideoStore;

#[tokio::main]
async fn main() -> ExitCode {
    // Install panic hook: log panics with full backtrace and increment counter.
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        obs_metrics::inc_panic_total();
        let backtrace = std::backtrace::Backtrace::force_capture();
        eprintln!("PANIC: {info}\nBacktrace:\n{backtrace}");
        default_hook(info);
    }));

    // Load configuration (layered: defaults → TOML → VIDEOFLOW_* env vars)
    let config = match AppConfig::load() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("failed to load configuration: {e}");
            return ExitCode::FAILURE;
        }
    };

    init_tracing(
        &config.observability.log_level,
        &config.observability.log_format,
    );

    // Must be installed before any metrics are recorded.
    let metrics_handle = if config.observability.metrics_enabled {
        match obs_metrics::install_prometheus_recorder() {
            Ok(handle) => Some(handle),
            Err(e) => {
                warn!(error = %e, "failed to install metrics recorder, /metrics disabled");
                None
            }
        }
    } else {
        None
    };
    obs_metrics::describe_all_metrics();

    info!(
        version = env!("CARGO_PKG_VERSION"),
        role = %config.server.role,
        "videoflow starting"
    );

    let start_time = Instant::now();
    let shutdown = ShutdownCoordinator::new();
    let health = HealthState {
        role: config.server.role,
        start_time,
        metrics_handle,
    };

    // Start uptime gauge task
    let uptime_cancel = shutdown.token();
    tokio::spawn(async move {
        obs_metrics::run_uptime_task(start_time, uptime_cancel).await;
    });

    let app = match config.server.role {
        ServiceRole::Storage => build_storage_app(&config, health).await,
        ServiceRole::Streaming => build_streaming_app(&config, health).await,
    };
    let app = match app {
        Ok(app) => app,
        Err(e) => {
            error!(error = %format!("{e:#}"), "failed to initialise service");
            return ExitCode::FAILURE;
        }
    };

    match serve(&config, app, &shutdown).await {
        Ok(true) => {
            info!("graceful shutdown completed");
            ExitCode::SUCCESS
        }
        Ok(false) => {
            error!(
                "HTTP drain timed out after {}s, forcing exit",
                HTTP_DRAIN_TIMEOUT_SECS
            );
            ExitCode::FAILURE
        }
        Err(e) => {
            error!(error = %format!("{e:#}"), "HTTP server failed");
            ExitCode::FAILURE
        }
    }
}

// ---------------------------------------------------------------------------
// Service assembly
// ---------------------------------------------------------------------------

async fn build_storage_app(config: &AppConfig, health: HealthState) -> anyhow::Result<Router> {
    let storage = &config.storage;
    info!(
        backend = ?storage.backend,
        endpoint = %storage.endpoint,
        bucket = %storage.bucket,
        region = %storage.region,
        access_key_id = %redact_access_key(&storage.access_key_id),
        secret_access_key = %Redacted::new(&storage.secret_access_key),
        "object store configured"
    );

    match storage.backend {
        #[cfg(feature = "s3")]
        StorageBackend::S3 => {
            let store = videoflow::storage::s3::S3VideoStore::new(storage);
            Ok(storage_router(store, config, health))
        }
        #[cfg(not(feature = "s3"))]
        StorageBackend::S3 => anyhow::bail!("built without the s3 feature"),
        StorageBackend::Memory => {
            warn!("using the in-memory object store, every key will be missing");
            Ok(storage_router(InMemoryVideoStore::new(), config, health))
        }
    }
}

fn storage_router<S: VideoStore>(store: S, config: &AppConfig, health: HealthState) -> Router {
    let state = StorageState {
        store: Arc::new(store),
        bucket: config.storage.bucket.clone(),
        key_param: config.storage.key_param.clone(),
    };
    router::build_storage_router(state, health)
}

async fn build_streaming_app(config: &AppConfig, health: HealthState) -> anyhow::Result<Router> {
    info!(
        upstream = %config.streaming.upstream_base_url(),
        resolver = ?config.streaming.resolver,
        "storage service configured"
    );

    match config.streaming.resolver {
        ResolverKind::Passthrough => streaming_router(PassthroughResolver, config, health),
        #[cfg(feature = "mongo")]
        ResolverKind::Mongo => {
            let metadata = &config.metadata;
            info!(
                uri = %videoflow::core::redact::redact_connection_string(&metadata.uri),
                database = %metadata.database,
                collection = %metadata.collection,
                "metadata store configured"
            );
            let resolver = videoflow::resolver::mongo::MongoResolver::connect(metadata)
                .await
                .context("connecting to metadata store")?;
            // Startup proceeds without the metadata store; lookups fail with
            // 500 until it is reachable.
            if let Err(e) = resolver.ping().await {
                warn!(error = %e, "metadata store not reachable at startup");
            }
            streaming_router(resolver, config, health)
        }
        #[cfg(not(feature = "mongo"))]
        ResolverKind::Mongo => anyhow::bail!("built without the mongo feature"),
    }
}

fn streaming_router<R: MetadataResolver>(
    resolver: R,
    config: &AppConfig,
    health: HealthState,
) -> anyhow::Result<Router> {
    let state = router::streaming_state(Arc::new(resolver), &config.streaming)
        .context("building storage service client")?;
    Ok(router::build_streaming_router(state, health))
}

// ---------------------------------------------------------------------------
// HTTP server lifecycle
// ---------------------------------------------------------------------------

/// Serve until a shutdown signal, then drain in-flight requests.
///
/// Returns `Ok(false)` if the drain did not finish within
/// `HTTP_DRAIN_TIMEOUT_SECS`.
async fn serve(config: &AppConfig, app: Router, shutdown: &ShutdownCoordinator) -> anyhow::Result<bool> {
    let http_addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .with_context(|| {
            format!(
                "invalid HTTP bind address {}:{}",
                config.server.host, config.server.port
            )
        })?;

    let listener = tokio::net::TcpListener::bind(http_addr)
        .await
        .with_context(|| format!("failed to bind {}", http_addr))?;

    info!(%http_addr, role = %config.server.role, "HTTP server listening");

    let shutdown_token = shutdown.token();
    let mut server = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                shutdown_token.cancelled().await;
            })
            .await
    });

    tokio::select! {
        _ = shutdown.wait_for_signal_and_shutdown() => {}
        result = &mut server => {
            // Server exited on its own, which only happens on error.
            shutdown.trigger_shutdown();
            result.context("HTTP server task panicked")?.context("HTTP server error")?;
            return Ok(true);
        }
    }

    obs_metrics::set_shutdown_in_progress(true);
    info!(
        "draining in-flight requests ({}s timeout)",
        HTTP_DRAIN_TIMEOUT_SECS
    );

    match tokio::time::timeout(Duration::from_secs(HTTP_DRAIN_TIMEOUT_SECS), server).await {
        Ok(joined) => {
            joined.context("HTTP server task panicked")?.context("HTTP server error")?;
            Ok(true)
        }
        Err(_) => Ok(false),
    }
}

fn init_tracing(log_level: &str, log_format: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    match log_format {
        "json" => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .json()
                .init();
        }
        _ => {
            tracing_subscriber::fmt().with_env_filter(filter).init();
        }
    }
}
