use axum::{
    Router,
    http::{HeaderValue, Method, header::CONTENT_TYPE},
    routing::{get, post},
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing::{info, warn};

pub mod cache;
pub mod config;
pub mod duplicate;
pub mod error;
pub mod fingerprint;
pub mod handlers;
pub mod metrics;
pub mod models;
pub mod network;
pub mod rate_limit;
pub mod state;
pub mod store;
pub mod validation;

use config::Args;
use handlers::{
    breakdown_handler, count_handler, get_response_handler, health_handler,
    list_responses_handler, metrics_handler, progress_handler, search_responses_handler,
    submit_handler,
};
use state::AppState;
use store::{SqliteStore, SubmissionStore};

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .route("/submit", post(submit_handler))
        .route("/api/count", get(count_handler))
        .route("/api/progress", get(progress_handler))
        .route("/responses", get(list_responses_handler))
        .route("/responses/search", get(search_responses_handler))
        .route("/responses/{id}", get(get_response_handler))
        .route("/stats/breakdown", get(breakdown_handler))
        .with_state(state)
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let allow_origin = if origins.is_empty() || origins.iter().any(|o| o == "*") {
        AllowOrigin::any()
    } else {
        let origins: Vec<HeaderValue> = origins
            .iter()
            .filter_map(|o| match o.parse::<HeaderValue>() {
                Ok(v) => Some(v),
                Err(e) => {
                    warn!(origin = %o, error = %e, "ignoring malformed CORS origin");
                    None
                }
            })
            .collect();
        AllowOrigin::list(origins)
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE])
        .max_age(Duration::from_secs(60 * 60))
}

pub async fn start_server(args: Args) -> Result<(), Box<dyn std::error::Error>> {
    info!("Opening submission store...");
    let store: Arc<dyn SubmissionStore> = Arc::new(SqliteStore::connect(&args.database_url).await?);
    let state = Arc::new(AppState::new(&args, store));

    let app = router(state).layer(cors_layer(&args.allowed_origins()));

    let addr = format!("0.0.0.0:{}", args.port);
    let listener = TcpListener::bind(&addr).await?;

    info!("Survey intake running on http://localhost:{}", args.port);
    info!(
        submit = args.submit_rate_limit,
        read = args.read_rate_limit,
        "Rate limits per client per minute"
    );
    info!(
        count = args.count_ttl,
        progress = args.progress_ttl,
        breakdown = args.breakdown_ttl,
        "Cache TTLs in seconds"
    );
    if args.trust_forwarded_for {
        warn!("Client addresses are taken from X-Forwarded-For; run behind a trusted proxy only");
    }

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    info!("Server shut down");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
        info!("Received Ctrl+C, shutting down");
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                info!("Received terminate signal, shutting down");
            }
            Err(e) => {
                warn!(error = %e, "failed to install terminate handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
