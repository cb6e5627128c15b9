//! HTTP surface of the collector.
//!
//! Four JSON endpoints under `/api/analytics`:
//!
//! | Method | Path        | Purpose                                    |
//! |--------|-------------|--------------------------------------------|
//! | POST   | `/collect`  | validate and store one event envelope      |
//! | GET    | `/events`   | filtered, paginated listing, newest first  |
//! | GET    | `/stats`    | event, page and device aggregates          |
//! | GET    | `/realtime` | active sessions and users in the window    |

pub mod response;
pub mod routes;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    Router,
    http::{Method, header::CONTENT_TYPE},
    routing::{get, post},
};
use tokio::{net::TcpListener, signal};
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

pub use response::ApiError;
use routes::{collect_handler, events_handler, realtime_handler, stats_handler};

use crate::aggregate::AggregationService;
use crate::config::{AggregationConfig, Config};
use crate::error::Result;
use crate::ingest::IngestionService;
use crate::storage::EventStore;

/// Route prefix shared by every endpoint.
pub const API_PREFIX: &str = "/api/analytics";

/// Shared handler state.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Write path.
    pub ingest: IngestionService,
    /// Aggregate queries.
    pub aggregation: AggregationService,
    /// Direct store access for raw listings.
    pub store: Arc<EventStore>,
    /// `limit` used when the query string has none.
    pub default_page_size: u32,
    /// Upper bound applied to any requested `limit`.
    pub max_page_size: u32,
}

impl AppState {
    /// Wire the services around one store.
    #[must_use]
    pub fn new(store: Arc<EventStore>, config: &AggregationConfig) -> Self {
        Self {
            ingest: IngestionService::new(Arc::clone(&store)),
            aggregation: AggregationService::new(Arc::clone(&store), config),
            store,
            default_page_size: config.default_page_size,
            max_page_size: config.max_page_size,
        }
    }
}

/// Build the router with CORS applied.
pub fn router(state: AppState, cors_max_age: Duration) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE])
        .max_age(cors_max_age);

    let api = Router::new()
        .route("/collect", post(collect_handler))
        .route("/events", get(events_handler))
        .route("/stats", get(stats_handler))
        .route("/realtime", get(realtime_handler));

    Router::new()
        .nest(API_PREFIX, api)
        .layer(cors)
        .with_state(state)
}

/// Bind the configured address and serve until Ctrl+C or SIGTERM.
///
/// # Errors
///
/// Returns an error if the address cannot be bound or the server fails.
pub async fn serve(config: &Config, store: Arc<EventStore>) -> Result<()> {
    let address = config.listen_addr();
    info!("Binding to {address}");
    let listener = TcpListener::bind(address).await?;
    info!("Server running on {address}");

    let state = AppState::new(store, &config.aggregation);
    let app = router(state, Duration::from_secs(config.server.cors_max_age_secs));
    serve_on(listener, app, shutdown_signal()).await?;

    info!("Server shut down");
    Ok(())
}

/// Serve `app` on an already bound listener until `shutdown` resolves.
///
/// # Errors
///
/// Returns an error if accepting connections fails.
pub async fn serve_on<F>(listener: TcpListener, app: Router, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        match signal::ctrl_c().await {
            Ok(()) => info!("Received Ctrl+C, shutting down"),
            Err(e) => {
                warn!(error = %e, "Failed to install Ctrl+C handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                info!("Received terminate signal, shutting down");
            }
            Err(e) => {
                warn!(error = %e, "Failed to install signal handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}
