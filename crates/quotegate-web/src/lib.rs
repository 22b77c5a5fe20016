//! HTTP gateway for quotegate.
//!
//! | Method | Path | Facade operation |
//! |--------|------|------------------|
//! | GET | `/api/health` | [`FetchFacade::health`] |
//! | GET | `/api/stock/:symbol` | [`FetchFacade::get_latest`] |
//! | POST | `/api/stocks` | [`FetchFacade::get_multiple`] |
//! | GET | `/api/stock/:symbol/history` | [`FetchFacade::get_history`] |
//! | GET | `/api/market/:market` | [`FetchFacade::get_market_snapshot`] |

pub mod envelope;
pub mod handlers;

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::Request;
use axum::routing::{get, post};
use axum::Router;
use quotegate_core::FetchFacade;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, info_span, warn};
use uuid::Uuid;

pub use envelope::{ApiError, Envelope, ErrorBody};

#[derive(Clone)]
pub struct AppState {
    pub facade: Arc<FetchFacade>,
}

impl AppState {
    pub fn new(facade: Arc<FetchFacade>) -> Self {
        Self { facade }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/health", get(handlers::health))
        .route("/api/stock/:symbol", get(handlers::latest))
        .route("/api/stock/:symbol/history", get(handlers::history))
        .route("/api/stocks", post(handlers::multiple))
        .route("/api/market/:market", get(handlers::market))
        .fallback(handlers::fallback)
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &Request| {
                info_span!(
                    "request",
                    id = %Uuid::new_v4(),
                    method = %request.method(),
                    uri = %request.uri(),
                )
            }),
        )
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Bind `addr` and serve until ctrl-c.
pub async fn serve(facade: Arc<FetchFacade>, addr: SocketAddr) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(addr = %listener.local_addr()?, "quotegate listening");

    axum::serve(listener, router(AppState::new(facade)))
        .with_graceful_shutdown(shutdown_signal())
        .await
}

async fn shutdown_signal() {
    wait_for_shutdown(tokio::signal::ctrl_c()).await;
}

/// Resolves when `signal` fires. A failed signal handler never triggers shutdown.
async fn wait_for_shutdown<F>(signal: F)
where
    F: Future<Output = std::io::Result<()>>,
{
    match signal.await {
        Ok(()) => info!("shutdown requested"),
        Err(error) => {
            warn!(%error, "failed to install shutdown signal handler; serving until killed");
            std::future::pending::<()>().await;
        }
    }
}
