//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create the Axum router whose fallback feeds every request to the chain
//! - Wire up middleware (tracing, timeout, request ID)
//! - Run each request's chain in its own task
//! - Turn an uncommitted or crashed request into a 404 or 500
//! - Record request metrics

use std::io;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::body::Body;
use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Router;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::request_id::{PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::Instrument;

use crate::config::ServerConfig;
use crate::context::{ContextDefaults, RequestContext};
use crate::http::request_id::{UuidRequestId, X_REQUEST_ID};
use crate::lifecycle::shutdown::ShutdownSignal;
use crate::middleware::{render_error, Chain};
use crate::observability::metrics;

/// State shared by every request.
#[derive(Clone)]
struct AppState {
    chain: Chain,
    defaults: Arc<ContextDefaults>,
}

/// HTTP server running one middleware chain.
pub struct HttpServer {
    router: Router,
    config: ServerConfig,
}

impl HttpServer {
    pub fn new(config: ServerConfig, chain: Chain) -> Self {
        let state = AppState {
            chain,
            defaults: Arc::new(config.context_defaults()),
        };
        let router = Self::build_router(&config, state);
        Self { router, config }
    }

    /// Build the Axum router with all middleware layers.
    fn build_router(config: &ServerConfig, state: AppState) -> Router {
        Router::new().fallback(dispatch).with_state(state).layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::new(X_REQUEST_ID, UuidRequestId))
                .layer(TraceLayer::new_for_http())
                .layer(PropagateRequestIdLayer::new(X_REQUEST_ID))
                .layer(TimeoutLayer::with_status_code(
                    StatusCode::REQUEST_TIMEOUT,
                    Duration::from_secs(config.timeouts.request_secs),
                )),
        )
    }

    /// The fully layered router, for driving without a socket.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Serve connections from `listener` until `shutdown` fires, then drain.
    pub async fn run(self, listener: TcpListener, shutdown: ShutdownSignal) -> io::Result<()> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        axum::serve(listener, self.router)
            .with_graceful_shutdown(shutdown.recv())
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }
}

/// Runs the chain for one request and waits for its response to be committed.
async fn dispatch(State(state): State<AppState>, request: Request) -> Response {
    let start = Instant::now();
    let method = request.method().to_string();
    let (ctx, committed) = RequestContext::new(request, &state.defaults);

    let chain = state.chain.run();
    let task = tokio::spawn(
        async move {
            if let Err(err) = ctx.run(chain).await {
                if let Err(render_err) = render_error(&ctx, &err) {
                    tracing::error!(error = %render_err, "Failed to render error response");
                }
            }
        }
        .instrument(tracing::Span::current()),
    );

    let response = match committed.await {
        Ok(response) => response,
        // The context is gone without committing: either the task panicked
        // or the chain finished without a response.
        Err(_) => match task.await {
            Err(join) if join.is_panic() => {
                tracing::error!("Request task panicked");
                fallback_response(StatusCode::INTERNAL_SERVER_ERROR)
            }
            _ => fallback_response(StatusCode::NOT_FOUND),
        },
    };

    metrics::record_request(&method, response.status().as_u16(), start);
    response
}

fn fallback_response(status: StatusCode) -> Response {
    let reason = status.canonical_reason().unwrap_or("Error");
    (status, Body::from(reason)).into_response()
}
