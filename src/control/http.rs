use super::command::ControlCommand;
use crate::error::ResourceError;
use crate::service::{ServiceContext, StatusReport};
use axum::{
    extract::State,
    http::{header, HeaderValue},
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::set_header::SetResponseHeaderLayer;
use tracing::{debug, info};

/// Build the control router: one request per connection, every reply 200 JSON
pub fn control_router(context: Arc<ServiceContext>) -> Router {
    Router::new()
        .route("/status", get(status_handler).fallback(unknown_handler))
        .route("/start", post(start_handler).fallback(unknown_handler))
        .route("/stop", post(stop_handler).fallback(unknown_handler))
        .fallback(unknown_handler)
        .layer(SetResponseHeaderLayer::overriding(
            header::CONNECTION,
            HeaderValue::from_static("close"),
        ))
        .with_state(context)
}

async fn status_handler(State(context): State<Arc<ServiceContext>>) -> Json<StatusReport> {
    debug!("Status requested via HTTP");
    Json(context.status())
}

async fn start_handler(State(context): State<Arc<ServiceContext>>) -> Json<Value> {
    ControlCommand::Start.apply(&context.flags, "HTTP");
    Json(json!({ "status": "started" }))
}

async fn stop_handler(State(context): State<Arc<ServiceContext>>) -> Json<Value> {
    ControlCommand::Stop.apply(&context.flags, "HTTP");
    Json(json!({ "status": "stopped" }))
}

async fn unknown_handler() -> Json<Value> {
    Json(json!({ "error": "unknown command" }))
}

/// HTTP control listener
pub struct ControlServer {
    context: Arc<ServiceContext>,
}

/// A listener that is already bound, ready to serve
pub struct BoundControlServer {
    listener: TcpListener,
    router: Router,
    local_addr: SocketAddr,
}

impl ControlServer {
    pub fn new(context: Arc<ServiceContext>) -> Self {
        Self { context }
    }

    /// Bind the configured address
    pub async fn bind(&self) -> Result<BoundControlServer, ResourceError> {
        let config = &self.context.config.http;
        let addr = format!("{}:{}", config.ip, config.port);

        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|e| ResourceError::BindFailed {
                address: addr.clone(),
                source: e,
            })?;
        let local_addr = listener
            .local_addr()
            .map_err(|e| ResourceError::BindFailed {
                address: addr.clone(),
                source: e,
            })?;

        info!("HTTP control listening on {}", local_addr);

        Ok(BoundControlServer {
            listener,
            router: control_router(Arc::clone(&self.context)),
            local_addr,
        })
    }
}

impl BoundControlServer {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Serve until `shutdown` is cancelled
    pub async fn serve(self, shutdown: CancellationToken) -> Result<(), ResourceError> {
        axum::serve(self.listener, self.router)
            .with_graceful_shutdown(async move { shutdown.cancelled().await })
            .await
            .map_err(|e| ResourceError::ServerFailed {
                details: format!("Server error: {}", e),
            })?;

        info!("HTTP control server stopped");
        Ok(())
    }
}
