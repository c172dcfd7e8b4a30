//! HTTP server implementation
//!
//! hyper http1 with TokioIo, one task per connection.

use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};

use crate::auth::JwtValidator;
use crate::config::Args;
use crate::db::MongoClient;
use crate::routes::response::{error_response, new_request_id, with_request_id};
use crate::routes::{self, FullBody};
use crate::services::RecordService;
use crate::types::BiotopError;

/// Shared application state
pub struct AppState {
    pub args: Args,
    /// None when running on the in-memory fallback
    pub mongo: Option<MongoClient>,
    pub records: Arc<RecordService>,
    pub jwt: JwtValidator,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(
        args: Args,
        mongo: Option<MongoClient>,
        records: Arc<RecordService>,
        jwt: JwtValidator,
    ) -> Self {
        Self {
            args,
            mongo,
            records,
            jwt,
            started_at: Instant::now(),
        }
    }
}

/// Accept connections until the listener fails to bind
pub async fn run(state: Arc<AppState>) -> Result<(), BiotopError> {
    let listener = TcpListener::bind(state.args.listen).await?;

    info!("Biotop listening on {}", state.args.listen);

    if state.args.dev_mode {
        warn!("Development mode enabled - fixed JWT secret in use");
    }
    if state.mongo.is_none() {
        warn!("No MongoDB connection - records are kept in memory only");
    }

    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                let state = Arc::clone(&state);
                tokio::spawn(async move {
                    let io = TokioIo::new(stream);

                    let service = service_fn(move |req| {
                        let state = Arc::clone(&state);
                        async move { handle_request(state, addr, req).await }
                    });

                    if let Err(err) = http1::Builder::new()
                        .serve_connection(io, service)
                        .await
                    {
                        error!("Error serving connection from {}: {:?}", addr, err);
                    }
                });
            }
            Err(e) => {
                error!("Error accepting connection: {:?}", e);
            }
        }
    }
}

/// Route one request, bounded by the configured request timeout
async fn handle_request(
    state: Arc<AppState>,
    addr: SocketAddr,
    req: Request<Incoming>,
) -> Result<Response<FullBody>, Infallible> {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let request_id = new_request_id();
    let started = Instant::now();

    let timeout = Duration::from_millis(state.args.request_timeout_ms);
    let response = match tokio::time::timeout(timeout, route(state, req, &path)).await {
        Ok(response) => response,
        Err(_) => {
            warn!(
                "[{}] {} {} {} timed out after {:?}",
                request_id, addr, method, path, timeout
            );
            error_response(
                StatusCode::GATEWAY_TIMEOUT,
                "Request timed out",
                Some("TIMEOUT"),
            )
        }
    };

    debug!(
        "[{}] {} {} {} -> {} ({} ms)",
        request_id,
        addr,
        method,
        path,
        response.status(),
        started.elapsed().as_millis()
    );
    Ok(with_request_id(response, &request_id))
}

async fn route(state: Arc<AppState>, req: Request<Incoming>, path: &str) -> Response<FullBody> {
    if req.method() == Method::OPTIONS {
        return routes::preflight_response();
    }

    if path == "/api/records" || path.starts_with("/api/records/") {
        return routes::handle_records_request(req, state, path).await;
    }

    if path.starts_with("/api/public/") {
        return routes::handle_public_request(req, state, path).await;
    }

    match (req.method(), path) {
        (&Method::GET, "/health") | (&Method::GET, "/healthz") => routes::health_check(state),
        (&Method::GET, "/ready") | (&Method::GET, "/readyz") => {
            routes::readiness_check(state).await
        }
        (&Method::GET, "/version") => routes::version_info(),
        (_, "/health") | (_, "/ready") | (_, "/version") => error_response(
            StatusCode::METHOD_NOT_ALLOWED,
            "Method not allowed",
            Some("METHOD_NOT_ALLOWED"),
        ),
        _ => routes::not_found_response(path),
    }
}
