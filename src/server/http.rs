//! HTTP server implementation
//!
//! Uses hyper http1 with TokioIo; one task per connection. Routing is a
//! plain match on method and path below `/api/v1`.

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::{Body, Incoming};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{header, Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

use crate::auth::JwtValidator;
use crate::config::Args;
use crate::lifecycle::LifecycleEngine;
use crate::routes::{
    self, achievements, auth_routes, error_response, not_found_response, preflight_response,
    reports, FullBody,
};
use crate::types::{AccoladeError, Result};
use crate::uploads::{self, UPLOAD_URL_PREFIX};

type BoxBody = http_body_util::combinators::BoxBody<Bytes, hyper::Error>;

/// Prefix of every versioned endpoint
pub const API_PREFIX: &str = "/api/v1";

/// Shared application state
pub struct AppState {
    pub args: Args,
    /// Lifecycle engine with its reference, detail, directory and file stores
    pub engine: LifecycleEngine,
    pub jwt: JwtValidator,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(args: Args, engine: LifecycleEngine, jwt: JwtValidator) -> Self {
        Self {
            args,
            engine,
            jwt,
            started_at: Instant::now(),
        }
    }
}

/// Run the HTTP server
pub async fn run(state: Arc<AppState>) -> Result<()> {
    let listener = TcpListener::bind(state.args.listen).await?;

    info!("Accolade listening on {}", state.args.listen);
    info!(
        "Detail store: {}, store timeout: {}ms",
        state.engine.details().backend(),
        state.args.store_timeout_ms
    );

    if state.args.dev_mode {
        warn!("Development mode enabled - demo accounts and dev JWT secret may be active");
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

async fn handle_request(
    state: Arc<AppState>,
    addr: SocketAddr,
    req: Request<Incoming>,
) -> std::result::Result<Response<BoxBody>, hyper::Error> {
    info!("[{}] {} {}", addr, req.method(), req.uri().path());
    Ok(to_boxed(route(state, req).await))
}

/// Dispatch one request. Generic over the body so tests can drive the
/// router without a socket.
pub async fn route<B>(state: Arc<AppState>, req: Request<B>) -> Response<FullBody>
where
    B: Body<Data = Bytes>,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    if req.method() == Method::OPTIONS {
        return preflight_response();
    }

    let method = req.method().clone();
    let path = req.uri().path().to_string();

    match dispatch(&state, method, &path, req).await {
        Ok(response) => response,
        Err(e) => error_response(&e),
    }
}

async fn dispatch<B>(
    state: &AppState,
    method: Method,
    path: &str,
    req: Request<B>,
) -> Result<Response<FullBody>>
where
    B: Body<Data = Bytes>,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    if path == "/health" {
        return Ok(routes::health_check(state));
    }

    if let Some(name) = path.strip_prefix(UPLOAD_URL_PREFIX) {
        if method != Method::GET {
            return Err(method_not_allowed(&method, path));
        }
        return serve_upload(state, name).await;
    }

    let Some(api) = path.strip_prefix(API_PREFIX) else {
        return Ok(not_found_response(path));
    };

    match (&method, api) {
        (&Method::GET, "/health") => Ok(routes::health_check(state)),

        // Auth
        (&Method::POST, "/auth/login") => auth_routes::login(state, req).await,
        (&Method::POST, "/auth/refresh") => auth_routes::refresh(state, req).await,
        (&Method::POST, "/auth/logout") => auth_routes::logout(state, req).await,
        (&Method::GET, "/auth/profile") => auth_routes::profile(state, req).await,

        // Achievements collection
        (&Method::GET, "/achievements") => achievements::list(state, req).await,
        (&Method::POST, "/achievements") => achievements::create(state, req).await,

        // Reports
        (&Method::GET, "/reports/statistics") => reports::statistics(state, req).await,
        (&Method::GET, p) if p.starts_with("/reports/student/") => {
            let student_id = p.trim_start_matches("/reports/student/").trim_end_matches('/');
            if student_id.is_empty() || student_id.contains('/') {
                return Ok(not_found_response(path));
            }
            reports::student(state, req, student_id).await
        }

        (_, p) if p.starts_with("/achievements/") => {
            let (id, action) = achievements::parse_achievement_path(&p["/achievements/".len()..])?;
            match (&method, action) {
                (&Method::GET, None) => achievements::get(state, req, id).await,
                (&Method::PUT, None) => achievements::update(state, req, id).await,
                (&Method::DELETE, None) => achievements::delete(state, req, id).await,
                (&Method::POST, Some("submit")) => achievements::submit(state, req, id).await,
                (&Method::POST, Some("verify")) => achievements::verify(state, req, id).await,
                (&Method::POST, Some("reject")) => achievements::reject(state, req, id).await,
                (&Method::GET, Some("history")) => achievements::history(state, req, id).await,
                (&Method::POST, Some("attachments")) => achievements::attach(state, req, id).await,
                (_, None | Some("submit" | "verify" | "reject" | "history" | "attachments")) => {
                    Err(method_not_allowed(&method, path))
                }
                _ => Ok(not_found_response(path)),
            }
        }

        (
            _,
            "/achievements" | "/auth/login" | "/auth/refresh" | "/auth/logout" | "/auth/profile"
            | "/reports/statistics" | "/health",
        ) => Err(method_not_allowed(&method, path)),

        _ => Ok(not_found_response(path)),
    }
}

fn method_not_allowed(method: &Method, path: &str) -> AccoladeError {
    AccoladeError::BadRequest(format!("Method {} not allowed on {}", method, path))
}

async fn serve_upload(state: &AppState, name: &str) -> Result<Response<FullBody>> {
    let bytes = uploads::read_stored(Path::new(&state.args.upload_dir), name).await?;
    Ok(Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "application/octet-stream")
        .header(header::ACCESS_CONTROL_ALLOW_ORIGIN, "*")
        .body(Full::new(bytes))
        .unwrap())
}

fn to_boxed(response: Response<Full<Bytes>>) -> Response<BoxBody> {
    response.map(|body| body.map_err(|never| match never {}).boxed())
}
