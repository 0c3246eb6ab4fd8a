//! HTTP server implementation
//!
//! Uses hyper http1 with TokioIo for async handling. Requests are reduced to
//! method, path, query, headers and a collected body before routing, so
//! [`dispatch`] can be driven without a socket.

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::header::{self, HeaderMap, HeaderValue};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};

use crate::config::Args;
use crate::routes::{self, achievements, reports, response};
use crate::services::Services;

type BoxBody = http_body_util::combinators::BoxBody<Bytes, hyper::Error>;

const API_PREFIX: &str = "/api/v1/";

/// Shared application state
pub struct AppState {
    pub args: Args,
    pub services: Services,
}

impl AppState {
    pub fn new(args: Args, services: Services) -> Self {
        Self { args, services }
    }
}

/// Run the HTTP server
pub async fn run(state: Arc<AppState>) -> std::io::Result<()> {
    let listener = TcpListener::bind(state.args.listen).await?;

    info!("Achievement ledger listening on {}", state.args.listen);

    if state.args.dev_mode {
        warn!("Development mode enabled");
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
                error!("Failed to accept connection: {}", e);
            }
        }
    }
}

/// Handle incoming HTTP request
async fn handle_request(
    state: Arc<AppState>,
    addr: SocketAddr,
    req: Request<Incoming>,
) -> Result<Response<BoxBody>, hyper::Error> {
    let started = Instant::now();
    let (parts, body) = req.into_parts();
    let path = parts.uri.path().to_string();

    debug!("[{}] {} {}", addr, parts.method, path);

    let body = body.collect().await?.to_bytes();
    let response = dispatch(
        &state,
        &parts.method,
        &path,
        parts.uri.query(),
        &parts.headers,
        body,
    )
    .await;

    info!(
        method = %parts.method,
        path = %path,
        status = response.status().as_u16(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "Request handled"
    );

    Ok(to_boxed(with_cors(response)))
}

/// Route a request to its handler
pub async fn dispatch(
    state: &AppState,
    method: &Method,
    path: &str,
    query: Option<&str>,
    headers: &HeaderMap,
    body: Bytes,
) -> Response<Full<Bytes>> {
    if method == Method::OPTIONS {
        return preflight_response();
    }

    if path == "/health" {
        return match *method {
            Method::GET => response::ok(&serde_json::json!({ "status": "ok" })),
            _ => response::method_not_allowed(),
        };
    }

    let Some(rest) = path.strip_prefix(API_PREFIX) else {
        return response::not_found(&format!("No route for {}", path));
    };
    let segments: Vec<&str> = rest.trim_end_matches('/').split('/').collect();

    let caller = match routes::caller_from_headers(headers) {
        Ok(caller) => caller,
        Err(rejection) => return rejection,
    };
    let services = &state.services;

    let result = match (method, segments.as_slice()) {
        (&Method::POST, ["achievements"]) => achievements::create(services, &caller, &body).await,
        (&Method::GET, ["achievements"]) => achievements::list(services, &caller, query).await,
        (_, ["achievements"]) => Err(response::method_not_allowed()),

        (&Method::GET, ["achievements", id]) => achievements::get(services, &caller, id).await,
        (&Method::PUT, ["achievements", id]) => {
            achievements::update(services, &caller, id, &body).await
        }
        (&Method::DELETE, ["achievements", id]) => {
            achievements::delete(services, &caller, id).await
        }
        (_, ["achievements", _]) => Err(response::method_not_allowed()),

        (&Method::POST, ["achievements", id, "submit"]) => {
            achievements::submit(services, &caller, id).await
        }
        (&Method::POST, ["achievements", id, "verify"]) => {
            achievements::verify(services, &caller, id, &body).await
        }
        (&Method::POST, ["achievements", id, "attachments"]) => {
            achievements::add_attachment(services, &caller, id, &body).await
        }
        (_, ["achievements", _, "submit" | "verify" | "attachments"]) => {
            Err(response::method_not_allowed())
        }

        (&Method::GET, ["reports", "statistics"]) => reports::statistics(services, &caller).await,
        (&Method::GET, ["reports", "students", id]) => {
            reports::student_report(services, &caller, id).await
        }

        _ => Err(response::not_found(&format!("No route for {}", path))),
    };

    result.unwrap_or_else(|rejection| rejection)
}

/// Convert Full<Bytes> response to BoxBody response
fn to_boxed(response: Response<Full<Bytes>>) -> Response<BoxBody> {
    response.map(|body| body.map_err(|never| match never {}).boxed())
}

fn with_cors(mut response: Response<Full<Bytes>>) -> Response<Full<Bytes>> {
    response.headers_mut().insert(
        header::ACCESS_CONTROL_ALLOW_ORIGIN,
        HeaderValue::from_static("*"),
    );
    response
}

/// CORS preflight response
fn preflight_response() -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::new()));
    *response.status_mut() = StatusCode::OK;
    let headers = response.headers_mut();
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static("Content-Type, X-User-Id, X-User-Role"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static("GET, POST, PUT, DELETE, OPTIONS"),
    );
    response
}
