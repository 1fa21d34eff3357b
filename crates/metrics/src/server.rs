//! Scrape endpoint for the ringmine metrics registry.
//!
//! Serves the global [`REGISTRY`] in the Prometheus text exposition format
//! on `/metrics`, with `/health` as a liveness probe. One task per accepted
//! connection; a node runs this only when started with `--metrics-addr`.

use crate::REGISTRY;
use http_body_util::Full;
use hyper::body::Bytes;
use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use prometheus::{Encoder, TextEncoder};
use std::convert::Infallible;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};

/// Encode every registered ringmine metric family.
///
/// Returns the exposition content type alongside the rendered body.
fn render_registry() -> Result<(String, Vec<u8>), prometheus::Error> {
    let encoder = TextEncoder::new();
    let mut body = Vec::new();
    encoder.encode(&REGISTRY.gather(), &mut body)?;
    Ok((encoder.format_type().to_string(), body))
}

fn respond(
    status: StatusCode,
    content_type: Option<&str>,
    body: impl Into<Bytes>,
) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(body.into()));
    *response.status_mut() = status;
    if let Some(value) = content_type.and_then(|ct| HeaderValue::from_str(ct).ok()) {
        response.headers_mut().insert(CONTENT_TYPE, value);
    }
    response
}

/// Route one scrape request.
async fn serve_scrape(
    req: Request<hyper::body::Incoming>,
) -> Result<Response<Full<Bytes>>, Infallible> {
    if req.method() != Method::GET {
        return Ok(respond(
            StatusCode::METHOD_NOT_ALLOWED,
            None,
            "scrapes are GET only",
        ));
    }

    Ok(match req.uri().path() {
        "/metrics" => match render_registry() {
            Ok((content_type, body)) => {
                respond(StatusCode::OK, Some(&content_type), body)
            }
            Err(e) => {
                error!(error = %e, "failed to encode metrics registry");
                respond(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    None,
                    "metrics encoding failed",
                )
            }
        },
        "/health" => respond(StatusCode::OK, None, "ok"),
        other => {
            debug!(path = other, "scrape for unknown path");
            respond(StatusCode::NOT_FOUND, None, "not found")
        }
    })
}

/// Serve scrapes on `addr` until the task is dropped.
pub async fn start_metrics_server(addr: SocketAddr) -> std::io::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    info!(%addr, "metrics endpoint up");

    loop {
        let (stream, remote) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(e) => {
                warn!(error = %e, "metrics accept failed");
                continue;
            }
        };
        tokio::spawn(async move {
            let served = http1::Builder::new()
                .serve_connection(TokioIo::new(stream), service_fn(serve_scrape))
                .await;
            if let Err(e) = served {
                debug!(%remote, error = %e, "scrape connection ended with error");
            }
        });
    }
}

/// Run the scrape endpoint in the background.
pub fn spawn_metrics_server(addr: SocketAddr) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        if let Err(e) = start_metrics_server(addr).await {
            error!(%addr, error = %e, "metrics server failed");
        }
    })
}
