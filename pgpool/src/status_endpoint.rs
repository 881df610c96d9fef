//! Read-only cluster-status HTTP endpoint (SPEC_FULL.md §2 component K).
//!
//! Grounded on `pgdog/src/healthcheck.rs`: same hyper/http1/TokioIo
//! shape, but serving the supervisor's own cluster snapshot instead of
//! a pool-wide banned/not-banned bit.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use http_body_util::Full;
use hyper::body::Bytes;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response};
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;
use tracing::{error, info};

use crate::supervisor::cluster::ClusterState;

pub async fn serve(port: u16, cluster: Arc<ClusterState>) -> std::io::Result<()> {
    info!("cluster status endpoint http://0.0.0.0:{}", port);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr).await?;

    loop {
        let (stream, _) = listener.accept().await?;
        let io = TokioIo::new(stream);
        let cluster = cluster.clone();

        tokio::task::spawn(async move {
            let service = service_fn(move |req| status_response(req, cluster.clone()));
            if let Err(err) = http1::Builder::new().serve_connection(io, service).await {
                error!(error = %err, "status endpoint connection error");
            }
        });
    }
}

async fn status_response(
    _: Request<hyper::body::Incoming>,
    cluster: Arc<ClusterState>,
) -> Result<Response<Full<Bytes>>, Infallible> {
    let snapshot = cluster.snapshot();
    let body = serde_json::to_vec(&snapshot).unwrap_or_default();

    let response = Response::builder()
        .header(hyper::header::CONTENT_TYPE, "application/json")
        .status(200)
        .body(Full::new(Bytes::from(body)))
        .unwrap_or_else(|_| Response::new(Full::new(Bytes::from("{}"))));

    Ok(response)
}
