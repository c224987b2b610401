//! HTTP server for the health report and Prometheus metrics.

use crate::config::ServerConfig;
use crate::health::{HealthService, HealthStatus};
use crate::metrics::MetricsCollector;
use crate::util::ShutdownSignal;
use bytes::Bytes;
use http_body_util::Full;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use prometheus_client::encoding::text::encode;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{debug, error, info};

/// Serves `GET <health_path>` and `GET <metrics_path>`.
pub struct StatusServer {
    address: SocketAddr,
    routes: Arc<Routes>,
}

struct Routes {
    health_path: String,
    metrics_path: String,
    health: HealthService,
    collector: MetricsCollector,
}

impl StatusServer {
    pub fn new(config: &ServerConfig, health: HealthService, collector: MetricsCollector) -> Self {
        Self {
            address: config.address,
            routes: Arc::new(Routes {
                health_path: config.health_path.clone(),
                metrics_path: config.metrics_path.clone(),
                health,
                collector,
            }),
        }
    }

    /// Bind the configured address.
    pub async fn bind(self) -> std::io::Result<BoundStatusServer> {
        let listener = TcpListener::bind(self.address).await?;
        Ok(BoundStatusServer {
            listener,
            routes: self.routes,
        })
    }
}

/// A status server with its listener bound.
pub struct BoundStatusServer {
    listener: TcpListener,
    routes: Arc<Routes>,
}

impl BoundStatusServer {
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Serve until shutdown.
    pub async fn run(self, shutdown: ShutdownSignal) {
        if let Ok(address) = self.listener.local_addr() {
            info!(
                address = %address,
                health = %self.routes.health_path,
                metrics = %self.routes.metrics_path,
                "status server started"
            );
        }

        loop {
            tokio::select! {
                accept_result = self.listener.accept() => {
                    match accept_result {
                        Ok((stream, _addr)) => {
                            let routes = Arc::clone(&self.routes);

                            tokio::spawn(async move {
                                let io = TokioIo::new(stream);
                                let service = service_fn(move |req| {
                                    let routes = Arc::clone(&routes);
                                    async move { handle_request(req, &routes).await }
                                });

                                if let Err(e) = http1::Builder::new()
                                    .serve_connection(io, service)
                                    .await
                                {
                                    debug!(error = %e, "status connection error");
                                }
                            });
                        }
                        Err(e) => {
                            error!(error = %e, "failed to accept status connection");
                        }
                    }
                }

                _ = shutdown.wait() => {
                    info!("status server shutting down");
                    break;
                }
            }
        }
    }
}

async fn handle_request<B>(req: Request<B>, routes: &Routes) -> Result<Response<Full<Bytes>>, Infallible> {
    let path = req.uri().path();
    debug!(path = %path, method = %req.method(), "status request");

    if req.method() != Method::GET {
        return Ok(text(StatusCode::METHOD_NOT_ALLOWED, "Method not allowed\n".to_string()));
    }

    let response = if path == routes.health_path {
        health_response(&routes.health)
    } else if path == routes.metrics_path {
        metrics_response(&routes.collector)
    } else if path == "/" {
        text(
            StatusCode::OK,
            format!(
                "pulsecheck status server\n\nEndpoints:\n  {} - Health report (JSON)\n  {} - Prometheus metrics\n",
                routes.health_path, routes.metrics_path
            ),
        )
    } else {
        text(StatusCode::NOT_FOUND, "Not found\n".to_string())
    };

    Ok(response)
}

fn health_response(health: &HealthService) -> Response<Full<Bytes>> {
    let report = health.check_health(None);
    let status = match report.status {
        HealthStatus::Healthy | HealthStatus::Degraded => StatusCode::OK,
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    match serde_json::to_vec(&report) {
        Ok(body) => response(status, "application/json", Bytes::from(body)),
        Err(e) => {
            error!(error = %e, "failed to encode health report");
            text(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to encode health report\n".to_string(),
            )
        }
    }
}

fn metrics_response(collector: &MetricsCollector) -> Response<Full<Bytes>> {
    let mut buffer = String::new();
    if let Err(e) = encode(&mut buffer, collector.registry()) {
        error!(error = %e, "failed to encode metrics");
        return text(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to encode metrics\n".to_string(),
        );
    }

    response(
        StatusCode::OK,
        "text/plain; version=0.0.4; charset=utf-8",
        Bytes::from(buffer),
    )
}

fn text(status: StatusCode, body: String) -> Response<Full<Bytes>> {
    response(status, "text/plain", Bytes::from(body))
}

fn response(status: StatusCode, content_type: &'static str, body: Bytes) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(body));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(hyper::header::CONTENT_TYPE, hyper::header::HeaderValue::from_static(content_type));
    response
}
