//! Built-in network probes.
//!
//! These back the checks declared in the configuration file. Timeouts are
//! enforced by the runner, so the probes themselves simply run to completion.

use crate::config::{Config, ProbeConfig};
use crate::health::{Outcome, Probe, ProbeContext, ProbeError, Registration};
use async_trait::async_trait;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;

/// Checks that a TCP port accepts connections.
#[derive(Debug, Clone)]
pub struct TcpProbe {
    address: SocketAddr,
    degraded_after: Option<Duration>,
}

impl TcpProbe {
    pub fn new(address: SocketAddr) -> Self {
        Self {
            address,
            degraded_after: None,
        }
    }

    /// Report degraded when connecting takes longer than `threshold`.
    pub fn degraded_after(mut self, threshold: Option<Duration>) -> Self {
        self.degraded_after = threshold;
        self
    }
}

#[async_trait]
impl Probe for TcpProbe {
    async fn check(&self, _ctx: &ProbeContext) -> Result<Outcome, ProbeError> {
        let start = Instant::now();
        TcpStream::connect(self.address)
            .await
            .map_err(|e| ProbeError::failed(format!("connection failed: {}", e)))?;

        Ok(latency_outcome(start.elapsed(), self.degraded_after)
            .with_data("address", self.address.to_string()))
    }
}

/// Longest status line read before giving up on finding its end.
const MAX_STATUS_LINE: u64 = 1024;

/// Issues `GET <path>` and compares the response status.
#[derive(Debug, Clone)]
pub struct HttpProbe {
    address: SocketAddr,
    path: String,
    expected_status: u16,
    degraded_after: Option<Duration>,
}

impl HttpProbe {
    pub fn new(address: SocketAddr, path: impl Into<String>, expected_status: u16) -> Self {
        Self {
            address,
            path: path.into(),
            expected_status,
            degraded_after: None,
        }
    }

    /// Report degraded when the response takes longer than `threshold`.
    pub fn degraded_after(mut self, threshold: Option<Duration>) -> Self {
        self.degraded_after = threshold;
        self
    }
}

#[async_trait]
impl Probe for HttpProbe {
    async fn check(&self, _ctx: &ProbeContext) -> Result<Outcome, ProbeError> {
        let start = Instant::now();
        let mut stream = TcpStream::connect(self.address)
            .await
            .map_err(|e| ProbeError::failed(format!("connection failed: {}", e)))?;

        let request = format!(
            "GET {} HTTP/1.1\r\nHost: {}\r\nConnection: close\r\n\r\n",
            self.path, self.address
        );
        stream
            .write_all(request.as_bytes())
            .await
            .map_err(|e| ProbeError::failed(format!("write failed: {}", e)))?;

        // Only the status line is needed, however many reads it arrives in
        let mut reader = BufReader::new(stream.take(MAX_STATUS_LINE));
        let mut status_line = Vec::new();
        let n = reader
            .read_until(b'\n', &mut status_line)
            .await
            .map_err(|e| ProbeError::failed(format!("read failed: {}", e)))?;
        if n == 0 {
            return Err(ProbeError::failed("empty response"));
        }

        let response = String::from_utf8_lossy(&status_line);
        let status = parse_http_status(&response).map_err(ProbeError::Failed)?;

        if status != self.expected_status {
            return Err(ProbeError::failed(format!(
                "unexpected status: {} (expected {})",
                status, self.expected_status
            )));
        }

        Ok(latency_outcome(start.elapsed(), self.degraded_after)
            .with_data("address", self.address.to_string())
            .with_data("status", status))
    }
}

fn latency_outcome(latency: Duration, degraded_after: Option<Duration>) -> Outcome {
    let outcome = match degraded_after {
        Some(threshold) if latency > threshold => Outcome::degraded(format!(
            "slow response: {} exceeds {}",
            humantime::format_duration(latency),
            humantime::format_duration(threshold)
        )),
        _ => Outcome::healthy(),
    };
    outcome.with_data("latency_ms", latency.as_millis() as u64)
}

/// Parse HTTP status code from response.
fn parse_http_status(response: &str) -> Result<u16, String> {
    // Format: "HTTP/1.1 200 OK\r\n..."
    let parts: Vec<&str> = response.split_whitespace().collect();
    if parts.len() < 2 {
        return Err("invalid HTTP response".to_string());
    }

    parts[1]
        .parse()
        .map_err(|_| "invalid status code".to_string())
}

/// Build the probe described by a configuration entry.
pub fn probe_from_config(config: &ProbeConfig) -> Arc<dyn Probe> {
    match config {
        ProbeConfig::Tcp {
            address,
            degraded_after,
        } => Arc::new(TcpProbe::new(*address).degraded_after(*degraded_after)),
        ProbeConfig::Http {
            address,
            path,
            expected_status,
            degraded_after,
        } => Arc::new(
            HttpProbe::new(*address, path.as_deref().unwrap_or("/"), *expected_status)
                .degraded_after(*degraded_after),
        ),
    }
}

/// Build one registration per configured check.
pub fn registrations_from_config(config: &Config) -> Vec<Registration> {
    config
        .checks
        .iter()
        .map(|check| {
            Registration::from_arc(check.name.clone(), probe_from_config(&check.probe))
                .with_tags(check.tags.iter().cloned())
        })
        .collect()
}
