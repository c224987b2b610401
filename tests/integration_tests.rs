//! Integration tests for pulsecheck.
//!
//! These tests drive the engine from configuration files against real
//! sockets and query the status server over HTTP.

use pulsecheck::config::{load_config, Config, ConfigProvider, SharedConfig};
use pulsecheck::health::{
    probe_fn, registrations_from_config, CheckMetadata, Engine, HealthStatus, Outcome, ProbeContext, Registration,
};
use pulsecheck::metrics::{MetricsCollector, StatusServer};
use pulsecheck::util::ShutdownSignal;
use std::io::Write;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::NamedTempFile;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

/// Helper to create a TCP server that accepts and drops connections.
async fn start_tcp_server() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("failed to bind");
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            drop(stream);
        }
    });

    addr
}

/// Helper to create an HTTP server answering every request with `status`.
async fn start_http_server(status: u16) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("failed to bind");
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        while let Ok((mut stream, _)) = listener.accept().await {
            tokio::spawn(async move {
                let mut buf = [0u8; 4096];
                let _ = stream.read(&mut buf).await;
                let response = format!(
                    "HTTP/1.1 {status} Status\r\nContent-Length: 0\r\nConnection: close\r\n\r\n"
                );
                let _ = stream.write_all(response.as_bytes()).await;
            });
        }
    });

    addr
}

/// An address nothing listens on.
async fn closed_port() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    addr
}

fn write_config(contents: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file.flush().unwrap();
    file
}

async fn http_get(addr: SocketAddr, path: &str) -> (u16, String) {
    let mut stream = TcpStream::connect(addr).await.expect("failed to connect");
    let request = format!("GET {path} HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n");
    stream.write_all(request.as_bytes()).await.unwrap();

    let mut response = String::new();
    stream.read_to_string(&mut response).await.unwrap();

    let status = response
        .split_whitespace()
        .nth(1)
        .and_then(|s| s.parse().ok())
        .expect("missing status line");
    let body = response
        .split_once("\r\n\r\n")
        .map(|(_, body)| body.to_string())
        .unwrap_or_default();
    (status, body)
}

async fn wait_for_entries(service: &pulsecheck::HealthService, count: usize) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while service.check_health(None).entries.len() < count {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("checks did not report in time");
}

#[tokio::test]
async fn test_engine_from_config_file() {
    let tcp = start_tcp_server().await;
    let http_ok = start_http_server(200).await;
    let http_down = start_http_server(503).await;
    let closed = closed_port().await;

    let file = write_config(&format!(
        r#"
global:
  log_level: debug
checks:
  - name: cache
    tags: [ready]
    probe:
      type: tcp
      address: "{tcp}"
  - name: api
    tags: [ready]
    probe:
      type: http
      address: "{http_ok}"
      path: /healthz
  - name: upstream
    probe:
      type: http
      address: "{http_down}"
      path: /
  - name: db
    interval_array_seconds: [1, 2]
    probe:
      type: tcp
      address: "{closed}"
"#
    ));

    let config = load_config(file.path()).unwrap();
    let registrations = registrations_from_config(&config);
    let engine = Engine::new(registrations, Arc::new(SharedConfig::new(config))).unwrap();
    let service = engine.health_service();
    let shutdown = ShutdownSignal::new();
    let task = tokio::spawn(engine.start(shutdown.clone()));

    wait_for_entries(&service, 4).await;

    let report = service.check_health(None);
    assert_eq!(report.status, HealthStatus::Unhealthy);
    assert_eq!(report.entries["cache"].status(), HealthStatus::Healthy);
    assert_eq!(report.entries["api"].status(), HealthStatus::Healthy);
    assert_eq!(report.entries["upstream"].status(), HealthStatus::Unhealthy);
    assert_eq!(report.entries["db"].status(), HealthStatus::Unhealthy);
    assert!(report.entries["db"].error().is_some());

    let ready = service.check_health(Some(&|m: &CheckMetadata| m.has_tag("ready")));
    assert_eq!(ready.status, HealthStatus::Healthy);
    assert_eq!(ready.entries.len(), 2);

    shutdown.shutdown();
    task.await.unwrap();
}

#[tokio::test]
async fn test_status_server_reports_engine_results() {
    let engine = Engine::new(
        vec![
            Registration::new("ok", probe_fn(|_ctx: ProbeContext| async { Ok(Outcome::healthy()) })),
            Registration::new(
                "slow",
                probe_fn(|_ctx: ProbeContext| async { Ok(Outcome::degraded("queue backlog")) }),
            ),
        ],
        Arc::new(pulsecheck::config::MemoryConfig::new()),
    )
    .unwrap();
    let metrics = MetricsCollector::new();
    let engine = engine.with_metrics(metrics.clone());
    let service = engine.health_service();

    let config = pulsecheck::config::ServerConfig {
        address: "127.0.0.1:0".parse().unwrap(),
        ..Default::default()
    };
    let server = StatusServer::new(&config, service.clone(), metrics)
        .bind()
        .await
        .unwrap();
    let addr = server.local_addr().unwrap();

    let shutdown = ShutdownSignal::new();
    let server_task = tokio::spawn(server.run(shutdown.clone()));
    let engine_task = tokio::spawn(engine.start(shutdown.clone()));

    wait_for_entries(&service, 2).await;

    let (status, body) = http_get(addr, "/health").await;
    assert_eq!(status, 200);
    let json: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert_eq!(json["status"], "Degraded");
    assert_eq!(json["entries"]["slow"]["description"], "queue backlog");

    let (status, body) = http_get(addr, "/metrics").await;
    assert_eq!(status, 200);
    assert!(body.contains("pulsecheck_checks_total{check=\"ok\",result=\"Healthy\"}"));

    let (status, _) = http_get(addr, "/missing").await;
    assert_eq!(status, 404);

    shutdown.shutdown();
    engine_task.await.unwrap();
    server_task.await.unwrap();
}

#[tokio::test]
async fn test_invalid_config_file_rejected() {
    let file = write_config(
        r#"
checks:
  - name: web
    timeout_seconds: 0
    probe:
      type: http
      address: "127.0.0.1:8080"
"#,
    );

    let result = load_config(file.path());
    assert!(result.is_err());
}

#[tokio::test]
async fn test_engine_reads_settings_from_shared_config() {
    let file = write_config(
        r#"
checks:
  - name: counter
    interval_seconds: 3600
    probe:
      type: tcp
      address: "127.0.0.1:1"
"#,
    );
    let shared = SharedConfig::new(load_config(file.path()).unwrap());

    let runs = Arc::new(AtomicU32::new(0));
    let counter = Arc::clone(&runs);
    let engine = Engine::new(
        vec![Registration::new(
            "counter",
            probe_fn(move |_ctx: ProbeContext| {
                let counter = Arc::clone(&counter);
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(Outcome::healthy())
                }
            }),
        )],
        Arc::new(shared.clone()),
    )
    .unwrap();

    assert_eq!(shared.get_integer("counter/IntervalSeconds").unwrap(), Some(3600));

    let mut reloaded = Config::clone(&shared.load());
    reloaded.checks[0].interval_seconds = Some(1);
    shared.store(reloaded);

    let shutdown = ShutdownSignal::new();
    let task = tokio::spawn(engine.start(shutdown.clone()));

    tokio::time::timeout(Duration::from_secs(5), async {
        while runs.load(Ordering::SeqCst) < 2 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("reloaded interval was not applied");

    shutdown.shutdown();
    task.await.unwrap();
}
