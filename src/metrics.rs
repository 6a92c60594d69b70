//! Prometheus-compatible metrics endpoint
//!
//! Exposes server metrics in Prometheus format.
//! Default endpoint: http://localhost:9090/metrics

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tracing::{debug, info};

const TICK_HISTORY: usize = 1000;

/// Metrics registry for the server
#[derive(Debug)]
pub struct Metrics {
    // Arena
    pub peers_connected: AtomicU64,
    pub players_joined: AtomicU64,
    pub planes_spawned: AtomicU64,
    pub components: AtomicU64,

    // Tick timing (microseconds)
    pub tick_time_us: AtomicU64,
    pub tick_time_p95_us: AtomicU64,
    pub tick_time_p99_us: AtomicU64,
    pub tick_time_max_us: AtomicU64,
    pub tick_count: AtomicU64,

    // Network
    pub packets_sent: AtomicU64,
    pub packets_received: AtomicU64,
    pub bytes_sent: AtomicU64,
    pub bytes_received: AtomicU64,
    pub packets_malformed: AtomicU64,
    pub input_violations: AtomicU64,
    pub datagram_fallbacks: AtomicU64,

    start_time: Instant,

    // Rolling tick times for percentile calculation
    tick_history: RwLock<VecDeque<u64>>,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            peers_connected: AtomicU64::new(0),
            players_joined: AtomicU64::new(0),
            planes_spawned: AtomicU64::new(0),
            components: AtomicU64::new(0),
            tick_time_us: AtomicU64::new(0),
            tick_time_p95_us: AtomicU64::new(0),
            tick_time_p99_us: AtomicU64::new(0),
            tick_time_max_us: AtomicU64::new(0),
            tick_count: AtomicU64::new(0),
            packets_sent: AtomicU64::new(0),
            packets_received: AtomicU64::new(0),
            bytes_sent: AtomicU64::new(0),
            bytes_received: AtomicU64::new(0),
            packets_malformed: AtomicU64::new(0),
            input_violations: AtomicU64::new(0),
            datagram_fallbacks: AtomicU64::new(0),
            start_time: Instant::now(),
            tick_history: RwLock::new(VecDeque::with_capacity(TICK_HISTORY)),
        }
    }

    /// Record a tick time and update percentiles
    pub fn record_tick_time(&self, duration: Duration) {
        let us = duration.as_micros() as u64;
        self.tick_time_us.store(us, Ordering::Relaxed);
        self.tick_count.fetch_add(1, Ordering::Relaxed);

        let mut history = self.tick_history.write();
        history.push_back(us);
        while history.len() > TICK_HISTORY {
            history.pop_front();
        }

        if history.len() >= 10 {
            let mut sorted: Vec<u64> = history.iter().copied().collect();
            sorted.sort_unstable();

            let p95_idx = (sorted.len() as f32 * 0.95) as usize;
            let p99_idx = (sorted.len() as f32 * 0.99) as usize;

            self.tick_time_p95_us.store(sorted[p95_idx.min(sorted.len() - 1)], Ordering::Relaxed);
            self.tick_time_p99_us.store(sorted[p99_idx.min(sorted.len() - 1)], Ordering::Relaxed);
            self.tick_time_max_us.store(sorted.last().copied().unwrap_or(0), Ordering::Relaxed);
        }
    }

    pub fn record_sent(&self, bytes: usize) {
        self.packets_sent.fetch_add(1, Ordering::Relaxed);
        self.bytes_sent.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    pub fn record_received(&self, bytes: usize) {
        self.packets_received.fetch_add(1, Ordering::Relaxed);
        self.bytes_received.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    pub fn record_malformed(&self) {
        self.packets_malformed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_input_violation(&self) {
        self.input_violations.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_datagram_fallback(&self) {
        self.datagram_fallbacks.fetch_add(1, Ordering::Relaxed);
    }

    /// Get uptime in seconds
    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    /// Generate Prometheus-format metrics output
    pub fn to_prometheus(&self) -> String {
        let mut output = String::with_capacity(2048);

        macro_rules! metric {
            ($name:expr, $help:expr, $type:expr, $value:expr) => {
                output.push_str(&format!(
                    "# HELP {} {}\n# TYPE {} {}\n{} {}\n",
                    $name, $help, $name, $type, $name, $value
                ));
            };
        }

        metric!("skyward_peers_connected", "Connected transport peers", "gauge",
            self.peers_connected.load(Ordering::Relaxed));
        metric!("skyward_players_joined", "Players joined to the arena", "gauge",
            self.players_joined.load(Ordering::Relaxed));
        metric!("skyward_planes_spawned", "Spawned planes", "gauge",
            self.planes_spawned.load(Ordering::Relaxed));
        metric!("skyward_components", "Entities, explosions and home bases", "gauge",
            self.components.load(Ordering::Relaxed));

        metric!("skyward_tick_time_microseconds", "Current tick time in microseconds", "gauge",
            self.tick_time_us.load(Ordering::Relaxed));
        metric!("skyward_tick_time_p95_microseconds", "95th percentile tick time", "gauge",
            self.tick_time_p95_us.load(Ordering::Relaxed));
        metric!("skyward_tick_time_p99_microseconds", "99th percentile tick time", "gauge",
            self.tick_time_p99_us.load(Ordering::Relaxed));
        metric!("skyward_tick_time_max_microseconds", "Maximum tick time", "gauge",
            self.tick_time_max_us.load(Ordering::Relaxed));
        metric!("skyward_tick_count", "Total ticks processed", "counter",
            self.tick_count.load(Ordering::Relaxed));

        metric!("skyward_packets_sent_total", "Total packets sent", "counter",
            self.packets_sent.load(Ordering::Relaxed));
        metric!("skyward_packets_received_total", "Total packets received", "counter",
            self.packets_received.load(Ordering::Relaxed));
        metric!("skyward_bytes_sent_total", "Total bytes sent", "counter",
            self.bytes_sent.load(Ordering::Relaxed));
        metric!("skyward_bytes_received_total", "Total bytes received", "counter",
            self.bytes_received.load(Ordering::Relaxed));
        metric!("skyward_packets_malformed_total", "Packets dropped as malformed", "counter",
            self.packets_malformed.load(Ordering::Relaxed));
        metric!("skyward_input_violations_total", "Client inputs rejected by validation", "counter",
            self.input_violations.load(Ordering::Relaxed));
        metric!("skyward_datagram_fallbacks_total", "Unreliable packets sent on the stream instead of a datagram", "counter",
            self.datagram_fallbacks.load(Ordering::Relaxed));

        metric!("skyward_uptime_seconds", "Server uptime in seconds", "counter",
            self.uptime_seconds());

        output
    }

    /// Generate JSON format metrics
    pub fn to_json(&self) -> String {
        format!(r#"{{
  "arena": {{
    "peers": {},
    "players": {},
    "planes": {},
    "components": {}
  }},
  "performance": {{
    "tick_time_us": {},
    "tick_time_p95_us": {},
    "tick_time_p99_us": {},
    "tick_time_max_us": {},
    "tick_count": {}
  }},
  "network": {{
    "packets_sent": {},
    "packets_received": {},
    "bytes_sent": {},
    "bytes_received": {},
    "packets_malformed": {},
    "input_violations": {},
    "datagram_fallbacks": {}
  }},
  "uptime_seconds": {}
}}"#,
            self.peers_connected.load(Ordering::Relaxed),
            self.players_joined.load(Ordering::Relaxed),
            self.planes_spawned.load(Ordering::Relaxed),
            self.components.load(Ordering::Relaxed),
            self.tick_time_us.load(Ordering::Relaxed),
            self.tick_time_p95_us.load(Ordering::Relaxed),
            self.tick_time_p99_us.load(Ordering::Relaxed),
            self.tick_time_max_us.load(Ordering::Relaxed),
            self.tick_count.load(Ordering::Relaxed),
            self.packets_sent.load(Ordering::Relaxed),
            self.packets_received.load(Ordering::Relaxed),
            self.bytes_sent.load(Ordering::Relaxed),
            self.bytes_received.load(Ordering::Relaxed),
            self.packets_malformed.load(Ordering::Relaxed),
            self.input_violations.load(Ordering::Relaxed),
            self.datagram_fallbacks.load(Ordering::Relaxed),
            self.uptime_seconds(),
        )
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

fn http_response(content_type: &str, body: &str) -> String {
    format!(
        "HTTP/1.1 200 OK\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        content_type,
        body.len(),
        body
    )
}

/// Start the metrics HTTP server
pub async fn start_metrics_server(metrics: Arc<Metrics>, port: u16) -> anyhow::Result<()> {
    let addr = format!("0.0.0.0:{}", port);
    let listener = TcpListener::bind(&addr).await?;

    info!("Metrics server listening on http://{}/metrics", addr);

    loop {
        let (mut socket, peer) = listener.accept().await?;
        let metrics = metrics.clone();

        tokio::spawn(async move {
            let mut buffer = [0u8; 1024];

            match socket.read(&mut buffer).await {
                Ok(n) if n > 0 => {
                    let request = String::from_utf8_lossy(&buffer[..n]);

                    let response = if request.starts_with("GET /metrics/json") {
                        http_response("application/json", &metrics.to_json())
                    } else if request.starts_with("GET /metrics") {
                        http_response("text/plain; version=0.0.4", &metrics.to_prometheus())
                    } else if request.starts_with("GET /health") {
                        http_response("text/plain", "OK")
                    } else {
                        "HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n".to_string()
                    };

                    if let Err(e) = socket.write_all(response.as_bytes()).await {
                        debug!("Failed to write metrics response to {}: {}", peer, e);
                    }
                }
                Ok(_) => {}
                Err(e) => {
                    debug!("Failed to read from metrics socket {}: {}", peer, e);
                }
            }
        });
    }
}
