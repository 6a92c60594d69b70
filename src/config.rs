use std::net::{IpAddr, Ipv4Addr};
use std::str::FromStr;

use crate::constants::timing;

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ConfigError {
    #[error("Port cannot be 0")]
    ZeroPort,
    #[error("tick_rate must be 1-240, got {0}")]
    TickRate(u32),
    #[error("max_players must be at least 1")]
    MaxPlayers,
    #[error("{0} must be positive")]
    Interval(&'static str),
}

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind the server to
    pub bind_address: IpAddr,
    /// Port to listen on
    pub port: u16,
    /// Simulation ticks per second
    pub tick_rate: u32,
    pub arena_name: String,
    pub arena_motd: String,
    /// Environment (map) the arena starts with
    pub arena_environment: String,
    pub max_players: usize,
    /// Password granting admin through `rcon password`; admin is
    /// unreachable when unset
    pub rcon_password: Option<String>,
    /// Seconds between latency pings
    pub ping_interval: f32,
    /// Seconds between latency broadcasts
    pub latency_update_interval: f32,
    /// Metrics HTTP port, 0 disables the endpoint
    pub metrics_port: u16,
    /// Path to TLS certificate file (if not using the dev certificate)
    pub tls_cert_path: Option<String>,
    /// Path to TLS key file (if not using the dev certificate)
    pub tls_key_path: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: IpAddr::V4(Ipv4Addr::new(0, 0, 0, 0)),
            port: 4433,
            tick_rate: timing::TICK_RATE,
            arena_name: "skyward arena".to_string(),
            arena_motd: String::new(),
            arena_environment: "default.json".to_string(),
            max_players: 32,
            rcon_password: None,
            ping_interval: 1.0,
            latency_update_interval: 2.0,
            metrics_port: 9090,
            tls_cert_path: None,
            tls_key_path: None,
        }
    }
}

/// Parse `name` into `target` when set; warn and keep the default otherwise
fn read_env<T: FromStr>(name: &str, target: &mut T, accept: impl Fn(&T) -> bool) {
    let Ok(raw) = std::env::var(name) else {
        return;
    };
    match raw.parse::<T>() {
        Ok(parsed) if accept(&parsed) => *target = parsed,
        Ok(_) => tracing::warn!("{} '{}' out of range, using default", name, raw),
        Err(_) => tracing::warn!("Invalid {} '{}', using default", name, raw),
    }
}

impl ServerConfig {
    /// Load config from environment or use defaults
    pub fn load_or_default() -> Self {
        let mut config = Self::default();

        read_env("BIND_ADDRESS", &mut config.bind_address, |_| true);
        read_env("PORT", &mut config.port, |p| *p > 0);
        read_env("TICK_RATE", &mut config.tick_rate, |t| (1..=240).contains(t));
        read_env("MAX_PLAYERS", &mut config.max_players, |m| *m > 0);
        read_env("PING_INTERVAL_SECS", &mut config.ping_interval, |s| *s > 0.0);
        read_env("LATENCY_UPDATE_SECS", &mut config.latency_update_interval, |s| *s > 0.0);
        read_env("METRICS_PORT", &mut config.metrics_port, |_| true);

        if let Ok(name) = std::env::var("ARENA_NAME") {
            config.arena_name = name;
        }
        if let Ok(motd) = std::env::var("ARENA_MOTD") {
            config.arena_motd = motd;
        }
        if let Ok(environment) = std::env::var("ARENA_ENVIRONMENT") {
            config.arena_environment = environment;
        }
        config.rcon_password = std::env::var("RCON_PASSWORD").ok().filter(|p| !p.is_empty());
        config.tls_cert_path = std::env::var("TLS_CERT_PATH").ok();
        config.tls_key_path = std::env::var("TLS_KEY_PATH").ok();

        config
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.port == 0 {
            return Err(ConfigError::ZeroPort);
        }
        if !(1..=240).contains(&self.tick_rate) {
            return Err(ConfigError::TickRate(self.tick_rate));
        }
        if self.max_players == 0 {
            return Err(ConfigError::MaxPlayers);
        }
        if !(self.ping_interval > 0.0) {
            return Err(ConfigError::Interval("ping_interval"));
        }
        if !(self.latency_update_interval > 0.0) {
            return Err(ConfigError::Interval("latency_update_interval"));
        }
        Ok(())
    }

    /// Seconds per simulation tick
    pub fn tick_delta(&self) -> f32 {
        1.0 / self.tick_rate as f32
    }
}
