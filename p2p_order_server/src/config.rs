use std::{env, time::Duration};

use log::*;
use p2p_common::{
    helpers::{parse_boolean_flag, parse_seconds},
    Secret,
};
use url::Url;

const DEFAULT_P2P_HOST: &str = "127.0.0.1";
const DEFAULT_P2P_PORT: u16 = 8360;
const DEFAULT_BUMP_POLL_INTERVAL: Duration = Duration::from_secs(10);
const DEFAULT_EXPIRY_POLL_INTERVAL: Duration = Duration::from_secs(60);
const DEFAULT_ORDER_TTL: Duration = Duration::from_secs(30 * 60);
const DEFAULT_EVENT_BUFFER_SIZE: usize = 256;

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    pub escrow: EscrowConfig,
    /// How often the auto-bump worker looks for pool entries that are due a bump.
    pub bump_poll_interval: Duration,
    /// How often the expiry worker looks for overdue orders.
    pub expiry_poll_interval: Duration,
    /// Orders created without their own time-to-live expire after this long.
    pub default_order_ttl: Duration,
    /// Capacity of the queue between the order flow and the event hooks.
    pub event_buffer_size: usize,
    /// If true, the server runs the expiry and auto-bump workers itself. Set this to false when the workers run as
    /// separate processes.
    pub run_embedded_workers: bool,
}

/// Where the escrow program's RPC lives. With no url configured, releases and refunds fail.
#[derive(Clone, Debug, Default)]
pub struct EscrowConfig {
    pub url: Option<Url>,
    pub api_key: Secret<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_P2P_HOST.to_string(),
            port: DEFAULT_P2P_PORT,
            database_url: String::default(),
            escrow: EscrowConfig::default(),
            bump_poll_interval: DEFAULT_BUMP_POLL_INTERVAL,
            expiry_poll_interval: DEFAULT_EXPIRY_POLL_INTERVAL,
            default_order_ttl: DEFAULT_ORDER_TTL,
            event_buffer_size: DEFAULT_EVENT_BUFFER_SIZE,
            run_embedded_workers: true,
        }
    }
}

impl ServerConfig {
    pub fn new(host: &str, port: u16) -> Self {
        Self { host: host.to_string(), port, ..Default::default() }
    }

    pub fn from_env_or_default() -> Self {
        let host = env::var("P2P_HOST").ok().unwrap_or_else(|| DEFAULT_P2P_HOST.into());
        let port = env::var("P2P_PORT")
            .map(|s| {
                s.parse::<u16>().unwrap_or_else(|e| {
                    error!(
                        "🪛️ {s} is not a valid port for P2P_PORT. {e} Using the default, {DEFAULT_P2P_PORT}, instead."
                    );
                    DEFAULT_P2P_PORT
                })
            })
            .ok()
            .unwrap_or(DEFAULT_P2P_PORT);
        let database_url = env::var("P2P_DATABASE_URL").ok().unwrap_or_else(|| {
            error!("🪛️ P2P_DATABASE_URL is not set. Please set it to the URL for the order database.");
            String::default()
        });
        let escrow = EscrowConfig::from_env_or_default();
        let bump_poll_interval = duration_from_env("P2P_BUMP_POLL_INTERVAL", DEFAULT_BUMP_POLL_INTERVAL);
        let expiry_poll_interval = duration_from_env("P2P_EXPIRY_POLL_INTERVAL", DEFAULT_EXPIRY_POLL_INTERVAL);
        let default_order_ttl = duration_from_env("P2P_DEFAULT_ORDER_TTL", DEFAULT_ORDER_TTL);
        let event_buffer_size = env::var("P2P_EVENT_BUFFER_SIZE")
            .ok()
            .and_then(|s| match s.parse::<usize>() {
                Ok(0) | Err(_) => {
                    warn!(
                        "🪛️ {s} is not a valid value for P2P_EVENT_BUFFER_SIZE. Using the default, \
                         {DEFAULT_EVENT_BUFFER_SIZE}, instead."
                    );
                    None
                },
                Ok(n) => Some(n),
            })
            .unwrap_or(DEFAULT_EVENT_BUFFER_SIZE);
        let run_embedded_workers = parse_boolean_flag(env::var("P2P_RUN_EMBEDDED_WORKERS").ok(), true);
        if !run_embedded_workers {
            info!("🪛️ Embedded workers are disabled. Make sure the expiry and auction workers run elsewhere.");
        }
        Self {
            host,
            port,
            database_url,
            escrow,
            bump_poll_interval,
            expiry_poll_interval,
            default_order_ttl,
            event_buffer_size,
            run_embedded_workers,
        }
    }

    pub fn default_order_ttl(&self) -> chrono::Duration {
        chrono::Duration::from_std(self.default_order_ttl).unwrap_or_else(|_| chrono::Duration::minutes(30))
    }
}

impl EscrowConfig {
    pub fn from_env_or_default() -> Self {
        let url = env::var("P2P_ESCROW_SERVICE_URL").ok().and_then(|s| {
            Url::parse(&s)
                .map_err(|e| error!("🪛️ {s} is not a valid url for P2P_ESCROW_SERVICE_URL. {e}"))
                .ok()
        });
        if url.is_none() {
            warn!("🪛️ No escrow service is configured. Escrow releases and refunds will fail.");
        }
        let api_key = env::var("P2P_ESCROW_API_KEY").ok().unwrap_or_else(|| {
            if url.is_some() {
                warn!("🪛️ P2P_ESCROW_API_KEY is not set. Requests to the escrow service will not be authenticated.");
            }
            String::default()
        });
        Self { url, api_key: Secret::new(api_key) }
    }
}

fn duration_from_env(name: &str, default: Duration) -> Duration {
    let value = env::var(name).ok();
    match parse_seconds(value.clone()) {
        Some(d) if !d.is_zero() => d,
        _ => {
            if let Some(v) = value {
                warn!("🪛️ {v} is not a valid number of seconds for {name}. Using the default, {default:?}, instead.");
            }
            default
        },
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.port, 8360);
        assert_eq!(config.bump_poll_interval, Duration::from_secs(10));
        assert_eq!(config.expiry_poll_interval, Duration::from_secs(60));
        assert_eq!(config.default_order_ttl(), chrono::Duration::minutes(30));
        assert_eq!(config.event_buffer_size, 256);
        assert!(config.run_embedded_workers);
        assert!(config.escrow.url.is_none());
    }

    #[test]
    fn zero_durations_fall_back_to_the_default() {
        assert_eq!(duration_from_env("P2P_TEST_UNSET_INTERVAL", Duration::from_secs(7)), Duration::from_secs(7));
    }
}
