use std::{env, time::Duration};

use log::*;
use p2p_common::helpers::{parse_millis, parse_seconds};
use url::Url;

use crate::{
    batcher::DEFAULT_BATCH_WINDOW,
    dedup::{DEFAULT_DEDUP_WINDOW, DEFAULT_EVICTION_AGE, DEFAULT_SOFT_CAP},
    pipeline::PipelineSettings,
    socket::ReconnectPolicy,
    SyncError,
};

const DEFAULT_SERVER_URL: &str = "http://127.0.0.1:8360";
const DEFAULT_QUEUE_SIZE: usize = 1024;

#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// The order server's REST interface
    pub server_url: String,
    /// The fallback socket. No socket is opened when this is unset.
    pub socket_url: Option<String>,
    pub batch_window: Duration,
    pub dedup_window: Duration,
    pub dedup_eviction_age: Duration,
    pub dedup_soft_cap: usize,
    pub reconnect: ReconnectPolicy,
    /// Capacity of a session's pipeline queue
    pub queue_size: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            server_url: DEFAULT_SERVER_URL.to_string(),
            socket_url: None,
            batch_window: DEFAULT_BATCH_WINDOW,
            dedup_window: DEFAULT_DEDUP_WINDOW,
            dedup_eviction_age: DEFAULT_EVICTION_AGE,
            dedup_soft_cap: DEFAULT_SOFT_CAP,
            reconnect: ReconnectPolicy::default(),
            queue_size: DEFAULT_QUEUE_SIZE,
        }
    }
}

impl SyncConfig {
    pub fn from_env_or_default() -> Self {
        let defaults = Self::default();
        let server_url = env::var("P2P_SYNC_SERVER_URL").ok().unwrap_or_else(|| {
            info!("🪛️ P2P_SYNC_SERVER_URL is not set. Using {DEFAULT_SERVER_URL}");
            defaults.server_url.clone()
        });
        let socket_url = env::var("P2P_SYNC_SOCKET_URL").ok().filter(|s| !s.trim().is_empty());
        if socket_url.is_none() {
            info!("🪛️ P2P_SYNC_SOCKET_URL is not set. The fallback socket is disabled.");
        }
        let batch_window = millis_var("P2P_SYNC_BATCH_WINDOW_MS", defaults.batch_window);
        let dedup_window = millis_var("P2P_SYNC_DEDUP_WINDOW_MS", defaults.dedup_window);
        let dedup_eviction_age = parse_seconds(env::var("P2P_SYNC_DEDUP_EVICTION_SECS").ok())
            .unwrap_or(defaults.dedup_eviction_age);
        let dedup_soft_cap = usize_var("P2P_SYNC_DEDUP_SOFT_CAP", defaults.dedup_soft_cap);
        let reconnect = ReconnectPolicy {
            base_delay: millis_var("P2P_SYNC_RECONNECT_BASE_MS", defaults.reconnect.base_delay),
            max_delay: millis_var("P2P_SYNC_RECONNECT_MAX_MS", defaults.reconnect.max_delay),
            max_attempts: usize_var("P2P_SYNC_RECONNECT_ATTEMPTS", defaults.reconnect.max_attempts as usize) as u32,
        };
        let queue_size = usize_var("P2P_SYNC_QUEUE_SIZE", defaults.queue_size);
        Self {
            server_url,
            socket_url,
            batch_window,
            dedup_window,
            dedup_eviction_age,
            dedup_soft_cap,
            reconnect,
            queue_size,
        }
    }

    pub fn server_url(&self) -> Result<Url, SyncError> {
        Ok(Url::parse(&self.server_url)?)
    }

    pub(crate) fn pipeline_settings(&self) -> PipelineSettings {
        PipelineSettings {
            batch_window: self.batch_window,
            dedup_window: self.dedup_window,
            eviction_age: self.dedup_eviction_age,
            dedup_soft_cap: self.dedup_soft_cap,
            queue_size: self.queue_size,
        }
    }
}

fn millis_var(name: &str, default: Duration) -> Duration {
    let value = env::var(name).ok();
    match (parse_millis(value.clone()), value) {
        (Some(d), _) => d,
        (None, Some(v)) => {
            warn!("🪛️ {v} is not a valid number of milliseconds for {name}. Using {}ms", default.as_millis());
            default
        },
        (None, None) => default,
    }
}

fn usize_var(name: &str, default: usize) -> usize {
    match env::var(name) {
        Ok(v) => v.trim().parse().unwrap_or_else(|e| {
            warn!("🪛️ {v} is not a valid value for {name}. {e} Using {default}");
            default
        }),
        Err(_) => default,
    }
}
