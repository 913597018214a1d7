//! Server configuration read from `FLEETWATCH_*` environment variables.
//!
//! Unset or unparsable values keep their defaults.

use std::time::Duration;

use fleetwatch_alerts::AlertConfig;
use fleetwatch_core::models::recipient::Channel;
use fleetwatch_db::DbConfig;
use tracing::warn;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub db: DbConfig,
    pub alerts: AlertConfig,
    /// Delay between polls of the event queue (default: 500 ms).
    pub poll_interval: Duration,
    /// Delay between stale-claim sweeps (default: 60 s).
    pub sweep_interval: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            db: DbConfig::default(),
            alerts: AlertConfig::default(),
            poll_interval: Duration::from_millis(500),
            sweep_interval: Duration::from_secs(60),
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(url) = lookup("FLEETWATCH_DB_URL") {
            config.db.url = url;
        }
        if let Some(ns) = lookup("FLEETWATCH_DB_NS") {
            config.db.namespace = ns;
        }
        if let Some(name) = lookup("FLEETWATCH_DB_NAME") {
            config.db.database = name;
        }
        if let Some(user) = lookup("FLEETWATCH_DB_USER") {
            config.db.username = user;
        }
        if let Some(pass) = lookup("FLEETWATCH_DB_PASS") {
            config.db.password = pass;
        }
        if let Some(workers) = parsed(&lookup, "FLEETWATCH_WORKERS") {
            config.alerts.worker_count = workers;
        }
        if let Some(capacity) = parsed(&lookup, "FLEETWATCH_QUEUE_CAPACITY") {
            config.alerts.queue_capacity = capacity;
        }
        if let Some(ms) = parsed(&lookup, "FLEETWATCH_POLL_INTERVAL_MS") {
            config.poll_interval = Duration::from_millis(ms);
        }
        if let Some(secs) = parsed(&lookup, "FLEETWATCH_SWEEP_INTERVAL_SECS") {
            config.sweep_interval = Duration::from_secs(secs);
        }
        if let Some(list) = lookup("FLEETWATCH_DISABLED_CHANNELS") {
            config.alerts.disabled_channels = parse_channels(&list);
        }

        config
    }
}

fn parsed<T: std::str::FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    let raw = lookup(key)?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!(key, value = %raw, "Ignoring unparsable setting");
            None
        }
    }
}

/// Comma-separated channel names, e.g. `email,messaging`.
fn parse_channels(list: &str) -> Vec<Channel> {
    let mut channels = Vec::new();
    for name in list.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        match Channel::ALL.iter().find(|c| c.as_str().eq_ignore_ascii_case(name)) {
            Some(channel) if !channels.contains(channel) => channels.push(*channel),
            Some(_) => {}
            None => warn!(channel = name, "Ignoring unknown channel"),
        }
    }
    channels
}
