//! Process settings.
//!
//! The CDB provides the deployment-wide defaults; a handful of
//! environment variables override them per process, which is how
//! operators tune a single supervisor without touching the store.

use std::time::Duration;

use tracing::warn;

use alarmflow_cdb::IasConfig;
use alarmflow_core::dasu::DasuOptions;

/// Auto-refresh period override, seconds.
pub const AUTO_SEND_PERIOD_ENV: &str = "AUTO_SEND_PERIOD";
/// Validity tolerance override, seconds.
pub const TOLERANCE_ENV: &str = "TOLERANCE";
/// Throttling window override, milliseconds.
pub const THROTTLING_ENV: &str = "THROTTLING_MIN_INTERVAL_MS";
/// Broker list override.
pub const BROKERS_ENV: &str = "BROKERS";
/// Statistics period override, minutes (0 disables).
pub const STATS_PERIOD_ENV: &str = "STATS_PERIOD_MIN";

/// Default statistics period, minutes.
const DEFAULT_STATS_PERIOD_MIN: u64 = 10;

/// Resolved runtime settings of one supervisor process.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Knobs handed to every DASU.
    pub dasu_options: DasuOptions,
    /// Broker list for the bus connections.
    pub brokers: String,
    /// Heartbeat period.
    pub hb_period: Duration,
    /// Statistics period; zero disables periodic statistics.
    pub stats_period: Duration,
}

impl Settings {
    /// Combines the global CDB configuration with the environment
    /// overrides. Unparseable overrides are logged and ignored.
    #[must_use]
    pub fn resolve(ias: &IasConfig) -> Self {
        let mut options = DasuOptions {
            auto_send_period: Duration::from_secs(ias.refresh_rate_secs),
            tolerance: Duration::from_secs(ias.validity_threshold_secs),
            ..DasuOptions::default()
        };
        if let Some(secs) = env_parsed::<u64>(AUTO_SEND_PERIOD_ENV) {
            options.auto_send_period = Duration::from_secs(secs);
        }
        if let Some(secs) = env_parsed::<u64>(TOLERANCE_ENV) {
            options.tolerance = Duration::from_secs(secs);
        }
        if let Some(ms) = env_parsed::<u64>(THROTTLING_ENV) {
            options.throttling_min_interval = Duration::from_millis(ms);
        }
        let brokers =
            std::env::var(BROKERS_ENV).unwrap_or_else(|_| ias.bsdb_url.clone());
        let stats_min =
            env_parsed::<u64>(STATS_PERIOD_ENV).unwrap_or(DEFAULT_STATS_PERIOD_MIN);
        Self {
            dasu_options: options,
            brokers,
            hb_period: Duration::from_secs(ias.hb_frequency_secs),
            stats_period: Duration::from_secs(stats_min * 60),
        }
    }
}

fn env_parsed<T: std::str::FromStr>(name: &str) -> Option<T> {
    let raw = std::env::var(name).ok()?;
    match raw.parse() {
        Ok(v) => Some(v),
        Err(_) => {
            warn!(var = name, value = %raw, "ignoring unparseable override");
            None
        }
    }
}
