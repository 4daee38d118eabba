//! Client and durable queue configuration.

use crate::error::{ConfigError, ConfigResult};
use durable_job_queue::RedisConnectionOptions;
use serde::{Deserialize, Deserializer};
use std::time::Duration;

pub const DEFAULT_FLUSH_AT: usize = 20;
pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_secs(20);
pub const DEFAULT_MAX_INTERNAL_QUEUE_SIZE: usize = 20_000;
pub const DEFAULT_QUEUE_NAME: &str = "analyticsEventsQueue";
pub const DEFAULT_QUEUE_PREFIX: &str = "analytics";
pub const DEFAULT_MAX_ATTEMPTS: u32 = 10;

/// Direct-mode retry policy.
///
/// Attempt `n` (1-based) waits `base_delay * 2^n` plus up to 20% jitter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DirectRetryPolicy {
    pub max_retries: u32,
    #[serde(rename = "baseDelayMs", deserialize_with = "millis")]
    pub base_delay: Duration,
}

impl Default for DirectRetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(100),
        }
    }
}

/// Client configuration.
///
/// Deserializes from camelCase keys with every field optional; durations are
/// given in milliseconds, and `timeout` also accepts strings like `"10s"`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ClientConfig {
    /// Source credential, sent as the basic-auth username.
    pub write_key: String,

    /// Collection endpoint. A trailing slash is trimmed.
    pub data_plane_url: String,

    /// Buffered events that trigger a flush; also the batch size.
    pub flush_at: usize,

    /// Periodic flush timer. `None` disables the timer.
    #[serde(rename = "flushIntervalMs", deserialize_with = "optional_millis")]
    pub flush_interval: Option<Duration>,

    /// Ceiling for the in-memory buffer. Events beyond it are dropped.
    pub max_internal_queue_size: usize,

    /// Per-request HTTP timeout.
    #[serde(deserialize_with = "timeout_setting")]
    pub timeout: Option<Duration>,

    /// When false, every submission completes immediately and nothing is sent.
    pub enable: bool,

    pub retry: DirectRetryPolicy,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::new(String::new(), String::new())
    }
}

impl ClientConfig {
    pub fn new(write_key: impl Into<String>, data_plane_url: impl Into<String>) -> Self {
        Self {
            write_key: write_key.into(),
            data_plane_url: data_plane_url.into(),
            flush_at: DEFAULT_FLUSH_AT,
            flush_interval: Some(DEFAULT_FLUSH_INTERVAL),
            max_internal_queue_size: DEFAULT_MAX_INTERNAL_QUEUE_SIZE,
            timeout: None,
            enable: true,
            retry: DirectRetryPolicy::default(),
        }
    }

    pub fn with_flush_at(mut self, flush_at: usize) -> Self {
        self.flush_at = flush_at;
        self
    }

    pub fn with_flush_interval(mut self, interval: Option<Duration>) -> Self {
        self.flush_interval = interval;
        self
    }

    pub fn with_max_internal_queue_size(mut self, size: usize) -> Self {
        self.max_internal_queue_size = size;
        self
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_enable(mut self, enable: bool) -> Self {
        self.enable = enable;
        self
    }

    pub fn with_retry(mut self, retry: DirectRetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Load configuration from `ANALYTICS_*` environment variables.
    ///
    /// `ANALYTICS_WRITE_KEY` and `ANALYTICS_DATA_PLANE_URL` are required;
    /// everything else falls back to the defaults.
    pub fn from_env() -> ConfigResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub(crate) fn from_lookup<F>(lookup: F) -> ConfigResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let write_key = lookup("ANALYTICS_WRITE_KEY").ok_or(ConfigError::MissingWriteKey)?;
        let data_plane_url =
            lookup("ANALYTICS_DATA_PLANE_URL").ok_or(ConfigError::MissingDataPlaneUrl)?;
        let mut config = Self::new(write_key, data_plane_url);

        if let Some(raw) = lookup("ANALYTICS_FLUSH_AT") {
            config.flush_at = parse_number("ANALYTICS_FLUSH_AT", &raw)?;
        }
        if let Some(raw) = lookup("ANALYTICS_FLUSH_INTERVAL_MS") {
            let ms: u64 = parse_number("ANALYTICS_FLUSH_INTERVAL_MS", &raw)?;
            config.flush_interval = (ms > 0).then(|| Duration::from_millis(ms));
        }
        if let Some(raw) = lookup("ANALYTICS_MAX_QUEUE_SIZE") {
            config.max_internal_queue_size = parse_number("ANALYTICS_MAX_QUEUE_SIZE", &raw)?;
        }
        if let Some(raw) = lookup("ANALYTICS_TIMEOUT") {
            config.timeout = Some(parse_duration(&raw)?);
        }
        if let Some(raw) = lookup("ANALYTICS_ENABLE") {
            config.enable = match raw.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => true,
                "0" | "false" | "no" | "off" => false,
                _ => {
                    return Err(ConfigError::InvalidValue {
                        key: "ANALYTICS_ENABLE".to_string(),
                        value: raw,
                    })
                }
            };
        }

        Ok(config)
    }

    /// Apply clamps and check required fields.
    pub(crate) fn normalized(mut self) -> ConfigResult<Self> {
        if self.write_key.trim().is_empty() {
            return Err(ConfigError::MissingWriteKey);
        }
        let trimmed = self.data_plane_url.trim().trim_end_matches('/');
        if trimmed.is_empty() {
            return Err(ConfigError::MissingDataPlaneUrl);
        }
        self.data_plane_url = trimmed.to_string();
        self.flush_at = self.flush_at.max(1);
        self.flush_interval = self.flush_interval.filter(|d| !d.is_zero());
        Ok(self)
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, raw: &str) -> ConfigResult<T> {
    raw.trim().parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        value: raw.to_string(),
    })
}

/// Parse a human duration: bare milliseconds (`"1500"`) or a number with a
/// unit suffix (`"500ms"`, `"10s"`, `"2m"`, `"1h"`, `"1d"`). Fractions are
/// accepted (`"1.5s"`).
pub fn parse_duration(raw: &str) -> ConfigResult<Duration> {
    let text = raw.trim();
    let invalid = || ConfigError::InvalidDuration(raw.to_string());

    let split = text
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(text.len());
    let (number, unit) = text.split_at(split);
    let value: f64 = number.parse().map_err(|_| invalid())?;

    let millis_per_unit = match unit.trim().to_ascii_lowercase().as_str() {
        "" | "ms" => 1.0,
        "s" | "sec" | "secs" => 1_000.0,
        "m" | "min" | "mins" => 60_000.0,
        "h" | "hr" | "hrs" => 3_600_000.0,
        "d" | "day" | "days" => 86_400_000.0,
        _ => return Err(invalid()),
    };

    let millis = value * millis_per_unit;
    if !millis.is_finite() || millis < 0.0 {
        return Err(invalid());
    }
    Ok(Duration::from_millis(millis.round() as u64))
}

fn millis<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
    u64::deserialize(deserializer).map(Duration::from_millis)
}

fn optional_millis<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<Duration>, D::Error> {
    Ok(Option::<u64>::deserialize(deserializer)?.map(Duration::from_millis))
}

#[derive(Deserialize)]
#[serde(untagged)]
enum TimeoutSetting {
    Millis(u64),
    Text(String),
}

fn timeout_setting<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<Duration>, D::Error> {
    match Option::<TimeoutSetting>::deserialize(deserializer)? {
        None => Ok(None),
        Some(TimeoutSetting::Millis(ms)) => Ok(Some(Duration::from_millis(ms))),
        Some(TimeoutSetting::Text(text)) => parse_duration(&text)
            .map(Some)
            .map_err(serde::de::Error::custom),
    }
}

/// Durable job options.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobOptions {
    /// Attempts after which a job is dead-lettered.
    pub max_attempts: u32,
}

impl Default for JobOptions {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }
}

/// Durable queue activation options.
#[derive(Debug, Clone)]
pub struct DurableQueueOptions {
    pub queue_name: String,
    /// Key prefix in the store.
    pub prefix: String,
    /// Connection parameters. Activation fails when absent.
    pub redis: Option<RedisConnectionOptions>,
    pub job: JobOptions,
    /// How long the processor blocks waiting for a job before polling again.
    pub poll_interval: Duration,
}

impl Default for DurableQueueOptions {
    fn default() -> Self {
        Self {
            queue_name: DEFAULT_QUEUE_NAME.to_string(),
            prefix: DEFAULT_QUEUE_PREFIX.to_string(),
            redis: None,
            job: JobOptions::default(),
            poll_interval: Duration::from_secs(1),
        }
    }
}

impl DurableQueueOptions {
    pub fn with_redis(mut self, redis: RedisConnectionOptions) -> Self {
        self.redis = Some(redis);
        self
    }
}
