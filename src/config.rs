use std::time::Duration;

use crate::queue::backoff::MAX_DELAY_MS;

/// Upper bound for `max_record_age`: 100 years.
pub const MAX_RECORD_AGE: Duration = Duration::from_secs(100 * 365 * 24 * 60 * 60);

/// Process-level configuration for the `requeue` daemon.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub log_level: String,
    pub queue: QueueOptions,
    pub schedule: ScheduleConfig,
    pub webhook: WebhookConfig,
}

/// Options that shape batch selection and retry behaviour.
#[derive(Debug, Clone, PartialEq)]
pub struct QueueOptions {
    pub collection_name: String,
    pub batch_size: i64,
    pub max_record_age: Duration,
    /// Negative means unlimited retries.
    pub retry_limit: i32,
    pub backoff_ms: i64,
    pub backoff_coefficient: f64,
    pub continue_processing_on_error: bool,
}

impl Default for QueueOptions {
    fn default() -> Self {
        Self {
            collection_name: "queue_records".to_string(),
            batch_size: 10,
            max_record_age: Duration::from_secs(7 * 24 * 60 * 60),
            retry_limit: 5,
            backoff_ms: 10_000,
            backoff_coefficient: 1.5,
            continue_processing_on_error: false,
        }
    }
}

impl QueueOptions {
    pub fn validate(&self) -> Result<(), String> {
        if !is_identifier(&self.collection_name) {
            return Err(format!(
                "Invalid collection name '{}': use letters, digits and underscores",
                self.collection_name
            ));
        }
        if self.batch_size <= 0 {
            return Err(format!("batch_size must be positive, got {}", self.batch_size));
        }
        if !(0..=MAX_DELAY_MS).contains(&self.backoff_ms) {
            return Err(format!(
                "backoff_ms must be between 0 and {MAX_DELAY_MS}, got {}",
                self.backoff_ms
            ));
        }
        if self.max_record_age > MAX_RECORD_AGE {
            return Err(format!(
                "max_record_age must be at most {}s, got {}s",
                MAX_RECORD_AGE.as_secs(),
                self.max_record_age.as_secs()
            ));
        }
        if !(self.backoff_coefficient > 0.0) || !self.backoff_coefficient.is_finite() {
            return Err(format!(
                "backoff_coefficient must be > 0, got {}",
                self.backoff_coefficient
            ));
        }
        Ok(())
    }

    pub fn has_retry_limit(&self) -> bool {
        self.retry_limit >= 0
    }
}

/// Intervals of the periodic triggers driven by [`crate::worker`].
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduleConfig {
    pub process_interval: Duration,
    pub cleanup_interval: Duration,
    /// `None` disables the status report.
    pub status_interval: Option<Duration>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WebhookConfig {
    pub url: String,
    pub failure_url: Option<String>,
    pub timeout: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self, String> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, String>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Env { lookup };

        let database_url = env.required("DATABASE_URL")?;
        let log_level = env.or("REQUEUE_LOG_LEVEL", "info");

        let defaults = QueueOptions::default();
        let queue = QueueOptions {
            collection_name: env.or("REQUEUE_COLLECTION", &defaults.collection_name),
            batch_size: env.parse_or("REQUEUE_BATCH_SIZE", defaults.batch_size)?,
            max_record_age: Duration::from_millis(env.parse_or(
                "REQUEUE_MAX_RECORD_AGE_MS",
                defaults.max_record_age.as_millis() as u64,
            )?),
            retry_limit: env.parse_or("REQUEUE_RETRY_LIMIT", defaults.retry_limit)?,
            backoff_ms: env.parse_or("REQUEUE_BACKOFF_MS", defaults.backoff_ms)?,
            backoff_coefficient: env
                .parse_or("REQUEUE_BACKOFF_COEFFICIENT", defaults.backoff_coefficient)?,
            continue_processing_on_error: parse_bool(
                "REQUEUE_CONTINUE_ON_ERROR",
                &env.or("REQUEUE_CONTINUE_ON_ERROR", "false"),
            )?,
        };
        queue.validate()?;

        let status_secs: u64 = env.parse_or("REQUEUE_STATUS_INTERVAL_SECS", 300)?;
        let schedule = ScheduleConfig {
            process_interval: Duration::from_secs(
                env.parse_or("REQUEUE_PROCESS_INTERVAL_SECS", 5)?,
            ),
            cleanup_interval: Duration::from_secs(
                env.parse_or("REQUEUE_CLEANUP_INTERVAL_SECS", 3600)?,
            ),
            status_interval: (status_secs > 0).then(|| Duration::from_secs(status_secs)),
        };
        if schedule.process_interval.is_zero() || schedule.cleanup_interval.is_zero() {
            return Err("Process and cleanup intervals must be greater than zero".to_string());
        }

        let webhook = WebhookConfig {
            url: env.required("REQUEUE_WEBHOOK_URL")?,
            failure_url: (env.lookup)("REQUEUE_FAILURE_WEBHOOK_URL")
                .filter(|s| !s.trim().is_empty()),
            timeout: Duration::from_secs(env.parse_or("REQUEUE_WEBHOOK_TIMEOUT_SECS", 30)?),
        };

        Ok(Config {
            database_url,
            log_level,
            queue,
            schedule,
            webhook,
        })
    }
}

struct Env<F> {
    lookup: F,
}

impl<F> Env<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn required(&self, key: &str) -> Result<String, String> {
        (self.lookup)(key).ok_or_else(|| format!("Missing required environment variable: {key}"))
    }

    fn or(&self, key: &str, default: &str) -> String {
        (self.lookup)(key).unwrap_or_else(|| default.to_string())
    }

    fn parse_or<T>(&self, key: &str, default: T) -> Result<T, String>
    where
        T: std::str::FromStr,
        T::Err: std::fmt::Display,
    {
        match (self.lookup)(key) {
            Some(raw) => raw
                .trim()
                .parse()
                .map_err(|e| format!("Invalid {key}: {e}")),
            None => Ok(default),
        }
    }
}

fn parse_bool(key: &str, raw: &str) -> Result<bool, String> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        other => Err(format!("Invalid {key}: expected true or false, got '{other}'")),
    }
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
