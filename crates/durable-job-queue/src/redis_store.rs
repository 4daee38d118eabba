//! Redis-backed job store.
//!
//! Lists per queue:
//! - `{prefix}:{queue}:wait`: pending jobs; the right end is handed out next
//! - `{prefix}:{queue}:active`: jobs handed to a worker and not yet resolved
//! - `{prefix}:{queue}:failed`: dead-lettered jobs with a reason
//!
//! plus a `{prefix}:{queue}:completed` counter.

use crate::error::{QueueError, QueueResult};
use crate::store::{ActiveJob, FailedJob, JobCounts, JobStore, Placement};
use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use redis::aio::MultiplexedConnection;
use redis::Client;
use std::time::Duration;
use tracing::{debug, info};
use url::Url;

/// Connection parameters for the backing Redis instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedisConnectionOptions {
    pub host: String,
    pub port: u16,
    pub db: i64,
    pub password: Option<String>,
}

impl Default for RedisConnectionOptions {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 6379,
            db: 0,
            password: None,
        }
    }
}

impl RedisConnectionOptions {
    /// Build a `redis://` URL, percent-encoding the password.
    pub fn to_url(&self) -> QueueResult<String> {
        let mut url = Url::parse(&format!("redis://{}:{}/{}", self.host, self.port, self.db))
            .map_err(|e| QueueError::Config(format!("invalid redis address: {e}")))?;
        if let Some(password) = self.password.as_deref() {
            url.set_password(Some(password))
                .map_err(|_| QueueError::Config("cannot set redis password".to_string()))?;
        }
        Ok(url.to_string())
    }
}

/// Key names for one queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueKeys {
    pub wait: String,
    pub active: String,
    pub failed: String,
    pub completed: String,
}

impl QueueKeys {
    pub fn new(prefix: &str, queue_name: &str) -> Self {
        let base = format!("{prefix}:{queue_name}");
        Self {
            wait: format!("{base}:wait"),
            active: format!("{base}:active"),
            failed: format!("{base}:failed"),
            completed: format!("{base}:completed"),
        }
    }
}

/// [`JobStore`] over Redis lists.
pub struct RedisJobStore {
    keys: QueueKeys,
    conn: MultiplexedConnection,
    /// Separate connection for blocking pops so they never stall other commands.
    blocking: MultiplexedConnection,
}

impl RedisJobStore {
    /// Connect and verify the server answers.
    pub async fn connect(options: &RedisConnectionOptions, keys: QueueKeys) -> QueueResult<Self> {
        let client = Client::open(options.to_url()?.as_str())?;
        let conn = client.get_multiplexed_async_connection().await?;
        let blocking = client.get_multiplexed_async_connection().await?;

        let _: String = redis::cmd("PING").query_async(&mut conn.clone()).await?;

        info!(
            host = %options.host,
            port = options.port,
            db = options.db,
            wait = %keys.wait,
            "Connected to Redis job store"
        );

        Ok(Self {
            keys,
            conn,
            blocking,
        })
    }

    pub fn keys(&self) -> &QueueKeys {
        &self.keys
    }
}

#[async_trait]
impl JobStore for RedisJobStore {
    async fn push(&self, payload: String, placement: Placement) -> QueueResult<()> {
        // The right end of `wait` is popped next.
        let command = match placement {
            Placement::Back => "LPUSH",
            Placement::Front => "RPUSH",
        };
        let _: i64 = redis::cmd(command)
            .arg(&self.keys.wait)
            .arg(payload)
            .query_async(&mut self.conn.clone())
            .await?;
        Ok(())
    }

    async fn next(&self, wait: Duration) -> QueueResult<Option<ActiveJob>> {
        // BRPOPLPUSH takes whole seconds; 0 would block forever.
        let timeout_secs = wait.as_secs().max(1);
        let raw: Option<String> = redis::cmd("BRPOPLPUSH")
            .arg(&self.keys.wait)
            .arg(&self.keys.active)
            .arg(timeout_secs)
            .query_async(&mut self.blocking.clone())
            .await?;

        if raw.is_some() {
            debug!(active = %self.keys.active, "Moved job to active");
        }
        Ok(raw.map(ActiveJob::new))
    }

    async fn list_active(&self) -> QueueResult<Vec<ActiveJob>> {
        let raw: Vec<String> = redis::cmd("LRANGE")
            .arg(&self.keys.active)
            .arg(0)
            .arg(-1)
            .query_async(&mut self.conn.clone())
            .await?;
        Ok(raw.into_iter().map(ActiveJob::new).collect())
    }

    async fn remove_active(&self, job: &ActiveJob) -> QueueResult<()> {
        let _: i64 = redis::cmd("LREM")
            .arg(&self.keys.active)
            .arg(1)
            .arg(&job.raw)
            .query_async(&mut self.conn.clone())
            .await?;
        Ok(())
    }

    async fn complete(&self, job: &ActiveJob) -> QueueResult<()> {
        redis::pipe()
            .atomic()
            .cmd("LREM")
            .arg(&self.keys.active)
            .arg(1)
            .arg(&job.raw)
            .ignore()
            .cmd("INCR")
            .arg(&self.keys.completed)
            .ignore()
            .query_async::<()>(&mut self.conn.clone())
            .await?;
        Ok(())
    }

    async fn fail(&self, job: &ActiveJob, reason: &str) -> QueueResult<()> {
        let entry = serde_json::to_string(&FailedJob {
            payload: job.raw.clone(),
            reason: reason.to_string(),
            failed_at: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        })?;

        redis::pipe()
            .atomic()
            .cmd("LREM")
            .arg(&self.keys.active)
            .arg(1)
            .arg(&job.raw)
            .ignore()
            .cmd("LPUSH")
            .arg(&self.keys.failed)
            .arg(entry)
            .ignore()
            .query_async::<()>(&mut self.conn.clone())
            .await?;
        Ok(())
    }

    async fn counts(&self) -> QueueResult<JobCounts> {
        let (waiting, active, failed, completed): (usize, usize, usize, Option<u64>) =
            redis::pipe()
                .cmd("LLEN")
                .arg(&self.keys.wait)
                .cmd("LLEN")
                .arg(&self.keys.active)
                .cmd("LLEN")
                .arg(&self.keys.failed)
                .cmd("GET")
                .arg(&self.keys.completed)
                .query_async(&mut self.conn.clone())
                .await?;

        Ok(JobCounts {
            waiting,
            active,
            failed,
            completed: completed.unwrap_or(0),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_queue_keys() {
        let keys = QueueKeys::new("analytics", "analyticsEventsQueue");
        assert_eq!(keys.wait, "analytics:analyticsEventsQueue:wait");
        assert_eq!(keys.active, "analytics:analyticsEventsQueue:active");
        assert_eq!(keys.failed, "analytics:analyticsEventsQueue:failed");
        assert_eq!(keys.completed, "analytics:analyticsEventsQueue:completed");
    }

    #[test]
    fn test_default_connection_url() {
        let options = RedisConnectionOptions::default();
        assert_eq!(options.to_url().unwrap(), "redis://localhost:6379/0");
    }

    #[test]
    fn test_connection_url_with_password() {
        let options = RedisConnectionOptions {
            host: "cache.internal".to_string(),
            port: 6380,
            db: 2,
            password: Some("p@ss word".to_string()),
        };
        assert_eq!(
            options.to_url().unwrap(),
            "redis://:p%40ss%20word@cache.internal:6380/2"
        );
    }
}
