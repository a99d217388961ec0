//! Redis-backed lease store.
//!
//! `SET key token NX PX ttl` claims a key; extension and deletion run as Lua
//! scripts so the ownership check and the write happen in one step on the
//! server. Redis expires keys itself.

use crate::RedisConfig;
use async_trait::async_trait;
use imgagent_error::{LeaseError, LeaseErrorKind};
use imgagent_interface::LeaseStore;
use redis::aio::ConnectionManager;
use redis::cluster_async::ClusterConnection;
use redis::{RedisResult, Script};
use std::time::Duration;
use tracing::{info, instrument};

const EXTEND_SCRIPT: &str = r#"
if redis.call("GET", KEYS[1]) == ARGV[1] then
    return redis.call("PEXPIRE", KEYS[1], ARGV[2])
else
    return 0
end
"#;

const DELETE_SCRIPT: &str = r#"
if redis.call("GET", KEYS[1]) == ARGV[1] then
    return redis.call("DEL", KEYS[1])
else
    return 0
end
"#;

#[derive(Clone)]
enum Connection {
    Single(ConnectionManager),
    Cluster(ClusterConnection),
}

/// Lease store on a single Redis node or a Redis cluster.
#[derive(Clone)]
pub struct RedisLeaseStore {
    connection: Connection,
    extend: Script,
    delete: Script,
}

impl std::fmt::Debug for RedisLeaseStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mode = match self.connection {
            Connection::Single(_) => "single",
            Connection::Cluster(_) => "cluster",
        };
        f.debug_struct("RedisLeaseStore")
            .field("mode", &mode)
            .finish_non_exhaustive()
    }
}

impl RedisLeaseStore {
    /// Connect using `config`.
    ///
    /// One address, or `disable_cluster`, selects a single-node connection;
    /// otherwise the addresses seed a cluster client.
    #[instrument(skip(config), fields(addrs = ?config.addrs()))]
    pub async fn connect(config: &RedisConfig) -> Result<Self, LeaseError> {
        let urls = config.urls();
        let connection = if *config.disable_cluster() || urls.len() <= 1 {
            let url = urls.first().ok_or_else(|| {
                LeaseError::new(LeaseErrorKind::Connection(
                    "no redis address configured".to_string(),
                ))
            })?;
            let client = redis::Client::open(url.as_str())?;
            Connection::Single(client.get_connection_manager().await?)
        } else {
            let client = redis::cluster::ClusterClient::new(urls)?;
            Connection::Cluster(client.get_async_connection().await?)
        };

        info!("Connected to redis lease backend");
        Ok(Self {
            connection,
            extend: Script::new(EXTEND_SCRIPT),
            delete: Script::new(DELETE_SCRIPT),
        })
    }

    async fn eval(&self, script: &Script, key: &str, value: &str, ttl_ms: Option<u64>) -> RedisResult<i64> {
        let mut invocation = script.key(key);
        invocation.arg(value);
        if let Some(ms) = ttl_ms {
            invocation.arg(ms);
        }
        match self.connection.clone() {
            Connection::Single(mut conn) => invocation.invoke_async(&mut conn).await,
            Connection::Cluster(mut conn) => invocation.invoke_async(&mut conn).await,
        }
    }
}

fn ttl_millis(ttl: Duration) -> u64 {
    // PX 0 is rejected by redis
    (ttl.as_millis() as u64).max(1)
}

#[async_trait]
impl LeaseStore for RedisLeaseStore {
    async fn set_if_absent(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<bool, LeaseError> {
        let mut cmd = redis::cmd("SET");
        cmd.arg(key)
            .arg(value)
            .arg("NX")
            .arg("PX")
            .arg(ttl_millis(ttl));
        let reply: Option<String> = match self.connection.clone() {
            Connection::Single(mut conn) => cmd.query_async(&mut conn).await?,
            Connection::Cluster(mut conn) => cmd.query_async(&mut conn).await?,
        };
        Ok(reply.is_some())
    }

    async fn compare_and_extend(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<bool, LeaseError> {
        let extended = self
            .eval(&self.extend, key, value, Some(ttl_millis(ttl)))
            .await?;
        Ok(extended == 1)
    }

    async fn compare_and_delete(&self, key: &str, value: &str) -> Result<bool, LeaseError> {
        let deleted = self.eval(&self.delete, key, value, None).await?;
        Ok(deleted == 1)
    }
}
