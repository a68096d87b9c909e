pub mod keys;
pub mod scripts;

pub use keys::StoreKey;

use deadpool_redis::{Config, Connection, Pool, Runtime};
use error::*;
use result::Result;
use std::collections::HashMap;
use std::time::Duration;

/// The key prefix shared by every key the router touches.
pub const KEY_PREFIX: &str = "voice:";

/// The outcome of popping an exclusive pool.
#[derive(Debug, PartialEq)]
pub enum PopOutcome {
    /// A pod was popped and is now owned by the caller.
    Pod(String),
    /// The pool's available set was empty.
    Empty,
    /// Every pod the script managed to pop was draining.
    AllDraining,
}

/// A Store is a cheaply cloneable handle over the shared connection pool to
/// the backing key-value store. Every operation checks a connection out of
/// the pool for its own duration, so a Store may be freely shared across
/// request handlers and background workers alike.
///
/// The Store exposes exactly the operation vocabulary the router needs:
/// plain strings/sets/sorted-sets/hashes with TTLs, plus the five
/// [server-side scripts](crate::scripts) that implement the compound atomic
/// updates.
#[derive(Clone)]
pub struct Store {
    pool: Pool,
    prefix: String,
}

impl Store {
    /// Builds the connection pool against the given store URL. This performs
    /// no I/O; the first checkout dials. Callers that need boot-time
    /// certainty should follow up with [ping](Store::ping).
    pub fn connect(url: &str, pool_size: usize, dial_timeout: Duration) -> Result<Store> {
        let cfg = Config::from_url(url);
        let pool = cfg
            .builder()
            .map_err(|err| BadStoreConfig {
                cause: format!("{}", err).into(),
            })?
            .max_size(pool_size)
            .create_timeout(Some(dial_timeout))
            .wait_timeout(Some(dial_timeout))
            .runtime(Runtime::Tokio1)
            .build()
            .map_err(|err| BadStoreConfig {
                cause: format!("{}", err).into(),
            })?;
        Ok(Store {
            pool,
            prefix: KEY_PREFIX.to_string(),
        })
    }

    /// Resolves a [StoreKey](crate::keys::StoreKey) against this Store's
    /// prefix.
    pub fn key(&self, key: StoreKey) -> String {
        key.resolve(&self.prefix)
    }

    async fn checkout(&self) -> Result<Connection> {
        self.pool.get().await.map_err(|err| {
            PoolExhausted {
                cause: format!("{}", err).into(),
            }
            .into()
        })
    }

    /// A single PING round trip. Used by the readiness endpoint and the
    /// store health watchdog.
    pub async fn ping(&self) -> Result<()> {
        let mut conn = self.checkout().await?;
        let _: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(|cause| StoreFailure { op: "PING", cause })?;
        Ok(())
    }

    ////////////////////////////////////////////////////////////////////////
    // Strings
    ////////////////////////////////////////////////////////////////////////

    pub async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.checkout().await?;
        let value: Option<String> = redis::cmd("GET")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(|cause| StoreFailure { op: "GET", cause })?;
        Ok(value)
    }

    pub async fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut conn = self.checkout().await?;
        let _: () = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .query_async(&mut conn)
            .await
            .map_err(|cause| StoreFailure { op: "SET", cause })?;
        Ok(())
    }

    /// SET if absent. Returns whether this call performed the write.
    pub async fn set_nx(&self, key: &str, value: &str) -> Result<bool> {
        let mut conn = self.checkout().await?;
        let wrote: bool = redis::cmd("SETNX")
            .arg(key)
            .arg(value)
            .query_async(&mut conn)
            .await
            .map_err(|cause| StoreFailure { op: "SETNX", cause })?;
        Ok(wrote)
    }

    pub async fn set_ex(&self, key: &str, value: &str, ttl_secs: u64) -> Result<()> {
        let mut conn = self.checkout().await?;
        let _: () = redis::cmd("SETEX")
            .arg(key)
            .arg(ttl_secs)
            .arg(value)
            .query_async(&mut conn)
            .await
            .map_err(|cause| StoreFailure { op: "SETEX", cause })?;
        Ok(())
    }

    pub async fn exists(&self, key: &str) -> Result<bool> {
        let mut conn = self.checkout().await?;
        let found: bool = redis::cmd("EXISTS")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(|cause| StoreFailure { op: "EXISTS", cause })?;
        Ok(found)
    }

    pub async fn del(&self, key: &str) -> Result<()> {
        let mut conn = self.checkout().await?;
        let _: () = redis::cmd("DEL")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(|cause| StoreFailure { op: "DEL", cause })?;
        Ok(())
    }

    ////////////////////////////////////////////////////////////////////////
    // Sets
    ////////////////////////////////////////////////////////////////////////

    pub async fn sadd(&self, key: &str, member: &str) -> Result<()> {
        let mut conn = self.checkout().await?;
        let _: () = redis::cmd("SADD")
            .arg(key)
            .arg(member)
            .query_async(&mut conn)
            .await
            .map_err(|cause| StoreFailure { op: "SADD", cause })?;
        Ok(())
    }

    /// Returns whether the member was actually present and removed.
    pub async fn srem(&self, key: &str, member: &str) -> Result<bool> {
        let mut conn = self.checkout().await?;
        let removed: u64 = redis::cmd("SREM")
            .arg(key)
            .arg(member)
            .query_async(&mut conn)
            .await
            .map_err(|cause| StoreFailure { op: "SREM", cause })?;
        Ok(removed > 0)
    }

    pub async fn smembers(&self, key: &str) -> Result<Vec<String>> {
        let mut conn = self.checkout().await?;
        let members: Vec<String> = redis::cmd("SMEMBERS")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(|cause| StoreFailure {
                op: "SMEMBERS",
                cause,
            })?;
        Ok(members)
    }

    pub async fn sismember(&self, key: &str, member: &str) -> Result<bool> {
        let mut conn = self.checkout().await?;
        let found: bool = redis::cmd("SISMEMBER")
            .arg(key)
            .arg(member)
            .query_async(&mut conn)
            .await
            .map_err(|cause| StoreFailure {
                op: "SISMEMBER",
                cause,
            })?;
        Ok(found)
    }

    pub async fn scard(&self, key: &str) -> Result<u64> {
        let mut conn = self.checkout().await?;
        let count: u64 = redis::cmd("SCARD")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(|cause| StoreFailure { op: "SCARD", cause })?;
        Ok(count)
    }

    ////////////////////////////////////////////////////////////////////////
    // Sorted sets
    ////////////////////////////////////////////////////////////////////////

    /// ZADD NX. The add-if-absent variant matters: a concurrent allocation
    /// may already have pushed the member's score above zero, and a plain
    /// ZADD here would clobber that count.
    pub async fn zadd_nx(&self, key: &str, member: &str, score: f64) -> Result<()> {
        let mut conn = self.checkout().await?;
        let _: () = redis::cmd("ZADD")
            .arg(key)
            .arg("NX")
            .arg(score)
            .arg(member)
            .query_async(&mut conn)
            .await
            .map_err(|cause| StoreFailure { op: "ZADD", cause })?;
        Ok(())
    }

    /// Returns whether the member was actually present and removed.
    pub async fn zrem(&self, key: &str, member: &str) -> Result<bool> {
        let mut conn = self.checkout().await?;
        let removed: u64 = redis::cmd("ZREM")
            .arg(key)
            .arg(member)
            .query_async(&mut conn)
            .await
            .map_err(|cause| StoreFailure { op: "ZREM", cause })?;
        Ok(removed > 0)
    }

    /// Returns the member's score, or None for the distinguished "not a
    /// member" reply. Callers that treat a transport error as None will
    /// corrupt shared pool counts; the two outcomes are deliberately kept
    /// apart in the signature.
    pub async fn zscore(&self, key: &str, member: &str) -> Result<Option<f64>> {
        let mut conn = self.checkout().await?;
        let score: Option<f64> = redis::cmd("ZSCORE")
            .arg(key)
            .arg(member)
            .query_async(&mut conn)
            .await
            .map_err(|cause| StoreFailure { op: "ZSCORE", cause })?;
        Ok(score)
    }

    pub async fn zrange_withscores(&self, key: &str) -> Result<Vec<(String, f64)>> {
        let mut conn = self.checkout().await?;
        let members: Vec<(String, f64)> = redis::cmd("ZRANGE")
            .arg(key)
            .arg(0)
            .arg(-1)
            .arg("WITHSCORES")
            .query_async(&mut conn)
            .await
            .map_err(|cause| StoreFailure { op: "ZRANGE", cause })?;
        Ok(members)
    }

    pub async fn zcard(&self, key: &str) -> Result<u64> {
        let mut conn = self.checkout().await?;
        let count: u64 = redis::cmd("ZCARD")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(|cause| StoreFailure { op: "ZCARD", cause })?;
        Ok(count)
    }

    ////////////////////////////////////////////////////////////////////////
    // Hashes
    ////////////////////////////////////////////////////////////////////////

    pub async fn hgetall(&self, key: &str) -> Result<HashMap<String, String>> {
        let mut conn = self.checkout().await?;
        let fields: HashMap<String, String> = redis::cmd("HGETALL")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(|cause| StoreFailure {
                op: "HGETALL",
                cause,
            })?;
        Ok(fields)
    }

    pub async fn hget(&self, key: &str, field: &str) -> Result<Option<String>> {
        let mut conn = self.checkout().await?;
        let value: Option<String> = redis::cmd("HGET")
            .arg(key)
            .arg(field)
            .query_async(&mut conn)
            .await
            .map_err(|cause| StoreFailure { op: "HGET", cause })?;
        Ok(value)
    }

    pub async fn hset(&self, key: &str, fields: &[(&str, &str)]) -> Result<()> {
        let mut conn = self.checkout().await?;
        let mut cmd = redis::cmd("HSET");
        cmd.arg(key);
        for (field, value) in fields {
            cmd.arg(field).arg(value);
        }
        let _: () = cmd
            .query_async(&mut conn)
            .await
            .map_err(|cause| StoreFailure { op: "HSET", cause })?;
        Ok(())
    }

    pub async fn hsetnx(&self, key: &str, field: &str, value: &str) -> Result<()> {
        let mut conn = self.checkout().await?;
        let _: () = redis::cmd("HSETNX")
            .arg(key)
            .arg(field)
            .arg(value)
            .query_async(&mut conn)
            .await
            .map_err(|cause| StoreFailure { op: "HSETNX", cause })?;
        Ok(())
    }

    pub async fn expire(&self, key: &str, ttl_secs: i64) -> Result<()> {
        let mut conn = self.checkout().await?;
        let _: () = redis::cmd("EXPIRE")
            .arg(key)
            .arg(ttl_secs)
            .query_async(&mut conn)
            .await
            .map_err(|cause| StoreFailure { op: "EXPIRE", cause })?;
        Ok(())
    }

    /// Replaces a call record's placeholder lock with the real assignment in
    /// one atomic MULTI/EXEC: write the fields, drop the `_lock` marker, and
    /// stretch the TTL out to the call-info horizon.
    pub async fn overwrite_call_record(
        &self,
        key: &str,
        fields: &[(&str, &str)],
        ttl_secs: i64,
    ) -> Result<()> {
        let mut conn = self.checkout().await?;
        let mut pipe = redis::pipe();
        pipe.atomic();
        let mut hset = redis::cmd("HSET");
        hset.arg(key);
        for (field, value) in fields {
            hset.arg(field).arg(value);
        }
        pipe.add_command(hset);
        pipe.cmd("HDEL").arg(key).arg("_lock");
        pipe.cmd("EXPIRE").arg(key).arg(ttl_secs);
        let _: () = pipe
            .query_async(&mut conn)
            .await
            .map_err(|cause| StoreFailure {
                op: "MULTI(call record)",
                cause,
            })?;
        Ok(())
    }

    ////////////////////////////////////////////////////////////////////////
    // Server-side scripts
    ////////////////////////////////////////////////////////////////////////

    /// Runs the idempotency read-or-lock script against a call record key.
    /// An empty map means the lock was just acquired by this caller.
    pub async fn call_lock(&self, call_key: &str, ttl_secs: u64) -> Result<HashMap<String, String>> {
        let mut conn = self.checkout().await?;
        let record: HashMap<String, String> = scripts::CALL_LOCK
            .key(call_key)
            .arg(ttl_secs)
            .invoke_async(&mut conn)
            .await
            .map_err(|cause| StoreFailure {
                op: "SCRIPT(call lock)",
                cause,
            })?;
        Ok(record)
    }

    /// Runs the exclusive pop script against a pool's available set.
    pub async fn exclusive_pop(&self, pool_key: &str) -> Result<PopOutcome> {
        let draining_prefix = self.key(StoreKey::DrainingPrefix);
        let mut conn = self.checkout().await?;
        let reply: Vec<String> = scripts::EXCLUSIVE_POP
            .key(pool_key)
            .arg(draining_prefix)
            .invoke_async(&mut conn)
            .await
            .map_err(|cause| StoreFailure {
                op: "SCRIPT(exclusive pop)",
                cause,
            })?;
        match reply.first().map(String::as_str) {
            Some("ok") => Ok(PopOutcome::Pod(reply[1].clone())),
            Some("draining") => Ok(PopOutcome::AllDraining),
            _ => Ok(PopOutcome::Empty),
        }
    }

    /// Runs the shared acquire script. Some(pod) means one slot on that pod
    /// now belongs to the caller.
    pub async fn shared_acquire(&self, pool_key: &str, max_concurrent: u32) -> Result<Option<String>> {
        let draining_prefix = self.key(StoreKey::DrainingPrefix);
        let mut conn = self.checkout().await?;
        let reply: Vec<String> = scripts::SHARED_ACQUIRE
            .key(pool_key)
            .arg(draining_prefix)
            .arg(max_concurrent)
            .invoke_async(&mut conn)
            .await
            .map_err(|cause| StoreFailure {
                op: "SCRIPT(shared acquire)",
                cause,
            })?;
        match reply.first().map(String::as_str) {
            Some("ok") => Ok(Some(reply[1].clone())),
            _ => Ok(None),
        }
    }

    /// Runs the shared release script, returning the member's new score.
    pub async fn shared_release(&self, pool_key: &str, pod: &str) -> Result<i64> {
        let mut conn = self.checkout().await?;
        let count: i64 = scripts::SHARED_RELEASE
            .key(pool_key)
            .arg(pod)
            .invoke_async(&mut conn)
            .await
            .map_err(|cause| StoreFailure {
                op: "SCRIPT(shared release)",
                cause,
            })?;
        Ok(count)
    }

    /// Atomically checks that a pod holds no lease and no draining flag.
    /// Callers MUST treat an Err from this as "not eligible"; recovery paths
    /// that re-add pods on a store hiccup will double-allocate.
    pub async fn pod_eligible(&self, pod: &str) -> Result<bool> {
        let lease = self.key(StoreKey::Lease(pod));
        let draining = self.key(StoreKey::Draining(pod));
        let mut conn = self.checkout().await?;
        let eligible: bool = scripts::ELIGIBLE
            .key(lease)
            .key(draining)
            .invoke_async(&mut conn)
            .await
            .map_err(|cause| StoreFailure {
                op: "SCRIPT(eligible)",
                cause,
            })?;
        Ok(eligible)
    }
}

#[derive(Error, VcrError, HttpCode, Kind, Debug)]
#[code(Status::InternalServerError)]
#[error(
    "The backing key-value store failed while performing '{op}'. The router's \
recovery loops will converge any state this operation may have left behind, \
but the current request could not be served. If this persists, please check \
the health of the store itself."
)]
pub struct StoreFailure {
    pub op: &'static str,
    #[source]
    pub cause: redis::RedisError,
}

#[derive(Error, VcrError, HttpCode, Kind, Debug)]
#[code(Status::InternalServerError)]
#[error(
    "A connection could not be checked out of the store connection pool. \
Either the store is down, or every pooled connection is busy and the checkout \
timed out."
)]
pub struct PoolExhausted {
    #[source]
    cause: StringError,
}

#[derive(Error, VcrError, HttpCode, Kind, Debug)]
#[code(Status::InternalServerError)]
#[error(
    "The store connection pool could not be constructed from the configured \
URL. This is fatal at boot; please review the store configuration."
)]
pub struct BadStoreConfig {
    #[source]
    cause: StringError,
}
