//! `Dragonfly` (Redis-compatible) walker cache mirror.
//!
//! `Dragonfly` holds a copy of every walking record so the scheduler can
//! load its working set without touching `PostgreSQL`. It is never the
//! source of truth: anything missing or unreadable here is a cache miss and
//! the caller falls back to the durable store.
//!
//! # Key Patterns
//!
//! | Pattern | Type | Description |
//! |---------|------|-------------|
//! | `walker:{id}` | JSON | Full walker record |
//! | `actor:{id}:walker` | String | Id of the actor's walking record |
//! | `walkers:active` | Set | Ids of all cached walking records |
//! | `walkers:primed` | String | Present once the mirror was filled from `PostgreSQL` |
//! | `actor:{id}:speed` | String | Cached speed modifier, expires after a TTL |

use fred::prelude::*;
use serde::Serialize;
use serde::de::DeserializeOwned;
use wayfarer_types::{ActorId, Walker, WalkerId};

use crate::error::DbError;

/// Set of cached walker ids.
pub const ACTIVE_WALKERS_KEY: &str = "walkers:active";

/// Marker written after the mirror is filled from the durable store.
pub const PRIMED_KEY: &str = "walkers:primed";

/// Key of a cached walker record.
pub fn walker_key(walker: WalkerId) -> String {
    format!("walker:{walker}")
}

/// Key pointing from an actor to its walking record.
pub fn actor_walker_key(actor: ActorId) -> String {
    format!("actor:{actor}:walker")
}

/// Key of an actor's cached speed modifier.
pub fn speed_key(actor: ActorId) -> String {
    format!("actor:{actor}:speed")
}

fn expiration(ttl_secs: u64) -> Option<Expiration> {
    (ttl_secs > 0).then(|| Expiration::EX(i64::try_from(ttl_secs).unwrap_or(i64::MAX)))
}

/// Connection handle to a `Dragonfly` (Redis-compatible) instance.
#[derive(Clone)]
pub struct DragonflyPool {
    client: Client,
}

impl DragonflyPool {
    /// Connect to `Dragonfly` at the given URL.
    ///
    /// The URL should follow the Redis URL scheme:
    /// `redis://host:port` or `redis://host:port/db`
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Config`] if the URL cannot be parsed.
    /// Returns [`DbError::Dragonfly`] if the connection fails.
    pub async fn connect(url: &str) -> Result<Self, DbError> {
        let config = Config::from_url(url)
            .map_err(|e| DbError::Config(format!("Invalid Dragonfly URL: {e}")))?;

        let client = Builder::from_config(config).build()?;
        client.init().await?;

        tracing::info!("Connected to Dragonfly");
        Ok(Self { client })
    }

    // =========================================================================
    // Generic JSON get/set/delete
    // =========================================================================

    /// Serialize `value` as JSON and store it at `key`, expiring after
    /// `ttl_secs` when non-zero.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Serialization`] if serialization fails.
    /// Returns [`DbError::Dragonfly`] if the write fails.
    pub async fn set_json<T: Serialize + Sync>(&self, key: &str, value: &T, ttl_secs: u64) -> Result<(), DbError> {
        let json = serde_json::to_string(value)?;
        let _: () = self
            .client
            .set(key, json.as_str(), expiration(ttl_secs), None, false)
            .await?;
        Ok(())
    }

    /// Read the value at `key` and deserialize from JSON. A missing key
    /// yields `None`.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Serialization`] if deserialization fails.
    /// Returns [`DbError::Dragonfly`] if the read fails.
    pub async fn get_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, DbError> {
        let value: Option<String> = self.client.get(key).await?;
        value.map(|s| serde_json::from_str(&s)).transpose().map_err(DbError::from)
    }

    /// Delete a key from `Dragonfly`.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Dragonfly`] if the delete fails.
    pub async fn delete(&self, key: &str) -> Result<(), DbError> {
        let _: u32 = self.client.del(key).await?;
        Ok(())
    }

    // =========================================================================
    // Walker mirror -- walker:{id}, actor:{id}:walker, walkers:active
    // =========================================================================

    /// Insert or replace one walker and its actor pointer.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if serialization or a write fails.
    pub async fn cache_walker(&self, walker: &Walker) -> Result<(), DbError> {
        let id = walker.walker_id.to_string();
        self.set_json(&walker_key(walker.walker_id), walker, 0).await?;
        let _: () = self
            .client
            .set(actor_walker_key(walker.actor_id), id.as_str(), None, None, false)
            .await?;
        let _: u32 = self.client.sadd(ACTIVE_WALKERS_KEY, id.as_str()).await?;
        Ok(())
    }

    /// Remove one walker. The actor pointer is only removed while it still
    /// names this walker.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Dragonfly`] if a read or delete fails.
    pub async fn evict_walker(&self, walker: WalkerId, actor: ActorId) -> Result<(), DbError> {
        let id = walker.to_string();
        let _: u32 = self.client.srem(ACTIVE_WALKERS_KEY, id.as_str()).await?;
        self.delete(&walker_key(walker)).await?;

        let pointer_key = actor_walker_key(actor);
        let pointer: Option<String> = self.client.get(&pointer_key).await?;
        if pointer.as_deref() == Some(id.as_str()) {
            self.delete(&pointer_key).await?;
        }
        Ok(())
    }

    /// The id of the actor's cached walking record.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Corrupt`] if the pointer is not a UUID.
    pub async fn cached_walker_id(&self, actor: ActorId) -> Result<Option<WalkerId>, DbError> {
        let key = actor_walker_key(actor);
        let pointer: Option<String> = self.client.get(&key).await?;
        pointer
            .map(|s| s.parse::<uuid::Uuid>().map(WalkerId::from))
            .transpose()
            .map_err(|e| DbError::corrupt(key, e.to_string()))
    }

    /// Every cached walker, or `None` when the mirror was never primed or
    /// cannot produce a complete set.
    ///
    /// A dangling or unreadable entry drops the primed marker so the next
    /// caller repopulates from `PostgreSQL`.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Dragonfly`] if a read fails.
    pub async fn cached_walkers(&self) -> Result<Option<Vec<Walker>>, DbError> {
        let primed: u32 = self.client.exists(PRIMED_KEY).await?;
        if primed == 0 {
            return Ok(None);
        }

        let members: Vec<String> = self.client.smembers(ACTIVE_WALKERS_KEY).await?;
        let mut walkers = Vec::with_capacity(members.len());
        for member in &members {
            let key = format!("walker:{member}");
            match self.get_json::<Walker>(&key).await {
                Ok(Some(walker)) => walkers.push(walker),
                Ok(None) => {
                    tracing::warn!(walker = %member, "cached walker set references a missing record");
                    self.delete(PRIMED_KEY).await?;
                    return Ok(None);
                }
                Err(DbError::Serialization(e)) => {
                    tracing::warn!(walker = %member, error = %e, "unreadable cached walker");
                    self.delete(PRIMED_KEY).await?;
                    return Ok(None);
                }
                Err(e) => return Err(e),
            }
        }
        Ok(Some(walkers))
    }

    /// Write `walkers` into the mirror and mark it primed. Existing entries
    /// are kept.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if serialization or a write fails.
    pub async fn prime_walkers(&self, walkers: &[Walker]) -> Result<(), DbError> {
        for walker in walkers {
            self.cache_walker(walker).await?;
        }
        let _: () = self.client.set(PRIMED_KEY, "1", None, None, false).await?;
        tracing::debug!(count = walkers.len(), "Primed walker cache");
        Ok(())
    }

    // =========================================================================
    // Speed modifiers -- actor:{id}:speed
    // =========================================================================

    /// The cached speed modifier, if present and unexpired.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Corrupt`] if the stored value is not a number.
    pub async fn cached_speed(&self, actor: ActorId) -> Result<Option<f64>, DbError> {
        let key = speed_key(actor);
        let value: Option<String> = self.client.get(&key).await?;
        value
            .map(|s| s.parse::<f64>())
            .transpose()
            .map_err(|e| DbError::corrupt(key, e.to_string()))
    }

    /// Cache a speed modifier for `ttl_secs`.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Dragonfly`] if the write fails.
    pub async fn cache_speed(&self, actor: ActorId, modifier: f64, ttl_secs: u64) -> Result<(), DbError> {
        let _: () = self
            .client
            .set(speed_key(actor), modifier.to_string().as_str(), expiration(ttl_secs), None, false)
            .await?;
        Ok(())
    }

    /// Flush all keys from the `Dragonfly` instance.
    ///
    /// **WARNING:** This deletes all data. Only use for testing.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Dragonfly`] if the flush fails.
    pub async fn flush_all(&self) -> Result<(), DbError> {
        let _: () = self.client.flushall(false).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::*;

    #[test]
    fn key_patterns() {
        let id = Uuid::nil();
        assert_eq!(
            walker_key(WalkerId::from(id)),
            "walker:00000000-0000-0000-0000-000000000000"
        );
        assert_eq!(
            actor_walker_key(ActorId::from(id)),
            "actor:00000000-0000-0000-0000-000000000000:walker"
        );
        assert_eq!(
            speed_key(ActorId::from(id)),
            "actor:00000000-0000-0000-0000-000000000000:speed"
        );
    }

    #[test]
    fn zero_ttl_never_expires() {
        assert!(expiration(0).is_none());
        assert!(matches!(expiration(30), Some(Expiration::EX(30))));
    }
}
