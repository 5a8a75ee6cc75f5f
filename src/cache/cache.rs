use std::{fmt::Debug, future::Future};

use redis::{aio::MultiplexedConnection, AsyncCommands, FromRedisValue, ToRedisArgs};
use redis_macros::{FromRedisValue, ToRedisArgs};
use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::error::{CacheError, Error};

pub const CATALOG_CACHE_KEY: &str = "catalog-cache-key";

// Caching - keys

#[derive(Clone, Debug, PartialEq)]
pub struct CacheKey {
    _value: String,
    _type: CacheKeyType,
}

impl CacheKey {
    pub fn from<T: ToString>(r#type: CacheKeyType, key: T) -> Self {
        Self {
            _value: key.to_string(),
            _type: r#type,
        }
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self._type {
            CacheKeyType::TagList => write!(f, "tags-{}", self._value),
            CacheKeyType::IngredientList => write!(f, "ingredients-{}", self._value),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum CacheKeyType {
    TagList,
    IngredientList,
}

impl CacheKeyType {
    pub fn new<T: ToString>(self, key: T) -> CacheKey {
        CacheKey::from(self, key)
    }
}

// Cache - wrappers

/// Every cached value is bound to the current catalog key. Rotating that
/// key invalidates all of them.
async fn get_cache_bind(cache: &mut MultiplexedConnection) -> Result<Option<String>, Error> {
    get_cache_value::<&str, String>(CATALOG_CACHE_KEY, cache).await
}

#[derive(Serialize, Deserialize, FromRedisValue, ToRedisArgs, Clone, Debug)]
struct RedisValue {
    value: serde_json::Value,
    _bind: Option<String>,
}

/// Redis-backed read cache. Without a connection every read falls through
/// to the callback.
#[derive(Clone, Default)]
pub struct Cache {
    connection: Option<MultiplexedConnection>,
}

impl Cache {
    pub fn disabled() -> Self {
        Self { connection: None }
    }

    pub async fn connect(url: &str) -> Result<Self, Error> {
        let client = redis::Client::open(url).map_err(CacheError::from)?;
        let connection = client
            .get_multiplexed_async_connection()
            .await
            .map_err(CacheError::from)?;

        log::info!("Connected to cache");
        Ok(Self {
            connection: Some(connection),
        })
    }

    pub async fn get_or<T, F, Fut>(&self, key: CacheKey, callback: F) -> Result<T, Error>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, Error>>,
    {
        let mut cache = match &self.connection {
            Some(connection) => connection.clone(),
            None => return callback().await,
        };

        match lookup::<T>(&key, &mut cache).await {
            Ok(Some(value)) => {
                log::trace!("> Found {key}");
                return Ok(value);
            }
            Ok(None) => {}
            Err(_) => log::warn!("> Cache lookup failed for {key}, bypassing"),
        }

        log::trace!("> Fetching {key}");
        let value = callback().await?;

        if let Err(e) = store(&key, &value, &mut cache).await {
            log::error!("> Failed to cache {key}: {e:?}");
        }

        Ok(value)
    }

    /// Rotates the catalog bind key; every catalog value cached so far goes stale.
    pub async fn invalidate_catalog(&self) -> Result<(), Error> {
        let mut cache = match &self.connection {
            Some(connection) => connection.clone(),
            None => return Ok(()),
        };

        let bind = uuid::Uuid::new_v4().to_string();
        set_cache_value(CATALOG_CACHE_KEY, bind, &mut cache).await?;
        log::debug!("> Invalidated catalog cache");

        Ok(())
    }
}

async fn lookup<T: DeserializeOwned>(
    key: &CacheKey,
    cache: &mut MultiplexedConnection,
) -> Result<Option<T>, Error> {
    let cached = get_cache_value::<String, RedisValue>(key.to_string(), cache).await?;
    let cached = match cached {
        Some(cached) => cached,
        None => return Ok(None),
    };

    if cached._bind != get_cache_bind(cache).await? {
        log::trace!("> Invalidated {key}");
        return Ok(None);
    }

    match serde_json::from_value(cached.value) {
        Ok(value) => Ok(Some(value)),
        Err(_) => {
            log::error!("> Failed to deserialize cached value. Deleting {key}");
            delete_cache_value(key.to_string(), cache).await?;
            Ok(None)
        }
    }
}

async fn store<T: Serialize>(
    key: &CacheKey,
    value: &T,
    cache: &mut MultiplexedConnection,
) -> Result<(), Error> {
    let value = serde_json::to_value(value)
        .map_err(|e| CacheError::new(format!("{e}")))?;
    let value = RedisValue {
        value,
        _bind: get_cache_bind(cache).await?,
    };

    set_cache_value(key.to_string(), value, cache).await
}

// Cache - raw handlers

pub async fn set_cache_value<K: ToRedisArgs + Send + Sync, V: ToRedisArgs + Send + Sync>(
    key: K,
    value: V,
    cache: &mut MultiplexedConnection,
) -> Result<(), Error> {
    let _: () = cache
        .set(key, value)
        .await
        .map_err(CacheError::from)?;

    Ok(())
}

pub async fn delete_cache_value<K: ToRedisArgs + Send + Sync>(
    key: K,
    cache: &mut MultiplexedConnection,
) -> Result<(), Error> {
    let _: () = cache
        .del(key)
        .await
        .map_err(CacheError::from)?;

    Ok(())
}

pub async fn get_cache_value<K: ToRedisArgs + Send + Sync, V: FromRedisValue + Debug>(
    key: K,
    cache: &mut MultiplexedConnection,
) -> Result<Option<V>, Error> {
    let value: Option<V> = cache
        .get(key)
        .await
        .map_err(CacheError::from)?;

    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_are_namespaced() {
        assert_eq!(CacheKeyType::TagList.new("all").to_string(), "tags-all");
        assert_eq!(
            CacheKeyType::IngredientList.new("all").to_string(),
            "ingredients-all"
        );
        assert_ne!(
            CacheKeyType::TagList.new("salt"),
            CacheKeyType::IngredientList.new("salt")
        );
    }

    #[tokio::test]
    async fn disabled_cache_always_fetches() {
        let cache = Cache::disabled();

        let value: Vec<i32> = cache
            .get_or(CacheKeyType::TagList.new("all"), || async { Ok(vec![1, 2, 3]) })
            .await
            .unwrap();
        assert_eq!(value, vec![1, 2, 3]);

        assert!(cache.invalidate_catalog().await.is_ok());
    }
}
