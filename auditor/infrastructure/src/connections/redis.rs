use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::{Client as RedisClient, RedisResult};
use shaku::{Component, Interface};
use std::io;
use tracing::warn;

pub const DEFAULT_REDIS_URL: &str = "redis://127.0.0.1";

#[async_trait]
pub trait RedisConnection: Interface {
    async fn get_connection(&self) -> RedisResult<MultiplexedConnection>;
}

/// Validates `redis_url` and builds the client shared by every connection.
pub fn create_redis_client(redis_url: &str) -> RedisResult<RedisClient> {
    RedisClient::open(redis_url)
}

fn default_client() -> Option<RedisClient> {
    let redis_url = std::env::var("REDIS_URL").unwrap_or_else(|_| DEFAULT_REDIS_URL.to_string());
    create_redis_client(&redis_url)
        .inspect_err(|e| warn!("Ignoring invalid REDIS_URL {}: {}", redis_url, e))
        .ok()
}

/// Hands out multiplexed connections from one client built at wiring time.
#[derive(Component)]
#[shaku(interface = RedisConnection)]
pub struct RedisConnectionManager {
    #[shaku(default = default_client())]
    client: Option<RedisClient>,
}

impl RedisConnectionManager {
    pub fn new(client: RedisClient) -> Self {
        Self {
            client: Some(client),
        }
    }
}

#[async_trait]
impl RedisConnection for RedisConnectionManager {
    async fn get_connection(&self) -> RedisResult<MultiplexedConnection> {
        let client = self.client.as_ref().ok_or_else(|| {
            io::Error::new(io::ErrorKind::NotConnected, "Redis client not configured")
        })?;
        client.get_multiplexed_async_connection().await
    }
}
