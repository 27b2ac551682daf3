use std::collections::HashSet;
use std::sync::Arc;
use std::{env, fmt};

use async_trait::async_trait;
use log::{error, warn};
use redis::AsyncCommands;

use crate::conversation;

/// Participant sets change never, so an hour only bounds memory.
pub const PARTICIPANTS_TTL: i64 = 3600;

pub type Service = Arc<dyn Cache + Send + Sync>;

#[derive(Clone)]
pub struct Config {
    host: String,
    port: u16,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: String::from("127.0.0.1"),
            port: 6379,
        }
    }
}

impl Config {
    pub fn env() -> Option<Self> {
        let host = env::var("REDIS_HOST").ok();
        let port = env::var("REDIS_PORT")
            .unwrap_or_else(|_| "6379".to_string())
            .parse()
            .ok();

        if let (Some(host), Some(port)) = (host, port) {
            Some(Self { host, port })
        } else {
            warn!("Redis env is not configured");
            None
        }
    }

    pub async fn init(&self) -> redis::aio::ConnectionManager {
        let client = match redis::Client::open(format!("redis://{}:{}", self.host, self.port)) {
            Ok(client) => client,
            Err(e) => panic!("Error creating redis client: {e}"),
        };

        match client.get_connection_manager().await {
            Ok(con) => con,
            Err(e) => panic!("Error connecting to redis: {e}"),
        }
    }
}

pub enum Key<'a> {
    Participants(&'a conversation::Id),
}

impl fmt::Display for Key<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Participants(id) => write!(f, "conversation:{id}:participants"),
        }
    }
}

/// Best-effort set cache. Failures are logged and read as a miss.
#[async_trait]
pub trait Cache {
    async fn smembers(&self, key: &Key<'_>) -> Option<HashSet<String>>;

    async fn sadd_ex(&self, key: &Key<'_>, members: &[String], ttl: i64);
}

#[derive(Clone)]
pub struct Redis {
    con: redis::aio::ConnectionManager,
}

impl Redis {
    pub fn new(con: redis::aio::ConnectionManager) -> Self {
        Self { con }
    }
}

#[async_trait]
impl Cache for Redis {
    async fn smembers(&self, key: &Key<'_>) -> Option<HashSet<String>> {
        let mut con = self.con.clone();
        let members: redis::RedisResult<HashSet<String>> = con.smembers(key.to_string()).await;

        match members {
            Ok(m) if !m.is_empty() => Some(m),
            Ok(_) => None,
            Err(e) => {
                error!("Failed to read {key} from cache: {e:?}");
                None
            }
        }
    }

    async fn sadd_ex(&self, key: &Key<'_>, members: &[String], ttl: i64) {
        if members.is_empty() {
            return;
        }

        let mut con = self.con.clone();
        let key = key.to_string();
        let res: redis::RedisResult<()> = redis::pipe()
            .atomic()
            .sadd(&key, members.to_vec())
            .ignore()
            .expire(&key, ttl)
            .ignore()
            .query_async(&mut con)
            .await;

        if let Err(e) = res {
            error!("Failed to write {key} to cache: {e:?}");
        }
    }
}
