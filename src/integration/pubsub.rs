use std::env;

use log::{info, warn};

const CLIENT_NAME: &str = "unimart-chat";

/// NATS server carrying the change notifications behind the live feeds.
#[derive(Clone)]
pub struct Config {
    url: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            url: String::from("nats://127.0.0.1:4222"),
        }
    }
}

impl Config {
    /// `NATS_URL` wins; otherwise `NATS_HOST` with an optional `NATS_PORT`.
    pub fn env() -> Option<Self> {
        if let Ok(url) = env::var("NATS_URL") {
            return Some(Self { url });
        }

        let Ok(host) = env::var("NATS_HOST") else {
            warn!("NATS env is not configured");
            return None;
        };
        let port = env::var("NATS_PORT").unwrap_or_else(|_| "4222".to_string());

        Some(Self {
            url: format!("nats://{host}:{port}"),
        })
    }

    pub async fn connect(&self) -> async_nats::Client {
        let options = async_nats::ConnectOptions::new().name(CLIENT_NAME);
        match options.connect(self.url.as_str()).await {
            Ok(client) => {
                info!("Connected to NATS at {}", self.url);
                client
            }
            Err(e) => panic!("Failed to connect to NATS at {}: {e}", self.url),
        }
    }
}
