use std::env;
use std::str::FromStr;
use std::{fs::File, net::SocketAddr};

use axum::http::{HeaderValue, Method, header};
use axum_server::tls_openssl::OpenSSLConfig;
use dotenv::dotenv;
use log::LevelFilter;
use simplelog::{ColorChoice, CombinedLogger, TermLogger, TerminalMode, WriteLogger};
use tower_http::cors::{AllowHeaders, AllowMethods, AllowOrigin};

use crate::{auth, sync};

pub mod cache;
pub mod db;
pub mod pubsub;

/// Deployment stage, read from `ENV` (`local`, `dev`, `stg`, `prod`).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Env {
    Local,
    Dev,
    Stage,
    Production,
}

impl FromStr for Env {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "local" => Ok(Env::Local),
            "dev" => Ok(Env::Dev),
            "stg" => Ok(Env::Stage),
            "prod" => Ok(Env::Production),
            other => Err(format!("Invalid environment: {other}")),
        }
    }
}

impl Env {
    const fn serves_tls(self) -> bool {
        matches!(self, Env::Production)
    }

    /// Listen address. `PORT` overrides the stage default.
    pub fn addr(&self) -> SocketAddr {
        let default_port = if self.serves_tls() { 8443 } else { 8000 };
        let port = env::var("PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(default_port);

        match self {
            Env::Local => SocketAddr::from(([127, 0, 0, 1], port)),
            _ => SocketAddr::from(([0, 0, 0, 0], port)),
        }
    }

    pub fn ssl_config(&self) -> Option<OpenSSLConfig> {
        if !self.serves_tls() {
            return None;
        }

        let ssl_config = OpenSSLConfig::from_pem_file(
            env::var("SSL_CERT_FILE").expect("SSL_CERT_FILE must be set"),
            env::var("SSL_KEY_FILE").expect("SSL_KEY_FILE must be set"),
        )
        .expect("cert should be present and have read permission");
        Some(ssl_config)
    }

    /// The marketplace frontend origins; anything goes before staging.
    pub fn allow_origin(&self) -> AllowOrigin {
        if matches!(self, Env::Local | Env::Dev) {
            return AllowOrigin::any();
        }

        let origins = env::var("ALLOW_ORIGIN")
            .expect("ALLOW_ORIGIN must be set")
            .split(',')
            .map(str::trim)
            .map(HeaderValue::from_str)
            .map(|r| r.expect("invalid ALLOW_ORIGIN value"))
            .collect::<Vec<HeaderValue>>();
        AllowOrigin::list(origins)
    }

    /// The chat API only reads and posts.
    pub fn allow_methods(&self) -> AllowMethods {
        AllowMethods::list([Method::GET, Method::POST, Method::OPTIONS])
    }

    pub fn allow_headers(&self) -> AllowHeaders {
        AllowHeaders::list([header::AUTHORIZATION, header::CONTENT_TYPE])
    }
}

#[derive(Clone)]
pub struct Config {
    pub env: Env,

    pub pg: db::Config,
    pub redis: cache::Config,
    pub pubsub: pubsub::Config,

    pub auth: auth::Config,
    pub feeds: sync::Config,
}

impl Default for Config {
    fn default() -> Self {
        dotenv().ok();

        let rust_log = env::var("RUST_LOG").unwrap_or("info".into());
        let level = LevelFilter::from_str(&rust_log).unwrap_or(LevelFilter::Info);
        let log_file = env::var("SERVICE_NAME")
            .map(|pkg| format!("{pkg}.log"))
            .unwrap_or("service.log".into());

        CombinedLogger::init(vec![
            TermLogger::new(
                level,
                simplelog::Config::default(),
                TerminalMode::Mixed,
                ColorChoice::Auto,
            ),
            WriteLogger::new(
                level,
                simplelog::Config::default(),
                File::create(log_file).expect("Failed to create log file"),
            ),
        ])
        .expect("Failed to initialize logger");

        let env = match env::var("ENV") {
            Ok(env) => env.parse().unwrap_or_else(|e: String| panic!("{e}")),
            Err(_) => Env::Local,
        };

        Self {
            env,
            pg: db::Config::env().unwrap_or_default(),
            redis: cache::Config::env().unwrap_or_default(),
            pubsub: pubsub::Config::env().unwrap_or_default(),
            auth: auth::Config::env(),
            feeds: sync::Config::env().unwrap_or_default(),
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error(transparent)]
    _Diesel(#[from] diesel::result::Error),
    #[error(transparent)]
    _R2d2(#[from] r2d2::Error),
}
