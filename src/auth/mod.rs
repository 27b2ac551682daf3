use std::env;

use axum::http::StatusCode;
use jsonwebtoken::{Algorithm, DecodingKey, Validation};
use serde::Deserialize;

use crate::user;

pub mod middleware;

type Result<T> = std::result::Result<T, Error>;

const TOKEN_COOKIE: &str = "token";

/// Signed-in user as asserted by the external auth backend.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct User {
    id: user::Id,
    name: Option<String>,
}

impl User {
    pub fn new(id: impl Into<user::Id>, name: Option<&str>) -> Self {
        Self {
            id: id.into(),
            name: name.map(String::from),
        }
    }

    pub const fn id(&self) -> &user::Id {
        &self.id
    }

    /// Display name, if the backend knows one.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref().filter(|n| !n.trim().is_empty())
    }
}

impl From<user::Id> for User {
    fn from(id: user::Id) -> Self {
        Self { id, name: None }
    }
}

#[derive(Deserialize)]
struct TokenClaims {
    sub: user::Id,
    #[serde(default)]
    name: Option<String>,
}

#[derive(Clone)]
pub struct Config {
    secret: String,
    issuer: Option<String>,
    sign_in_url: String,
}

impl Config {
    pub fn new(secret: impl Into<String>, issuer: Option<&str>, sign_in_url: &str) -> Self {
        Self {
            secret: secret.into(),
            issuer: issuer.map(String::from),
            sign_in_url: sign_in_url.to_owned(),
        }
    }

    pub fn env() -> Self {
        Self::new(
            env::var("TOKEN_SECRET").expect("TOKEN_SECRET must be set"),
            env::var("TOKEN_ISSUER").ok().as_deref(),
            &env::var("SIGN_IN_URL").unwrap_or("/login".into()),
        )
    }
}

#[derive(Clone)]
pub struct Verifier {
    key: DecodingKey,
    validation: Validation,
    sign_in_url: String,
}

impl Verifier {
    pub fn new(config: &Config) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        if let Some(issuer) = &config.issuer {
            validation.set_issuer(&[issuer]);
        }

        Self {
            key: DecodingKey::from_secret(config.secret.as_bytes()),
            validation,
            sign_in_url: config.sign_in_url.clone(),
        }
    }

    pub fn sign_in_url(&self) -> &str {
        &self.sign_in_url
    }

    pub fn verify(&self, token: &str) -> Result<User> {
        let data = jsonwebtoken::decode::<TokenClaims>(token, &self.key, &self.validation)?;
        let claims = data.claims;

        Ok(User {
            id: claims.sub,
            name: claims.name,
        })
    }
}

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("not signed in")]
    Unauthorized,

    #[error(transparent)]
    _Token(#[from] jsonwebtoken::errors::Error),
}

impl From<&Error> for StatusCode {
    fn from(_: &Error) -> Self {
        StatusCode::UNAUTHORIZED
    }
}
