// src/error.rs
use thiserror::Error;
use warp::reject::Reject;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),

    #[error("invalid value for {name}: {value}")]
    Invalid { name: &'static str, value: String },
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("an account with email {0} already exists")]
    DuplicateAccount(String),

    #[error("account {0} not found")]
    AccountNotFound(String),

    #[error("failed to connect to the account store: {0}")]
    Connection(String),

    #[error("account store query failed: {0}")]
    Query(String),

    #[error("unexpected row shape in {0}")]
    Corrupt(&'static str),
}

#[derive(Debug, Error)]
pub enum MarketDataError {
    #[error("HTTP request failed: {0}")]
    Transport(#[source] reqwest::Error),

    #[error("provider answered with HTTP {0}")]
    Status(u16),

    #[error("failed to decode provider response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("provider refused the request: {0}")]
    Provider(String),
}

// Request URLs carry the provider key as a query parameter.
impl From<reqwest::Error> for MarketDataError {
    fn from(e: reqwest::Error) -> Self {
        MarketDataError::Transport(e.without_url())
    }
}

#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("invalid mailbox {0}")]
    Address(String),

    #[error("failed to build message: {0}")]
    Build(String),

    #[error("SMTP transport failed: {0}")]
    Transport(String),
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("unauthorized")]
    Unauthorized,

    #[error("invalid email or password")]
    InvalidCredentials,

    #[error("failed to hash password: {0}")]
    Hash(String),

    #[error("failed to sign session token: {0}")]
    Token(String),
}

/// Error surfaced by the web layer as a warp rejection. Store and auth
/// failures on interactive routes become flashed redirects instead.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("failed to render page: {0}")]
    Render(#[from] askama::Error),
}

impl Reject for AppError {}
