// src/main.rs
mod api;
mod auth;
mod batch;
mod config;
mod db;
mod digest;
mod error;
mod mailer;
mod market_data;
mod models;
mod pages;
mod performance;
mod rate_limit;

use crate::api::AppState;
use crate::auth::SessionKeys;
use crate::batch::DigestBatch;
use crate::config::{Config, Environment, RateStrategy, StoreBackend};
use crate::db::{AccountStore, MemoryStore, ScyllaStore};
use crate::digest::DigestComposer;
use crate::mailer::SmtpMailer;
use crate::market_data::AlphaVantageClient;
use crate::rate_limit::{FixedDelay, RateGate, TokenBucket};
use chrono::Local;
use clap::{Parser, Subcommand};
use env_logger::Builder;
use log::{error, info, warn};
use std::net::Ipv4Addr;
use std::process::ExitCode;
use std::sync::Arc;

/// Stock watchlist tracker with a weekly email digest.
#[derive(Debug, Parser)]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the web application (default).
    Serve,
    /// Compose and mail one digest per account, then exit.
    SendDigests,
}

fn init_logger(environment: Environment) {
    let mut builder = Builder::new();
    builder
        .filter_level(environment.log_level())
        .format_timestamp_secs();
    if let Ok(filters) = std::env::var("RUST_LOG") {
        builder.parse_filters(&filters);
    }
    builder.init();
}

async fn open_store(config: &Config) -> Result<Arc<dyn AccountStore>, error::StoreError> {
    match &config.store {
        StoreBackend::Memory => {
            warn!("Using the in-memory account store; data is lost on exit.");
            Ok(Arc::new(MemoryStore::new()))
        }
        StoreBackend::Scylla(nodes) => Ok(Arc::new(ScyllaStore::connect(nodes).await?)),
    }
}

fn build_batch(
    config: &Config,
    store: Arc<dyn AccountStore>,
) -> Result<DigestBatch, Box<dyn std::error::Error>> {
    let gate: Arc<dyn RateGate> = match config.rate_strategy {
        RateStrategy::Fixed => Arc::new(FixedDelay::new(config.call_interval)),
        // One call per interval on average, no burst beyond one.
        RateStrategy::TokenBucket => {
            let per_minute = (60 / config.call_interval.as_secs().max(1)).max(1) as u32;
            Arc::new(TokenBucket::new(per_minute, 1.0))
        }
    };
    let market = AlphaVantageClient::new(&config.market_data_url, &config.api_key, gate)?;
    let composer = DigestComposer::new(Arc::new(market), config.dashboard_url());
    let mailer = SmtpMailer::new(&config.smtp)?;
    Ok(DigestBatch::new(store, composer, Arc::new(mailer)))
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            init_logger(Environment::Development);
            error!("Invalid configuration: {}", e);
            return ExitCode::FAILURE;
        }
    };
    init_logger(config.environment);

    let store = match open_store(&config).await {
        Ok(store) => store,
        Err(e) => {
            error!("Failed to initialize database: {}", e);
            return ExitCode::FAILURE;
        }
    };
    info!("Connected to account store...");

    let batch = match build_batch(&config, store.clone()) {
        Ok(batch) => batch,
        Err(e) => {
            error!("Failed to set up the digest pipeline: {}", e);
            return ExitCode::FAILURE;
        }
    };

    match cli.command.unwrap_or(Command::Serve) {
        Command::SendDigests => match batch.run(Local::now().date_naive()).await {
            Ok(report) => {
                info!("Batch report: {:?}", report);
                ExitCode::SUCCESS
            }
            Err(e) => {
                error!("Digest batch could not start: {}", e);
                ExitCode::FAILURE
            }
        },
        Command::Serve => {
            let state = Arc::new(AppState {
                store,
                keys: SessionKeys::new(&config.session_secret),
                batch,
                trigger_token: config.trigger_token.clone(),
                secure_cookies: config.environment == Environment::Production,
            });
            if state.trigger_token.is_none() {
                warn!("TRIGGER_TOKEN is not set; the digest trigger endpoint will reject every call.");
            }

            info!("Starting the stock digest application...");
            info!("Server running on http://0.0.0.0:{}", config.port);
            warp::serve(api::routes(state))
                .run((Ipv4Addr::UNSPECIFIED, config.port))
                .await;
            ExitCode::SUCCESS
        }
    }
}
