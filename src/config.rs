// src/config.rs
use crate::error::ConfigError;
use crate::mailer::SmtpSettings;
use crate::market_data::DEFAULT_BASE_URL;
use log::LevelFilter;
use std::collections::HashMap;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Development,
    Production,
}

impl Environment {
    pub fn log_level(self) -> LevelFilter {
        match self {
            Environment::Development => LevelFilter::Debug,
            Environment::Production => LevelFilter::Info,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RateStrategy {
    Fixed,
    TokenBucket,
}

#[derive(Debug, Clone)]
pub enum StoreBackend {
    Memory,
    Scylla(Vec<String>),
}

#[derive(Debug, Clone)]
pub struct Config {
    pub environment: Environment,
    pub port: u16,
    pub public_base_url: String,
    pub api_key: String,
    pub market_data_url: String,
    pub call_interval: Duration,
    pub rate_strategy: RateStrategy,
    pub smtp: SmtpSettings,
    pub store: StoreBackend,
    pub session_secret: String,
    pub trigger_token: Option<String>,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_vars(&std::env::vars().collect())
    }

    /// Builds the configuration from an explicit variable map.
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let get = |name: &str| vars.get(name).map(|v| v.trim()).filter(|v| !v.is_empty());

        let environment = match get("APP_ENV") {
            None | Some("development") => Environment::Development,
            Some("production") => Environment::Production,
            Some(other) => {
                return Err(ConfigError::Invalid {
                    name: "APP_ENV",
                    value: other.to_string(),
                })
            }
        };
        let production = environment == Environment::Production;

        // Development runs get placeholders; production must supply the real thing.
        let secret = |name: &'static str, fallback: &str| -> Result<String, ConfigError> {
            match get(name) {
                Some(value) => Ok(value.to_string()),
                None if production => Err(ConfigError::Missing(name)),
                None => Ok(fallback.to_string()),
            }
        };

        let port: u16 = parse(get("PORT"), "PORT", 5000)?;
        let interval_secs: u64 = parse(get("PROVIDER_CALL_INTERVAL_SECS"), "PROVIDER_CALL_INTERVAL_SECS", 12)?;
        let smtp_port: u16 = parse(get("SMTP_PORT"), "SMTP_PORT", 587)?;
        let smtp_timeout: u64 = parse(get("SMTP_TIMEOUT_SECS"), "SMTP_TIMEOUT_SECS", 30)?;

        let rate_strategy = match get("RATE_LIMIT_STRATEGY") {
            None | Some("fixed") => RateStrategy::Fixed,
            Some("token_bucket") => RateStrategy::TokenBucket,
            Some(other) => {
                return Err(ConfigError::Invalid {
                    name: "RATE_LIMIT_STRATEGY",
                    value: other.to_string(),
                })
            }
        };

        let store = match get("DATABASE_URL") {
            Some("memory") => StoreBackend::Memory,
            Some(nodes) => StoreBackend::Scylla(
                nodes
                    .split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect(),
            ),
            None => StoreBackend::Scylla(vec!["127.0.0.1:9042".to_string()]),
        };

        let public_base_url = get("PUBLIC_BASE_URL")
            .map(|url| url.trim_end_matches('/').to_string())
            .unwrap_or_else(|| format!("http://localhost:{}", port));

        Ok(Self {
            environment,
            port,
            public_base_url,
            api_key: secret("ALPHA_VANTAGE_API_KEY", "demo")?,
            market_data_url: get("ALPHA_VANTAGE_BASE_URL")
                .unwrap_or(DEFAULT_BASE_URL)
                .to_string(),
            call_interval: Duration::from_secs(interval_secs),
            rate_strategy,
            smtp: SmtpSettings {
                host: get("SMTP_HOST").unwrap_or("smtp.gmail.com").to_string(),
                port: smtp_port,
                username: secret("SENDER_EMAIL", "your_email@example.com")?,
                password: secret("SENDER_PASSWORD", "")?,
                timeout: Duration::from_secs(smtp_timeout),
            },
            store,
            session_secret: secret("SECRET_KEY", "dev-secret-key")?,
            trigger_token: get("TRIGGER_TOKEN").map(str::to_string),
        })
    }

    pub fn dashboard_url(&self) -> String {
        format!("{}/dashboard", self.public_base_url)
    }
}

fn parse<T: std::str::FromStr>(
    raw: Option<&str>,
    name: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match raw {
        None => Ok(default),
        Some(value) => value.parse().map_err(|_| ConfigError::Invalid {
            name,
            value: value.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn development_defaults() {
        let config = Config::from_vars(&HashMap::new()).unwrap();
        assert_eq!(config.environment, Environment::Development);
        assert_eq!(config.port, 5000);
        assert_eq!(config.call_interval, Duration::from_secs(12));
        assert_eq!(config.smtp.port, 587);
        assert_eq!(config.smtp.host, "smtp.gmail.com");
        assert_eq!(config.rate_strategy, RateStrategy::Fixed);
        assert_eq!(config.trigger_token, None);
        assert_eq!(config.dashboard_url(), "http://localhost:5000/dashboard");
        assert!(matches!(config.store, StoreBackend::Scylla(ref nodes) if nodes == &["127.0.0.1:9042"]));
    }

    #[test]
    fn production_requires_secrets() {
        let err = Config::from_vars(&vars(&[("APP_ENV", "production")])).unwrap_err();
        assert!(matches!(err, ConfigError::Missing(_)));

        let config = Config::from_vars(&vars(&[
            ("APP_ENV", "production"),
            ("ALPHA_VANTAGE_API_KEY", "key"),
            ("SENDER_EMAIL", "digest@example.com"),
            ("SENDER_PASSWORD", "app-password"),
            ("SECRET_KEY", "secret"),
            ("TRIGGER_TOKEN", "cron"),
            ("PUBLIC_BASE_URL", "https://stocks.example.com/"),
            ("DATABASE_URL", "10.0.0.1:9042, 10.0.0.2:9042"),
        ]))
        .unwrap();
        assert_eq!(config.environment.log_level(), LevelFilter::Info);
        assert_eq!(config.trigger_token.as_deref(), Some("cron"));
        assert_eq!(config.dashboard_url(), "https://stocks.example.com/dashboard");
        assert!(matches!(config.store, StoreBackend::Scylla(ref nodes) if nodes.len() == 2));
    }

    #[test]
    fn rejects_bad_numbers_and_modes() {
        assert!(matches!(
            Config::from_vars(&vars(&[("PORT", "http")])),
            Err(ConfigError::Invalid { name: "PORT", .. })
        ));
        assert!(Config::from_vars(&vars(&[("APP_ENV", "staging")])).is_err());
        assert!(Config::from_vars(&vars(&[("RATE_LIMIT_STRATEGY", "adaptive")])).is_err());
    }

    #[test]
    fn memory_store_selection() {
        let config = Config::from_vars(&vars(&[("DATABASE_URL", "memory")])).unwrap();
        assert!(matches!(config.store, StoreBackend::Memory));
    }
}
