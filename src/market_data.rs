// src/market_data.rs
use crate::error::MarketDataError;
use crate::models::{DailySeries, NewsItem};
use crate::rate_limit::RateGate;
use async_trait::async_trait;
use log::{debug, error, warn};
use reqwest::Client;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "https://www.alphavantage.co/query";
pub const MAX_NEWS_ITEMS: usize = 3;

/// Read-only access to per-symbol news and daily prices.
///
/// Implementations swallow transport and provider failures: callers get an
/// empty list or `None` and the failure is logged.
#[async_trait]
pub trait MarketData: Send + Sync {
    async fn fetch_news(&self, symbol: &str) -> Vec<NewsItem>;
    async fn fetch_daily_series(&self, symbol: &str) -> Option<DailySeries>;
}

#[derive(Deserialize)]
struct NewsResponse {
    #[serde(default)]
    feed: Vec<FeedItem>,
    #[serde(rename = "Note")]
    note: Option<String>,
    #[serde(rename = "Information")]
    information: Option<String>,
    #[serde(rename = "Error Message")]
    error_message: Option<String>,
}

#[derive(Deserialize)]
struct FeedItem {
    title: Option<String>,
    summary: Option<String>,
    url: Option<String>,
}

#[derive(Deserialize)]
struct TimeSeriesResponse {
    #[serde(rename = "Time Series (Daily)")]
    time_series: Option<DailySeries>,
    #[serde(rename = "Note")]
    note: Option<String>,
    #[serde(rename = "Information")]
    information: Option<String>,
    #[serde(rename = "Error Message")]
    error_message: Option<String>,
}

fn provider_message(
    note: Option<String>,
    information: Option<String>,
    error_message: Option<String>,
) -> Option<String> {
    error_message.or(note).or(information)
}

pub fn parse_news(body: &str) -> Result<Vec<NewsItem>, MarketDataError> {
    let response: NewsResponse = serde_json::from_str(body)?;
    if response.feed.is_empty() {
        if let Some(message) =
            provider_message(response.note, response.information, response.error_message)
        {
            return Err(MarketDataError::Provider(message));
        }
    }
    Ok(response
        .feed
        .into_iter()
        .take(MAX_NEWS_ITEMS)
        .map(|item| NewsItem {
            title: item.title.unwrap_or_else(|| "No title".to_string()),
            summary: item.summary.unwrap_or_else(|| "No summary".to_string()),
            link: item.url.unwrap_or_else(|| "#".to_string()),
        })
        .collect())
}

pub fn parse_daily_series(body: &str) -> Result<Option<DailySeries>, MarketDataError> {
    let response: TimeSeriesResponse = serde_json::from_str(body)?;
    match response.time_series {
        Some(series) if !series.is_empty() => Ok(Some(series)),
        _ => match provider_message(response.note, response.information, response.error_message)
        {
            Some(message) => Err(MarketDataError::Provider(message)),
            None => Ok(None),
        },
    }
}

pub struct AlphaVantageClient {
    client: Client,
    base_url: String,
    api_key: String,
    gate: Arc<dyn RateGate>,
}

impl AlphaVantageClient {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        gate: Arc<dyn RateGate>,
    ) -> Result<Self, MarketDataError> {
        let client = Client::builder().timeout(Duration::from_secs(30)).build()?;
        Ok(Self {
            client,
            base_url: base_url.into(),
            api_key: api_key.into(),
            gate,
        })
    }

    async fn get(&self, params: &[(&str, &str)]) -> Result<String, MarketDataError> {
        self.gate.acquire().await;

        let mut query: Vec<(&str, &str)> = params.to_vec();
        query.push(("apikey", self.api_key.as_str()));
        let response = self.client.get(&self.base_url).query(&query).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(MarketDataError::Status(status.as_u16()));
        }
        Ok(response.text().await?)
    }
}

#[async_trait]
impl MarketData for AlphaVantageClient {
    async fn fetch_news(&self, symbol: &str) -> Vec<NewsItem> {
        let limit = MAX_NEWS_ITEMS.to_string();
        let params = [
            ("function", "NEWS_SENTIMENT"),
            ("tickers", symbol),
            ("limit", limit.as_str()),
        ];
        match self.get(&params).await.and_then(|body| parse_news(&body)) {
            Ok(items) => {
                debug!("Fetched {} news items for {}", items.len(), symbol);
                items
            }
            Err(e) => {
                error!("Error fetching news for {}: {}", symbol, e);
                Vec::new()
            }
        }
    }

    async fn fetch_daily_series(&self, symbol: &str) -> Option<DailySeries> {
        let params = [("function", "TIME_SERIES_DAILY"), ("symbol", symbol)];
        match self.get(&params).await.and_then(|body| parse_daily_series(&body)) {
            Ok(Some(series)) => {
                debug!("Fetched {} daily bars for {}", series.len(), symbol);
                Some(series)
            }
            Ok(None) => {
                warn!("No daily series returned for {}", symbol);
                None
            }
            Err(e) => {
                error!("Error fetching daily series for {}: {}", symbol, e);
                None
            }
        }
    }
}
