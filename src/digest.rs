// src/digest.rs
use crate::market_data::MarketData;
use crate::models::{NewsItem, PerformanceSummary};
use crate::performance::weekly_performance;
use askama::Template;
use chrono::NaiveDate;
use log::{info, warn};
use std::sync::Arc;

pub const SUBJECT: &str = "Weekly Stock Market Newsletter";

/// Everything the digest shows for one tracked symbol. Performance and news
/// are independent: either may be missing without affecting the other.
#[derive(Debug, Clone, PartialEq)]
pub struct SymbolSection {
    pub symbol: String,
    pub performance: Option<PerformanceSummary>,
    pub news: Vec<NewsItem>,
}

#[derive(Template)]
#[template(path = "digest.html")]
struct DigestTemplate<'a> {
    email: &'a str,
    date: String,
    dashboard_url: &'a str,
    sections: &'a [SymbolSection],
}

pub fn render_digest(
    email: &str,
    today: NaiveDate,
    dashboard_url: &str,
    sections: &[SymbolSection],
) -> Result<String, askama::Error> {
    DigestTemplate {
        email,
        date: today.format("%Y-%m-%d").to_string(),
        dashboard_url,
        sections,
    }
    .render()
}

/// Only http(s) links make it into a digest.
fn safe_link(link: String) -> String {
    if link.starts_with("https://") || link.starts_with("http://") {
        link
    } else {
        "#".to_string()
    }
}

pub struct DigestComposer {
    market: Arc<dyn MarketData>,
    dashboard_url: String,
}

impl DigestComposer {
    pub fn new(market: Arc<dyn MarketData>, dashboard_url: impl Into<String>) -> Self {
        Self {
            market,
            dashboard_url: dashboard_url.into(),
        }
    }

    pub async fn section(&self, symbol: &str, today: NaiveDate) -> SymbolSection {
        let news = self
            .market
            .fetch_news(symbol)
            .await
            .into_iter()
            .map(|item| NewsItem {
                link: safe_link(item.link),
                ..item
            })
            .collect();

        let performance = match self.market.fetch_daily_series(symbol).await {
            Some(series) => match weekly_performance(&series, today) {
                Ok(summary) => Some(summary),
                Err(e) => {
                    warn!("No performance summary for {}: {}", symbol, e);
                    None
                }
            },
            None => None,
        };

        SymbolSection {
            symbol: symbol.to_string(),
            performance,
            news,
        }
    }

    /// Builds the digest for `email`, one section per symbol in the given order.
    pub async fn compose(
        &self,
        email: &str,
        symbols: &[String],
        today: NaiveDate,
    ) -> Result<String, askama::Error> {
        let mut sections = Vec::with_capacity(symbols.len());
        for symbol in symbols {
            sections.push(self.section(symbol, today).await);
        }
        info!("Composed digest for {} with {} sections", email, sections.len());
        render_digest(email, today, &self.dashboard_url, &sections)
    }
}
