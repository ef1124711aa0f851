// src/models.rs
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Account {
    pub email: String,
    pub password_hash: String,
}

/// Which of an account's two symbol lists an entry belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ListKind {
    Holdings,
    Watchlist,
}

impl ListKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ListKind::Holdings => "holdings",
            ListKind::Watchlist => "watchlist",
        }
    }
}

impl fmt::Display for ListKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ListKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "holdings" => Ok(ListKind::Holdings),
            "watchlist" => Ok(ListKind::Watchlist),
            other => Err(format!("unknown list type: {}", other)),
        }
    }
}

/// Upper-cases and validates a user supplied ticker.
pub fn normalize_symbol(raw: &str) -> Option<String> {
    let symbol = raw.trim().to_uppercase();
    let valid = !symbol.is_empty()
        && symbol.len() <= 10
        && symbol
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '-');
    if valid {
        Some(symbol)
    } else {
        None
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewsItem {
    pub title: String,
    pub summary: String,
    pub link: String,
}

/// One trading day as returned by TIME_SERIES_DAILY. Values stay textual
/// until the performance calculation reads them.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct DailyBar {
    #[serde(rename = "1. open")]
    #[allow(dead_code)]
    pub open: Option<String>,
    #[serde(rename = "2. high")]
    pub high: Option<String>,
    #[serde(rename = "3. low")]
    pub low: Option<String>,
    #[serde(rename = "4. close")]
    pub close: Option<String>,
}

/// Daily bars keyed by `YYYY-MM-DD`.
pub type DailySeries = BTreeMap<String, DailyBar>;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PerformanceSummary {
    pub latest_close: f64,
    pub change_percent: f64,
    pub weekly_high: f64,
    pub weekly_low: f64,
}
