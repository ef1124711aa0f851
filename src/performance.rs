// src/performance.rs
use crate::models::{DailyBar, DailySeries, PerformanceSummary};
use chrono::{Duration, NaiveDate};
use thiserror::Error;

const WINDOW_DAYS: i64 = 7;

#[derive(Debug, Error, PartialEq)]
pub enum SeriesError {
    #[error("series is empty")]
    Empty,

    #[error("no trading day on or before {0}")]
    NoLatestDay(NaiveDate),

    #[error("malformed date key {0:?}")]
    BadDate(String),

    #[error("field {field} missing or not numeric on {date}")]
    BadField { date: NaiveDate, field: &'static str },

    #[error("reference close on {0} is zero")]
    ZeroPastClose(NaiveDate),
}

/// Derives the weekly summary from a daily series.
///
/// `latest` is the newest day on or before `today`; the comparison point is
/// the oldest day inside `[today - 7d, ..]`, falling back to `latest`. High and
/// low cover `[today - 7d, today]` and collapse to the latest close when that
/// window holds no bars.
pub fn weekly_performance(
    series: &DailySeries,
    today: NaiveDate,
) -> Result<PerformanceSummary, SeriesError> {
    if series.is_empty() {
        return Err(SeriesError::Empty);
    }

    let mut days: Vec<(NaiveDate, &DailyBar)> = Vec::with_capacity(series.len());
    for (key, bar) in series {
        let date = NaiveDate::parse_from_str(key, "%Y-%m-%d")
            .map_err(|_| SeriesError::BadDate(key.clone()))?;
        days.push((date, bar));
    }
    days.sort_by_key(|(date, _)| *date);

    let week_ago = today - Duration::days(WINDOW_DAYS);

    let (latest_date, latest_bar) = days
        .iter()
        .rev()
        .find(|(date, _)| *date <= today)
        .copied()
        .ok_or(SeriesError::NoLatestDay(today))?;
    let (past_date, past_bar) = days
        .iter()
        .find(|(date, _)| *date >= week_ago)
        .copied()
        .unwrap_or((latest_date, latest_bar));

    let latest_close = field(latest_date, "4. close", latest_bar.close.as_deref())?;
    let past_close = field(past_date, "4. close", past_bar.close.as_deref())?;
    if past_close == 0.0 {
        return Err(SeriesError::ZeroPastClose(past_date));
    }
    let change_percent = (latest_close - past_close) / past_close * 100.0;

    let mut weekly_high: Option<f64> = None;
    let mut weekly_low: Option<f64> = None;
    for (date, bar) in days
        .iter()
        .filter(|(date, _)| *date >= week_ago && *date <= today)
    {
        let high = field(*date, "2. high", bar.high.as_deref())?;
        let low = field(*date, "3. low", bar.low.as_deref())?;
        weekly_high = Some(weekly_high.map_or(high, |h| h.max(high)));
        weekly_low = Some(weekly_low.map_or(low, |l| l.min(low)));
    }

    Ok(PerformanceSummary {
        latest_close,
        change_percent,
        weekly_high: weekly_high.unwrap_or(latest_close),
        weekly_low: weekly_low.unwrap_or(latest_close),
    })
}

fn field(date: NaiveDate, name: &'static str, raw: Option<&str>) -> Result<f64, SeriesError> {
    raw.and_then(|value| value.trim().parse::<f64>().ok())
        .filter(|value| value.is_finite())
        .ok_or(SeriesError::BadField { date, field: name })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bar(close: &str, high: &str, low: &str) -> DailyBar {
        DailyBar {
            open: Some(close.to_string()),
            high: Some(high.to_string()),
            low: Some(low.to_string()),
            close: Some(close.to_string()),
        }
    }

    fn day(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn two_day_week() {
        let mut series = DailySeries::new();
        series.insert("2024-01-01".into(), bar("100", "101", "99"));
        series.insert("2024-01-05".into(), bar("110", "112", "108"));

        let summary = weekly_performance(&series, day("2024-01-05")).unwrap();
        assert_eq!(summary.latest_close, 110.0);
        assert!((summary.change_percent - 10.0).abs() < 1e-9);
        assert_eq!(summary.weekly_high, 112.0);
        assert_eq!(summary.weekly_low, 99.0);
    }

    #[test]
    fn change_sign_follows_close_difference() {
        let cases = [("100", "90"), ("90", "100"), ("50.5", "50.25"), ("1", "1000")];
        for (past, latest) in cases {
            let mut series = DailySeries::new();
            series.insert("2024-03-04".into(), bar(past, past, past));
            series.insert("2024-03-08".into(), bar(latest, latest, latest));
            let summary = weekly_performance(&series, day("2024-03-08")).unwrap();
            let diff: f64 = latest.parse::<f64>().unwrap() - past.parse::<f64>().unwrap();
            assert_eq!(summary.change_percent.signum(), diff.signum());
        }
    }

    #[test]
    fn stale_series_collapses_high_low_to_latest_close() {
        let mut series = DailySeries::new();
        series.insert("2024-01-01".into(), bar("100", "105", "95"));
        series.insert("2024-01-02".into(), bar("102", "104", "98"));

        let summary = weekly_performance(&series, day("2024-01-20")).unwrap();
        assert_eq!(summary.latest_close, 102.0);
        assert_eq!(summary.change_percent, 0.0);
        assert_eq!(summary.weekly_high, 102.0);
        assert_eq!(summary.weekly_low, 102.0);
    }

    #[test]
    fn days_after_today_are_not_latest() {
        let mut series = DailySeries::new();
        series.insert("2024-01-03".into(), bar("100", "101", "99"));
        series.insert("2024-01-04".into(), bar("104", "106", "103"));
        series.insert("2024-01-09".into(), bar("500", "600", "400"));

        let summary = weekly_performance(&series, day("2024-01-05")).unwrap();
        assert_eq!(summary.latest_close, 104.0);
        assert!((summary.change_percent - 4.0).abs() < 1e-9);
        assert_eq!(summary.weekly_high, 106.0);
        assert_eq!(summary.weekly_low, 99.0);
    }

    #[test]
    fn empty_series() {
        assert_eq!(
            weekly_performance(&DailySeries::new(), day("2024-01-05")),
            Err(SeriesError::Empty)
        );
    }

    #[test]
    fn only_future_days() {
        let mut series = DailySeries::new();
        series.insert("2024-02-01".into(), bar("1", "1", "1"));
        assert_eq!(
            weekly_performance(&series, day("2024-01-05")),
            Err(SeriesError::NoLatestDay(day("2024-01-05")))
        );
    }

    #[test]
    fn missing_close_is_rejected() {
        let mut series = DailySeries::new();
        series.insert(
            "2024-01-05".into(),
            DailyBar {
                high: Some("10".into()),
                low: Some("9".into()),
                ..DailyBar::default()
            },
        );
        assert!(matches!(
            weekly_performance(&series, day("2024-01-05")),
            Err(SeriesError::BadField { field: "4. close", .. })
        ));
    }

    #[test]
    fn non_numeric_high_is_rejected() {
        let mut series = DailySeries::new();
        series.insert("2024-01-04".into(), bar("10", "n/a", "9"));
        series.insert("2024-01-05".into(), bar("11", "12", "10"));
        assert!(matches!(
            weekly_performance(&series, day("2024-01-05")),
            Err(SeriesError::BadField { field: "2. high", .. })
        ));
    }

    #[test]
    fn zero_reference_close_yields_no_summary() {
        let mut series = DailySeries::new();
        series.insert("2024-01-02".into(), bar("0", "1", "0"));
        series.insert("2024-01-05".into(), bar("3", "4", "2"));
        assert_eq!(
            weekly_performance(&series, day("2024-01-05")),
            Err(SeriesError::ZeroPastClose(day("2024-01-02")))
        );
    }

    #[test]
    fn malformed_date_key() {
        let mut series = DailySeries::new();
        series.insert("yesterday".into(), bar("1", "1", "1"));
        assert_eq!(
            weekly_performance(&series, day("2024-01-05")),
            Err(SeriesError::BadDate("yesterday".into()))
        );
    }
}
