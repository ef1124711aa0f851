// src/batch.rs
use crate::db::{digest_symbols, AccountStore};
use crate::digest::{DigestComposer, SUBJECT};
use crate::error::StoreError;
use crate::mailer::{deliver, Mailer};
use chrono::NaiveDate;
use log::{error, info, warn};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::Mutex;

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct BatchReport {
    pub accounts: usize,
    pub skipped: usize,
    pub sent: usize,
    pub failed: usize,
}

/// One pass over every account: compose and mail a digest to each account
/// that tracks at least one symbol. Accounts are handled strictly one after
/// another; a failure on one account never stops the rest. At most one run
/// is in flight per batch.
pub struct DigestBatch {
    store: Arc<dyn AccountStore>,
    composer: DigestComposer,
    mailer: Arc<dyn Mailer>,
    running: Mutex<()>,
}

impl DigestBatch {
    pub fn new(
        store: Arc<dyn AccountStore>,
        composer: DigestComposer,
        mailer: Arc<dyn Mailer>,
    ) -> Self {
        Self {
            store,
            composer,
            mailer,
            running: Mutex::new(()),
        }
    }

    /// Runs the batch, waiting for any run already in flight to finish first.
    pub async fn run(&self, today: NaiveDate) -> Result<BatchReport, StoreError> {
        let _running = self.running.lock().await;
        self.run_locked(today).await
    }

    /// Runs the batch unless another run is in flight, in which case `None`.
    pub async fn try_run(&self, today: NaiveDate) -> Option<Result<BatchReport, StoreError>> {
        let Ok(_running) = self.running.try_lock() else {
            warn!("Digest batch already running, not starting another");
            return None;
        };
        Some(self.run_locked(today).await)
    }

    #[cfg(test)]
    pub(crate) async fn hold(&self) -> tokio::sync::MutexGuard<'_, ()> {
        self.running.lock().await
    }

    async fn run_locked(&self, today: NaiveDate) -> Result<BatchReport, StoreError> {
        let accounts = self.store.list_accounts().await?;
        info!("Digest batch started for {} accounts", accounts.len());

        let mut report = BatchReport {
            accounts: accounts.len(),
            ..BatchReport::default()
        };

        for account in &accounts {
            let symbols = match digest_symbols(self.store.as_ref(), &account.email).await {
                Ok(symbols) => symbols,
                Err(e) => {
                    error!("Failed to load symbols for {}: {}", account.email, e);
                    report.failed += 1;
                    continue;
                }
            };
            if symbols.is_empty() {
                report.skipped += 1;
                continue;
            }

            let html = match self.composer.compose(&account.email, &symbols, today).await {
                Ok(html) => html,
                Err(e) => {
                    error!("Failed to compose digest for {}: {}", account.email, e);
                    report.failed += 1;
                    continue;
                }
            };

            if deliver(self.mailer.as_ref(), &account.email, SUBJECT, &html).await {
                report.sent += 1;
            } else {
                report.failed += 1;
            }
        }

        info!(
            "Digest batch completed: {} sent, {} skipped, {} failed",
            report.sent, report.skipped, report.failed
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryStore;
    use crate::digest::tests::{week_series, FakeMarket};
    use crate::mailer::tests::RecordingMailer;
    use crate::models::ListKind;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 5).unwrap()
    }

    fn batch(
        store: Arc<MemoryStore>,
        market: FakeMarket,
        mailer: Arc<RecordingMailer>,
    ) -> DigestBatch {
        DigestBatch::new(
            store,
            DigestComposer::new(Arc::new(market), "http://localhost:5000/dashboard"),
            mailer,
        )
    }

    #[tokio::test]
    async fn only_accounts_with_symbols_get_mail() {
        let store = Arc::new(MemoryStore::new());
        store.create_account("empty@example.com", "h").await.unwrap();
        store.create_account("apple@example.com", "h").await.unwrap();
        store
            .add_symbol("apple@example.com", ListKind::Holdings, "AAPL")
            .await
            .unwrap();

        let mut market = FakeMarket::default();
        market.series.insert("AAPL".into(), week_series());
        let mailer = Arc::new(RecordingMailer::default());

        let report = batch(store, market, mailer.clone()).run(today()).await.unwrap();
        assert_eq!(
            report,
            BatchReport {
                accounts: 2,
                skipped: 1,
                sent: 1,
                failed: 0
            }
        );

        let sent = mailer.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, "apple@example.com");
        assert!(sent[0].1.contains("AAPL"));
    }

    #[tokio::test]
    async fn delivery_failure_does_not_stop_the_batch() {
        let store = Arc::new(MemoryStore::new());
        for email in ["first@example.com", "second@example.com"] {
            store.create_account(email, "h").await.unwrap();
            store
                .add_symbol(email, ListKind::Watchlist, "MSFT")
                .await
                .unwrap();
        }
        let mailer = Arc::new(RecordingMailer {
            reject: vec!["first@example.com".into()],
            ..Default::default()
        });

        let report = batch(store, FakeMarket::default(), mailer.clone())
            .run(today())
            .await
            .unwrap();
        assert_eq!(report.sent, 1);
        assert_eq!(report.failed, 1);
        assert_eq!(mailer.sent.lock().unwrap()[0].0, "second@example.com");
    }

    #[tokio::test]
    async fn overlapping_run_is_refused() {
        let store = Arc::new(MemoryStore::new());
        store.create_account("a@example.com", "h").await.unwrap();
        store
            .add_symbol("a@example.com", ListKind::Holdings, "AAPL")
            .await
            .unwrap();
        let mailer = Arc::new(RecordingMailer::default());
        let batch = batch(store, FakeMarket::default(), mailer.clone());

        let guard = batch.hold().await;
        assert!(batch.try_run(today()).await.is_none());
        drop(guard);

        let report = batch.try_run(today()).await.unwrap().unwrap();
        assert_eq!(report.sent, 1);
        assert_eq!(mailer.sent.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn symbols_are_fetched_holdings_first() {
        let store = Arc::new(MemoryStore::new());
        store.create_account("a@example.com", "h").await.unwrap();
        store
            .add_symbol("a@example.com", ListKind::Watchlist, "TSLA")
            .await
            .unwrap();
        store
            .add_symbol("a@example.com", ListKind::Holdings, "AAPL")
            .await
            .unwrap();

        let market = Arc::new(FakeMarket::default());
        let mailer = Arc::new(RecordingMailer::default());
        DigestBatch::new(store, DigestComposer::new(market.clone(), "#"), mailer)
            .run(today())
            .await
            .unwrap();

        assert_eq!(
            *market.calls.lock().unwrap(),
            vec!["news:AAPL", "series:AAPL", "news:TSLA", "series:TSLA"]
        );
    }
}
