// src/db.rs
use crate::error::StoreError;
use crate::models::{Account, ListKind};
use async_trait::async_trait;
use chrono::Utc;
use log::{debug, info};
use scylla::frame::response::result::{CqlValue, Row};
use scylla::{query::Query, Session, SessionBuilder};
use tokio::sync::RwLock;

/// Persistence for accounts and their holdings/watchlist entries.
///
/// Tracked symbols keep insertion order and duplicates are allowed; removal
/// drops the first matching entry only.
#[async_trait]
pub trait AccountStore: Send + Sync {
    /// Fails with `DuplicateAccount` and writes nothing if the email is taken.
    async fn create_account(&self, email: &str, password_hash: &str) -> Result<(), StoreError>;
    async fn find_account(&self, email: &str) -> Result<Option<Account>, StoreError>;
    /// All accounts, oldest first.
    async fn list_accounts(&self) -> Result<Vec<Account>, StoreError>;
    async fn tracked_symbols(&self, email: &str, list: ListKind) -> Result<Vec<String>, StoreError>;
    /// Fails with `AccountNotFound` when no account has this email.
    async fn add_symbol(&self, email: &str, list: ListKind, symbol: &str) -> Result<(), StoreError>;
    /// Returns whether an entry was removed.
    async fn remove_symbol(
        &self,
        email: &str,
        list: ListKind,
        symbol: &str,
    ) -> Result<bool, StoreError>;
}

/// Holdings first, then watchlist.
pub async fn digest_symbols(store: &dyn AccountStore, email: &str) -> Result<Vec<String>, StoreError> {
    let mut symbols = store.tracked_symbols(email, ListKind::Holdings).await?;
    symbols.extend(store.tracked_symbols(email, ListKind::Watchlist).await?);
    Ok(symbols)
}

pub async fn ensure_account(store: &dyn AccountStore, email: &str) -> Result<(), StoreError> {
    match store.find_account(email).await? {
        Some(_) => Ok(()),
        None => Err(StoreError::AccountNotFound(email.to_string())),
    }
}

const KEYSPACE: &str = "CREATE KEYSPACE IF NOT EXISTS stock_digest WITH REPLICATION = {'class': 'SimpleStrategy', 'replication_factor': 1}";
const ACCOUNTS_TABLE: &str = "CREATE TABLE IF NOT EXISTS stock_digest.accounts (email TEXT PRIMARY KEY, password_hash TEXT, created_at BIGINT)";
const SYMBOLS_TABLE: &str = "CREATE TABLE IF NOT EXISTS stock_digest.tracked_symbols (email TEXT, list_kind TEXT, entry_id TIMEUUID, symbol TEXT, PRIMARY KEY ((email), list_kind, entry_id)) WITH CLUSTERING ORDER BY (list_kind ASC, entry_id ASC)";

pub struct ScyllaStore {
    session: Session,
}

impl ScyllaStore {
    pub async fn connect(nodes: &[String]) -> Result<Self, StoreError> {
        let mut builder = SessionBuilder::new();
        for node in nodes {
            builder = builder.known_node(node);
        }
        let session = builder
            .build()
            .await
            .map_err(|e| StoreError::Connection(e.to_string()))?;

        for statement in [KEYSPACE, ACCOUNTS_TABLE, SYMBOLS_TABLE] {
            session
                .query(statement, &[])
                .await
                .map_err(|e| StoreError::Query(e.to_string()))?;
        }

        info!("Successfully connected to ScyllaDB.");
        Ok(Self { session })
    }

    async fn rows(
        &self,
        query: Query,
        values: impl scylla::frame::value::ValueList,
    ) -> Result<Vec<Row>, StoreError> {
        let result = self
            .session
            .query(query, values)
            .await
            .map_err(|e| StoreError::Query(e.to_string()))?;
        Ok(result.rows.unwrap_or_default())
    }
}

fn text(row: &Row, index: usize, table: &'static str) -> Result<String, StoreError> {
    match row.columns.get(index) {
        Some(Some(CqlValue::Text(value))) | Some(Some(CqlValue::Ascii(value))) => {
            Ok(value.clone())
        }
        _ => Err(StoreError::Corrupt(table)),
    }
}

fn bigint(row: &Row, index: usize, table: &'static str) -> Result<i64, StoreError> {
    match row.columns.get(index) {
        Some(Some(CqlValue::BigInt(value))) => Ok(*value),
        _ => Err(StoreError::Corrupt(table)),
    }
}

fn entry_id(row: &Row) -> Result<CqlValue, StoreError> {
    match row.columns.first() {
        Some(Some(CqlValue::Timeuuid(id))) => Ok(CqlValue::Timeuuid(*id)),
        _ => Err(StoreError::Corrupt("tracked_symbols")),
    }
}

#[async_trait]
impl AccountStore for ScyllaStore {
    async fn create_account(&self, email: &str, password_hash: &str) -> Result<(), StoreError> {
        let query = Query::new(
            "INSERT INTO stock_digest.accounts (email, password_hash, created_at) VALUES (?, ?, ?) IF NOT EXISTS",
        );
        let rows = self
            .rows(query, (email, password_hash, Utc::now().timestamp_millis()))
            .await?;
        let applied = rows
            .first()
            .and_then(|row| row.columns.first())
            .map(|column| matches!(column, Some(CqlValue::Boolean(true))))
            .ok_or(StoreError::Corrupt("accounts"))?;
        if !applied {
            return Err(StoreError::DuplicateAccount(email.to_string()));
        }
        debug!("Created account {}", email);
        Ok(())
    }

    async fn find_account(&self, email: &str) -> Result<Option<Account>, StoreError> {
        let query = Query::new("SELECT email, password_hash FROM stock_digest.accounts WHERE email = ?");
        match self.rows(query, (email,)).await?.first() {
            Some(row) => Ok(Some(Account {
                email: text(row, 0, "accounts")?,
                password_hash: text(row, 1, "accounts")?,
            })),
            None => Ok(None),
        }
    }

    async fn list_accounts(&self) -> Result<Vec<Account>, StoreError> {
        let query = Query::new("SELECT email, password_hash, created_at FROM stock_digest.accounts");
        let mut accounts = Vec::new();
        for row in self.rows(query, &[]).await? {
            let account = Account {
                email: text(&row, 0, "accounts")?,
                password_hash: text(&row, 1, "accounts")?,
            };
            accounts.push((bigint(&row, 2, "accounts")?, account));
        }
        // Partition order is token order; creation time gives a stable listing.
        accounts.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.email.cmp(&b.1.email)));
        Ok(accounts.into_iter().map(|(_, account)| account).collect())
    }

    async fn tracked_symbols(&self, email: &str, list: ListKind) -> Result<Vec<String>, StoreError> {
        let query = Query::new(
            "SELECT symbol FROM stock_digest.tracked_symbols WHERE email = ? AND list_kind = ?",
        );
        self.rows(query, (email, list.as_str()))
            .await?
            .iter()
            .map(|row| text(row, 0, "tracked_symbols"))
            .collect()
    }

    async fn add_symbol(&self, email: &str, list: ListKind, symbol: &str) -> Result<(), StoreError> {
        ensure_account(self, email).await?;
        // now() timeuuids order entries by insertion, below millisecond resolution.
        let query = Query::new(
            "INSERT INTO stock_digest.tracked_symbols (email, list_kind, entry_id, symbol) VALUES (?, ?, now(), ?)",
        );
        self.rows(query, (email, list.as_str(), symbol)).await?;
        debug!("Added {} to {} of {}", symbol, list, email);
        Ok(())
    }

    async fn remove_symbol(
        &self,
        email: &str,
        list: ListKind,
        symbol: &str,
    ) -> Result<bool, StoreError> {
        let query = Query::new(
            "SELECT entry_id, symbol FROM stock_digest.tracked_symbols WHERE email = ? AND list_kind = ?",
        );
        let rows = self.rows(query, (email, list.as_str())).await?;
        let mut target = None;
        for row in &rows {
            if text(row, 1, "tracked_symbols")? == symbol {
                target = Some(entry_id(row)?);
                break;
            }
        }
        let Some(entry_id) = target else {
            return Ok(false);
        };

        let delete = Query::new(
            "DELETE FROM stock_digest.tracked_symbols WHERE email = ? AND list_kind = ? AND entry_id = ?",
        );
        self.rows(delete, (email, list.as_str(), entry_id)).await?;
        debug!("Removed {} from {} of {}", symbol, list, email);
        Ok(true)
    }
}

#[derive(Default)]
struct MemoryState {
    accounts: Vec<Account>,
    entries: Vec<(String, ListKind, String)>,
}

/// Process-local store used for development runs and tests.
#[derive(Default)]
pub struct MemoryStore {
    state: RwLock<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AccountStore for MemoryStore {
    async fn create_account(&self, email: &str, password_hash: &str) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        if state.accounts.iter().any(|a| a.email == email) {
            return Err(StoreError::DuplicateAccount(email.to_string()));
        }
        state.accounts.push(Account {
            email: email.to_string(),
            password_hash: password_hash.to_string(),
        });
        Ok(())
    }

    async fn find_account(&self, email: &str) -> Result<Option<Account>, StoreError> {
        let state = self.state.read().await;
        Ok(state.accounts.iter().find(|a| a.email == email).cloned())
    }

    async fn list_accounts(&self) -> Result<Vec<Account>, StoreError> {
        Ok(self.state.read().await.accounts.clone())
    }

    async fn tracked_symbols(&self, email: &str, list: ListKind) -> Result<Vec<String>, StoreError> {
        let state = self.state.read().await;
        Ok(state
            .entries
            .iter()
            .filter(|(owner, kind, _)| owner == email && *kind == list)
            .map(|(_, _, symbol)| symbol.clone())
            .collect())
    }

    async fn add_symbol(&self, email: &str, list: ListKind, symbol: &str) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        if !state.accounts.iter().any(|a| a.email == email) {
            return Err(StoreError::AccountNotFound(email.to_string()));
        }
        state
            .entries
            .push((email.to_string(), list, symbol.to_string()));
        Ok(())
    }

    async fn remove_symbol(
        &self,
        email: &str,
        list: ListKind,
        symbol: &str,
    ) -> Result<bool, StoreError> {
        let mut state = self.state.write().await;
        let position = state
            .entries
            .iter()
            .position(|(owner, kind, s)| owner == email && *kind == list && s == symbol);
        match position {
            Some(index) => {
                state.entries.remove(index);
                Ok(true)
            }
            None => Ok(false),
        }
    }
}
