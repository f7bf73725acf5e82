//! SQLite Account Store
//!
//! Durable account table. Every balance mutation is one conditional
//! `UPDATE ... RETURNING` statement, so the check and the write commit together
//! and concurrent deductions for the same identity linearize on SQLite's write
//! lock. Connections come from an sqlx pool.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info};

use crate::{AccountStore, AccountSummary, StoreError, StoreResult};

/// Default pool size for the account database
const MAX_CONNECTIONS: u32 = 8;

/// SQLite-backed account store
#[derive(Debug, Clone)]
pub struct SqliteAccountStore {
    /// Connection pool
    pool: SqlitePool,
}

fn to_sql_amount(username: &str, amount: u64) -> StoreResult<i64> {
    i64::try_from(amount).map_err(|_| StoreError::BalanceOverflow(username.to_string()))
}

fn from_sql_amount(value: i64) -> u64 {
    // The table carries CHECK (balance >= 0)
    u64::try_from(value).unwrap_or_default()
}

impl SqliteAccountStore {
    /// Open (creating if missing) the database at `database_url` and ensure the schema exists
    pub async fn connect(database_url: &str) -> StoreResult<Self> {
        info!("Opening SQLite account store: {database_url}");

        let options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(30));

        let pool = SqlitePoolOptions::new()
            .max_connections(MAX_CONNECTIONS)
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.initialize_schema().await?;
        Ok(store)
    }

    /// Create the accounts table
    pub async fn initialize_schema(&self) -> StoreResult<()> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS accounts (
                username TEXT PRIMARY KEY NOT NULL,
                password_hash TEXT NOT NULL,
                balance INTEGER NOT NULL DEFAULT 0 CHECK (balance >= 0),
                created_at TEXT NOT NULL
            );",
        )
        .execute(&self.pool)
        .await?;

        debug!("SQLite account schema ready");
        Ok(())
    }

    /// Close the pool, waiting for checked-out connections
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl AccountStore for SqliteAccountStore {
    async fn create_account(
        &self,
        username: &str,
        password_hash: &str,
        balance: u64,
    ) -> StoreResult<AccountSummary> {
        let initial = to_sql_amount(username, balance)?;
        let inserted = sqlx::query(
            "INSERT INTO accounts (username, password_hash, balance, created_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(username) DO NOTHING;",
        )
        .bind(username)
        .bind(password_hash)
        .bind(initial)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;

        if inserted.rows_affected() == 0 {
            return Err(StoreError::AccountExists(username.to_string()));
        }

        debug!("Created account: {username}");
        Ok(AccountSummary {
            username: username.to_string(),
            balance,
        })
    }

    async fn remove_account(&self, username: &str) -> StoreResult<()> {
        let deleted = sqlx::query("DELETE FROM accounts WHERE username = ?1;")
            .bind(username)
            .execute(&self.pool)
            .await?;

        if deleted.rows_affected() == 0 {
            return Err(StoreError::AccountNotFound(username.to_string()));
        }
        debug!("Removed account: {username}");
        Ok(())
    }

    async fn credential(&self, username: &str) -> StoreResult<Option<String>> {
        let hash = sqlx::query_scalar::<_, String>(
            "SELECT password_hash FROM accounts WHERE username = ?1;",
        )
        .bind(username)
        .fetch_optional(&self.pool)
        .await?;
        Ok(hash)
    }

    async fn balance(&self, username: &str) -> StoreResult<u64> {
        let balance =
            sqlx::query_scalar::<_, i64>("SELECT balance FROM accounts WHERE username = ?1;")
                .bind(username)
                .fetch_optional(&self.pool)
                .await?
                .ok_or_else(|| StoreError::AccountNotFound(username.to_string()))?;
        Ok(from_sql_amount(balance))
    }

    async fn try_deduct(&self, username: &str, cost: u64) -> StoreResult<u64> {
        let amount = to_sql_amount(username, cost)?;
        let updated = sqlx::query_scalar::<_, i64>(
            "UPDATE accounts SET balance = balance - ?1
             WHERE username = ?2 AND balance >= ?1
             RETURNING balance;",
        )
        .bind(amount)
        .bind(username)
        .fetch_optional(&self.pool)
        .await?;

        match updated {
            Some(balance) => Ok(from_sql_amount(balance)),
            // Nothing was written; report why
            None => {
                let balance = self.balance(username).await?;
                Err(StoreError::InsufficientCredit { balance, cost })
            }
        }
    }

    async fn credit(&self, username: &str, amount: u64) -> StoreResult<u64> {
        let delta = to_sql_amount(username, amount)?;
        let updated = sqlx::query_scalar::<_, i64>(
            "UPDATE accounts SET balance = balance + ?1
             WHERE username = ?2 AND balance <= ?3
             RETURNING balance;",
        )
        .bind(delta)
        .bind(username)
        .bind(i64::MAX - delta)
        .fetch_optional(&self.pool)
        .await?;

        match updated {
            Some(balance) => Ok(from_sql_amount(balance)),
            None => {
                // Distinguish a missing account from an overflowing one
                self.balance(username).await?;
                Err(StoreError::BalanceOverflow(username.to_string()))
            }
        }
    }

    async fn list_accounts(&self) -> StoreResult<Vec<AccountSummary>> {
        let rows = sqlx::query("SELECT username, balance FROM accounts ORDER BY username;")
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter()
            .map(|row| -> StoreResult<AccountSummary> {
                Ok(AccountSummary {
                    username: row.try_get("username")?,
                    balance: from_sql_amount(row.try_get("balance")?),
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn open_store(dir: &TempDir) -> SqliteAccountStore {
        let url = format!("sqlite://{}", dir.path().join("accounts.db").display());
        SqliteAccountStore::connect(&url).await.unwrap()
    }

    #[tokio::test]
    async fn test_account_round_trip() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir).await;

        store.create_account("alice", "$argon2id$stub", 10).await.unwrap();
        assert_eq!(
            store.credential("alice").await.unwrap().as_deref(),
            Some("$argon2id$stub")
        );
        assert_eq!(store.credential("nobody").await.unwrap(), None);
        assert!(matches!(
            store.create_account("alice", "x", 0).await,
            Err(StoreError::AccountExists(_))
        ));
    }

    #[tokio::test]
    async fn test_deduct_and_credit() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir).await;
        store.create_account("bob", "h", 10).await.unwrap();

        assert_eq!(store.try_deduct("bob", 5).await.unwrap(), 5);
        assert_eq!(store.try_deduct("bob", 5).await.unwrap(), 0);
        assert!(matches!(
            store.try_deduct("bob", 1).await,
            Err(StoreError::InsufficientCredit { balance: 0, cost: 1 })
        ));
        assert_eq!(store.credit("bob", 7).await.unwrap(), 7);
        assert_eq!(store.balance("bob").await.unwrap(), 7);
    }

    #[tokio::test]
    async fn test_missing_account_errors() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir).await;

        assert!(matches!(
            store.try_deduct("ghost", 1).await,
            Err(StoreError::AccountNotFound(_))
        ));
        assert!(matches!(
            store.credit("ghost", 1).await,
            Err(StoreError::AccountNotFound(_))
        ));
        assert!(matches!(
            store.remove_account("ghost").await,
            Err(StoreError::AccountNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_schema_survives_reopen() {
        let dir = TempDir::new().unwrap();
        {
            let store = open_store(&dir).await;
            store.create_account("carol", "h", 4).await.unwrap();
            store.close().await;
        }
        let store = open_store(&dir).await;
        assert_eq!(store.balance("carol").await.unwrap(), 4);
        assert_eq!(store.list_accounts().await.unwrap().len(), 1);
    }
}
