//! Repository for account data

use async_trait::async_trait;
use chrono::Utc;
use common::db::{init_db_pool, run_migrations};
use common::error::{StoreError, StoreResult};
use common::model::account::{Account, NewAccount, UserId};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use sqlx::{postgres::PgRow, PgPool, Row};
use tracing::{debug, info};

/// Account repository trait defining the interface for account data storage
///
/// Every lookup is scoped by owner: an account held by another user is
/// reported exactly like a missing one.
#[async_trait]
pub trait AccountRepository: Send + Sync {
    /// Insert a new account; an existing ID yields [`StoreError::Duplicate`]
    async fn create_account(&self, account: NewAccount) -> StoreResult<Account>;

    /// Get an account by ID, if it exists and belongs to `user_id`
    async fn get_account(&self, user_id: UserId, account_id: &str) -> StoreResult<Option<Account>>;

    /// Write `new_balance` only if the stored version still equals
    /// `expected_version`
    ///
    /// Returns the stored account after the write. A version mismatch, or an
    /// account that disappeared since it was read, yields
    /// [`StoreError::Conflict`].
    async fn compare_and_set_balance(
        &self,
        user_id: UserId,
        account_id: &str,
        expected_version: i64,
        new_balance: i64,
    ) -> StoreResult<Account>;
}

/// In-memory repository for account data
pub struct InMemoryAccountRepository {
    /// Accounts by ID
    pub accounts: DashMap<String, Account>,
}

impl InMemoryAccountRepository {
    /// Create a new in-memory account repository
    pub fn new() -> Self {
        Self {
            accounts: DashMap::new(),
        }
    }
}

impl Default for InMemoryAccountRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AccountRepository for InMemoryAccountRepository {
    async fn create_account(&self, account: NewAccount) -> StoreResult<Account> {
        match self.accounts.entry(account.account_id.clone()) {
            Entry::Occupied(_) => Err(StoreError::Duplicate {
                account_id: account.account_id,
            }),
            Entry::Vacant(slot) => {
                let account = account.into_account(Utc::now());
                slot.insert(account.clone());
                Ok(account)
            }
        }
    }

    async fn get_account(&self, user_id: UserId, account_id: &str) -> StoreResult<Option<Account>> {
        Ok(self
            .accounts
            .get(account_id)
            .filter(|a| a.user_id == user_id)
            .map(|a| a.clone()))
    }

    async fn compare_and_set_balance(
        &self,
        user_id: UserId,
        account_id: &str,
        expected_version: i64,
        new_balance: i64,
    ) -> StoreResult<Account> {
        // The shard write lock held by get_mut makes check-and-write atomic
        let mut entry = self
            .accounts
            .get_mut(account_id)
            .filter(|a| a.user_id == user_id)
            .ok_or_else(|| StoreError::Conflict {
                account_id: account_id.to_string(),
            })?;

        if entry.version != expected_version {
            return Err(StoreError::Conflict {
                account_id: account_id.to_string(),
            });
        }

        entry.balance = new_balance;
        entry.version += 1;
        entry.updated_at = Utc::now();
        Ok(entry.clone())
    }
}

/// PostgreSQL repository for account data
pub struct PostgresAccountRepository {
    /// Database connection pool
    pool: PgPool,
}

const ACCOUNT_COLUMNS: &str =
    "account_id, user_id, name, currency, balance, version, created_at, updated_at";

fn account_from_row(row: &PgRow) -> StoreResult<Account> {
    let corrupted = |e: sqlx::Error| StoreError::Corrupted(e.to_string());

    Ok(Account {
        account_id: row.try_get("account_id").map_err(corrupted)?,
        user_id: row.try_get("user_id").map_err(corrupted)?,
        name: row.try_get("name").map_err(corrupted)?,
        currency: row.try_get("currency").map_err(corrupted)?,
        balance: row.try_get("balance").map_err(corrupted)?,
        version: row.try_get("version").map_err(corrupted)?,
        created_at: row.try_get("created_at").map_err(corrupted)?,
        updated_at: row.try_get("updated_at").map_err(corrupted)?,
    })
}

impl PostgresAccountRepository {
    /// Create a new PostgreSQL account repository
    pub async fn new(database_url: &str) -> StoreResult<Self> {
        let pool = init_db_pool(database_url, 5).await?;
        Ok(Self { pool })
    }

    /// Create a new PostgreSQL account repository with configuration
    pub async fn with_config(config: &crate::config::BalanceServiceConfig) -> StoreResult<Self> {
        info!("Connecting to PostgreSQL database with pool size: {}", config.db_pool_size);

        let pool = init_db_pool(&config.database_url, config.db_pool_size).await?;
        Ok(Self { pool })
    }

    /// Apply pending schema migrations
    pub async fn migrate(&self) -> StoreResult<()> {
        run_migrations(&self.pool).await?;
        info!("Database migrations applied");
        Ok(())
    }
}

#[async_trait]
impl AccountRepository for PostgresAccountRepository {
    async fn create_account(&self, account: NewAccount) -> StoreResult<Account> {
        debug!("Creating account {} for user {}", account.account_id, account.user_id);

        let row = sqlx::query(&format!(
            "INSERT INTO accounts (account_id, user_id, name, currency, balance)
             VALUES ($1, $2, $3, $4, $5)
             RETURNING {}",
            ACCOUNT_COLUMNS
        ))
        .bind(&account.account_id)
        .bind(account.user_id)
        .bind(&account.name)
        .bind(&account.currency)
        .bind(account.balance)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(db) if db.is_unique_violation() => StoreError::Duplicate {
                account_id: account.account_id.clone(),
            },
            other => StoreError::Database(other),
        })?;

        account_from_row(&row)
    }

    async fn get_account(&self, user_id: UserId, account_id: &str) -> StoreResult<Option<Account>> {
        debug!("Getting account from database: {} for user {}", account_id, user_id);

        let row = sqlx::query(&format!(
            "SELECT {} FROM accounts WHERE account_id = $1 AND user_id = $2",
            ACCOUNT_COLUMNS
        ))
        .bind(account_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(account_from_row).transpose()
    }

    async fn compare_and_set_balance(
        &self,
        user_id: UserId,
        account_id: &str,
        expected_version: i64,
        new_balance: i64,
    ) -> StoreResult<Account> {
        debug!(
            "Updating balance in database: {} to {} at version {}",
            account_id, new_balance, expected_version
        );

        let row = sqlx::query(&format!(
            "UPDATE accounts
             SET balance = $1, version = version + 1, updated_at = NOW()
             WHERE account_id = $2 AND user_id = $3 AND version = $4
             RETURNING {}",
            ACCOUNT_COLUMNS
        ))
        .bind(new_balance)
        .bind(account_id)
        .bind(user_id)
        .bind(expected_version)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => account_from_row(&row),
            None => Err(StoreError::Conflict {
                account_id: account_id.to_string(),
            }),
        }
    }
}
