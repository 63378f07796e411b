//! Balance service implementation
//!
//! [`BalanceService`] drives the [`BalanceMutator`] over accounts read from an
//! [`AccountRepository`]. Each account is updated with a single
//! read-then-conditional-write, so a concurrent change between the two is
//! reported as a conflict instead of being overwritten. Batches hold no lock
//! across accounts: updates committed before a failure stay committed.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use common::error::{Error, ErrorExt, Result};
use common::model::account::{Account, AccountInfoResponse, BalanceOperation, NewAccount, UserId};
use common::model::audit::{AuditRecord, BalanceHistoryEntry, MutationKind, TimeRange};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::audit::{AuditSink, ChannelAuditSink, NoopAuditSink, TracingAuditSink};
use crate::config::{BalanceServiceConfig, NegativeBalancePolicy};
use crate::mutator::BalanceMutator;
use crate::repository::{AccountRepository, InMemoryAccountRepository, PostgresAccountRepository};

/// Repository Type
pub enum RepositoryType {
    /// In-memory repository
    InMemory,
    /// PostgreSQL repository
    Postgres(String),
}

/// Why an account in a batch was left untouched
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Absent, or owned by another user
    NotFound,
    /// Already processed earlier in the same batch
    Duplicate,
    /// Delta would leave the representable range
    Overflow,
    /// Result would be negative under [`NegativeBalancePolicy::Reject`]
    NegativeBalance,
    /// Account changed between read and write
    Conflict,
    /// Store read or write failed
    StoreFailure,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::NotFound => write!(f, "not found"),
            SkipReason::Duplicate => write!(f, "duplicate"),
            SkipReason::Overflow => write!(f, "overflow"),
            SkipReason::NegativeBalance => write!(f, "negative balance"),
            SkipReason::Conflict => write!(f, "concurrent modification"),
            SkipReason::StoreFailure => write!(f, "store failure"),
        }
    }
}

/// Per-account result of a batch
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchOutcome {
    /// Balance written; carries the account as stored
    Modified(Account),
    /// Account left untouched
    Skipped {
        account_id: String,
        reason: SkipReason,
    },
}

/// Outcomes of a batch, in input order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchReport {
    pub outcomes: Vec<BatchOutcome>,
}

impl BatchReport {
    /// Accounts that were written, in processing order
    pub fn modified(&self) -> impl Iterator<Item = &Account> {
        self.outcomes.iter().filter_map(|o| match o {
            BatchOutcome::Modified(account) => Some(account),
            BatchOutcome::Skipped { .. } => None,
        })
    }

    /// Skipped account IDs with their reasons
    pub fn skipped(&self) -> impl Iterator<Item = (&str, SkipReason)> {
        self.outcomes.iter().filter_map(|o| match o {
            BatchOutcome::Skipped { account_id, reason } => Some((account_id.as_str(), *reason)),
            BatchOutcome::Modified(_) => None,
        })
    }

    pub fn modified_count(&self) -> usize {
        self.modified().count()
    }

    /// Consume the report, keeping only written accounts
    pub fn into_modified(self) -> Vec<Account> {
        self.outcomes
            .into_iter()
            .filter_map(|o| match o {
                BatchOutcome::Modified(account) => Some(account),
                BatchOutcome::Skipped { .. } => None,
            })
            .collect()
    }
}

/// Balance service for absolute and batch relative balance updates
pub struct BalanceService {
    /// Repository for account data
    repo: Arc<dyn AccountRepository>,
    /// Receives a record for every committed change
    audit: Arc<dyn AuditSink>,
    mutator: BalanceMutator,
}

impl BalanceService {
    /// Create a balance service from explicit collaborators
    pub fn new(repo: Arc<dyn AccountRepository>, audit: Arc<dyn AuditSink>) -> Self {
        Self::with_policy(repo, audit, NegativeBalancePolicy::default())
    }

    /// Create a balance service with a specific negative balance policy
    pub fn with_policy(
        repo: Arc<dyn AccountRepository>,
        audit: Arc<dyn AuditSink>,
        policy: NegativeBalancePolicy,
    ) -> Self {
        Self {
            repo,
            audit,
            mutator: BalanceMutator::new(policy),
        }
    }

    /// Create a new balance service with a specific repository type
    pub async fn with_repository(repo_type: RepositoryType, audit: Arc<dyn AuditSink>) -> Result<Self> {
        let repo: Arc<dyn AccountRepository> = match repo_type {
            RepositoryType::InMemory => Arc::new(InMemoryAccountRepository::new()),
            RepositoryType::Postgres(database_url) => Arc::new(
                PostgresAccountRepository::new(&database_url)
                    .await
                    .with_context(|| "Failed to connect account store")?,
            ),
        };

        Ok(Self::new(repo, audit))
    }

    /// Create a new balance service with a configuration
    ///
    /// Uses the Postgres store. With audit logging enabled, records are queued
    /// and written to the log by a background task; its handle is returned so
    /// the caller can await it after dropping the service, draining the queue.
    pub async fn with_config(config: &BalanceServiceConfig) -> Result<(Self, Option<JoinHandle<()>>)> {
        let repo = PostgresAccountRepository::with_config(config)
            .await
            .with_context(|| "Failed to connect account store")?;
        repo.migrate()
            .await
            .with_context(|| "Failed to migrate account store")?;

        let (audit, forwarder) = if config.audit_logging {
            let (sink, handle) = ChannelAuditSink::spawn(config.audit_buffer_size, Arc::new(TracingAuditSink));
            (Arc::new(sink) as Arc<dyn AuditSink>, Some(handle))
        } else {
            (Arc::new(NoopAuditSink) as Arc<dyn AuditSink>, None)
        };

        let service = Self::with_policy(Arc::new(repo), audit, config.negative_balance_policy);
        Ok((service, forwarder))
    }

    pub fn negative_balance_policy(&self) -> NegativeBalancePolicy {
        self.mutator.policy()
    }

    /// Seed an account into the store
    pub async fn create_account(&self, account: NewAccount) -> Result<Account> {
        info!("Creating account {} for user {}", account.account_id, account.user_id);
        let account_id = account.account_id.clone();
        self.repo
            .create_account(account)
            .await
            .with_context(|| format!("Failed to create account {}", account_id))
    }

    /// Get an account by ID, scoped to its owner
    pub async fn get_account(&self, user_id: UserId, account_id: &str) -> Result<Option<Account>> {
        self.repo
            .get_account(user_id, account_id)
            .await
            .with_context(|| format!("Failed to retrieve account {}", account_id))
    }

    /// Set one account's balance to `new_balance`
    pub async fn modify_single_account_balance(
        &self,
        user_id: UserId,
        account_id: &str,
        new_balance: i64,
    ) -> Result<AccountInfoResponse> {
        let account = self
            .get_account(user_id, account_id)
            .await
            .map_err(|e| {
                error!("Failed to get account {} for user {}: {}", account_id, user_id, e);
                e
            })?
            .ok_or_else(|| Error::AccountNotFound(account_id.to_string()))?;

        let old_balance = account.balance;
        let next_balance = self
            .mutator
            .apply_absolute(&account, new_balance)
            .with_context(|| format!("Cannot set balance of account {}", account_id))?;

        let updated = self
            .repo
            .compare_and_set_balance(user_id, account_id, account.version, next_balance)
            .await
            .with_context(|| format!("Failed to modify balance of account {}", account_id))
            .map_err(|e| {
                error!("Failed to modify account {} balance for user {}: {}", account_id, user_id, e);
                e
            })?;

        info!(
            "User {} has modified account {} balance from {} to {}",
            user_id, account_id, old_balance, updated.balance
        );

        self.record(AuditRecord::new(
            account_id,
            user_id,
            MutationKind::Set,
            old_balance,
            updated.balance,
        ))
        .await;

        Ok(AccountInfoResponse::from(updated))
    }

    /// Add or subtract `amount` on each account, best-effort
    ///
    /// Accounts that cannot be modified are left out of the result. The call
    /// fails only when nothing was modified, usually with
    /// [`Error::AccountNotFound`].
    pub async fn modify_multiple_account_balances(
        &self,
        user_id: UserId,
        account_ids: &[String],
        operation: BalanceOperation,
        amount: i64,
    ) -> Result<Vec<AccountInfoResponse>> {
        let (report, store_failure) = self.run_batch(user_id, account_ids, operation, amount).await?;

        if report.modified_count() == 0 {
            return Err(empty_batch_error(&report, store_failure));
        }

        Ok(report.into_modified().into_iter().map(AccountInfoResponse::from).collect())
    }

    /// Run a batch delta and report the outcome for every requested ID
    ///
    /// IDs are processed in input order. A store failure or conflict on one
    /// account skips that account and the batch moves on; accounts already
    /// written stay written.
    pub async fn apply_batch(
        &self,
        user_id: UserId,
        account_ids: &[String],
        operation: BalanceOperation,
        amount: i64,
    ) -> Result<BatchReport> {
        let (report, _) = self.run_batch(user_id, account_ids, operation, amount).await?;
        Ok(report)
    }

    /// Batch loop; also hands back the first store error seen
    async fn run_batch(
        &self,
        user_id: UserId,
        account_ids: &[String],
        operation: BalanceOperation,
        amount: i64,
    ) -> Result<(BatchReport, Option<Error>)> {
        if account_ids.is_empty() {
            return Err(Error::MalformedRequest("accountIds must not be empty".to_string()));
        }
        if amount <= 0 {
            return Err(Error::MalformedRequest(format!("amount must be positive, got {}", amount)));
        }

        debug!(
            "User {} applying {} {} to {} accounts",
            user_id,
            operation,
            amount,
            account_ids.len()
        );

        let mut seen = HashSet::with_capacity(account_ids.len());
        let mut store_failure = None;
        let mut report = BatchReport {
            outcomes: Vec::with_capacity(account_ids.len()),
        };

        for account_id in account_ids {
            let outcome = if !seen.insert(account_id.as_str()) {
                BatchOutcome::Skipped {
                    account_id: account_id.clone(),
                    reason: SkipReason::Duplicate,
                }
            } else {
                match self.apply_delta(user_id, account_id, operation, amount).await {
                    Ok(outcome) => outcome,
                    Err(e) => {
                        let reason = if e.is_retryable() {
                            SkipReason::Conflict
                        } else {
                            SkipReason::StoreFailure
                        };
                        if store_failure.is_none() {
                            store_failure = Some(e);
                        }
                        BatchOutcome::Skipped {
                            account_id: account_id.clone(),
                            reason,
                        }
                    }
                }
            };

            if let BatchOutcome::Skipped { account_id, reason } = &outcome {
                warn!("Skipping account {} in batch for user {}: {}", account_id, user_id, reason);
            }
            report.outcomes.push(outcome);
        }

        info!(
            "User {} has modified {} accounts in batch ({} skipped)",
            user_id,
            report.modified_count(),
            report.outcomes.len() - report.modified_count()
        );

        Ok((report, store_failure))
    }

    async fn apply_delta(
        &self,
        user_id: UserId,
        account_id: &str,
        operation: BalanceOperation,
        amount: i64,
    ) -> Result<BatchOutcome> {
        let skipped = |reason| BatchOutcome::Skipped {
            account_id: account_id.to_string(),
            reason,
        };

        let account = match self.get_account(user_id, account_id).await.map_err(|e| {
            error!("Batch read of account {} for user {} failed: {}", account_id, user_id, e);
            e
        })? {
            Some(account) => account,
            None => return Ok(skipped(SkipReason::NotFound)),
        };

        let next_balance = match self.mutator.apply_delta(&account, operation, amount) {
            Ok(next) => next,
            Err(Error::ArithmeticOverflow(_)) => return Ok(skipped(SkipReason::Overflow)),
            Err(Error::NegativeBalanceRejected(_)) => return Ok(skipped(SkipReason::NegativeBalance)),
            Err(e) => return Err(e),
        };

        let updated = self
            .repo
            .compare_and_set_balance(user_id, account_id, account.version, next_balance)
            .await
            .with_context(|| format!("Failed to modify balance of account {}", account_id))
            .map_err(|e| {
                error!("Batch update of account {} for user {} failed: {}", account_id, user_id, e);
                e
            })?;

        debug!(
            "Account {} balance {} -> {} ({} {})",
            account_id, account.balance, updated.balance, operation, amount
        );

        self.record(AuditRecord::new(
            account_id,
            user_id,
            MutationKind::from(operation),
            account.balance,
            updated.balance,
        ))
        .await;

        Ok(BatchOutcome::Modified(updated))
    }

    /// Balance change history of one account
    ///
    /// History persistence does not exist yet; audit records carry the data
    /// this query will be served from.
    pub async fn list_balance_history(
        &self,
        user_id: UserId,
        account_id: &str,
        _range: TimeRange,
    ) -> Result<Vec<BalanceHistoryEntry>> {
        debug!("Balance history requested for account {} by user {}", account_id, user_id);
        Err(Error::NotImplemented("account balance history".to_string()))
    }

    /// Hand a record to the audit sink; failures are logged, never returned
    async fn record(&self, record: AuditRecord) {
        let id = record.id;
        if let Err(e) = self.audit.append(record).await {
            warn!("Failed to append audit record {}: {}", id, e);
        }
    }
}

/// Error for a batch that modified nothing
///
/// A store failure wins. When every account was found but rejected by the
/// mutator, the first rejection is reported; otherwise the batch counts as
/// not found.
fn empty_batch_error(report: &BatchReport, store_failure: Option<Error>) -> Error {
    if let Some(err) = store_failure {
        return err;
    }

    let requested = report.outcomes.len();
    let mut reasons = report.skipped().map(|(_, reason)| reason);
    if report.skipped().all(|(_, reason)| reason != SkipReason::NotFound) {
        match reasons.find(|r| *r != SkipReason::Duplicate) {
            Some(SkipReason::Overflow) => {
                return Error::ArithmeticOverflow(format!(
                    "none of the {} requested accounts could be modified without overflow",
                    requested
                ))
            }
            Some(SkipReason::NegativeBalance) => {
                return Error::NegativeBalanceRejected(format!(
                    "none of the {} requested accounts may go negative",
                    requested
                ))
            }
            _ => {}
        }
    }

    Error::AccountNotFound(format!(
        "none of the {} requested accounts could be modified",
        requested
    ))
}
