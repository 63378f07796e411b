//! Audit records for committed balance changes
//!
//! Every successful mutation produces one [`AuditRecord`]. The record carries
//! everything a balance history query needs, so history can be served from
//! the audit trail once it is persisted.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::account::{BalanceOperation, UserId};

/// Kind of mutation that produced an audit record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MutationKind {
    /// Absolute balance set
    Set,
    /// Relative increase
    Add,
    /// Relative decrease
    Subtract,
}

impl From<BalanceOperation> for MutationKind {
    fn from(op: BalanceOperation) -> Self {
        match op {
            BalanceOperation::Add => MutationKind::Add,
            BalanceOperation::Subtract => MutationKind::Subtract,
        }
    }
}

impl fmt::Display for MutationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MutationKind::Set => write!(f, "SET"),
            MutationKind::Add => write!(f, "ADD"),
            MutationKind::Subtract => write!(f, "SUBTRACT"),
        }
    }
}

/// A single committed balance change
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditRecord {
    /// Unique record ID, lets at-least-once consumers deduplicate
    pub id: Uuid,
    pub account_id: String,
    /// Acting user
    pub user_id: UserId,
    pub kind: MutationKind,
    pub old_balance: i64,
    pub new_balance: i64,
    /// When the change was committed (UTC)
    pub timestamp: DateTime<Utc>,
}

impl AuditRecord {
    pub fn new(
        account_id: impl Into<String>,
        user_id: UserId,
        kind: MutationKind,
        old_balance: i64,
        new_balance: i64,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            account_id: account_id.into(),
            user_id,
            kind,
            old_balance,
            new_balance,
            timestamp: Utc::now(),
        }
    }
}

/// Half-open time window `[from, to)`; a missing bound is unbounded
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<DateTime<Utc>>,
}

impl TimeRange {
    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        self.from.map_or(true, |from| ts >= from) && self.to.map_or(true, |to| ts < to)
    }
}

/// One entry of an account's balance history
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BalanceHistoryEntry {
    pub old_balance: i64,
    pub new_balance: i64,
    pub actor: UserId,
    pub timestamp: DateTime<Utc>,
}

impl From<&AuditRecord> for BalanceHistoryEntry {
    fn from(record: &AuditRecord) -> Self {
        Self {
            old_balance: record.old_balance,
            new_balance: record.new_balance,
            actor: record.user_id,
            timestamp: record.timestamp,
        }
    }
}
