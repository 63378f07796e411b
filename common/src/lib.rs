//! Common types and utilities for the balance mutation engine
//!
//! This library contains the shared error taxonomy, account and audit models,
//! and database helpers used by the balance service and its tests.

pub mod error;
pub mod model;
pub mod db;

/// Re-export important types
pub use error::{Error, ErrorExt, ErrorResponse, Result, StoreError, StoreResult};
pub use model::account::{Account, AccountInfoResponse, BalanceOperation, NewAccount, UserId};
pub use model::audit::{AuditRecord, BalanceHistoryEntry, MutationKind, TimeRange};
