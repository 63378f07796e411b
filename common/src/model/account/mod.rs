//! Account models and related types

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Identifier of the user owning an account
pub type UserId = i64;

/// Account model
///
/// `balance` is held in the smallest unit of `currency` and may be negative
/// for liability-style accounts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    /// Opaque unique account ID
    pub account_id: String,
    /// Owning user
    pub user_id: UserId,
    /// Display label
    pub name: String,
    /// Currency code, fixed at creation
    pub currency: String,
    /// Current balance in minor units
    pub balance: i64,
    /// Incremented on every balance write, used for conditional updates
    pub version: i64,
    /// Account creation timestamp
    pub created_at: DateTime<Utc>,
    /// Last update timestamp
    pub updated_at: DateTime<Utc>,
}

/// Parameters for seeding a new account into a store
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewAccount {
    pub account_id: String,
    pub user_id: UserId,
    pub name: String,
    pub currency: String,
    pub balance: i64,
}

impl NewAccount {
    pub fn new(
        account_id: impl Into<String>,
        user_id: UserId,
        name: impl Into<String>,
        currency: impl Into<String>,
        balance: i64,
    ) -> Self {
        Self {
            account_id: account_id.into(),
            user_id,
            name: name.into(),
            currency: currency.into(),
            balance,
        }
    }

    /// Materialize the account at version zero
    pub fn into_account(self, now: DateTime<Utc>) -> Account {
        Account {
            account_id: self.account_id,
            user_id: self.user_id,
            name: self.name,
            currency: self.currency,
            balance: self.balance,
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Account projection returned by balance mutations
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountInfoResponse {
    pub id: String,
    pub name: String,
    pub balance: i64,
    pub currency: String,
}

impl From<&Account> for AccountInfoResponse {
    fn from(account: &Account) -> Self {
        Self {
            id: account.account_id.clone(),
            name: account.name.clone(),
            balance: account.balance,
            currency: account.currency.clone(),
        }
    }
}

impl From<Account> for AccountInfoResponse {
    fn from(account: Account) -> Self {
        Self {
            id: account.account_id,
            name: account.name,
            balance: account.balance,
            currency: account.currency,
        }
    }
}

/// Direction of a relative balance change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BalanceOperation {
    Add,
    Subtract,
}

impl fmt::Display for BalanceOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BalanceOperation::Add => write!(f, "add"),
            BalanceOperation::Subtract => write!(f, "subtract"),
        }
    }
}

impl FromStr for BalanceOperation {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "add" => Ok(BalanceOperation::Add),
            "subtract" => Ok(BalanceOperation::Subtract),
            other => Err(Error::MalformedRequest(format!(
                "operation must be one of add, subtract; got {:?}",
                other
            ))),
        }
    }
}
