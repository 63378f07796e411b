//! Pure balance computations
//!
//! Nothing here touches storage. Each function takes the account as read and
//! returns the balance to persist, or the reason it cannot be persisted.

use common::error::{Error, Result};
use common::model::account::{Account, BalanceOperation};

use crate::config::NegativeBalancePolicy;

/// Computes next balances under a fixed negative balance policy
#[derive(Debug, Clone, Copy, Default)]
pub struct BalanceMutator {
    policy: NegativeBalancePolicy,
}

impl BalanceMutator {
    pub fn new(policy: NegativeBalancePolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> NegativeBalancePolicy {
        self.policy
    }

    /// Balance after setting it to `new_balance`
    pub fn apply_absolute(&self, account: &Account, new_balance: i64) -> Result<i64> {
        self.check_policy(account, new_balance)?;
        Ok(new_balance)
    }

    /// Balance after adding or subtracting `amount`
    ///
    /// Arithmetic is checked: leaving the `i64` range is an
    /// [`Error::ArithmeticOverflow`], never a wrap or a saturation.
    pub fn apply_delta(&self, account: &Account, operation: BalanceOperation, amount: i64) -> Result<i64> {
        let next = match operation {
            BalanceOperation::Add => account.balance.checked_add(amount),
            BalanceOperation::Subtract => account.balance.checked_sub(amount),
        }
        .ok_or_else(|| {
            Error::ArithmeticOverflow(format!(
                "{} {} on account {} with balance {}",
                operation, amount, account.account_id, account.balance
            ))
        })?;

        self.check_policy(account, next)?;
        Ok(next)
    }

    fn check_policy(&self, account: &Account, next: i64) -> Result<()> {
        if self.policy == NegativeBalancePolicy::Reject && next < 0 {
            return Err(Error::NegativeBalanceRejected(format!(
                "account {} would reach {}",
                account.account_id, next
            )));
        }
        Ok(())
    }
}
