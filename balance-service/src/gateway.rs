//! Request/response translation for balance mutations
//!
//! Handles the three external operations:
//! - Modify a single account balance
//! - Batch modify account balances
//! - Query account balance history
//!
//! Requests are validated here before reaching [`BalanceService`]; every
//! failure leaves as an [`ErrorResponse`] carrying a stable code.

use std::sync::Arc;

use common::error::{Error, ErrorResponse, Result};
use common::model::account::{AccountInfoResponse, BalanceOperation, UserId};
use common::model::audit::{BalanceHistoryEntry, TimeRange};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{error, warn};

use crate::service::BalanceService;

/// Structural checks applied before a request reaches the service
pub trait Validate {
    fn validate(&self) -> Result<()>;
}

/// Single account balance modification request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModifyBalanceRequest {
    /// Account ID
    pub id: String,
    /// New balance in minor units
    pub balance: i64,
}

impl Validate for ModifyBalanceRequest {
    fn validate(&self) -> Result<()> {
        if self.id.trim().is_empty() {
            return Err(Error::MalformedRequest("id is required".to_string()));
        }
        // Zero is indistinguishable from a missing field on the wire
        if self.balance == 0 {
            return Err(Error::MalformedRequest("balance is required".to_string()));
        }
        Ok(())
    }
}

/// Batch account balance modification request
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchModifyBalanceRequest {
    /// Account IDs, processed in order
    pub account_ids: Vec<String>,
    /// `add` or `subtract`
    pub operation: BalanceOperation,
    /// Positive amount in minor units
    pub amount: i64,
}

impl Validate for BatchModifyBalanceRequest {
    fn validate(&self) -> Result<()> {
        if self.account_ids.is_empty() {
            return Err(Error::MalformedRequest("accountIds is required".to_string()));
        }
        if self.account_ids.iter().any(|id| id.trim().is_empty()) {
            return Err(Error::MalformedRequest("accountIds must not contain empty IDs".to_string()));
        }
        if self.amount < 1 {
            return Err(Error::MalformedRequest(format!(
                "amount must be at least 1, got {}",
                self.amount
            )));
        }
        Ok(())
    }
}

/// Balance history request
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BalanceHistoryRequest {
    pub account_id: String,
    #[serde(flatten)]
    pub range: TimeRange,
}

impl Validate for BalanceHistoryRequest {
    fn validate(&self) -> Result<()> {
        if self.account_id.trim().is_empty() {
            return Err(Error::MalformedRequest("accountId is required".to_string()));
        }
        if let (Some(from), Some(to)) = (self.range.from, self.range.to) {
            if from > to {
                return Err(Error::MalformedRequest("from must not be after to".to_string()));
            }
        }
        Ok(())
    }
}

/// Gateway response type
pub type GatewayResult<T> = std::result::Result<T, ErrorResponse>;

/// Entry point translating external requests into balance service calls
pub struct MutationGateway {
    service: Arc<BalanceService>,
}

impl MutationGateway {
    pub fn new(service: Arc<BalanceService>) -> Self {
        Self { service }
    }

    pub fn service(&self) -> &Arc<BalanceService> {
        &self.service
    }

    /// Modify a single account balance
    pub async fn modify_single(
        &self,
        user_id: UserId,
        request: ModifyBalanceRequest,
    ) -> GatewayResult<AccountInfoResponse> {
        checked(&request, "modify_single")?;

        self.service
            .modify_single_account_balance(user_id, &request.id, request.balance)
            .await
            .map_err(|e| respond(user_id, e))
    }

    /// Modify a batch of account balances
    pub async fn modify_batch(
        &self,
        user_id: UserId,
        request: BatchModifyBalanceRequest,
    ) -> GatewayResult<Vec<AccountInfoResponse>> {
        checked(&request, "modify_batch")?;

        self.service
            .modify_multiple_account_balances(user_id, &request.account_ids, request.operation, request.amount)
            .await
            .map_err(|e| respond(user_id, e))
    }

    /// Get account balance modification history
    pub async fn balance_history(
        &self,
        user_id: UserId,
        request: BalanceHistoryRequest,
    ) -> GatewayResult<Vec<BalanceHistoryEntry>> {
        checked(&request, "balance_history")?;

        self.service
            .list_balance_history(user_id, &request.account_id, request.range)
            .await
            .map_err(|e| respond(user_id, e))
    }

    pub async fn modify_single_json(&self, user_id: UserId, body: &str) -> GatewayResult<AccountInfoResponse> {
        let request = parse(body, "modify_single")?;
        self.modify_single(user_id, request).await
    }

    pub async fn modify_batch_json(&self, user_id: UserId, body: &str) -> GatewayResult<Vec<AccountInfoResponse>> {
        let request = parse(body, "modify_batch")?;
        self.modify_batch(user_id, request).await
    }

    pub async fn balance_history_json(&self, user_id: UserId, body: &str) -> GatewayResult<Vec<BalanceHistoryEntry>> {
        let request = parse(body, "balance_history")?;
        self.balance_history(user_id, request).await
    }
}

fn parse<T: DeserializeOwned>(body: &str, operation: &str) -> GatewayResult<T> {
    serde_json::from_str(body).map_err(|e| {
        warn!("[{}] parse request failed: {}", operation, e);
        ErrorResponse::from(Error::from(e))
    })
}

fn checked<T: Validate>(request: &T, operation: &str) -> GatewayResult<()> {
    request.validate().map_err(|e| {
        warn!("[{}] invalid request: {}", operation, e);
        ErrorResponse::from(e)
    })
}

fn respond(user_id: UserId, err: Error) -> ErrorResponse {
    match &err {
        Error::OperationFailed { .. } | Error::ConfigurationError(_) => {
            error!("Balance operation for user {} failed: {:?}", user_id, err)
        }
        _ => warn!("Balance operation for user {} rejected: {}", user_id, err),
    }
    ErrorResponse::from(err)
}
