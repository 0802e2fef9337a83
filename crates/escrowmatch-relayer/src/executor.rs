//! Boundary to the external payment rail.
//!
//! The executor owns the custodial credential; the relayer only tells it
//! who to pay and how much.

use std::sync::Arc;

use async_trait::async_trait;
use escrowmatch_types::{Address, ObligationId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One payout to perform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferRequest {
    /// Passed through so executors can use it as an idempotency key.
    pub obligation_id: ObligationId,
    pub recipient: Address,
    pub amount: Decimal,
    pub custodial_account: String,
}

/// Why a transfer did not complete.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransferError {
    #[error("network error: {0}")]
    Network(String),

    #[error("insufficient custodial balance: need {needed}")]
    InsufficientFunds { needed: Decimal },

    #[error("destination {0} rejected the transfer")]
    InvalidDestination(Address),

    #[error("transfer rejected: {0}")]
    Rejected(String),
}

/// Performs value transfers out of the custodial account.
#[async_trait]
pub trait TransferExecutor: Send + Sync {
    /// Transfer `request.amount` to `request.recipient`. Returns the
    /// external transaction reference once the broadcast is acknowledged.
    async fn transfer(&self, request: &TransferRequest) -> Result<String, TransferError>;
}

#[async_trait]
impl<E: TransferExecutor + ?Sized> TransferExecutor for Arc<E> {
    async fn transfer(&self, request: &TransferRequest) -> Result<String, TransferError> {
        (**self).transfer(request).await
    }
}
