use std::time::Duration;

use async_trait::async_trait;
use common::OrderId;
use domain::Money;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A charge request sent to the payment processor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentRequest {
    pub order_id: OrderId,
    pub amount: Money,
    /// Opaque card token issued by the processor's client SDK.
    pub payment_token: String,
}

/// Processor answer for a charge or a cancellation.
///
/// A declined charge is a successful call with `success == false`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentResult {
    pub success: bool,
    pub transaction_id: Option<String>,
    pub error_message: Option<String>,
}

impl PaymentResult {
    pub fn approved(transaction_id: impl Into<String>) -> Self {
        Self {
            success: true,
            transaction_id: Some(transaction_id.into()),
            error_message: None,
        }
    }

    pub fn declined(message: impl Into<String>) -> Self {
        Self {
            success: false,
            transaction_id: None,
            error_message: Some(message.into()),
        }
    }
}

/// The call itself did not complete.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GatewayError {
    #[error("payment gateway unreachable: {0}")]
    Transport(String),

    #[error("payment gateway timed out after {0:?}")]
    Timeout(Duration),
}

/// Port to the external payment processor.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn process_payment(&self, request: &PaymentRequest)
    -> Result<PaymentResult, GatewayError>;

    async fn cancel_payment(&self, transaction_id: &str) -> Result<PaymentResult, GatewayError>;
}
