//! Payment processor port and the service that interprets its answers.

mod gateway;
mod retry;
mod simulated;

pub use gateway::{GatewayError, PaymentGateway, PaymentRequest, PaymentResult};
pub use retry::{RetryPolicy, RetryingPaymentGateway};
pub use simulated::{GatewayOutcome, InMemoryPaymentGateway};

use tracing::{info, warn};

use crate::error::{Result, ShopError};

/// Turns gateway answers into shop errors.
pub struct PaymentService<G> {
    gateway: G,
}

impl<G: PaymentGateway> PaymentService<G> {
    pub fn new(gateway: G) -> Self {
        Self { gateway }
    }

    pub fn gateway(&self) -> &G {
        &self.gateway
    }

    /// Charges the request and returns the transaction id.
    ///
    /// A decline is [`ShopError::PaymentFailed`]. A call that never completed
    /// is [`ShopError::PaymentUnavailable`], carrying the gateway error as its
    /// source.
    #[tracing::instrument(skip(self, request), fields(order_id = %request.order_id, amount = %request.amount))]
    pub async fn process_payment(&self, request: PaymentRequest) -> Result<String> {
        let result = self
            .gateway
            .process_payment(&request)
            .await
            .map_err(|e| {
                warn!(error = %e, "Payment gateway call failed");
                ShopError::PaymentUnavailable(e)
            })?;

        match result {
            PaymentResult {
                success: true,
                transaction_id: Some(transaction_id),
                ..
            } => {
                info!(%transaction_id, "Payment approved");
                Ok(transaction_id)
            }
            PaymentResult {
                success: true,
                transaction_id: None,
                ..
            } => Err(ShopError::PaymentFailed {
                reason: "approved without a transaction id".into(),
            }),
            PaymentResult { error_message, .. } => {
                let reason = error_message.unwrap_or_else(|| "payment declined".into());
                warn!(%reason, "Payment declined");
                Err(ShopError::PaymentFailed { reason })
            }
        }
    }

    #[tracing::instrument(skip(self))]
    pub async fn cancel_payment(&self, transaction_id: &str) -> Result<()> {
        let result = self
            .gateway
            .cancel_payment(transaction_id)
            .await
            .map_err(|e| {
                warn!(error = %e, "Payment gateway call failed");
                ShopError::PaymentCancelFailed {
                    reason: "payment gateway unavailable".into(),
                    source: Some(e),
                }
            })?;

        if result.success {
            info!("Payment cancelled");
            Ok(())
        } else {
            Err(ShopError::PaymentCancelFailed {
                reason: result
                    .error_message
                    .unwrap_or_else(|| "cancellation refused".into()),
                source: None,
            })
        }
    }
}
