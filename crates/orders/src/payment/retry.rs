use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use tracing::warn;

use super::gateway::{GatewayError, PaymentGateway, PaymentRequest, PaymentResult};

/// Per-attempt timeout and retry budget for gateway calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub timeout: Duration,
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            timeout: Duration::from_secs(5),
            backoff: Duration::from_millis(200),
        }
    }
}

/// Wraps a gateway with a per-attempt timeout and fixed-backoff retries.
///
/// Only [`GatewayError`]s are retried. A declined payment is an answer, not a
/// failure, and is returned as is.
pub struct RetryingPaymentGateway<G> {
    inner: G,
    policy: RetryPolicy,
}

impl<G: PaymentGateway> RetryingPaymentGateway<G> {
    pub fn new(inner: G, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    pub fn inner(&self) -> &G {
        &self.inner
    }

    async fn call<F, Fut>(
        &self,
        operation: &'static str,
        mut attempt_fn: F,
    ) -> Result<PaymentResult, GatewayError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<PaymentResult, GatewayError>>,
    {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            let outcome = match tokio::time::timeout(self.policy.timeout, attempt_fn()).await {
                Ok(outcome) => outcome,
                Err(_) => Err(GatewayError::Timeout(self.policy.timeout)),
            };

            let label = match &outcome {
                Ok(result) if result.success => "approved",
                Ok(_) => "declined",
                Err(GatewayError::Timeout(_)) => "timeout",
                Err(GatewayError::Transport(_)) => "transport_error",
            };
            metrics::counter!(
                "payment_gateway_attempts_total",
                "operation" => operation,
                "outcome" => label
            )
            .increment(1);

            match outcome {
                Err(e) if attempt < max_attempts => {
                    warn!(operation, attempt, error = %e, "Payment gateway call failed, retrying");
                    tokio::time::sleep(self.policy.backoff).await;
                    attempt += 1;
                }
                other => return other,
            }
        }
    }
}

#[async_trait]
impl<G: PaymentGateway> PaymentGateway for RetryingPaymentGateway<G> {
    async fn process_payment(
        &self,
        request: &PaymentRequest,
    ) -> Result<PaymentResult, GatewayError> {
        self.call("process", || self.inner.process_payment(request))
            .await
    }

    async fn cancel_payment(&self, transaction_id: &str) -> Result<PaymentResult, GatewayError> {
        self.call("cancel", || self.inner.cancel_payment(transaction_id))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payment::{GatewayOutcome, InMemoryPaymentGateway};
    use common::OrderId;
    use domain::Money;

    fn request() -> PaymentRequest {
        PaymentRequest {
            order_id: OrderId::new(),
            amount: Money::new(10_000),
            payment_token: "tok_test".into(),
        }
    }

    fn fast_policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            timeout: Duration::from_millis(50),
            backoff: Duration::from_millis(1),
        }
    }

    #[tokio::test]
    async fn transient_failure_is_retried() {
        let gateway = InMemoryPaymentGateway::new();
        gateway.push_outcome(GatewayOutcome::TransportError("connection reset".into()));
        let retrying = RetryingPaymentGateway::new(gateway.clone(), fast_policy());

        let result = retrying.process_payment(&request()).await.unwrap();
        assert!(result.success);
        assert_eq!(gateway.process_calls(), 2);
    }

    #[tokio::test]
    async fn decline_is_not_retried() {
        let gateway = InMemoryPaymentGateway::new();
        gateway.push_outcome(GatewayOutcome::Decline("insufficient funds".into()));
        let retrying = RetryingPaymentGateway::new(gateway.clone(), fast_policy());

        let result = retrying.process_payment(&request()).await.unwrap();
        assert!(!result.success);
        assert_eq!(gateway.process_calls(), 1);
    }

    #[tokio::test]
    async fn budget_is_bounded() {
        let gateway = InMemoryPaymentGateway::new();
        for _ in 0..5 {
            gateway.push_outcome(GatewayOutcome::TransportError("down".into()));
        }
        let retrying = RetryingPaymentGateway::new(gateway.clone(), fast_policy());

        let err = retrying.process_payment(&request()).await.unwrap_err();
        assert!(matches!(err, GatewayError::Transport(_)));
        assert_eq!(gateway.process_calls(), 3);
    }

    #[tokio::test]
    async fn slow_attempt_times_out() {
        let gateway = InMemoryPaymentGateway::new();
        gateway.push_outcome(GatewayOutcome::Stall(Duration::from_secs(60)));
        let retrying = RetryingPaymentGateway::new(
            gateway.clone(),
            RetryPolicy {
                max_attempts: 2,
                ..fast_policy()
            },
        );

        let result = retrying.process_payment(&request()).await.unwrap();
        assert!(result.success);
        assert_eq!(gateway.process_calls(), 2);
    }
}
