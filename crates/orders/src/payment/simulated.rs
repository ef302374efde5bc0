use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;

use super::gateway::{GatewayError, PaymentGateway, PaymentRequest, PaymentResult};

/// Scripted answer for the next gateway call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayOutcome {
    Approve,
    Decline(String),
    TransportError(String),
    /// Sleeps for the given time, then approves.
    Stall(Duration),
}

#[derive(Debug, Default)]
struct State {
    script: VecDeque<GatewayOutcome>,
    decline_all: bool,
    next_transaction: u32,
    process_calls: usize,
    cancel_calls: usize,
    charged: Vec<PaymentRequest>,
    cancelled: Vec<String>,
}

/// In-process payment gateway for tests and local runs.
///
/// Approves every charge unless told otherwise. Outcomes pushed with
/// [`push_outcome`](Self::push_outcome) are consumed first, one per call.
#[derive(Debug, Clone, Default)]
pub struct InMemoryPaymentGateway {
    state: Arc<Mutex<State>>,
}

impl InMemoryPaymentGateway {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn push_outcome(&self, outcome: GatewayOutcome) {
        self.state().script.push_back(outcome);
    }

    /// Declines every charge while set.
    pub fn set_decline_all(&self, decline: bool) {
        self.state().decline_all = decline;
    }

    pub fn process_calls(&self) -> usize {
        self.state().process_calls
    }

    pub fn cancel_calls(&self) -> usize {
        self.state().cancel_calls
    }

    /// Requests that were approved.
    pub fn charged(&self) -> Vec<PaymentRequest> {
        self.state().charged.clone()
    }

    /// Transaction ids that were cancelled.
    pub fn cancelled(&self) -> Vec<String> {
        self.state().cancelled.clone()
    }

    fn next_outcome(&self, cancel: bool) -> GatewayOutcome {
        let mut state = self.state();
        if cancel {
            state.cancel_calls += 1;
        } else {
            state.process_calls += 1;
        }
        match state.script.pop_front() {
            Some(outcome) => outcome,
            None if state.decline_all => GatewayOutcome::Decline("card declined".into()),
            None => GatewayOutcome::Approve,
        }
    }
}

#[async_trait]
impl PaymentGateway for InMemoryPaymentGateway {
    async fn process_payment(
        &self,
        request: &PaymentRequest,
    ) -> Result<PaymentResult, GatewayError> {
        let outcome = self.next_outcome(false);
        match outcome {
            GatewayOutcome::Decline(message) => return Ok(PaymentResult::declined(message)),
            GatewayOutcome::TransportError(message) => {
                return Err(GatewayError::Transport(message));
            }
            GatewayOutcome::Stall(delay) => tokio::time::sleep(delay).await,
            GatewayOutcome::Approve => {}
        }

        let mut state = self.state();
        state.next_transaction += 1;
        let transaction_id = format!("TXN-{:06}", state.next_transaction);
        state.charged.push(request.clone());
        Ok(PaymentResult::approved(transaction_id))
    }

    async fn cancel_payment(&self, transaction_id: &str) -> Result<PaymentResult, GatewayError> {
        let outcome = self.next_outcome(true);
        match outcome {
            GatewayOutcome::Decline(message) => return Ok(PaymentResult::declined(message)),
            GatewayOutcome::TransportError(message) => {
                return Err(GatewayError::Transport(message));
            }
            GatewayOutcome::Stall(delay) => tokio::time::sleep(delay).await,
            GatewayOutcome::Approve => {}
        }

        self.state().cancelled.push(transaction_id.to_string());
        Ok(PaymentResult::approved(transaction_id))
    }
}
