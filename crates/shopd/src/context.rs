//! Service assembly.

use std::future::Future;
use std::sync::Arc;

use distributed_lock::LockManager;
use orders::{MemberService, OrderOrchestrator, PaymentGateway, RetryingPaymentGateway};
use outbox::{EventPublisher, OutboxRelay};
use store::ShopStore;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::info;

use crate::config::Config;
use crate::error::Result;

/// Orchestrator type as wired by [`ShopContext`].
pub type Orchestrator<S, L, G> = OrderOrchestrator<S, L, RetryingPaymentGateway<G>>;

/// The order core, member registry and outbox relay over one store.
pub struct ShopContext<S, L, G, P> {
    store: Arc<S>,
    orchestrator: Arc<Orchestrator<S, L, G>>,
    members: MemberService<S>,
    relay: Arc<OutboxRelay<S, P>>,
}

impl<S, L, G, P> ShopContext<S, L, G, P>
where
    S: ShopStore + 'static,
    L: LockManager + 'static,
    G: PaymentGateway + 'static,
    P: EventPublisher + 'static,
{
    /// Wires every service from `config`. The gateway is wrapped in the
    /// configured timeout and retry policy.
    pub fn new(store: Arc<S>, locks: Arc<L>, gateway: G, publisher: P, config: &Config) -> Self {
        let gateway = RetryingPaymentGateway::new(gateway, config.retry_policy());
        let orchestrator = OrderOrchestrator::new(store.clone(), locks, gateway)
            .with_lock_options(config.lock_options());
        let relay = OutboxRelay::new(store.clone(), publisher, config.relay_config());

        Self {
            members: MemberService::new(store.clone()),
            orchestrator: Arc::new(orchestrator),
            relay: Arc::new(relay),
            store,
        }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn orchestrator(&self) -> &Arc<Orchestrator<S, L, G>> {
        &self.orchestrator
    }

    pub fn members(&self) -> &MemberService<S> {
        &self.members
    }

    pub fn relay(&self) -> &Arc<OutboxRelay<S, P>> {
        &self.relay
    }

    /// Starts the relay loop on its own task.
    pub fn spawn_relay(&self, shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        let relay = self.relay.clone();
        tokio::spawn(async move { relay.run(shutdown).await })
    }

    /// Runs the background work until `signal` resolves, then stops it and
    /// waits for the in-flight relay pass to finish.
    pub async fn run_until<F>(&self, signal: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let relay = self.spawn_relay(shutdown_rx);

        signal.await;
        info!("Shutting down background tasks");
        // The receiver lives in the relay task; a send error means it already exited.
        let _ = shutdown_tx.send(true);
        relay.await?;
        Ok(())
    }
}
