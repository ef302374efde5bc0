//! The assembled service over in-memory adapters.

use std::sync::Arc;
use std::time::Duration;

use distributed_lock::InMemoryLockManager;
use domain::{Money, OrderStatus};
use orders::{ErrorKind, GatewayOutcome, InMemoryPaymentGateway};
use outbox::InMemoryPublisher;
use shopd::{Config, ShopContext};
use store::InMemoryShopStore;

type TestContext =
    ShopContext<InMemoryShopStore, InMemoryLockManager, InMemoryPaymentGateway, InMemoryPublisher>;

struct TestHarness {
    context: TestContext,
    gateway: InMemoryPaymentGateway,
    publisher: InMemoryPublisher,
}

impl TestHarness {
    fn new(vars: &[(&str, &str)]) -> Self {
        let config = Config::from_lookup(|name| {
            vars.iter()
                .find(|(k, _)| *k == name)
                .map(|(_, v)| v.to_string())
        });
        let gateway = InMemoryPaymentGateway::new();
        let publisher = InMemoryPublisher::new();
        let context = ShopContext::new(
            Arc::new(InMemoryShopStore::new()),
            Arc::new(InMemoryLockManager::new()),
            gateway.clone(),
            publisher.clone(),
            &config,
        );
        Self {
            context,
            gateway,
            publisher,
        }
    }
}

#[tokio::test]
async fn paid_order_reaches_the_publisher() {
    let h = TestHarness::new(&[
        ("OUTBOX_POLL_INTERVAL_MS", "10"),
        ("PAYMENT_RETRY_BACKOFF_MS", "1"),
    ]);
    let orders = h.context.orchestrator();

    let member = h
        .context
        .members()
        .register("buyer@example.com", "buyer")
        .await
        .unwrap();
    let product = orders
        .products()
        .create_product("Desk lamp", None, Money::new(30_000), 4, "home")
        .await
        .unwrap();
    let order = orders.create_order(member.id, None).await.unwrap();
    orders.add_item(order.id(), product.id, 2).await.unwrap();
    let paid = orders
        .pay_order(order.id(), "tok_visa", Some("pay-1"))
        .await
        .unwrap();
    assert_eq!(paid.status(), OrderStatus::Paid);

    let publisher = h.publisher.clone();
    let delivered = async move {
        while publisher.delivered().len() < 2 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    };
    tokio::time::timeout(Duration::from_secs(2), h.context.run_until(delivered))
        .await
        .unwrap()
        .unwrap();

    let types: Vec<_> = h
        .publisher
        .delivered()
        .iter()
        .map(|d| d.event_type())
        .collect();
    assert_eq!(types, vec!["OrderCreated", "PaymentCompleted"]);
}

#[tokio::test]
async fn payment_retry_budget_comes_from_config() {
    let h = TestHarness::new(&[
        ("PAYMENT_MAX_ATTEMPTS", "2"),
        ("PAYMENT_RETRY_BACKOFF_MS", "1"),
    ]);
    let orders = h.context.orchestrator();
    let product = orders
        .products()
        .create_product("Kettle", None, Money::new(45_000), 1, "home")
        .await
        .unwrap();
    let order = orders
        .create_order(common::MemberId::new(), None)
        .await
        .unwrap();
    orders.add_item(order.id(), product.id, 1).await.unwrap();

    h.gateway
        .push_outcome(GatewayOutcome::TransportError("reset by peer".into()));
    h.gateway
        .push_outcome(GatewayOutcome::TransportError("reset by peer".into()));

    let err = orders
        .pay_order(order.id(), "tok_visa", None)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Unavailable);
    assert_eq!(h.gateway.process_calls(), 2);
    assert_eq!(
        orders.get_order(order.id()).await.unwrap().status(),
        OrderStatus::Pending
    );
}

#[tokio::test]
async fn shutdown_without_backlog() {
    let h = TestHarness::new(&[("OUTBOX_POLL_INTERVAL_MS", "10")]);

    tokio::time::timeout(
        Duration::from_secs(1),
        h.context.run_until(tokio::time::sleep(Duration::from_millis(30))),
    )
    .await
    .unwrap()
    .unwrap();
    assert!(h.publisher.delivered().is_empty());
}
