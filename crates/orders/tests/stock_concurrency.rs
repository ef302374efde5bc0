//! Concurrent stock decrements never oversell.

use std::sync::Arc;

use common::MemberId;
use distributed_lock::InMemoryLockManager;
use domain::{Money, ProductStatus};
use orders::{InMemoryPaymentGateway, OrderOrchestrator, ProductService, ShopError};
use store::InMemoryShopStore;

type Products = ProductService<InMemoryShopStore, InMemoryLockManager>;

fn products() -> Arc<Products> {
    Arc::new(ProductService::new(
        Arc::new(InMemoryShopStore::new()),
        Arc::new(InMemoryLockManager::new()),
    ))
}

/// Runs `buyers` one-unit decrements at once.
///
/// Returns the number sold, the number turned away and the stock left.
async fn rush(products: &Arc<Products>, stock: u32, buyers: usize) -> (usize, usize, u32) {
    let product = products
        .create_product("Limited sneaker", None, Money::new(199_000), stock, "shoes")
        .await
        .unwrap();

    let mut handles = Vec::with_capacity(buyers);
    for _ in 0..buyers {
        let products = products.clone();
        handles.push(tokio::spawn(async move {
            products.decrement_stock(product.id, 1).await
        }));
    }

    let (mut sold, mut short) = (0, 0);
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => sold += 1,
            Err(ShopError::InsufficientStock { .. }) => short += 1,
            Err(other) => panic!("unexpected error: {other}"),
        }
    }

    let left = products.get_product(product.id).await.unwrap();
    (sold, short, left.stock_quantity)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn twenty_buyers_ten_units() {
    let products = products();
    let (sold, short, left) = rush(&products, 10, 20).await;

    assert_eq!(sold, 10);
    assert_eq!(short, 10);
    assert_eq!(left, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn nothing_in_stock() {
    let products = products();
    let (sold, short, left) = rush(&products, 0, 8).await;

    assert_eq!(sold, 0);
    assert_eq!(short, 8);
    assert_eq!(left, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn sold_out_product_flips_status() {
    let products = products();
    let product = products
        .create_product("Poster", None, Money::new(5_000), 3, "art")
        .await
        .unwrap();

    let mut handles = Vec::new();
    for _ in 0..6 {
        let products = products.clone();
        handles.push(tokio::spawn(async move {
            products.decrement_stock(product.id, 1).await
        }));
    }
    for handle in handles {
        let _ = handle.await.unwrap();
    }

    let product = products.get_product(product.id).await.unwrap();
    assert_eq!(product.stock_quantity, 0);
    assert_eq!(product.status, ProductStatus::OutOfStock);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_orders_share_the_ledger() {
    let store = Arc::new(InMemoryShopStore::new());
    let orchestrator = Arc::new(OrderOrchestrator::new(
        store,
        Arc::new(InMemoryLockManager::new()),
        InMemoryPaymentGateway::new(),
    ));
    let product = orchestrator
        .products()
        .create_product("Console", None, Money::new(500_000), 5, "games")
        .await
        .unwrap();

    let mut handles = Vec::new();
    for _ in 0..12 {
        let orchestrator = orchestrator.clone();
        handles.push(tokio::spawn(async move {
            let order = orchestrator.create_order(MemberId::new(), None).await?;
            orchestrator.add_item(order.id(), product.id, 1).await
        }));
    }

    let mut filled = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(order) => {
                assert_eq!(order.total_amount(), Money::new(500_000));
                filled += 1;
            }
            Err(e) => assert_eq!(e.code(), "P002"),
        }
    }

    assert_eq!(filled, 5);
    let left = orchestrator
        .products()
        .get_product(product.id)
        .await
        .unwrap();
    assert_eq!(left.stock_quantity, 0);
}
