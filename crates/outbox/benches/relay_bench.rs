use std::sync::Arc;

use common::MemberId;
use criterion::{BatchSize, Criterion, criterion_group, criterion_main};
use domain::{Order, OrderEvent};
use outbox::{InMemoryPublisher, OutboxRelay, RelayConfig};
use store::{InMemoryShopStore, StoreError, atomically};

async fn populate(store: &InMemoryShopStore, orders: usize) {
    for _ in 0..orders {
        let mut order = Order::place(MemberId::new(), None);
        atomically(store, |uow| {
            uow.save_order(&mut order);
            uow.record(&OrderEvent::created(&order))?;
            Ok::<_, StoreError>(())
        })
        .await
        .unwrap();
    }
}

fn bench_relay_pass_100(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();

    c.bench_function("relay/pass_100_events", |b| {
        b.iter_batched(
            || {
                let store = Arc::new(InMemoryShopStore::new());
                rt.block_on(populate(&store, 100));
                OutboxRelay::new(store, InMemoryPublisher::new(), RelayConfig::default())
            },
            |relay| rt.block_on(relay.run_once()).unwrap(),
            BatchSize::SmallInput,
        );
    });
}

fn bench_empty_pass(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let relay = OutboxRelay::new(
        Arc::new(InMemoryShopStore::new()),
        InMemoryPublisher::new(),
        RelayConfig::default(),
    );

    c.bench_function("relay/empty_pass", |b| {
        b.iter(|| rt.block_on(relay.run_once()).unwrap());
    });
}

criterion_group!(benches, bench_relay_pass_100, bench_empty_pass);
criterion_main!(benches);
