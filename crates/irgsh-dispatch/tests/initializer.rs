//! Specification initialization against in-memory store, broker and fan-out.

use std::sync::Arc;

use irgsh_dispatch::fakes::{RecordingBroker, RecordingFanout};
use irgsh_dispatch::{ErrorKind, ExchangeKind, SpecInitializer};
use irgsh_state::fakes::MemoryStore;
use irgsh_state::{Catalog, SpecId, SpecStatus};

const CATALOG: &str = r#"{
    "repositories": [{ "name": "main" }],
    "distributions": [
        { "name": "arok", "repository": "main" },
        { "name": "orphan", "repository": "missing" }
    ],
    "architectures": [
        { "name": "amd64", "repository": "main" },
        { "name": "i386", "repository": "main" },
        { "name": "powerpc", "repository": "main", "active": false }
    ],
    "specifications": [
        { "id": "S1", "distribution": "arok", "source": "pkg", "version": "1.0", "status": 100 },
        { "id": "S7", "distribution": "orphan", "source": "pkg", "version": "1.0" }
    ]
}"#;

struct Harness {
    store: Arc<MemoryStore>,
    broker: RecordingBroker,
    fanout: RecordingFanout,
    initializer: SpecInitializer,
}

fn harness(broker: RecordingBroker) -> Harness {
    let catalog = Catalog::from_json(CATALOG).unwrap();
    let store = Arc::new(MemoryStore::from_catalog(&catalog));
    let fanout = RecordingFanout::new();
    let initializer = SpecInitializer::new(
        store.clone(),
        store.clone(),
        Arc::new(broker.clone()),
        Arc::new(fanout.clone()),
    );
    Harness {
        store,
        broker,
        fanout,
        initializer,
    }
}

#[tokio::test]
async fn declares_queue_per_active_architecture_then_starts_fanout() {
    let h = harness(RecordingBroker::new());

    let outcome = h.initializer.run(&SpecId::new("S1")).await.unwrap();
    outcome.fanout.settle().await;

    assert_eq!(h.broker.exchange_kind("builder"), Some(ExchangeKind::Topic));
    assert_eq!(h.broker.queues(), vec!["builder_amd64", "builder_i386"]);
    assert!(h.broker.has_binding("builder_amd64", "builder", "builder.amd64"));
    assert!(h.broker.has_binding("builder_i386", "builder", "builder.i386"));

    // one connection per architecture, all released
    assert_eq!(h.broker.connections_opened(), 2);
    assert_eq!(h.broker.connections_closed(), 2);

    let started = h.fanout.started();
    assert_eq!(started.len(), 1);
    assert_eq!(started[0].specification.id, SpecId::new("S1"));
    assert_eq!(started[0].architectures.len(), 2);

    assert!(h.store.status_writes().is_empty());
    assert_eq!(h.store.status_of(&SpecId::new("S1")), Some(SpecStatus(100)));
}

#[tokio::test]
async fn rerun_leaves_topology_unchanged() {
    let h = harness(RecordingBroker::new());
    h.initializer.run(&SpecId::new("S1")).await.unwrap();
    let first = h.broker.snapshot();

    h.initializer.run(&SpecId::new("S1")).await.unwrap();
    assert_eq!(h.broker.snapshot(), first);
    assert_eq!(h.fanout.started().len(), 2);
}

#[tokio::test]
async fn unreachable_broker_propagates_topology_error() {
    let h = harness(RecordingBroker::unreachable());

    let err = h.initializer.run(&SpecId::new("S1")).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Topology);
    assert!(h.fanout.started().is_empty());
}

#[tokio::test]
async fn dangling_repository_is_not_found() {
    let h = harness(RecordingBroker::new());

    let err = h.initializer.run(&SpecId::new("S7")).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert_eq!(h.broker.connections_opened(), 0);
}
