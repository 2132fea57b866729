//! Task decoding and dispatch to the orchestrators.

use std::future::Future;
use std::sync::{Mutex, MutexGuard};

use futures::{Stream, StreamExt};
use irgsh_dispatch::{FanoutTicket, SpecInitializer, UploadDispatcher};
use irgsh_state::SpecId;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{error, info, warn};

/// Body of a `specinit` or `upload` task
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskMessage {
    pub spec_id: String,
}

/// Which orchestrator a queue feeds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskKind {
    Init,
    Upload,
}

impl TaskKind {
    /// Queue (and direct exchange) carrying this kind of task
    pub fn queue(self) -> &'static str {
        match self {
            TaskKind::Init => "specinit",
            TaskKind::Upload => "upload",
        }
    }
}

/// What to tell the broker about a delivery
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Ack,
    /// Reject without requeue; redelivery policy belongs to the broker
    Reject,
}

pub struct TaskHandlers {
    initializer: SpecInitializer,
    uploader: UploadDispatcher,
    /// Fan-outs started by acked init tasks that may still be publishing
    pending: Mutex<Vec<FanoutTicket>>,
}

impl TaskHandlers {
    pub fn new(initializer: SpecInitializer, uploader: UploadDispatcher) -> Self {
        TaskHandlers {
            initializer,
            uploader,
            pending: Mutex::new(Vec::new()),
        }
    }

    /// Number of fan-outs not yet finished.
    pub fn pending_fanouts(&self) -> usize {
        let mut pending = self.tickets();
        pending.retain(|ticket| !ticket.is_finished());
        pending.len()
    }

    /// Wait for every fan-out started so far.
    pub async fn settle_fanouts(&self) {
        let tickets = std::mem::take(&mut *self.tickets());
        for ticket in tickets {
            ticket.settle().await;
        }
    }

    fn tickets(&self) -> MutexGuard<'_, Vec<FanoutTicket>> {
        self.pending.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn keep(&self, ticket: FanoutTicket) {
        let mut pending = self.tickets();
        pending.retain(|ticket| !ticket.is_finished());
        if !ticket.is_finished() {
            pending.push(ticket);
        }
    }

    pub async fn handle(&self, kind: TaskKind, body: &[u8]) -> Disposition {
        let message: TaskMessage = match serde_json::from_slice(body) {
            Ok(message) => message,
            Err(e) => {
                warn!(queue = kind.queue(), error = %e, "malformed task body");
                return Disposition::Reject;
            }
        };
        let id = SpecId::new(message.spec_id);

        let result = match kind {
            TaskKind::Init => self
                .initializer
                .run(&id)
                .await
                .map(|outcome| self.keep(outcome.fanout)),
            TaskKind::Upload => self.uploader.run(&id).await.map(drop),
        };

        match result {
            Ok(()) => {
                info!(queue = kind.queue(), spec_id = %id, "task completed");
                Disposition::Ack
            }
            Err(e) => {
                error!(
                    queue = kind.queue(),
                    spec_id = %id,
                    kind = %e.kind(),
                    error = %e,
                    "task failed"
                );
                Disposition::Reject
            }
        }
    }
}

/// Take items from `deliveries` one at a time until the stream ends or
/// `shutdown` turns true. An item already taken is processed to completion.
pub async fn serve_until<S, T, E, F, Fut>(
    mut deliveries: S,
    mut shutdown: watch::Receiver<bool>,
    mut process: F,
) -> Result<usize, E>
where
    S: Stream<Item = Result<T, E>> + Unpin,
    F: FnMut(T) -> Fut,
    Fut: Future<Output = Result<(), E>>,
{
    let mut served = 0;
    while !*shutdown.borrow() {
        let next = tokio::select! {
            biased;
            _ = shutdown.changed() => break,
            next = deliveries.next() => next,
        };
        let Some(item) = next else { break };
        process(item?).await?;
        served += 1;
    }
    Ok(served)
}

#[cfg(test)]
mod tests {
    use super::*;
    use irgsh_dispatch::fakes::{RecordingBroker, RecordingFanout, RecordingTransport};
    use irgsh_dispatch::{
        BrokerConfig, BuildFanout, BuildRequest, DispatchConfig, FileTransport, UploadConfig,
    };
    use irgsh_state::fakes::MemoryStore;
    use irgsh_state::{Catalog, SpecStatus};
    use std::path::PathBuf;
    use std::sync::Arc;
    use std::time::Duration;
    use tempfile::TempDir;
    use tokio::sync::Notify;

    const CATALOG: &str = r#"{
        "repositories": [{ "name": "main" }],
        "distributions": [{ "name": "arok", "repository": "main" }],
        "architectures": [{ "name": "amd64", "repository": "main" }],
        "specifications": [
            { "id": "S1", "distribution": "arok", "source": "pkg", "version": "1.0" }
        ]
    }"#;

    struct Fixture {
        root: TempDir,
        store: Arc<MemoryStore>,
        broker: RecordingBroker,
        transport: RecordingTransport,
        handlers: TaskHandlers,
    }

    fn fixture(transport: RecordingTransport) -> Fixture {
        fixture_with(Arc::new(transport.clone()), transport, Arc::new(RecordingFanout::new()))
    }

    /// `uploads` performs the transfers; `transport` is what the fixture reports on.
    fn fixture_with(
        uploads: Arc<dyn FileTransport>,
        transport: RecordingTransport,
        fanout: Arc<dyn BuildFanout>,
    ) -> Fixture {
        let root = tempfile::tempdir().unwrap();
        let store = Arc::new(MemoryStore::from_catalog(&Catalog::from_json(CATALOG).unwrap()));
        let broker = RecordingBroker::new();
        let config = DispatchConfig::new(
            BrokerConfig {
                url: "amqp://localhost".to_string(),
            },
            UploadConfig::new("repo", "archive.example.org", 22, "incoming"),
            root.path(),
        );
        let handlers = TaskHandlers::new(
            SpecInitializer::new(
                store.clone(),
                store.clone(),
                Arc::new(broker.clone()),
                fanout,
            ),
            UploadDispatcher::new(config, store.clone(), uploads),
        );
        Fixture {
            root,
            store,
            broker,
            transport,
            handlers,
        }
    }

    #[test]
    fn task_message_parses_spec_id() {
        let message: TaskMessage = serde_json::from_str(r#"{"spec_id": "S1"}"#).unwrap();
        assert_eq!(message.spec_id, "S1");
    }

    #[test]
    fn queues_match_task_exchanges() {
        assert_eq!(TaskKind::Init.queue(), "specinit");
        assert_eq!(TaskKind::Upload.queue(), "upload");
    }

    #[tokio::test]
    async fn malformed_body_is_rejected() {
        let f = fixture(RecordingTransport::new());
        assert_eq!(
            f.handlers.handle(TaskKind::Init, b"not json").await,
            Disposition::Reject
        );
        assert_eq!(
            f.handlers.handle(TaskKind::Upload, br#"{"id": "S1"}"#).await,
            Disposition::Reject
        );
        assert_eq!(f.broker.connections_opened(), 0);
    }

    #[tokio::test]
    async fn init_task_is_acked() {
        let f = fixture(RecordingTransport::new());
        let disposition = f
            .handlers
            .handle(TaskKind::Init, br#"{"spec_id": "S1"}"#)
            .await;
        assert_eq!(disposition, Disposition::Ack);
        assert!(f.broker.has_queue("builder_amd64"));
    }

    #[tokio::test]
    async fn upload_task_is_acked_and_marks_uploaded() {
        let f = fixture(RecordingTransport::new());
        let dir = f.root.path().join("S1");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("pkg_1.0.dsc"), "Files:\n a 1 pkg_1.0.tar.gz\n").unwrap();

        let disposition = f
            .handlers
            .handle(TaskKind::Upload, br#"{"spec_id": "S1"}"#)
            .await;
        assert_eq!(disposition, Disposition::Ack);
        assert_eq!(f.transport.batches().len(), 1);
        assert_eq!(f.store.status_of(&SpecId::new("S1")), Some(SpecStatus::UPLOADED));
    }

    #[tokio::test]
    async fn failed_upload_is_rejected_after_status_write() {
        let f = fixture(RecordingTransport::failing(1));
        let dir = f.root.path().join("S1");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("pkg_1.0.dsc"), "Files:\n a 1 pkg_1.0.tar.gz\n").unwrap();

        let disposition = f
            .handlers
            .handle(TaskKind::Upload, br#"{"spec_id": "S1"}"#)
            .await;
        assert_eq!(disposition, Disposition::Reject);
        assert_eq!(f.store.status_of(&SpecId::new("S1")), Some(SpecStatus::FAILED));
    }

    #[tokio::test]
    async fn unknown_spec_is_rejected() {
        let f = fixture(RecordingTransport::new());
        let disposition = f
            .handlers
            .handle(TaskKind::Upload, br#"{"spec_id": "S404"}"#)
            .await;
        assert_eq!(disposition, Disposition::Reject);
        assert!(f.store.status_writes().is_empty());
    }

    /// Transport that takes a while before delegating to a recorder.
    struct SlowTransport {
        delay: Duration,
        inner: RecordingTransport,
    }

    #[async_trait::async_trait]
    impl FileTransport for SlowTransport {
        async fn transfer(&self, files: &[PathBuf]) -> irgsh_dispatch::Result<()> {
            tokio::time::sleep(self.delay).await;
            self.inner.transfer(files).await
        }
    }

    /// Fan-out whose background task runs until released.
    #[derive(Default)]
    struct GatedFanout {
        gate: Arc<Notify>,
    }

    impl BuildFanout for GatedFanout {
        fn start(&self, _request: BuildRequest) -> FanoutTicket {
            let gate = self.gate.clone();
            FanoutTicket::spawned(tokio::spawn(async move { gate.notified().await }))
        }
    }

    fn write_upload(f: &Fixture, id: &str) {
        let dir = f.root.path().join(id);
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("pkg_1.0.dsc"), "Files:\n a 1 pkg_1.0.tar.gz\n").unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_lets_current_upload_finish() {
        let transport = RecordingTransport::new();
        let slow = SlowTransport {
            delay: Duration::from_secs(5),
            inner: transport.clone(),
        };
        let f = Arc::new(fixture_with(
            Arc::new(slow),
            transport,
            Arc::new(RecordingFanout::new()),
        ));
        write_upload(&f, "S1");

        let bodies: Vec<Result<&[u8], std::convert::Infallible>> = vec![
            Ok(&br#"{"spec_id": "S1"}"#[..]),
            Ok(&br#"{"spec_id": "S1"}"#[..]),
        ];
        let (stop, shutdown) = watch::channel(false);
        let served = tokio::spawn({
            let f = f.clone();
            async move {
                serve_until(futures::stream::iter(bodies), shutdown, |body| {
                    let f = f.clone();
                    async move {
                        f.handlers.handle(TaskKind::Upload, body).await;
                        Ok(())
                    }
                })
                .await
            }
        });

        tokio::time::sleep(Duration::from_secs(1)).await;
        stop.send(true).unwrap();

        assert_eq!(served.await.unwrap(), Ok(1));
        assert_eq!(f.transport.batches().len(), 1);
        assert_eq!(f.store.status_of(&SpecId::new("S1")), Some(SpecStatus::UPLOADED));
    }

    #[tokio::test]
    async fn serve_until_stops_at_end_of_stream() {
        let (_stop, shutdown) = watch::channel(false);
        let mut seen = Vec::new();
        let items = futures::stream::iter([Ok::<_, String>(1), Ok(2), Ok(3)]);
        let served = serve_until(items, shutdown, |item| {
            seen.push(item);
            async { Ok(()) }
        })
        .await;
        assert_eq!(served, Ok(3));
        assert_eq!(seen, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn serve_until_takes_nothing_after_shutdown() {
        let (stop, shutdown) = watch::channel(false);
        stop.send(true).unwrap();
        let items = futures::stream::iter([Ok::<u32, String>(1)]);
        let served = serve_until(items, shutdown, |_| async { Err("processed".to_string()) }).await;
        assert_eq!(served, Ok(0));
    }

    #[tokio::test]
    async fn serve_until_returns_stream_error() {
        let (_stop, shutdown) = watch::channel(false);
        let items = futures::stream::iter([Ok(1), Err("channel closed".to_string()), Ok(2)]);
        let served = serve_until(items, shutdown, |_| async { Ok(()) }).await;
        assert_eq!(served, Err("channel closed".to_string()));
    }

    #[tokio::test]
    async fn acked_init_keeps_fanout_until_settled() {
        let fanout = Arc::new(GatedFanout::default());
        let f = fixture_with(
            Arc::new(RecordingTransport::new()),
            RecordingTransport::new(),
            fanout.clone(),
        );

        let disposition = f
            .handlers
            .handle(TaskKind::Init, br#"{"spec_id": "S1"}"#)
            .await;
        assert_eq!(disposition, Disposition::Ack);
        assert_eq!(f.handlers.pending_fanouts(), 1);

        fanout.gate.notify_one();
        f.handlers.settle_fanouts().await;
        assert_eq!(f.handlers.pending_fanouts(), 0);
    }

    #[tokio::test]
    async fn detached_fanout_is_not_kept() {
        let f = fixture(RecordingTransport::new());
        f.handlers
            .handle(TaskKind::Init, br#"{"spec_id": "S1"}"#)
            .await;
        assert_eq!(f.handlers.pending_fanouts(), 0);
    }
}
