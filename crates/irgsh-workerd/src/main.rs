//! irgsh-workerd: serves `specinit` and `upload` tasks from the broker.
//!
//! Each queue gets its own channel with a prefetch of one; both are served
//! concurrently until either consumer ends or the process is interrupted.
//! An interrupt stops taking deliveries; the task in hand and any running
//! fan-outs finish before the connection closes.

mod tasks;

use std::sync::Arc;

use anyhow::{Context, Result};
use irgsh_dispatch::{
    AmqpConnector, AmqpFanout, DispatchConfig, ScpTransport, SpecInitializer, UploadDispatcher,
};
use irgsh_state::SurrealStore;
use lapin::options::{
    BasicAckOptions, BasicCancelOptions, BasicConsumeOptions, BasicQosOptions, BasicRejectOptions,
    ExchangeDeclareOptions, QueueBindOptions, QueueDeclareOptions,
};
use lapin::types::FieldTable;
use lapin::{Channel, Connection, ConnectionProperties, ExchangeKind};
use tokio::sync::watch;
use tracing::{debug, info, Level};

use tasks::{serve_until, Disposition, TaskHandlers, TaskKind};

#[tokio::main]
async fn main() -> Result<()> {
    let json = std::env::var("IRGSH_LOG_FORMAT").is_ok_and(|f| f == "json");
    irgsh_dispatch::telemetry::init_tracing(json, Level::INFO);

    let config = DispatchConfig::from_env();
    let store = Arc::new(
        SurrealStore::from_env()
            .await
            .context("Failed to connect to irgsh database")?,
    );
    let handlers = Arc::new(TaskHandlers::new(
        SpecInitializer::new(
            store.clone(),
            store.clone(),
            Arc::new(AmqpConnector::new(&config.broker)),
            Arc::new(AmqpFanout::new(&config.broker)),
        ),
        UploadDispatcher::new(
            config.clone(),
            store,
            Arc::new(ScpTransport::new(config.upload.clone())),
        ),
    ));

    let connection = Connection::connect(&config.broker.url, ConnectionProperties::default())
        .await
        .context("Failed to connect to broker")?;
    info!("irgsh-workerd started");

    let init_channel = connection.create_channel().await?;
    let upload_channel = connection.create_channel().await?;
    let (stop, shutdown) = watch::channel(false);
    let stop = Arc::new(stop);
    tokio::spawn({
        let stop = stop.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("interrupted, finishing current tasks");
                stop.send_replace(true);
            }
        }
    });

    // either consumer ending stops the other between deliveries
    let consume = |channel: Channel, kind: TaskKind| {
        let (handlers, shutdown, stop) = (handlers.clone(), shutdown.clone(), stop.clone());
        async move {
            let result = serve(channel, kind, handlers, shutdown).await;
            stop.send_replace(true);
            result
        }
    };
    let (init, upload) = tokio::join!(
        consume(init_channel, TaskKind::Init),
        consume(upload_channel, TaskKind::Upload),
    );
    info!(pending = handlers.pending_fanouts(), "settling fan-outs");
    handlers.settle_fanouts().await;
    connection.close(200, "OK").await?;
    let (init, upload) = (init?, upload?);
    info!(init, upload, "consumers ended");
    Ok(())
}

/// Declare the durable queue for `kind` and process its deliveries one at a
/// time until `shutdown` fires. Returns how many deliveries were handled.
async fn serve(
    channel: Channel,
    kind: TaskKind,
    handlers: Arc<TaskHandlers>,
    shutdown: watch::Receiver<bool>,
) -> Result<usize> {
    let queue = kind.queue();
    channel
        .exchange_declare(
            queue,
            ExchangeKind::Direct,
            ExchangeDeclareOptions {
                durable: true,
                ..ExchangeDeclareOptions::default()
            },
            FieldTable::default(),
        )
        .await?;
    channel
        .queue_declare(
            queue,
            QueueDeclareOptions {
                durable: true,
                ..QueueDeclareOptions::default()
            },
            FieldTable::default(),
        )
        .await?;
    channel
        .queue_bind(queue, queue, queue, QueueBindOptions::default(), FieldTable::default())
        .await?;
    channel.basic_qos(1, BasicQosOptions::default()).await?;

    let tag = format!("irgsh-workerd-{queue}");
    let consumer = channel
        .basic_consume(
            queue,
            &tag,
            BasicConsumeOptions::default(),
            FieldTable::default(),
        )
        .await
        .with_context(|| format!("Failed to consume from {queue}"))?;
    info!(queue, "consuming");

    let served = serve_until(consumer, shutdown, |delivery| {
        let handlers = handlers.clone();
        async move {
            debug!(queue, tag = delivery.delivery_tag, "task received");
            match handlers.handle(kind, &delivery.data).await {
                Disposition::Ack => delivery.acker.ack(BasicAckOptions::default()).await,
                Disposition::Reject => {
                    delivery
                        .acker
                        .reject(BasicRejectOptions { requeue: false })
                        .await
                }
            }
        }
    })
    .await?;

    // unacked prefetched deliveries return to the queue when the channel closes
    channel
        .basic_cancel(&tag, BasicCancelOptions::default())
        .await?;
    info!(queue, served, "stopped consuming");
    Ok(served)
}
