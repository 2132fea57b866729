//! AMQP implementations of the broker seams, backed by `lapin`.

use std::future::Future;

use async_trait::async_trait;
use lapin::options::{
    BasicPublishOptions, ConfirmSelectOptions, ExchangeDeclareOptions, QueueBindOptions,
    QueueDeclareOptions,
};
use lapin::publisher_confirm::Confirmation;
use lapin::types::FieldTable;
use lapin::{BasicProperties, Channel, Connection, ConnectionProperties};
use tracing::{debug, error, warn};

use crate::config::BrokerConfig;
use crate::fanout::{BuildFanout, BuildMessage, BuildRequest, FanoutTicket};
use crate::obs;
use crate::topology::{
    BrokerConnector, BrokerError, ExchangeKind, QueueTopology, TopologyChannel, BUILDER_EXCHANGE,
};

/// AMQP persistent delivery mode
const PERSISTENT: u8 = 2;

impl From<lapin::Error> for BrokerError {
    fn from(err: lapin::Error) -> Self {
        BrokerError(err.to_string())
    }
}

impl From<ExchangeKind> for lapin::ExchangeKind {
    fn from(kind: ExchangeKind) -> Self {
        match kind {
            ExchangeKind::Direct => lapin::ExchangeKind::Direct,
            ExchangeKind::Topic => lapin::ExchangeKind::Topic,
        }
    }
}

async fn open_channel(url: &str) -> Result<(Connection, Channel), BrokerError> {
    let connection = Connection::connect(url, ConnectionProperties::default()).await?;
    match connection.create_channel().await {
        Ok(channel) => Ok((connection, channel)),
        Err(e) => {
            if let Err(close_err) = connection.close(200, "OK").await {
                warn!(error = %close_err, "broker connection close failed");
            }
            Err(e.into())
        }
    }
}

/// Await `body`, then await `close` whatever the outcome. A close failure is
/// only logged; the body's result is returned.
async fn then_close<T, E>(
    body: impl Future<Output = Result<T, BrokerError>>,
    close: impl Future<Output = Result<(), E>>,
) -> Result<T, BrokerError>
where
    E: std::fmt::Display,
{
    let result = body.await;
    if let Err(e) = close.await {
        warn!(error = %e, "broker connection close failed");
    }
    result
}

/// A publish only counts once the broker has acknowledged it.
fn confirmed(confirmation: Confirmation, architecture: &str) -> Result<(), BrokerError> {
    if confirmation.is_nack() {
        return Err(BrokerError::new(format!(
            "broker rejected build message for {architecture}"
        )));
    }
    Ok(())
}

/// Opens a dedicated AMQP connection for every topology declaration.
#[derive(Debug, Clone)]
pub struct AmqpConnector {
    url: String,
}

impl AmqpConnector {
    pub fn new(config: &BrokerConfig) -> Self {
        AmqpConnector {
            url: config.url.clone(),
        }
    }
}

#[async_trait]
impl BrokerConnector for AmqpConnector {
    async fn open(&self) -> Result<Box<dyn TopologyChannel>, BrokerError> {
        let (connection, channel) = open_channel(&self.url).await?;
        debug!("broker connection opened");
        Ok(Box::new(AmqpTopologyChannel {
            connection,
            channel,
            closed: false,
        }))
    }
}

struct AmqpTopologyChannel {
    connection: Connection,
    channel: Channel,
    closed: bool,
}

#[async_trait]
impl TopologyChannel for AmqpTopologyChannel {
    async fn declare_exchange(
        &mut self,
        name: &str,
        kind: ExchangeKind,
    ) -> Result<(), BrokerError> {
        self.channel
            .exchange_declare(
                name,
                kind.into(),
                ExchangeDeclareOptions {
                    durable: true,
                    ..ExchangeDeclareOptions::default()
                },
                FieldTable::default(),
            )
            .await?;
        Ok(())
    }

    async fn declare_queue(&mut self, name: &str) -> Result<(), BrokerError> {
        self.channel
            .queue_declare(
                name,
                QueueDeclareOptions {
                    durable: true,
                    ..QueueDeclareOptions::default()
                },
                FieldTable::default(),
            )
            .await?;
        Ok(())
    }

    async fn bind_queue(
        &mut self,
        queue: &str,
        exchange: &str,
        routing_key: &str,
    ) -> Result<(), BrokerError> {
        self.channel
            .queue_bind(
                queue,
                exchange,
                routing_key,
                QueueBindOptions::default(),
                FieldTable::default(),
            )
            .await?;
        Ok(())
    }

    async fn close(&mut self) -> Result<(), BrokerError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.connection.close(200, "OK").await?;
        Ok(())
    }
}

/// Publishes one persistent [`BuildMessage`] per architecture to the
/// `builder` exchange, on a background task.
#[derive(Debug, Clone)]
pub struct AmqpFanout {
    url: String,
}

impl AmqpFanout {
    pub fn new(config: &BrokerConfig) -> Self {
        AmqpFanout {
            url: config.url.clone(),
        }
    }
}

async fn publish_all(url: &str, request: &BuildRequest) -> Result<usize, BrokerError> {
    let (connection, channel) = open_channel(url).await?;
    then_close(publish_on(&channel, request), connection.close(200, "OK")).await
}

async fn publish_on(channel: &Channel, request: &BuildRequest) -> Result<usize, BrokerError> {
    channel
        .confirm_select(ConfirmSelectOptions::default())
        .await?;

    let mut published = 0;
    for architecture in &request.architectures {
        let message = BuildMessage::new(&request.specification, &architecture.name);
        let payload =
            serde_json::to_vec(&message).map_err(|e| BrokerError::new(e.to_string()))?;
        let routing_key = QueueTopology::for_architecture(&architecture.name).routing_key;

        let confirmation = channel
            .basic_publish(
                BUILDER_EXCHANGE,
                &routing_key,
                BasicPublishOptions::default(),
                &payload,
                BasicProperties::default()
                    .with_delivery_mode(PERSISTENT)
                    .with_content_type("application/json".into()),
            )
            .await?
            .await?;
        confirmed(confirmation, &architecture.name)?;
        debug!(architecture = %architecture.name, %routing_key, "build message published");
        published += 1;
    }
    Ok(published)
}

impl BuildFanout for AmqpFanout {
    fn start(&self, request: BuildRequest) -> FanoutTicket {
        let runtime = match tokio::runtime::Handle::try_current() {
            Ok(runtime) => runtime,
            Err(_) => {
                error!(spec_id = %request.specification.id, "fan-out started outside a runtime");
                return FanoutTicket::detached();
            }
        };

        obs::emit_fanout_started(
            request.specification.id.as_str(),
            request.architectures.len(),
        );
        let url = self.url.clone();
        FanoutTicket::spawned(runtime.spawn(async move {
            let spec_id = &request.specification.id;
            match publish_all(&url, &request).await {
                Ok(count) => debug!(%spec_id, count, "fan-out finished"),
                Err(e) => error!(%spec_id, error = %e, "fan-out failed"),
            }
        }))
    }
}
