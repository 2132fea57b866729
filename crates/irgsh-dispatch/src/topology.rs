//! Builder queue topology.
//!
//! Every architecture gets its own durable queue `builder_<arch>`, bound to
//! the shared topic exchange `builder` with routing key `builder.<arch>`.
//! Each declaration runs on its own broker connection, acquired through a
//! [`ChannelGuard`] and released on every exit path.

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::error::{DispatchError, Result};
use crate::obs;

/// Exchange shared by all builder queues
pub const BUILDER_EXCHANGE: &str = "builder";

/// Broker-side exchange type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExchangeKind {
    Direct,
    Topic,
}

/// Failure reported by a broker connection or channel
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct BrokerError(pub String);

impl BrokerError {
    pub fn new(msg: impl Into<String>) -> Self {
        BrokerError(msg.into())
    }
}

/// A channel able to declare topology. Closing is idempotent.
#[async_trait]
pub trait TopologyChannel: Send {
    async fn declare_exchange(
        &mut self,
        name: &str,
        kind: ExchangeKind,
    ) -> std::result::Result<(), BrokerError>;

    /// Declare a durable queue.
    async fn declare_queue(&mut self, name: &str) -> std::result::Result<(), BrokerError>;

    async fn bind_queue(
        &mut self,
        queue: &str,
        exchange: &str,
        routing_key: &str,
    ) -> std::result::Result<(), BrokerError>;

    /// Release the channel and its underlying connection.
    async fn close(&mut self) -> std::result::Result<(), BrokerError>;
}

/// Opens one fresh connection + channel per call.
#[async_trait]
pub trait BrokerConnector: Send + Sync {
    async fn open(&self) -> std::result::Result<Box<dyn TopologyChannel>, BrokerError>;
}

/// Exchange / queue / binding needed to reach one architecture's builders
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QueueTopology {
    pub exchange: String,
    pub exchange_kind: ExchangeKind,
    pub queue: String,
    pub routing_key: String,
}

impl QueueTopology {
    pub fn for_architecture(architecture: &str) -> Self {
        QueueTopology {
            exchange: BUILDER_EXCHANGE.to_string(),
            exchange_kind: ExchangeKind::Topic,
            queue: format!("builder_{architecture}"),
            routing_key: format!("builder.{architecture}"),
        }
    }
}

/// Placeholder left behind once the real channel has been handed off for closing.
struct ReleasedChannel;

#[async_trait]
impl TopologyChannel for ReleasedChannel {
    async fn declare_exchange(
        &mut self,
        _name: &str,
        _kind: ExchangeKind,
    ) -> std::result::Result<(), BrokerError> {
        Err(BrokerError::new("channel already released"))
    }

    async fn declare_queue(&mut self, _name: &str) -> std::result::Result<(), BrokerError> {
        Err(BrokerError::new("channel already released"))
    }

    async fn bind_queue(
        &mut self,
        _queue: &str,
        _exchange: &str,
        _routing_key: &str,
    ) -> std::result::Result<(), BrokerError> {
        Err(BrokerError::new("channel already released"))
    }

    async fn close(&mut self) -> std::result::Result<(), BrokerError> {
        Ok(())
    }
}

/// RAII guard that owns one broker channel for one declaration.
///
/// [`ChannelGuard::release`] closes the channel deterministically. A guard
/// dropped without being released (early return, panic, cancelled future)
/// schedules the close on the current Tokio runtime instead, so the
/// connection is never leaked.
pub struct ChannelGuard {
    channel: Box<dyn TopologyChannel>,
    released: bool,
}

impl ChannelGuard {
    /// Open a channel through the connector.
    pub async fn acquire(
        connector: &dyn BrokerConnector,
    ) -> std::result::Result<Self, BrokerError> {
        let channel = connector.open().await?;
        Ok(ChannelGuard {
            channel,
            released: false,
        })
    }

    pub fn channel(&mut self) -> &mut dyn TopologyChannel {
        self.channel.as_mut()
    }

    /// Close the channel now.
    pub async fn release(mut self) -> std::result::Result<(), BrokerError> {
        self.released = true;
        self.channel.close().await
    }
}

impl Drop for ChannelGuard {
    fn drop(&mut self) {
        if self.released {
            return;
        }

        let mut channel = std::mem::replace(&mut self.channel, Box::new(ReleasedChannel));
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                debug!("broker channel dropped unreleased, closing in background");
                runtime.spawn(async move {
                    if let Err(e) = channel.close().await {
                        warn!(error = %e, "background broker channel close failed");
                    }
                });
            }
            Err(_) => warn!("broker channel dropped outside a runtime; connection not closed"),
        }
    }
}

/// Declare the exchange, queue and binding on an open channel.
async fn apply(
    channel: &mut dyn TopologyChannel,
    topology: &QueueTopology,
) -> std::result::Result<(), BrokerError> {
    channel
        .declare_exchange(&topology.exchange, topology.exchange_kind)
        .await?;
    channel.declare_queue(&topology.queue).await?;
    channel
        .bind_queue(&topology.queue, &topology.exchange, &topology.routing_key)
        .await
}

/// Ensure the topology for one architecture exists.
///
/// Idempotent: re-declaring identical topology is a no-op on the broker.
pub async fn declare_architecture(
    connector: &dyn BrokerConnector,
    architecture: &str,
) -> Result<QueueTopology> {
    let topology = QueueTopology::for_architecture(architecture);

    let mut guard = ChannelGuard::acquire(connector)
        .await
        .map_err(|e| DispatchError::topology(architecture, e))?;
    let declared = apply(guard.channel(), &topology).await;
    if let Err(e) = guard.release().await {
        warn!(architecture, error = %e, "broker channel close failed");
    }
    declared.map_err(|e| DispatchError::topology(architecture, e))?;

    obs::emit_topology_declared(architecture, &topology.queue, &topology.routing_key);
    Ok(topology)
}

/// Declare topology for each architecture in turn, stopping at the first failure.
///
/// Topology declared before a failure is left in place; re-running the whole
/// batch is safe.
pub async fn declare_all<'a, I>(
    connector: &dyn BrokerConnector,
    architectures: I,
) -> Result<Vec<QueueTopology>>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut declared = Vec::new();
    for architecture in architectures {
        declared.push(declare_architecture(connector, architecture).await?);
    }
    Ok(declared)
}
