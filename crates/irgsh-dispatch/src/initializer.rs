//! Specification initialization: `Loaded → TopologyDeclared → Dispatched`.

use std::sync::Arc;

use irgsh_state::{ArchitectureCatalog, SpecId, SpecificationStore};
use tracing::Instrument;

use crate::error::Result;
use crate::fanout::{BuildFanout, BuildRequest, FanoutTicket};
use crate::obs;
use crate::topology::{self, BrokerConnector, QueueTopology};

/// What a successful initialization left behind.
///
/// Informational only: callers are not expected to act on it beyond
/// optionally settling the fan-out ticket.
#[derive(Debug)]
pub struct InitOutcome {
    pub spec_id: SpecId,
    /// Active architectures, in declaration order
    pub architectures: Vec<String>,
    pub topologies: Vec<QueueTopology>,
    pub fanout: FanoutTicket,
}

/// Declares builder topology for a specification and starts its build fan-out.
///
/// Performs no status writes; status progression after dispatch belongs to
/// the fan-out delegate and the builders.
pub struct SpecInitializer {
    store: Arc<dyn SpecificationStore>,
    catalog: Arc<dyn ArchitectureCatalog>,
    connector: Arc<dyn BrokerConnector>,
    fanout: Arc<dyn BuildFanout>,
}

impl SpecInitializer {
    pub fn new(
        store: Arc<dyn SpecificationStore>,
        catalog: Arc<dyn ArchitectureCatalog>,
        connector: Arc<dyn BrokerConnector>,
        fanout: Arc<dyn BuildFanout>,
    ) -> Self {
        SpecInitializer {
            store,
            catalog,
            connector,
            fanout,
        }
    }

    /// Initialize one specification.
    ///
    /// Fails with `NotFound` if the specification, its distribution or its
    /// repository does not resolve, and with `TopologyError` on the first
    /// architecture whose declaration fails. The fan-out is only started once
    /// every declaration has completed.
    pub async fn run(&self, id: &SpecId) -> Result<InitOutcome> {
        self.run_inner(id)
            .instrument(obs::spec_span("init", id.as_str()))
            .await
    }

    async fn run_inner(&self, id: &SpecId) -> Result<InitOutcome> {
        let specification = self.store.load(id).await?;
        let architectures = self
            .catalog
            .active_architectures_for(&specification)
            .await?;
        obs::emit_init_started(
            id.as_str(),
            &specification.distribution,
            architectures.len(),
        );

        let topologies = topology::declare_all(
            self.connector.as_ref(),
            architectures.iter().map(|a| a.name.as_str()).collect::<Vec<_>>(),
        )
        .await?;

        let names = architectures.iter().map(|a| a.name.clone()).collect();
        let fanout = self.fanout.start(BuildRequest {
            specification,
            architectures,
        });

        Ok(InitOutcome {
            spec_id: id.clone(),
            architectures: names,
            topologies,
            fanout,
        })
    }
}
