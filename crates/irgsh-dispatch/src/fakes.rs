//! In-memory fakes for the dispatch seams (testing only)
//!
//! - `RecordingBroker`: a `BrokerConnector` that keeps declared topology in
//!   memory and counts opened/closed connections
//! - `RecordingFanout`: a `BuildFanout` that records started requests
//! - `RecordingTransport`: a `FileTransport` that records transferred batches

use std::collections::{BTreeSet, HashMap};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::error::{DispatchError, Result};
use crate::fanout::{BuildFanout, BuildRequest, FanoutTicket};
use crate::topology::{BrokerConnector, BrokerError, ExchangeKind, TopologyChannel};
use crate::transfer::FileTransport;

// ---------------------------------------------------------------------------
// RecordingBroker
// ---------------------------------------------------------------------------

/// Declared topology, comparable across calls
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BrokerSnapshot {
    pub exchanges: Vec<(String, ExchangeKind)>,
    pub queues: BTreeSet<String>,
    pub bindings: BTreeSet<(String, String, String)>,
}

#[derive(Debug, Default)]
struct BrokerState {
    exchanges: HashMap<String, ExchangeKind>,
    queues: BTreeSet<String>,
    bindings: BTreeSet<(String, String, String)>,
    opened: usize,
    closed: usize,
}

/// In-memory broker. Redeclaring an exchange with a different kind fails the
/// way a real broker rejects it.
#[derive(Debug, Clone, Default)]
pub struct RecordingBroker {
    state: Arc<Mutex<BrokerState>>,
    failing_queues: BTreeSet<String>,
    unreachable: bool,
}

impl RecordingBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// A broker that refuses every connection.
    pub fn unreachable() -> Self {
        RecordingBroker {
            unreachable: true,
            ..Self::default()
        }
    }

    /// Reject declarations of the named queue.
    pub fn fail_queue(mut self, queue: &str) -> Self {
        self.failing_queues.insert(queue.to_string());
        self
    }

    pub fn exchange_kind(&self, name: &str) -> Option<ExchangeKind> {
        self.state.lock().unwrap().exchanges.get(name).copied()
    }

    pub fn has_queue(&self, name: &str) -> bool {
        self.state.lock().unwrap().queues.contains(name)
    }

    pub fn has_binding(&self, queue: &str, exchange: &str, routing_key: &str) -> bool {
        self.state.lock().unwrap().bindings.contains(&(
            queue.to_string(),
            exchange.to_string(),
            routing_key.to_string(),
        ))
    }

    pub fn queues(&self) -> Vec<String> {
        self.state.lock().unwrap().queues.iter().cloned().collect()
    }

    pub fn connections_opened(&self) -> usize {
        self.state.lock().unwrap().opened
    }

    pub fn connections_closed(&self) -> usize {
        self.state.lock().unwrap().closed
    }

    pub fn snapshot(&self) -> BrokerSnapshot {
        let state = self.state.lock().unwrap();
        let mut exchanges: Vec<(String, ExchangeKind)> = state
            .exchanges
            .iter()
            .map(|(name, kind)| (name.clone(), *kind))
            .collect();
        exchanges.sort_by(|a, b| a.0.cmp(&b.0));
        BrokerSnapshot {
            exchanges,
            queues: state.queues.clone(),
            bindings: state.bindings.clone(),
        }
    }
}

struct RecordingChannel {
    state: Arc<Mutex<BrokerState>>,
    failing_queues: BTreeSet<String>,
    closed: bool,
}

#[async_trait]
impl TopologyChannel for RecordingChannel {
    async fn declare_exchange(
        &mut self,
        name: &str,
        kind: ExchangeKind,
    ) -> std::result::Result<(), BrokerError> {
        let mut state = self.state.lock().unwrap();
        match state.exchanges.get(name) {
            Some(existing) if *existing != kind => Err(BrokerError::new(format!(
                "PRECONDITION_FAILED - inequivalent arg 'type' for exchange '{name}'"
            ))),
            _ => {
                state.exchanges.insert(name.to_string(), kind);
                Ok(())
            }
        }
    }

    async fn declare_queue(&mut self, name: &str) -> std::result::Result<(), BrokerError> {
        if self.failing_queues.contains(name) {
            return Err(BrokerError::new(format!(
                "ACCESS_REFUSED - access to queue '{name}' refused"
            )));
        }
        self.state.lock().unwrap().queues.insert(name.to_string());
        Ok(())
    }

    async fn bind_queue(
        &mut self,
        queue: &str,
        exchange: &str,
        routing_key: &str,
    ) -> std::result::Result<(), BrokerError> {
        let mut state = self.state.lock().unwrap();
        if !state.queues.contains(queue) || !state.exchanges.contains_key(exchange) {
            return Err(BrokerError::new(format!(
                "NOT_FOUND - cannot bind {queue} to {exchange}"
            )));
        }
        state.bindings.insert((
            queue.to_string(),
            exchange.to_string(),
            routing_key.to_string(),
        ));
        Ok(())
    }

    async fn close(&mut self) -> std::result::Result<(), BrokerError> {
        if !self.closed {
            self.closed = true;
            self.state.lock().unwrap().closed += 1;
        }
        Ok(())
    }
}

#[async_trait]
impl BrokerConnector for RecordingBroker {
    async fn open(&self) -> std::result::Result<Box<dyn TopologyChannel>, BrokerError> {
        if self.unreachable {
            return Err(BrokerError::new("connection refused"));
        }
        self.state.lock().unwrap().opened += 1;
        Ok(Box::new(RecordingChannel {
            state: Arc::clone(&self.state),
            failing_queues: self.failing_queues.clone(),
            closed: false,
        }))
    }
}

// ---------------------------------------------------------------------------
// RecordingFanout
// ---------------------------------------------------------------------------

/// Build fan-out delegate that only records what it was started with.
#[derive(Debug, Clone, Default)]
pub struct RecordingFanout {
    started: Arc<Mutex<Vec<BuildRequest>>>,
}

impl RecordingFanout {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn started(&self) -> Vec<BuildRequest> {
        self.started.lock().unwrap().clone()
    }
}

impl BuildFanout for RecordingFanout {
    fn start(&self, request: BuildRequest) -> FanoutTicket {
        self.started.lock().unwrap().push(request);
        FanoutTicket::detached()
    }
}

// ---------------------------------------------------------------------------
// RecordingTransport
// ---------------------------------------------------------------------------

/// File transport that records every batch and optionally fails.
#[derive(Debug, Clone, Default)]
pub struct RecordingTransport {
    batches: Arc<Mutex<Vec<Vec<PathBuf>>>>,
    exit_code: Option<i32>,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail every transfer as if the copy program exited with `code`.
    pub fn failing(code: i32) -> Self {
        RecordingTransport {
            exit_code: Some(code),
            ..Self::default()
        }
    }

    pub fn batches(&self) -> Vec<Vec<PathBuf>> {
        self.batches.lock().unwrap().clone()
    }
}

#[async_trait]
impl FileTransport for RecordingTransport {
    async fn transfer(&self, files: &[PathBuf]) -> Result<()> {
        self.batches.lock().unwrap().push(files.to_vec());
        match self.exit_code {
            Some(code) => Err(DispatchError::TransferError {
                exit_code: Some(code),
                reason: "simulated transfer failure".to_string(),
            }),
            None => Ok(()),
        }
    }
}
