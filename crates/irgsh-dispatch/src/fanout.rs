//! Build fan-out delegate.
//!
//! Once builder queues exist, the specification is handed to a delegate that
//! publishes one work message per architecture. The hand-off is
//! fire-and-forget: the initializer never observes the delegate's outcome.

use chrono::{DateTime, Utc};
use irgsh_state::{Architecture, Specification};
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;

/// A specification together with the architectures it must be built for
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildRequest {
    pub specification: Specification,
    pub architectures: Vec<Architecture>,
}

/// Work message consumed by a builder from `builder_<arch>`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildMessage {
    pub spec_id: String,
    pub distribution: String,
    pub source: String,
    pub version: String,
    pub architecture: String,
    pub dispatched_at: DateTime<Utc>,
}

impl BuildMessage {
    pub fn new(spec: &Specification, architecture: &str) -> Self {
        BuildMessage {
            spec_id: spec.id.0.clone(),
            distribution: spec.distribution.clone(),
            source: spec.source.clone(),
            version: spec.version.clone(),
            architecture: architecture.to_string(),
            dispatched_at: Utc::now(),
        }
    }
}

/// Handle on a started fan-out.
///
/// Dropping it leaves the fan-out running. A short-lived process that must
/// not exit before publishing finishes can [`FanoutTicket::settle`] it.
#[derive(Debug)]
pub struct FanoutTicket {
    task: Option<JoinHandle<()>>,
}

impl FanoutTicket {
    /// Ticket for a fan-out that completed synchronously or runs elsewhere
    pub fn detached() -> Self {
        FanoutTicket { task: None }
    }

    pub fn spawned(task: JoinHandle<()>) -> Self {
        FanoutTicket { task: Some(task) }
    }

    /// Whether there is nothing left to wait for.
    pub fn is_finished(&self) -> bool {
        self.task.as_ref().map_or(true, |task| task.is_finished())
    }

    /// Wait until the background fan-out task (if any) has finished.
    pub async fn settle(self) {
        if let Some(task) = self.task {
            if let Err(e) = task.await {
                tracing::warn!(error = %e, "fan-out task aborted");
            }
        }
    }
}

/// Delegate that fans one specification out to its builders.
pub trait BuildFanout: Send + Sync {
    /// Start the fan-out. Must not block on publishing.
    fn start(&self, request: BuildRequest) -> FanoutTicket;
}

#[cfg(test)]
mod tests {
    use super::*;
    use irgsh_state::{SpecId, SpecStatus};

    #[test]
    fn build_message_carries_spec_identity() {
        let spec = Specification {
            id: SpecId::new("S1"),
            distribution: "arok".to_string(),
            source: "pkg".to_string(),
            version: "1.0".to_string(),
            status: SpecStatus::default(),
        };
        let message = BuildMessage::new(&spec, "amd64");
        assert_eq!(message.spec_id, "S1");
        assert_eq!(message.architecture, "amd64");

        let json = serde_json::to_value(&message).unwrap();
        assert_eq!(json["source"], "pkg");
        assert_eq!(json["distribution"], "arok");
    }

    #[tokio::test]
    async fn settle_waits_for_spawned_task() {
        let (tx, rx) = tokio::sync::oneshot::channel();
        let ticket = FanoutTicket::spawned(tokio::spawn(async move {
            let _ = tx.send(7);
        }));
        ticket.settle().await;
        assert_eq!(rx.await.unwrap(), 7);
    }

    #[tokio::test]
    async fn settle_detached_returns_immediately() {
        let ticket = FanoutTicket::detached();
        assert!(ticket.is_finished());
        ticket.settle().await;
    }

    #[tokio::test]
    async fn spawned_ticket_is_pending_until_task_ends() {
        let (tx, rx) = tokio::sync::oneshot::channel::<()>();
        let ticket = FanoutTicket::spawned(tokio::spawn(async move {
            let _ = rx.await;
        }));
        assert!(!ticket.is_finished());
        tx.send(()).unwrap();
        ticket.settle().await;
    }
}
