//! irgsh dispatch core
//!
//! Two orchestrators sit on top of a handful of seams:
//!
//! - [`SpecInitializer`] declares builder queues for every active
//!   architecture of a specification and starts its build fan-out.
//! - [`UploadDispatcher`] transfers a built specification's source package
//!   to the repository host and records the outcome through [`StatusTracker`].
//!
//! Broker, fan-out and file transfer are traits with AMQP / scp
//! implementations and in-memory [`fakes`] for tests.

pub mod amqp;
pub mod config;
pub mod error;
pub mod fakes;
pub mod fanout;
pub mod initializer;
pub mod manifest;
pub mod obs;
pub mod status;
pub mod telemetry;
pub mod topology;
pub mod transfer;
pub mod uploader;

pub use amqp::{AmqpConnector, AmqpFanout};
pub use config::{BrokerConfig, DispatchConfig, UploadConfig};
pub use error::{DispatchError, ErrorKind, Result};
pub use fanout::{BuildFanout, BuildMessage, BuildRequest, FanoutTicket};
pub use initializer::{InitOutcome, SpecInitializer};
pub use manifest::{manifest_files, parse_files_section};
pub use obs::{
    emit_fanout_started, emit_init_started, emit_status_updated, emit_status_write_failed,
    emit_topology_declared, emit_upload_failed, emit_upload_started, emit_upload_transferred,
    spec_span,
};
pub use status::StatusTracker;
pub use topology::{
    declare_all, declare_architecture, BrokerConnector, BrokerError, ChannelGuard, ExchangeKind,
    QueueTopology, TopologyChannel, BUILDER_EXCHANGE,
};
pub use transfer::{FileTransport, ScpTransport};
pub use uploader::{UploadDispatcher, UploadOutcome};

pub use irgsh_state::{SpecId, SpecStatus, Specification};
