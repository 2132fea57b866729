//! Structured observability hooks for dispatcher runs.
//!
//! This module provides:
//! - A specification-scoped span for instrumenting orchestrator runs
//! - Emission functions for the lifecycle events of both orchestrators
//!
//! Events are emitted at `info!` level (`warn!` for failures); filter with
//! `RUST_LOG`.

use tracing::{info, warn};

/// Span for use with `tracing::Instrument` across `.await` points.
pub fn spec_span(run: &'static str, spec_id: &str) -> tracing::Span {
    tracing::info_span!("irgsh.spec", run = run, spec_id = %spec_id)
}

pub fn emit_init_started(spec_id: &str, distribution: &str, architectures: usize) {
    info!(
        event = "spec.init.started",
        spec_id = %spec_id,
        distribution = %distribution,
        architectures = architectures,
    );
}

pub fn emit_topology_declared(architecture: &str, queue: &str, routing_key: &str) {
    info!(
        event = "topology.declared",
        architecture = %architecture,
        queue = %queue,
        routing_key = %routing_key,
    );
}

pub fn emit_fanout_started(spec_id: &str, architectures: usize) {
    info!(event = "fanout.started", spec_id = %spec_id, architectures = architectures);
}

pub fn emit_upload_started(spec_id: &str, manifest: &str) {
    info!(event = "upload.started", spec_id = %spec_id, manifest = %manifest);
}

pub fn emit_upload_transferred(spec_id: &str, files: usize, duration_ms: u64) {
    info!(
        event = "upload.transferred",
        spec_id = %spec_id,
        files = files,
        duration_ms = duration_ms,
    );
}

pub fn emit_status_updated(spec_id: &str, status: i32) {
    info!(event = "status.updated", spec_id = %spec_id, status = status);
}

/// Emit event: upload run failed (warning level).
pub fn emit_upload_failed(spec_id: &str, kind: &str, error: &dyn std::fmt::Display) {
    warn!(event = "upload.failed", spec_id = %spec_id, kind = %kind, error = %error);
}

/// Emit event: the failure status could not be written (warning level).
pub fn emit_status_write_failed(spec_id: &str, error: &dyn std::fmt::Display) {
    warn!(event = "status.write_failed", spec_id = %spec_id, error = %error);
}

