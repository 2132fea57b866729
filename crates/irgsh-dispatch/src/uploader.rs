//! Source upload: `Loaded → FilesResolved → Transferred → StatusUpdated`.
//!
//! Every attempt on a resolvable specification ends in either
//! [`SpecStatus::UPLOADED`] or [`SpecStatus::FAILED`].

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use irgsh_state::{SpecId, SpecificationStore};
use tracing::Instrument;

use crate::config::DispatchConfig;
use crate::error::{DispatchError, Result};
use crate::manifest;
use crate::obs;
use crate::status::StatusTracker;
use crate::transfer::FileTransport;

/// Result of a successful upload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadOutcome {
    pub spec_id: SpecId,
    /// Absolute paths transferred, manifest last
    pub files: Vec<PathBuf>,
}

pub struct UploadDispatcher {
    config: DispatchConfig,
    store: Arc<dyn SpecificationStore>,
    status: StatusTracker,
    transport: Arc<dyn FileTransport>,
}

impl UploadDispatcher {
    pub fn new(
        config: DispatchConfig,
        store: Arc<dyn SpecificationStore>,
        transport: Arc<dyn FileTransport>,
    ) -> Self {
        UploadDispatcher {
            config,
            status: StatusTracker::new(store.clone()),
            store,
            transport,
        }
    }

    /// Upload the artifacts of one specification.
    ///
    /// Any failure other than `NotFound` first records `FAILED`, then
    /// returns the original error. If recording the failure itself fails,
    /// that is logged and the original error still wins.
    pub async fn run(&self, id: &SpecId) -> Result<UploadOutcome> {
        async {
            match self.upload(id).await {
                Ok(outcome) => Ok(outcome),
                Err(err @ DispatchError::NotFound(_)) => Err(err),
                Err(err) => {
                    obs::emit_upload_failed(id.as_str(), &err.kind().to_string(), &err);
                    if let Err(write_err) = self.status.mark_failed(id).await {
                        obs::emit_status_write_failed(id.as_str(), &write_err);
                    }
                    Err(err)
                }
            }
        }
        .instrument(obs::spec_span("upload", id.as_str()))
        .await
    }

    async fn upload(&self, id: &SpecId) -> Result<UploadOutcome> {
        let specification = self.store.load(id).await?;
        let manifest_name = specification.manifest_name();
        let artifact_dir = self.config.artifact_dir(id);
        obs::emit_upload_started(id.as_str(), &manifest_name);

        let mut names = manifest::manifest_files(&artifact_dir.join(&manifest_name))?;
        names.push(manifest_name);
        let files: Vec<PathBuf> = names.iter().map(|name| artifact_dir.join(name)).collect();

        let start = Instant::now();
        self.transport.transfer(&files).await?;
        obs::emit_upload_transferred(
            id.as_str(),
            files.len(),
            start.elapsed().as_millis() as u64,
        );

        self.status.mark_uploaded(id).await?;
        Ok(UploadOutcome {
            spec_id: id.clone(),
            files,
        })
    }
}
