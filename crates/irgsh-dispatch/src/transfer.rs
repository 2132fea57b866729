//! File transfer to the repository host.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use crate::config::UploadConfig;
use crate::error::{DispatchError, Result};

/// Moves a batch of local files to the remote repository host.
#[async_trait]
pub trait FileTransport: Send + Sync {
    /// Transfer all files in one operation. Succeeds only if every file arrived.
    async fn transfer(&self, files: &[PathBuf]) -> Result<()>;
}

/// Secure-copy transport: `<program> -P <port> <files...> <user>@<host>:<path>`
#[derive(Debug, Clone)]
pub struct ScpTransport {
    config: UploadConfig,
}

impl ScpTransport {
    pub fn new(config: UploadConfig) -> Self {
        ScpTransport { config }
    }

    /// Arguments passed to the copy program, in order.
    pub fn arguments(&self, files: &[PathBuf]) -> Vec<String> {
        let mut args = vec!["-P".to_string(), self.config.port.to_string()];
        args.extend(files.iter().map(|f| f.to_string_lossy().into_owned()));
        args.push(self.config.target());
        args
    }
}

#[async_trait]
impl FileTransport for ScpTransport {
    async fn transfer(&self, files: &[PathBuf]) -> Result<()> {
        if files.is_empty() {
            return Err(DispatchError::TransferError {
                exit_code: None,
                reason: "no files to transfer".to_string(),
            });
        }

        let start = Instant::now();
        let child = Command::new(&self.config.program)
            .args(self.arguments(files))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| DispatchError::TransferError {
                exit_code: None,
                reason: format!("failed to run {}: {e}", self.config.program),
            })?;

        let output = match self.config.timeout_secs {
            Some(secs) if secs > 0 => {
                tokio::time::timeout(Duration::from_secs(secs), child.wait_with_output())
                    .await
                    .map_err(|_| DispatchError::TransferError {
                        exit_code: None,
                        reason: format!("timed out after {secs} seconds"),
                    })?
            }
            _ => child.wait_with_output().await,
        }
        .map_err(|e| DispatchError::TransferError {
            exit_code: None,
            reason: e.to_string(),
        })?;

        let duration_ms = start.elapsed().as_millis() as u64;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(DispatchError::TransferError {
                exit_code: output.status.code(),
                reason: if stderr.trim().is_empty() {
                    format!("{} exited unsuccessfully", self.config.program)
                } else {
                    stderr.trim().to_string()
                },
            });
        }

        debug!(
            files = files.len(),
            target = %self.config.target(),
            duration_ms,
            "transfer complete"
        );
        Ok(())
    }
}
