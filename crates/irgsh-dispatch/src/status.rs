//! Specification status transitions.
//!
//! The only writer of [`SpecStatus`] in the dispatcher. No transition
//! validation is performed; callers invoke it at the right points.

use std::sync::Arc;

use irgsh_state::{SpecId, SpecStatus, SpecificationStore};

use crate::error::Result;
use crate::obs;

/// Targeted status writer over a [`SpecificationStore`]
#[derive(Clone)]
pub struct StatusTracker {
    store: Arc<dyn SpecificationStore>,
}

impl StatusTracker {
    pub fn new(store: Arc<dyn SpecificationStore>) -> Self {
        StatusTracker { store }
    }

    /// Set an arbitrary status code.
    pub async fn set(&self, id: &SpecId, status: SpecStatus) -> Result<()> {
        self.store.update_status(id, status).await?;
        obs::emit_status_updated(id.as_str(), status.code());
        Ok(())
    }

    /// Files left this host successfully; remote acceptance is still pending.
    pub async fn mark_uploaded(&self, id: &SpecId) -> Result<()> {
        self.set(id, SpecStatus::UPLOADED).await
    }

    pub async fn mark_failed(&self, id: &SpecId) -> Result<()> {
        self.set(id, SpecStatus::FAILED).await
    }
}
