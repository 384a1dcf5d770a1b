//! Scan job submission and status tracking
//!
//! The tracker owns no retry loop across invocations: each scheduler tick
//! performs one poll, the engine persists the last-seen status, and
//! repeated polls are cheap and order-independent.

use crate::clients::ScanService;
use crate::error::{PipelineError, Result};
use crate::types::{JobId, ScanJobStatus, ScanScope};
use std::sync::Arc;

pub struct ScanJobTracker<C: ScanService> {
    scanner: Arc<C>,
}

impl<C: ScanService> ScanJobTracker<C> {
    pub fn new(scanner: Arc<C>) -> Self {
        Self { scanner }
    }

    /// Submit a scan over the scoped object set
    pub async fn submit(&self, scope: &ScanScope) -> Result<JobId> {
        if scope.account_id.is_empty() || scope.bucket.is_empty() {
            return Err(PipelineError::Submission(
                "Scan scope is empty".to_string(),
            ));
        }

        let job_id = self.scanner.submit(scope).await?;
        log::info!(
            "Scanning bucket {} in account {} (job {})",
            scope.bucket,
            scope.account_id,
            job_id
        );

        Ok(job_id)
    }

    /// One idempotent, side-effect-free status poll
    pub async fn poll(&self, job_id: &JobId) -> Result<ScanJobStatus> {
        log::debug!("Checking scan job {} status", job_id);
        self.scanner.job_status(job_id).await
    }
}
