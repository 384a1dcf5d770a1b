//! Approval gate: quarantine flagged objects and suspend for a decision
//!
//! The gate performs the storage side of suspension - tagging and moving
//! the affected set into quarantine and publishing the one notification
//! that carries the resumable callback URLs. The suspension itself is a
//! persisted state transition owned by the engine; nothing here blocks.

use crate::clients::{ApprovalNotifier, ObjectStore};
use crate::constants::{SENSITIVE_DATA_TAG, SENSITIVE_DATA_TAG_VALUE};
use crate::error::{PipelineError, Result};
use crate::types::{correlation_tags, ApprovalToken, RunId};
use crate::workflow::mover::{MoveOutcome, ObjectMover};
use std::sync::Arc;

pub struct ApprovalGate<S: ObjectStore, N: ApprovalNotifier> {
    store: Arc<S>,
    notifier: Arc<N>,
    mover: ObjectMover<S>,
    staging_bucket: String,
    quarantine_bucket: String,
    allow_endpoint: String,
    deny_endpoint: String,
}

impl<S: ObjectStore, N: ApprovalNotifier> ApprovalGate<S, N> {
    pub fn new(
        store: Arc<S>,
        notifier: Arc<N>,
        staging_bucket: String,
        quarantine_bucket: String,
        allow_endpoint: String,
        deny_endpoint: String,
    ) -> Self {
        let mover = ObjectMover::new(store.clone());

        Self {
            store,
            notifier,
            mover,
            staging_bucket,
            quarantine_bucket,
            allow_endpoint,
            deny_endpoint,
        }
    }

    /// Stamp the disposition and correlation tags on every affected key and
    /// move it from staging to quarantine. Safe to retry: keys already
    /// quarantined by an earlier attempt are skipped.
    pub async fn quarantine(&self, run_id: &RunId, keys: &[String]) -> Result<usize> {
        let mut tags = correlation_tags(run_id);
        tags.insert(
            SENSITIVE_DATA_TAG.to_string(),
            SENSITIVE_DATA_TAG_VALUE.to_string(),
        );

        let mut moved = 0;

        for key in keys {
            if !self.store.exists(&self.staging_bucket, key).await? {
                if self.store.exists(&self.quarantine_bucket, key).await? {
                    log::debug!("Object {} already quarantined", key);
                    moved += 1;
                    continue;
                }
                return Err(PipelineError::Workflow(format!(
                    "Affected object {} is in neither staging nor quarantine",
                    key
                )));
            }

            log::info!("Tagging flagged object: {}", key);
            self.store.put_tags(&self.staging_bucket, key, &tags).await?;

            // Tags travel with the copy, so the quarantined object carries
            // its disposition marker.
            match self
                .mover
                .move_object(&self.staging_bucket, &self.quarantine_bucket, key)
                .await?
            {
                MoveOutcome::Moved | MoveOutcome::AlreadyMoved => moved += 1,
                MoveOutcome::NotFound => {
                    return Err(PipelineError::Workflow(format!(
                        "Affected object {} vanished during quarantine",
                        key
                    )))
                }
            }
        }

        log::info!(
            "Quarantined {} object(s) for run {} pending approval",
            moved,
            run_id
        );
        Ok(moved)
    }

    /// Publish the single approval notification for a gated run
    pub async fn publish(
        &self,
        run_id: &RunId,
        token: &ApprovalToken,
        keys: &[String],
    ) -> Result<()> {
        let subject = "APPROVAL REQUIRED: Sensitive data identified in pipeline";
        let body = format!(
            "Sensitive data discovered in data pipeline run {}.\n\n\
             Approve: {}?token={}\n\n\
             Deny: {}?token={}\n\n\
             Files: {:?}",
            run_id, self.allow_endpoint, token, self.deny_endpoint, token, keys
        );

        self.notifier.notify(subject, &body).await
    }
}
