//! Run finalization: route objects to their terminal destination
//!
//! All three paths are idempotent under retry; they re-list the staging
//! remainder and tag-match against the run id, so a partially completed
//! finalize simply resumes where it left off on the next invocation.

use crate::clients::ObjectStore;
use crate::error::{PipelineError, Result};
use crate::types::RunId;
use crate::workflow::mover::{MoveOutcome, ObjectMover};
use std::sync::Arc;

pub struct Finalizer<S: ObjectStore> {
    mover: ObjectMover<S>,
    staging_bucket: String,
    quarantine_bucket: String,
    scanned_bucket: String,
}

impl<S: ObjectStore> Finalizer<S> {
    pub fn new(
        store: Arc<S>,
        staging_bucket: String,
        quarantine_bucket: String,
        scanned_bucket: String,
    ) -> Self {
        Self {
            mover: ObjectMover::new(store),
            staging_bucket,
            quarantine_bucket,
            scanned_bucket,
        }
    }

    /// No findings: everything still tagged with the run moves from
    /// staging to the scanned-data area.
    pub async fn finalize_clean(&self, run_id: &RunId) -> Result<usize> {
        log::info!("Moving files without sensitive data for run {}", run_id);
        self.mover
            .move_tagged(&self.staging_bucket, &self.scanned_bucket, run_id)
            .await
    }

    /// Decision was allow: release the quarantined set, then sweep any
    /// remaining tag-matched staging objects.
    pub async fn finalize_allowed(&self, run_id: &RunId, affected_keys: &[String]) -> Result<usize> {
        let mut moved = 0;

        for key in affected_keys {
            match self
                .mover
                .move_object(&self.quarantine_bucket, &self.scanned_bucket, key)
                .await?
            {
                MoveOutcome::Moved | MoveOutcome::AlreadyMoved => moved += 1,
                MoveOutcome::NotFound => {
                    return Err(PipelineError::Workflow(format!(
                        "Quarantined object {} is missing from both quarantine and scanned-data",
                        key
                    )))
                }
            }
        }

        moved += self
            .mover
            .move_tagged(&self.staging_bucket, &self.scanned_bucket, run_id)
            .await?;

        log::info!("Released {} object(s) for allowed run {}", moved, run_id);
        Ok(moved)
    }

    /// Decision was deny: dispose of the quarantined payloads, then sweep
    /// the remaining clean objects to scanned-data. The affected-key list
    /// and the decision stay in the run record as the audit evidence.
    pub async fn finalize_denied(&self, run_id: &RunId, affected_keys: &[String]) -> Result<usize> {
        self.mover
            .delete_keys(&self.quarantine_bucket, affected_keys)
            .await?;

        let moved = self
            .mover
            .move_tagged(&self.staging_bucket, &self.scanned_bucket, run_id)
            .await?;

        log::info!(
            "Disposed {} quarantined object(s) for denied run {}",
            affected_keys.len(),
            run_id
        );
        Ok(moved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::FsObjectStore;
    use tempfile::TempDir;

    async fn seeded() -> (TempDir, Arc<FsObjectStore>, Finalizer<FsObjectStore>, RunId) {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(FsObjectStore::new(dir.path()).unwrap());
        let run_id = RunId::new();

        store.put_object("intake", "clean.csv", b"ok").unwrap();
        store.put_object("intake", "flagged.csv", b"pii").unwrap();
        ObjectMover::new(store.clone())
            .stage_intake("intake", "staging", &run_id)
            .await
            .unwrap();

        let finalizer = Finalizer::new(
            store.clone(),
            "staging".to_string(),
            "quarantine".to_string(),
            "scanned".to_string(),
        );
        (dir, store, finalizer, run_id)
    }

    #[tokio::test]
    async fn test_finalize_clean_sweeps_staging() {
        let (_dir, store, finalizer, run_id) = seeded().await;

        let moved = finalizer.finalize_clean(&run_id).await.unwrap();
        assert_eq!(moved, 2);
        assert!(store.exists("scanned", "clean.csv").await.unwrap());
        assert!(store.exists("scanned", "flagged.csv").await.unwrap());
    }

    #[tokio::test]
    async fn test_finalize_denied_deletes_payload_and_sweeps_rest() {
        let (_dir, store, finalizer, run_id) = seeded().await;

        // Pretend the gate quarantined the flagged object
        ObjectMover::new(store.clone())
            .move_object("staging", "quarantine", "flagged.csv")
            .await
            .unwrap();

        let affected = vec!["flagged.csv".to_string()];
        finalizer.finalize_denied(&run_id, &affected).await.unwrap();

        assert!(!store.exists("quarantine", "flagged.csv").await.unwrap());
        assert!(!store.exists("scanned", "flagged.csv").await.unwrap());
        assert!(store.exists("scanned", "clean.csv").await.unwrap());

        // Retry is a no-op success
        finalizer.finalize_denied(&run_id, &affected).await.unwrap();
    }

    #[tokio::test]
    async fn test_finalize_allowed_releases_quarantine() {
        let (_dir, store, finalizer, run_id) = seeded().await;

        ObjectMover::new(store.clone())
            .move_object("staging", "quarantine", "flagged.csv")
            .await
            .unwrap();

        let affected = vec!["flagged.csv".to_string()];
        let moved = finalizer.finalize_allowed(&run_id, &affected).await.unwrap();

        assert_eq!(moved, 2);
        assert!(store.exists("scanned", "flagged.csv").await.unwrap());
        assert!(store.exists("scanned", "clean.csv").await.unwrap());
        assert!(!store.exists("quarantine", "flagged.csv").await.unwrap());
    }
}
