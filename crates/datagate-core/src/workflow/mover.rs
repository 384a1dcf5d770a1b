//! Object move primitives shared by ingest, gate and finalize steps
//!
//! Moves are copy-then-delete, never delete-then-copy: a crash mid-move
//! leaves the object recoverable at the source. Re-invoking a move whose
//! source is already gone and whose destination is present is a no-op
//! success, which makes every bulk operation built on it safe to retry
//! after a crash or an at-least-once redelivery.

use crate::clients::ObjectStore;
use crate::constants::WORKFLOW_ID_TAG;
use crate::error::Result;
use crate::types::{correlation_tags, RunId};
use std::sync::Arc;

/// Result of a single-object move
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveOutcome {
    /// The object was copied to the destination and deleted at the source
    Moved,
    /// The source was already gone and the destination holds the object
    AlreadyMoved,
    /// The object exists on neither side
    NotFound,
}

pub struct ObjectMover<S: ObjectStore> {
    store: Arc<S>,
}

impl<S: ObjectStore> ObjectMover<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Move one object between buckets, keeping its key.
    pub async fn move_object(
        &self,
        src_bucket: &str,
        dst_bucket: &str,
        key: &str,
    ) -> Result<MoveOutcome> {
        if !self.store.exists(src_bucket, key).await? {
            if self.store.exists(dst_bucket, key).await? {
                log::debug!("Object {} already moved to {}", key, dst_bucket);
                return Ok(MoveOutcome::AlreadyMoved);
            }
            return Ok(MoveOutcome::NotFound);
        }

        self.store.copy(src_bucket, key, dst_bucket, key).await?;
        self.store.delete(src_bucket, key).await?;

        log::info!("Moved object {} from {} to {}", key, src_bucket, dst_bucket);
        Ok(MoveOutcome::Moved)
    }

    /// Move every intake object into staging and stamp it with the run's
    /// correlation tag. Returns the number of objects moved.
    ///
    /// The tag is written on the destination copy before the source delete,
    /// so a retry after a crash finds either an untouched source object or
    /// a fully staged one - never a staged object without its tag.
    pub async fn stage_intake(
        &self,
        intake_bucket: &str,
        staging_bucket: &str,
        run_id: &RunId,
    ) -> Result<usize> {
        let tags = correlation_tags(run_id);
        let mut moved = 0;
        let mut token: Option<String> = None;

        loop {
            let page = self.store.list_page(intake_bucket, token.as_deref()).await?;

            for entry in &page.objects {
                log::info!("Staging object: {}", entry.key);
                self.store
                    .copy(intake_bucket, &entry.key, staging_bucket, &entry.key)
                    .await?;
                self.store.put_tags(staging_bucket, &entry.key, &tags).await?;
                self.store.delete(intake_bucket, &entry.key).await?;
                moved += 1;
            }

            match page.next_token {
                Some(t) => token = Some(t),
                None => break,
            }
        }

        Ok(moved)
    }

    /// Move every object in `src_bucket` carrying this run's correlation
    /// tag to `dst_bucket`. Objects tagged with a different run id are
    /// never touched. Returns the number of objects moved.
    ///
    /// Retried as a unit: a failure partway leaves some objects moved and
    /// some not, and the next invocation re-lists and matches only the
    /// remainder still present at the source.
    pub async fn move_tagged(
        &self,
        src_bucket: &str,
        dst_bucket: &str,
        run_id: &RunId,
    ) -> Result<usize> {
        let mut moved = 0;
        let mut token: Option<String> = None;

        loop {
            let page = self.store.list_page(src_bucket, token.as_deref()).await?;

            for entry in &page.objects {
                if !entry.belongs_to(run_id) {
                    log::debug!(
                        "Object tag not matching for {} (want {}={})",
                        entry.key,
                        WORKFLOW_ID_TAG,
                        run_id
                    );
                    continue;
                }

                match self.move_object(src_bucket, dst_bucket, &entry.key).await? {
                    MoveOutcome::Moved | MoveOutcome::AlreadyMoved => moved += 1,
                    MoveOutcome::NotFound => {
                        // Listed a moment ago; another invocation of this
                        // same run finished the move meanwhile.
                        log::debug!("Object {} vanished mid-sweep", entry.key);
                    }
                }
            }

            match page.next_token {
                Some(t) => token = Some(t),
                None => break,
            }
        }

        Ok(moved)
    }

    /// Count the objects in a bucket carrying this run's correlation tag
    pub async fn count_tagged(&self, bucket: &str, run_id: &RunId) -> Result<usize> {
        let mut count = 0;
        let mut token: Option<String> = None;

        loop {
            let page = self.store.list_page(bucket, token.as_deref()).await?;
            count += page.objects.iter().filter(|e| e.belongs_to(run_id)).count();

            match page.next_token {
                Some(t) => token = Some(t),
                None => break,
            }
        }

        Ok(count)
    }

    /// Delete the given keys from a bucket. Absent keys are skipped; the
    /// operation is safe to retry.
    pub async fn delete_keys(&self, bucket: &str, keys: &[String]) -> Result<usize> {
        let mut deleted = 0;
        for key in keys {
            log::info!("Deleting object: {}", key);
            self.store.delete(bucket, key).await?;
            deleted += 1;
        }
        Ok(deleted)
    }
}

impl<S: ObjectStore> Clone for ObjectMover<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::FsObjectStore;
    use tempfile::TempDir;

    fn mover() -> (TempDir, Arc<FsObjectStore>, ObjectMover<FsObjectStore>) {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(FsObjectStore::new(dir.path()).unwrap());
        let mover = ObjectMover::new(store.clone());
        (dir, store, mover)
    }

    #[tokio::test]
    async fn test_move_then_retry_is_noop() {
        let (_dir, store, mover) = mover();
        store.put_object("staging", "x.csv", b"data").unwrap();

        let first = mover.move_object("staging", "scanned", "x.csv").await.unwrap();
        assert_eq!(first, MoveOutcome::Moved);

        // Idempotence law: move(move(x)) == move(x)
        let second = mover.move_object("staging", "scanned", "x.csv").await.unwrap();
        assert_eq!(second, MoveOutcome::AlreadyMoved);

        assert!(!store.exists("staging", "x.csv").await.unwrap());
        assert!(store.exists("scanned", "x.csv").await.unwrap());
    }

    #[tokio::test]
    async fn test_move_missing_object() {
        let (_dir, _store, mover) = mover();
        let outcome = mover.move_object("staging", "scanned", "ghost").await.unwrap();
        assert_eq!(outcome, MoveOutcome::NotFound);
    }

    #[tokio::test]
    async fn test_stage_intake_tags_every_object() {
        let (_dir, store, mover) = mover();
        let run_id = RunId::new();

        store.put_object("intake", "a.csv", b"1").unwrap();
        store.put_object("intake", "b.csv", b"2").unwrap();

        let staged = mover.stage_intake("intake", "staging", &run_id).await.unwrap();
        assert_eq!(staged, 2);

        let page = store.list_page("intake", None).await.unwrap();
        assert!(page.objects.is_empty(), "intake must be drained");

        let tags = store.get_tags("staging", "a.csv").await.unwrap();
        assert_eq!(
            tags.get(WORKFLOW_ID_TAG).map(String::as_str),
            Some(run_id.as_str())
        );
    }

    #[tokio::test]
    async fn test_move_tagged_isolates_concurrent_runs() {
        let (_dir, store, mover) = mover();
        let run_a = RunId::new();
        let run_b = RunId::new();

        store.put_object("intake", "mine.csv", b"a").unwrap();
        mover.stage_intake("intake", "staging", &run_a).await.unwrap();

        store.put_object("intake", "theirs.csv", b"b").unwrap();
        mover.stage_intake("intake", "staging", &run_b).await.unwrap();

        let moved = mover.move_tagged("staging", "scanned", &run_a).await.unwrap();
        assert_eq!(moved, 1);

        // Run B's object is untouched by run A's sweep
        assert!(store.exists("staging", "theirs.csv").await.unwrap());
        assert!(store.exists("scanned", "mine.csv").await.unwrap());
        assert!(!store.exists("scanned", "theirs.csv").await.unwrap());
    }

    #[tokio::test]
    async fn test_move_tagged_retry_picks_up_remainder() {
        let (_dir, store, mover) = mover();
        let run_id = RunId::new();

        store.put_object("intake", "one.csv", b"1").unwrap();
        store.put_object("intake", "two.csv", b"2").unwrap();
        mover.stage_intake("intake", "staging", &run_id).await.unwrap();

        // Simulate a partial first sweep: one object already moved
        mover.move_object("staging", "scanned", "one.csv").await.unwrap();

        let moved = mover.move_tagged("staging", "scanned", &run_id).await.unwrap();
        assert_eq!(moved, 1);
        assert!(store.exists("scanned", "one.csv").await.unwrap());
        assert!(store.exists("scanned", "two.csv").await.unwrap());
    }

    #[tokio::test]
    async fn test_count_tagged() {
        let (_dir, store, mover) = mover();
        let run_id = RunId::new();

        store.put_object("intake", "a.bin", b"x").unwrap();
        mover.stage_intake("intake", "staging", &run_id).await.unwrap();
        store.put_object("staging", "untagged.bin", b"y").unwrap();

        assert_eq!(mover.count_tagged("staging", &run_id).await.unwrap(), 1);
        assert_eq!(mover.count_tagged("scanned", &run_id).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_delete_keys_tolerates_absent() {
        let (_dir, store, mover) = mover();
        store.put_object("quarantine", "bad.csv", b"pii").unwrap();

        let keys = vec!["bad.csv".to_string(), "never-existed.csv".to_string()];
        mover.delete_keys("quarantine", &keys).await.unwrap();
        assert!(!store.exists("quarantine", "bad.csv").await.unwrap());

        // Retry of the same delete set succeeds
        mover.delete_keys("quarantine", &keys).await.unwrap();
    }
}
