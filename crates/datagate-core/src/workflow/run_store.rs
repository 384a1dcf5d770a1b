//! Persisted workflow-run store
//! File-based store with atomic state transitions
//!
//! One JSON record per run, stored in the directory of its current state.
//! The directory an entry lives in is the authoritative state; the `state`
//! field inside the record is denormalized for readers and reconciled on
//! load. A state transition renames the record between directories first
//! and rewrites its body second: the rename is the atomic check-and-set,
//! so of two invocations racing on the same transition exactly one wins
//! and the loser observes the source file already gone.

use super::run_types::{RunRecord, RunState};
use crate::error::{PipelineError, Result};
use crate::types::{ApprovalToken, RunId};
use chrono::Utc;
use std::fs;
use std::path::{Path, PathBuf};

pub struct RunStore {
    root_path: PathBuf,
}

impl RunStore {
    /// Create a new RunStore rooted at the given path
    pub fn new<P: AsRef<Path>>(root_path: P) -> Result<Self> {
        let root_path = root_path.as_ref().to_path_buf();

        // Create directory structure
        for state in RunState::ALL {
            fs::create_dir_all(root_path.join(state.directory_name()))?;
        }

        Ok(Self { root_path })
    }

    /// Get path for a run in a specific state
    fn run_path(&self, state: RunState, run_id: &RunId) -> PathBuf {
        self.root_path
            .join(state.directory_name())
            .join(format!("run_{}.json", run_id))
    }

    /// Find a run in any state
    fn find_run_path(&self, run_id: &RunId) -> Option<(PathBuf, RunState)> {
        for state in RunState::ALL {
            let path = self.run_path(state, run_id);
            if path.exists() {
                return Some((path, state));
            }
        }

        None
    }

    /// Write a run record to file
    fn write_record(&self, path: &Path, record: &RunRecord) -> Result<()> {
        let json = serde_json::to_string_pretty(record)
            .map_err(|e| PipelineError::Serialization(format!("Failed to serialize run: {}", e)))?;

        fs::write(path, json)?;

        Ok(())
    }

    /// Read a run record from file
    fn read_record(&self, path: &Path) -> Result<RunRecord> {
        let json = fs::read_to_string(path)?;

        serde_json::from_str(&json)
            .map_err(|e| PipelineError::Deserialization(format!("Failed to deserialize run: {}", e)))
    }

    /// Create a new run in the staging state. Fails if a run with this id
    /// already exists in any state.
    pub fn create(&self, run_id: &RunId) -> Result<RunRecord> {
        if let Some((_, state)) = self.find_run_path(run_id) {
            return Err(PipelineError::Workflow(format!(
                "Run {} already exists in state {}",
                run_id, state
            )));
        }

        let record = RunRecord::new(run_id.clone());
        let path = self.run_path(RunState::Staging, run_id);
        self.write_record(&path, &record)?;

        log::info!("Created run record: {}", run_id);
        Ok(record)
    }

    /// Get a run by id, if it exists in any state.
    ///
    /// The returned record's `state` reflects the directory the record was
    /// found in, healing a record whose body write was interrupted after
    /// the transition rename.
    pub fn get(&self, run_id: &RunId) -> Result<Option<RunRecord>> {
        if let Some((path, state)) = self.find_run_path(run_id) {
            let mut record = self.read_record(&path)?;
            if record.state != state {
                record.state = state;
            }
            return Ok(Some(record));
        }

        Ok(None)
    }

    /// List all runs currently in a specific state
    pub fn list_in_state(&self, state: RunState) -> Result<Vec<RunRecord>> {
        let state_dir = self.root_path.join(state.directory_name());

        if !state_dir.exists() {
            return Ok(Vec::new());
        }

        let mut records = Vec::new();

        for entry in fs::read_dir(&state_dir)? {
            let entry = entry?;

            let path = entry.path();
            if path.is_file() && path.extension().and_then(|s| s.to_str()) == Some("json") {
                if let Ok(mut record) = self.read_record(&path) {
                    record.state = state;
                    records.push(record);
                }
            }
        }

        Ok(records)
    }

    /// List every run that has not reached a terminal state
    pub fn list_active(&self) -> Result<Vec<RunRecord>> {
        let mut records = Vec::new();
        for state in RunState::ALL {
            if !state.is_terminal() {
                records.extend(self.list_in_state(state)?);
            }
        }
        Ok(records)
    }

    /// Locate the run holding the given approval token, in whatever state
    pub fn find_by_token(&self, token: &ApprovalToken) -> Result<Option<RunRecord>> {
        for state in RunState::ALL {
            for record in self.list_in_state(state)? {
                if record.approval_token.as_ref() == Some(token) {
                    return Ok(Some(record));
                }
            }
        }

        Ok(None)
    }

    /// Atomically transition a run from `from` to `to`, applying `mutate`
    /// to the record body.
    ///
    /// The rename is the conditional update guarded by the run's current
    /// recorded state: if the run is not in `from` (or a concurrent
    /// invocation claimed the transition first) the rename finds no source
    /// file and the call fails with `WrongState`. The losing invocation
    /// must discard its result, not retry the same transition.
    pub fn transition<F>(
        &self,
        run_id: &RunId,
        from: RunState,
        to: RunState,
        mutate: F,
    ) -> Result<RunRecord>
    where
        F: FnOnce(&mut RunRecord),
    {
        let from_path = self.run_path(from, run_id);
        let to_path = self.run_path(to, run_id);

        // Claim first. A rename failure means the run moved on already.
        if let Err(e) = fs::rename(&from_path, &to_path) {
            if e.kind() == std::io::ErrorKind::NotFound {
                let current = self
                    .find_run_path(run_id)
                    .map(|(_, s)| s.to_string())
                    .unwrap_or_else(|| "unknown".to_string());
                return Err(PipelineError::WrongState(format!(
                    "Run {} is not in {} (currently {})",
                    run_id, from, current
                )));
            }
            return Err(e.into());
        }

        let mut record = self.read_record(&to_path)?;
        record.state = to;
        mutate(&mut record);
        record.updated_at = Utc::now();
        self.write_record(&to_path, &record)?;

        log::info!("Run {} transitioned {} -> {}", run_id, from, to);
        Ok(record)
    }

    /// Rewrite a run's record in place without changing its state
    pub fn update<F>(&self, run_id: &RunId, mutate: F) -> Result<RunRecord>
    where
        F: FnOnce(&mut RunRecord),
    {
        let (path, state) = self
            .find_run_path(run_id)
            .ok_or_else(|| PipelineError::NotFound(format!("Run {} not found", run_id)))?;

        let mut record = self.read_record(&path)?;
        record.state = state;
        mutate(&mut record);
        record.updated_at = Utc::now();
        self.write_record(&path, &record)?;

        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Decision, JobId};
    use tempfile::TempDir;

    fn store() -> (TempDir, RunStore) {
        let dir = TempDir::new().unwrap();
        let store = RunStore::new(dir.path()).unwrap();
        (dir, store)
    }

    #[test]
    fn test_store_creates_state_directories() {
        let (dir, _store) = store();

        for state in RunState::ALL {
            let state_dir = dir.path().join(state.directory_name());
            assert!(state_dir.exists(), "State directory {:?} should exist", state_dir);
        }
    }

    #[test]
    fn test_create_and_get() {
        let (_dir, store) = store();
        let run_id = RunId::new();

        store.create(&run_id).unwrap();

        let record = store.get(&run_id).unwrap().unwrap();
        assert_eq!(record.run_id, run_id);
        assert_eq!(record.state, RunState::Staging);

        // A second create with the same id must fail
        assert!(store.create(&run_id).is_err());
    }

    #[test]
    fn test_get_unknown_run() {
        let (_dir, store) = store();
        assert!(store.get(&RunId::new()).unwrap().is_none());
    }

    #[test]
    fn test_transition_moves_record_between_directories() {
        let (dir, store) = store();
        let run_id = RunId::new();
        store.create(&run_id).unwrap();

        let record = store
            .transition(&run_id, RunState::Staging, RunState::Scanning, |r| {
                r.record_job(JobId::new("job-7".to_string()))
            })
            .unwrap();

        assert_eq!(record.state, RunState::Scanning);
        assert!(dir
            .path()
            .join("scanning")
            .join(format!("run_{}.json", run_id))
            .exists());
        assert!(!dir
            .path()
            .join("staging")
            .join(format!("run_{}.json", run_id))
            .exists());

        let loaded = store.get(&run_id).unwrap().unwrap();
        assert_eq!(loaded.job_id, Some(JobId::new("job-7".to_string())));
    }

    #[test]
    fn test_transition_from_wrong_state_fails() {
        let (_dir, store) = store();
        let run_id = RunId::new();
        store.create(&run_id).unwrap();

        let result = store.transition(&run_id, RunState::Scanning, RunState::Evaluating, |_| {});
        assert!(matches!(result, Err(PipelineError::WrongState(_))));

        // The record did not move
        let record = store.get(&run_id).unwrap().unwrap();
        assert_eq!(record.state, RunState::Staging);
    }

    #[test]
    fn test_concurrent_transition_single_winner() {
        let (_dir, store) = store();
        let store = std::sync::Arc::new(store);
        let run_id = RunId::new();
        store.create(&run_id).unwrap();
        store
            .transition(&run_id, RunState::Staging, RunState::Gating, |r| {
                r.suspend_at_gate(crate::types::ApprovalToken::mint())
            })
            .unwrap();

        let mut handles = Vec::new();
        for decision in [Decision::Allow, Decision::Deny] {
            let store = store.clone();
            let run_id = run_id.clone();
            let to = match decision {
                Decision::Allow => RunState::FinalizingAllowed,
                Decision::Deny => RunState::FinalizingDenied,
            };
            handles.push(std::thread::spawn(move || {
                store.transition(&run_id, RunState::Gating, to, |r| r.consume_token(decision))
            }));
        }

        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        let winners = results.iter().filter(|r| r.is_ok()).count();
        assert_eq!(winners, 1, "exactly one concurrent transition may win");
    }

    #[test]
    fn test_find_by_token() {
        let (_dir, store) = store();
        let run_id = RunId::new();
        store.create(&run_id).unwrap();

        let token = crate::types::ApprovalToken::mint();
        store
            .transition(&run_id, RunState::Staging, RunState::Gating, |r| {
                r.suspend_at_gate(token.clone())
            })
            .unwrap();

        let found = store.find_by_token(&token).unwrap().unwrap();
        assert_eq!(found.run_id, run_id);
        assert_eq!(found.state, RunState::Gating);

        assert!(store
            .find_by_token(&crate::types::ApprovalToken::mint())
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_list_active_skips_terminal_runs() {
        let (_dir, store) = store();

        let active_id = RunId::new();
        store.create(&active_id).unwrap();

        let done_id = RunId::new();
        store.create(&done_id).unwrap();
        store
            .transition(&done_id, RunState::Staging, RunState::Done, |r| {
                r.complete(super::super::run_types::RunOutcome::NoInput)
            })
            .unwrap();

        let active = store.list_active().unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].run_id, active_id);
    }

    #[test]
    fn test_records_persist_across_reopen() {
        let dir = TempDir::new().unwrap();
        let run_id = RunId::new();

        {
            let store = RunStore::new(dir.path()).unwrap();
            store.create(&run_id).unwrap();
            store
                .transition(&run_id, RunState::Staging, RunState::Scanning, |r| {
                    r.record_job(JobId::new("job-42".to_string()))
                })
                .unwrap();
        }

        // Second instance sees the persisted run
        let store = RunStore::new(dir.path()).unwrap();
        let record = store.get(&run_id).unwrap().unwrap();
        assert_eq!(record.state, RunState::Scanning);
        assert_eq!(record.job_id, Some(JobId::new("job-42".to_string())));
    }
}
