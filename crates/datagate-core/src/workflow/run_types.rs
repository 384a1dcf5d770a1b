//! Strongly typed workflow-run state and persisted record
//! No string-based state management - everything is strongly typed

use crate::types::{ApprovalToken, Decision, JobId, RunId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// State machine position of a workflow run.
///
/// `Scanning` and `Gating` are suspension points: the run can sit in them
/// indefinitely across invocations. `Done` and `Errored` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RunState {
    Staging,
    Scanning,
    Evaluating,
    Gating,
    FinalizingClean,
    FinalizingAllowed,
    FinalizingDenied,
    Done,
    Errored,
}

impl RunState {
    /// Every state, in pipeline order. Drives directory creation and
    /// whole-store scans.
    pub const ALL: [RunState; 9] = [
        Self::Staging,
        Self::Scanning,
        Self::Evaluating,
        Self::Gating,
        Self::FinalizingClean,
        Self::FinalizingAllowed,
        Self::FinalizingDenied,
        Self::Done,
        Self::Errored,
    ];

    /// Get directory name for file storage
    pub fn directory_name(&self) -> &'static str {
        match self {
            Self::Staging => "staging",
            Self::Scanning => "scanning",
            Self::Evaluating => "evaluating",
            Self::Gating => "gating",
            Self::FinalizingClean => "finalizing_clean",
            Self::FinalizingAllowed => "finalizing_allowed",
            Self::FinalizingDenied => "finalizing_denied",
            Self::Done => "done",
            Self::Errored => "errored",
        }
    }

    /// Terminal runs are never advanced again
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Errored)
    }
}

impl std::fmt::Display for RunState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.directory_name())
    }
}

/// Terminal outcome of a successful run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunOutcome {
    /// The intake area was empty; nothing to scan
    NoInput,
    /// The scan produced no findings
    Clean,
    /// Findings existed and the approver allowed release
    Allowed,
    /// Findings existed and the approver denied release
    Denied,
}

/// Persisted per-run document. One JSON file per run, living in the
/// directory of its current state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRecord {
    pub run_id: RunId,
    pub state: RunState,
    pub job_id: Option<JobId>,
    /// Deduplicated affected object keys, sorted; frozen once the findings
    /// feed has been fully drained
    pub affected_keys: Option<Vec<String>>,
    /// Present only while the run is suspended at the gate; redacted on
    /// consumption
    pub approval_token: Option<ApprovalToken>,
    pub decision: Option<Decision>,
    pub outcome: Option<RunOutcome>,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl RunRecord {
    /// Create a fresh record for a newly triggered run
    pub fn new(run_id: RunId) -> Self {
        let now = Utc::now();

        Self {
            run_id,
            state: RunState::Staging,
            job_id: None,
            affected_keys: None,
            approval_token: None,
            decision: None,
            outcome: None,
            last_error: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Record the submitted scan job
    pub fn record_job(&mut self, job_id: JobId) {
        self.job_id = Some(job_id);
        self.updated_at = Utc::now();
    }

    /// Freeze the deduplicated affected-key set
    pub fn record_affected_keys(&mut self, keys: Vec<String>) {
        self.affected_keys = Some(keys);
        self.updated_at = Utc::now();
    }

    /// Suspend at the gate, holding the minted token
    pub fn suspend_at_gate(&mut self, token: ApprovalToken) {
        self.approval_token = Some(token);
        self.updated_at = Utc::now();
    }

    /// Consume the token: redact it and record the decision. Single use -
    /// the token never appears in the record again.
    pub fn consume_token(&mut self, decision: Decision) {
        self.approval_token = None;
        self.decision = Some(decision);
        self.updated_at = Utc::now();
    }

    /// Record the terminal outcome
    pub fn complete(&mut self, outcome: RunOutcome) {
        self.outcome = Some(outcome);
        self.updated_at = Utc::now();
    }

    /// Record the error that parked this run
    pub fn mark_errored(&mut self, error: &str) {
        self.last_error = Some(error.to_string());
        self.updated_at = Utc::now();
    }
}
