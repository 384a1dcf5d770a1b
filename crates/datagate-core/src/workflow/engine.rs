//! Workflow engine: the per-run state machine
//!
//! The engine is driven by discrete invocations - a scheduler tick or a
//! decision callback - never by a long-lived thread. `Scanning` and
//! `Gating` are persisted suspension points the run can occupy across any
//! number of invocations. Each transition is a conditional update guarded
//! by the run's recorded state (see `RunStore::transition`); an invocation
//! that loses a transition race discards its result.

use super::aggregator::FindingsAggregator;
use super::finalizer::Finalizer;
use super::gate::ApprovalGate;
use super::mover::ObjectMover;
use super::run_store::RunStore;
use super::run_types::{RunOutcome, RunRecord, RunState};
use super::tracker::ScanJobTracker;
use crate::clients::{ApprovalNotifier, ObjectStore, ScanService};
use crate::config::PipelineConfig;
use crate::error::{PipelineError, Result};
use crate::retry;
use crate::types::{ApprovalToken, Decision, RunId, ScanJobStatus, ScanScope};
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;

/// Confirmation payload echoed back to the approval front door
#[derive(Debug, Clone, Serialize)]
pub struct DecisionConfirmation {
    pub action: String,
    pub run_id: RunId,
}

pub struct WorkflowEngine<S: ObjectStore, C: ScanService, N: ApprovalNotifier> {
    runs: RunStore,
    mover: ObjectMover<S>,
    tracker: ScanJobTracker<C>,
    aggregator: FindingsAggregator<C>,
    gate: ApprovalGate<S, N>,
    finalizer: Finalizer<S>,
    config: PipelineConfig,
}

impl<S, C, N> WorkflowEngine<S, C, N>
where
    S: ObjectStore,
    C: ScanService,
    N: ApprovalNotifier,
{
    pub fn new<P: AsRef<Path>>(
        config: PipelineConfig,
        run_root: P,
        objects: Arc<S>,
        scanner: Arc<C>,
        notifier: Arc<N>,
    ) -> Result<Self> {
        let runs = RunStore::new(run_root)?;
        let mover = ObjectMover::new(objects.clone());
        let tracker = ScanJobTracker::new(scanner.clone());
        let aggregator = FindingsAggregator::new(scanner);
        let gate = ApprovalGate::new(
            objects.clone(),
            notifier,
            config.buckets.staging.clone(),
            config.buckets.quarantine.clone(),
            config.approval.allow_endpoint.clone(),
            config.approval.deny_endpoint.clone(),
        );
        let finalizer = Finalizer::new(
            objects,
            config.buckets.staging.clone(),
            config.buckets.quarantine.clone(),
            config.buckets.scanned.clone(),
        );

        Ok(Self {
            runs,
            mover,
            tracker,
            aggregator,
            gate,
            finalizer,
            config,
        })
    }

    /// The persisted run store, for operator tooling and the watch loop
    pub fn runs(&self) -> &RunStore {
        &self.runs
    }

    /// Start or advance a run. Safe to re-invoke with the same run id
    /// while the run is non-terminal: a `Scanning` run gets exactly one
    /// poll, a `Gating` run is left suspended, a `Finalizing*` run retries
    /// its outstanding moves.
    pub async fn tick(&self, run_id: &RunId) -> Result<RunState> {
        let record = match self.runs.get(run_id)? {
            Some(record) => record,
            None => {
                log::info!("Starting run {}", run_id);
                self.runs.create(run_id)?
            }
        };

        match record.state {
            RunState::Staging => self.advance_staging(run_id).await,
            RunState::Scanning => self.advance_scanning(&record).await,
            RunState::Evaluating => self.advance_evaluating(&record).await,
            RunState::Gating => {
                log::info!("Run {} is suspended awaiting an approval decision", run_id);
                Ok(RunState::Gating)
            }
            RunState::FinalizingClean => self.finish_clean(run_id).await,
            RunState::FinalizingAllowed => self.finish_allowed(&record).await,
            RunState::FinalizingDenied => self.finish_denied(&record).await,
            state @ (RunState::Done | RunState::Errored) => {
                log::debug!("Run {} is terminal ({})", run_id, state);
                Ok(state)
            }
        }
    }

    /// Deliver an approval decision. Exactly one resume per token succeeds;
    /// the token is consumed (redacted) before any finalize work starts.
    pub async fn resume(&self, raw_token: &str, decision: Decision) -> Result<DecisionConfirmation> {
        let token = ApprovalToken::parse(raw_token);

        let record = self.runs.find_by_token(&token)?.ok_or_else(|| {
            PipelineError::InvalidToken("Token is unknown or already consumed".to_string())
        })?;

        if record.state != RunState::Gating {
            return Err(PipelineError::WrongState(format!(
                "Run {} is in {}, not gating",
                record.run_id, record.state
            )));
        }

        let run_id = record.run_id.clone();
        let to = match decision {
            Decision::Allow => RunState::FinalizingAllowed,
            Decision::Deny => RunState::FinalizingDenied,
        };

        // The rename inside this transition is the atomic check-and-set:
        // of two concurrent resumes, one claims the run and the other
        // finds it already gone.
        let claimed = self
            .runs
            .transition(&run_id, RunState::Gating, to, |r| r.consume_token(decision))
            .map_err(|e| match e {
                PipelineError::WrongState(_) => {
                    PipelineError::InvalidToken("Token already consumed".to_string())
                }
                other => other,
            })?;

        log::info!("Run {} decision received: {}", run_id, decision);

        match decision {
            Decision::Allow => self.finish_allowed(&claimed).await?,
            Decision::Deny => self.finish_denied(&claimed).await?,
        };

        Ok(DecisionConfirmation {
            action: decision.action_name().to_string(),
            run_id,
        })
    }

    /// Park the run in the absorbing error state. No compensating action
    /// is taken: guessing a disposition for sensitive data is worse than
    /// halting, so recovery is an explicit operator re-trigger.
    async fn park(&self, run_id: &RunId, from: RunState, error: &PipelineError) -> Result<RunState> {
        log::error!("Run {} failed in {}: {}", run_id, from, error);

        match self.runs.transition(run_id, from, RunState::Errored, |r| {
            r.mark_errored(&error.to_string())
        }) {
            Ok(_) => Ok(RunState::Errored),
            // A concurrent invocation moved the run; leave it alone.
            Err(PipelineError::WrongState(_)) => Ok(RunState::Errored),
            Err(e) => Err(e),
        }
    }

    async fn advance_staging(&self, run_id: &RunId) -> Result<RunState> {
        let intake = &self.config.buckets.intake;
        let staging = &self.config.buckets.staging;

        let staged = match retry::with_backoff("stage-intake", || {
            self.mover.stage_intake(intake, staging, run_id)
        })
        .await
        {
            Ok(n) => n,
            Err(e) => return self.park(run_id, RunState::Staging, &e).await,
        };

        if staged == 0 {
            // Nothing arrived this invocation, but a crashed earlier attempt
            // may already have staged the batch - check before declaring
            // the run empty.
            let already_staged = match retry::with_backoff("count-staged", || {
                self.mover.count_tagged(staging, run_id)
            })
            .await
            {
                Ok(n) => n,
                Err(e) => return self.park(run_id, RunState::Staging, &e).await,
            };

            if already_staged == 0 {
                log::info!("Run {} found no intake objects", run_id);
                self.runs
                    .transition(run_id, RunState::Staging, RunState::Done, |r| {
                        r.complete(RunOutcome::NoInput)
                    })?;
                return Ok(RunState::Done);
            }
        }

        let scope = ScanScope {
            account_id: self.config.account_id.clone(),
            bucket: staging.clone(),
            run_id: run_id.clone(),
        };

        let job_id = match retry::with_backoff("submit-scan", || self.tracker.submit(&scope)).await
        {
            Ok(job_id) => job_id,
            Err(e) => return self.park(run_id, RunState::Staging, &e).await,
        };

        self.runs
            .transition(run_id, RunState::Staging, RunState::Scanning, |r| {
                r.record_job(job_id.clone())
            })?;

        Ok(RunState::Scanning)
    }

    async fn advance_scanning(&self, record: &RunRecord) -> Result<RunState> {
        let run_id = &record.run_id;
        let job_id = match &record.job_id {
            Some(job_id) => job_id.clone(),
            None => {
                let e = PipelineError::Workflow("Scanning run has no job id".to_string());
                return self.park(run_id, RunState::Scanning, &e).await;
            }
        };

        let status = match retry::with_backoff("poll-scan", || self.tracker.poll(&job_id)).await {
            Ok(status) => status,
            Err(e) => return self.park(run_id, RunState::Scanning, &e).await,
        };

        match status {
            ScanJobStatus::Submitted | ScanJobStatus::Running => {
                // Self-loop: stay suspended until the next tick
                log::info!("Scan job {} for run {} is {}", job_id, run_id, status);
                Ok(RunState::Scanning)
            }
            ScanJobStatus::Complete => {
                self.runs
                    .transition(run_id, RunState::Scanning, RunState::Evaluating, |_| {})?;
                let record = self.runs.get(run_id)?.ok_or_else(|| {
                    PipelineError::NotFound(format!("Run {} vanished after transition", run_id))
                })?;
                self.advance_evaluating(&record).await
            }
            ScanJobStatus::Failed | ScanJobStatus::Cancelled => {
                // Never treated as "no findings"
                let e = PipelineError::JobFailed {
                    job_id: job_id.to_string(),
                    status: status.to_string(),
                };
                self.park(run_id, RunState::Scanning, &e).await
            }
        }
    }

    async fn advance_evaluating(&self, record: &RunRecord) -> Result<RunState> {
        let run_id = &record.run_id;
        let job_id = match &record.job_id {
            Some(job_id) => job_id.clone(),
            None => {
                let e = PipelineError::Workflow("Evaluating run has no job id".to_string());
                return self.park(run_id, RunState::Evaluating, &e).await;
            }
        };

        let keys: Vec<String> = match retry::with_backoff("drain-findings", || {
            self.aggregator.collect_affected_keys(&job_id)
        })
        .await
        {
            Ok(set) => set.into_iter().collect(),
            Err(e) => return self.park(run_id, RunState::Evaluating, &e).await,
        };

        if keys.is_empty() {
            self.runs.transition(
                run_id,
                RunState::Evaluating,
                RunState::FinalizingClean,
                |r| r.record_affected_keys(Vec::new()),
            )?;
            return self.finish_clean(run_id).await;
        }

        if let Err(e) =
            retry::with_backoff("quarantine", || self.gate.quarantine(run_id, &keys)).await
        {
            return self.park(run_id, RunState::Evaluating, &e).await;
        }

        let token = ApprovalToken::mint();
        self.runs
            .transition(run_id, RunState::Evaluating, RunState::Gating, |r| {
                r.record_affected_keys(keys.clone());
                r.suspend_at_gate(token.clone());
            })?;

        if let Err(e) =
            retry::with_backoff("publish-approval", || self.gate.publish(run_id, &token, &keys))
                .await
        {
            return self.park(run_id, RunState::Gating, &e).await;
        }

        log::info!(
            "Run {} gated: {} object(s) quarantined, approval requested",
            run_id,
            keys.len()
        );
        Ok(RunState::Gating)
    }

    async fn finish_clean(&self, run_id: &RunId) -> Result<RunState> {
        if let Err(e) =
            retry::with_backoff("finalize-clean", || self.finalizer.finalize_clean(run_id)).await
        {
            return self.park(run_id, RunState::FinalizingClean, &e).await;
        }

        self.runs
            .transition(run_id, RunState::FinalizingClean, RunState::Done, |r| {
                r.complete(RunOutcome::Clean)
            })?;

        log::info!("Run {} complete: no sensitive data found", run_id);
        Ok(RunState::Done)
    }

    async fn finish_allowed(&self, record: &RunRecord) -> Result<RunState> {
        let run_id = &record.run_id;
        let keys = match &record.affected_keys {
            Some(keys) => keys.clone(),
            None => {
                let e = PipelineError::Workflow("Allowed run has no affected-key set".to_string());
                return self.park(run_id, RunState::FinalizingAllowed, &e).await;
            }
        };

        if let Err(e) = retry::with_backoff("finalize-allowed", || {
            self.finalizer.finalize_allowed(run_id, &keys)
        })
        .await
        {
            return self.park(run_id, RunState::FinalizingAllowed, &e).await;
        }

        self.runs
            .transition(run_id, RunState::FinalizingAllowed, RunState::Done, |r| {
                r.complete(RunOutcome::Allowed)
            })?;

        log::info!("Run {} complete: release approved", run_id);
        Ok(RunState::Done)
    }

    async fn finish_denied(&self, record: &RunRecord) -> Result<RunState> {
        let run_id = &record.run_id;
        let keys = match &record.affected_keys {
            Some(keys) => keys.clone(),
            None => {
                let e = PipelineError::Workflow("Denied run has no affected-key set".to_string());
                return self.park(run_id, RunState::FinalizingDenied, &e).await;
            }
        };

        if let Err(e) = retry::with_backoff("finalize-denied", || {
            self.finalizer.finalize_denied(run_id, &keys)
        })
        .await
        {
            return self.park(run_id, RunState::FinalizingDenied, &e).await;
        }

        self.runs
            .transition(run_id, RunState::FinalizingDenied, RunState::Done, |r| {
                r.complete(RunOutcome::Denied)
            })?;

        log::info!("Run {} complete: release denied, payloads disposed", run_id);
        Ok(RunState::Done)
    }
}
