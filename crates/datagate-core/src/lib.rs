//! Datagate Core Library
//!
//! Orchestration core for the sensitive-data scanning pipeline: files land
//! in an intake area, are classified by an asynchronous scan job, and are
//! routed to scanned-data, quarantine or disposal based on findings and a
//! human approval decision.

pub mod clients;
pub mod config;
pub mod constants;
pub mod error;
pub mod retry;
pub mod types;
pub mod workflow;

// Re-export main types for easy access
pub use config::PipelineConfig;
pub use error::{PipelineError, Result};

// Re-export all client types
pub use clients::{
    ApprovalNotifier,
    FsObjectStore,
    HttpScanClient,
    ObjectStore,
    ScanService,
    WebhookNotifier,
};

// Re-export workflow types
pub use workflow::{
    DecisionConfirmation,
    FindingsAggregator,
    MoveOutcome,
    ObjectMover,
    RunOutcome,
    RunRecord,
    RunState,
    RunStore,
    ScanJobTracker,
    WorkflowEngine,
};

pub use types::{
    ApprovalToken,
    Decision,
    Finding,
    FindingsPage,
    JobId,
    ObjectEntry,
    ObjectPage,
    RunId,
    ScanJobStatus,
    ScanScope,
    TagSet,
};
