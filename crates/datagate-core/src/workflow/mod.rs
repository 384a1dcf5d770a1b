//! Workflow management module

pub mod aggregator;
pub mod engine;
pub mod finalizer;
pub mod gate;
pub mod mover;
pub mod run_store;
pub mod run_types;
pub mod tracker;

pub use aggregator::FindingsAggregator;
pub use engine::{DecisionConfirmation, WorkflowEngine};
pub use finalizer::Finalizer;
pub use gate::ApprovalGate;
pub use mover::{MoveOutcome, ObjectMover};
pub use run_store::RunStore;
pub use run_types::{RunOutcome, RunRecord, RunState};
pub use tracker::ScanJobTracker;
