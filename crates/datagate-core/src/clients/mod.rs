//! Collaborator interfaces and client implementations

pub mod notifier;
pub mod object_store;
pub mod scan_service;

// Re-export all client types
pub use notifier::{ApprovalNotifier, WebhookNotifier};
pub use object_store::{FsObjectStore, ObjectStore};
pub use scan_service::{HttpScanClient, ScanService};
