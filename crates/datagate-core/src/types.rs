//! Strongly typed pipeline identifiers and wire types
//! No string-based state management - everything is strongly typed

use crate::constants::WORKFLOW_ID_TAG;
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Strongly typed workflow-run identifier.
///
/// The string form doubles as the correlation-tag value stamped on every
/// object the run touches.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RunId(String);

impl RunId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn from_string(s: &str) -> Result<Self, String> {
        // Validate UUID format
        uuid::Uuid::parse_str(s)
            .map(|_| Self(s.to_string()))
            .map_err(|e| format!("Invalid RunId format: {}", e))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Strongly typed scan job identifier, assigned by the scan service
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobId(String);

impl JobId {
    pub fn new(id: String) -> Self {
        Self(id)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Status of a submitted scan job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ScanJobStatus {
    Submitted,
    Running,
    Complete,
    Failed,
    Cancelled,
}

impl ScanJobStatus {
    /// Terminal statuses never change on further polls
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete | Self::Failed | Self::Cancelled)
    }

    /// Parse the service's wire representation
    pub fn from_wire(s: &str) -> Result<Self, String> {
        match s {
            "SUBMITTED" => Ok(Self::Submitted),
            "RUNNING" => Ok(Self::Running),
            "COMPLETE" => Ok(Self::Complete),
            "FAILED" => Ok(Self::Failed),
            "CANCELLED" => Ok(Self::Cancelled),
            other => Err(format!("Unknown scan job status: {}", other)),
        }
    }

    pub fn as_wire(&self) -> &'static str {
        match self {
            Self::Submitted => "SUBMITTED",
            Self::Running => "RUNNING",
            Self::Complete => "COMPLETE",
            Self::Failed => "FAILED",
            Self::Cancelled => "CANCELLED",
        }
    }
}

impl fmt::Display for ScanJobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_wire())
    }
}

/// Scope of a scan job submission: objects in `bucket` carrying the run's
/// correlation tag, within the given account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanScope {
    pub account_id: String,
    pub bucket: String,
    pub run_id: RunId,
}

/// One classification result from the scan service. A finding references at
/// most one affected object key; findings without a key are discarded during
/// aggregation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Finding {
    pub finding_id: String,
    pub job_id: JobId,
    #[serde(default)]
    pub object_key: Option<String>,
}

/// One page of the findings feed
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FindingsPage {
    pub findings: Vec<Finding>,
    #[serde(default)]
    pub next_token: Option<String>,
}

/// Object tags as a name/value set
pub type TagSet = BTreeMap<String, String>;

/// Build a single-entry tag set carrying the run's correlation tag
pub fn correlation_tags(run_id: &RunId) -> TagSet {
    let mut tags = TagSet::new();
    tags.insert(WORKFLOW_ID_TAG.to_string(), run_id.as_str().to_string());
    tags
}

/// One listed object: its key plus the tags attached to it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObjectEntry {
    pub key: String,
    #[serde(default)]
    pub tags: TagSet,
}

impl ObjectEntry {
    /// Whether this object carries the run's correlation tag
    pub fn belongs_to(&self, run_id: &RunId) -> bool {
        self.tags
            .get(WORKFLOW_ID_TAG)
            .map(|v| v == run_id.as_str())
            .unwrap_or(false)
    }
}

/// One page of a bucket listing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObjectPage {
    pub objects: Vec<ObjectEntry>,
    #[serde(default)]
    pub next_token: Option<String>,
}

/// Opaque single-use resumption handle minted when a run suspends at the
/// approval gate.
///
/// The token travels inside callback URLs; query-string transport mangles
/// `+` into a space, so `parse` normalizes before comparison.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalToken(String);

impl ApprovalToken {
    /// Mint a fresh token. 32 bytes of entropy, standard base64.
    pub fn mint() -> Self {
        let mut raw = Vec::with_capacity(32);
        raw.extend_from_slice(uuid::Uuid::new_v4().as_bytes());
        raw.extend_from_slice(uuid::Uuid::new_v4().as_bytes());
        Self(base64::engine::general_purpose::STANDARD.encode(raw))
    }

    /// Reconstruct a token from its callback-delivered form
    pub fn parse(s: &str) -> Self {
        Self(s.replace(' ', "+"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ApprovalToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Human decision delivered through the approval callbacks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Decision {
    Allow,
    Deny,
}

impl Decision {
    /// Action name echoed back in the callback confirmation payload
    pub fn action_name(&self) -> &'static str {
        match self {
            Self::Allow => "allow",
            Self::Deny => "deny",
        }
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.action_name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::SENSITIVE_DATA_TAG;

    #[test]
    fn test_run_id_roundtrip() {
        let id = RunId::new();
        let parsed = RunId::from_string(id.as_str()).unwrap();
        assert_eq!(id, parsed);
        assert!(RunId::from_string("not-a-uuid").is_err());
    }

    #[test]
    fn test_status_wire_mapping() {
        for wire in ["SUBMITTED", "RUNNING", "COMPLETE", "FAILED", "CANCELLED"] {
            let status = ScanJobStatus::from_wire(wire).unwrap();
            assert_eq!(status.as_wire(), wire);
        }
        assert!(ScanJobStatus::from_wire("PAUSED").is_err());
        assert!(ScanJobStatus::Complete.is_terminal());
        assert!(ScanJobStatus::Cancelled.is_terminal());
        assert!(!ScanJobStatus::Running.is_terminal());
    }

    #[test]
    fn test_entry_tag_matching() {
        let run_a = RunId::new();
        let run_b = RunId::new();

        let mut tags = correlation_tags(&run_a);
        tags.insert(SENSITIVE_DATA_TAG.to_string(), "true".to_string());
        let entry = ObjectEntry {
            key: "reports/q3.csv".to_string(),
            tags,
        };

        assert!(entry.belongs_to(&run_a));
        assert!(!entry.belongs_to(&run_b));

        let untagged = ObjectEntry {
            key: "loose.bin".to_string(),
            tags: TagSet::new(),
        };
        assert!(!untagged.belongs_to(&run_a));
    }

    #[test]
    fn test_token_mint_is_unique() {
        let a = ApprovalToken::mint();
        let b = ApprovalToken::mint();
        assert_ne!(a, b);
    }

    #[test]
    fn test_token_parse_normalizes_url_mangling() {
        // '+' in a query string arrives as a space
        let token = ApprovalToken::parse("abc 123 xyz=");
        assert_eq!(token.as_str(), "abc+123+xyz=");

        let minted = ApprovalToken::mint();
        let mangled = minted.as_str().replace('+', " ");
        assert_eq!(ApprovalToken::parse(&mangled), minted);
    }
}
