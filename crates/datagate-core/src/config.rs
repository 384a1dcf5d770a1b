//! Configuration management for the datagate system

use crate::error::{PipelineError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Account owning the buckets handed to the scan service
    pub account_id: String,

    pub buckets: BucketConfig,
    pub scan_service: ScanServiceConfig,
    pub approval: ApprovalConfig,
}

/// The four storage areas shared by all runs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BucketConfig {
    /// Where newly arrived objects land
    #[serde(alias = "raw")]
    pub intake: String,

    /// Where objects wait while a scan job runs
    #[serde(alias = "scan_stage")]
    pub staging: String,

    /// Where flagged objects wait for a human decision
    #[serde(alias = "manual_review")]
    pub quarantine: String,

    /// Where cleared objects end up
    #[serde(alias = "scanned_data")]
    pub scanned: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanServiceConfig {
    #[serde(alias = "url")]
    pub base_url: String,

    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovalConfig {
    /// Notification sink receiving the approval-required message
    pub webhook_url: String,

    /// Callback endpoint an approver hits to allow the run
    #[serde(alias = "api_allow_endpoint")]
    pub allow_endpoint: String,

    /// Callback endpoint an approver hits to deny the run
    #[serde(alias = "api_deny_endpoint")]
    pub deny_endpoint: String,

    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_request_timeout_secs() -> u64 {
    30
}

impl PipelineConfig {
    /// Load configuration from a JSON file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| PipelineError::Config(format!("Failed to read config file: {}", e)))?;

        Self::from_json_str(&content)
    }

    /// Load configuration from a JSON string
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: PipelineConfig = serde_json::from_str(json)
            .map_err(|e| PipelineError::Config(format!("Failed to parse config: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.account_id.is_empty() {
            return Err(PipelineError::Config("Account id is required".to_string()));
        }

        let buckets = [
            &self.buckets.intake,
            &self.buckets.staging,
            &self.buckets.quarantine,
            &self.buckets.scanned,
        ];
        if buckets.iter().any(|b| b.is_empty()) {
            return Err(PipelineError::Config(
                "All four bucket names are required".to_string(),
            ));
        }
        // Tag-based partitioning assumes distinct areas; a shared name would
        // let a bulk move consume its own destination.
        for (i, a) in buckets.iter().enumerate() {
            for b in buckets.iter().skip(i + 1) {
                if a == b {
                    return Err(PipelineError::Config(format!(
                        "Bucket name {} is used for more than one area",
                        a
                    )));
                }
            }
        }

        if self.scan_service.base_url.is_empty() {
            return Err(PipelineError::Config(
                "Scan service base URL is required".to_string(),
            ));
        }

        if self.approval.webhook_url.is_empty()
            || self.approval.allow_endpoint.is_empty()
            || self.approval.deny_endpoint.is_empty()
        {
            return Err(PipelineError::Config(
                "Approval webhook and allow/deny endpoints are required".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_json() -> String {
        r#"{
            "account_id": "123456789012",
            "buckets": {
                "intake": "dg-intake",
                "staging": "dg-staging",
                "quarantine": "dg-quarantine",
                "scanned": "dg-scanned"
            },
            "scan_service": { "base_url": "http://localhost:9200" },
            "approval": {
                "webhook_url": "http://localhost:9300/notify",
                "allow_endpoint": "https://gate.example.com/allow",
                "deny_endpoint": "https://gate.example.com/deny"
            }
        }"#
        .to_string()
    }

    #[test]
    fn test_config_parses_with_defaults() {
        let config = PipelineConfig::from_json_str(&sample_json()).unwrap();
        assert_eq!(config.buckets.staging, "dg-staging");
        assert_eq!(config.scan_service.request_timeout_secs, 30);
        assert_eq!(config.approval.request_timeout_secs, 30);
    }

    #[test]
    fn test_config_accepts_legacy_bucket_aliases() {
        let json = sample_json()
            .replace("\"intake\"", "\"raw\"")
            .replace("\"quarantine\"", "\"manual_review\"");
        let config = PipelineConfig::from_json_str(&json).unwrap();
        assert_eq!(config.buckets.intake, "dg-intake");
        assert_eq!(config.buckets.quarantine, "dg-quarantine");
    }

    #[test]
    fn test_config_rejects_duplicate_buckets() {
        let json = sample_json().replace("dg-scanned", "dg-staging");
        assert!(PipelineConfig::from_json_str(&json).is_err());
    }

    #[test]
    fn test_config_rejects_missing_endpoint() {
        let json = sample_json().replace("https://gate.example.com/deny", "");
        assert!(PipelineConfig::from_json_str(&json).is_err());
    }
}
