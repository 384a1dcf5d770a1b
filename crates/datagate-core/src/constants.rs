/// Pipeline configuration constants

/// Object tag carrying the workflow-run identifier. The tag value equals the
/// run id and is the only mechanism partitioning shared buckets between
/// concurrently executing runs.
pub const WORKFLOW_ID_TAG: &str = "WorkflowId";

/// Object tag marking a key that appeared in a scan finding.
pub const SENSITIVE_DATA_TAG: &str = "SensitiveDataFound";

/// Value written for `SENSITIVE_DATA_TAG`.
pub const SENSITIVE_DATA_TAG_VALUE: &str = "true";

/// Maximum attempts for a retryable store or service operation
pub const MAX_OPERATION_ATTEMPTS: u32 = 4;

/// Initial backoff delay between retry attempts (milliseconds)
pub const RETRY_INITIAL_DELAY_MS: u64 = 250;

/// Backoff multiplier applied after each failed attempt
pub const RETRY_BACKOFF_MULTIPLIER: u64 = 2;
