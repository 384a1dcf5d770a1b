//! Classification engine interface and HTTP client
//!
//! The scan service accepts a job over a tag-scoped object set, exposes a
//! polling status endpoint and a paginated findings feed. Submission is the
//! only mutating call; status and findings reads are side-effect-free.

use crate::config::ScanServiceConfig;
use crate::error::{PipelineError, Result};
use crate::types::{FindingsPage, JobId, ScanJobStatus, ScanScope};
use async_trait::async_trait;
use reqwest::Client as HttpClient;
use serde::{Deserialize, Serialize};

/// Asynchronous sensitive-data classification service
#[async_trait]
pub trait ScanService: Send + Sync {
    /// Submit a scan job over the scoped object set, returning its id
    async fn submit(&self, scope: &ScanScope) -> Result<JobId>;

    /// Poll a job's status. Idempotent; terminal statuses never change.
    async fn job_status(&self, job_id: &JobId) -> Result<ScanJobStatus>;

    /// Read one page of the findings feed for a job
    async fn findings_page(
        &self,
        job_id: &JobId,
        page_token: Option<&str>,
    ) -> Result<FindingsPage>;
}

#[derive(Debug, Serialize)]
struct SubmitJobRequest<'a> {
    name: String,
    description: &'a str,
    job_type: &'a str,
    account_id: &'a str,
    bucket: &'a str,
    tag_key: &'a str,
    tag_value: &'a str,
}

#[derive(Debug, Deserialize)]
struct SubmitJobResponse {
    job_id: String,
}

#[derive(Debug, Deserialize)]
struct JobStatusResponse {
    job_status: String,
}

pub struct HttpScanClient {
    config: ScanServiceConfig,
    http_client: HttpClient,
}

impl HttpScanClient {
    pub fn new(config: ScanServiceConfig) -> Self {
        let http_client = HttpClient::builder()
            .timeout(std::time::Duration::from_secs(config.request_timeout_secs))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            config,
            http_client,
        }
    }
}

#[async_trait]
impl ScanService for HttpScanClient {
    async fn submit(&self, scope: &ScanScope) -> Result<JobId> {
        let url = format!("{}/jobs", self.config.base_url);

        let request = SubmitJobRequest {
            name: format!(
                "PipelineScan-{}",
                chrono::Utc::now().format("%Y-%m-%d-%H%M%S")
            ),
            description: "File upload scan",
            job_type: "ONE_TIME",
            account_id: &scope.account_id,
            bucket: &scope.bucket,
            tag_key: crate::constants::WORKFLOW_ID_TAG,
            tag_value: scope.run_id.as_str(),
        };

        let response = self
            .http_client
            .post(&url)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            // The service rejecting the scope is final; anything else may
            // be retried by the caller.
            if status.is_client_error() {
                return Err(PipelineError::Submission(format!(
                    "Scan service rejected job: {} - {}",
                    status, error_text
                )));
            }
            return Err(PipelineError::Transient(format!(
                "Scan service returned {} - {}",
                status, error_text
            )));
        }

        let body: SubmitJobResponse = response.json().await?;
        log::info!(
            "Submitted scan job {} for run {}",
            body.job_id,
            scope.run_id
        );

        Ok(JobId::new(body.job_id))
    }

    async fn job_status(&self, job_id: &JobId) -> Result<ScanJobStatus> {
        let url = format!("{}/jobs/{}", self.config.base_url, job_id);

        let response = self.http_client.get(&url).send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(PipelineError::Transient(format!(
                "Scan service returned {} for job {} - {}",
                status, job_id, error_text
            )));
        }

        let body: JobStatusResponse = response.json().await?;
        ScanJobStatus::from_wire(&body.job_status).map_err(PipelineError::Deserialization)
    }

    async fn findings_page(
        &self,
        job_id: &JobId,
        page_token: Option<&str>,
    ) -> Result<FindingsPage> {
        let url = format!("{}/jobs/{}/findings", self.config.base_url, job_id);

        let mut request = self.http_client.get(&url);
        if let Some(token) = page_token {
            request = request.query(&[("page_token", token)]);
        }

        let response = request.send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(PipelineError::Transient(format!(
                "Findings feed returned {} for job {} - {}",
                status, job_id, error_text
            )));
        }

        Ok(response.json().await?)
    }
}
