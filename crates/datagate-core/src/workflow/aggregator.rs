//! Findings feed aggregation
//!
//! Drains a completed job's paginated findings feed into a deduplicated
//! set of affected object keys. The feed is immutable once the job is
//! terminal, so re-draining yields the same set. A failure mid-drain
//! aborts the whole aggregation - a partial set is never handed to the
//! branching logic, and the engine retries the full drain rather than
//! resuming from a partial cursor.

use crate::clients::ScanService;
use crate::error::{PipelineError, Result};
use crate::types::JobId;
use std::collections::BTreeSet;
use std::sync::Arc;

pub struct FindingsAggregator<C: ScanService> {
    scanner: Arc<C>,
}

impl<C: ScanService> FindingsAggregator<C> {
    pub fn new(scanner: Arc<C>) -> Self {
        Self { scanner }
    }

    /// Fold the job's findings into the set of affected object keys.
    /// Findings without an associated object key are discarded.
    pub async fn collect_affected_keys(&self, job_id: &JobId) -> Result<BTreeSet<String>> {
        let mut keys = BTreeSet::new();
        let mut token: Option<String> = None;

        loop {
            let page = self
                .scanner
                .findings_page(job_id, token.as_deref())
                .await
                .map_err(|e| {
                    PipelineError::Aggregation(format!(
                        "Findings drain for job {} failed: {}",
                        job_id, e
                    ))
                })?;

            for finding in &page.findings {
                if let Some(key) = &finding.object_key {
                    log::debug!("Finding {} affects object {}", finding.finding_id, key);
                    keys.insert(key.clone());
                }
            }

            match page.next_token {
                Some(t) => token = Some(t),
                None => break,
            }
        }

        log::info!(
            "Scan job {} affects {} unique object(s)",
            job_id,
            keys.len()
        );
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Finding, FindingsPage, ScanJobStatus, ScanScope};
    use async_trait::async_trait;

    /// Feed stub returning scripted pages, optionally failing partway
    struct ScriptedFeed {
        pages: Vec<FindingsPage>,
        fail_on_page: Option<usize>,
    }

    #[async_trait]
    impl ScanService for ScriptedFeed {
        async fn submit(&self, _scope: &ScanScope) -> Result<JobId> {
            unimplemented!("feed stub")
        }

        async fn job_status(&self, _job_id: &JobId) -> Result<ScanJobStatus> {
            Ok(ScanJobStatus::Complete)
        }

        async fn findings_page(
            &self,
            _job_id: &JobId,
            page_token: Option<&str>,
        ) -> Result<FindingsPage> {
            let index = match page_token {
                None => 0,
                Some(t) => t.parse::<usize>().unwrap(),
            };

            if self.fail_on_page == Some(index) {
                return Err(PipelineError::Transient("feed read failed".to_string()));
            }

            Ok(self.pages[index].clone())
        }
    }

    fn finding(id: &str, key: Option<&str>) -> Finding {
        Finding {
            finding_id: id.to_string(),
            job_id: JobId::new("job-1".to_string()),
            object_key: key.map(str::to_string),
        }
    }

    #[tokio::test]
    async fn test_drain_deduplicates_and_drops_keyless() {
        let feed = ScriptedFeed {
            pages: vec![
                FindingsPage {
                    findings: vec![
                        finding("f-1", Some("a.csv")),
                        finding("f-2", Some("b.csv")),
                        finding("f-3", None),
                    ],
                    next_token: Some("1".to_string()),
                },
                FindingsPage {
                    // Same key flagged by a second finding
                    findings: vec![finding("f-4", Some("a.csv"))],
                    next_token: None,
                },
            ],
            fail_on_page: None,
        };

        let aggregator = FindingsAggregator::new(Arc::new(feed));
        let keys = aggregator
            .collect_affected_keys(&JobId::new("job-1".to_string()))
            .await
            .unwrap();

        assert_eq!(
            keys.into_iter().collect::<Vec<_>>(),
            vec!["a.csv".to_string(), "b.csv".to_string()]
        );
    }

    #[tokio::test]
    async fn test_mid_drain_failure_aborts_whole_aggregation() {
        let feed = ScriptedFeed {
            pages: vec![
                FindingsPage {
                    findings: vec![finding("f-1", Some("a.csv"))],
                    next_token: Some("1".to_string()),
                },
                FindingsPage {
                    findings: vec![finding("f-2", Some("b.csv"))],
                    next_token: None,
                },
            ],
            fail_on_page: Some(1),
        };

        let aggregator = FindingsAggregator::new(Arc::new(feed));
        let result = aggregator
            .collect_affected_keys(&JobId::new("job-1".to_string()))
            .await;

        // No partial set escapes; the error is retryable
        match result {
            Err(e @ PipelineError::Aggregation(_)) => assert!(e.is_transient()),
            other => panic!("expected aggregation error, got {:?}", other.map(|_| ())),
        }
    }

    #[tokio::test]
    async fn test_empty_feed_yields_empty_set() {
        let feed = ScriptedFeed {
            pages: vec![FindingsPage {
                findings: vec![],
                next_token: None,
            }],
            fail_on_page: None,
        };

        let aggregator = FindingsAggregator::new(Arc::new(feed));
        let keys = aggregator
            .collect_affected_keys(&JobId::new("job-2".to_string()))
            .await
            .unwrap();

        assert!(keys.is_empty());
    }
}
