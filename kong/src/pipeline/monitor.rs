use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::context::Context;
use crate::jobs::QueueName;
use crate::queues::FailedJob;
use crate::JobError;

/// Failed jobs drained per pass
pub const MONITOR_BATCH: usize = 500;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FailedJobSummary {
    pub queue: QueueName,
    pub job_name: String,
    pub count: usize,
    pub summary: String,
}

/// Turns a group of failures sharing a queue and job name into prose
#[async_trait::async_trait]
pub trait Summarizer: Send + Sync {
    async fn summarize(&self, failures: &[FailedJob]) -> Result<String, JobError>;
}

/// Distinct reasons with their counts, most frequent first
pub fn digest(failures: &[FailedJob]) -> String {
    let mut reasons: BTreeMap<&str, usize> = BTreeMap::new();
    for failure in failures {
        *reasons.entry(failure.reason.as_str()).or_default() += 1;
    }

    let mut reasons: Vec<_> = reasons.into_iter().collect();
    reasons.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(b.0)));

    reasons
        .iter()
        .map(|(reason, count)| format!("{count}x {reason}"))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Drains failed jobs, stores one summary per `(queue, job name)` and
/// removes what was summarized
pub async fn monitor(ctx: &Context) -> Result<(), JobError> {
    let failed = ctx.queue.failed(MONITOR_BATCH).await?;
    if failed.is_empty() {
        return Ok(());
    }

    let mut groups: BTreeMap<(QueueName, String), Vec<FailedJob>> = BTreeMap::new();
    for failure in failed {
        groups
            .entry((failure.queue, failure.name.clone()))
            .or_default()
            .push(failure);
    }

    for ((queue, job_name), failures) in groups {
        let summary = match &ctx.summarizer {
            Some(summarizer) => match summarizer.summarize(&failures).await {
                Ok(summary) => summary,
                Err(error) => {
                    warn!(%queue, job_name = %job_name, %error, "Summarizer failed, storing digest");
                    digest(&failures)
                }
            },
            None => digest(&failures),
        };

        ctx.repo
            .insert_failed_summary(&FailedJobSummary {
                queue,
                job_name: job_name.clone(),
                count: failures.len(),
                summary,
            })
            .await?;

        let ids: Vec<_> = failures.iter().map(|failure| failure.id).collect();
        ctx.queue.remove_failed(&ids).await?;

        info!(%queue, job_name = %job_name, count = failures.len(), "Summarized failed jobs");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use uuid::Uuid;

    fn failure(reason: &str) -> FailedJob {
        FailedJob {
            id: Uuid::new_v4(),
            queue: QueueName::Extract,
            name: "extract.evmlogs".to_string(),
            payload: json!({}),
            attempts: 3,
            reason: reason.to_string(),
        }
    }

    #[test]
    fn digests_reasons_by_frequency() {
        let failures = vec![
            failure("transport failure: timeout"),
            failure("schema violation: no decoder"),
            failure("transport failure: timeout"),
        ];

        assert_eq!(
            digest(&failures),
            "2x transport failure: timeout\n1x schema violation: no decoder"
        );
        assert_eq!(digest(&[]), "");
    }
}
