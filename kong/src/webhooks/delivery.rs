use reqwest::StatusCode;
use tracing::{info, warn};

use super::signature::constant_time_eq;
use crate::jobs::WebhookTarget;
use crate::outputs::Output;
use crate::JobError;

/// Response header a subscriber answers with
pub const API_KEY_HEADER: &str = "Kong-Api-Key";

/// POSTs `target` to its subscription and returns the outputs the
/// subscriber answered with.
///
/// Nothing is returned unless the response carries the subscription's key
/// and every output is labelled with the subscription's label.
pub async fn deliver(
    http: &reqwest::Client,
    target: &WebhookTarget,
    expected_key: Option<&str>,
) -> Result<Vec<Output>, JobError> {
    let subscription = &target.subscription;
    let expected_key = expected_key.ok_or_else(|| {
        JobError::AuthenticationFailure(format!("no key for subscription {}", subscription.id))
    })?;

    let response = http
        .post(subscription.url.clone())
        .json(target)
        .send()
        .await?;

    let status = response.status();
    if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
        return Err(JobError::TransportFailure(format!(
            "{} answered {status}",
            subscription.url
        )));
    }
    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        return Err(JobError::AuthenticationFailure(format!(
            "{} answered {status}",
            subscription.url
        )));
    }
    if !status.is_success() {
        return Err(JobError::SchemaViolation(format!(
            "{} answered {status}",
            subscription.url
        )));
    }

    let key_matches = response
        .headers()
        .get(API_KEY_HEADER)
        .is_some_and(|key| constant_time_eq(key.as_bytes(), expected_key.as_bytes()));
    if !key_matches {
        warn!(subscription = %subscription.id, "Webhook response failed authentication");
        return Err(JobError::AuthenticationFailure(format!(
            "missing or wrong {API_KEY_HEADER} from subscription {}",
            subscription.id
        )));
    }

    let body = response.bytes().await?;
    let mut outputs: Vec<Output> = serde_json::from_slice(&body).map_err(|error| {
        JobError::SchemaViolation(format!("subscription {}: {error}", subscription.id))
    })?;

    if let Some(output) = outputs.iter().find(|output| output.label != subscription.label) {
        return Err(JobError::SchemaViolation(format!(
            "subscription {} answered label {} instead of {}",
            subscription.id, output.label, subscription.label
        )));
    }

    for output in outputs.iter_mut() {
        if output.series_time == 0 {
            output.series_time = output.block_time;
        }
    }

    info!(
        subscription = %subscription.id,
        chain_id = target.chain_id,
        outputs = outputs.len(),
        "Webhook delivered"
    );

    Ok(outputs)
}
