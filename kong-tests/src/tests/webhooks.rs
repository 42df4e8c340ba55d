#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::body::Bytes;
    use axum::http::{HeaderMap, StatusCode};
    use axum::response::IntoResponse;
    use axum::routing::post;
    use axum::{Json, Router};
    use chrono::Utc;
    use kong::jobs::{Job, WebhookTarget};
    use kong::pipeline;
    use kong::sources::AbiConfig;
    use kong::webhooks::{self, Subscription, API_KEY_HEADER, SIGNATURE_HEADER};
    use kong::{Chain, Config, JobError, Queue, QueueName, Repo};
    use serde_json::{json, Value};
    use tokio::net::TcpListener;
    use url::Url;

    use crate::factory::{
        mainnet_block_time, test_config, vault_address, MockConnector, MockProvider, TestKit,
        MAINNET,
    };

    const HEAD: u64 = 19_900_000;
    const ABI_PATH: &str = "yearn/3/vault";
    const LABEL: &str = "apy-bwd-delta-pps";
    const KEY: &str = "kong-test-key";

    async fn serve(router: Router) -> Url {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap();

        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });

        Url::parse(&format!("http://{address}/webhook")).unwrap()
    }

    fn outputs(target: &WebhookTarget, label: &str) -> Value {
        let outputs: Vec<Value> = target
            .targets
            .iter()
            .map(|address| {
                json!({
                    "chainId": target.chain_id,
                    "address": address,
                    "label": label,
                    "component": "net",
                    "value": 0.042,
                    "blockNumber": target.block_number,
                    "blockTime": target.block_time,
                })
            })
            .collect();

        json!(outputs)
    }

    async fn authentic(Json(target): Json<WebhookTarget>) -> impl IntoResponse {
        ([(API_KEY_HEADER, KEY)], Json(outputs(&target, LABEL)))
    }

    async fn anonymous(Json(target): Json<WebhookTarget>) -> impl IntoResponse {
        Json(outputs(&target, LABEL))
    }

    async fn impostor(Json(target): Json<WebhookTarget>) -> impl IntoResponse {
        ([(API_KEY_HEADER, "not-the-key")], Json(outputs(&target, LABEL)))
    }

    async fn mislabelled(Json(target): Json<WebhookTarget>) -> impl IntoResponse {
        ([(API_KEY_HEADER, KEY)], Json(outputs(&target, "tvl")))
    }

    async fn overloaded() -> impl IntoResponse {
        StatusCode::SERVICE_UNAVAILABLE
    }

    async fn forbidden() -> impl IntoResponse {
        StatusCode::FORBIDDEN
    }

    async fn moved() -> impl IntoResponse {
        StatusCode::NOT_FOUND
    }

    fn subscription(url: Url) -> Subscription {
        Subscription::new("sub-1", url, ABI_PATH, "timeseries", LABEL)
    }

    fn config(url: &Url) -> Config {
        test_config()
            .add_abi(AbiConfig::new(ABI_PATH).add_source(MAINNET, vault_address(), 0))
            .add_webhook(subscription(url.clone()))
            .with_webhook_key("sub-1", KEY)
    }

    fn target(url: Url) -> WebhookTarget {
        WebhookTarget {
            abi_path: ABI_PATH.to_string(),
            chain_id: MAINNET,
            block_number: HEAD,
            block_time: mainnet_block_time(HEAD),
            subscription: subscription(url),
            targets: vec![vault_address()],
        }
    }

    async fn kit(config: Config) -> TestKit {
        let provider = Arc::new(MockProvider::new(HEAD));

        TestKit::new(config, MockConnector::new().with(MAINNET, provider)).await
    }

    #[tokio::test]
    pub async fn loads_authenticated_outputs() {
        let url = serve(Router::new().route("/webhook", post(authentic))).await;
        let kit = kit(config(&url)).await;

        pipeline::process(&kit.ctx, Job::ExtractWebhook(target(url))).await.unwrap();
        assert_eq!(kit.queue.waiting_named("load.output").await.len(), 1);

        kit.drain_queue(QueueName::Load).await;

        let outputs = kit
            .repo
            .load_outputs(MAINNET, vault_address(), LABEL)
            .await
            .unwrap();
        assert_eq!(outputs.len(), 1);
        assert_eq!(outputs[0].component.as_deref(), Some("net"));
        assert_eq!(outputs[0].series_time, mainnet_block_time(HEAD));
    }

    #[tokio::test]
    pub async fn fails_responses_without_the_api_key() {
        let url = serve(Router::new().route("/webhook", post(anonymous))).await;
        let kit = kit(config(&url)).await;

        let error = pipeline::process(&kit.ctx, Job::ExtractWebhook(target(url.clone())))
            .await
            .unwrap_err();
        assert!(matches!(error, JobError::AuthenticationFailure(_)));
        assert!(!error.is_retryable());

        kit.ctx.enqueue(Job::ExtractWebhook(target(url))).await.unwrap();
        kit.drain().await;

        let failed = kit.queue.failed(10).await.unwrap();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].attempts, 1);
        assert!(failed[0].reason.contains(API_KEY_HEADER));
        assert!(kit.repo.outputs().await.is_empty());
    }

    #[tokio::test]
    pub async fn fails_responses_with_the_wrong_api_key() {
        let url = serve(Router::new().route("/webhook", post(impostor))).await;
        let kit = kit(config(&url)).await;

        let error = pipeline::process(&kit.ctx, Job::ExtractWebhook(target(url)))
            .await
            .unwrap_err();

        assert!(matches!(error, JobError::AuthenticationFailure(_)));
        assert!(kit.queue.waiting_named("load.output").await.is_empty());
    }

    #[tokio::test]
    pub async fn refuses_subscriptions_without_a_key() {
        let url = serve(Router::new().route("/webhook", post(authentic))).await;
        let config = test_config()
            .add_abi(AbiConfig::new(ABI_PATH).add_source(MAINNET, vault_address(), 0))
            .add_webhook(subscription(url.clone()));
        let kit = kit(config).await;

        let error = pipeline::process(&kit.ctx, Job::ExtractWebhook(target(url)))
            .await
            .unwrap_err();

        assert!(matches!(error, JobError::AuthenticationFailure(_)));
    }

    #[tokio::test]
    pub async fn rejects_outputs_labelled_for_someone_else() {
        let url = serve(Router::new().route("/webhook", post(mislabelled))).await;
        let kit = kit(config(&url)).await;

        let error = pipeline::process(&kit.ctx, Job::ExtractWebhook(target(url)))
            .await
            .unwrap_err();

        assert!(matches!(error, JobError::SchemaViolation(_)));
        assert!(kit.queue.waiting_named("load.output").await.is_empty());
    }

    #[tokio::test]
    pub async fn fails_forbidden_deliveries_as_unauthenticated() {
        let url = serve(Router::new().route("/webhook", post(forbidden))).await;
        let kit = kit(config(&url)).await;

        let error = pipeline::process(&kit.ctx, Job::ExtractWebhook(target(url)))
            .await
            .unwrap_err();

        assert!(matches!(error, JobError::AuthenticationFailure(_)));
    }

    #[tokio::test]
    pub async fn fails_other_client_errors_without_retrying() {
        let url = serve(Router::new().route("/webhook", post(moved))).await;
        let kit = kit(config(&url).with_max_attempts(3)).await;

        let error = pipeline::process(&kit.ctx, Job::ExtractWebhook(target(url.clone())))
            .await
            .unwrap_err();
        assert!(matches!(error, JobError::SchemaViolation(_)));

        kit.ctx.enqueue(Job::ExtractWebhook(target(url))).await.unwrap();
        assert_eq!(kit.drain().await, 1);

        let failed = kit.queue.failed(10).await.unwrap();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].attempts, 1);
        assert!(failed[0].reason.contains("404"));
    }

    #[tokio::test]
    pub async fn retries_overloaded_subscribers_until_the_limit() {
        let url = serve(Router::new().route("/webhook", post(overloaded))).await;
        let kit = kit(config(&url).with_max_attempts(3)).await;

        kit.ctx.enqueue(Job::ExtractWebhook(target(url))).await.unwrap();
        let handled = kit.drain().await;

        assert_eq!(handled, 3);
        let failed = kit.queue.failed(10).await.unwrap();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].attempts, 3);
    }

    #[tokio::test]
    pub async fn flushes_one_job_per_subscription_and_chain() {
        let url = serve(Router::new().route("/webhook", post(authentic))).await;
        let kit = kit(config(&url)).await;

        pipeline::process(&kit.ctx, Job::FanoutAbis {}).await.unwrap();

        let webhooks = kit.queue.waiting_named("extract.webhook").await;
        assert_eq!(webhooks.len(), 1);
        let Some(Job::ExtractWebhook(target)) = webhooks.first() else {
            panic!("no extract.webhook");
        };
        assert_eq!(target.targets, vec![vault_address()]);
        assert_eq!(target.block_number, HEAD);
        assert_eq!(target.block_time, mainnet_block_time(HEAD));
    }

    #[tokio::test]
    pub async fn fans_out_every_chain_while_a_subscribed_chain_is_down() {
        const OPTIMISM: u64 = 10;

        let url = serve(Router::new().route("/webhook", post(authentic))).await;
        let config = test_config()
            .add_chain(Chain::new(OPTIMISM, "http://localhost:9545"))
            .add_abi(
                AbiConfig::new(ABI_PATH)
                    .add_source(MAINNET, vault_address(), 0)
                    .add_source(OPTIMISM, vault_address(), 0),
            )
            .add_webhook(subscription(url).with_chain_ids(vec![OPTIMISM]))
            .with_webhook_key("sub-1", KEY);

        let optimism = Arc::new(MockProvider::new(HEAD));
        let connector = MockConnector::new()
            .with(MAINNET, Arc::new(MockProvider::new(HEAD)))
            .with(OPTIMISM, optimism.clone());
        let kit = TestKit::new(config, connector).await;

        optimism.go_down();
        pipeline::process(&kit.ctx, Job::FanoutAbis {}).await.unwrap();

        assert_eq!(kit.queue.waiting_named("fanout.events").await.len(), 2);
        assert_eq!(kit.queue.waiting_named("extract.snapshot").await.len(), 2);
        assert!(kit.queue.waiting_named("extract.webhook").await.is_empty());
    }

    async fn health_check(headers: HeaderMap, body: Bytes) -> StatusCode {
        let Some(signature) = headers.get(SIGNATURE_HEADER).and_then(|value| value.to_str().ok())
        else {
            return StatusCode::UNAUTHORIZED;
        };

        match webhooks::verify(KEY, signature, &body) {
            Ok(()) => StatusCode::OK,
            Err(_) => StatusCode::UNAUTHORIZED,
        }
    }

    #[tokio::test]
    pub async fn verifies_signed_health_checks() {
        let url = serve(Router::new().route("/webhook", post(health_check))).await;
        let http = reqwest::Client::new();
        let body = br#"{"status":"ok"}"#.to_vec();
        let now = Utc::now().timestamp() as u64;

        let signed = webhooks::sign(KEY, &body, now).unwrap();
        let response = http
            .post(url.clone())
            .header(SIGNATURE_HEADER, signed)
            .body(body.clone())
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), reqwest::StatusCode::OK);

        let stale = webhooks::sign(KEY, &body, now - 301).unwrap();
        let response = http
            .post(url.clone())
            .header(SIGNATURE_HEADER, stale)
            .body(body.clone())
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), reqwest::StatusCode::UNAUTHORIZED);

        let forged = webhooks::sign("someone-else", &body, now).unwrap();
        let response = http
            .post(url)
            .header(SIGNATURE_HEADER, forged)
            .body(body)
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), reqwest::StatusCode::UNAUTHORIZED);
    }
}
