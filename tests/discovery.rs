//! Discovery against a stand-in Kubernetes API.

use std::sync::Arc;
use std::time::Duration;

use endpoint_picker::config::DiscoveryConfig;
use endpoint_picker::discovery::{DiscoveryTask, KubernetesSource, RefreshOutcome};
use endpoint_picker::load_balancer::{EndpointPicker, EndpointPool};
use mockito::Matcher;

mod common;

fn pod(name: &str, ip: &str) -> serde_json::Value {
    serde_json::json!({
        "metadata": {"name": name, "namespace": "default"},
        "spec": {"containers": [{"name": "vllm", "ports": [{"name": "http", "containerPort": 8000}]}]},
        "status": {"phase": "Running", "podIP": ip}
    })
}

fn source_for(server: &mockito::ServerGuard) -> Arc<KubernetesSource> {
    let config = DiscoveryConfig {
        api_server: Some(server.url()),
        token_path: "/nonexistent/picker/token".to_string(),
        ..DiscoveryConfig::default()
    };
    Arc::new(KubernetesSource::from_config(&config).unwrap())
}

#[tokio::test]
async fn test_failed_refresh_keeps_rotating_over_stale_endpoints() {
    let mut api = mockito::Server::new_async().await;
    let healthy = api
        .mock("GET", "/api/v1/pods")
        .match_query(Matcher::UrlEncoded("labelSelector".into(), "app=vllm-mistral".into()))
        .with_status(200)
        .with_body(
            serde_json::json!({
                "items": [pod("p0", "10.0.0.1"), pod("p1", "10.0.0.2"), pod("p2", "10.0.0.3")]
            })
            .to_string(),
        )
        .create_async()
        .await;

    let pool = Arc::new(EndpointPool::new());
    let picker = EndpointPicker::new(pool.clone());
    let task = DiscoveryTask::new(source_for(&api), pool.clone(), Duration::from_secs(5));

    assert_eq!(task.refresh_once().await, RefreshOutcome::Updated(3));
    healthy.remove_async().await;

    let _broken = api
        .mock("GET", "/api/v1/pods")
        .match_query(Matcher::Any)
        .with_status(500)
        .with_body("etcd unavailable")
        .create_async()
        .await;

    assert_eq!(task.refresh_once().await, RefreshOutcome::FailedKeptStale);

    let picked: Vec<String> = (0..6).map(|_| picker.next().unwrap().to_string()).collect();
    assert_eq!(
        picked,
        [
            "10.0.0.1:8000",
            "10.0.0.2:8000",
            "10.0.0.3:8000",
            "10.0.0.1:8000",
            "10.0.0.2:8000",
            "10.0.0.3:8000"
        ]
    );
}

#[tokio::test]
async fn test_empty_pod_list_keeps_previous_endpoints() {
    let mut api = mockito::Server::new_async().await;
    let first = api
        .mock("GET", "/api/v1/pods")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_body(serde_json::json!({"items": [pod("p0", "10.0.0.1")]}).to_string())
        .create_async()
        .await;

    let pool = Arc::new(EndpointPool::new());
    let task = DiscoveryTask::new(source_for(&api), pool.clone(), Duration::from_secs(5));
    assert_eq!(task.refresh_once().await, RefreshOutcome::Updated(1));
    first.remove_async().await;

    let _scaled_to_zero = api
        .mock("GET", "/api/v1/pods")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_body(r#"{"items": []}"#)
        .create_async()
        .await;

    assert_eq!(task.refresh_once().await, RefreshOutcome::EmptyKeptStale);
    assert_eq!(pool.snapshot()[0].to_string(), "10.0.0.1:8000");
}

#[tokio::test]
async fn test_running_picker_picks_up_scale_out() {
    let mut api = mockito::Server::new_async().await;
    let one = api
        .mock("GET", "/api/v1/pods")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_body(serde_json::json!({"items": [pod("p0", "10.0.0.1")]}).to_string())
        .create_async()
        .await;

    let mut config = common::cluster_config(api.url());
    config.discovery.refresh_interval_secs = 1;
    let picker = common::start_picker(config).await;
    let mut client = picker.client().await;

    let responses = common::exchange(&mut client, vec![common::headers_request(true)]).await;
    assert_eq!(common::routed_target(&responses[0]).as_deref(), Some("10.0.0.1:8000"));

    one.remove_async().await;
    let _two = api
        .mock("GET", "/api/v1/pods")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_body(
            serde_json::json!({"items": [pod("p0", "10.0.0.1"), pod("p1", "10.0.0.2")]}).to_string(),
        )
        .create_async()
        .await;

    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    let mut seen_new = false;
    while tokio::time::Instant::now() < deadline && !seen_new {
        let responses = common::exchange(&mut client, vec![common::headers_request(true)]).await;
        seen_new = common::routed_target(&responses[0]).as_deref() == Some("10.0.0.2:8000");
        if !seen_new {
            tokio::time::sleep(Duration::from_millis(200)).await;
        }
    }

    assert!(seen_new, "refresher never published the new pod");
    picker.stop().await;
}
