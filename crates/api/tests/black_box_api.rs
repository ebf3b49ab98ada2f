use std::sync::Arc;
use std::time::Duration;

use jobflow_infra::{SimulationConfig, WorkerConfig};
use reqwest::StatusCode;
use serde_json::{json, Value};

struct TestServer {
    base_url: String,
    handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    async fn spawn(simulation: SimulationConfig) -> Self {
        // Same router as prod on the in-memory backend, bound to an ephemeral port.
        let worker = WorkerConfig {
            simulation,
            ..WorkerConfig::default()
        };
        let services = Arc::new(
            jobflow_api::app::services::in_memory(&worker)
                .await
                .expect("failed to wire services"),
        );
        let app = jobflow_api::app::build_app(services);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind ephemeral port");
        let addr = listener.local_addr().unwrap();
        let base_url = format!("http://{}", addr);

        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { base_url, handle }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Processor that never finishes within a test, so jobs stay `processing`.
fn stalled() -> SimulationConfig {
    SimulationConfig::instant()
        .with_processing_time(Duration::from_secs(600), Duration::from_secs(600))
}

async fn create_job(client: &reqwest::Client, srv: &TestServer, body: Value) -> reqwest::Response {
    client
        .post(srv.url("/api/v1/jobs"))
        .json(&body)
        .send()
        .await
        .unwrap()
}

async fn job_status_eventually(
    client: &reqwest::Client,
    srv: &TestServer,
    id: &str,
    expected: &str,
) -> Value {
    // Workers run asynchronously; poll briefly until the status is reached.
    for _ in 0..200 {
        let res = client
            .get(srv.url(&format!("/api/v1/jobs/{id}")))
            .send()
            .await
            .unwrap();
        let body: Value = res.json().await.unwrap();
        if body["data"]["status"] == expected {
            return body["data"].clone();
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    panic!("job {id} did not reach {expected} within timeout");
}

#[tokio::test]
async fn health_is_ok() {
    let srv = TestServer::spawn(SimulationConfig::instant()).await;
    let res = reqwest::get(srv.url("/health")).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn create_returns_pending_job_in_envelope() {
    let srv = TestServer::spawn(stalled()).await;
    let client = reqwest::Client::new();

    let res = create_job(
        &client,
        &srv,
        json!({ "name": "nightly", "job_type": "export", "config": { "bucket": "b1" } }),
    )
    .await;
    assert_eq!(res.status(), StatusCode::CREATED);

    let body: Value = res.json().await.unwrap();
    assert_eq!(body["status"], "success");
    assert_eq!(body["data"]["name"], "nightly");
    assert_eq!(body["data"]["jobType"], "export");
    assert_eq!(body["data"]["status"], "pending");
    assert_eq!(body["data"]["retryCount"], 0);
    assert_eq!(body["data"]["config"]["bucket"], "b1");
}

#[tokio::test]
async fn create_validation_errors_are_bad_requests() {
    let srv = TestServer::spawn(SimulationConfig::instant()).await;
    let client = reqwest::Client::new();

    let res = create_job(&client, &srv, json!({ "name": "", "job_type": "process" })).await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["status"], "error");
    assert_eq!(body["field"], "name");

    let res = create_job(&client, &srv, json!({ "name": "n", "job_type": "bogus" })).await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["field"], "job_type");

    let res = client
        .post(srv.url("/api/v1/jobs"))
        .header("content-type", "application/json")
        .body("{not json")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn job_runs_to_completion() {
    let srv = TestServer::spawn(SimulationConfig::instant()).await;
    let client = reqwest::Client::new();

    let res = create_job(&client, &srv, json!({ "name": "quick", "job_type": "process" })).await;
    let body: Value = res.json().await.unwrap();
    let id = body["data"]["id"].as_str().unwrap().to_string();

    job_status_eventually(&client, &srv, &id, "completed").await;
}

#[tokio::test]
async fn unknown_and_malformed_ids() {
    let srv = TestServer::spawn(SimulationConfig::instant()).await;
    let client = reqwest::Client::new();

    let unknown = "0192f0c4-7b1e-7cc0-9a35-7f3f5d8f1a2b";
    let res = client
        .get(srv.url(&format!("/api/v1/jobs/{unknown}")))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "job not found");

    for action in ["cancel", "retry"] {
        let res = client
            .post(srv.url(&format!("/api/v1/jobs/{unknown}/{action}")))
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::NOT_FOUND, "{action}");
    }

    let res = client
        .get(srv.url("/api/v1/jobs/not-a-uuid"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["field"], "id");
}

#[tokio::test]
async fn cancel_flow_reaches_cancelled_and_then_conflicts() {
    let srv = TestServer::spawn(stalled()).await;
    let client = reqwest::Client::new();

    let res = create_job(&client, &srv, json!({ "name": "slow", "job_type": "analyze" })).await;
    let body: Value = res.json().await.unwrap();
    let id = body["data"]["id"].as_str().unwrap().to_string();

    let res = client
        .post(srv.url(&format!("/api/v1/jobs/{id}/cancel")))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["data"]["status"], "cancelling");

    job_status_eventually(&client, &srv, &id, "cancelled").await;

    let res = client
        .post(srv.url(&format!("/api/v1/jobs/{id}/cancel")))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CONFLICT);

    let res = client
        .post(srv.url(&format!("/api/v1/jobs/{id}/retry")))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn failed_job_can_be_retried_until_the_cap() {
    let srv = TestServer::spawn(SimulationConfig::instant().with_failure_rate(1.0)).await;
    let client = reqwest::Client::new();

    let res = create_job(&client, &srv, json!({ "name": "flaky", "job_type": "export" })).await;
    let body: Value = res.json().await.unwrap();
    let id = body["data"]["id"].as_str().unwrap().to_string();

    let failed = job_status_eventually(&client, &srv, &id, "failed").await;
    assert_eq!(failed["errorMessage"], "Simulated processing failure");

    for expected_count in 1..=3 {
        let res = client
            .post(srv.url(&format!("/api/v1/jobs/{id}/retry")))
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        let body: Value = res.json().await.unwrap();
        assert_eq!(body["data"]["retryCount"], expected_count);

        let failed = job_status_eventually(&client, &srv, &id, "failed").await;
        assert_eq!(failed["retryCount"], expected_count);
    }

    let res = client
        .post(srv.url(&format!("/api/v1/jobs/{id}/retry")))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CONFLICT);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["status"], "error");
}

#[tokio::test]
async fn list_is_paged_newest_first() {
    let srv = TestServer::spawn(stalled()).await;
    let client = reqwest::Client::new();

    let mut ids = Vec::new();
    for i in 0..3 {
        let res = create_job(&client, &srv, json!({ "name": format!("job-{i}"), "job_type": "process" })).await;
        let body: Value = res.json().await.unwrap();
        ids.push(body["data"]["id"].as_str().unwrap().to_string());
        tokio::time::sleep(Duration::from_millis(2)).await;
    }

    let res = client
        .get(srv.url("/api/v1/jobs?page=1&limit=2"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.unwrap();
    let data = &body["data"];
    assert_eq!(data["total"], 3);
    assert_eq!(data["page"], 1);
    assert_eq!(data["limit"], 2);
    let listed: Vec<&str> = data["jobs"]
        .as_array()
        .unwrap()
        .iter()
        .map(|j| j["id"].as_str().unwrap())
        .collect();
    assert_eq!(listed, vec![ids[2].as_str(), ids[1].as_str()]);

    let res = client
        .get(srv.url("/api/v1/jobs?page=0&limit=1000"))
        .send()
        .await
        .unwrap();
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["data"]["page"], 1);
    assert_eq!(body["data"]["limit"], 10);
}
