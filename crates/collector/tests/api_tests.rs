//! Integration tests for the collector API endpoints

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use farmwatch_collector::api::{create_router, AppState};
use farmwatch_lib::{
    aggregator::Aggregator,
    config::WatchdogConfig,
    control::{ControlSettings, ServiceController},
    health::{components, HealthRegistry},
    notifier::{subjects, Notification, NotificationQueue, NotifierConfig},
    probes::{PortScanner, ProcessTable},
};
use serde_json::Value;
use tempfile::TempDir;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, Mutex};
use tower::ServiceExt;

#[derive(Default)]
struct FakeProcesses {
    procs: StdMutex<Vec<(u32, String)>>,
    killed: StdMutex<Vec<u32>>,
}

impl FakeProcesses {
    fn with(procs: &[(u32, &str)]) -> Self {
        Self {
            procs: StdMutex::new(procs.iter().map(|(p, c)| (*p, c.to_string())).collect()),
            killed: StdMutex::new(Vec::new()),
        }
    }
}

impl ProcessTable for FakeProcesses {
    fn find(&self, signature: &str) -> Vec<u32> {
        self.procs
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, cmd)| cmd.contains(signature))
            .map(|(pid, _)| *pid)
            .collect()
    }

    fn kill(&self, pid: u32) -> bool {
        self.procs.lock().unwrap().retain(|(p, _)| *p != pid);
        self.killed.lock().unwrap().push(pid);
        true
    }
}

struct TestApp {
    router: Router,
    state: Arc<AppState>,
    queued: mpsc::Receiver<Notification>,
    processes: Arc<FakeProcesses>,
    _dir: TempDir,
}

impl TestApp {
    async fn request(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&body).unwrap_or(Value::Null))
    }

    async fn get(&self, uri: &str) -> (StatusCode, Value) {
        self.request(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
    }

    async fn post_json(&self, uri: &str, body: &str) -> (StatusCode, Value) {
        self.request(
            Request::builder()
                .method("POST")
                .uri(uri)
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
    }

    async fn post_form(&self, uri: &str, body: &str) -> (StatusCode, Value) {
        self.request(
            Request::builder()
                .method("POST")
                .uri(uri)
                .header("content-type", "application/x-www-form-urlencoded")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
    }

    fn drain(&mut self) -> Vec<Notification> {
        let mut out = Vec::new();
        while let Ok(n) = self.queued.try_recv() {
            out.push(n);
        }
        out
    }
}

/// Port of a socket that was bound and released, so nothing listens on it
async fn closed_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap().port()
}

async fn setup(
    config: WatchdogConfig,
    services: BTreeMap<String, u16>,
    procs: &[(u32, &str)],
) -> TestApp {
    let dir = TempDir::new().unwrap();
    let health_registry = HealthRegistry::new();
    health_registry.register_all().await;

    let (notifications, queued) = NotificationQueue::new(&NotifierConfig::default());
    let processes = Arc::new(FakeProcesses::with(procs));
    let table: Arc<dyn ProcessTable> = processes.clone();
    let controller = ServiceController::new(
        ControlSettings {
            companion_command: vec!["true".to_string()],
            companion_signature: "farmwatch-sampler".to_string(),
            ingest_command: vec!["true".to_string()],
            ingest_signature: "ingest".to_string(),
            docker_binary: "true".to_string(),
        },
        table.clone(),
    );

    let state = Arc::new(AppState {
        aggregator: Arc::new(Mutex::new(
            Aggregator::new(config).with_health(health_registry.clone()),
        )),
        notifications,
        scanner: Arc::new(
            PortScanner::new("127.0.0.1", services, "Mysql")
                .with_timeout(Duration::from_millis(500)),
        ),
        processes: table,
        controller: Arc::new(controller),
        health_registry,
        log_path: dir.path().join("collector.log"),
    });

    TestApp {
        router: create_router(state.clone()),
        state,
        queued,
        processes,
        _dir: dir,
    }
}

async fn setup_default() -> TestApp {
    setup(WatchdogConfig::default(), BTreeMap::new(), &[]).await
}

fn batch(values: &[(f64, f64)]) -> String {
    let samples: Vec<Value> = values
        .iter()
        .map(|(cpu, memory)| {
            serde_json::json!({
                "cpu": cpu,
                "memory": memory,
                "disk": 33.0,
                "timestamp": "2024-06-28T14:02:30.000001"
            })
        })
        .collect();
    serde_json::json!({ "pc_data": samples }).to_string()
}

#[tokio::test]
async fn test_get_data_before_any_receipt() {
    let app = setup_default().await;

    let (status, data) = app.get("/get_data").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(data["pc_data"], serde_json::json!([]));
    assert_eq!(data["time_intervals"], serde_json::json!([]));
    assert_eq!(data["running"], false);
    assert_eq!(data["check_up"]["ligne_de_vie"], 1);

    let (_, again) = app.get("/get_data").await;
    assert_eq!(again["check_up"]["ligne_de_vie"], 0);
}

#[tokio::test]
async fn test_receive_data_accepts_batch() {
    let mut app = setup_default().await;

    let (status, body) = app
        .post_json("/receive_data", &batch(&[(12.0, 40.0), (11.0, 40.0)]))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, serde_json::json!({ "Ok": "Ok" }));

    let (_, data) = app.get("/get_data").await;
    assert_eq!(data["pc_data"].as_array().unwrap().len(), 2);
    assert_eq!(data["pc_data"][0]["cpu"], 12.0);
    assert_eq!(data["running"], false);
    assert!(app.drain().is_empty());
}

#[tokio::test]
async fn test_receive_data_rejects_malformed_batch() {
    let app = setup_default().await;

    let (status, body) = app
        .post_json("/receive_data", r#"{"pc_data": [{"memory": 3}]}"#)
        .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body["error"].as_str().unwrap().contains("cpu"));

    let (status, body) = app.post_json("/receive_data", r#"{"pc_data": []}"#).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn test_cpu_overload_queues_one_notification() {
    let mut app = setup_default().await;

    app.post_json("/receive_data", &batch(&[(95.0, 40.0)])).await;
    app.post_json("/receive_data", &batch(&[(96.0, 40.0)])).await;

    let queued = app.drain();
    assert_eq!(queued.len(), 1);
    assert_eq!(queued[0].subject, subjects::OVERLOAD);
    assert!(queued[0].body.contains("95"));
}

#[tokio::test]
async fn test_alarm_first_change_endpoints() {
    let app = setup_default().await;

    let (_, cpu) = app.get("/get_alarm_cpu").await;
    assert!(cpu["message"].is_string());

    app.post_json(
        "/receive_data",
        &batch(&[(50.0, 30.0), (42.0, 30.0), (42.0, 35.0)]),
    )
    .await;

    let (_, cpu) = app.get("/get_alarm_cpu").await;
    assert_eq!(cpu, serde_json::json!({ "cpu": 42.0 }));

    let (_, memory) = app.get("/get_alarm_memory").await;
    assert_eq!(memory, serde_json::json!({ "memory": 35.0 }));
}

#[tokio::test]
async fn test_time_interval_endpoint() {
    let app = setup_default().await;

    let (status, body) = app.get("/get_alarm_time_inteval").await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["elapse"].is_null());

    app.post_json("/receive_data", &batch(&[(10.0, 10.0)])).await;
    app.post_json("/receive_data", &batch(&[(10.0, 10.0)])).await;

    let (_, body) = app.get("/get_alarm_time_inteval").await;
    assert!(body["elapse"]["interval"].as_f64().unwrap() >= 0.0);
    assert!(body["elapse"]["timestamp"].is_string());
}

#[tokio::test]
async fn test_check_port_reports_reachability() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let open = listener.local_addr().unwrap().port();
    let closed = closed_port().await;

    let services = BTreeMap::from([("Mysql".to_string(), open), ("Flask".to_string(), closed)]);
    let mut app = setup(WatchdogConfig::default(), services, &[]).await;

    let (status, body) = app.get("/get_check_port").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["list_port"]["Mysql"], true);
    assert_eq!(body["list_port"]["Flask"], false);
    assert!(app.drain().is_empty());
}

#[tokio::test]
async fn test_check_port_trips_data_store_alarm_once() {
    let services = BTreeMap::from([("Mysql".to_string(), closed_port().await)]);
    let mut app = setup(WatchdogConfig::default(), services, &[]).await;

    app.get("/get_check_port").await;
    app.get("/get_check_port").await;

    let queued = app.drain();
    assert_eq!(queued.len(), 1);
    assert_eq!(queued[0].body, "Data store unreachable.");

    let health = app.state.health_registry.health().await;
    assert_eq!(
        serde_json::to_value(&health.components[components::PROBES].status).unwrap(),
        "degraded"
    );
}

#[tokio::test]
async fn test_check_demon() {
    let mut app = setup(
        WatchdogConfig::default(),
        BTreeMap::new(),
        &[(4242, "/usr/local/bin/farmwatch-sampler")],
    )
    .await;

    let (_, body) = app.get("/get_check_demon").await;
    assert_eq!(body["demon"]["running"], true);
    assert_eq!(body["demon"]["pid"], 4242);
    assert!(app.drain().is_empty());

    app.processes.kill(4242);
    let (_, body) = app.get("/get_check_demon").await;
    assert_eq!(body["demon"]["running"], false);
    app.get("/get_check_demon").await;

    let queued = app.drain();
    assert_eq!(queued.len(), 1);
    assert_eq!(queued[0].body, "Sampler connection error.");
}

#[tokio::test]
async fn test_manage_stops_sampler() {
    let mut app = setup(
        WatchdogConfig::default(),
        BTreeMap::new(),
        &[(10, "farmwatch-sampler --config config.yaml"), (11, "sshd")],
    )
    .await;

    let (status, body) = app.post_form("/manage", "demon=Arret").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["manage"]["message"], "Stop sampler.");
    assert_eq!(*app.processes.killed.lock().unwrap(), vec![10]);

    let queued = app.drain();
    assert_eq!(queued.len(), 1);
    assert_eq!(queued[0].subject, subjects::SERVER_FAULT);
    assert_eq!(queued[0].body, "Stop sampler.");
}

#[tokio::test]
async fn test_manage_field_precedence() {
    let app = setup_default().await;

    let (_, body) = app.post_form("/manage", "all=Marche&mysql=Arret").await;
    assert_eq!(body["manage"]["target"], "mysql");
    assert_eq!(body["manage"]["message"], "Stop data store.");
}

#[tokio::test]
async fn test_manage_rejects_unknown_requests() {
    let app = setup_default().await;

    let (status, body) = app.post_form("/manage", "").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());

    let (status, _) = app.post_form("/manage", "demon=Pause").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_manage_status() {
    let app = setup(
        WatchdogConfig::default(),
        BTreeMap::from([("Mysql".to_string(), closed_port().await)]),
        &[],
    )
    .await;

    let (status, body) = app.get("/manage").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["demon"]["running"], false);
    assert_eq!(body["list_port"]["Mysql"], false);
}

#[tokio::test]
async fn test_get_logs() {
    let app = setup_default().await;

    let (_, body) = app.get("/get_logs").await;
    assert_eq!(body["logs"], serde_json::json!([]));

    std::fs::write(
        &app.state.log_path,
        "2024-06-28 14:02:30,123 - farmwatch_collector::api - INFO - first\n\
         not a log line\n\
         2024-06-28 14:02:31,000 - farmwatch_lib::aggregator - WARNING - second\n",
    )
    .unwrap();

    let (status, body) = app.get("/get_logs").await;
    assert_eq!(status, StatusCode::OK);
    let logs = body["logs"].as_array().unwrap();
    assert_eq!(logs.len(), 2);
    assert_eq!(logs[0]["message"], "second");
    assert_eq!(logs[0]["level_num"], 30);
    assert_eq!(logs[1]["date_time"], "2024-06-28 14:02:30,123000");
}

#[tokio::test]
async fn test_send_mail_queues_test_notification() {
    let mut app = setup_default().await;

    let (status, body) = app.get("/send_mail").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, serde_json::json!({ "Ok": "mail queued" }));

    let queued = app.drain();
    assert_eq!(queued.len(), 1);
    assert_eq!(queued[0].subject, subjects::TEST);
    assert!(!queued[0].mail_enabled);
}

#[tokio::test]
async fn test_healthz_and_readyz() {
    let app = setup_default().await;

    let (status, health) = app.get("/healthz").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(health["status"], "healthy");
    assert!(health["components"]["aggregator"].is_object());
    assert!(health["components"]["notifier"].is_object());

    let (status, readiness) = app.get("/readyz").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(readiness["ready"], false);

    app.state.health_registry.set_ready(true).await;
    let (status, _) = app.get("/readyz").await;
    assert_eq!(status, StatusCode::OK);

    app.state
        .health_registry
        .set_unhealthy(components::NOTIFIER, "relay gone")
        .await;
    let (status, health) = app.get("/healthz").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(health["status"], "unhealthy");
}

#[tokio::test]
async fn test_metrics_endpoint_returns_prometheus_format() {
    let app = setup_default().await;
    app.post_json("/receive_data", &batch(&[(10.0, 10.0)])).await;
    app.post_json("/receive_data", &batch(&[(10.0, 10.0)])).await;

    let response = app
        .router
        .clone()
        .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let content_type = response.headers().get("content-type").unwrap();
    assert!(content_type.to_str().unwrap().contains("text/plain"));

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let metrics_text = String::from_utf8(body.to_vec()).unwrap();

    assert!(metrics_text.contains("farmwatch_pushes_received_total"));
    assert!(metrics_text.contains("farmwatch_heartbeat_interval_seconds_bucket"));
}
