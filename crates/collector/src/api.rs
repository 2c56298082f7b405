//! HTTP surface of the collector: sample intake, dashboard queries,
//! probes, service control, health and Prometheus metrics

use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Form, Json, Router,
};
use farmwatch_lib::{
    aggregator::Aggregator,
    alarm::quantities,
    control::{ServiceAction, ServiceController, ServiceTarget},
    health::{components, ComponentStatus, HealthRegistry},
    logs::read_logs,
    notifier::{Notification, NotificationQueue},
    probes::{PortReport, PortScanner, ProcessStatus, ProcessTable},
};
use prometheus::{Encoder, TextEncoder};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::{broadcast, Mutex};
use tracing::{error, info, warn};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub aggregator: Arc<Mutex<Aggregator>>,
    pub notifications: NotificationQueue,
    pub scanner: Arc<PortScanner>,
    pub processes: Arc<dyn ProcessTable>,
    pub controller: Arc<ServiceController>,
    pub health_registry: HealthRegistry,
    pub log_path: PathBuf,
}

impl AppState {
    async fn scan_ports(&self) -> PortReport {
        let report = self.scanner.scan().await;
        let reachable = self.scanner.primary_reachable(&report);

        let (outcome, config) = {
            let mut aggregator = self.aggregator.lock().await;
            let outcome = aggregator.apply_port_scan(&report, reachable).await;
            (outcome, aggregator.config().clone())
        };
        self.notifications.enqueue_all(outcome.notifications);

        if reachable {
            self.health_registry.set_healthy(components::PROBES).await;
        } else {
            self.health_registry
                .set_degraded(
                    components::PROBES,
                    format!("{} unreachable", self.scanner.primary()),
                )
                .await;
        }

        if outcome.start_data_store {
            let controller = self.controller.clone();
            tokio::spawn(async move {
                match controller.start_data_store(&config).await {
                    Ok(true) => info!("Data store auto-start issued"),
                    Ok(false) => {}
                    Err(e) => error!(error = %e, "Data store auto-start failed"),
                }
            });
        }
        report
    }

    async fn companion_status(&self) -> ProcessStatus {
        let processes = self.processes.clone();
        let signature = self.controller.settings().companion_signature.clone();

        match tokio::task::spawn_blocking(move || processes.status(&signature)).await {
            Ok(status) => status,
            Err(e) => {
                warn!(error = %e, "Process scan failed, reporting sampler as not running");
                ProcessStatus::absent()
            }
        }
    }

    async fn check_companion(&self) -> ProcessStatus {
        let status = self.companion_status().await;
        let notifications = self.aggregator.lock().await.apply_demon_status(&status);
        self.notifications.enqueue_all(notifications);
        status
    }
}

fn error_response(status: StatusCode, message: impl ToString) -> (StatusCode, Json<Value>) {
    (status, Json(json!({ "error": message.to_string() })))
}

async fn receive_data(State(state): State<Arc<AppState>>, body: Bytes) -> impl IntoResponse {
    let result = state.aggregator.lock().await.receive(&body).await;

    match result {
        Ok(notifications) => {
            state.notifications.enqueue_all(notifications);
            (StatusCode::OK, Json(json!({ "Ok": "Ok" })))
        }
        Err(e) => {
            warn!(error = %e, "Rejected sample batch");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, e)
        }
    }
}

async fn get_data(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.aggregator.lock().await.get_data())
}

async fn first_change(state: &AppState, quantity: &str, message: &str) -> Json<Value> {
    match state.aggregator.lock().await.first_change(quantity) {
        Some(value) => Json(json!({ quantity: value })),
        None => Json(json!({ "message": message })),
    }
}

async fn get_alarm_cpu(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    first_change(&state, quantities::CPU, "No CPU change detected").await
}

async fn get_alarm_memory(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    first_change(&state, quantities::MEMORY, "No memory change detected").await
}

async fn get_alarm_time_interval(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let aggregator = state.aggregator.lock().await;
    Json(json!({ "elapse": aggregator.latest_interval() }))
}

async fn get_check_port(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let report = state.scan_ports().await;
    Json(json!({ "list_port": report }))
}

async fn get_check_demon(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let status = state.check_companion().await;
    Json(json!({ "demon": status }))
}

/// `/manage` form; the first present field wins in the order demon, mysql, all
#[derive(Debug, Default, Deserialize)]
pub struct ManageForm {
    pub demon: Option<String>,
    pub mysql: Option<String>,
    pub all: Option<String>,
}

impl ManageForm {
    fn request(&self) -> Option<(ServiceTarget, &str)> {
        if let Some(value) = &self.demon {
            Some((ServiceTarget::Demon, value))
        } else if let Some(value) = &self.mysql {
            Some((ServiceTarget::Mysql, value))
        } else {
            self.all.as_deref().map(|value| (ServiceTarget::All, value))
        }
    }
}

async fn manage_status(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let status = state.check_companion().await;
    let report = state.scan_ports().await;
    Json(json!({ "demon": status, "list_port": report }))
}

async fn manage(
    State(state): State<Arc<AppState>>,
    Form(form): Form<ManageForm>,
) -> impl IntoResponse {
    let Some((target, value)) = form.request() else {
        return error_response(StatusCode::BAD_REQUEST, "expected one of demon, mysql, all");
    };
    let Some(action) = ServiceAction::parse(value) else {
        return error_response(
            StatusCode::BAD_REQUEST,
            format!("unknown action '{}', expected Marche or Arret", value),
        );
    };

    let (config, mail_enabled) = {
        let mut aggregator = state.aggregator.lock().await;
        aggregator.reload_if_changed().await;
        (aggregator.config().clone(), aggregator.mail_enabled())
    };

    info!(service = ?target, action = ?action, "Service control requested");
    let report = state.controller.execute(target, action, &config).await;
    state
        .notifications
        .enqueue(Notification::server_fault(report.message.clone(), mail_enabled));

    (StatusCode::OK, Json(json!({ "manage": report })))
}

async fn get_logs(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match read_logs(&state.log_path).await {
        Ok(logs) => (StatusCode::OK, Json(json!({ "logs": logs }))),
        Err(e) => {
            error!(path = %state.log_path.display(), error = %e, "Failed to read log file");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, e)
        }
    }
}

async fn send_mail(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let mail_enabled = state.aggregator.lock().await.mail_enabled();
    if state.notifications.enqueue(Notification::test_message(mail_enabled)) {
        (StatusCode::OK, Json(json!({ "Ok": "mail queued" })))
    } else {
        error_response(StatusCode::SERVICE_UNAVAILABLE, "notification queue unavailable")
    }
}

/// Health check response - returns 200 if healthy, 503 if unhealthy
async fn healthz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let health = state.health_registry.health().await;

    let status_code = match health.status {
        ComponentStatus::Healthy => StatusCode::OK,
        ComponentStatus::Degraded => StatusCode::OK, // Still observing
        ComponentStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    (status_code, Json(health))
}

/// Readiness check response - returns 200 if ready, 503 if not ready
async fn readyz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let readiness = state.health_registry.readiness().await;

    let status_code = if readiness.ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status_code, Json(readiness))
}

/// Prometheus metrics endpoint
async fn metrics() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        error!(error = %e, "Failed to encode metrics");
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            [("content-type", "text/plain; charset=utf-8")],
            Vec::new(),
        );
    }

    (
        StatusCode::OK,
        [("content-type", "text/plain; charset=utf-8")],
        buffer,
    )
}

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/receive_data", post(receive_data))
        .route("/get_data", get(get_data))
        .route("/get_alarm_cpu", get(get_alarm_cpu))
        .route("/get_alarm_memory", get(get_alarm_memory))
        .route("/get_alarm_time_inteval", get(get_alarm_time_interval))
        .route("/get_check_port", get(get_check_port))
        .route("/get_check_demon", get(get_check_demon))
        .route("/manage", get(manage_status).post(manage))
        .route("/get_logs", get(get_logs))
        .route("/send_mail", get(send_mail))
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics))
        .with_state(state)
}

/// Start the API server and run until `shutdown` fires
pub async fn serve(
    addr: String,
    state: Arc<AppState>,
    mut shutdown: broadcast::Receiver<()>,
) -> anyhow::Result<()> {
    let app = create_router(state);

    info!(addr = %addr, "Starting collector API");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown.recv().await;
        })
        .await?;

    Ok(())
}
