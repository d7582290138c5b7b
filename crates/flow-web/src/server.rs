//! Web服务器

use axum::{
    routing::{get, post, put},
    Router,
};
use std::net::SocketAddr;
use std::time::Duration;
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use tracing::info;

use crate::handlers::{
    api_root, change_status, create_patient, get_facility, get_patient, get_queue,
    get_recommendations, get_stats, health, metrics, update_facility, update_priority, AppState,
};

pub struct WebServer {
    addr: SocketAddr,
    app: Router,
}

impl WebServer {
    pub fn new(addr: SocketAddr, state: AppState, request_timeout: Duration) -> Self {
        let app = Self::create_app(state, request_timeout);
        Self { addr, app }
    }

    /// 构建完整路由
    pub fn create_app(state: AppState, request_timeout: Duration) -> Router {
        Router::new()
            // 根路径
            .route("/", get(api_root))
            // 健康检查
            .route("/health", get(health))
            // 监控指标
            .route("/metrics", get(metrics))
            // API路由
            .nest("/api/v1", api_routes())
            .with_state(state)
            // 全局中间件
            .layer(
                ServiceBuilder::new()
                    .layer(TraceLayer::new_for_http())
                    .layer(TimeoutLayer::new(request_timeout))
                    .layer(
                        CorsLayer::new()
                            .allow_origin(Any)
                            .allow_methods(Any)
                            .allow_headers(Any),
                    ),
            )
    }

    pub async fn run(self) -> anyhow::Result<()> {
        info!("Starting web server on {}", self.addr);

        let listener = tokio::net::TcpListener::bind(self.addr).await?;
        axum::serve(listener, self.app)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to start web server: {}", e))?;

        Ok(())
    }
}

/// API v1 路由
fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(api_root))
        .route("/patients", post(create_patient))
        .route("/patients/:id", get(get_patient))
        .route("/patients/:id/status", put(change_status))
        .route("/patients/:id/priority", put(update_priority))
        .route("/queue", get(get_queue))
        .route("/recommendations", get(get_recommendations))
        .route("/stats", get(get_stats))
        .route("/facility", get(get_facility).put(update_facility))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::{Method, Request, StatusCode};
    use flow_admin::QueueMonitor;
    use flow_queue::{InMemoryPatientStore, QueueService, QueueSettings};
    use serde_json::{json, Value};
    use std::sync::Arc;
    use tower::ServiceExt;

    async fn app() -> Router {
        let service = QueueService::new(
            Arc::new(InMemoryPatientStore::new()),
            QueueSettings::default(),
        )
        .await
        .unwrap();
        let state = AppState::new(Arc::new(service), Arc::new(QueueMonitor::new().unwrap()));
        WebServer::create_app(state, Duration::from_secs(5))
    }

    async fn send(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json");
        let request = match body {
            Some(body) => request.body(Body::from(body.to_string())).unwrap(),
            None => request.body(Body::empty()).unwrap(),
        };

        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }

    fn intake(department: &str, symptoms: &[&str]) -> Value {
        json!({
            "first_name": "Florence",
            "last_name": "Nightingale",
            "age": 34,
            "gender": "female",
            "department": department,
            "symptoms": symptoms,
        })
    }

    #[tokio::test]
    async fn test_health() {
        let app = app().await;
        let (status, body) = send(&app, Method::GET, "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");
    }

    #[tokio::test]
    async fn test_create_and_get_patient() {
        let app = app().await;
        let (status, created) = send(
            &app,
            Method::POST,
            "/api/v1/patients",
            Some(intake("cardiology", &["chest pain"])),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(created["priority"], "critical");
        assert_eq!(created["status"], "waiting");

        let uri = format!("/api/v1/patients/{}", created["id"].as_str().unwrap());
        let (status, fetched) = send(&app, Method::GET, &uri, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(fetched["ticket"], created["ticket"]);
        assert_eq!(fetched["estimated_wait"]["kind"], "minutes");
    }

    #[tokio::test]
    async fn test_invalid_intake_is_bad_request() {
        let app = app().await;
        let mut body = intake("general", &["cough"]);
        body["age"] = json!(0);

        let (status, error) = send(&app, Method::POST, "/api/v1/patients", Some(body)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(error["error"], true);
    }

    #[tokio::test]
    async fn test_unknown_patient_is_not_found() {
        let app = app().await;
        let uri = format!("/api/v1/patients/{}", uuid::Uuid::new_v4());
        let (status, _) = send(&app, Method::GET, &uri, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_illegal_transition_is_conflict() {
        let app = app().await;
        let (_, created) = send(
            &app,
            Method::POST,
            "/api/v1/patients",
            Some(intake("general", &["headache"])),
        )
        .await;
        let uri = format!("/api/v1/patients/{}/status", created["id"].as_str().unwrap());

        let (status, _) = send(&app, Method::PUT, &uri, Some(json!({"status": "in-progress"}))).await;
        assert_eq!(status, StatusCode::OK);
        let (status, _) = send(&app, Method::PUT, &uri, Some(json!({"status": "completed"}))).await;
        assert_eq!(status, StatusCode::OK);
        let (status, _) = send(&app, Method::PUT, &uri, Some(json!({"status": "waiting"}))).await;
        assert_eq!(status, StatusCode::CONFLICT);

        let response = app
            .clone()
            .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let text = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let text = String::from_utf8(text.to_vec()).unwrap();
        assert!(text.contains("flow_admitted_patients_total 1"));
        assert!(text.contains("flow_rejected_transitions_total 1"));
    }

    #[tokio::test]
    async fn test_queue_snapshot_filtered() {
        let app = app().await;
        send(&app, Method::POST, "/api/v1/patients", Some(intake("general", &["rash"]))).await;
        send(&app, Method::POST, "/api/v1/patients", Some(intake("emergency", &["unconscious"]))).await;
        send(&app, Method::POST, "/api/v1/patients", Some(intake("general", &["fracture"]))).await;

        let (status, snapshot) = send(&app, Method::GET, "/api/v1/queue", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(snapshot["total_waiting"], 3);
        assert_eq!(snapshot["entries"][0]["patient"]["department"], "emergency");
        assert_eq!(snapshot["entries"][0]["position"], 1);

        let (_, general) = send(&app, Method::GET, "/api/v1/queue?department=general&limit=1", None).await;
        assert_eq!(general["total_waiting"], 2);
        assert_eq!(general["entries"].as_array().unwrap().len(), 1);
        assert_eq!(general["entries"][0]["patient"]["priority"], "high");
    }

    #[tokio::test]
    async fn test_reprioritize_and_stats() {
        let app = app().await;
        let (_, created) = send(
            &app,
            Method::POST,
            "/api/v1/patients",
            Some(intake("pediatrics", &["cough"])),
        )
        .await;
        let uri = format!("/api/v1/patients/{}/priority", created["id"].as_str().unwrap());

        let (status, updated) = send(&app, Method::PUT, &uri, Some(json!({"priority": "critical"}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(updated["priority"], "critical");

        let (status, stats) = send(&app, Method::GET, "/api/v1/stats", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(stats["high_priority_count"], 1);
        assert_eq!(stats["waiting"], 1);
    }

    #[tokio::test]
    async fn test_facility_update_validated() {
        let app = app().await;
        let (status, mut facility) = send(&app, Method::GET, "/api/v1/facility", None).await;
        assert_eq!(status, StatusCode::OK);

        facility["department_loads"]["general"] = json!(-2.0);
        let (status, _) = send(&app, Method::PUT, "/api/v1/facility", Some(facility.clone())).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        facility["department_loads"]["general"] = json!(1.4);
        let (status, updated) = send(&app, Method::PUT, "/api/v1/facility", Some(facility)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(updated["department_loads"]["general"], 1.4);

        let (status, recommendation) = send(&app, Method::GET, "/api/v1/recommendations", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(recommendation["staffing"].as_array().unwrap().len(), 5);
    }
}
