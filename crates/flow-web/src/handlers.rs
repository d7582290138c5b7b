//! HTTP处理器

use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
};
use flow_admin::QueueMonitor;
use flow_core::{Department, FacilityState, FlowError, PatientIntake, PatientStatus, Priority};
use flow_queue::{QueueFilter, QueueService};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

/// 处理器共享状态
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<QueueService>,
    pub monitor: Arc<QueueMonitor>,
}

impl AppState {
    pub fn new(service: Arc<QueueService>, monitor: Arc<QueueMonitor>) -> Self {
        Self { service, monitor }
    }
}

/// 接口错误，包装 `FlowError` 并映射到 HTTP 状态码
#[derive(Debug)]
pub struct ApiError(pub FlowError);

impl From<FlowError> for ApiError {
    fn from(err: FlowError) -> Self {
        ApiError(err)
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        ApiError(FlowError::Internal(err.to_string()))
    }
}

pub type ApiResult<T> = std::result::Result<T, ApiError>;

/// API根路径处理器
pub async fn api_root() -> impl IntoResponse {
    Json(json!({
        "service": "Patient Flow API",
        "version": env!("CARGO_PKG_VERSION"),
        "status": "running",
        "endpoints": {
            "health": "/health",
            "metrics": "/metrics",
            "api": "/api/v1"
        }
    }))
}

/// 健康检查处理器
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "uptime_secs": state.monitor.uptime_secs(),
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// Prometheus 指标
pub async fn metrics(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    let stats = state.service.get_stats().await?;
    state.monitor.observe_stats(&stats);
    let recommendation = state.service.get_facility_recommendations().await?;
    state.monitor.observe_recommendation(&recommendation);

    let body = state.monitor.get_prometheus_metrics()?;
    Ok((
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        body,
    ))
}

/// 登记患者
pub async fn create_patient(
    State(state): State<AppState>,
    Json(intake): Json<PatientIntake>,
) -> ApiResult<impl IntoResponse> {
    info!(
        "Admitting patient to {} with {} symptom(s)",
        intake.department,
        intake.symptoms.len()
    );

    let patient = state.service.add_patient(intake).await?;
    state.monitor.record_admission();

    Ok((StatusCode::CREATED, Json(patient)))
}

/// 查询单个患者
pub async fn get_patient(
    State(state): State<AppState>,
    Path(patient_id): Path<Uuid>,
) -> ApiResult<impl IntoResponse> {
    let patient = state.service.get_patient(patient_id).await?;
    Ok(Json(patient))
}

#[derive(Debug, Deserialize)]
pub struct StatusChangeRequest {
    pub status: PatientStatus,
}

/// 修改患者状态
pub async fn change_status(
    State(state): State<AppState>,
    Path(patient_id): Path<Uuid>,
    Json(request): Json<StatusChangeRequest>,
) -> ApiResult<impl IntoResponse> {
    match state.service.change_status(patient_id, request.status).await {
        Ok(patient) => {
            state.monitor.record_transition(request.status, true);
            Ok(Json(patient))
        }
        Err(e) => {
            if matches!(e, FlowError::InvalidTransition { .. }) {
                state.monitor.record_transition(request.status, false);
            }
            Err(e.into())
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct PriorityRequest {
    /// 为空时按症状重新分类
    #[serde(default)]
    pub priority: Option<Priority>,
}

/// 调整患者优先级
pub async fn update_priority(
    State(state): State<AppState>,
    Path(patient_id): Path<Uuid>,
    Json(request): Json<PriorityRequest>,
) -> ApiResult<impl IntoResponse> {
    let patient = state
        .service
        .reprioritize(patient_id, request.priority)
        .await?;
    Ok(Json(patient))
}

/// 队列查询参数
#[derive(Debug, Default, Deserialize)]
pub struct QueueQueryParams {
    pub department: Option<Department>,
    pub status: Option<PatientStatus>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

impl From<QueueQueryParams> for QueueFilter {
    fn from(params: QueueQueryParams) -> Self {
        QueueFilter {
            department: params.department,
            status: params.status,
            limit: params.limit,
            offset: params.offset,
        }
    }
}

/// 队列快照
pub async fn get_queue(
    State(state): State<AppState>,
    Query(params): Query<QueueQueryParams>,
) -> ApiResult<impl IntoResponse> {
    let filter = QueueFilter::from(params);
    let snapshot = state.service.get_queue_snapshot(&filter).await?;
    Ok(Json(snapshot))
}

/// 资源配置建议
pub async fn get_recommendations(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    let recommendation = state.service.get_facility_recommendations().await?;
    state.monitor.observe_recommendation(&recommendation);
    Ok(Json(recommendation))
}

/// 队列统计
pub async fn get_stats(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    let stats = state.service.get_stats().await?;
    state.monitor.observe_stats(&stats);
    Ok(Json(stats))
}

/// 当前院区状态
pub async fn get_facility(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.service.facility_state().await)
}

/// 更新院区状态
pub async fn update_facility(
    State(state): State<AppState>,
    Json(facility): Json<FacilityState>,
) -> ApiResult<impl IntoResponse> {
    let updated = state.service.update_facility_state(facility).await?;
    Ok(Json(updated))
}

/// 错误处理
impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            FlowError::Validation(_) => StatusCode::BAD_REQUEST,
            FlowError::NotFound(_) => StatusCode::NOT_FOUND,
            FlowError::InvalidTransition { .. } => StatusCode::CONFLICT,
            FlowError::Config(_)
            | FlowError::InvariantViolation(_)
            | FlowError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        if status.is_server_error() {
            error!("Request failed: {}", self.0);
        } else {
            warn!("Request rejected: {}", self.0);
        }

        let body = Json(json!({
            "error": true,
            "message": self.0.to_string(),
            "status": status.as_u16()
        }));

        (status, body).into_response()
    }
}
