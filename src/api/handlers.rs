//! HTTP 处理函数

use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use chrono::{SecondsFormat, Utc};
use tracing::{error, info, warn};
use url::Url;

use crate::error::{AppError, AppResult};
use crate::models::{GradingRequest, GradingResponse, HealthStatus};
use crate::orchestrator::GradingService;

/// POST /grade - 执行评分
pub async fn grade(
    State(service): State<Arc<GradingService>>,
    Json(request): Json<GradingRequest>,
) -> AppResult<Json<GradingResponse>> {
    validate_request(&request)?;
    info!("📥 收到评分请求: {}", request.submission_id);

    // 在独立任务中评分，任务 panic 时返回 500 而不是断开连接
    let response = tokio::spawn(async move { service.grade(request).await })
        .await
        .map_err(|e| {
            error!("评分任务异常退出: {}", e);
            AppError::Internal(format!("grading task failed: {}", e))
        })?;
    Ok(Json(response))
}

/// GET /health - 存活检查
pub async fn health() -> Json<HealthStatus> {
    Json(HealthStatus {
        status: "ok".to_string(),
        timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
    })
}

/// 校验请求：submissionId 非空，targetUrl 必须是 http(s) 地址
pub fn validate_request(request: &GradingRequest) -> AppResult<()> {
    if request.submission_id.trim().is_empty() {
        return Err(AppError::InvalidRequest("submissionId must not be empty".to_string()));
    }

    let url = Url::parse(&request.target_url).map_err(|e| {
        warn!("无效的 targetUrl '{}': {}", request.target_url, e);
        AppError::InvalidRequest(format!("targetUrl is not a valid URL: {}", e))
    })?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(AppError::InvalidRequest(format!(
            "targetUrl must use http or https, got '{}'",
            url.scheme()
        )));
    }
    Ok(())
}
