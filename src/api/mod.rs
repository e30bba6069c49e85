//! HTTP 接口层
//!
//! - `POST /grade` 提交评分请求，同步返回评分结果
//! - `GET /health` 存活检查

pub mod handlers;

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::orchestrator::GradingService;

/// 构建路由
pub fn router(service: Arc<GradingService>) -> Router {
    Router::new()
        .route("/grade", post(handlers::grade))
        .route("/health", get(handlers::health))
        .layer(TraceLayer::new_for_http())
        .with_state(service)
}
