//! 评分请求与响应（JSON 字段为 camelCase）

use serde::{Deserialize, Serialize};

/// 评分请求，收到后不再修改
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GradingRequest {
    pub submission_id: String,
    pub target_url: String,
    #[serde(alias = "playwrightScript")]
    pub script_text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub_task_names: Option<Vec<String>>,
}

/// 单个测试的评分结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GradingResultItem {
    pub task_name: String,
    pub is_passed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feedback: Option<String>,
}

/// 评分响应
///
/// `results` 与解析顺序一致；只有请求在准备阶段失败或整批超时时为空
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GradingResponse {
    pub submission_id: String,
    pub success: bool,
    pub results: Vec<GradingResultItem>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl GradingResponse {
    /// 终止性失败：没有任何结果
    pub fn failed(submission_id: impl Into<String>, error_message: impl Into<String>) -> Self {
        Self {
            submission_id: submission_id.into(),
            success: false,
            results: Vec::new(),
            error_message: Some(error_message.into()),
        }
    }

    /// 由全部结果汇总，`success` 为所有 `is_passed` 的逻辑与
    pub fn completed(submission_id: impl Into<String>, results: Vec<GradingResultItem>) -> Self {
        Self {
            submission_id: submission_id.into(),
            success: results.iter().all(|r| r.is_passed),
            results,
            error_message: None,
        }
    }

    pub fn passed_count(&self) -> usize {
        self.results.iter().filter(|r| r.is_passed).count()
    }
}

/// 存活检查
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: String,
    pub timestamp: String,
}
