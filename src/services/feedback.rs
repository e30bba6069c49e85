//! 反馈生成服务 - 业务能力层
//!
//! 只负责"根据失败信息写出反馈"能力，不关心流程
//!
//! ## 技术栈
//! - 使用 `async-openai` crate 进行 API 调用
//! - 兼容 OpenAI API 的服务（默认 Gemini 的 OpenAI 兼容端点）

use anyhow::Result;
use async_openai::{
    config::OpenAIConfig,
    types::chat::{
        ChatCompletionRequestMessage, ChatCompletionRequestSystemMessageArgs,
        ChatCompletionRequestUserMessageArgs, CreateChatCompletionRequestArgs,
    },
    Client,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::Config;

const FALLBACK_SUGGESTION: &str = "Check the code and try again.";

/// 失败测试的信息
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptFailure {
    pub task_name: String,
    pub code: String,
    pub error_message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
}

/// 反馈内容
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Feedback {
    pub summary: String,
    pub suggestion: String,
    pub severity: Option<Severity>,
}

impl Feedback {
    /// 生成失败时使用的默认反馈
    pub fn fallback(failure: &ScriptFailure) -> Self {
        Self {
            summary: format!("Test failed: {}", failure.error_message),
            suggestion: FALLBACK_SUGGESTION.to_string(),
            severity: None,
        }
    }
}

/// 反馈生成器
///
/// 签名上不返回错误：实现方必须在内部兜底
#[async_trait]
pub trait FeedbackGenerator: Send + Sync {
    async fn generate_feedback(&self, failure: &ScriptFailure, evidence_url: Option<&str>) -> Feedback;
}

/// 始终返回默认反馈（未配置 LLM 时使用）
#[derive(Debug, Default, Clone, Copy)]
pub struct FallbackFeedbackGenerator;

#[async_trait]
impl FeedbackGenerator for FallbackFeedbackGenerator {
    async fn generate_feedback(&self, failure: &ScriptFailure, _evidence_url: Option<&str>) -> Feedback {
        Feedback::fallback(failure)
    }
}

/// LLM 返回的 JSON 结构
#[derive(Debug, Deserialize)]
struct RawFeedback {
    #[serde(default)]
    summary: Option<String>,
    #[serde(default)]
    suggestion: Option<String>,
    #[serde(default)]
    severity: Option<Severity>,
}

/// LLM 反馈生成器
///
/// 职责：
/// - 调用 LLM 分析失败原因并给出修改建议
/// - 只处理单个失败测试
/// - 调用或解析失败时退回默认反馈
pub struct LlmFeedbackGenerator {
    client: Client<OpenAIConfig>,
    model_name: String,
}

impl LlmFeedbackGenerator {
    /// 创建新的 LLM 反馈生成器
    pub fn new(api_key: &str, config: &Config) -> Self {
        // 配置 OpenAI 客户端（兼容 OpenAI API 的服务）
        let openai_config = OpenAIConfig::new()
            .with_api_key(api_key)
            .with_api_base(&config.llm_api_base_url);

        Self {
            client: Client::with_config(openai_config),
            model_name: config.llm_model_name.clone(),
        }
    }

    /// 通用的 LLM 调用函数
    ///
    /// # 参数
    /// - `user_message`: 用户消息内容
    /// - `system_message`: 系统消息（可选）
    ///
    /// # 返回
    /// 返回 LLM 的响应内容（字符串）
    pub async fn send_to_llm(&self, user_message: &str, system_message: Option<&str>) -> Result<String> {
        debug!("调用 LLM API，模型: {}", self.model_name);
        debug!("用户消息长度: {} 字符", user_message.len());

        let mut messages = Vec::new();

        if let Some(sys_msg) = system_message {
            let system_msg = ChatCompletionRequestSystemMessageArgs::default()
                .content(sys_msg)
                .build()?;
            messages.push(ChatCompletionRequestMessage::System(system_msg));
        }

        let user_msg = ChatCompletionRequestUserMessageArgs::default()
            .content(user_message)
            .build()?;
        messages.push(ChatCompletionRequestMessage::User(user_msg));

        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model_name)
            .messages(messages)
            .temperature(0.3)
            .max_tokens(1024u32)
            .build()?;

        let response = self.client.chat().create(request).await.map_err(|e| {
            warn!("LLM API 调用失败: {}", e);
            anyhow::anyhow!("LLM API 调用失败: {}", e)
        })?;

        debug!("LLM API 调用成功");

        let content = response
            .choices
            .first()
            .and_then(|choice| choice.message.content.clone())
            .ok_or_else(|| anyhow::anyhow!("LLM 返回内容为空"))?;

        Ok(content.trim().to_string())
    }
}

#[async_trait]
impl FeedbackGenerator for LlmFeedbackGenerator {
    async fn generate_feedback(&self, failure: &ScriptFailure, evidence_url: Option<&str>) -> Feedback {
        let (user_message, system_message) = build_feedback_messages(failure, evidence_url);
        match self.send_to_llm(&user_message, Some(&system_message)).await {
            Ok(response) => parse_feedback(&response),
            Err(e) => {
                warn!("生成 AI 反馈失败，使用默认反馈: {:#}", e);
                Feedback::fallback(failure)
            }
        }
    }
}

/// 构建反馈提示词，返回 (user_message, system_message)
fn build_feedback_messages(failure: &ScriptFailure, evidence_url: Option<&str>) -> (String, String) {
    let system_message = "You are an expert front-end grader. Analyse why a student's submission \
                          failed an automated browser test and give friendly, educational feedback."
        .to_string();

    let evidence = evidence_url
        .map(|url| format!("\n- Screenshot: {}", url))
        .unwrap_or_default();

    let user_message = format!(
        r#"## Test
- Name: {}
- Error message: {}{}

## Test code
```javascript
{}
```

Respond with only a JSON object in this shape:
{{
  "summary": "why the test failed (1-2 sentences)",
  "suggestion": "how to fix it, with a concrete code example",
  "severity": "low | medium | high"
}}"#,
        failure.task_name, failure.error_message, evidence, failure.code
    );

    (user_message, system_message)
}

/// 解析 LLM 的 JSON 响应，允许外层包裹 ``` 代码块
fn parse_feedback(response: &str) -> Feedback {
    let json = extract_json_object(response).unwrap_or(response);
    match serde_json::from_str::<RawFeedback>(json) {
        Ok(raw) => Feedback {
            summary: raw
                .summary
                .filter(|s| !s.trim().is_empty())
                .unwrap_or_else(|| "Test failed".to_string()),
            suggestion: raw
                .suggestion
                .filter(|s| !s.trim().is_empty())
                .unwrap_or_else(|| "Check your code.".to_string()),
            severity: raw.severity,
        },
        Err(e) => {
            warn!("无法解析 LLM 反馈: {}", e);
            Feedback {
                summary: "Test failed".to_string(),
                suggestion: "Check your code.".to_string(),
                severity: None,
            }
        }
    }
}

fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (start < end).then(|| &text[start..=end])
}
