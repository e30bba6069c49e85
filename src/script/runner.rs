//! 脚本执行器
//!
//! 在超时限制内执行单个测试单元。所有失败（异常、断言失败、语法错误、超时）
//! 都转换为 `ExecutionResult { success: false, .. }`，从不向调用方返回错误。
//!
//! 超时只是不再等待：页面中的代码不会被强行终止，可能在报告失败后继续运行。

use std::time::Duration;

use tracing::{debug, warn};

use crate::browser::{BrowserPage, UnitOutcome};
use crate::utils::truncate_text;

/// 执行选项
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutionOptions {
    /// 整个测试单元的超时
    pub timeout: Duration,
    /// 页面内单个动作/等待的超时
    pub action_timeout: Duration,
    /// 失败时是否截图并保存 DOM
    pub capture_on_error: bool,
}

impl Default for ExecutionOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_millis(30_000),
            action_timeout: Duration::from_millis(5_000),
            capture_on_error: true,
        }
    }
}

/// 单次执行结果
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutionResult {
    pub success: bool,
    pub error_message: Option<String>,
    pub screenshot: Option<Vec<u8>>,
    pub dom_html: Option<String>,
}

impl ExecutionResult {
    fn passed() -> Self {
        Self {
            success: true,
            ..Default::default()
        }
    }

    fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            error_message: Some(message.into()),
            ..Default::default()
        }
    }
}

/// 脚本执行器（无状态）
#[derive(Debug, Default, Clone, Copy)]
pub struct ScriptRunner;

impl ScriptRunner {
    pub fn new() -> Self {
        Self
    }

    /// 在 `page` 上执行测试代码，与超时计时器竞速
    pub async fn execute(
        &self,
        code: &str,
        page: &dyn BrowserPage,
        options: &ExecutionOptions,
    ) -> ExecutionResult {
        let run = page.run_code_unit(code, options.action_timeout);
        let message = match tokio::time::timeout(options.timeout, run).await {
            Ok(Ok(UnitOutcome::Passed)) => {
                debug!("脚本执行成功");
                return ExecutionResult::passed();
            }
            Ok(Ok(UnitOutcome::Failed(message))) => message,
            Ok(Err(e)) => format!("{:#}", e),
            Err(_) => format!(
                "Script execution timeout after {}ms",
                options.timeout.as_millis()
            ),
        };

        warn!("脚本执行失败: {}", truncate_text(&message, 200));
        let mut result = ExecutionResult::failed(message);
        if options.capture_on_error {
            capture_evidence(page, &mut result).await;
        }
        result
    }
}

/// 尽力截图和保存 DOM，失败只省略对应字段
async fn capture_evidence(page: &dyn BrowserPage, result: &mut ExecutionResult) {
    match page.screenshot().await {
        Ok(bytes) => result.screenshot = Some(bytes),
        Err(e) => warn!("截图失败: {:#}", e),
    }
    match page.content().await {
        Ok(html) => result.dom_html = Some(html),
        Err(e) => warn!("获取页面 HTML 失败: {:#}", e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::{anyhow, Result};
    use async_trait::async_trait;

    /// 按预设行为响应的页面
    struct ScriptedPage {
        outcome: Result<UnitOutcome, String>,
        delay: Duration,
        capture_fails: bool,
    }

    impl ScriptedPage {
        fn returning(outcome: UnitOutcome) -> Self {
            Self {
                outcome: Ok(outcome),
                delay: Duration::ZERO,
                capture_fails: false,
            }
        }
    }

    #[async_trait]
    impl BrowserPage for ScriptedPage {
        async fn goto(&self, _url: &str, _timeout: Duration) -> Result<()> {
            Ok(())
        }

        async fn run_code_unit(&self, _code: &str, _action_timeout: Duration) -> Result<UnitOutcome> {
            tokio::time::sleep(self.delay).await;
            self.outcome.clone().map_err(|e| anyhow!(e))
        }

        async fn screenshot(&self) -> Result<Vec<u8>> {
            if self.capture_fails {
                return Err(anyhow!("Target closed"));
            }
            Ok(vec![0x89, b'P', b'N', b'G'])
        }

        async fn content(&self) -> Result<String> {
            if self.capture_fails {
                return Err(anyhow!("Target closed"));
            }
            Ok("<html><body><h1>Test Page</h1></body></html>".to_string())
        }

        async fn close(&self) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_default_options_match_grading_defaults() {
        let options = ExecutionOptions::default();
        let settings = crate::orchestrator::GradingSettings::default();
        assert_eq!(options.timeout, settings.test_timeout);
        assert_eq!(options.action_timeout, settings.action_timeout);
        assert!(options.capture_on_error);
    }

    #[tokio::test]
    async fn test_passing_unit_has_no_error() {
        let page = ScriptedPage::returning(UnitOutcome::Passed);
        let result = ScriptRunner::new()
            .execute("await page.textContent('h1');", &page, &ExecutionOptions::default())
            .await;

        assert!(result.success);
        assert_eq!(result.error_message, None);
        assert_eq!(result.screenshot, None);
    }

    #[tokio::test]
    async fn test_thrown_message_is_kept_verbatim() {
        let message = "Error with \"quotes\" and \n newlines";
        let page = ScriptedPage::returning(UnitOutcome::Failed(message.to_string()));
        let result = ScriptRunner::new()
            .execute("throw new Error('...')", &page, &ExecutionOptions::default())
            .await;

        assert!(!result.success);
        assert_eq!(result.error_message.as_deref(), Some(message));
    }

    #[tokio::test]
    async fn test_failure_captures_evidence_when_enabled() {
        let page = ScriptedPage::returning(UnitOutcome::Failed("Capture test".to_string()));
        let result = ScriptRunner::new()
            .execute("", &page, &ExecutionOptions::default())
            .await;

        assert!(result.screenshot.is_some_and(|s| !s.is_empty()));
        assert!(result.dom_html.unwrap().contains("<h1>Test Page</h1>"));
    }

    #[tokio::test]
    async fn test_failure_skips_evidence_when_disabled() {
        let page = ScriptedPage::returning(UnitOutcome::Failed("No capture test".to_string()));
        let options = ExecutionOptions {
            capture_on_error: false,
            ..Default::default()
        };
        let result = ScriptRunner::new().execute("", &page, &options).await;

        assert!(!result.success);
        assert_eq!(result.screenshot, None);
        assert_eq!(result.dom_html, None);
    }

    #[tokio::test]
    async fn test_capture_failures_are_swallowed() {
        let page = ScriptedPage {
            capture_fails: true,
            ..ScriptedPage::returning(UnitOutcome::Failed("boom".to_string()))
        };
        let result = ScriptRunner::new()
            .execute("", &page, &ExecutionOptions::default())
            .await;

        assert!(!result.success);
        assert_eq!(result.error_message.as_deref(), Some("boom"));
        assert_eq!(result.screenshot, None);
        assert_eq!(result.dom_html, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_wins_over_slow_success() {
        let page = ScriptedPage {
            delay: Duration::from_millis(2000),
            ..ScriptedPage::returning(UnitOutcome::Passed)
        };
        let options = ExecutionOptions {
            timeout: Duration::from_millis(500),
            ..Default::default()
        };
        let result = ScriptRunner::new().execute("", &page, &options).await;

        assert!(!result.success);
        assert!(result.error_message.unwrap().contains("timeout"));
    }

    #[tokio::test]
    async fn test_transport_error_becomes_failure() {
        let page = ScriptedPage {
            outcome: Err("Target closed".to_string()),
            ..ScriptedPage::returning(UnitOutcome::Passed)
        };
        let result = ScriptRunner::new()
            .execute("", &page, &ExecutionOptions::default())
            .await;

        assert!(!result.success);
        assert_eq!(result.error_message.as_deref(), Some("Target closed"));
    }
}
