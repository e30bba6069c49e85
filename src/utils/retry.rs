//! 网络瞬时故障重试
//!
//! 只重试错误信息命中已知瞬时网络模式的操作，退避时间按指数增长并封顶

use std::future::Future;
use std::time::Duration;

use anyhow::Result;
use tokio::time::sleep;
use tracing::warn;

/// 可重试的错误特征（名称解析/连接错误、超时、导航超时）
const RETRYABLE_PATTERNS: &[&str] = &["net::ERR_", "ETIMEDOUT", "ECONNRESET", "Navigation timeout"];

/// 重试策略
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// 最多尝试次数（包含第一次）
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(10_000),
        }
    }
}

impl RetryPolicy {
    /// 第 `attempt` 次失败后的等待时间（attempt 从 1 开始）
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}

/// 判断错误是否属于瞬时网络故障
pub fn is_retryable(error: &anyhow::Error) -> bool {
    let message = format!("{:#}", error);
    RETRYABLE_PATTERNS.iter().any(|p| message.contains(p))
}

/// 带重试地执行异步操作
///
/// 不可重试的错误或用尽次数后，最后一次的错误原样返回
pub async fn with_retry<T, F, Fut>(policy: &RetryPolicy, mut operation: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;
    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(e) if attempt < max_attempts && is_retryable(&e) => {
                let delay = policy.delay_for(attempt);
                warn!(
                    "瞬时网络错误 (尝试 {}/{}), {}ms 后重试: {:#}",
                    attempt,
                    max_attempts,
                    delay.as_millis(),
                    e
                );
                sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}
