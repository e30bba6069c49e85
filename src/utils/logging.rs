/// 日志工具模块
///
/// 提供日志初始化和输出的辅助函数
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::config::Config;

/// 初始化全局日志（`RUST_LOG` 控制级别，默认 info）
///
/// 重复调用是安全的，测试中可以随意调用
pub fn init() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .try_init();
}

/// 记录程序启动信息
pub fn log_startup(config: &Config) {
    info!("{}", "=".repeat(60));
    info!("🚀 评分服务启动");
    info!(
        "📊 并行执行: {} | 最大并发数: {}",
        config.enable_parallel_execution, config.max_concurrent_tests
    );
    info!(
        "⏱️ 批次超时: {}ms | 单测超时: {}ms | 动作超时: {}ms",
        config.grading_timeout_ms, config.test_timeout_ms, config.action_timeout_ms
    );
    info!(
        "🌐 无头模式: {} | 录像: {}",
        config.browser_headless, config.enable_video_recording
    );
    if config.llm_api_key.is_none() {
        info!("💡 未配置 LLM_API_KEY，失败反馈将使用默认文案");
    }
    info!("{}", "=".repeat(60));
}

/// 截断长文本用于日志显示
///
/// # 参数
/// - `text`: 原始文本
/// - `max_len`: 最大字符数
///
/// # 返回
/// 返回截断后的文本
pub fn truncate_text(text: &str, max_len: usize) -> String {
    if text.chars().count() > max_len {
        text.chars().take(max_len).collect::<String>() + "..."
    } else {
        text.to_string()
    }
}
