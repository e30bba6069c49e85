use std::sync::Arc;

use anyhow::Result;
use tokio::net::TcpListener;
use tracing::info;

use web_grader::browser::{BrowserManager, ChromiumLauncher, ContextOptions};
use web_grader::services::{
    FallbackFeedbackGenerator, FeedbackGenerator, LlmFeedbackGenerator, LocalEvidenceStore,
};
use web_grader::utils::logging;
use web_grader::{api, Config, GradingService, ScriptRunner};

#[tokio::main]
async fn main() -> Result<()> {
    // 初始化日志
    logging::init();

    // 加载配置
    let config = Config::load()?;
    logging::log_startup(&config);

    // 浏览器在第一次评分时才启动
    let browser = Arc::new(BrowserManager::new(
        Arc::new(ChromiumLauncher),
        config.launch_options(),
        ContextOptions::default(),
    ));

    let feedback: Arc<dyn FeedbackGenerator> = match &config.llm_api_key {
        Some(api_key) => Arc::new(LlmFeedbackGenerator::new(api_key, &config)),
        None => Arc::new(FallbackFeedbackGenerator),
    };
    let evidence = Arc::new(LocalEvidenceStore::new(
        &config.evidence_dir,
        config.evidence_base_url.clone(),
    ));

    let service = Arc::new(GradingService::new(
        browser.clone(),
        ScriptRunner::new(),
        evidence,
        feedback,
        config.grading_settings(),
    ));

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = TcpListener::bind(&addr).await?;
    info!("🌐 HTTP 服务监听于 {}", addr);

    axum::serve(listener, api::router(service))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // 进程退出前关闭浏览器
    browser.shutdown().await;
    info!("👋 服务已停止");
    Ok(())
}

/// 等待 Ctrl-C 或 SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("监听 Ctrl-C 失败: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("监听 SIGTERM 失败: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("收到退出信号，正在关闭...");
}
