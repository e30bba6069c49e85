//! 浏览器管理器
//!
//! 唯一持有进程级浏览器单例的模块：首次使用时启动，之后复用，
//! 显式 `shutdown` 后清空，下次获取时重新启动。

use std::sync::Arc;

use anyhow::Result;
use tokio::sync::Mutex;
use tracing::{info, warn};

use super::{
    BrowserHandle, BrowserLauncher, BrowsingContext, ContextOptions, ContextOverrides,
    LaunchOptions,
};

/// 浏览器管理器
///
/// 职责：
/// - 懒启动并缓存浏览器
/// - 按默认配置（可逐次覆盖）创建隔离上下文
/// - 进程退出时关闭浏览器
pub struct BrowserManager {
    launcher: Arc<dyn BrowserLauncher>,
    launch_options: LaunchOptions,
    context_defaults: ContextOptions,
    browser: Mutex<Option<Arc<dyn BrowserHandle>>>,
}

impl BrowserManager {
    pub fn new(
        launcher: Arc<dyn BrowserLauncher>,
        launch_options: LaunchOptions,
        context_defaults: ContextOptions,
    ) -> Self {
        Self {
            launcher,
            launch_options,
            context_defaults,
            browser: Mutex::new(None),
        }
    }

    /// 获取浏览器单例，首次调用时启动
    pub async fn acquire_browser(&self) -> Result<Arc<dyn BrowserHandle>> {
        // 持锁启动，避免并发请求各自启动一个浏览器
        let mut slot = self.browser.lock().await;
        if let Some(browser) = slot.as_ref() {
            return Ok(browser.clone());
        }

        info!("🚀 正在启动浏览器...");
        let browser = self.launcher.launch(&self.launch_options).await?;
        *slot = Some(browser.clone());
        Ok(browser)
    }

    /// 创建新的隔离上下文（必要时先启动浏览器）
    pub async fn new_context(
        &self,
        overrides: Option<ContextOverrides>,
    ) -> Result<Arc<dyn BrowsingContext>> {
        let browser = self.acquire_browser().await?;
        let options = overrides.unwrap_or_default().apply(&self.context_defaults);
        browser.new_context(&options).await
    }

    /// 关闭浏览器并清空单例；未启动时什么也不做
    pub async fn shutdown(&self) {
        let browser = self.browser.lock().await.take();
        if let Some(browser) = browser {
            info!("正在关闭浏览器...");
            if let Err(e) = browser.close().await {
                warn!("关闭浏览器失败: {:#}", e);
            }
        }
    }

    /// 浏览器当前是否已启动
    pub async fn is_running(&self) -> bool {
        self.browser.lock().await.is_some()
    }
}
