//! 基于 chromiumoxide 的浏览器后端

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chromiumoxide::cdp::browser_protocol::browser::{BrowserContextId, CloseParams};
use chromiumoxide::cdp::browser_protocol::emulation::{
    SetDeviceMetricsOverrideParams, SetLocaleOverrideParams, SetTimezoneOverrideParams,
};
use chromiumoxide::cdp::browser_protocol::network::SetUserAgentOverrideParams;
use chromiumoxide::cdp::browser_protocol::page::{
    CaptureScreenshotFormat, NavigateParams, SetBypassCspParams,
};
use chromiumoxide::cdp::browser_protocol::target::{
    CreateBrowserContextParams, CreateTargetParams, DisposeBrowserContextParams,
};
use chromiumoxide::page::ScreenshotParams;
use chromiumoxide::{Browser, BrowserConfig, Page};
use futures::StreamExt;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use super::{
    BrowserHandle, BrowserLauncher, BrowserPage, BrowsingContext, ContextOptions, LaunchOptions,
    UnitOutcome,
};
use crate::error::BrowserError;
use crate::infrastructure::JsExecutor;

/// 启动或连接 Chromium
#[derive(Debug, Default, Clone, Copy)]
pub struct ChromiumLauncher;

#[async_trait]
impl BrowserLauncher for ChromiumLauncher {
    async fn launch(&self, options: &LaunchOptions) -> Result<Arc<dyn BrowserHandle>> {
        let browser = match options.debug_port {
            Some(port) => connect_to_browser(port).await?,
            None => launch_browser(options).await?,
        };
        Ok(Arc::new(browser))
    }
}

/// 启动新的浏览器进程
async fn launch_browser(options: &LaunchOptions) -> Result<ChromiumBrowser> {
    info!("🚀 启动浏览器 (无头模式: {})...", options.headless);

    let mut builder = BrowserConfig::builder();
    builder = if options.headless {
        builder.new_headless_mode()
    } else {
        builder.with_head()
    };
    if let Some(executable) = &options.executable {
        builder = builder.chrome_executable(executable);
    }
    let config = builder
        .args(options.args.clone())
        .build()
        .map_err(|message| {
            error!("配置浏览器失败: {}", message);
            BrowserError::ConfigurationFailed { message }
        })?;

    let (browser, handler) = Browser::launch(config).await.map_err(|e| {
        error!("启动浏览器失败: {}", e);
        BrowserError::launch_failed(e)
    })?;
    debug!("浏览器启动成功");

    Ok(ChromiumBrowser::new(browser, handler, true))
}

/// 通过调试端口连接已运行的浏览器
async fn connect_to_browser(port: u16) -> Result<ChromiumBrowser> {
    let browser_url = format!("http://localhost:{}", port);
    info!("正在连接到浏览器: {}", browser_url);

    let (browser, handler) = Browser::connect(&browser_url).await.map_err(|e| {
        error!("连接浏览器失败: {}", e);
        BrowserError::connection_failed(port, e)
    })?;
    debug!("浏览器连接成功");

    // 连接的浏览器不归我们所有，关闭时只断开连接
    Ok(ChromiumBrowser::new(browser, handler, false))
}

/// Chromium 浏览器句柄
pub struct ChromiumBrowser {
    browser: Arc<Browser>,
    handler_task: JoinHandle<()>,
    owned: bool,
}

impl ChromiumBrowser {
    fn new(browser: Browser, mut handler: chromiumoxide::Handler, owned: bool) -> Self {
        // 在后台处理浏览器事件
        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    debug!("浏览器事件处理出错: {}", e);
                }
            }
            debug!("浏览器事件流已结束");
        });

        Self {
            browser: Arc::new(browser),
            handler_task,
            owned,
        }
    }
}

#[async_trait]
impl BrowserHandle for ChromiumBrowser {
    async fn new_context(&self, options: &ContextOptions) -> Result<Arc<dyn BrowsingContext>> {
        let created = self
            .browser
            .execute(CreateBrowserContextParams::default())
            .await
            .map_err(BrowserError::context_failed)?;
        let context_id = created.result.browser_context_id.clone();
        debug!("创建浏览上下文: {:?}", context_id);

        if options.record_video {
            warn!("⚠️ Chromium 后端不支持录像，本次上下文不会产生录像文件");
        }

        Ok(Arc::new(ChromiumContext {
            browser: self.browser.clone(),
            context_id,
            options: options.clone(),
        }))
    }

    async fn close(&self) -> Result<()> {
        if self.owned {
            // 浏览器退出时连接随之断开，响应可能收不到
            if let Err(e) = self.browser.execute(CloseParams::default()).await {
                debug!("关闭浏览器命令未正常返回: {}", e);
            }
        }
        self.handler_task.abort();
        Ok(())
    }
}

/// CDP 浏览上下文
pub struct ChromiumContext {
    browser: Arc<Browser>,
    context_id: BrowserContextId,
    options: ContextOptions,
}

impl ChromiumContext {
    /// 将上下文的视口、语言、时区和 UA 应用到新页面
    async fn configure_page(&self, page: &Page) -> Result<()> {
        let metrics = SetDeviceMetricsOverrideParams::builder()
            .width(self.options.viewport.width as i64)
            .height(self.options.viewport.height as i64)
            .device_scale_factor(1.0)
            .mobile(false)
            .build()
            .map_err(|e| anyhow!(e))?;
        page.execute(metrics).await?;

        let user_agent = SetUserAgentOverrideParams::builder()
            .user_agent(self.options.user_agent.clone())
            .accept_language(self.options.locale.clone())
            .build()
            .map_err(|e| anyhow!(e))?;
        page.execute(user_agent).await?;

        page.execute(SetTimezoneOverrideParams::new(self.options.timezone_id.clone()))
            .await?;
        page.execute(SetLocaleOverrideParams {
            locale: Some(self.options.locale.clone()),
        })
        .await?;

        // 测试代码通过 AsyncFunction 编译，需绕过页面的 CSP
        page.execute(SetBypassCspParams::new(true)).await?;
        Ok(())
    }
}

#[async_trait]
impl BrowsingContext for ChromiumContext {
    async fn new_page(&self) -> Result<Arc<dyn BrowserPage>> {
        let params = CreateTargetParams::builder()
            .url("about:blank")
            .browser_context_id(self.context_id.clone())
            .build()
            .map_err(|e| anyhow!(e))?;
        let page = self.browser.new_page(params).await.map_err(|e| {
            error!("创建页面失败: {}", e);
            BrowserError::page_failed(e)
        })?;

        if let Err(e) = self.configure_page(&page).await {
            let _ = page.clone().close().await;
            return Err(e.context("failed to configure page"));
        }

        Ok(Arc::new(ChromiumPage {
            executor: JsExecutor::new(page),
        }))
    }

    fn recording_path(&self) -> Option<PathBuf> {
        None
    }

    async fn close(&self) -> Result<()> {
        debug!("释放浏览上下文: {:?}", self.context_id);
        self.browser
            .execute(DisposeBrowserContextParams::new(self.context_id.clone()))
            .await?;
        Ok(())
    }
}

/// 单个 Chromium 页面
pub struct ChromiumPage {
    executor: JsExecutor,
}

impl ChromiumPage {
    async fn wait_for_dom_ready(&self, url: &str) -> Result<()> {
        // Page.navigate 返回时旧文档可能仍然存在，about:blank 之外还要确认已离开空白页
        let probe = if url == "about:blank" {
            "document.readyState !== 'loading'"
        } else {
            "document.readyState !== 'loading' && location.href !== 'about:blank'"
        };
        loop {
            match self.executor.eval_as::<bool>(probe).await {
                Ok(true) => return Ok(()),
                Ok(false) => {}
                // 导航过程中执行上下文会被销毁，稍后重试
                Err(e) => debug!("等待 DOM 就绪: {}", e),
            }
            sleep(Duration::from_millis(50)).await;
        }
    }
}

#[async_trait]
impl BrowserPage for ChromiumPage {
    async fn goto(&self, url: &str, timeout: Duration) -> Result<()> {
        let navigation = async {
            let response = self.executor.page().execute(NavigateParams::new(url)).await?;
            if let Some(message) = response.result.error_text.clone() {
                return Err(BrowserError::NavigationFailed {
                    url: url.to_string(),
                    message,
                }
                .into());
            }
            self.wait_for_dom_ready(url).await
        };

        match tokio::time::timeout(timeout, navigation).await {
            Ok(result) => result,
            Err(_) => Err(BrowserError::NavigationTimeout {
                url: url.to_string(),
                timeout_ms: timeout.as_millis() as u64,
            }
            .into()),
        }
    }

    async fn run_code_unit(&self, code: &str, action_timeout: Duration) -> Result<UnitOutcome> {
        self.executor.run_code_unit(code, action_timeout).await
    }

    async fn screenshot(&self) -> Result<Vec<u8>> {
        let params = ScreenshotParams::builder()
            .format(CaptureScreenshotFormat::Png)
            .full_page(true)
            .build();
        Ok(self.executor.page().screenshot(params).await?)
    }

    async fn content(&self) -> Result<String> {
        Ok(self.executor.page().content().await?)
    }

    async fn close(&self) -> Result<()> {
        self.executor.page().clone().close().await?;
        Ok(())
    }
}
