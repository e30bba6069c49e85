//! 浏览器层
//!
//! 评分核心只依赖这里定义的能力接口：
//! - `BrowserLauncher` 负责启动/连接浏览器进程
//! - `BrowserHandle` 是进程级共享的浏览器
//! - `BrowsingContext` 是单个评分请求独占的隔离会话
//! - `BrowserPage` 是单次测试独占的页面
//!
//! `chromium` 子模块基于 chromiumoxide 实现这些接口，`manager` 持有单例浏览器。

pub mod chromium;
pub mod manager;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;

pub use chromium::ChromiumLauncher;
pub use manager::BrowserManager;

/// 浏览器启动参数
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchOptions {
    pub headless: bool,
    /// 设置后通过调试端口连接已运行的浏览器
    pub debug_port: Option<u16>,
    pub executable: Option<PathBuf>,
    pub args: Vec<String>,
}

impl Default for LaunchOptions {
    fn default() -> Self {
        Self {
            headless: true,
            debug_port: None,
            executable: None,
            args: vec![
                "--no-sandbox".to_string(),
                "--disable-setuid-sandbox".to_string(),
                "--disable-dev-shm-usage".to_string(),
                "--disable-gpu".to_string(),
            ],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

/// 浏览上下文配置
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextOptions {
    pub viewport: Viewport,
    pub locale: String,
    pub timezone_id: String,
    pub user_agent: String,
    pub record_video: bool,
}

impl Default for ContextOptions {
    fn default() -> Self {
        Self {
            viewport: Viewport {
                width: 1280,
                height: 720,
            },
            locale: "ko-KR".to_string(),
            timezone_id: "Asia/Seoul".to_string(),
            user_agent: "ConnectableGrader/1.0".to_string(),
            record_video: false,
        }
    }
}

/// 单次调用对默认上下文配置的覆盖
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContextOverrides {
    pub viewport: Option<Viewport>,
    pub locale: Option<String>,
    pub timezone_id: Option<String>,
    pub user_agent: Option<String>,
    pub record_video: Option<bool>,
}

impl ContextOverrides {
    pub fn apply(self, base: &ContextOptions) -> ContextOptions {
        ContextOptions {
            viewport: self.viewport.unwrap_or(base.viewport),
            locale: self.locale.unwrap_or_else(|| base.locale.clone()),
            timezone_id: self.timezone_id.unwrap_or_else(|| base.timezone_id.clone()),
            user_agent: self.user_agent.unwrap_or_else(|| base.user_agent.clone()),
            record_video: self.record_video.unwrap_or(base.record_video),
        }
    }
}

/// 一段测试代码在页面中执行的结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnitOutcome {
    Passed,
    /// 代码抛出异常、断言失败或语法错误，携带原始错误信息
    Failed(String),
}

/// 启动或连接浏览器
#[async_trait]
pub trait BrowserLauncher: Send + Sync {
    async fn launch(&self, options: &LaunchOptions) -> Result<Arc<dyn BrowserHandle>>;
}

/// 进程级共享的浏览器
#[async_trait]
pub trait BrowserHandle: Send + Sync {
    async fn new_context(&self, options: &ContextOptions) -> Result<Arc<dyn BrowsingContext>>;

    async fn close(&self) -> Result<()>;
}

/// 隔离的浏览会话（cookie/storage 独立）
#[async_trait]
pub trait BrowsingContext: Send + Sync {
    async fn new_page(&self) -> Result<Arc<dyn BrowserPage>>;

    /// 录像文件路径；未开启录像或后端不支持时为 None
    fn recording_path(&self) -> Option<PathBuf>;

    /// 关闭上下文及其中仍打开的页面
    async fn close(&self) -> Result<()>;
}

/// 可导航的单个页面
#[async_trait]
pub trait BrowserPage: Send + Sync {
    /// 导航并等待 DOM 就绪（不等待全部资源加载）
    async fn goto(&self, url: &str, timeout: Duration) -> Result<()>;

    /// 以 `page` 和 `expect` 为唯一自由变量执行一段测试代码
    ///
    /// `Err` 只表示与浏览器的通信失败；代码本身的失败通过 `UnitOutcome::Failed` 返回
    async fn run_code_unit(&self, code: &str, action_timeout: Duration) -> Result<UnitOutcome>;

    /// 整页 PNG 截图
    async fn screenshot(&self) -> Result<Vec<u8>>;

    /// 当前文档的 HTML
    async fn content(&self) -> Result<String>;

    async fn close(&self) -> Result<()>;
}
