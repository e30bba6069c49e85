//! 证据存储服务 - 业务能力层
//!
//! 只负责"保存失败现场"能力：截图、DOM 快照、录像。
//! 调用方把这些操作视为尽力而为，失败不会影响评分结果。

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::fs;
use tracing::debug;

use crate::browser::{BrowserPage, BrowsingContext};

/// 证据接收方
///
/// 返回值是可嵌入反馈文本的 URL（或路径）
#[async_trait]
pub trait EvidenceSink: Send + Sync {
    async fn capture_screenshot(
        &self,
        page: &dyn BrowserPage,
        submission_id: &str,
        task_id: &str,
    ) -> Result<String>;

    async fn capture_dom_snapshot(
        &self,
        page: &dyn BrowserPage,
        submission_id: &str,
        task_id: &str,
    ) -> Result<String>;

    /// 上下文没有录像时返回 None
    async fn save_video(
        &self,
        context: &dyn BrowsingContext,
        submission_id: &str,
    ) -> Result<Option<String>>;
}

/// 把测试名转换成可用作路径片段的 ID：空白替换为 `_`，去掉路径分隔符等字符
pub fn task_id(task_name: &str) -> String {
    let id = task_name
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("_")
        .chars()
        .filter(|c| !matches!(c, '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|'))
        .collect::<String>();
    let id = id.trim_start_matches('.').to_string();
    if id.is_empty() {
        "unnamed".to_string()
    } else {
        id
    }
}

/// 本地文件系统证据存储
///
/// 目录结构：`<root>/<submissionId>/<taskId>/screenshot.png`、`.../dom.html`、
/// `<root>/<submissionId>/recording.webm`
pub struct LocalEvidenceStore {
    root: PathBuf,
    base_url: Option<String>,
}

impl LocalEvidenceStore {
    pub fn new(root: impl Into<PathBuf>, base_url: Option<String>) -> Self {
        Self {
            root: root.into(),
            base_url,
        }
    }

    /// 写入文件并返回对外地址
    async fn store(&self, relative: &[&str], bytes: &[u8]) -> Result<String> {
        let path = relative.iter().fold(self.root.clone(), |p, part| p.join(part));
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .with_context(|| format!("无法创建目录: {}", parent.display()))?;
        }
        fs::write(&path, bytes)
            .await
            .with_context(|| format!("无法写入文件: {}", path.display()))?;
        debug!("证据已保存: {} ({} 字节)", path.display(), bytes.len());

        Ok(self.public_location(relative, &path))
    }

    fn public_location(&self, relative: &[&str], path: &Path) -> String {
        match &self.base_url {
            Some(base) => format!("{}/{}", base.trim_end_matches('/'), relative.join("/")),
            None => path.display().to_string(),
        }
    }
}

#[async_trait]
impl EvidenceSink for LocalEvidenceStore {
    async fn capture_screenshot(
        &self,
        page: &dyn BrowserPage,
        submission_id: &str,
        task_id: &str,
    ) -> Result<String> {
        let screenshot = page.screenshot().await.context("截图失败")?;
        let submission = self::task_id(submission_id);
        self.store(&[&submission, task_id, "screenshot.png"], &screenshot)
            .await
    }

    async fn capture_dom_snapshot(
        &self,
        page: &dyn BrowserPage,
        submission_id: &str,
        task_id: &str,
    ) -> Result<String> {
        let html = page.content().await.context("获取页面 HTML 失败")?;
        let submission = self::task_id(submission_id);
        self.store(&[&submission, task_id, "dom.html"], html.as_bytes())
            .await
    }

    async fn save_video(
        &self,
        context: &dyn BrowsingContext,
        submission_id: &str,
    ) -> Result<Option<String>> {
        let Some(recording) = context.recording_path() else {
            return Ok(None);
        };
        let bytes = fs::read(&recording)
            .await
            .with_context(|| format!("无法读取录像: {}", recording.display()))?;
        let submission = task_id(submission_id);
        let location = self.store(&[&submission, "recording.webm"], &bytes).await?;
        Ok(Some(location))
    }
}
