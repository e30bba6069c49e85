//! 内存中的假浏览器后端，供集成测试使用
//!
//! 测试代码按以下约定解释：
//! - `await page.waitForTimeout(N);` 休眠 N 毫秒
//! - `throw new Error('msg');` 以 msg 失败
//! - 其他内容视为通过
//!
//! URL 中含 `unreachable` 时导航返回 `net::ERR_NAME_NOT_RESOLVED`

#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;

use web_grader::browser::{
    BrowserHandle, BrowserLauncher, BrowserManager, BrowserPage, BrowsingContext, ContextOptions,
    LaunchOptions, UnitOutcome,
};
use web_grader::services::{EvidenceSink, Feedback, FeedbackGenerator, ScriptFailure};
use web_grader::{GradingService, GradingSettings, ScriptRunner};

/// 资源计数
#[derive(Debug, Default)]
pub struct Stats {
    pub launches: AtomicUsize,
    pub browser_closes: AtomicUsize,
    pub contexts_created: AtomicUsize,
    pub contexts_closed: AtomicUsize,
    pub pages_created: AtomicUsize,
    pub pages_closed: AtomicUsize,
    pub double_closes: AtomicUsize,
    pub gotos: AtomicUsize,
    pub running: AtomicUsize,
    pub peak_running: AtomicUsize,
}

impl Stats {
    pub fn get(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }

    pub fn open_pages(&self) -> usize {
        Self::get(&self.pages_created) - Self::get(&self.pages_closed)
    }

    pub fn open_contexts(&self) -> usize {
        Self::get(&self.contexts_created) - Self::get(&self.contexts_closed)
    }
}

pub struct FakeLauncher {
    pub stats: Arc<Stats>,
}

#[async_trait]
impl BrowserLauncher for FakeLauncher {
    async fn launch(&self, _options: &LaunchOptions) -> Result<Arc<dyn BrowserHandle>> {
        self.stats.launches.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(FakeBrowser {
            stats: self.stats.clone(),
        }))
    }
}

struct FakeBrowser {
    stats: Arc<Stats>,
}

#[async_trait]
impl BrowserHandle for FakeBrowser {
    async fn new_context(&self, _options: &ContextOptions) -> Result<Arc<dyn BrowsingContext>> {
        self.stats.contexts_created.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(FakeContext {
            stats: self.stats.clone(),
        }))
    }

    async fn close(&self) -> Result<()> {
        self.stats.browser_closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

struct FakeContext {
    stats: Arc<Stats>,
}

#[async_trait]
impl BrowsingContext for FakeContext {
    async fn new_page(&self) -> Result<Arc<dyn BrowserPage>> {
        self.stats.pages_created.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(FakePage {
            stats: self.stats.clone(),
            closed: AtomicBool::new(false),
        }))
    }

    fn recording_path(&self) -> Option<PathBuf> {
        None
    }

    async fn close(&self) -> Result<()> {
        self.stats.contexts_closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

struct FakePage {
    stats: Arc<Stats>,
    closed: AtomicBool,
}

/// 在 drop 时减少运行计数，超时取消时也成立
struct RunningGuard<'a>(&'a Stats);

impl<'a> RunningGuard<'a> {
    fn enter(stats: &'a Stats) -> Self {
        let now = stats.running.fetch_add(1, Ordering::SeqCst) + 1;
        stats.peak_running.fetch_max(now, Ordering::SeqCst);
        Self(stats)
    }
}

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.running.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl BrowserPage for FakePage {
    async fn goto(&self, url: &str, _timeout: Duration) -> Result<()> {
        self.stats.gotos.fetch_add(1, Ordering::SeqCst);
        if url.contains("unreachable") {
            return Err(anyhow!("net::ERR_NAME_NOT_RESOLVED at {}", url));
        }
        Ok(())
    }

    async fn run_code_unit(&self, code: &str, _action_timeout: Duration) -> Result<UnitOutcome> {
        let _guard = RunningGuard::enter(&self.stats);
        for line in code.lines().map(str::trim) {
            if let Some(ms) = between(line, "page.waitForTimeout(", ")") {
                let ms: u64 = ms.parse().map_err(|_| anyhow!("bad timeout: {}", ms))?;
                tokio::time::sleep(Duration::from_millis(ms)).await;
            } else if let Some(message) = between(line, "throw new Error('", "')") {
                return Ok(UnitOutcome::Failed(message.to_string()));
            }
        }
        Ok(UnitOutcome::Passed)
    }

    async fn screenshot(&self) -> Result<Vec<u8>> {
        Ok(b"png".to_vec())
    }

    async fn content(&self) -> Result<String> {
        Ok("<html></html>".to_string())
    }

    async fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            self.stats.double_closes.fetch_add(1, Ordering::SeqCst);
        } else {
            self.stats.pages_closed.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }
}

fn between<'a>(line: &'a str, start: &str, end: &str) -> Option<&'a str> {
    let from = line.find(start)? + start.len();
    let to = from + line[from..].find(end)?;
    Some(&line[from..to])
}

/// 记录调用的证据存储，可设置为总是失败
#[derive(Default)]
pub struct RecordingEvidence {
    pub fail: bool,
    pub captures: Mutex<Vec<String>>,
}

#[async_trait]
impl EvidenceSink for RecordingEvidence {
    async fn capture_screenshot(
        &self,
        page: &dyn BrowserPage,
        submission_id: &str,
        task_id: &str,
    ) -> Result<String> {
        if self.fail {
            return Err(anyhow!("storage unavailable"));
        }
        page.screenshot().await?;
        let url = format!("mem://{}/{}/screenshot.png", submission_id, task_id);
        self.captures.lock().unwrap().push(url.clone());
        Ok(url)
    }

    async fn capture_dom_snapshot(
        &self,
        page: &dyn BrowserPage,
        submission_id: &str,
        task_id: &str,
    ) -> Result<String> {
        if self.fail {
            return Err(anyhow!("storage unavailable"));
        }
        page.content().await?;
        let url = format!("mem://{}/{}/dom.html", submission_id, task_id);
        self.captures.lock().unwrap().push(url.clone());
        Ok(url)
    }

    async fn save_video(
        &self,
        _context: &dyn BrowsingContext,
        _submission_id: &str,
    ) -> Result<Option<String>> {
        Ok(None)
    }
}

/// 记录收到的失败信息，返回固定反馈
#[derive(Default)]
pub struct RecordingFeedback {
    pub failures: Mutex<Vec<(ScriptFailure, Option<String>)>>,
}

#[async_trait]
impl FeedbackGenerator for RecordingFeedback {
    async fn generate_feedback(&self, failure: &ScriptFailure, evidence_url: Option<&str>) -> Feedback {
        self.failures
            .lock()
            .unwrap()
            .push((failure.clone(), evidence_url.map(str::to_string)));
        Feedback {
            summary: format!("Failed: {}.", failure.error_message),
            suggestion: "Fix it.".to_string(),
            severity: None,
        }
    }
}

/// 测试环境
pub struct Harness {
    pub service: GradingService,
    pub browser: Arc<BrowserManager>,
    pub stats: Arc<Stats>,
    pub evidence: Arc<RecordingEvidence>,
    pub feedback: Arc<RecordingFeedback>,
}

impl Harness {
    pub fn new(settings: GradingSettings) -> Self {
        Self::with_evidence(settings, RecordingEvidence::default())
    }

    pub fn with_evidence(settings: GradingSettings, evidence: RecordingEvidence) -> Self {
        let stats = Arc::new(Stats::default());
        let browser = Arc::new(BrowserManager::new(
            Arc::new(FakeLauncher {
                stats: stats.clone(),
            }),
            LaunchOptions::default(),
            ContextOptions::default(),
        ));
        let evidence = Arc::new(evidence);
        let feedback = Arc::new(RecordingFeedback::default());
        let service = GradingService::new(
            browser.clone(),
            ScriptRunner::new(),
            evidence.clone(),
            feedback.clone(),
            settings,
        );
        Self {
            service,
            browser,
            stats,
            evidence,
            feedback,
        }
    }
}

/// 拼出包含若干测试的脚本
pub fn script(units: &[(&str, &str)]) -> String {
    units
        .iter()
        .map(|(name, body)| format!("test('{}', async ({{ page }}) => {{\n  {}\n}});\n", name, body))
        .collect()
}

pub fn request(submission_id: &str, target_url: &str, script_text: String) -> web_grader::GradingRequest {
    web_grader::GradingRequest {
        submission_id: submission_id.to_string(),
        target_url: target_url.to_string(),
        script_text,
        sub_task_names: None,
    }
}
