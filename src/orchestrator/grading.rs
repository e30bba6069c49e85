//! 评分调度器 - 编排层
//!
//! ## 职责
//!
//! 把一个评分请求变成一个评分响应：
//!
//! ```text
//! 解析脚本 → (无测试: 失败) | 创建上下文并导航 → 调度测试 → 汇总结果
//! ```
//!
//! ## 设计特点
//!
//! - **从不返回错误**：所有失败都折叠进 `GradingResponse`
//! - **有界并发**：最多 `max_concurrent_tests` 个测试同时运行，任意一个完成后才放入下一个
//! - **顺序不变**：结果写入按解析顺序预分配的槽位，与完成顺序无关
//! - **整批截止时间**：超时则丢弃全部结果
//! - **资源释放**：每个测试的页面在测试结束时关闭，上下文在请求结束时关闭，
//!   浏览器单例从不在请求中关闭

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use futures::stream::{FuturesUnordered, StreamExt};
use tracing::{debug, error, info, warn};

use crate::browser::{BrowserManager, BrowserPage, BrowsingContext, ContextOverrides};
use crate::models::{GradingRequest, GradingResponse, GradingResultItem};
use crate::script::{parse_test_units, ExecutionOptions, ParsedTestUnit, ScriptRunner};
use crate::services::evidence::{self, EvidenceSink};
use crate::services::feedback::{FeedbackGenerator, ScriptFailure};
use crate::utils::{truncate_text, with_retry, RetryPolicy};

const NO_TEST_CASES: &str = "No test cases found in script";
const PASSED_FEEDBACK: &str = "Test passed";

/// 调度器设置
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GradingSettings {
    /// 整批测试的截止时间
    pub timeout: Duration,
    pub max_concurrent_tests: usize,
    /// 单个测试的超时
    pub test_timeout: Duration,
    /// 页面内单个动作的超时
    pub action_timeout: Duration,
    pub navigation_timeout: Duration,
    /// false 时顺序执行并复用同一个页面
    pub parallel: bool,
    pub record_video: bool,
    /// 导航重试策略
    pub retry: RetryPolicy,
}

impl Default for GradingSettings {
    fn default() -> Self {
        Self {
            timeout: Duration::from_millis(300_000),
            max_concurrent_tests: 5,
            test_timeout: Duration::from_millis(30_000),
            action_timeout: Duration::from_millis(5_000),
            navigation_timeout: Duration::from_millis(30_000),
            parallel: true,
            record_video: false,
            retry: RetryPolicy::default(),
        }
    }
}

/// 评分服务
///
/// 持有浏览器管理器和两个外部协作者（证据、反馈），可在多个请求间共享
pub struct GradingService {
    browser: Arc<BrowserManager>,
    runner: ScriptRunner,
    evidence: Arc<dyn EvidenceSink>,
    feedback: Arc<dyn FeedbackGenerator>,
    settings: GradingSettings,
}

impl GradingService {
    pub fn new(
        browser: Arc<BrowserManager>,
        runner: ScriptRunner,
        evidence: Arc<dyn EvidenceSink>,
        feedback: Arc<dyn FeedbackGenerator>,
        settings: GradingSettings,
    ) -> Self {
        Self {
            browser,
            runner,
            evidence,
            feedback,
            settings,
        }
    }

    /// 执行一次评分
    pub async fn grade(&self, request: GradingRequest) -> GradingResponse {
        let started = Instant::now();
        let submission_id = request.submission_id.clone();
        info!("[{}] 📝 开始评分: {}", submission_id, request.target_url);

        // 1. 解析脚本
        let units = parse_test_units(&request.script_text);
        if units.is_empty() {
            warn!("[{}] ⚠️ 脚本中没有找到测试用例", submission_id);
            return GradingResponse::failed(submission_id, NO_TEST_CASES);
        }
        info!("[{}] 📋 解析到 {} 个测试", submission_id, units.len());
        check_sub_task_names(&request, &units);

        // 2. 获取本次请求独占的上下文
        let overrides = ContextOverrides {
            record_video: Some(self.settings.record_video),
            ..Default::default()
        };
        let context = match self.browser.new_context(Some(overrides)).await {
            Ok(context) => context,
            Err(e) => {
                error!("[{}] ❌ 创建浏览上下文失败: {:#}", submission_id, e);
                return GradingResponse::failed(submission_id, format!("{:#}", e));
            }
        };

        let env = UnitEnv::new(self, &request);
        let mut response = env.grade_in_context(context.clone(), units).await;

        // 3. 无论结果如何都释放上下文
        if let Err(e) = context.close().await {
            warn!("[{}] 关闭浏览上下文失败: {:#}", submission_id, e);
        }
        if self.settings.record_video && !response.success {
            attach_recording(&*self.evidence, &*context, &mut response).await;
        }

        log_summary(&response, started.elapsed());
        response
    }
}

/// 单个请求内各测试共享的只读环境，可以复制进后台任务
#[derive(Clone)]
struct UnitEnv {
    submission_id: Arc<str>,
    target_url: Arc<str>,
    runner: ScriptRunner,
    evidence: Arc<dyn EvidenceSink>,
    feedback: Arc<dyn FeedbackGenerator>,
    settings: GradingSettings,
    /// 整批超时后置位，之后完成的测试不再调用证据和反馈
    cancelled: Arc<AtomicBool>,
}

impl UnitEnv {
    fn new(service: &GradingService, request: &GradingRequest) -> Self {
        Self {
            submission_id: Arc::from(request.submission_id.as_str()),
            target_url: Arc::from(request.target_url.as_str()),
            runner: service.runner,
            evidence: service.evidence.clone(),
            feedback: service.feedback.clone(),
            settings: service.settings,
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    fn execution_options(&self) -> ExecutionOptions {
        ExecutionOptions {
            timeout: self.settings.test_timeout,
            action_timeout: self.settings.action_timeout,
            // 证据由调度器通过 EvidenceSink 采集
            capture_on_error: false,
        }
    }

    /// 上下文已就绪后的评分流程；调用方负责关闭上下文
    async fn grade_in_context(
        &self,
        context: Arc<dyn BrowsingContext>,
        units: Vec<ParsedTestUnit>,
    ) -> GradingResponse {
        let submission_id = self.submission_id.to_string();

        // 准备页面：确认目标可访问，顺序模式下也用于执行测试
        let page = match context.new_page().await {
            Ok(page) => page,
            Err(e) => {
                error!("[{}] ❌ 创建页面失败: {:#}", submission_id, e);
                return GradingResponse::failed(submission_id, format!("{:#}", e));
            }
        };

        info!("[{}] 🌐 正在访问: {}", submission_id, self.target_url);
        if let Err(e) = self.navigate(&*page).await {
            error!("[{}] ❌ 访问目标页面失败: {:#}", submission_id, e);
            close_page(&*page, &submission_id, "准备页面").await;
            return GradingResponse::failed(submission_id, format!("{:#}", e));
        }

        let deadline = self.settings.timeout;
        let outcome = if self.settings.parallel {
            close_page(&*page, &submission_id, "准备页面").await;
            tokio::time::timeout(deadline, self.run_parallel(context, units)).await
        } else {
            let outcome = tokio::time::timeout(deadline, self.run_sequential(&*page, units)).await;
            close_page(&*page, &submission_id, "准备页面").await;
            outcome
        };

        match outcome {
            Ok(results) => GradingResponse::completed(submission_id, results),
            Err(_) => {
                self.cancelled.store(true, Ordering::SeqCst);
                error!(
                    "[{}] ⏰ 评分超时 ({}ms)，丢弃全部结果",
                    submission_id,
                    deadline.as_millis()
                );
                GradingResponse::failed(
                    submission_id,
                    format!("Grading timed out after {}ms", deadline.as_millis()),
                )
            }
        }
    }

    /// 带瞬时网络错误重试的导航
    async fn navigate(&self, page: &dyn BrowserPage) -> Result<()> {
        let url = &*self.target_url;
        let timeout = self.settings.navigation_timeout;
        with_retry(&self.settings.retry, || page.goto(url, timeout)).await
    }

    /// 有界并发执行
    ///
    /// 按解析顺序放入测试，在途数量达到上限时等待任意一个完成；
    /// 结果按原始下标写入预分配的槽位
    async fn run_parallel(
        &self,
        context: Arc<dyn BrowsingContext>,
        units: Vec<ParsedTestUnit>,
    ) -> Vec<GradingResultItem> {
        let limit = self.settings.max_concurrent_tests.max(1);
        let total = units.len();
        let names: Vec<String> = units.iter().map(|u| u.task_name.clone()).collect();
        let mut slots: Vec<Option<GradingResultItem>> = vec![None; total];
        let mut in_flight = FuturesUnordered::new();

        info!(
            "[{}] ⚡ 并行执行 {} 个测试 (最大并发数: {})",
            self.submission_id, total, limit
        );

        for (index, unit) in units.into_iter().enumerate() {
            if in_flight.len() >= limit {
                if let Some(joined) = in_flight.next().await {
                    store_result(&mut slots, joined, &self.submission_id);
                }
            }

            let env = self.clone();
            let context = context.clone();
            // 丢弃 JoinHandle 只会分离任务：整批超时后任务仍会自己关闭页面
            in_flight.push(tokio::spawn(async move {
                let item = env.run_isolated(&*context, unit).await;
                (index, item)
            }));
        }

        while let Some(joined) = in_flight.next().await {
            store_result(&mut slots, joined, &self.submission_id);
        }

        slots
            .into_iter()
            .zip(names)
            .map(|(slot, name)| slot.unwrap_or_else(|| crashed_item(name)))
            .collect()
    }

    /// 顺序执行，复用同一个页面
    async fn run_sequential(
        &self,
        page: &dyn BrowserPage,
        units: Vec<ParsedTestUnit>,
    ) -> Vec<GradingResultItem> {
        info!("[{}] 🐢 顺序执行 {} 个测试", self.submission_id, units.len());
        let mut results = Vec::with_capacity(units.len());
        for unit in units {
            results.push(self.run_unit(page, &unit).await);
        }
        results
    }

    /// 在独立页面中执行一个测试，页面在任何情况下都会关闭
    async fn run_isolated(&self, context: &dyn BrowsingContext, unit: ParsedTestUnit) -> GradingResultItem {
        let page = match context.new_page().await {
            Ok(page) => page,
            Err(e) => {
                warn!("[{}] [{}] 创建页面失败: {:#}", self.submission_id, unit.task_name, e);
                return self.failed_item(None, &unit, format!("{:#}", e)).await;
            }
        };

        let item = match self.navigate(&*page).await {
            Ok(()) => self.run_unit(&*page, &unit).await,
            Err(e) => {
                warn!("[{}] [{}] 导航失败: {:#}", self.submission_id, unit.task_name, e);
                self.failed_item(Some(&*page), &unit, format!("{:#}", e)).await
            }
        };

        close_page(&*page, &self.submission_id, &unit.task_name).await;
        item
    }

    /// 在已导航的页面上执行测试并生成结果条目
    async fn run_unit(&self, page: &dyn BrowserPage, unit: &ParsedTestUnit) -> GradingResultItem {
        debug!(
            "[{}] ▶️ 运行测试: {} | {}",
            self.submission_id,
            unit.task_name,
            truncate_text(&unit.code, 80)
        );

        let result = self
            .runner
            .execute(&unit.code, page, &self.execution_options())
            .await;

        if result.success {
            info!("[{}] ✅ {}", self.submission_id, unit.task_name);
            return GradingResultItem {
                task_name: unit.task_name.clone(),
                is_passed: true,
                feedback: Some(PASSED_FEEDBACK.to_string()),
            };
        }

        let message = result
            .error_message
            .unwrap_or_else(|| "Unknown error".to_string());
        info!(
            "[{}] ❌ {}: {}",
            self.submission_id,
            unit.task_name,
            truncate_text(&message, 120)
        );
        self.failed_item(Some(page), unit, message).await
    }

    /// 失败条目：采集证据并生成反馈，两者失败都只降级
    async fn failed_item(
        &self,
        page: Option<&dyn BrowserPage>,
        unit: &ParsedTestUnit,
        error_message: String,
    ) -> GradingResultItem {
        if self.cancelled.load(Ordering::SeqCst) {
            debug!(
                "[{}] [{}] 评分已超时，跳过证据和反馈",
                self.submission_id, unit.task_name
            );
            return GradingResultItem {
                task_name: unit.task_name.clone(),
                is_passed: false,
                feedback: Some(format!("Test failed: {}", error_message)),
            };
        }

        let mut evidence_urls = Vec::new();
        if let Some(page) = page {
            let task_id = evidence::task_id(&unit.task_name);
            match self
                .evidence
                .capture_screenshot(page, &self.submission_id, &task_id)
                .await
            {
                Ok(url) => evidence_urls.push(("Screenshot", url)),
                Err(e) => warn!("[{}] [{}] 保存截图失败: {:#}", self.submission_id, unit.task_name, e),
            }
            match self
                .evidence
                .capture_dom_snapshot(page, &self.submission_id, &task_id)
                .await
            {
                Ok(url) => evidence_urls.push(("DOM", url)),
                Err(e) => warn!("[{}] [{}] 保存 DOM 失败: {:#}", self.submission_id, unit.task_name, e),
            }
        }

        let failure = ScriptFailure {
            task_name: unit.task_name.clone(),
            code: unit.code.clone(),
            error_message,
        };
        let screenshot_url = evidence_urls
            .iter()
            .find(|(kind, _)| *kind == "Screenshot")
            .map(|(_, url)| url.as_str());
        let feedback = self
            .feedback
            .generate_feedback(&failure, screenshot_url)
            .await;

        let mut text = format!("{} {}", feedback.summary, feedback.suggestion);
        for (kind, url) in &evidence_urls {
            text.push_str(&format!("\n{}: {}", kind, url));
        }

        GradingResultItem {
            task_name: unit.task_name.clone(),
            is_passed: false,
            feedback: Some(text),
        }
    }
}

fn store_result(
    slots: &mut [Option<GradingResultItem>],
    joined: std::result::Result<(usize, GradingResultItem), tokio::task::JoinError>,
    submission_id: &str,
) {
    match joined {
        Ok((index, item)) => slots[index] = Some(item),
        // 任务 panic 时无法得知下标，对应槽位在汇总时补为失败
        Err(e) => error!("[{}] 测试任务异常退出: {}", submission_id, e),
    }
}

fn crashed_item(task_name: String) -> GradingResultItem {
    GradingResultItem {
        task_name,
        is_passed: false,
        feedback: Some("Test execution crashed".to_string()),
    }
}

async fn close_page(page: &dyn BrowserPage, submission_id: &str, label: &str) {
    if let Err(e) = page.close().await {
        debug!("[{}] [{}] 关闭页面失败: {:#}", submission_id, label, e);
    }
}

/// subTaskNames 只做提示：与解析结果不一致时记录警告
fn check_sub_task_names(request: &GradingRequest, units: &[ParsedTestUnit]) {
    let Some(expected) = &request.sub_task_names else {
        return;
    };
    for name in expected {
        if !units.iter().any(|u| &u.task_name == name) {
            warn!(
                "[{}] ⚠️ 子任务 \"{}\" 在脚本中没有对应的测试",
                request.submission_id, name
            );
        }
    }
    if expected.len() != units.len() {
        warn!(
            "[{}] ⚠️ 子任务数量 ({}) 与解析到的测试数量 ({}) 不一致",
            request.submission_id,
            expected.len(),
            units.len()
        );
    }
}

/// 把录像地址追加到失败条目的反馈中
async fn attach_recording(
    evidence: &dyn EvidenceSink,
    context: &dyn BrowsingContext,
    response: &mut GradingResponse,
) {
    match evidence.save_video(context, &response.submission_id).await {
        Ok(Some(url)) => {
            for item in response.results.iter_mut().filter(|r| !r.is_passed) {
                if let Some(feedback) = item.feedback.as_mut() {
                    feedback.push_str(&format!("\nRecording: {}", url));
                }
            }
        }
        Ok(None) => debug!("[{}] 没有录像", response.submission_id),
        Err(e) => warn!("[{}] 保存录像失败: {:#}", response.submission_id, e),
    }
}

fn log_summary(response: &GradingResponse, elapsed: Duration) {
    match &response.error_message {
        Some(message) => info!(
            "[{}] 🏁 评分失败 ({:.1}s): {}",
            response.submission_id,
            elapsed.as_secs_f64(),
            message
        ),
        None => info!(
            "[{}] 🏁 评分完成 ({:.1}s): {}/{} 通过",
            response.submission_id,
            elapsed.as_secs_f64(),
            response.passed_count(),
            response.results.len()
        ),
    }
}
