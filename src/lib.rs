//! # Web Grader
//!
//! 一个用于自动评分前端作业的 Rust 服务：把提交的浏览器自动化测试脚本
//! 拆分成具名测试，在共享的无头浏览器中逐个执行，返回每个测试的通过情况和反馈
//!
//! ## 架构设计
//!
//! 本系统采用分层架构：
//!
//! ### ① 基础设施层（Infrastructure）
//! - `browser/` - 浏览器能力接口与 chromiumoxide 实现，`BrowserManager` 持有浏览器单例
//! - `infrastructure/` - `JsExecutor` 与页面内测试运行时（harness）
//!
//! ### ② 脚本层（Script）
//! - `script/parser` - 把脚本拆成有序的 `ParsedTestUnit`
//! - `script/runner` - 在超时限制内执行单个测试
//!
//! ### ③ 业务能力层（Services）
//! - `EvidenceSink` - 保存截图、DOM、录像
//! - `FeedbackGenerator` - 为失败的测试生成反馈（LLM 或默认文案）
//!
//! ### ④ 编排层（Orchestration）
//! - `orchestrator/grading` - 评分调度：导航、有界并发、结果排序、整批超时
//!
//! ### ⑤ 接口层（API）
//! - `api/` - axum 路由：`POST /grade`、`GET /health`
//!
//! ## 模块结构

pub mod api;
pub mod browser;
pub mod config;
pub mod error;
pub mod infrastructure;
pub mod models;
pub mod orchestrator;
pub mod script;
pub mod services;
pub mod utils;

// 重新导出常用类型
pub use browser::{BrowserManager, ChromiumLauncher};
pub use config::Config;
pub use error::{AppError, AppResult};
pub use infrastructure::JsExecutor;
pub use models::{GradingRequest, GradingResponse, GradingResultItem};
pub use orchestrator::{GradingService, GradingSettings};
pub use script::{parse_test_units, ParsedTestUnit, ScriptRunner};
