//! 编排层（Orchestration Layer）
//!
//! ## 职责
//!
//! 本层负责评分流程调度，是整个系统的"指挥中心"。
//!
//! ## 层次关系
//!
//! ```text
//! api (HTTP 请求)
//!     ↓
//! orchestrator::GradingService (处理一个评分请求)
//!     ↓
//! script (解析 / 执行单个测试)    services (证据 / 反馈)
//!     ↓
//! browser + infrastructure (BrowserManager、JsExecutor)
//! ```
//!
//! ## 设计原则
//!
//! 1. **资源隔离**：每个请求独占一个上下文，每个测试独占一个页面
//! 2. **向下依赖**：编排层 → script / services → browser / infrastructure
//! 3. **无业务判断**：只做调度和汇总，通过与否由测试代码决定

pub mod grading;

// 重新导出主要类型
pub use grading::{GradingService, GradingSettings};
