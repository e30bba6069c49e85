//! 基础设施层
//!
//! 持有稀缺资源（Page），只暴露"在页面里执行 JS"的能力

pub mod harness;
pub mod js_executor;

pub use js_executor::JsExecutor;
