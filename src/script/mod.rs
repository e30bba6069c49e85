//! 测试脚本层
//!
//! - `parser` 把一整段脚本拆成有序的具名测试单元
//! - `runner` 在限定时间内执行单个测试单元

pub mod parser;
pub mod runner;

pub use parser::{parse_test_units, ParsedTestUnit};
pub use runner::{ExecutionOptions, ExecutionResult, ScriptRunner};
