//! 页面内测试脚手架
//!
//! `harness.js` 提供仿 Playwright 的 `page` 对象和 `expect` 断言，
//! 并用 AsyncFunction 构造器把测试代码编译成只以二者为自由变量的异步函数。

use std::time::Duration;

use anyhow::Result;

const HARNESS_SOURCE: &str = include_str!("harness.js");

/// 组装在页面中执行单个测试单元的脚本
///
/// 测试代码以 JSON 字符串形式嵌入，由脚手架在页面内编译
pub fn build_unit_script(code: &str, action_timeout: Duration) -> Result<String> {
    Ok(format!(
        "(async () => {{\n    const runUnit = {harness};\n    return await runUnit({timeout}, {code});\n}})()",
        harness = HARNESS_SOURCE.trim(),
        timeout = action_timeout.as_millis(),
        code = serde_json::to_string(code)?,
    ))
}
