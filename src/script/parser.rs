//! 脚本解析器
//!
//! 查找 `test('<名称>', async ({ page }) => {` 形式的声明，
//! 再从函数体的左花括号开始逐字符计数 `{` / `}` 深度，深度回到 0 处即为函数体结尾。
//!
//! 计数不识别字符串、模板字符串和注释：函数体内字面量或注释里出现的花括号
//! 会让该单元的边界错位，这是已知限制。

use std::sync::LazyLock;

use regex::Regex;
use tracing::{debug, info, warn};

static TEST_DECLARATION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"test\s*\(\s*['"]([^'"]+)['"]\s*,\s*async\s*\(\s*\{\s*page\s*\}\s*\)\s*=>\s*\{"#)
        .expect("test declaration pattern is valid")
});

/// 解析出的测试单元
///
/// `code` 是未编译的源码片段，执行时才在页面中编译
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedTestUnit {
    pub task_name: String,
    pub code: String,
}

/// 从脚本中按出现顺序提取全部测试单元
///
/// 找不到时返回空列表；函数体未闭合的声明会被跳过
pub fn parse_test_units(script: &str) -> Vec<ParsedTestUnit> {
    let mut units = Vec::new();

    for captures in TEST_DECLARATION.captures_iter(script) {
        let (Some(header), Some(name)) = (captures.get(0), captures.get(1)) else {
            continue;
        };
        let task_name = name.as_str().to_string();

        match find_body_end(script, header.end()) {
            Some(body_end) => {
                let code = script[header.end()..body_end].trim().to_string();
                debug!("解析到测试: {}", task_name);
                units.push(ParsedTestUnit { task_name, code });
            }
            None => warn!("测试 '{}' 的函数体未闭合，已跳过", task_name),
        }
    }

    info!("从脚本中解析出 {} 个测试", units.len());
    units
}

/// 从 `start`（左花括号之后）开始计数，返回匹配的右花括号位置
fn find_body_end(script: &str, start: usize) -> Option<usize> {
    let mut depth = 1usize;
    for (offset, byte) in script.as_bytes()[start..].iter().enumerate() {
        match byte {
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(start + offset);
                }
            }
            _ => {}
        }
    }
    None
}
