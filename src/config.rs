use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;

use crate::browser::LaunchOptions;
use crate::error::ConfigError;
use crate::orchestrator::GradingSettings;
use crate::utils::retry::RetryPolicy;

/// 未指定 `GRADER_CONFIG` 时尝试读取的配置文件
const DEFAULT_CONFIG_FILE: &str = "grader.toml";

/// 程序配置文件
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Config {
    /// HTTP 监听端口
    pub port: u16,
    // --- 评分配置 ---
    /// 整批测试的截止时间（毫秒）
    pub grading_timeout_ms: u64,
    /// 同时运行的测试数量
    pub max_concurrent_tests: usize,
    /// 单个测试的超时时间（毫秒）
    pub test_timeout_ms: u64,
    /// 页面内单个动作/断言的等待时间（毫秒）
    pub action_timeout_ms: u64,
    /// 导航到目标 URL 的超时时间（毫秒）
    pub navigation_timeout_ms: u64,
    /// 是否并行执行测试
    pub enable_parallel_execution: bool,
    // --- 浏览器配置 ---
    pub browser_headless: bool,
    pub enable_video_recording: bool,
    /// 设置后连接到已运行的浏览器，而不是启动新进程
    pub browser_debug_port: Option<u16>,
    pub chrome_executable: Option<String>,
    // --- 证据存储 ---
    pub evidence_dir: String,
    pub evidence_base_url: Option<String>,
    // --- LLM 配置 ---
    pub llm_api_key: Option<String>,
    pub llm_api_base_url: String,
    pub llm_model_name: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 8080,
            grading_timeout_ms: 300_000,
            max_concurrent_tests: 5,
            test_timeout_ms: 30_000,
            action_timeout_ms: 5_000,
            navigation_timeout_ms: 30_000,
            enable_parallel_execution: true,
            browser_headless: true,
            enable_video_recording: false,
            browser_debug_port: None,
            chrome_executable: None,
            evidence_dir: "evidence".to_string(),
            evidence_base_url: None,
            llm_api_key: None,
            llm_api_base_url: "https://generativelanguage.googleapis.com/v1beta/openai".to_string(),
            llm_model_name: "gemini-2.0-flash".to_string(),
        }
    }
}

impl Config {
    /// 加载配置：先读 TOML 文件（如存在），再用环境变量覆盖，最后校验
    pub fn load() -> Result<Self, ConfigError> {
        let path = std::env::var("GRADER_CONFIG").ok();
        let mut config = match path.as_deref() {
            Some(path) => Self::from_file(Path::new(path))?,
            None if Path::new(DEFAULT_CONFIG_FILE).exists() => {
                Self::from_file(Path::new(DEFAULT_CONFIG_FILE))?
            }
            None => Self::default(),
        };
        config.apply_env()?;
        config.validate()?;
        Ok(config)
    }

    /// 从 TOML 文件读取配置，缺省字段使用默认值
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::FileReadFailed {
            path: path.display().to_string(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::TomlParseFailed {
            path: path.display().to_string(),
            source,
        })
    }

    /// 用环境变量覆盖当前配置
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        override_from_env("PORT", &mut self.port)?;
        override_from_env("GRADING_TIMEOUT_MS", &mut self.grading_timeout_ms)?;
        override_from_env("MAX_CONCURRENT_TESTS", &mut self.max_concurrent_tests)?;
        override_from_env("TEST_TIMEOUT_MS", &mut self.test_timeout_ms)?;
        override_from_env("ACTION_TIMEOUT_MS", &mut self.action_timeout_ms)?;
        override_from_env("NAVIGATION_TIMEOUT_MS", &mut self.navigation_timeout_ms)?;
        override_from_env("ENABLE_PARALLEL_EXECUTION", &mut self.enable_parallel_execution)?;
        override_from_env("BROWSER_HEADLESS", &mut self.browser_headless)?;
        override_from_env("ENABLE_VIDEO_RECORDING", &mut self.enable_video_recording)?;
        override_optional_from_env("BROWSER_DEBUG_PORT", &mut self.browser_debug_port)?;
        override_optional_from_env("CHROME_EXECUTABLE", &mut self.chrome_executable)?;
        override_from_env("EVIDENCE_DIR", &mut self.evidence_dir)?;
        override_optional_from_env("EVIDENCE_BASE_URL", &mut self.evidence_base_url)?;
        override_optional_from_env("LLM_API_KEY", &mut self.llm_api_key)?;
        override_from_env("LLM_API_BASE_URL", &mut self.llm_api_base_url)?;
        override_from_env("LLM_MODEL_NAME", &mut self.llm_model_name)?;
        Ok(())
    }

    /// 校验取值范围
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_range("MAX_CONCURRENT_TESTS", self.max_concurrent_tests as u64, 1, 10)?;
        check_range("GRADING_TIMEOUT_MS", self.grading_timeout_ms, 1, u64::MAX)?;
        check_range("TEST_TIMEOUT_MS", self.test_timeout_ms, 1, u64::MAX)?;
        check_range("ACTION_TIMEOUT_MS", self.action_timeout_ms, 1, u64::MAX)?;
        check_range("NAVIGATION_TIMEOUT_MS", self.navigation_timeout_ms, 1, u64::MAX)?;
        Ok(())
    }

    /// 评分调度器使用的设置
    pub fn grading_settings(&self) -> GradingSettings {
        GradingSettings {
            timeout: Duration::from_millis(self.grading_timeout_ms),
            max_concurrent_tests: self.max_concurrent_tests,
            test_timeout: Duration::from_millis(self.test_timeout_ms),
            action_timeout: Duration::from_millis(self.action_timeout_ms),
            navigation_timeout: Duration::from_millis(self.navigation_timeout_ms),
            parallel: self.enable_parallel_execution,
            record_video: self.enable_video_recording,
            retry: RetryPolicy::default(),
        }
    }

    /// 浏览器启动参数
    pub fn launch_options(&self) -> LaunchOptions {
        LaunchOptions {
            headless: self.browser_headless,
            debug_port: self.browser_debug_port,
            executable: self.chrome_executable.as_ref().map(PathBuf::from),
            ..LaunchOptions::default()
        }
    }
}

fn override_from_env<T: FromStr>(var_name: &str, slot: &mut T) -> Result<(), ConfigError> {
    if let Ok(value) = std::env::var(var_name) {
        *slot = parse_env(var_name, &value)?;
    }
    Ok(())
}

fn override_optional_from_env<T: FromStr>(
    var_name: &str,
    slot: &mut Option<T>,
) -> Result<(), ConfigError> {
    match std::env::var(var_name) {
        Ok(value) if value.trim().is_empty() => *slot = None,
        Ok(value) => *slot = Some(parse_env(var_name, &value)?),
        Err(_) => {}
    }
    Ok(())
}

fn parse_env<T: FromStr>(var_name: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::EnvVarParseFailed {
        var_name: var_name.to_string(),
        value: value.to_string(),
        expected_type: std::any::type_name::<T>().to_string(),
    })
}

fn check_range(name: &str, value: u64, min: u64, max: u64) -> Result<(), ConfigError> {
    if value < min || value > max {
        return Err(ConfigError::OutOfRange {
            name: name.to_string(),
            value,
            min,
            max,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        tokio_test::assert_ok!(config.validate());

        let settings = config.grading_settings();
        assert_eq!(settings.timeout, Duration::from_secs(300));
        assert_eq!(settings.max_concurrent_tests, 5);
        assert_eq!(settings.test_timeout, Duration::from_secs(30));
        assert!(settings.parallel);
    }

    #[test]
    fn test_concurrency_out_of_range_is_rejected() {
        let mut config = Config::default();
        config.max_concurrent_tests = 0;
        assert!(matches!(config.validate(), Err(ConfigError::OutOfRange { .. })));

        config.max_concurrent_tests = 11;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_from_file_fills_missing_fields_with_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "max_concurrent_tests = 3\nenable_parallel_execution = false").unwrap();

        let config = Config::from_file(file.path()).unwrap();
        assert_eq!(config.max_concurrent_tests, 3);
        assert!(!config.enable_parallel_execution);
        assert_eq!(config.port, 8080);
        assert_eq!(config.evidence_dir, "evidence");
    }

    #[test]
    fn test_from_file_reports_parse_errors() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "max_concurrent_tests = \"many\"").unwrap();

        let err = Config::from_file(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::TomlParseFailed { .. }));
    }

    #[test]
    fn test_parse_env_reports_type() {
        let err = parse_env::<u64>("TEST_TIMEOUT_MS", "soon").unwrap_err();
        assert!(err.to_string().contains("TEST_TIMEOUT_MS"));
        assert!(err.to_string().contains("soon"));
    }
}
