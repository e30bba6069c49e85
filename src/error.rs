use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

/// 应用程序错误类型（HTTP 层）
#[derive(Debug, Error)]
pub enum AppError {
    /// 请求参数不合法
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    /// 评分任务异常退出
    #[error("internal error: {0}")]
    Internal(String),
}

/// 浏览器相关错误
#[derive(Debug, Error)]
pub enum BrowserError {
    /// 启动浏览器失败
    #[error("failed to launch browser: {source}")]
    LaunchFailed {
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// 连接浏览器失败
    #[error("failed to connect to browser on port {port}: {source}")]
    ConnectionFailed {
        port: u16,
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// 创建浏览上下文失败
    #[error("failed to create browsing context: {source}")]
    ContextCreationFailed {
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// 创建页面失败
    #[error("failed to create page: {source}")]
    PageCreationFailed {
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// 导航失败，message 保留底层原因（如 net::ERR_NAME_NOT_RESOLVED）
    #[error("navigation to {url} failed: {message}")]
    NavigationFailed { url: String, message: String },
    /// 导航超时
    #[error("Navigation timeout of {timeout_ms}ms exceeded while loading {url}")]
    NavigationTimeout { url: String, timeout_ms: u64 },
    /// 浏览器配置失败
    #[error("invalid browser configuration: {message}")]
    ConfigurationFailed { message: String },
}

/// 配置错误
#[derive(Debug, Error)]
pub enum ConfigError {
    /// 环境变量解析失败
    #[error("environment variable {var_name} has value '{value}' which is not a valid {expected_type}")]
    EnvVarParseFailed {
        var_name: String,
        value: String,
        expected_type: String,
    },
    /// 读取配置文件失败
    #[error("failed to read config file {path}: {source}")]
    FileReadFailed {
        path: String,
        source: std::io::Error,
    },
    /// TOML 解析失败
    #[error("failed to parse config file {path}: {source}")]
    TomlParseFailed {
        path: String,
        source: toml::de::Error,
    },
    /// 数值超出允许范围
    #[error("{name} must be between {min} and {max}, got {value}")]
    OutOfRange {
        name: String,
        value: u64,
        min: u64,
        max: u64,
    },
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self {
            AppError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

// ========== 便捷构造函数 ==========

impl BrowserError {
    /// 创建浏览器启动错误
    pub fn launch_failed(source: impl std::error::Error + Send + Sync + 'static) -> Self {
        BrowserError::LaunchFailed {
            source: Box::new(source),
        }
    }

    /// 创建浏览器连接错误
    pub fn connection_failed(port: u16, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        BrowserError::ConnectionFailed {
            port,
            source: Box::new(source),
        }
    }

    /// 创建上下文错误
    pub fn context_failed(source: impl std::error::Error + Send + Sync + 'static) -> Self {
        BrowserError::ContextCreationFailed {
            source: Box::new(source),
        }
    }

    /// 创建页面错误
    pub fn page_failed(source: impl std::error::Error + Send + Sync + 'static) -> Self {
        BrowserError::PageCreationFailed {
            source: Box::new(source),
        }
    }
}

// ========== Result 类型别名 ==========

/// 应用程序结果类型
pub type AppResult<T> = Result<T, AppError>;
