//! 统一错误处理

use thiserror::Error;

#[derive(Error, Debug)]
pub enum GpioError {
    #[error("Invalid GPIO pin: {0}")]
    PinNotFound(u8),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Mode setup failed on pin {pin}: {reason}")]
    Setup { pin: u8, reason: String },

    #[error("IO error: {0}")]
    Io(String),

    #[error("Command `{command}` failed (exit code {code:?}): {stderr}")]
    Command {
        command: String,
        code: Option<i32>,
        stderr: String,
    },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Pin already closed: {0}")]
    Closed(u8),

    #[error("Unknown node: {0}")]
    UnknownNode(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// 错误分类，决定上层是否可以继续
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// 配置错误，节点无法创建
    Configuration,
    /// 模式设置失败，节点无法创建
    Setup,
    /// 运行期硬件访问失败
    Runtime,
    /// 用户输入不合法，仅告警
    Validation,
}

impl GpioError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::PinNotFound(_) | Self::Config(_) | Self::UnknownNode(_) | Self::Serialization(_) => {
                ErrorKind::Configuration
            }
            Self::Setup { .. } => ErrorKind::Setup,
            Self::Io(_) | Self::Command { .. } | Self::Closed(_) => ErrorKind::Runtime,
            Self::InvalidInput(_) => ErrorKind::Validation,
        }
    }

    /// 配置与模式设置错误会中止节点构造
    pub fn is_fatal(&self) -> bool {
        matches!(self.kind(), ErrorKind::Configuration | ErrorKind::Setup)
    }
}

impl From<std::io::Error> for GpioError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, GpioError>;
