//! GPIO 接口
//!
//! 节点只通过以下六个原语访问硬件

use async_trait::async_trait;
use hbgpio_core::{GpioError, InputMode, OutputMode, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::pin_map::LogicalPin;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PinMode {
    In,
    Out,
    Pwm,
    PullUp,
    PullDown,
}

impl PinMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::In => "in",
            Self::Out => "out",
            Self::Pwm => "pwm",
            Self::PullUp => "pullup",
            Self::PullDown => "pulldown",
        }
    }
}

impl fmt::Display for PinMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<InputMode> for PinMode {
    fn from(mode: InputMode) -> Self {
        match mode {
            InputMode::In => Self::In,
            InputMode::PullUp => Self::PullUp,
            InputMode::PullDown => Self::PullDown,
        }
    }
}

impl From<OutputMode> for PinMode {
    fn from(mode: OutputMode) -> Self {
        match mode {
            OutputMode::Out => Self::Out,
            OutputMode::Pwm => Self::Pwm,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Edge {
    Rising,
    Falling,
    Both,
}

impl Edge {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Rising => "rising",
            Self::Falling => "falling",
            Self::Both => "both",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PinLevel {
    Low,
    High,
}

impl PinLevel {
    /// 0 为低电平，其他任意值为高电平
    pub fn from_raw(value: i64) -> Self {
        if value == 0 { Self::Low } else { Self::High }
    }

    pub fn parse(output: &str) -> Result<Self> {
        output
            .trim()
            .parse::<i64>()
            .map(Self::from_raw)
            .map_err(|_| GpioError::Io(format!("unexpected pin value: {:?}", output.trim())))
    }

    pub fn as_u8(&self) -> u8 {
        match self {
            Self::Low => 0,
            Self::High => 1,
        }
    }
}

#[async_trait]
pub trait GpioAccess: Send + Sync {
    async fn set_mode(&self, pin: LogicalPin, mode: PinMode) -> Result<()>;

    async fn read(&self, pin: LogicalPin) -> Result<PinLevel>;

    /// 阻塞直到出现指定边沿或出错
    async fn wait_for_edge(&self, pin: LogicalPin, edge: Edge) -> Result<()>;

    async fn write(&self, pin: LogicalPin, value: u16) -> Result<()>;

    async fn pwm_write(&self, pin: LogicalPin, value: u16) -> Result<()>;

    /// 尽力释放引脚，失败只需记录
    async fn close(&self, pin: LogicalPin) -> Result<()>;
}
