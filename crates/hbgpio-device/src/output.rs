//! 输出控制节点
//!
//! 启动时设置引脚方向（数字输出或 PWM），之后对每个写入请求做类型转换与范围校验，
//! 合法的值写入引脚，非法的值只告警。

use futures::{Stream, StreamExt};
use hbgpio_core::{GpioError, InboundMessage, OutputMode, OutputNodeConfig, Reporter, Result};
use serde_json::Value;
use std::sync::Arc;

use crate::hal::{GpioAccess, PinMode};
use crate::pin_map::{LogicalPin, PhysicalPin, PinMap};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriveMode {
    Digital,
    Pwm,
}

impl DriveMode {
    /// 允许写入的最大值（含）
    pub fn max_level(&self) -> u16 {
        match self {
            Self::Digital => 1,
            Self::Pwm => 1023,
        }
    }

    pub fn pin_mode(&self) -> PinMode {
        match self {
            Self::Digital => PinMode::Out,
            Self::Pwm => PinMode::Pwm,
        }
    }

    pub fn accepts(&self, value: f64) -> bool {
        // NaN 不满足任何比较
        value >= 0.0 && value <= f64::from(self.max_level())
    }
}

impl From<OutputMode> for DriveMode {
    fn from(mode: OutputMode) -> Self {
        match mode {
            OutputMode::Out => Self::Digital,
            OutputMode::Pwm => Self::Pwm,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum WriteOutcome {
    Written(u16),
    /// 超出范围或无法转换为数字，未写入
    Rejected(f64),
    /// 访问失败，已上报
    Failed,
    Closed,
}

/// 把消息负载转换为数字
///
/// `"true"` / `"false"` 视为布尔值，布尔值转为 1 / 0，数字字符串按数字解析，
/// 空字符串与 null 为 0，其余为 NaN。
pub fn coerce_payload(payload: &Value) -> f64 {
    match payload {
        Value::Null => 0.0,
        Value::Bool(b) => f64::from(u8::from(*b)),
        Value::Number(n) => n.as_f64().unwrap_or(f64::NAN),
        Value::String(s) => match s.as_str() {
            "true" => 1.0,
            "false" => 0.0,
            other => {
                let trimmed = other.trim();
                if trimmed.is_empty() {
                    0.0
                } else {
                    trimmed.parse::<f64>().unwrap_or(f64::NAN)
                }
            }
        },
        Value::Array(_) | Value::Object(_) => f64::NAN,
    }
}

pub struct OutputController {
    node_id: String,
    physical: PhysicalPin,
    logical: LogicalPin,
    drive: DriveMode,
    level: Option<u16>,
    closed: bool,
    access: Arc<dyn GpioAccess>,
    reporter: Reporter,
}

impl OutputController {
    pub async fn start(
        config: &OutputNodeConfig,
        map: &PinMap,
        access: Arc<dyn GpioAccess>,
        reporter: Reporter,
    ) -> Result<Self> {
        let physical = PhysicalPin(config.pin);
        let logical = match map.resolve(physical) {
            Ok(pin) => pin,
            Err(e) => {
                reporter.error(&e);
                return Err(e);
            }
        };

        let drive = DriveMode::from(config.out);
        if let Err(e) = access.set_mode(logical, drive.pin_mode()).await {
            let err = GpioError::Setup {
                pin: physical.0,
                reason: e.to_string(),
            };
            reporter.error(&err);
            return Err(err);
        }

        let mut controller = Self {
            node_id: config.id.clone(),
            physical,
            logical,
            drive,
            level: None,
            closed: false,
            access,
            reporter,
        };

        // PWM 模式不写初始电平
        if drive == DriveMode::Digital {
            if let Some(level) = config.initial_level() {
                controller.apply_initial(level).await;
            }
        }

        tracing::info!(
            node = %controller.node_id,
            "输出节点已启动: 物理引脚 {} -> 逻辑引脚 {} ({})",
            physical,
            logical,
            drive.pin_mode()
        );
        Ok(controller)
    }

    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    pub fn physical_pin(&self) -> PhysicalPin {
        self.physical
    }

    pub fn logical_pin(&self) -> LogicalPin {
        self.logical
    }

    pub fn drive_mode(&self) -> DriveMode {
        self.drive
    }

    /// 最近一次成功写入的值
    pub fn current_level(&self) -> Option<u16> {
        self.level
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub async fn on_input(&mut self, message: &InboundMessage) -> WriteOutcome {
        if self.closed {
            tracing::debug!(node = %self.node_id, "节点已关闭，忽略输入");
            return WriteOutcome::Closed;
        }

        let value = coerce_payload(&message.payload);
        if !self.drive.accepts(value) {
            self.reporter.report(&GpioError::InvalidInput(value.to_string()));
            return WriteOutcome::Rejected(value);
        }

        // gpiohb 只接受整数
        self.apply(value.trunc() as u16).await
    }

    /// 依次处理流中的请求，流结束后释放引脚
    pub async fn consume<S>(&mut self, mut messages: S) -> Result<()>
    where
        S: Stream<Item = InboundMessage> + Unpin,
    {
        while let Some(message) = messages.next().await {
            self.on_input(&message).await;
        }
        self.close().await
    }

    pub async fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;

        if let Err(e) = self.access.close(self.logical).await {
            self.reporter.warn(format!("释放引脚 {} 失败: {}", self.logical, e));
        }

        tracing::info!(node = %self.node_id, "输出节点已关闭: 物理引脚 {}", self.physical);
        Ok(())
    }

    async fn apply_initial(&mut self, level: u8) {
        let level = u16::from(level);
        if level > self.drive.max_level() {
            self.reporter
                .report(&GpioError::InvalidInput(format!("initial level {}", level)));
            return;
        }
        self.apply(level).await;
    }

    async fn apply(&mut self, value: u16) -> WriteOutcome {
        let result = match self.drive {
            DriveMode::Digital => self.access.write(self.logical, value).await,
            DriveMode::Pwm => self.access.pwm_write(self.logical, value).await,
        };

        match result {
            Ok(()) => {
                tracing::debug!(node = %self.node_id, "引脚 {} 写入 {}", self.logical, value);
                self.level = Some(value);
                WriteOutcome::Written(value)
            }
            Err(e) => {
                self.reporter.error(&e);
                WriteOutcome::Failed
            }
        }
    }
}
