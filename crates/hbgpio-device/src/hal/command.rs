//! `gpiohb` 命令行适配
//!
//! 每个原语对应一次 `gpiohb <op> <pin> [arg]` 调用

use async_trait::async_trait;
use hbgpio_core::{GpioError, Result};
use std::path::{Path, PathBuf};
use tokio::process::Command;

use super::gpio::{Edge, GpioAccess, PinLevel, PinMode};
use crate::pin_map::LogicalPin;

pub use hbgpio_core::DEFAULT_GPIO_COMMAND;

#[derive(Debug, Clone)]
pub struct GpioCommand {
    program: PathBuf,
}

impl GpioCommand {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// 检查命令是否存在，不存在时节点无法工作
    pub fn locate(program: impl Into<PathBuf>) -> Result<Self> {
        let program = program.into();
        if !program.exists() {
            return Err(GpioError::Config(format!(
                "Can't find {} command for Hummingboard",
                program.display()
            )));
        }
        Ok(Self::new(program))
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    async fn exec(&self, args: &[String]) -> Result<String> {
        let command_line = format!("{} {}", self.program.display(), args.join(" "));
        tracing::trace!("执行 {}", command_line);

        // wfi 可能一直阻塞，future 被丢弃时必须结束子进程
        let output = Command::new(&self.program)
            .args(args)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| GpioError::Io(format!("{}: {}", command_line, e)))?;

        if !output.status.success() {
            return Err(GpioError::Command {
                command: command_line,
                code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }
}

impl Default for GpioCommand {
    fn default() -> Self {
        Self::new(DEFAULT_GPIO_COMMAND)
    }
}

#[async_trait]
impl GpioAccess for GpioCommand {
    async fn set_mode(&self, pin: LogicalPin, mode: PinMode) -> Result<()> {
        self.exec(&["mode".to_string(), pin.to_string(), mode.to_string()])
            .await
            .map(|_| ())
    }

    async fn read(&self, pin: LogicalPin) -> Result<PinLevel> {
        let stdout = self.exec(&["read".to_string(), pin.to_string()]).await?;
        PinLevel::parse(&stdout)
    }

    async fn wait_for_edge(&self, pin: LogicalPin, edge: Edge) -> Result<()> {
        self.exec(&[
            "wfi".to_string(),
            pin.to_string(),
            edge.as_str().to_string(),
        ])
        .await
        .map(|_| ())
    }

    async fn write(&self, pin: LogicalPin, value: u16) -> Result<()> {
        self.exec(&["write".to_string(), pin.to_string(), value.to_string()])
            .await
            .map(|_| ())
    }

    async fn pwm_write(&self, pin: LogicalPin, value: u16) -> Result<()> {
        self.exec(&["pwm".to_string(), pin.to_string(), value.to_string()])
            .await
            .map(|_| ())
    }

    async fn close(&self, pin: LogicalPin) -> Result<()> {
        self.exec(&["close".to_string(), pin.to_string()])
            .await
            .map(|_| ())
    }
}
