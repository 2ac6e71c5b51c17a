//! 硬件抽象层 (HAL) 模块接口
//!
//! GPIO 访问被抽象为 `GpioAccess` trait，默认实现通过 `gpiohb` 命令行工具完成

pub mod command;
pub mod gpio;

pub use command::GpioCommand;
pub use gpio::{Edge, GpioAccess, PinLevel, PinMode};
