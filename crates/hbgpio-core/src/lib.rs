//! hbgpio Core - 核心类型和抽象
//!
//! 提供错误处理、节点配置、消息与上报通道等基础功能。

pub mod config;
pub mod error;
pub mod message;
pub mod report;

pub use config::*;
pub use error::*;
pub use message::*;
pub use report::*;
