//! hbgpio Device - HummingBoard GPIO 节点
//!
//! 提供物理/逻辑引脚映射、GPIO 访问接口、输入监视节点与输出控制节点

pub mod hal;
pub mod input;
pub mod nodes;
pub mod output;
pub mod pin_map;

#[cfg(any(test, feature = "testing"))]
pub mod mock;

pub use hal::{Edge, GpioAccess, GpioCommand, PinLevel, PinMode};
pub use input::{InputWatcher, LastObserved, WatcherState};
pub use nodes::{GpioNode, NodeRegistry};
pub use output::{DriveMode, OutputController, WriteOutcome, coerce_payload};
pub use pin_map::{LogicalPin, PhysicalPin, PinMap, PinMapError};
