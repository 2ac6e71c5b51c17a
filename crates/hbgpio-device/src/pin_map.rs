//! 引脚映射
//!
//! 物理排针引脚号与逻辑引脚号（WiringPi 编号，兼容 V1/V2）之间的双向映射表

use hbgpio_core::{GpioError, Result};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// 排针上的物理引脚号
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PhysicalPin(pub u8);

/// 底层 GPIO 工具使用的逻辑引脚号
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct LogicalPin(pub u8);

impl fmt::Display for PhysicalPin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for LogicalPin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// HummingBoard P1 排针，(物理, 逻辑)
const HUMMINGBOARD_PINS: &[(u8, u8)] = &[
    (3, 8),
    (5, 9),
    (7, 7),
    (8, 15),
    (10, 16),
    (11, 0),
    (12, 1),
    (13, 2),
    (15, 3),
    (16, 4),
    (18, 5),
    (19, 12),
    (21, 13),
    (22, 6),
    (23, 14),
    (24, 10),
    (26, 11),
    (27, 30),
    (28, 31),
    (29, 21),
    (31, 22),
    (32, 26),
    (33, 23),
    (35, 24),
    (36, 27),
    (37, 25),
    (38, 28),
    (40, 29),
];

static HUMMINGBOARD: Lazy<PinMap> = Lazy::new(|| {
    PinMap::from_pairs(HUMMINGBOARD_PINS).expect("HummingBoard pin table must be a bijection")
});

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum PinMapError {
    #[error("Physical pin mapped twice: {0}")]
    DuplicatePhysical(u8),
    #[error("Logical pin mapped twice: {0}")]
    DuplicateLogical(u8),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PinMap {
    physical_to_logical: BTreeMap<PhysicalPin, LogicalPin>,
    logical_to_physical: BTreeMap<LogicalPin, PhysicalPin>,
}

impl PinMap {
    pub fn hummingboard() -> &'static PinMap {
        &HUMMINGBOARD
    }

    /// 从 (物理, 逻辑) 列表构建映射，任一侧重复都会被拒绝
    pub fn from_pairs(pairs: &[(u8, u8)]) -> std::result::Result<Self, PinMapError> {
        let mut physical_to_logical = BTreeMap::new();
        let mut logical_to_physical = BTreeMap::new();

        for &(physical, logical) in pairs {
            if physical_to_logical
                .insert(PhysicalPin(physical), LogicalPin(logical))
                .is_some()
            {
                return Err(PinMapError::DuplicatePhysical(physical));
            }
            if logical_to_physical
                .insert(LogicalPin(logical), PhysicalPin(physical))
                .is_some()
            {
                return Err(PinMapError::DuplicateLogical(logical));
            }
        }

        Ok(Self {
            physical_to_logical,
            logical_to_physical,
        })
    }

    pub fn resolve(&self, physical: PhysicalPin) -> Result<LogicalPin> {
        self.physical_to_logical
            .get(&physical)
            .copied()
            .ok_or(GpioError::PinNotFound(physical.0))
    }

    pub fn physical_of(&self, logical: LogicalPin) -> Option<PhysicalPin> {
        self.logical_to_physical.get(&logical).copied()
    }

    /// 按物理引脚号升序遍历
    pub fn iter(&self) -> impl Iterator<Item = (PhysicalPin, LogicalPin)> + '_ {
        self.physical_to_logical.iter().map(|(p, l)| (*p, *l))
    }

    pub fn len(&self) -> usize {
        self.physical_to_logical.len()
    }

    pub fn is_empty(&self) -> bool {
        self.physical_to_logical.is_empty()
    }
}
