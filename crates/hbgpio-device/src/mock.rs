//! 脚本化的 GPIO 访问实现
//!
//! 读取结果按顺序预先设定；每次等待边沿消耗一个许可，许可用完后等待会一直挂起，
//! 直到测试调用 `release_edge`。

use async_trait::async_trait;
use hbgpio_core::{GpioError, Result};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Semaphore;

use crate::hal::{Edge, GpioAccess, PinLevel, PinMode};
use crate::pin_map::LogicalPin;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccessCall {
    SetMode(LogicalPin, PinMode),
    Read(LogicalPin),
    WaitForEdge(LogicalPin, Edge),
    Write(LogicalPin, u16),
    PwmWrite(LogicalPin, u16),
    Close(LogicalPin),
}

#[derive(Clone)]
pub struct MockGpioAccess {
    calls: Arc<Mutex<Vec<AccessCall>>>,
    reads: Arc<Mutex<VecDeque<std::result::Result<PinLevel, String>>>>,
    edges: Arc<Semaphore>,
    fail_mode: Arc<AtomicBool>,
    fail_wait: Arc<AtomicBool>,
    fail_writes: Arc<AtomicBool>,
    fail_close: Arc<AtomicBool>,
}

impl Default for MockGpioAccess {
    fn default() -> Self {
        Self::new()
    }
}

impl MockGpioAccess {
    pub fn new() -> Self {
        Self {
            calls: Arc::new(Mutex::new(Vec::new())),
            reads: Arc::new(Mutex::new(VecDeque::new())),
            edges: Arc::new(Semaphore::new(0)),
            fail_mode: Arc::new(AtomicBool::new(false)),
            fail_wait: Arc::new(AtomicBool::new(false)),
            fail_writes: Arc::new(AtomicBool::new(false)),
            fail_close: Arc::new(AtomicBool::new(false)),
        }
    }

    /// 预设读取序列，并放行足够的边沿让所有值都被读到
    pub fn with_reads(self, values: &[u8]) -> Self {
        for value in values {
            self.push_read(*value);
        }
        self.edges.add_permits(values.len().saturating_sub(1));
        self
    }

    pub fn push_read(&self, value: u8) {
        self.reads
            .lock()
            .unwrap()
            .push_back(Ok(PinLevel::from_raw(value as i64)));
    }

    pub fn push_read_error(&self, message: impl Into<String>) {
        self.reads.lock().unwrap().push_back(Err(message.into()));
    }

    pub fn release_edge(&self) {
        self.edges.add_permits(1);
    }

    pub fn set_fail_mode(&self, fail: bool) {
        self.fail_mode.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_wait(&self, fail: bool) {
        self.fail_wait.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_close(&self, fail: bool) {
        self.fail_close.store(fail, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<AccessCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn read_count(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, AccessCall::Read(_)))
            .count()
    }

    pub fn pending_reads(&self) -> usize {
        self.reads.lock().unwrap().len()
    }

    fn record(&self, call: AccessCall) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl GpioAccess for MockGpioAccess {
    async fn set_mode(&self, pin: LogicalPin, mode: PinMode) -> Result<()> {
        self.record(AccessCall::SetMode(pin, mode));
        if self.fail_mode.load(Ordering::SeqCst) {
            return Err(GpioError::Io("Mock mode error".to_string()));
        }
        Ok(())
    }

    async fn read(&self, pin: LogicalPin) -> Result<PinLevel> {
        self.record(AccessCall::Read(pin));
        match self.reads.lock().unwrap().pop_front() {
            Some(Ok(level)) => Ok(level),
            Some(Err(message)) => Err(GpioError::Io(message)),
            None => Err(GpioError::Io("Mock read exhausted".to_string())),
        }
    }

    async fn wait_for_edge(&self, pin: LogicalPin, edge: Edge) -> Result<()> {
        self.record(AccessCall::WaitForEdge(pin, edge));
        if self.fail_wait.load(Ordering::SeqCst) {
            return Err(GpioError::Io("Mock wait error".to_string()));
        }

        let permit = self
            .edges
            .acquire()
            .await
            .map_err(|e| GpioError::Io(e.to_string()))?;
        permit.forget();
        Ok(())
    }

    async fn write(&self, pin: LogicalPin, value: u16) -> Result<()> {
        self.record(AccessCall::Write(pin, value));
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(GpioError::Io("Mock write error".to_string()));
        }
        Ok(())
    }

    async fn pwm_write(&self, pin: LogicalPin, value: u16) -> Result<()> {
        self.record(AccessCall::PwmWrite(pin, value));
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(GpioError::Io("Mock pwm error".to_string()));
        }
        Ok(())
    }

    async fn close(&self, pin: LogicalPin) -> Result<()> {
        self.record(AccessCall::Close(pin));
        if self.fail_close.load(Ordering::SeqCst) {
            return Err(GpioError::Io("Mock close error".to_string()));
        }
        Ok(())
    }
}
