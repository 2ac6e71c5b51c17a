//! 输入监视节点
//!
//! 硬件没有可用的边沿中断时，用“读取当前值”与“阻塞等待边沿”交替来近似，
//! 并对重复的电平去重，只有真实的变化才会发出通知。
//!
//! 每个节点一个 tokio 任务，任务独占引脚状态；关闭时先取消挂起的等待，再释放引脚。

use hbgpio_core::{Envelope, GpioError, InputMode, InputNodeConfig, PinMessage, Reporter, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock, mpsc, watch};
use tokio::task::JoinHandle;

use crate::hal::{Edge, GpioAccess, PinLevel, PinMode};
use crate::pin_map::{LogicalPin, PhysicalPin, PinMap};

/// 最近一次观测到的电平
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LastObserved {
    /// 尚未读取，首次读取的值不发送
    Uninitialized,
    /// 尚未读取，首次读取的值也要发送
    AwaitingFirstRead,
    Known(PinLevel),
}

impl LastObserved {
    pub fn initial(emit_first: bool) -> Self {
        if emit_first {
            Self::AwaitingFirstRead
        } else {
            Self::Uninitialized
        }
    }

    /// 记录新值，需要通知时返回该值
    pub fn observe(&mut self, level: PinLevel) -> Option<PinLevel> {
        let previous = std::mem::replace(self, Self::Known(level));
        match previous {
            Self::Uninitialized => None,
            Self::AwaitingFirstRead => Some(level),
            Self::Known(prev) if prev == level => None,
            Self::Known(_) => Some(level),
        }
    }

    pub fn level(&self) -> Option<PinLevel> {
        match self {
            Self::Known(level) => Some(*level),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatcherState {
    ModeSet,
    AwaitingFirstRead,
    Active,
    /// 读取或等待失败，轮询已停止
    Halted,
    Closed,
}

pub struct InputWatcher {
    node_id: String,
    physical: PhysicalPin,
    logical: LogicalPin,
    mode: InputMode,
    topic: String,
    state: Arc<RwLock<WatcherState>>,
    last: Arc<RwLock<LastObserved>>,
    shutdown: watch::Sender<bool>,
    task: Mutex<Option<JoinHandle<()>>>,
    access: Arc<dyn GpioAccess>,
    reporter: Reporter,
}

impl InputWatcher {
    /// 解析引脚、设置输入模式并启动轮询任务
    ///
    /// 引脚无法解析或模式设置失败时上报错误并返回，不会重试。
    pub async fn start(
        config: &InputNodeConfig,
        map: &PinMap,
        access: Arc<dyn GpioAccess>,
        outbound: mpsc::Sender<Envelope<PinMessage>>,
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

        let mode = PinMode::from(config.intype);
        if let Err(e) = access.set_mode(logical, mode).await {
            let err = GpioError::Setup {
                pin: physical.0,
                reason: e.to_string(),
            };
            reporter.error(&err);
            return Err(err);
        }

        let topic = format!("pi/{}", map.physical_of(logical).unwrap_or(physical));
        let state = Arc::new(RwLock::new(WatcherState::ModeSet));
        let last = Arc::new(RwLock::new(LastObserved::initial(config.read)));
        let (shutdown, shutdown_rx) = watch::channel(false);

        let poll = PollLoop {
            node_id: config.id.clone(),
            logical,
            topic: topic.clone(),
            wait_timeout: config.wait_timeout_ms.map(Duration::from_millis),
            access: access.clone(),
            outbound,
            reporter: reporter.clone(),
            state: state.clone(),
            last: last.clone(),
        };
        let handle = tokio::spawn(poll.run(shutdown_rx));

        tracing::info!(
            node = %config.id,
            "输入节点已启动: 物理引脚 {} -> 逻辑引脚 {} ({})",
            physical,
            logical,
            mode
        );

        Ok(Self {
            node_id: config.id.clone(),
            physical,
            logical,
            mode: config.intype,
            topic,
            state,
            last,
            shutdown,
            task: Mutex::new(Some(handle)),
            access,
            reporter,
        })
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

    pub fn mode(&self) -> InputMode {
        self.mode
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub async fn state(&self) -> WatcherState {
        *self.state.read().await
    }

    pub async fn last_observed(&self) -> LastObserved {
        *self.last.read().await
    }

    /// 取消挂起的等待并释放引脚，重复调用无副作用
    pub async fn close(&self) -> Result<()> {
        let Some(handle) = self.task.lock().await.take() else {
            tracing::debug!(node = %self.node_id, "输入节点已关闭");
            return Ok(());
        };

        let _ = self.shutdown.send(true);
        if let Err(e) = handle.await {
            if e.is_panic() {
                self.reporter
                    .error(&GpioError::Io(format!("轮询任务异常退出: {}", e)));
            }
        }
        *self.state.write().await = WatcherState::Closed;

        if let Err(e) = self.access.close(self.logical).await {
            self.reporter.warn(format!("释放引脚 {} 失败: {}", self.logical, e));
        }

        tracing::info!(node = %self.node_id, "输入节点已关闭: 物理引脚 {}", self.physical);
        Ok(())
    }
}

struct PollLoop {
    node_id: String,
    logical: LogicalPin,
    topic: String,
    wait_timeout: Option<Duration>,
    access: Arc<dyn GpioAccess>,
    outbound: mpsc::Sender<Envelope<PinMessage>>,
    reporter: Reporter,
    state: Arc<RwLock<WatcherState>>,
    last: Arc<RwLock<LastObserved>>,
}

impl PollLoop {
    async fn run(self, mut shutdown: watch::Receiver<bool>) {
        *self.state.write().await = WatcherState::AwaitingFirstRead;

        loop {
            if *shutdown.borrow() {
                return;
            }

            let read = tokio::select! {
                biased;
                _ = shutdown.changed() => return,
                r = self.access.read(self.logical) => r,
            };

            let level = match read {
                Ok(level) => level,
                Err(e) => return self.halt(e).await,
            };

            let change = self.last.write().await.observe(level);
            *self.state.write().await = WatcherState::Active;

            if let Some(level) = change {
                tracing::debug!(node = %self.node_id, "{} -> {}", self.topic, level.as_u8());
                let message = Envelope::new(
                    self.node_id.clone(),
                    PinMessage::new(self.topic.clone(), level.as_u8()),
                );
                tokio::select! {
                    biased;
                    _ = shutdown.changed() => return,
                    sent = self.outbound.send(message) => {
                        if sent.is_err() {
                            tracing::debug!(node = %self.node_id, "消息通道已关闭");
                        }
                    }
                }
            }

            let waited = tokio::select! {
                biased;
                _ = shutdown.changed() => return,
                r = self.wait_for_edge() => r,
            };

            if let Err(e) = waited {
                return self.halt(e).await;
            }
        }
    }

    async fn wait_for_edge(&self) -> Result<()> {
        let wait = self.access.wait_for_edge(self.logical, Edge::Both);
        let Some(timeout) = self.wait_timeout else {
            return wait.await;
        };

        match tokio::time::timeout(timeout, wait).await {
            Ok(result) => result,
            Err(_) => {
                tracing::trace!(node = %self.node_id, "等待边沿超时，重新读取");
                Ok(())
            }
        }
    }

    async fn halt(&self, err: GpioError) {
        self.reporter.error(&err);
        *self.state.write().await = WatcherState::Halted;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{AccessCall, MockGpioAccess};
    use hbgpio_core::{NodeReport, ReportLevel, ReportReceiver, report_channel};

    type Outbound = mpsc::Receiver<Envelope<PinMessage>>;

    struct Harness {
        mock: MockGpioAccess,
        outbound: Outbound,
        reports: ReportReceiver,
    }

    async fn start_watcher(
        config: InputNodeConfig,
        mock: MockGpioAccess,
    ) -> (Result<InputWatcher>, Harness) {
        let (tx, outbound) = mpsc::channel(16);
        let (report_tx, reports) = report_channel();
        let watcher = InputWatcher::start(
            &config,
            PinMap::hummingboard(),
            Arc::new(mock.clone()),
            tx,
            Reporter::new(config.id.clone(), report_tx),
        )
        .await;

        (
            watcher,
            Harness {
                mock,
                outbound,
                reports,
            },
        )
    }

    fn config(pin: u8, read: bool) -> InputNodeConfig {
        let mut config = InputNodeConfig::new(pin);
        config.id = "button".to_string();
        config.read = read;
        config
    }

    async fn next_payload(outbound: &mut Outbound) -> u8 {
        tokio::time::timeout(Duration::from_secs(1), outbound.recv())
            .await
            .expect("timed out waiting for message")
            .expect("channel closed")
            .message
            .payload
    }

    async fn next_report(reports: &mut ReportReceiver) -> NodeReport {
        tokio::time::timeout(Duration::from_secs(1), reports.recv())
            .await
            .expect("timed out waiting for report")
            .expect("channel closed")
    }

    async fn assert_quiet(outbound: &mut Outbound) {
        let next = tokio::time::timeout(Duration::from_millis(50), outbound.recv()).await;
        assert!(next.is_err(), "unexpected message: {:?}", next);
    }

    async fn wait_until(mock: &MockGpioAccess, call: AccessCall) {
        tokio::time::timeout(Duration::from_secs(1), async {
            while !mock.calls().contains(&call) {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("call never issued");
    }

    fn count_differing_pairs(values: &[u8]) -> usize {
        values.windows(2).filter(|w| w[0] != w[1]).count()
    }

    #[test]
    fn test_observe_suppresses_first_read() {
        let mut last = LastObserved::initial(false);
        assert_eq!(last.observe(PinLevel::High), None);
        assert_eq!(last.level(), Some(PinLevel::High));
        assert_eq!(last.observe(PinLevel::High), None);
        assert_eq!(last.observe(PinLevel::Low), Some(PinLevel::Low));
    }

    #[test]
    fn test_observe_emits_first_read() {
        let mut last = LastObserved::initial(true);
        assert_eq!(last.level(), None);
        assert_eq!(last.observe(PinLevel::Low), Some(PinLevel::Low));
        assert_eq!(last.observe(PinLevel::Low), None);
    }

    #[test]
    fn test_observe_counts_transitions() {
        let sequences: [&[u8]; 5] = [
            &[0, 0, 1, 0],
            &[1, 1, 1, 1],
            &[0, 1, 0, 1, 0, 1],
            &[1],
            &[0, 0, 0, 1, 1, 0, 0],
        ];

        for values in sequences {
            let mut last = LastObserved::initial(false);
            let emitted = values
                .iter()
                .filter_map(|v| last.observe(PinLevel::from_raw(*v as i64)))
                .count();
            assert_eq!(emitted, count_differing_pairs(values), "sequence {:?}", values);

            let mut last = LastObserved::initial(true);
            let emitted = values
                .iter()
                .filter_map(|v| last.observe(PinLevel::from_raw(*v as i64)))
                .count();
            assert_eq!(emitted, count_differing_pairs(values) + 1, "sequence {:?}", values);
        }
    }

    #[tokio::test]
    async fn test_emits_only_transitions() {
        let mock = MockGpioAccess::new().with_reads(&[0, 0, 1, 0]);
        let (watcher, mut h) = start_watcher(config(11, false), mock).await;
        let watcher = watcher.unwrap();

        assert_eq!(watcher.logical_pin(), LogicalPin(0));
        assert_eq!(watcher.topic(), "pi/11");

        let first = tokio::time::timeout(Duration::from_secs(1), h.outbound.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(first.node_id, "button");
        assert_eq!(first.message, PinMessage::new("pi/11", 1));
        assert_eq!(next_payload(&mut h.outbound).await, 0);
        assert_quiet(&mut h.outbound).await;

        assert_eq!(h.mock.read_count(), 4);
        assert_eq!(watcher.state().await, WatcherState::Active);
        assert_eq!(watcher.last_observed().await, LastObserved::Known(PinLevel::Low));

        watcher.close().await.unwrap();
        assert_eq!(h.mock.calls().last(), Some(&AccessCall::Close(LogicalPin(0))));
    }

    #[tokio::test]
    async fn test_emits_initial_value_when_configured() {
        let mock = MockGpioAccess::new().with_reads(&[1, 1, 0]);
        let (watcher, mut h) = start_watcher(config(12, true), mock).await;
        let watcher = watcher.unwrap();

        assert_eq!(next_payload(&mut h.outbound).await, 1);
        assert_eq!(next_payload(&mut h.outbound).await, 0);
        assert_quiet(&mut h.outbound).await;

        watcher.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_sets_configured_mode_and_waits_on_both_edges() {
        let mut cfg = config(13, false);
        cfg.intype = InputMode::PullDown;
        let mock = MockGpioAccess::new().with_reads(&[0]);
        let (watcher, h) = start_watcher(cfg, mock).await;
        let watcher = watcher.unwrap();

        wait_until(&h.mock, AccessCall::WaitForEdge(LogicalPin(2), Edge::Both)).await;
        assert_eq!(
            h.mock.calls()[..2],
            [
                AccessCall::SetMode(LogicalPin(2), PinMode::PullDown),
                AccessCall::Read(LogicalPin(2)),
            ]
        );

        watcher.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_unknown_pin_reports_config_error() {
        let (watcher, mut h) = start_watcher(config(1, false), MockGpioAccess::new()).await;

        assert!(matches!(watcher, Err(GpioError::PinNotFound(1))));
        let report = next_report(&mut h.reports).await;
        assert_eq!(report.level, ReportLevel::Error);
        assert_eq!(report.message, "Invalid GPIO pin: 1");
        assert!(h.mock.calls().is_empty());
    }

    #[tokio::test]
    async fn test_mode_failure_is_fatal() {
        let mock = MockGpioAccess::new().with_reads(&[0]);
        mock.set_fail_mode(true);
        let (watcher, mut h) = start_watcher(config(11, false), mock).await;

        assert!(matches!(watcher, Err(GpioError::Setup { pin: 11, .. })));
        assert_eq!(next_report(&mut h.reports).await.level, ReportLevel::Error);

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(
            h.mock.calls(),
            vec![AccessCall::SetMode(LogicalPin(0), PinMode::In)]
        );
    }

    #[tokio::test]
    async fn test_read_failure_halts_loop() {
        let mock = MockGpioAccess::new().with_reads(&[0]);
        mock.push_read_error("read failed");
        mock.release_edge();
        let (watcher, mut h) = start_watcher(config(11, false), mock).await;
        let watcher = watcher.unwrap();

        let report = next_report(&mut h.reports).await;
        assert_eq!(report.level, ReportLevel::Error);
        assert_eq!(report.message, "IO error: read failed");

        // 失败后不再等待、不再读取
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(watcher.state().await, WatcherState::Halted);
        assert_eq!(
            h.mock.calls().last(),
            Some(&AccessCall::Read(LogicalPin(0)))
        );
        assert_eq!(h.mock.read_count(), 2);

        watcher.close().await.unwrap();
        assert_eq!(watcher.state().await, WatcherState::Closed);
        assert_eq!(h.mock.calls().last(), Some(&AccessCall::Close(LogicalPin(0))));
    }

    #[tokio::test]
    async fn test_wait_failure_halts_loop() {
        let mock = MockGpioAccess::new().with_reads(&[1, 0]);
        mock.set_fail_wait(true);
        let (watcher, mut h) = start_watcher(config(11, false), mock).await;
        let watcher = watcher.unwrap();

        let report = next_report(&mut h.reports).await;
        assert_eq!(report.message, "IO error: Mock wait error");

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(watcher.state().await, WatcherState::Halted);
        assert_eq!(h.mock.read_count(), 1);
        assert_eq!(h.mock.pending_reads(), 1);
        assert_quiet(&mut h.outbound).await;
    }

    #[tokio::test]
    async fn test_close_cancels_pending_wait() {
        let mock = MockGpioAccess::new().with_reads(&[0]);
        let (watcher, mut h) = start_watcher(config(11, false), mock).await;
        let watcher = watcher.unwrap();

        wait_until(&h.mock, AccessCall::WaitForEdge(LogicalPin(0), Edge::Both)).await;
        watcher.close().await.unwrap();
        assert_eq!(watcher.state().await, WatcherState::Closed);

        // 关闭后即使边沿到达也不能再访问引脚
        h.mock.push_read(1);
        h.mock.release_edge();
        tokio::time::sleep(Duration::from_millis(20)).await;

        let calls = h.mock.calls();
        assert_eq!(calls.last(), Some(&AccessCall::Close(LogicalPin(0))));
        assert_eq!(h.mock.read_count(), 1);
        assert_quiet(&mut h.outbound).await;

        watcher.close().await.unwrap();
        assert_eq!(h.mock.calls().len(), calls.len());
    }

    #[tokio::test]
    async fn test_close_failure_is_reported_as_warning() {
        let mock = MockGpioAccess::new().with_reads(&[0]);
        mock.set_fail_close(true);
        let (watcher, mut h) = start_watcher(config(11, false), mock).await;
        let watcher = watcher.unwrap();

        assert!(watcher.close().await.is_ok());
        let report = next_report(&mut h.reports).await;
        assert_eq!(report.level, ReportLevel::Warn);
    }

    #[tokio::test]
    async fn test_wait_timeout_triggers_reread() {
        let mut cfg = config(11, false);
        cfg.wait_timeout_ms = Some(10);
        // 没有放行任何边沿，只能靠超时重新读取
        let mock = MockGpioAccess::new();
        mock.push_read(0);
        mock.push_read(1);
        let (watcher, mut h) = start_watcher(cfg, mock).await;
        let watcher = watcher.unwrap();

        assert_eq!(next_payload(&mut h.outbound).await, 1);

        watcher.close().await.unwrap();
    }
}
