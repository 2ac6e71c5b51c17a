//! 节点注册表
//!
//! 根据流程配置创建输入/输出节点，并把宿主收到的消息路由到对应的输出节点

use hbgpio_core::{
    Envelope, FlowConfig, GpioError, InboundMessage, NodeConfig, PinMessage, ReportSender,
    Reporter, Result,
};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::hal::GpioAccess;
use crate::input::InputWatcher;
use crate::output::{OutputController, WriteOutcome};
use crate::pin_map::PinMap;

pub enum GpioNode {
    Input(InputWatcher),
    Output(OutputController),
}

impl GpioNode {
    pub fn node_id(&self) -> &str {
        match self {
            Self::Input(node) => node.node_id(),
            Self::Output(node) => node.node_id(),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Input(_) => "hb-gpio in",
            Self::Output(_) => "hb-gpio out",
        }
    }

    pub async fn close(&mut self) -> Result<()> {
        match self {
            Self::Input(node) => node.close().await,
            Self::Output(node) => node.close().await,
        }
    }
}

pub struct NodeRegistry {
    nodes: BTreeMap<String, GpioNode>,
    failed: Vec<String>,
}

impl NodeRegistry {
    /// 启动配置中的所有节点
    ///
    /// 单个节点创建失败只会被上报并记录，不影响其他节点。
    pub async fn start(
        flow: &FlowConfig,
        map: &PinMap,
        access: Arc<dyn GpioAccess>,
        outbound: mpsc::Sender<Envelope<PinMessage>>,
        reports: ReportSender,
    ) -> Self {
        let mut nodes = BTreeMap::new();
        let mut failed = Vec::new();

        for config in &flow.nodes {
            let reporter = Reporter::new(config.id(), reports.clone());
            let started = match config {
                NodeConfig::In(input) => {
                    InputWatcher::start(input, map, access.clone(), outbound.clone(), reporter)
                        .await
                        .map(GpioNode::Input)
                }
                NodeConfig::Out(output) => {
                    OutputController::start(output, map, access.clone(), reporter)
                        .await
                        .map(GpioNode::Output)
                }
            };

            match started {
                Ok(node) => {
                    nodes.insert(config.id().to_string(), node);
                }
                Err(_) => failed.push(config.id().to_string()),
            }
        }

        tracing::info!("已启动 {} 个节点，失败 {} 个", nodes.len(), failed.len());
        Self { nodes, failed }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn input_count(&self) -> usize {
        self.nodes
            .values()
            .filter(|node| matches!(node, GpioNode::Input(_)))
            .count()
    }

    pub fn node_ids(&self) -> Vec<&str> {
        self.nodes.keys().map(String::as_str).collect()
    }

    /// 创建失败的节点 id
    pub fn failed(&self) -> &[String] {
        &self.failed
    }

    pub fn get(&self, node_id: &str) -> Option<&GpioNode> {
        self.nodes.get(node_id)
    }

    pub async fn dispatch(&mut self, envelope: Envelope<InboundMessage>) -> Result<WriteOutcome> {
        match self.nodes.get_mut(&envelope.node_id) {
            Some(GpioNode::Output(controller)) if controller.is_closed() => {
                Err(GpioError::Closed(controller.physical_pin().0))
            }
            Some(GpioNode::Output(controller)) => Ok(controller.on_input(&envelope.message).await),
            Some(GpioNode::Input(_)) => Err(GpioError::Config(format!(
                "节点 {} 是输入节点，不接受消息",
                envelope.node_id
            ))),
            None => Err(GpioError::UnknownNode(envelope.node_id)),
        }
    }

    pub async fn close_all(&mut self) {
        for (id, node) in self.nodes.iter_mut() {
            if let Err(e) = node.close().await {
                tracing::warn!(node = %id, "关闭节点失败: {}", e);
            }
        }
        tracing::info!("所有节点已关闭");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{AccessCall, MockGpioAccess};
    use crate::pin_map::LogicalPin;
    use hbgpio_core::{InputNodeConfig, ReportLevel, report_channel};

    async fn start_example(mock: &MockGpioAccess) -> (NodeRegistry, hbgpio_core::ReportReceiver) {
        let mut flow = FlowConfig::example();
        let mut bad = InputNodeConfig::new(1);
        bad.id = "ground".to_string();
        flow.nodes.push(NodeConfig::In(bad));

        let (tx, _outbound) = mpsc::channel(16);
        let (report_tx, reports) = report_channel();
        let registry = NodeRegistry::start(
            &flow,
            PinMap::hummingboard(),
            Arc::new(mock.clone()),
            tx,
            report_tx,
        )
        .await;
        (registry, reports)
    }

    #[tokio::test]
    async fn test_start_example_flow() {
        let mock = MockGpioAccess::new().with_reads(&[0]);
        let (mut registry, mut reports) = start_example(&mock).await;

        assert_eq!(registry.len(), 3);
        assert_eq!(registry.input_count(), 1);
        assert_eq!(registry.node_ids(), vec!["button", "dimmer", "led"]);
        assert_eq!(registry.failed(), ["ground".to_string()]);
        assert_eq!(registry.get("button").map(|n| n.kind()), Some("hb-gpio in"));

        let report = reports.recv().await.unwrap();
        assert_eq!(report.node_id, "ground");
        assert_eq!(report.level, ReportLevel::Error);

        // led 配置了初始电平
        assert!(mock.calls().contains(&AccessCall::Write(LogicalPin(1), 0)));

        registry.close_all().await;
    }

    #[tokio::test]
    async fn test_dispatch_routes_to_outputs() {
        let mock = MockGpioAccess::new().with_reads(&[0]);
        let (mut registry, _reports) = start_example(&mock).await;

        let outcome = registry
            .dispatch(Envelope::new("dimmer", InboundMessage::new(300)))
            .await
            .unwrap();
        assert_eq!(outcome, WriteOutcome::Written(300));
        assert!(mock.calls().contains(&AccessCall::PwmWrite(LogicalPin(2), 300)));

        let err = registry
            .dispatch(Envelope::new("button", InboundMessage::new(1)))
            .await
            .unwrap_err();
        assert!(matches!(err, GpioError::Config(_)));

        let err = registry
            .dispatch(Envelope::new("missing", InboundMessage::new(1)))
            .await
            .unwrap_err();
        assert!(matches!(err, GpioError::UnknownNode(id) if id == "missing"));

        registry.close_all().await;
    }

    #[tokio::test]
    async fn test_close_all_releases_every_pin() {
        let mock = MockGpioAccess::new().with_reads(&[0]);
        let (mut registry, _reports) = start_example(&mock).await;

        registry.close_all().await;

        let closed: Vec<AccessCall> = mock
            .calls()
            .into_iter()
            .filter(|c| matches!(c, AccessCall::Close(_)))
            .collect();
        assert_eq!(
            closed,
            vec![
                AccessCall::Close(LogicalPin(0)),
                AccessCall::Close(LogicalPin(2)),
                AccessCall::Close(LogicalPin(1)),
            ]
        );

        let calls_before = mock.calls().len();
        let err = registry
            .dispatch(Envelope::new("led", InboundMessage::new(1)))
            .await
            .unwrap_err();
        assert!(matches!(err, GpioError::Closed(12)));
        assert_eq!(mock.calls().len(), calls_before);
    }
}
