//! 节点状态上报
//!
//! 节点的错误与告警都会写入日志，同时发送到宿主提供的上报通道。

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::{ErrorKind, GpioError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportLevel {
    Info,
    Warn,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeReport {
    pub node_id: String,
    pub level: ReportLevel,
    pub message: String,
    pub timestamp: i64,
}

pub type ReportSender = mpsc::UnboundedSender<NodeReport>;
pub type ReportReceiver = mpsc::UnboundedReceiver<NodeReport>;

pub fn report_channel() -> (ReportSender, ReportReceiver) {
    mpsc::unbounded_channel()
}

#[derive(Debug, Clone)]
pub struct Reporter {
    node_id: String,
    tx: Option<ReportSender>,
}

impl Reporter {
    pub fn new(node_id: impl Into<String>, tx: ReportSender) -> Self {
        Self {
            node_id: node_id.into(),
            tx: Some(tx),
        }
    }

    /// 只写日志，不发送到通道
    pub fn detached(node_id: impl Into<String>) -> Self {
        Self {
            node_id: node_id.into(),
            tx: None,
        }
    }

    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    pub fn error(&self, err: &GpioError) {
        tracing::error!(node = %self.node_id, kind = ?err.kind(), "{}", err);
        self.send(ReportLevel::Error, err.to_string());
    }

    /// 按错误分类上报，输入校验错误只告警
    pub fn report(&self, err: &GpioError) {
        match err.kind() {
            ErrorKind::Validation => {
                tracing::warn!(node = %self.node_id, kind = ?err.kind(), "{}", err);
                self.send(ReportLevel::Warn, err.to_string());
            }
            _ => self.error(err),
        }
    }

    pub fn warn(&self, message: impl Into<String>) {
        let message = message.into();
        tracing::warn!(node = %self.node_id, "{}", message);
        self.send(ReportLevel::Warn, message);
    }

    pub fn info(&self, message: impl Into<String>) {
        let message = message.into();
        tracing::info!(node = %self.node_id, "{}", message);
        self.send(ReportLevel::Info, message);
    }

    fn send(&self, level: ReportLevel, message: String) {
        let Some(tx) = &self.tx else {
            return;
        };

        let report = NodeReport {
            node_id: self.node_id.clone(),
            level,
            message,
            timestamp: chrono::Utc::now().timestamp_millis(),
        };

        if tx.send(report).is_err() {
            tracing::debug!(node = %self.node_id, "上报通道已关闭");
        }
    }
}
