//! 节点消息定义

use serde::{Deserialize, Serialize};

/// 输入节点发出的电平变化通知
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PinMessage {
    pub topic: String,
    pub payload: u8,
}

impl PinMessage {
    pub fn new(topic: impl Into<String>, payload: u8) -> Self {
        Self {
            topic: topic.into(),
            payload,
        }
    }
}

/// 发往输出节点的写入请求
///
/// `payload` 可以是数字、布尔值或 `"true"` / `"false"` 等字符串。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InboundMessage {
    #[serde(default)]
    pub topic: Option<String>,
    #[serde(default)]
    pub payload: serde_json::Value,
}

impl InboundMessage {
    pub fn new(payload: impl Into<serde_json::Value>) -> Self {
        Self {
            topic: None,
            payload: payload.into(),
        }
    }
}

/// 带节点 id 的消息封装，用于宿主路由
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope<T> {
    pub node_id: String,
    #[serde(flatten)]
    pub message: T,
}

impl<T> Envelope<T> {
    pub fn new(node_id: impl Into<String>, message: T) -> Self {
        Self {
            node_id: node_id.into(),
            message,
        }
    }
}
