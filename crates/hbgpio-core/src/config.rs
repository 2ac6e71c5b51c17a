//! 配置管理
//!
//! 流程配置文件描述要启动的 GPIO 节点，格式为 JSON：
//!
//! ```json
//! {
//!   "gpio_command": "/usr/local/bin/gpiohb",
//!   "nodes": [
//!     { "type": "hb-gpio in", "id": "button", "pin": 11, "intype": "pullup" },
//!     { "type": "hb-gpio out", "id": "led", "pin": 12, "out": "out", "set": true, "level": 1 }
//!   ]
//! }
//! ```

use serde::{Deserialize, Deserializer, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::{GpioError, Result};

pub const DEFAULT_GPIO_COMMAND: &str = "/usr/local/bin/gpiohb";

/// 输入引脚模式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InputMode {
    #[default]
    In,
    #[serde(alias = "up")]
    PullUp,
    #[serde(alias = "down")]
    PullDown,
}

/// 输出引脚模式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputMode {
    #[default]
    Out,
    Pwm,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputNodeConfig {
    #[serde(default = "new_node_id")]
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    /// 物理引脚号（排针位置）
    #[serde(deserialize_with = "deserialize_pin")]
    pub pin: u8,
    #[serde(default)]
    pub intype: InputMode,
    /// 为 true 时首次读取的值也会发送
    #[serde(default)]
    pub read: bool,
    /// 等待边沿的超时时间，超时后重新读取
    #[serde(default)]
    pub wait_timeout_ms: Option<u64>,
}

impl InputNodeConfig {
    pub fn new(pin: u8) -> Self {
        Self {
            id: new_node_id(),
            name: None,
            pin,
            intype: InputMode::default(),
            read: false,
            wait_timeout_ms: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputNodeConfig {
    #[serde(default = "new_node_id")]
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(deserialize_with = "deserialize_pin")]
    pub pin: u8,
    #[serde(default)]
    pub out: OutputMode,
    /// 是否在启动时写入初始电平（仅数字输出）
    #[serde(default)]
    pub set: bool,
    #[serde(default, deserialize_with = "deserialize_level")]
    pub level: u8,
}

impl OutputNodeConfig {
    pub fn new(pin: u8, out: OutputMode) -> Self {
        Self {
            id: new_node_id(),
            name: None,
            pin,
            out,
            set: false,
            level: 0,
        }
    }

    pub fn initial_level(&self) -> Option<u8> {
        self.set.then_some(self.level)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum NodeConfig {
    #[serde(rename = "hb-gpio in")]
    In(InputNodeConfig),
    #[serde(rename = "hb-gpio out")]
    Out(OutputNodeConfig),
}

impl NodeConfig {
    pub fn id(&self) -> &str {
        match self {
            Self::In(c) => &c.id,
            Self::Out(c) => &c.id,
        }
    }

    pub fn pin(&self) -> u8 {
        match self {
            Self::In(c) => c.pin,
            Self::Out(c) => c.pin,
        }
    }
}

fn new_node_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Node-RED 导出的流程里数字字段常以字符串保存（`"pin": "11"`）
#[derive(Deserialize)]
#[serde(untagged)]
enum NumberOrString {
    Number(u64),
    String(String),
}

fn deserialize_pin<'de, D>(deserializer: D) -> std::result::Result<u8, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error;

    match NumberOrString::deserialize(deserializer)? {
        NumberOrString::Number(n) => u8::try_from(n).map_err(D::Error::custom),
        NumberOrString::String(s) => s.trim().parse::<u8>().map_err(D::Error::custom),
    }
}

/// 缺省、null 与空字符串都视为 0
fn deserialize_level<'de, D>(deserializer: D) -> std::result::Result<u8, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error;

    match Option::<NumberOrString>::deserialize(deserializer)? {
        None => Ok(0),
        Some(NumberOrString::Number(n)) => u8::try_from(n).map_err(D::Error::custom),
        Some(NumberOrString::String(s)) if s.trim().is_empty() => Ok(0),
        Some(NumberOrString::String(s)) => s.trim().parse::<u8>().map_err(D::Error::custom),
    }
}

fn default_gpio_command() -> PathBuf {
    PathBuf::from(DEFAULT_GPIO_COMMAND)
}

/// 流程配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowConfig {
    #[serde(default = "default_gpio_command")]
    pub gpio_command: PathBuf,
    #[serde(default)]
    pub nodes: Vec<NodeConfig>,
}

impl Default for FlowConfig {
    fn default() -> Self {
        Self {
            gpio_command: default_gpio_command(),
            nodes: vec![],
        }
    }
}

impl FlowConfig {
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)
            .map_err(|e| GpioError::Config(format!("读取配置失败: {}", e)))?;

        let config: Self = serde_json::from_str(&content)
            .map_err(|e| GpioError::Config(format!("解析配置失败: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| GpioError::Config(format!("创建目录失败: {}", e)))?;
        }

        let content = serde_json::to_string_pretty(self)?;

        fs::write(path, content)
            .map_err(|e| GpioError::Config(format!("写入配置失败: {}", e)))?;

        Ok(())
    }

    pub fn default_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".hbgpio")
            .join("flow.json")
    }

    /// 节点 id 必须唯一，否则消息无法路由
    pub fn validate(&self) -> Result<()> {
        let mut seen = std::collections::HashSet::new();
        for node in &self.nodes {
            if !seen.insert(node.id()) {
                return Err(GpioError::Config(format!("节点 id 重复: {}", node.id())));
            }
        }
        Ok(())
    }

    /// `init` 命令写出的示例配置
    pub fn example() -> Self {
        let mut button = InputNodeConfig::new(11);
        button.id = "button".to_string();
        button.intype = InputMode::PullUp;

        let mut led = OutputNodeConfig::new(12, OutputMode::Out);
        led.id = "led".to_string();
        led.set = true;

        let mut dimmer = OutputNodeConfig::new(13, OutputMode::Pwm);
        dimmer.id = "dimmer".to_string();

        Self {
            gpio_command: default_gpio_command(),
            nodes: vec![
                NodeConfig::In(button),
                NodeConfig::Out(led),
                NodeConfig::Out(dimmer),
            ],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_flow_config() {
        let json = r#"{
            "nodes": [
                { "type": "hb-gpio in", "id": "button", "pin": 11, "intype": "up", "read": true },
                { "type": "hb-gpio out", "id": "dimmer", "pin": 12, "out": "pwm" }
            ]
        }"#;

        let config: FlowConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.gpio_command, PathBuf::from(DEFAULT_GPIO_COMMAND));
        assert_eq!(config.nodes.len(), 2);

        match &config.nodes[0] {
            NodeConfig::In(input) => {
                assert_eq!(input.pin, 11);
                assert_eq!(input.intype, InputMode::PullUp);
                assert!(input.read);
                assert_eq!(input.wait_timeout_ms, None);
            }
            other => panic!("unexpected node: {:?}", other),
        }

        match &config.nodes[1] {
            NodeConfig::Out(output) => {
                assert_eq!(output.out, OutputMode::Pwm);
                assert_eq!(output.initial_level(), None);
            }
            other => panic!("unexpected node: {:?}", other),
        }
    }

    #[test]
    fn test_node_defaults() {
        let json = r#"{ "type": "hb-gpio out", "pin": 7 }"#;
        let node: NodeConfig = serde_json::from_str(json).unwrap();

        assert!(!node.id().is_empty());
        assert_eq!(node.pin(), 7);
        match node {
            NodeConfig::Out(output) => {
                assert_eq!(output.out, OutputMode::Out);
                assert!(!output.set);
                assert_eq!(output.level, 0);
            }
            other => panic!("unexpected node: {:?}", other),
        }
    }

    #[test]
    fn test_string_pin_and_level_accepted() {
        let json = r#"{
            "nodes": [
                { "type": "hb-gpio in", "id": "button", "pin": "11", "intype": "pullup" },
                { "type": "hb-gpio out", "id": "led", "pin": "12", "set": true, "level": "1" },
                { "type": "hb-gpio out", "id": "relay", "pin": 13, "set": true, "level": "" }
            ]
        }"#;

        let config: FlowConfig = serde_json::from_str(json).unwrap();
        let pins: Vec<u8> = config.nodes.iter().map(NodeConfig::pin).collect();
        assert_eq!(pins, vec![11, 12, 13]);

        let levels: Vec<Option<u8>> = config
            .nodes
            .iter()
            .filter_map(|node| match node {
                NodeConfig::Out(output) => Some(output.initial_level()),
                NodeConfig::In(_) => None,
            })
            .collect();
        assert_eq!(levels, vec![Some(1), Some(0)]);
    }

    #[test]
    fn test_malformed_pin_rejected() {
        for pin in [r#""abc""#, "300", "-1"] {
            let json = format!(r#"{{ "type": "hb-gpio in", "pin": {} }}"#, pin);
            assert!(serde_json::from_str::<NodeConfig>(&json).is_err(), "pin {}", pin);
        }
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let mut config = FlowConfig::example();
        let first = config.nodes[0].clone();
        config.nodes.push(first);

        assert!(matches!(config.validate(), Err(GpioError::Config(_))));
    }

    #[test]
    fn test_load_missing_returns_default() {
        let dir = tempfile::tempdir().unwrap();
        let config = FlowConfig::load(&dir.path().join("missing.json")).unwrap();
        assert!(config.nodes.is_empty());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("flow.json");

        FlowConfig::example().save(&path).unwrap();
        let loaded = FlowConfig::load(&path).unwrap();

        let ids: Vec<&str> = loaded.nodes.iter().map(|n| n.id()).collect();
        assert_eq!(ids, vec!["button", "led", "dimmer"]);
    }

    #[test]
    fn test_load_invalid_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("flow.json");
        fs::write(&path, "{ not json").unwrap();

        assert!(matches!(FlowConfig::load(&path), Err(GpioError::Config(_))));
    }
}
