//! 健康检查命令

use anyhow::Result;
use hbgpio_core::{FlowConfig, NodeConfig};
use hbgpio_device::{GpioCommand, PhysicalPin, PinMap};
use std::path::Path;

/// 检查项结果
#[derive(Debug, Clone)]
pub struct CheckResult {
    pub name: String,
    pub status: CheckStatus,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CheckStatus {
    Ok,
    Warning,
    Error,
}

/// 运行健康检查
pub fn run(config_path: &Path) -> Result<()> {
    println!("\n🏥 hbgpio 健康检查\n");

    let flow = match FlowConfig::load(config_path) {
        Ok(flow) => Some(flow),
        Err(e) => {
            print_result(&CheckResult {
                name: "配置文件".to_string(),
                status: CheckStatus::Error,
                message: e.to_string(),
            });
            None
        }
    };

    let mut results = Vec::new();
    if let Some(flow) = &flow {
        results.push(check_config_file(config_path, flow));
        results.push(check_gpio_command(&flow.gpio_command));
        results.extend(check_pins(flow, PinMap::hummingboard()));
    }

    let mut error_count = usize::from(flow.is_none());
    let mut warn_count = 0;
    for result in &results {
        print_result(result);
        match result.status {
            CheckStatus::Ok => {}
            CheckStatus::Warning => warn_count += 1,
            CheckStatus::Error => error_count += 1,
        }
    }

    println!("\n{}", "─".repeat(50));
    println!("检查完成: {} 警告, {} 错误\n", warn_count, error_count);

    if error_count > 0 {
        println!("❌ 发现错误，请先解决上述问题后再运行 `hbgpio run`。");
    } else {
        println!("✅ 可以运行 `hbgpio run` 启动节点。");
    }

    Ok(())
}

fn print_result(result: &CheckResult) {
    let icon = match result.status {
        CheckStatus::Ok => "✅",
        CheckStatus::Warning => "⚠️",
        CheckStatus::Error => "❌",
    };
    println!("{} {}: {}", icon, result.name, result.message);
}

fn check_config_file(path: &Path, flow: &FlowConfig) -> CheckResult {
    if !path.exists() {
        return CheckResult {
            name: "配置文件".to_string(),
            status: CheckStatus::Warning,
            message: format!("{} 不存在，运行 `hbgpio init` 创建", path.display()),
        };
    }

    CheckResult {
        name: "配置文件".to_string(),
        status: CheckStatus::Ok,
        message: format!("{} 个节点", flow.nodes.len()),
    }
}

fn check_gpio_command(program: &Path) -> CheckResult {
    match GpioCommand::locate(program) {
        Ok(command) => CheckResult {
            name: "GPIO 命令".to_string(),
            status: CheckStatus::Ok,
            message: command.program().display().to_string(),
        },
        Err(e) => CheckResult {
            name: "GPIO 命令".to_string(),
            status: CheckStatus::Error,
            message: e.to_string(),
        },
    }
}

fn check_pins(flow: &FlowConfig, map: &PinMap) -> Vec<CheckResult> {
    let mut used = std::collections::HashMap::new();

    flow.nodes
        .iter()
        .map(|node| {
            let name = format!("节点 {}", node.id());
            let kind = match node {
                NodeConfig::In(_) => "输入",
                NodeConfig::Out(_) => "输出",
            };

            match map.resolve(PhysicalPin(node.pin())) {
                Err(e) => CheckResult {
                    name,
                    status: CheckStatus::Error,
                    message: e.to_string(),
                },
                Ok(logical) => match used.insert(node.pin(), node.id().to_string()) {
                    Some(other) => CheckResult {
                        name,
                        status: CheckStatus::Warning,
                        message: format!("物理引脚 {} 已被节点 {} 使用", node.pin(), other),
                    },
                    None => CheckResult {
                        name,
                        status: CheckStatus::Ok,
                        message: format!("{} 物理引脚 {} -> 逻辑引脚 {}", kind, node.pin(), logical),
                    },
                },
            }
        })
        .collect()
}
