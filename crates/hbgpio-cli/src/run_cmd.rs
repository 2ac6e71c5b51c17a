//! Run 命令
//!
//! 启动流程中的所有节点：标准输入读取 `{"node_id": ..., "payload": ...}` 形式的写入请求，
//! 输入节点的电平变化以 JSON 行写到标准输出。

use anyhow::Result;
use hbgpio_core::{Envelope, FlowConfig, InboundMessage, report_channel};
use hbgpio_device::{GpioAccess, GpioCommand, NodeRegistry, PinMap};
use serde::Serialize;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;

pub async fn run(config_path: &Path, gpio_command: Option<PathBuf>, print_reports: bool) -> Result<()> {
    let flow = FlowConfig::load(config_path)?;
    if flow.nodes.is_empty() {
        tracing::warn!("配置中没有节点: {}", config_path.display());
    }

    let program = gpio_command.unwrap_or_else(|| flow.gpio_command.clone());
    let gpio = GpioCommand::locate(program)?;

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("无法监听中断信号: {}", e);
            std::future::pending::<()>().await;
        }
    };

    serve(
        &flow,
        Arc::new(gpio),
        tokio::io::stdin(),
        tokio::io::stdout(),
        print_reports,
        shutdown,
    )
    .await
}

pub(crate) async fn serve<R, W, F>(
    flow: &FlowConfig,
    access: Arc<dyn GpioAccess>,
    input: R,
    mut output: W,
    print_reports: bool,
    shutdown: F,
) -> Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
    F: Future<Output = ()>,
{
    let (out_tx, mut out_rx) = mpsc::channel(64);
    let (report_tx, mut report_rx) = report_channel();
    let mut registry =
        NodeRegistry::start(flow, PinMap::hummingboard(), access, out_tx, report_tx).await;

    // 按字节切分，非 UTF-8 的行按无法解析的消息处理
    let mut lines = BufReader::new(input).split(b'\n');
    let mut input_open = true;
    let mut failure: Option<anyhow::Error> = None;
    tokio::pin!(shutdown);

    loop {
        // 没有输入节点时，标准输入关闭即可退出
        if !input_open && registry.input_count() == 0 {
            break;
        }

        tokio::select! {
            _ = &mut shutdown => {
                tracing::info!("收到退出信号");
                break;
            }
            Some(message) = out_rx.recv() => {
                if let Err(e) = write_line(&mut output, &message).await {
                    tracing::error!("写入标准输出失败: {}", e);
                    failure = Some(e);
                    break;
                }
            }
            Some(report) = report_rx.recv() => {
                if print_reports {
                    let line = serde_json::json!({ "report": report });
                    if let Err(e) = write_line(&mut output, &line).await {
                        tracing::error!("写入标准输出失败: {}", e);
                        failure = Some(e);
                        break;
                    }
                }
            }
            line = lines.next_segment(), if input_open => {
                match line {
                    Ok(Some(bytes)) => handle_line(&mut registry, &String::from_utf8_lossy(&bytes)).await,
                    Ok(None) => {
                        tracing::debug!("标准输入已关闭");
                        input_open = false;
                    }
                    Err(e) => {
                        tracing::error!("读取标准输入失败: {}", e);
                        failure = Some(e.into());
                        break;
                    }
                }
            }
            else => break,
        }
    }

    // 出错退出时同样要释放所有引脚
    registry.close_all().await;
    drop(registry);

    // 关闭前已产生的通知仍需输出
    while let Some(message) = out_rx.recv().await {
        if failure.is_some() {
            continue;
        }
        if let Err(e) = write_line(&mut output, &message).await {
            failure = Some(e);
        }
    }

    match failure {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

async fn handle_line(registry: &mut NodeRegistry, line: &str) {
    let line = line.trim();
    if line.is_empty() {
        return;
    }

    let envelope: Envelope<InboundMessage> = match serde_json::from_str(line) {
        Ok(envelope) => envelope,
        Err(e) => {
            tracing::warn!("无法解析输入消息: {}", e);
            return;
        }
    };

    let node_id = envelope.node_id.clone();
    match registry.dispatch(envelope).await {
        Ok(outcome) => tracing::debug!(node = %node_id, "{:?}", outcome),
        Err(e) => tracing::warn!(node = %node_id, "{}", e),
    }
}

async fn write_line<W, T>(output: &mut W, value: &T) -> Result<()>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let mut line = serde_json::to_vec(value)?;
    line.push(b'\n');
    output.write_all(&line).await?;
    output.flush().await?;
    Ok(())
}
