//! Init 命令

use anyhow::{Result, bail};
use hbgpio_core::FlowConfig;
use std::path::Path;

pub fn run(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        bail!("{} 已存在，使用 --force 覆盖", path.display());
    }

    let flow = FlowConfig::example();
    flow.save(path)?;

    println!("Flow configuration initialized at: {}", path.display());
    println!("\nExample nodes:");
    for node in &flow.nodes {
        println!("  {} (physical pin {})", node.id(), node.pin());
    }
    println!("\nRun `hbgpio pins` to list the available pins.");

    Ok(())
}
