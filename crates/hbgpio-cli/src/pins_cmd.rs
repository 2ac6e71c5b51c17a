//! 引脚映射表命令

use anyhow::Result;
use hbgpio_device::PinMap;
use serde::Serialize;

#[derive(Debug, Serialize)]
struct PinRow {
    physical: u8,
    logical: u8,
}

fn rows(map: &PinMap) -> Vec<PinRow> {
    map.iter()
        .map(|(physical, logical)| PinRow {
            physical: physical.0,
            logical: logical.0,
        })
        .collect()
}

pub fn run(json: bool) -> Result<()> {
    let rows = rows(PinMap::hummingboard());

    if json {
        println!("{}", serde_json::to_string_pretty(&rows)?);
        return Ok(());
    }

    println!("\n📌 HummingBoard P1 引脚映射\n");
    println!("{:>8}  {:>8}", "物理", "逻辑");
    println!("{}", "─".repeat(20));
    for row in &rows {
        println!("{:>10}  {:>10}", row.physical, row.logical);
    }
    println!("\n共 {} 个 GPIO 引脚", rows.len());

    Ok(())
}
