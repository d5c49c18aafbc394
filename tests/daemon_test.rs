// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the metric-modbus project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! End-to-end test: metrics sent to the daemon are readable over Modbus TCP

use std::time::Duration;

use anyhow::Result;
use tokio::time;
use tokio_modbus::prelude::*;

use metric_modbus::config::{Config, ModbusConfig};
use metric_modbus::daemon::Daemon;
use metric_modbus::mapping::{Region, RegionAddress};
use metric_modbus::metrics::{MetricBatch, MetricRecord};

#[tokio::test]
async fn test_metrics_reach_modbus_clients() -> Result<()> {
    let config = Config {
        modbus: ModbusConfig {
            enabled: true,
            address: "127.0.0.1:0".to_string(),
        },
        ..Config::default()
    };

    let mut daemon = Daemon::new();
    daemon.launch(&config).await?;
    let socket_addr = daemon.modbus_addr().expect("Modbus server started");
    let sender = daemon.metric_sender().expect("ingestion started");

    let line = r#"{"name":"disk","fields":{"free":1234,"used_percent":42.9}}"#;
    let batch = MetricBatch::parse_line(line)?;
    assert_eq!(batch.len(), 1);
    sender.send(batch).await?;

    let free = RegionAddress::for_field("disk", "free");
    let used = RegionAddress::for_field("disk", "used_percent");

    let mut ctx = tcp::connect(socket_addr).await?;
    let mut served = None;
    for _ in 0..50 {
        let free_value = read_one(&mut ctx, free).await?;
        let used_value = read_one(&mut ctx, used).await?;
        if (free_value, used_value) != (0, 0) {
            served = Some((free_value, used_value));
            break;
        }
        time::sleep(Duration::from_millis(20)).await;
    }

    let expect = |target: RegionAddress, value: u16| {
        if target.region.is_bit() {
            u16::from(value != 0)
        } else {
            value
        }
    };
    assert_eq!(
        served,
        Some((expect(free, 1234), expect(used, 42))),
        "free in {}, used_percent in {}",
        free.region,
        used.region
    );

    // Later batches overwrite earlier values
    sender
        .send(vec![MetricRecord::new("disk")
            .with_field("free", 7i64)
            .with_field("used_percent", 42.9)])
        .await?;
    let mut latest = 0;
    for _ in 0..50 {
        latest = read_one(&mut ctx, free).await?;
        if latest == expect(free, 7) {
            break;
        }
        time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(latest, expect(free, 7));

    ctx.disconnect().await?;
    drop(sender);
    daemon.shutdown().await;
    daemon.join().await
}

async fn read_one(ctx: &mut tokio_modbus::client::Context, target: RegionAddress) -> Result<u16> {
    let value = match target.region {
        Region::Coils => u16::from(ctx.read_coils(target.local, 1).await??[0]),
        Region::DiscreteInputs => u16::from(ctx.read_discrete_inputs(target.local, 1).await??[0]),
        Region::InputRegisters => ctx.read_input_registers(target.local, 1).await??[0],
        Region::HoldingRegisters => ctx.read_holding_registers(target.local, 1).await??[0],
    };
    Ok(value)
}
