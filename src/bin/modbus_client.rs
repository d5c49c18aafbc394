// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the metric-modbus project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

use clap::{Parser, ValueEnum};
use std::error::Error;
use tokio_modbus::prelude::*;

use metric_modbus::mapping::{map_key_to_address, Region, RegionAddress};

/// Region selection on the command line
#[derive(Debug, Clone, Copy, ValueEnum)]
enum RegionArg {
    Coils,
    DiscreteInputs,
    InputRegisters,
    HoldingRegisters,
}

impl From<RegionArg> for Region {
    fn from(arg: RegionArg) -> Self {
        match arg {
            RegionArg::Coils => Region::Coils,
            RegionArg::DiscreteInputs => Region::DiscreteInputs,
            RegionArg::InputRegisters => Region::InputRegisters,
            RegionArg::HoldingRegisters => Region::HoldingRegisters,
        }
    }
}

/// Modbus client for polling a metric Modbus server
#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    /// Modbus server address
    #[clap(long, default_value = "127.0.0.1")]
    address: String,

    /// Modbus server port
    #[clap(long, default_value = "502")]
    port: u16,

    /// Region to read
    #[clap(long, value_enum, default_value = "holding-registers")]
    region: RegionArg,

    /// Starting region-local address
    #[clap(long, default_value = "0")]
    start: u16,

    /// Number of values to read
    #[clap(long, default_value = "8")]
    quantity: u16,

    /// Read the single value a metric field maps to, e.g. `cpu_usage_idle`.
    /// Overrides --region, --start and --quantity.
    #[clap(long)]
    key: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init_from_env(
        env_logger::Env::default().filter_or(env_logger::DEFAULT_FILTER_ENV, "info"),
    );

    let args = Args::parse();

    let (region, start, quantity) = match &args.key {
        Some(key) => {
            let flat = map_key_to_address(key);
            let target = RegionAddress::from_address(flat);
            println!(
                "Key '{}' maps to address {} ({} {})",
                key, flat, target.region, target.local
            );
            (target.region, target.local, 1)
        }
        None => (Region::from(args.region), args.start, args.quantity),
    };

    let socket_addr = format!("{}:{}", args.address, args.port);
    println!("Connecting to Modbus server at {}", socket_addr);

    let mut ctx = tcp::connect_slave(socket_addr.parse()?, Slave(1)).await?;

    println!("Reading {} {} starting at address {}", quantity, region, start);

    match region {
        Region::Coils | Region::DiscreteInputs => {
            let values = if region == Region::Coils {
                ctx.read_coils(start, quantity).await??
            } else {
                ctx.read_discrete_inputs(start, quantity).await??
            };
            for (i, value) in values.iter().enumerate() {
                println!("{} {}: {}", region, start.wrapping_add(i as u16), value);
            }
        }
        Region::InputRegisters | Region::HoldingRegisters => {
            let values = if region == Region::InputRegisters {
                ctx.read_input_registers(start, quantity).await??
            } else {
                ctx.read_holding_registers(start, quantity).await??
            };
            println!("Raw register values: {:?}", values);
            for (i, value) in values.iter().enumerate() {
                println!(
                    "{} {}: {} ({:#06x})",
                    region,
                    start.wrapping_add(i as u16),
                    value,
                    value
                );
            }
        }
    }

    ctx.disconnect().await?;
    Ok(())
}
