// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the metric-modbus project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

use anyhow::Result;
use metric_modbus::config::{self, Config, IngestConfig, ModbusConfig};
use tempfile::tempdir;

#[test]
fn test_config_load_and_save() -> Result<()> {
    let temp_dir = tempdir()?;
    let config_path = temp_dir.path().join("config.yaml");

    let config = Config {
        modbus: ModbusConfig {
            enabled: false,
            address: "127.0.0.1:1502".to_string(),
        },
        ingest: IngestConfig {
            channel_capacity: 8,
        },
    };

    config.save_to_file(&config_path)?;
    let loaded_config = Config::from_file(&config_path)?;

    assert_eq!(loaded_config, config);
    assert!(!loaded_config.modbus.enabled);
    assert_eq!(loaded_config.modbus.address, "127.0.0.1:1502");
    assert_eq!(loaded_config.ingest.channel_capacity, 8);

    Ok(())
}

#[test]
fn test_missing_file_creates_default() -> Result<()> {
    let temp_dir = tempdir()?;
    let non_existent_path = temp_dir.path().join("non_existent.yaml");

    let default_config = Config::from_file(&non_existent_path)?;

    assert!(non_existent_path.exists());
    assert_eq!(default_config, Config::default());
    assert!(default_config.modbus.enabled);
    assert_eq!(default_config.modbus.address, "0.0.0.0:502");
    assert_eq!(default_config.ingest.channel_capacity, 64);

    // The written default loads back identically
    assert_eq!(Config::from_file(&non_existent_path)?, default_config);
    Ok(())
}

#[test]
fn test_partial_config_uses_defaults() -> Result<()> {
    let temp_dir = tempdir()?;
    let config_path = temp_dir.path().join("config.yaml");
    std::fs::write(&config_path, "modbus:\n  address: \"127.0.0.1:5020\"\n")?;

    let config = Config::from_file(&config_path)?;
    assert!(config.modbus.enabled);
    assert_eq!(config.modbus.address, "127.0.0.1:5020");
    assert_eq!(config.ingest, IngestConfig::default());
    Ok(())
}

#[test]
fn test_apply_args() {
    let mut config = Config::default();

    config.apply_args(None);
    assert_eq!(config.modbus.address, "0.0.0.0:502");

    config.apply_args(Some("192.168.0.1:1502".to_string()));
    assert_eq!(config.modbus.address, "192.168.0.1:1502");
}

#[test]
fn test_config_validation() {
    assert!(Config::default().validate().is_ok());

    let mut config = Config::default();
    config.modbus.address = "[::1]:502".to_string();
    assert!(config.validate().is_ok());

    let mut config = Config::default();
    config.modbus.address = "no-port".to_string();
    assert!(config.validate().is_err());

    let mut config = Config::default();
    config.modbus.address = "127.0.0.1:99999".to_string();
    assert!(config.validate().is_err());

    let mut config = Config::default();
    config.ingest.channel_capacity = 0;
    assert!(config.validate().is_err());
}

#[test]
fn test_config_schema_output() -> Result<()> {
    // Output goes to stdout, only check that it succeeds
    config::output_config_schema()?;
    Ok(())
}
