// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the metric-modbus project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! # Daemon Management Module
//!
//! This module runs the background services of the application:
//!
//! - the Modbus TCP server
//! - the metric ingestion task, fed through a bounded channel
//!
//! Both share one [`RegisterStore`]. The daemon tracks the spawned tasks and
//! coordinates their shutdown through a shared `running` flag.

use anyhow::Result;
use log::{debug, error, info, warn};
use std::net::SocketAddr;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time;

use crate::config::Config;
use crate::metrics::MetricRecord;
use crate::modbus::{ingest, ModbusServer, ModbusServerHandle, RegisterStore};

/// How often the ingestion task re-checks the running flag while idle
const INGEST_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// How long `join` waits for each task
const JOIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Sending half of the ingestion channel, one batch per message
pub type MetricSender = mpsc::Sender<Vec<MetricRecord>>;

/// Coordinates the Modbus server and the ingestion task
///
/// # Fields
///
/// * `tasks` - Handles of the spawned tasks, awaited by [`Daemon::join`]
/// * `running` - Flag shared with the tasks to request termination
/// * `store` - Registers shared by ingestion and the Modbus connections
pub struct Daemon {
    tasks: Vec<JoinHandle<Result<()>>>,
    running: Arc<AtomicBool>,
    store: Arc<RegisterStore>,
    metric_sender: Option<MetricSender>,
    modbus_server: Option<ModbusServerHandle>,
}

impl Default for Daemon {
    fn default() -> Self {
        Self::new()
    }
}

impl Daemon {
    /// Create a new daemon instance with an empty register store
    pub fn new() -> Self {
        Self::with_store(Arc::new(RegisterStore::new()))
    }

    /// Create a daemon serving an existing store
    pub fn with_store(store: Arc<RegisterStore>) -> Self {
        Daemon {
            tasks: Vec::new(),
            running: Arc::new(AtomicBool::new(true)),
            store,
            metric_sender: None,
            modbus_server: None,
        }
    }

    /// Launch all configured tasks based on configuration
    ///
    /// # Errors
    ///
    /// Fails if the Modbus server is enabled and cannot bind its address.
    /// No task is started in that case.
    pub async fn launch(&mut self, config: &Config) -> Result<()> {
        if config.modbus.enabled {
            self.start_modbus_server(config).await?;
        } else {
            info!("Modbus server disabled by configuration");
        }

        self.start_ingestion(config)
    }

    /// Start the Modbus TCP server on the configured address
    async fn start_modbus_server(&mut self, config: &Config) -> Result<()> {
        info!("Starting modbus server on {}", config.modbus.address);

        let server = match ModbusServer::start(&config.modbus.address, self.store()).await {
            Ok(server) => server,
            Err(e) => {
                error!("{}", e);
                return Err(e.into());
            }
        };

        self.modbus_server = Some(server);
        info!("Modbus server started");
        Ok(())
    }

    /// Start the task applying metric batches to the register store
    fn start_ingestion(&mut self, config: &Config) -> Result<()> {
        debug!(
            "Starting ingestion task with channel capacity {}",
            config.ingest.channel_capacity
        );

        let (sender, mut receiver) = mpsc::channel::<Vec<MetricRecord>>(config.ingest.channel_capacity);
        let running = self.running.clone();
        let store = self.store();

        let task = tokio::spawn(async move {
            let mut batches = 0u64;
            while running.load(Ordering::SeqCst) {
                match time::timeout(INGEST_POLL_INTERVAL, receiver.recv()).await {
                    Ok(Some(batch)) => {
                        let report = ingest(&store, &batch);
                        batches += 1;
                        if !report.is_clean() {
                            warn!(
                                "Batch {}: {} fields skipped",
                                batches,
                                report.rejected.len()
                            );
                        }
                    }
                    Ok(None) => {
                        debug!("All metric senders dropped");
                        break;
                    }
                    Err(_) => continue,
                }
            }
            info!("Ingestion task stopped after {} batches", batches);
            Ok(())
        });

        self.metric_sender = Some(sender);
        self.tasks.push(task);
        Ok(())
    }

    /// Sender feeding the ingestion task, available after [`Daemon::launch`]
    pub fn metric_sender(&self) -> Option<MetricSender> {
        self.metric_sender.clone()
    }

    /// Register store shared by all services
    pub fn store(&self) -> Arc<RegisterStore> {
        Arc::clone(&self.store)
    }

    /// Address of the running Modbus server, if any
    pub fn modbus_addr(&self) -> Option<SocketAddr> {
        self.modbus_server.as_ref().map(ModbusServerHandle::local_addr)
    }

    /// Stop all running tasks
    ///
    /// The Modbus listener is closed right away; connections that are already
    /// open are not interrupted. The ingestion task stops at its next poll.
    pub async fn shutdown(&mut self) {
        info!("Shutting down daemon tasks");
        self.running.store(false, Ordering::SeqCst);
        self.metric_sender = None;
        if let Some(server) = self.modbus_server.take() {
            server.close().await;
        }
    }

    /// Wait for all tasks to complete
    ///
    /// Task panics and tasks exceeding the timeout are logged, not returned.
    pub async fn join(self) -> Result<()> {
        for task in self.tasks {
            match time::timeout(JOIN_TIMEOUT, task).await {
                Ok(Ok(Ok(()))) => {}
                Ok(Ok(Err(e))) => error!("Task failed: {}", e),
                Ok(Err(e)) => error!("Task panicked: {}", e),
                Err(_) => warn!("Task did not complete within timeout period, may be hung"),
            }
        }
        Ok(())
    }
}
