//! Host lifecycle hooks.
//!
//! The host publishes [`LifecycleSignal`]s on a [`LifecycleBus`]; a listener
//! attached to a registry flushes on suspend and shuts down on terminate.

use std::sync::Arc;

use anyhow::Context;
use tokio::sync::{Notify, broadcast};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::registry::ProcessorRegistry;

const BUS_CAPACITY: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleSignal {
    /// The host moved to the background and may be frozen.
    Suspend,
    /// The host is about to stop.
    Terminate,
}

/// Broadcast channel for lifecycle signals.
#[derive(Debug, Clone)]
pub struct LifecycleBus {
    tx: broadcast::Sender<LifecycleSignal>,
}

impl Default for LifecycleBus {
    fn default() -> Self {
        Self::new()
    }
}

impl LifecycleBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(BUS_CAPACITY);
        Self { tx }
    }

    /// Publish a signal. Returns how many listeners received it.
    pub fn emit(&self, signal: LifecycleSignal) -> usize {
        self.tx.send(signal).unwrap_or(0)
    }

    pub fn suspend(&self) -> usize {
        self.emit(LifecycleSignal::Suspend)
    }

    pub fn terminate(&self) -> usize {
        self.emit(LifecycleSignal::Terminate)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LifecycleSignal> {
        self.tx.subscribe()
    }
}

/// A running lifecycle listener.
pub struct LifecycleHandle {
    task: JoinHandle<()>,
    detach: Arc<Notify>,
}

impl LifecycleHandle {
    /// Stop listening without flushing.
    pub fn detach(&self) {
        self.detach.notify_one();
    }

    /// Wait for the listener to stop (after terminate, detach or bus closure).
    pub async fn finished(self) {
        if let Err(err) = self.task.await {
            warn!(error = %err, "lifecycle listener ended abnormally");
        }
    }
}

/// Subscribe `registry` to `bus`: suspend flushes all, terminate shuts down.
pub fn attach(registry: Arc<ProcessorRegistry>, bus: &LifecycleBus) -> LifecycleHandle {
    let mut signals = bus.subscribe();
    let detach = Arc::new(Notify::new());
    let stop = detach.clone();

    let task = tokio::spawn(async move {
        info!("lifecycle listener started");

        loop {
            tokio::select! {
                _ = stop.notified() => {
                    info!("lifecycle listener detached");
                    break;
                }
                signal = signals.recv() => match signal {
                    Ok(LifecycleSignal::Suspend) => {
                        registry.flush_all().await;
                    }
                    Ok(LifecycleSignal::Terminate) => {
                        registry.shutdown().await;
                        break;
                    }
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        warn!(missed, "lifecycle signals dropped; flushing");
                        registry.flush_all().await;
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
            }
        }

        info!("lifecycle listener stopped");
    });

    LifecycleHandle { task, detach }
}

/// Translate the process Ctrl-C signal into [`LifecycleSignal::Terminate`].
pub fn forward_ctrl_c(bus: LifecycleBus) -> JoinHandle<anyhow::Result<()>> {
    tokio::spawn(async move {
        tokio::signal::ctrl_c()
            .await
            .context("failed to listen for ctrl-c")?;
        info!("ctrl-c received; terminating");
        bus.terminate();
        Ok(())
    })
}
