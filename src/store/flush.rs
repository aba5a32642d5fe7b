//! Debounced snapshot writer
//!
//! A single background task owns the durable write path. Mutations mark the
//! store dirty and push the pending deadline out by the debounce window; the
//! snapshot is written once the window passes without another mutation.
//! `Flush` forces the pending write immediately so tests never wait on time.

use super::reducer::StoreState;
use crate::persistence::{KeyValueStore, SNAPSHOT_KEY};
use anyhow::{Context, Result};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, warn};

#[derive(Debug)]
pub enum FlushCommand {
    /// State changed; (re)arm the delayed write
    Dirty,
    /// Write now if anything is pending, then acknowledge
    Flush(oneshot::Sender<()>),
    /// Write anything pending, acknowledge, and stop
    Shutdown(oneshot::Sender<()>),
}

pub struct SnapshotWriter {
    state: Arc<Mutex<StoreState>>,
    kv: Arc<dyn KeyValueStore>,
    debounce: Duration,
    dirty: bool,
    deadline: Option<Instant>,
}

impl SnapshotWriter {
    pub fn spawn(
        state: Arc<Mutex<StoreState>>,
        kv: Arc<dyn KeyValueStore>,
        debounce: Duration,
    ) -> (mpsc::UnboundedSender<FlushCommand>, JoinHandle<()>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let writer = Self {
            state,
            kv,
            debounce,
            dirty: false,
            deadline: None,
        };
        let handle = tokio::spawn(writer.run(rx));
        (tx, handle)
    }

    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<FlushCommand>) {
        loop {
            let command = match self.deadline {
                Some(deadline) => tokio::select! {
                    command = rx.recv() => command,
                    _ = tokio::time::sleep_until(deadline) => {
                        self.deadline = None;
                        self.write().await;
                        continue;
                    }
                },
                None => rx.recv().await,
            };

            match command {
                Some(FlushCommand::Dirty) => {
                    self.dirty = true;
                    self.deadline = Some(Instant::now() + self.debounce);
                }
                Some(FlushCommand::Flush(ack)) => {
                    self.deadline = None;
                    if self.dirty {
                        self.write().await;
                    }
                    let _ = ack.send(());
                }
                Some(FlushCommand::Shutdown(ack)) => {
                    if self.dirty {
                        self.write().await;
                    }
                    let _ = ack.send(());
                    break;
                }
                None => {
                    if self.dirty {
                        self.write().await;
                    }
                    break;
                }
            }
        }
        debug!("Snapshot writer stopped");
    }

    /// Failures are logged and swallowed; memory stays authoritative and the
    /// store stays dirty so the next flush retries.
    async fn write(&mut self) {
        match self.persist().await {
            Ok(bytes) => {
                self.dirty = false;
                debug!("Persisted contact snapshot ({} bytes)", bytes);
            }
            Err(e) => {
                warn!("Failed to persist contact snapshot: {:#}", e);
            }
        }
    }

    async fn persist(&self) -> Result<usize> {
        let bytes = {
            let state = self.state.lock().expect("store state mutex poisoned");
            serde_json::to_vec(&state.to_snapshot()).context("serializing contact snapshot")?
        };
        let len = bytes.len();
        let kv = Arc::clone(&self.kv);
        tokio::task::spawn_blocking(move || kv.save(SNAPSHOT_KEY, &bytes))
            .await
            .context("joining snapshot write")??;
        Ok(len)
    }
}
