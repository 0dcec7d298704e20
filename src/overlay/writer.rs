use std::thread::{self, JoinHandle};

use anyhow::Context;
use crossbeam_channel::{Receiver, Sender};

use super::StatusOverlayStore;

/// Completion notice for one queued status write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OverlayEvent {
    Written { id: i64, status: String },
    Failed { id: i64, message: String },
}

struct WriteRequest {
    id: i64,
    status: String,
}

/// Runs status writes on a background thread and reports each completion
/// on an event queue drained by the foreground.
pub struct OverlayWriter {
    requests: Option<Sender<WriteRequest>>,
    events: Receiver<OverlayEvent>,
    worker: Option<JoinHandle<()>>,
}

impl OverlayWriter {
    pub fn spawn(store: StatusOverlayStore) -> anyhow::Result<Self> {
        let (request_tx, request_rx) = crossbeam_channel::unbounded();
        let (event_tx, event_rx) = crossbeam_channel::unbounded();
        let worker = thread::Builder::new()
            .name("status-writer".into())
            .spawn(move || run_writer(store, request_rx, event_tx))
            .context("spawning status writer thread")?;
        Ok(Self {
            requests: Some(request_tx),
            events: event_rx,
            worker: Some(worker),
        })
    }

    /// Queues a write. Returns `false` only when the writer thread is gone.
    pub fn put(&self, id: i64, status: impl Into<String>) -> bool {
        let request = WriteRequest {
            id,
            status: status.into(),
        };
        let queued = self
            .requests
            .as_ref()
            .map(|requests| requests.send(request).is_ok())
            .unwrap_or(false);
        if !queued {
            tracing::error!(id, "status writer unavailable, dropping write");
        }
        queued
    }

    pub fn events(&self) -> &Receiver<OverlayEvent> {
        &self.events
    }

    pub fn drain(&self) -> Vec<OverlayEvent> {
        self.events.try_iter().collect()
    }
}

impl Drop for OverlayWriter {
    fn drop(&mut self) {
        self.requests.take();
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                tracing::error!("status writer thread panicked");
            }
        }
    }
}

fn run_writer(
    store: StatusOverlayStore,
    requests: Receiver<WriteRequest>,
    events: Sender<OverlayEvent>,
) {
    for WriteRequest { id, status } in requests {
        let event = match store.put(id, &status) {
            Ok(()) => OverlayEvent::Written { id, status },
            Err(err) => {
                tracing::error!(?err, id, "failed to persist status");
                OverlayEvent::Failed {
                    id,
                    message: format!("{:#}", anyhow::Error::from(err)),
                }
            }
        };
        if events.send(event).is_err() {
            break;
        }
    }
}
