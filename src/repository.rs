//! Command dispatch in front of the entry store.
//!
//! The repository owns the [`EntryStore`] it is given and moves it onto a
//! dedicated writer thread. Mutations are queued in issue order, so the
//! store applies them (and publishes their snapshots) strictly in that
//! order. Callers receive a [`Pending`] ticket per command; dropping the
//! ticket is the fire-and-forget case.

use std::thread::{self, JoinHandle};
use std::time::Duration;

use anyhow::Context;
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TryRecvError};
use thiserror::Error;

use crate::storage::{
    Entry, EntryList, EntryStore, MutationOutcome, NewEntry, SnapshotFeed, Subscription,
};

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("entry writer has shut down")]
    Closed,
    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

pub type RepositoryResult<T> = Result<T, RepositoryError>;

enum Command {
    Insert {
        entry: NewEntry,
        reply: Sender<RepositoryResult<i64>>,
    },
    Update {
        entry: Entry,
        reply: Sender<RepositoryResult<MutationOutcome>>,
    },
    Delete {
        id: i64,
        reply: Sender<RepositoryResult<MutationOutcome>>,
    },
}

/// Completion handle for one queued command.
#[derive(Debug)]
pub struct Pending<T> {
    rx: Receiver<RepositoryResult<T>>,
}

impl<T> Pending<T> {
    pub fn wait(self) -> RepositoryResult<T> {
        self.rx.recv().unwrap_or(Err(RepositoryError::Closed))
    }

    /// `None` when the command has not finished within `timeout`.
    pub fn wait_timeout(&self, timeout: Duration) -> Option<RepositoryResult<T>> {
        match self.rx.recv_timeout(timeout) {
            Ok(result) => Some(result),
            Err(RecvTimeoutError::Timeout) => None,
            Err(RecvTimeoutError::Disconnected) => Some(Err(RepositoryError::Closed)),
        }
    }

    pub fn try_take(&self) -> Option<RepositoryResult<T>> {
        match self.rx.try_recv() {
            Ok(result) => Some(result),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => Some(Err(RepositoryError::Closed)),
        }
    }
}

pub struct Repository {
    commands: Option<Sender<Command>>,
    feed: SnapshotFeed<EntryList>,
    worker: Option<JoinHandle<()>>,
}

impl Repository {
    pub fn new(store: EntryStore) -> anyhow::Result<Self> {
        let feed = store.feed();
        let (tx, rx) = crossbeam_channel::unbounded();
        let worker = thread::Builder::new()
            .name("entry-writer".into())
            .spawn(move || run_writer(store, rx))
            .context("spawning entry writer thread")?;
        Ok(Self {
            commands: Some(tx),
            feed,
            worker: Some(worker),
        })
    }

    pub fn observe(&self) -> Subscription<EntryList> {
        self.feed.subscribe()
    }

    pub fn insert(&self, entry: NewEntry) -> Pending<i64> {
        self.dispatch(|reply| Command::Insert { entry, reply })
    }

    pub fn update(&self, entry: Entry) -> Pending<MutationOutcome> {
        self.dispatch(|reply| Command::Update { entry, reply })
    }

    pub fn delete(&self, id: i64) -> Pending<MutationOutcome> {
        self.dispatch(|reply| Command::Delete { id, reply })
    }

    fn dispatch<T>(&self, build: impl FnOnce(Sender<RepositoryResult<T>>) -> Command) -> Pending<T> {
        let (reply, rx) = crossbeam_channel::bounded(1);
        let queued = match &self.commands {
            Some(commands) => commands.send(build(reply)).is_ok(),
            None => false,
        };
        if !queued {
            tracing::error!("entry writer unavailable, dropping command");
        }
        // A failed send drops the reply sender, so the ticket reports `Closed`.
        Pending { rx }
    }
}

impl Drop for Repository {
    fn drop(&mut self) {
        // Closing the queue lets the writer drain what is left and exit.
        self.commands.take();
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                tracing::error!("entry writer thread panicked");
            }
        }
        self.feed.close();
    }
}

fn run_writer(store: EntryStore, commands: Receiver<Command>) {
    for command in commands {
        match command {
            Command::Insert { entry, reply } => {
                let result = store.insert(&entry).map_err(RepositoryError::from);
                if let Err(err) = &result {
                    tracing::error!(?err, "failed to insert entry");
                }
                let _ = reply.send(result);
            }
            Command::Update { entry, reply } => {
                let id = entry.id;
                let result = store.update(&entry).map_err(RepositoryError::from);
                match &result {
                    Ok(MutationOutcome::NotFound) => {
                        tracing::warn!(id, "update skipped, entry not found")
                    }
                    Err(err) => tracing::error!(?err, id, "failed to update entry"),
                    Ok(MutationOutcome::Applied) => {}
                }
                let _ = reply.send(result);
            }
            Command::Delete { id, reply } => {
                let result = store.delete(id).map_err(RepositoryError::from);
                match &result {
                    Ok(MutationOutcome::NotFound) => {
                        tracing::debug!(id, "delete skipped, entry not found")
                    }
                    Err(err) => tracing::error!(?err, id, "failed to delete entry"),
                    Ok(MutationOutcome::Applied) => {}
                }
                let _ = reply.send(result);
            }
        }
    }
    tracing::debug!("entry writer stopped");
}
