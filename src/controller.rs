//! The single live consumer of the repository's entry feed.
//!
//! The controller caches the latest full list as an `Arc` and replaces it
//! wholesale whenever the feed moves on. Search and sort requests run
//! against that cache and never touch the store.

use std::sync::Arc;
use std::time::Duration;

use crate::repository::{Pending, Repository};
use crate::search::{filter_by_label, ChronologicalSort};
use crate::storage::{Entry, EntryList, MutationOutcome, NewEntry, Subscription};

pub struct ListController {
    repository: Repository,
    subscription: Subscription<EntryList>,
    current: Arc<EntryList>,
    sort: ChronologicalSort,
}

impl ListController {
    pub fn new(repository: Repository) -> Self {
        let mut subscription = repository.observe();
        let current = subscription.try_recv().unwrap_or_default();
        Self {
            repository,
            subscription,
            current,
            sort: ChronologicalSort::default(),
        }
    }

    pub fn insert(&self, entry: NewEntry) -> Pending<i64> {
        self.repository.insert(entry)
    }

    pub fn update(&self, entry: Entry) -> Pending<MutationOutcome> {
        self.repository.update(entry)
    }

    pub fn delete(&self, id: i64) -> Pending<MutationOutcome> {
        self.repository.delete(id)
    }

    pub fn current(&self) -> Arc<EntryList> {
        Arc::clone(&self.current)
    }

    pub fn find(&self, id: i64) -> Option<&Entry> {
        self.current.iter().find(|entry| entry.id == id)
    }

    /// Picks up the newest snapshot without blocking. Returns it when the
    /// cached list changed.
    pub fn refresh(&mut self) -> Option<Arc<EntryList>> {
        let latest = self.subscription.try_recv()?;
        Some(self.replace(latest))
    }

    pub fn wait_for_change(&mut self, timeout: Duration) -> Option<Arc<EntryList>> {
        let latest = self.subscription.recv_timeout(timeout)?;
        Some(self.replace(latest))
    }

    /// Explicit search. An empty query yields the full list.
    pub fn search(&self, query: &str) -> Vec<Entry> {
        filter_by_label(&self.current, query)
    }

    /// Search-box edits: clearing the text resets to the full list, any
    /// other text waits for an explicit search.
    pub fn query_changed(&self, text: &str) -> Option<Vec<Entry>> {
        if text.is_empty() {
            Some(self.current.to_vec())
        } else {
            None
        }
    }

    pub fn toggle_chronological(&mut self) -> Vec<Entry> {
        self.sort.toggle(&self.current)
    }

    pub fn next_sort_is_ascending(&self) -> bool {
        self.sort.next_is_ascending()
    }

    fn replace(&mut self, latest: Arc<EntryList>) -> Arc<EntryList> {
        tracing::debug!(
            version = self.subscription.seen_version(),
            count = latest.len(),
            "entry list replaced"
        );
        self.current = latest;
        Arc::clone(&self.current)
    }
}
