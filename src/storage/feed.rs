//! Single-slot, latest-value-wins broadcast of store snapshots.
//!
//! Publishers replace the slot wholesale and bump a version counter.
//! Subscribers remember the last version they saw and only ever receive the
//! newest value, so a slow reader skips intermediate snapshots instead of
//! queueing them. Versions are monotonic: a reader never observes an older
//! snapshot after a newer one.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

struct Slot<T> {
    version: u64,
    value: Arc<T>,
    closed: bool,
}

struct Shared<T> {
    slot: Mutex<Slot<T>>,
    changed: Condvar,
}

pub struct SnapshotFeed<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Clone for SnapshotFeed<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T> SnapshotFeed<T> {
    /// The initial value counts as the first emission, so every new
    /// subscriber receives the current contents on its first read.
    pub fn new(initial: T) -> Self {
        Self {
            shared: Arc::new(Shared {
                slot: Mutex::new(Slot {
                    version: 1,
                    value: Arc::new(initial),
                    closed: false,
                }),
                changed: Condvar::new(),
            }),
        }
    }

    pub fn publish(&self, value: T) -> u64 {
        let version = {
            let mut slot = self.shared.slot.lock();
            slot.version += 1;
            slot.value = Arc::new(value);
            slot.version
        };
        self.shared.changed.notify_all();
        version
    }

    pub fn latest(&self) -> (u64, Arc<T>) {
        let slot = self.shared.slot.lock();
        (slot.version, Arc::clone(&slot.value))
    }

    pub fn subscribe(&self) -> Subscription<T> {
        Subscription {
            shared: Arc::clone(&self.shared),
            seen: 0,
        }
    }

    /// Wakes every blocked subscriber; later reads return only values that
    /// were published before the close.
    pub fn close(&self) {
        self.shared.slot.lock().closed = true;
        self.shared.changed.notify_all();
    }
}

pub struct Subscription<T> {
    shared: Arc<Shared<T>>,
    seen: u64,
}

impl<T> Subscription<T> {
    pub fn seen_version(&self) -> u64 {
        self.seen
    }

    pub fn try_recv(&mut self) -> Option<Arc<T>> {
        let slot = self.shared.slot.lock();
        take_if_newer(&mut self.seen, &slot)
    }

    /// Blocks until a newer snapshot exists or the feed closes.
    pub fn recv(&mut self) -> Option<Arc<T>> {
        let mut slot = self.shared.slot.lock();
        loop {
            if let Some(value) = take_if_newer(&mut self.seen, &slot) {
                return Some(value);
            }
            if slot.closed {
                return None;
            }
            self.shared.changed.wait(&mut slot);
        }
    }

    pub fn recv_timeout(&mut self, timeout: Duration) -> Option<Arc<T>> {
        let deadline = Instant::now() + timeout;
        let mut slot = self.shared.slot.lock();
        loop {
            if let Some(value) = take_if_newer(&mut self.seen, &slot) {
                return Some(value);
            }
            if slot.closed {
                return None;
            }
            if self
                .shared
                .changed
                .wait_until(&mut slot, deadline)
                .timed_out()
            {
                return take_if_newer(&mut self.seen, &slot);
            }
        }
    }
}

fn take_if_newer<T>(seen: &mut u64, slot: &Slot<T>) -> Option<Arc<T>> {
    if slot.version > *seen {
        *seen = slot.version;
        Some(Arc::clone(&slot.value))
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn new_subscriber_sees_current_value_once() {
        let feed = SnapshotFeed::new(vec![1, 2]);
        let mut sub = feed.subscribe();
        assert_eq!(sub.try_recv().as_deref(), Some(&vec![1, 2]));
        assert!(sub.try_recv().is_none());
    }

    #[test]
    fn slow_subscriber_only_gets_latest_value() {
        let feed = SnapshotFeed::new(0u32);
        let mut sub = feed.subscribe();
        sub.try_recv();
        feed.publish(1);
        feed.publish(2);
        feed.publish(3);
        assert_eq!(sub.try_recv().as_deref(), Some(&3));
        assert_eq!(sub.seen_version(), 4);
        assert_eq!(feed.latest().0, 4);
        assert!(sub.try_recv().is_none());
    }

    #[test]
    fn recv_wakes_on_publish_from_another_thread() {
        let feed = SnapshotFeed::new("start".to_string());
        let mut sub = feed.subscribe();
        sub.try_recv();
        let publisher = feed.clone();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            publisher.publish("next".to_string());
        });
        let value = sub.recv_timeout(Duration::from_secs(5));
        handle.join().expect("publisher thread");
        assert_eq!(value.as_deref().map(String::as_str), Some("next"));
    }

    #[test]
    fn close_unblocks_waiting_subscriber() {
        let feed = SnapshotFeed::new(());
        let mut sub = feed.subscribe();
        sub.try_recv();
        let closer = feed.clone();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            closer.close();
        });
        assert!(sub.recv().is_none());
        handle.join().expect("closer thread");
    }

    #[test]
    fn recv_timeout_expires_without_publish() {
        let feed = SnapshotFeed::new(7u8);
        let mut sub = feed.subscribe();
        sub.try_recv();
        assert!(sub.recv_timeout(Duration::from_millis(10)).is_none());
    }
}
