//! In-process configuration store.
//!
//! `MemoryStore` implements [`ChangeListener`] and [`StatusSink`] without
//! an external database. Each subscriber gets its own queue; a new event
//! for a key that still has a pending event replaces it, so a SET followed
//! by a DEL is delivered as the DEL alone. [`MemoryStore::disconnect`]
//! breaks every live subscription and makes loads fail until
//! [`MemoryStore::reconnect`].

use async_trait::async_trait;
use std::collections::{BTreeMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

use crate::error::{ReconcileError, ReconcileResult};
use crate::listener::{ChangeListener, StatusSink, Subscription};
use crate::snapshot::{ChangeEvent, Row, Snapshot, Table};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[derive(Debug)]
enum QueueItem {
    Event(ChangeEvent),
    Malformed(String),
}

#[derive(Debug, Default)]
struct QueueState {
    items: VecDeque<QueueItem>,
    broken: bool,
}

#[derive(Debug)]
struct SubscriberQueue {
    tables: HashSet<String>,
    state: Mutex<QueueState>,
    notify: Notify,
}

impl SubscriberQueue {
    fn push(&self, item: QueueItem) {
        {
            let mut state = lock(&self.state);
            if state.broken {
                return;
            }
            if let QueueItem::Event(event) = &item {
                state.items.retain(|pending| {
                    !matches!(pending, QueueItem::Event(p) if p.table == event.table && p.key == event.key)
                });
            }
            state.items.push_back(item);
        }
        self.notify.notify_one();
    }

    fn break_off(&self) {
        lock(&self.state).broken = true;
        self.notify.notify_one();
    }
}

#[derive(Debug, Default)]
struct StoreState {
    tables: BTreeMap<String, Table>,
    status: BTreeMap<(String, String), Row>,
    disconnected: bool,
    subscribers: Vec<Weak<SubscriberQueue>>,
    loads: usize,
}

/// In-process configuration store with status table.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<StoreState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Writes a full row and notifies subscribers.
    ///
    /// An empty row deletes the key, matching the store semantics for an
    /// empty hash.
    pub fn set(&self, table: &str, key: &str, row: Row) {
        if row.is_empty() {
            self.del(table, key);
            return;
        }
        let mut state = lock(&self.inner);
        state
            .tables
            .entry(table.to_string())
            .or_default()
            .insert(key.to_string(), row.clone());
        Self::publish(&mut state, ChangeEvent::set(table, key, row));
    }

    /// Deletes a row and notifies subscribers.
    pub fn del(&self, table: &str, key: &str) {
        let mut state = lock(&self.inner);
        if let Some(rows) = state.tables.get_mut(table) {
            rows.remove(key);
        }
        Self::publish(&mut state, ChangeEvent::del(table, key));
    }

    /// Delivers an event to every subscriber regardless of the tables it
    /// subscribed to. Stored rows are not touched.
    pub fn inject(&self, event: ChangeEvent) {
        let mut state = lock(&self.inner);
        Self::for_each_subscriber(&mut state, |queue| {
            queue.push(QueueItem::Event(event.clone()))
        });
    }

    /// Delivers an undecodable notification to every subscriber.
    pub fn inject_malformed(&self, message: &str) {
        let mut state = lock(&self.inner);
        Self::for_each_subscriber(&mut state, |queue| {
            queue.push(QueueItem::Malformed(message.to_string()))
        });
    }

    /// Simulates a lost connection: live subscriptions fail on their next
    /// poll and loads fail until [`reconnect`](Self::reconnect).
    pub fn disconnect(&self) {
        let mut state = lock(&self.inner);
        state.disconnected = true;
        Self::for_each_subscriber(&mut state, |queue| queue.break_off());
        state.subscribers.clear();
    }

    pub fn reconnect(&self) {
        lock(&self.inner).disconnected = false;
    }

    /// Returns one stored row.
    pub fn get(&self, table: &str, key: &str) -> Option<Row> {
        lock(&self.inner)
            .tables
            .get(table)
            .and_then(|rows| rows.get(key))
            .cloned()
    }

    /// Returns the published status row for a key.
    pub fn status(&self, table: &str, key: &str) -> Option<Row> {
        lock(&self.inner)
            .status
            .get(&(table.to_string(), key.to_string()))
            .cloned()
    }

    /// Number of successful `load_all` calls.
    pub fn load_count(&self) -> usize {
        lock(&self.inner).loads
    }

    /// Number of live subscriptions.
    pub fn subscriber_count(&self) -> usize {
        let mut state = lock(&self.inner);
        state.subscribers.retain(|w| w.strong_count() > 0);
        state.subscribers.len()
    }

    fn publish(state: &mut StoreState, event: ChangeEvent) {
        Self::for_each_subscriber(state, |queue| {
            if queue.tables.contains(&event.table) {
                queue.push(QueueItem::Event(event.clone()));
            }
        });
    }

    fn for_each_subscriber(state: &mut StoreState, mut f: impl FnMut(&SubscriberQueue)) {
        state.subscribers.retain(|weak| match weak.upgrade() {
            Some(queue) => {
                f(&queue);
                true
            }
            None => false,
        });
    }
}

#[async_trait]
impl ChangeListener for MemoryStore {
    async fn load_all(&self, tables: &[String]) -> ReconcileResult<Snapshot> {
        let mut state = lock(&self.inner);
        if state.disconnected {
            return Err(ReconcileError::store_unavailable(
                "load_all",
                "memory store disconnected",
            ));
        }

        let mut snapshot = Snapshot::new(tables.iter().cloned());
        for table in tables {
            if let Some(rows) = state.tables.get(table) {
                for (key, row) in rows {
                    snapshot.insert(table, key.clone(), row.clone())?;
                }
            }
        }
        state.loads += 1;
        Ok(snapshot)
    }

    async fn subscribe(&self, tables: &[String]) -> ReconcileResult<Box<dyn Subscription>> {
        let mut state = lock(&self.inner);
        if state.disconnected {
            return Err(ReconcileError::store_unavailable(
                "subscribe",
                "memory store disconnected",
            ));
        }

        let queue = Arc::new(SubscriberQueue {
            tables: tables.iter().cloned().collect(),
            state: Mutex::new(QueueState::default()),
            notify: Notify::new(),
        });
        state.subscribers.push(Arc::downgrade(&queue));
        Ok(Box::new(MemorySubscription {
            queue,
            cancel: CancellationToken::new(),
        }))
    }
}

#[async_trait]
impl StatusSink for MemoryStore {
    async fn set_status(&self, table: &str, key: &str, row: &Row) -> ReconcileResult<()> {
        let mut state = lock(&self.inner);
        if state.disconnected {
            return Err(ReconcileError::store_unavailable(
                "set_status",
                "memory store disconnected",
            ));
        }
        state
            .status
            .insert((table.to_string(), key.to_string()), row.clone());
        Ok(())
    }

    async fn clear_status(&self, table: &str, key: &str) -> ReconcileResult<()> {
        let mut state = lock(&self.inner);
        if state.disconnected {
            return Err(ReconcileError::store_unavailable(
                "clear_status",
                "memory store disconnected",
            ));
        }
        state.status.remove(&(table.to_string(), key.to_string()));
        Ok(())
    }
}

/// Subscription handed out by [`MemoryStore`].
#[derive(Debug)]
pub struct MemorySubscription {
    queue: Arc<SubscriberQueue>,
    cancel: CancellationToken,
}

impl MemorySubscription {
    fn try_next(&self) -> Option<ReconcileResult<ChangeEvent>> {
        let mut state = lock(&self.queue.state);
        match state.items.pop_front() {
            Some(QueueItem::Event(event)) => Some(Ok(event)),
            Some(QueueItem::Malformed(message)) => {
                Some(Err(ReconcileError::malformed("memory-store", message)))
            }
            None if state.broken => Some(Err(ReconcileError::store_unavailable(
                "poll",
                "memory store disconnected",
            ))),
            None => None,
        }
    }
}

#[async_trait]
impl Subscription for MemorySubscription {
    async fn poll(&mut self, timeout: Duration) -> ReconcileResult<Option<ChangeEvent>> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if self.cancel.is_cancelled() {
                return Ok(None);
            }
            if let Some(next) = self.try_next() {
                return next.map(Some);
            }
            tokio::select! {
                _ = self.queue.notify.notified() => {}
                _ = self.cancel.cancelled() => return Ok(None),
                _ = tokio::time::sleep_until(deadline) => return Ok(None),
            }
        }
    }

    fn cancel_handle(&self) -> CancellationToken {
        self.cancel.clone()
    }
}
