//! Configuration store contract.
//!
//! A [`ChangeListener`] loads the tracked tables and hands out a
//! [`Subscription`] delivering [`ChangeEvent`]s. Events for the same key
//! arrive in store-commit order; pending events for one key may be
//! coalesced to the latest. A [`StatusSink`] receives the per-key status
//! rows daemons publish.

use async_trait::async_trait;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::error::ReconcileResult;
use crate::snapshot::{ChangeEvent, Row, Snapshot};

/// Source of configuration snapshots and change notifications.
#[async_trait]
pub trait ChangeListener: Send + Sync {
    /// Reads every row of the given tables.
    ///
    /// Fails with `StoreUnavailable` when the store cannot be reached.
    /// Never retries; retry policy belongs to the caller.
    async fn load_all(&self, tables: &[String]) -> ReconcileResult<Snapshot>;

    /// Starts receiving changes for the given tables.
    async fn subscribe(&self, tables: &[String]) -> ReconcileResult<Box<dyn Subscription>>;
}

/// A live change stream.
#[async_trait]
pub trait Subscription: Send {
    /// Waits up to `timeout` for the next event.
    ///
    /// * `Ok(None)` - nothing arrived in time, or the subscription was cancelled
    /// * `Ok(Some(event))` - the next event
    /// * `Err(StoreUnavailable)` - the connection is gone
    /// * `Err(MalformedEvent)` - one notification could not be decoded;
    ///   the stream stays usable
    async fn poll(&mut self, timeout: Duration) -> ReconcileResult<Option<ChangeEvent>>;

    /// Token that stops delivery at the next poll boundary once cancelled.
    fn cancel_handle(&self) -> CancellationToken;
}

/// Destination for per-key status rows (e.g. STATE_DB).
#[async_trait]
pub trait StatusSink: Send + Sync {
    async fn set_status(&self, table: &str, key: &str, row: &Row) -> ReconcileResult<()>;

    async fn clear_status(&self, table: &str, key: &str) -> ReconcileResult<()>;
}
