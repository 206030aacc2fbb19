//! Redis-backed configuration store (CONFIG_DB / STATE_DB).
//!
//! Rows live in hashes named `TABLE|key`. Changes are observed through
//! keyspace notifications on `__keyspace@<db>__:TABLE|*`; the notification
//! only names the key, so the subscription re-reads the hash at poll time
//! and delivers the row as it is now. An empty hash is delivered as DEL.
//!
//! Keyspace notifications must be enabled on the server
//! (`notify-keyspace-events` containing `K` and `h`/`g`).

use async_trait::async_trait;
use futures::{Stream, StreamExt};
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use std::collections::{HashMap, HashSet};
use std::pin::Pin;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::config::StoreConfig;
use crate::error::{ReconcileError, ReconcileResult};
use crate::listener::{ChangeListener, StatusSink, Subscription};
use crate::snapshot::{ChangeEvent, Row, Snapshot};

/// Separator between table name and row key in CONFIG_DB.
pub const TABLE_SEPARATOR: char = '|';

fn unavailable(operation: &str, e: redis::RedisError) -> ReconcileError {
    ReconcileError::store_unavailable(operation, e.to_string())
}

/// Lazily connected redis database.
struct RedisDatabase {
    client: redis::Client,
    db: u32,
    connection: Mutex<Option<ConnectionManager>>,
}

impl RedisDatabase {
    fn open(config: &StoreConfig, db: u32) -> ReconcileResult<Self> {
        let uri = format!("{}{}", config.redis_url(), db);
        let client = redis::Client::open(uri.as_str())
            .map_err(|e| ReconcileError::config("store", format!("{}: {}", uri, e)))?;
        Ok(Self {
            client,
            db,
            connection: Mutex::new(None),
        })
    }

    async fn connection(&self) -> ReconcileResult<ConnectionManager> {
        let mut guard = self.connection.lock().await;
        if let Some(conn) = guard.as_ref() {
            return Ok(conn.clone());
        }
        let conn = self
            .client
            .get_connection_manager()
            .await
            .map_err(|e| unavailable("connect", e))?;
        info!(db = self.db, "Connected to redis");
        *guard = Some(conn.clone());
        Ok(conn)
    }

    /// Forgets the cached connection so the next call reconnects.
    async fn reset(&self) {
        *self.connection.lock().await = None;
    }
}

/// Config store backed by a redis server.
pub struct RedisStore {
    config_db: RedisDatabase,
    state_db: RedisDatabase,
}

impl std::fmt::Debug for RedisStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisStore")
            .field("config_db", &self.config_db.db)
            .field("state_db", &self.state_db.db)
            .finish()
    }
}

impl RedisStore {
    /// Creates the store. No connection is made until first use.
    pub fn new(config: &StoreConfig) -> ReconcileResult<Self> {
        Ok(Self {
            config_db: RedisDatabase::open(config, config.config_db_number)?,
            state_db: RedisDatabase::open(config, config.state_db_number)?,
        })
    }

    async fn read_table(
        conn: &mut ConnectionManager,
        table: &str,
        snapshot: &mut Snapshot,
    ) -> ReconcileResult<()> {
        let pattern = format!("{}{}*", table, TABLE_SEPARATOR);
        let keys: Vec<String> = conn
            .keys(&pattern)
            .await
            .map_err(|e| unavailable("load_all", e))?;

        for redis_key in keys {
            let Some((_, key)) = redis_key.split_once(TABLE_SEPARATOR) else {
                continue;
            };
            let fields: HashMap<String, String> = conn
                .hgetall(&redis_key)
                .await
                .map_err(|e| unavailable("load_all", e))?;
            if !fields.is_empty() {
                snapshot.insert(table, key, fields.into_iter().collect())?;
            }
        }
        Ok(())
    }
}

#[async_trait]
impl ChangeListener for RedisStore {
    async fn load_all(&self, tables: &[String]) -> ReconcileResult<Snapshot> {
        let mut conn = self.config_db.connection().await?;
        let mut snapshot = Snapshot::new(tables.iter().cloned());
        for table in tables {
            if let Err(e) = Self::read_table(&mut conn, table, &mut snapshot).await {
                if e.is_store_unavailable() {
                    self.config_db.reset().await;
                }
                return Err(e);
            }
        }
        debug!(rows = snapshot.len(), "Loaded tables from CONFIG_DB");
        Ok(snapshot)
    }

    async fn subscribe(&self, tables: &[String]) -> ReconcileResult<Box<dyn Subscription>> {
        let mut pubsub = self
            .config_db
            .client
            .get_async_pubsub()
            .await
            .map_err(|e| unavailable("subscribe", e))?;

        for table in tables {
            let pattern = format!(
                "__keyspace@{}__:{}{}*",
                self.config_db.db, table, TABLE_SEPARATOR
            );
            pubsub
                .psubscribe(&pattern)
                .await
                .map_err(|e| unavailable("subscribe", e))?;
            debug!(pattern = %pattern, "Subscribed");
        }

        let conn = self.config_db.connection().await?;
        Ok(Box::new(RedisSubscription {
            messages: Box::pin(pubsub.into_on_message()),
            conn,
            tables: tables.iter().cloned().collect(),
            cancel: CancellationToken::new(),
        }))
    }
}

#[async_trait]
impl StatusSink for RedisStore {
    async fn set_status(&self, table: &str, key: &str, row: &Row) -> ReconcileResult<()> {
        let mut conn = self.state_db.connection().await?;
        let redis_key = format!("{}{}{}", table, TABLE_SEPARATOR, key);
        let items: Vec<(&String, &String)> = row.iter().collect();
        let _: () = conn
            .hset_multiple(&redis_key, &items)
            .await
            .map_err(|e| unavailable("set_status", e))?;
        Ok(())
    }

    async fn clear_status(&self, table: &str, key: &str) -> ReconcileResult<()> {
        let mut conn = self.state_db.connection().await?;
        let redis_key = format!("{}{}{}", table, TABLE_SEPARATOR, key);
        let _: () = conn
            .del(&redis_key)
            .await
            .map_err(|e| unavailable("clear_status", e))?;
        Ok(())
    }
}

/// Extracts `(table, key)` from a keyspace channel name.
///
/// `__keyspace@4__:FEATURE|ntp` yields `("FEATURE", "ntp")`.
pub fn parse_keyspace_channel(channel: &str) -> Option<(&str, &str)> {
    let (prefix, redis_key) = channel.split_once(':')?;
    if !prefix.starts_with("__keyspace@") {
        return None;
    }
    redis_key.split_once(TABLE_SEPARATOR)
}

/// Keyspace-notification subscription.
pub struct RedisSubscription {
    messages: Pin<Box<dyn Stream<Item = redis::Msg> + Send>>,
    conn: ConnectionManager,
    tables: HashSet<String>,
    cancel: CancellationToken,
}

impl RedisSubscription {
    async fn read_event(&mut self, table: &str, key: &str) -> ReconcileResult<ChangeEvent> {
        let redis_key = format!("{}{}{}", table, TABLE_SEPARATOR, key);
        let fields: HashMap<String, String> = self
            .conn
            .hgetall(&redis_key)
            .await
            .map_err(|e| unavailable("poll", e))?;
        Ok(if fields.is_empty() {
            ChangeEvent::del(table, key)
        } else {
            ChangeEvent::set(table, key, fields.into_iter().collect())
        })
    }
}

#[async_trait]
impl Subscription for RedisSubscription {
    async fn poll(&mut self, timeout: Duration) -> ReconcileResult<Option<ChangeEvent>> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if self.cancel.is_cancelled() {
                return Ok(None);
            }

            let msg = tokio::select! {
                msg = self.messages.next() => msg,
                _ = self.cancel.cancelled() => return Ok(None),
                _ = tokio::time::sleep_until(deadline) => return Ok(None),
            };
            let Some(msg) = msg else {
                return Err(ReconcileError::store_unavailable(
                    "poll",
                    "keyspace notification stream closed",
                ));
            };

            let channel = msg.get_channel_name().to_string();
            let Some((table, key)) = parse_keyspace_channel(&channel) else {
                return Err(ReconcileError::malformed(
                    channel.clone(),
                    "not a TABLE|key keyspace channel",
                ));
            };
            if !self.tables.contains(table) {
                continue;
            }
            let event = self.read_event(table, key).await?;
            return Ok(Some(event));
        }
    }

    fn cancel_handle(&self) -> CancellationToken {
        self.cancel.clone()
    }
}
