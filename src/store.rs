//! Pluggable last-known-state store
//!
//! One blob is retained per room, superseded unconditionally by each write
//! and dropped once the TTL window elapses since the last write. Two
//! interchangeable backends implement the same contract:
//!
//! - [`MemoryStore`]: in-process map with a periodic expiry sweep
//! - [`RedisStore`]: external store using native per-key expiry
//!
//! [`connect`] picks the backend once at startup; the hub only ever sees
//! `Arc<dyn StateStore>` and cannot tell which one is active.

use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use redis::AsyncCommands;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::error::StoreError;
use crate::types::{RoomId, StateBlob};

/// How often the in-process backend scans for expired records
const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Bound on establishing the external backend at startup
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Redis key prefix; the full key is derived from the room identifier
const KEY_PREFIX: &str = "sync-relay:room:";

/// Last-known-state store contract
///
/// `get` signals a missing or expired record as `Ok(None)`; errors are
/// genuine I/O failures only. `put` overwrites unconditionally and resets
/// the record's expiry clock to now + TTL.
#[async_trait]
pub trait StateStore: Send + Sync {
    async fn get(&self, room: &RoomId) -> Result<Option<StateBlob>, StoreError>;
    async fn put(&self, room: &RoomId, state: StateBlob) -> Result<(), StoreError>;
}

#[derive(Debug)]
struct Record {
    state: StateBlob,
    written_at: Instant,
}

/// In-process store: a map plus a background expiry sweep
///
/// Reads report expired-but-unswept records as absent; only the sweep task
/// deletes. The sweep holds a weak reference, so dropping the last store
/// handle ends it.
pub struct MemoryStore {
    records: Arc<Mutex<HashMap<RoomId, Record>>>,
    ttl: Duration,
}

impl MemoryStore {
    /// Create the store and spawn its sweep task
    pub fn new(ttl: Duration) -> Self {
        let records: Arc<Mutex<HashMap<RoomId, Record>>> = Arc::new(Mutex::new(HashMap::new()));
        tokio::spawn(Self::run_sweeper(Arc::downgrade(&records), ttl));
        Self { records, ttl }
    }

    async fn run_sweeper(records: Weak<Mutex<HashMap<RoomId, Record>>>, ttl: Duration) {
        let mut interval = tokio::time::interval(SWEEP_INTERVAL);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            interval.tick().await;
            let Some(records) = records.upgrade() else {
                break;
            };
            let removed = Self::sweep(&mut *records.lock().await, ttl, Instant::now());
            if removed > 0 {
                debug!(removed, "Swept expired room state");
            }
        }
    }

    /// Remove every record older than `ttl` as of `now`; returns the count
    fn sweep(records: &mut HashMap<RoomId, Record>, ttl: Duration, now: Instant) -> usize {
        let before = records.len();
        records.retain(|_, r| now.duration_since(r.written_at) < ttl);
        before - records.len()
    }
}

#[async_trait]
impl StateStore for MemoryStore {
    async fn get(&self, room: &RoomId) -> Result<Option<StateBlob>, StoreError> {
        let records = self.records.lock().await;
        let state = records
            .get(room)
            .filter(|r| r.written_at.elapsed() < self.ttl)
            .map(|r| r.state.clone());
        Ok(state)
    }

    async fn put(&self, room: &RoomId, state: StateBlob) -> Result<(), StoreError> {
        let mut records = self.records.lock().await;
        records.insert(
            room.clone(),
            Record {
                state,
                written_at: Instant::now(),
            },
        );
        Ok(())
    }
}

/// External-durable store backed by redis with native per-key expiry
///
/// Every write refreshes the key's expiry to the TTL window, so no local
/// sweep exists. The shared `ConnectionManager` reconnects on its own;
/// individual operation failures surface as [`StoreError::Redis`].
pub struct RedisStore {
    conn: redis::aio::ConnectionManager,
    ttl_secs: u64,
}

impl RedisStore {
    /// Connect to the given redis target
    ///
    /// Fails if the initial connection cannot be established; callers fall
    /// back to [`MemoryStore`] in that case.
    pub async fn connect(url: &str, ttl: Duration) -> Result<Self, StoreError> {
        let client = redis::Client::open(url)?;
        let conn = redis::aio::ConnectionManager::new(client).await?;
        Ok(Self {
            conn,
            ttl_secs: ttl.as_secs().max(1),
        })
    }

    fn key(room: &RoomId) -> String {
        format!("{KEY_PREFIX}{room}")
    }
}

#[async_trait]
impl StateStore for RedisStore {
    async fn get(&self, room: &RoomId) -> Result<Option<StateBlob>, StoreError> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = conn.get(Self::key(room)).await?;
        match raw {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    async fn put(&self, room: &RoomId, state: StateBlob) -> Result<(), StoreError> {
        let json = serde_json::to_string(&state)?;
        let mut conn = self.conn.clone();
        let _: () = conn.set_ex(Self::key(room), json, self.ttl_secs).await?;
        Ok(())
    }
}

/// Select and initialize the store backend once at startup
///
/// With a redis URL configured, the external backend is attempted within a
/// bounded timeout; any failure degrades to the in-process backend with a
/// logged warning. The returned client is `Some` only when the external
/// backend is active, and is what the cross-process fan-out adapter attaches
/// to.
pub async fn connect(
    redis_url: Option<&str>,
    ttl: Duration,
) -> (Arc<dyn StateStore>, Option<redis::Client>) {
    if let Some(url) = redis_url {
        match tokio::time::timeout(CONNECT_TIMEOUT, RedisStore::connect(url, ttl)).await {
            Ok(Ok(store)) => {
                info!("State store: redis ({url})");
                // A second client handle for the pub/sub adapter; opening a
                // client does not itself connect, so this cannot fail here
                // after connect() just succeeded on the same URL.
                let client = redis::Client::open(url).ok();
                return (Arc::new(store), client);
            }
            Ok(Err(e)) => {
                warn!("Redis unavailable ({e}), falling back to in-memory state store");
            }
            Err(_) => {
                warn!("Redis connection timed out, falling back to in-memory state store");
            }
        }
    } else {
        info!("State store: in-memory");
    }
    (Arc::new(MemoryStore::new(ttl)), None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn room(s: &str) -> RoomId {
        RoomId::parse(s).unwrap()
    }

    #[tokio::test]
    async fn test_memory_put_get() {
        let store = MemoryStore::new(Duration::from_secs(60));
        let r = room("abc123");

        assert!(store.get(&r).await.unwrap().is_none());

        store.put(&r, json!({"turn": 1})).await.unwrap();
        assert_eq!(store.get(&r).await.unwrap(), Some(json!({"turn": 1})));
    }

    #[tokio::test]
    async fn test_memory_put_supersedes() {
        let store = MemoryStore::new(Duration::from_secs(60));
        let r = room("abc123");

        store.put(&r, json!({"turn": 1})).await.unwrap();
        store.put(&r, json!({"turn": 2})).await.unwrap();
        assert_eq!(store.get(&r).await.unwrap(), Some(json!({"turn": 2})));
    }

    #[tokio::test]
    async fn test_memory_rooms_independent() {
        let store = MemoryStore::new(Duration::from_secs(60));
        store.put(&room("abc123"), json!(1)).await.unwrap();

        assert!(store.get(&room("xyz789")).await.unwrap().is_none());
        assert_eq!(store.get(&room("abc123")).await.unwrap(), Some(json!(1)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_memory_get_absent_after_ttl() {
        let ttl = Duration::from_secs(100);
        let store = MemoryStore::new(ttl);
        let r = room("abc123");

        store.put(&r, json!({"turn": 1})).await.unwrap();

        tokio::time::advance(Duration::from_secs(99)).await;
        assert!(store.get(&r).await.unwrap().is_some());

        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(store.get(&r).await.unwrap().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_memory_put_resets_expiry_clock() {
        let ttl = Duration::from_secs(100);
        let store = MemoryStore::new(ttl);
        let r = room("abc123");

        store.put(&r, json!({"turn": 1})).await.unwrap();
        tokio::time::advance(Duration::from_secs(90)).await;
        store.put(&r, json!({"turn": 2})).await.unwrap();
        tokio::time::advance(Duration::from_secs(90)).await;

        // 180s after the first write, but only 90s after the last one
        assert_eq!(store.get(&r).await.unwrap(), Some(json!({"turn": 2})));
    }

    #[test]
    fn test_sweep_removes_only_expired() {
        let ttl = Duration::from_secs(100);
        let now = Instant::now();
        let mut records = HashMap::new();
        records.insert(
            room("old123"),
            Record {
                state: json!(1),
                written_at: now - Duration::from_secs(101),
            },
        );
        records.insert(
            room("new123"),
            Record {
                state: json!(2),
                written_at: now - Duration::from_secs(50),
            },
        );

        let removed = MemoryStore::sweep(&mut records, ttl, now);

        assert_eq!(removed, 1);
        assert!(records.contains_key(&room("new123")));
        assert!(!records.contains_key(&room("old123")));
    }

    #[test]
    fn test_redis_key_derivation() {
        assert_eq!(
            RedisStore::key(&room("abc123")),
            "sync-relay:room:ABC123"
        );
    }

    #[tokio::test]
    async fn test_connect_falls_back_when_unreachable() {
        // Port 1 is closed; the connection attempt fails fast and the
        // in-process backend takes over transparently.
        let (store, client) = connect(Some("redis://127.0.0.1:1"), Duration::from_secs(60)).await;
        assert!(client.is_none());

        let r = room("abc123");
        store.put(&r, json!({"ok": true})).await.unwrap();
        assert_eq!(store.get(&r).await.unwrap(), Some(json!({"ok": true})));
    }

    #[tokio::test]
    async fn test_connect_without_url_uses_memory() {
        let (store, client) = connect(None, Duration::from_secs(60)).await;
        assert!(client.is_none());
        assert!(store.get(&room("abc123")).await.unwrap().is_none());
    }
}
