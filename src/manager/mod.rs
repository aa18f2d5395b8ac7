//! Pool of `Connection`s keyed by endpoint: at-most-one in-flight connect
//! per endpoint, a failure cooldown, and round-robin selection across a
//! (currently single-member) per-endpoint connection set.

mod entry;

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;

use self::entry::{ConnectionEntry, Pick};
use crate::config::MessageCenterConfig;
use crate::conn::{CloseReason, Connection, ConnectionFactory, ConnectionLifecycleHooks};
use crate::endpoint::Endpoint;
use crate::error::MessageCenterError;

/// How often `close()` polls for the pool to drain, and how often it warns
/// about a pool that isn't draining while it waits.
const CLOSE_POLL_INTERVAL: Duration = Duration::from_millis(10);
const CLOSE_WARN_INTERVAL: Duration = Duration::from_secs(5);

pub struct ConnectionManager {
    entries: DashMap<Endpoint, Arc<ConnectionEntry>>,
    factory: Arc<dyn ConnectionFactory>,
    hooks: Arc<dyn ConnectionLifecycleHooks>,
    config: MessageCenterConfig,
    closing: AtomicBool,
}

impl ConnectionManager {
    pub fn new(
        factory: Arc<dyn ConnectionFactory>,
        hooks: Arc<dyn ConnectionLifecycleHooks>,
        config: MessageCenterConfig,
    ) -> Self {
        ConnectionManager {
            entries: DashMap::new(),
            factory,
            hooks,
            config,
            closing: AtomicBool::new(false),
        }
    }

    /// Returns a live connection for `endpoint`, dialing one if necessary.
    /// Concurrent callers for the same endpoint collapse onto a single
    /// dial attempt.
    pub async fn get_connection(
        self: &Arc<Self>,
        endpoint: Endpoint,
    ) -> Result<Arc<dyn Connection>, MessageCenterError> {
        loop {
            if self.closing.load(Ordering::SeqCst) {
                return Err(MessageCenterError::ConnectionAborted {
                    endpoint,
                    reason: "connection manager is closing".into(),
                });
            }

            // Fast path: an existing, at-capacity entry with a live pick.
            if let Some(entry) = self.entries.get(&endpoint).map(|e| e.clone()) {
                if let Pick::Hit(conn) = entry.try_pick(self.config.max_connections_per_endpoint) {
                    return Ok(conn);
                }
            }

            // Slow path. Install an empty entry if none exists yet; the
            // loser of a concurrent insert adopts the winner's entry.
            let entry = self
                .entries
                .entry(endpoint)
                .or_insert_with(ConnectionEntry::empty)
                .clone();

            if let Pick::Hit(conn) = entry.try_pick(self.config.max_connections_per_endpoint) {
                return Ok(conn);
            }

            if let Some(last_failure) = *entry.last_failure.lock().unwrap() {
                if last_failure.elapsed() < self.config.connect_retry_delay {
                    debug!("{}: within cooldown, failing fast", endpoint);
                    return Err(MessageCenterError::ConnectionFailed {
                        endpoint,
                        reason: "cooldown in effect".into(),
                    });
                }
            }

            let permit = match tokio::time::timeout(
                self.config.attempt_guard_timeout,
                entry.attempt_guard.acquire(),
            )
            .await
            {
                Ok(Ok(permit)) => permit,
                Ok(Err(_)) => continue, // semaphore closed out from under us; retry
                Err(_) => continue,     // another dialer holds the guard; re-enter the loop
            };

            // Another dialer may have just finished while we waited for
            // the guard.
            if let Pick::Hit(conn) = entry.try_pick(self.config.max_connections_per_endpoint) {
                drop(permit);
                return Ok(conn);
            }

            let mut last_err = None;
            for attempt in 1..=self.config.connect_retry_count.max(1) {
                debug!("{}: dialing (attempt {})", endpoint, attempt);
                match self.factory.connect(endpoint, self.hooks.clone()).await {
                    Ok(conn) => {
                        entry.push(conn.clone());
                        *entry.last_failure.lock().unwrap() = None;
                        drop(permit);
                        self.spawn_reader(endpoint, conn.clone());
                        return Ok(conn);
                    }
                    Err(e) => {
                        warn!("{}: dial attempt {} failed: {}", endpoint, attempt, e);
                        last_err = Some(e);
                        if attempt < self.config.connect_retry_count.max(1) {
                            tokio::time::sleep(self.config.minimum_interconnect_delay).await;
                        }
                    }
                }
            }

            *entry.last_failure.lock().unwrap() = Some(std::time::Instant::now());
            drop(permit);
            let e = last_err.expect("loop runs at least once");
            Err(MessageCenterError::ConnectionFailed {
                endpoint,
                reason: e.to_string(),
            })
        }
    }

    /// Drives `conn.run()` to completion, then removes it from the pool and
    /// logs why.
    fn spawn_reader(self: &Arc<Self>, endpoint: Endpoint, conn: Arc<dyn Connection>) {
        let manager = self.clone();
        tokio::spawn(async move {
            conn.clone().run().await;
            let reason = conn.close_reason();
            manager.remove(endpoint, &conn);
            match reason {
                Some(r) => info!("{}: connection closed: {}", endpoint, r),
                None => info!("{}: connection reader task finished", endpoint),
            }
        });
    }

    /// Removes `connection` from `endpoint`'s entry; drops the entry
    /// entirely once it's empty. Safe under races with a concurrent
    /// `get_connection` installing a fresh entry for the same endpoint.
    pub fn remove(&self, endpoint: Endpoint, connection: &Arc<dyn Connection>) {
        loop {
            let entry = match self.entries.get(&endpoint) {
                Some(e) => e.clone(),
                None => return,
            };
            let now_empty = entry.remove(connection);
            if !now_empty {
                return;
            }
            let removed = self
                .entries
                .remove_if(&endpoint, |_, e| Arc::ptr_eq(e, &entry) && e.is_empty());
            if removed.is_some() {
                return;
            }
            // Either someone else already removed this exact entry, or
            // installed a new one after we observed ours empty. If the key
            // is gone entirely, or points at something else now, we're done
            // either way from this connection's point of view.
            match self.entries.get(&endpoint) {
                Some(current) if Arc::ptr_eq(&current, &entry) => continue,
                _ => return,
            }
        }
    }

    /// Removes `endpoint`'s entry and closes every connection in it with
    /// `ConnectionAborted`.
    pub fn abort(&self, endpoint: Endpoint) {
        if let Some((_, entry)) = self.entries.remove(&endpoint) {
            for conn in entry.snapshot() {
                conn.close(CloseReason::Aborted);
            }
        }
    }

    /// Cancels new dials, closes every open connection, and waits until the
    /// pool drains or `max_wait` elapses.
    pub async fn close(&self, max_wait: Option<Duration>) {
        self.closing.store(true, Ordering::SeqCst);
        for entry in self.entries.iter() {
            for conn in entry.value().snapshot() {
                conn.close(CloseReason::ManagerShutdown);
            }
        }

        let mut waited = Duration::ZERO;
        let mut since_warn = Duration::ZERO;
        while self.connection_count() > 0 {
            if let Some(max) = max_wait {
                if waited >= max {
                    break;
                }
            }
            tokio::time::sleep(CLOSE_POLL_INTERVAL).await;
            waited += CLOSE_POLL_INTERVAL;
            since_warn += CLOSE_POLL_INTERVAL;
            if since_warn >= CLOSE_WARN_INTERVAL {
                warn!(
                    "connection manager close still waiting on {} connections",
                    self.connection_count()
                );
                since_warn = Duration::ZERO;
            }
        }
    }

    pub fn connection_count(&self) -> usize {
        self.entries.iter().map(|e| e.value().len()).sum()
    }

    pub fn connected_endpoints(&self) -> HashSet<Endpoint> {
        self.entries
            .iter()
            .filter(|e| !e.value().is_empty())
            .map(|e| *e.key())
            .collect()
    }
}
