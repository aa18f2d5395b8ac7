//! In-process test doubles for `Connection`/`ConnectionFactory`: fakes
//! that stand in for the network so scenario tests can drive timing and
//! failure injection deterministically.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use message_center::{
    CloseReason, Connection, ConnectionFactory, ConnectionLifecycleHooks, Endpoint,
    MessageCenterError, Message,
};

/// Turns on env-filtered logging for a test binary; safe to call from every
/// test function since a second call after the first is silently ignored.
pub fn init_logging() {
    let _ = env_logger::try_init();
}

/// A `Connection` whose validity is flipped directly by the test instead of
/// by real I/O.
pub struct MockConnection {
    endpoint: Endpoint,
    valid: AtomicBool,
    close_reason: Mutex<Option<CloseReason>>,
    hooks: Arc<dyn ConnectionLifecycleHooks>,
    closed: tokio::sync::Notify,
    pub sent: Mutex<Vec<Message>>,
}

impl MockConnection {
    fn new(endpoint: Endpoint, hooks: Arc<dyn ConnectionLifecycleHooks>) -> Arc<Self> {
        hooks.on_connection_opened();
        Arc::new(MockConnection {
            endpoint,
            valid: AtomicBool::new(true),
            close_reason: Mutex::new(None),
            hooks,
            closed: tokio::sync::Notify::new(),
            sent: Mutex::new(Vec::new()),
        })
    }
}

impl Connection for MockConnection {
    fn endpoint(&self) -> Endpoint {
        self.endpoint
    }

    fn is_valid(&self) -> bool {
        self.valid.load(Ordering::SeqCst)
    }

    fn close_reason(&self) -> Option<CloseReason> {
        self.close_reason.lock().unwrap().clone()
    }

    fn send(&self, msg: Message) -> Result<(), MessageCenterError> {
        if !self.is_valid() {
            return Err(MessageCenterError::RaceLost {
                endpoint: self.endpoint,
            });
        }
        self.sent.lock().unwrap().push(msg);
        Ok(())
    }

    fn close(&self, reason: CloseReason) {
        if self
            .valid
            .compare_exchange(true, false, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            *self.close_reason.lock().unwrap() = Some(reason);
            self.hooks.on_connection_closed();
            self.closed.notify_waiters();
        }
    }

    /// Mirrors `FramedConnection::run`'s contract (blocks until `close` is
    /// called) without any real I/O. Creating the `Notified` future before
    /// the validity check avoids the lost-wakeup race the pattern exists to
    /// close, per `tokio::sync::Notify`'s own documented usage.
    fn run(self: Arc<Self>) -> message_center::conn::BoxFuture<'static, ()> {
        Box::pin(async move {
            let notified = self.closed.notified();
            if self.is_valid() {
                notified.await;
            }
        })
    }
}

/// Dials instantly, optionally failing for a configured set of endpoints and
/// counting attempts per endpoint.
#[derive(Default)]
pub struct MockConnectionFactory {
    dial_attempts: Mutex<HashMap<Endpoint, usize>>,
    fail_endpoints: Mutex<std::collections::HashSet<Endpoint>>,
    connections: Mutex<Vec<Arc<MockConnection>>>,
}

impl MockConnectionFactory {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn fail(&self, endpoint: Endpoint) {
        self.fail_endpoints.lock().unwrap().insert(endpoint);
    }

    pub fn unfail(&self, endpoint: Endpoint) {
        self.fail_endpoints.lock().unwrap().remove(&endpoint);
    }

    pub fn dial_count(&self, endpoint: Endpoint) -> usize {
        *self.dial_attempts.lock().unwrap().get(&endpoint).unwrap_or(&0)
    }

    /// All connections ever produced, in dial order; lets a test reach in
    /// and close one from outside the message center.
    pub fn connections_for(&self, endpoint: Endpoint) -> Vec<Arc<MockConnection>> {
        self.connections
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.endpoint() == endpoint)
            .cloned()
            .collect()
    }
}

impl ConnectionFactory for MockConnectionFactory {
    fn connect(
        &self,
        endpoint: Endpoint,
        hooks: Arc<dyn ConnectionLifecycleHooks>,
    ) -> message_center::conn::BoxFuture<'static, Result<Arc<dyn Connection>, MessageCenterError>>
    {
        *self.dial_attempts.lock().unwrap().entry(endpoint).or_insert(0) += 1;
        let should_fail = self.fail_endpoints.lock().unwrap().contains(&endpoint);
        if should_fail {
            return Box::pin(async move {
                Err(MessageCenterError::ConnectionFailed {
                    endpoint,
                    reason: "injected dial failure".into(),
                })
            });
        }
        let conn = MockConnection::new(endpoint, hooks);
        self.connections.lock().unwrap().push(conn.clone());
        Box::pin(async move { Ok(conn as Arc<dyn Connection>) })
    }
}

/// Counts concurrent dial attempts, for invariant-10-style checks that want
/// a coarser signal than the per-endpoint counter above.
pub struct CountingHooks {
    pub opened: AtomicUsize,
    pub closed: AtomicUsize,
}

impl Default for CountingHooks {
    fn default() -> Self {
        CountingHooks {
            opened: AtomicUsize::new(0),
            closed: AtomicUsize::new(0),
        }
    }
}

impl ConnectionLifecycleHooks for CountingHooks {
    fn on_connection_opened(&self) {
        self.opened.fetch_add(1, Ordering::SeqCst);
    }
    fn on_connection_closed(&self) {
        self.closed.fetch_add(1, Ordering::SeqCst);
    }
    fn on_message_received(&self, _msg: Message) {}
}
