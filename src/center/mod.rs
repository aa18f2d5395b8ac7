//! Public send/receive surface of the message center: bucketed routing,
//! the inbound queue, category dispatch, and connection-count
//! notifications.

mod bucket;

use std::sync::atomic::{AtomicU64, AtomicU8, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, OnceLock};

use tokio_stream::wrappers::UnboundedReceiverStream;

use self::bucket::BucketTable;
use crate::actor::ActorId;
use crate::config::MessageCenterConfig;
use crate::conn::{Connection, ConnectionFactory, ConnectionLifecycleHooks};
use crate::endpoint::Endpoint;
use crate::error::MessageCenterError;
use crate::gateway::GatewayManager;
use crate::manager::ConnectionManager;
use crate::message::{Category, Direction, Message, MessageFactory, CATEGORY_COUNT};
use crate::status::ClusterConnectionStatusListener;

/// A registered synchronous handler for one `Category`. Takes precedence
/// over the inbound queue for that category once set.
pub type Handler = Arc<dyn Fn(Message) + Send + Sync>;

/// Lifecycle states. Transitions are one-way:
/// `Constructed -> Running -> Stopped`.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[repr(u8)]
enum State {
    Constructed = 0,
    Running = 1,
    Stopped = 2,
}

impl From<u8> for State {
    fn from(v: u8) -> Self {
        match v {
            0 => State::Constructed,
            1 => State::Running,
            _ => State::Stopped,
        }
    }
}

/// The identity kind an `ActorId` plays as this client's own address.
/// `UpdateClientId` is only valid as a one-way `Client -> GeoClient`
/// transition.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum ClientIdKind {
    Client,
    GeoClient,
}

struct ClientIdentity {
    id: ActorId,
    kind: ClientIdKind,
}

struct Inner {
    state: AtomicU8,
    my_address: Endpoint,
    client_id: Mutex<ClientIdentity>,
    config: MessageCenterConfig,

    gateway_manager: Arc<dyn GatewayManager>,
    connection_manager: OnceLock<Arc<ConnectionManager>>,
    message_factory: MessageFactory,
    status_listener: Arc<dyn ClusterConnectionStatusListener>,

    bucket_table: BucketTable,
    num_messages: AtomicU64,
    gateway_count: AtomicUsize,

    handler_table: [Mutex<Option<Handler>>; CATEGORY_COUNT],
    inbound_tx: Mutex<Option<tokio::sync::mpsc::UnboundedSender<Message>>>,
    inbound_rx: Mutex<Option<tokio::sync::mpsc::UnboundedReceiver<Message>>>,
}

impl Inner {
    fn state(&self) -> State {
        State::from(self.state.load(Ordering::SeqCst))
    }

    fn connection_manager(&self) -> &Arc<ConnectionManager> {
        self.connection_manager
            .get()
            .expect("connection manager installed before Inner is used")
    }
}

impl ConnectionLifecycleHooks for Inner {
    fn on_connection_opened(&self) {
        let old = self.gateway_count.fetch_add(1, Ordering::SeqCst);
        let new = old + 1;
        debug!("gateway count {} -> {}", old, new);
        self.status_listener.gateway_count_changed(new, old);
    }

    fn on_connection_closed(&self) {
        let old = self.gateway_count.fetch_sub(1, Ordering::SeqCst);
        let new = old - 1;
        debug!("gateway count {} -> {}", old, new);
        if new == 0 {
            self.status_listener.cluster_connection_lost();
        }
        self.status_listener.gateway_count_changed(new, old);
    }

    fn on_message_received(&self, msg: Message) {
        self.dispatch_inbound(msg);
    }
}

/// Public send/receive surface of the message center.
///
/// Cheaply `Clone`able (an `Arc` around its shared state): every clone
/// refers to the same routing table, inbound queue, and connection pool.
#[derive(Clone)]
pub struct ClientMessageCenter(Arc<Inner>);

impl ClientMessageCenter {
    pub fn new(
        config: MessageCenterConfig,
        my_address: Endpoint,
        client_id: ActorId,
        factory: Arc<dyn ConnectionFactory>,
        gateway_manager: Arc<dyn GatewayManager>,
        status_listener: Arc<dyn ClusterConnectionStatusListener>,
    ) -> Self {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        let inner = Arc::new(Inner {
            state: AtomicU8::new(State::Constructed as u8),
            my_address,
            client_id: Mutex::new(ClientIdentity {
                id: client_id,
                kind: ClientIdKind::Client,
            }),
            bucket_table: BucketTable::new(config.client_sender_buckets),
            config,
            gateway_manager,
            connection_manager: OnceLock::new(),
            message_factory: MessageFactory::default(),
            status_listener,
            num_messages: AtomicU64::new(0),
            gateway_count: AtomicUsize::new(0),
            handler_table: std::array::from_fn(|_| Mutex::new(None)),
            inbound_tx: Mutex::new(Some(tx)),
            inbound_rx: Mutex::new(Some(rx)),
        });

        let hooks: Arc<dyn ConnectionLifecycleHooks> = inner.clone();
        let manager = Arc::new(ConnectionManager::new(factory, hooks, inner.config.clone()));
        inner
            .connection_manager
            .set(manager)
            .unwrap_or_else(|_| unreachable!("set once, before any other reference escapes"));

        ClientMessageCenter(inner)
    }

    // ---- lifecycle ----

    /// `Constructed -> Running`. A no-op if already running; an error if
    /// the center has already been stopped (transitions are one-way).
    pub fn start(&self) -> Result<(), MessageCenterError> {
        match self.0.state() {
            State::Constructed => {
                self.0.state.store(State::Running as u8, Ordering::SeqCst);
                info!("message center started, address={}", self.0.my_address);
                Ok(())
            }
            State::Running => Ok(()),
            State::Stopped => Err(MessageCenterError::InvalidState(
                "cannot start a stopped message center".into(),
            )),
        }
    }

    /// `{Constructed, Running} -> Stopped`. Closes the inbound queue and
    /// stops the gateway manager. Idempotent.
    pub async fn stop(&self) {
        if self.0.state() == State::Stopped {
            return;
        }
        self.0.state.store(State::Stopped as u8, Ordering::SeqCst);
        self.0.inbound_tx.lock().unwrap().take();
        self.0.gateway_manager.stop();
        self.0.connection_manager().close(None).await;
        info!("message center stopped");
    }

    /// Alias for `stop`, kept for contract compatibility with callers that
    /// expect a `Dispose` name. Idempotent after the first call, like `stop`.
    pub async fn dispose(&self) {
        self.stop().await;
    }

    pub fn running(&self) -> bool {
        self.0.state() == State::Running
    }

    pub fn my_address(&self) -> Endpoint {
        self.0.my_address
    }

    pub fn client_id(&self) -> ActorId {
        self.0.client_id.lock().unwrap().id.clone()
    }

    /// Retained for contract compatibility; the send path has no queue of
    /// its own.
    pub fn send_queue_length(&self) -> usize {
        0
    }

    /// Retained for contract compatibility; inbound messages are dispatched
    /// or enqueued immediately, never held in a separately-counted queue.
    pub fn receive_queue_length(&self) -> usize {
        0
    }

    /// Valid only as a `Client -> GeoClient` identity transition; any other
    /// starting kind fails with `InvalidState`.
    pub fn update_client_id(&self, new_id: ActorId) -> Result<(), MessageCenterError> {
        let mut identity = self.0.client_id.lock().unwrap();
        if identity.kind != ClientIdKind::Client {
            return Err(MessageCenterError::InvalidState(
                "UpdateClientId is only valid from a Client identity".into(),
            ));
        }
        identity.id = new_id;
        identity.kind = ClientIdKind::GeoClient;
        Ok(())
    }

    // ---- inbound path ----

    /// The single reader endpoint of the inbound queue. Categories are not
    /// demultiplexed (a historical artifact, preserved for contract
    /// compatibility); the caller filters by `Message::category`. Can only
    /// be taken once.
    pub fn get_reader(&self, _category: Category) -> Option<UnboundedReceiverStream<Message>> {
        self.0
            .inbound_rx
            .lock()
            .unwrap()
            .take()
            .map(UnboundedReceiverStream::new)
    }

    /// Last-writer-wins; no removal API.
    pub fn register_local_message_handler(&self, category: Category, handler: Handler) {
        *self.0.handler_table[category.index()].lock().unwrap() = Some(handler);
    }

    fn dispatch_inbound(&self, msg: Message) {
        let handler = self.0.handler_table[msg.category.index()].lock().unwrap().clone();
        if let Some(handler) = handler {
            handler(msg);
            return;
        }
        match self.0.inbound_tx.lock().unwrap().as_ref() {
            Some(tx) => {
                if tx.send(msg).is_err() {
                    warn!("inbound queue reader dropped; message discarded");
                }
            }
            None => warn!("inbound queue closed; message discarded"),
        }
    }

    /// Public entry point for a message arriving off a `Connection`'s read
    /// side, or a synthetic rejection routed back through the same path.
    pub fn on_received_message(&self, msg: Message) {
        if self.0.state() == State::Stopped {
            warn!("message center stopped; dropping inbound message");
            return;
        }
        self.dispatch_inbound(msg);
    }

    // ---- rejection ----

    pub fn reject_message(&self, msg: &Message, reason: impl Into<String>, cause: Option<String>) {
        if !self.running() {
            return;
        }
        if msg.direction != Direction::Request {
            let reason = reason.into();
            debug!("dropping rejected non-request message: {}", reason);
            return;
        }
        let reason = reason.into();
        let rsp = self.0.message_factory.create_rejection_response(msg, reason, cause);
        self.on_received_message(rsp);
    }

    // ---- send path ----

    /// Fire-and-forget: spawns the actual routing/send work and returns
    /// immediately.
    pub fn send_message(&self, msg: Message) {
        if !self.running() {
            warn!("message center not running; dropping outbound message");
            return;
        }
        let center = self.clone();
        tokio::spawn(async move {
            center.route(msg).await;
        });
    }

    fn route(&self, msg: Message) -> std::pin::Pin<Box<dyn std::future::Future<Output = ()> + Send + '_>> {
        Box::pin(async move {
            if !self.running() {
                warn!("message center not running; dropping outbound message");
                return;
            }

            // Rule 1: pinned target.
            if let Some(endpoint) = msg.target_endpoint {
                let live = self.0.gateway_manager.get_live_gateways();
                if live.contains(&endpoint.as_gateway_uri()) {
                    match self.0.connection_manager().get_connection(endpoint).await {
                        Ok(conn) => self.dispatch_send(conn, msg),
                        Err(_) => self.reject_message(
                            &msg,
                            format!("Target silo {} is unavailable", endpoint),
                            None,
                        ),
                    }
                } else {
                    self.reject_message(
                        &msg,
                        format!("Target silo {} is unavailable", endpoint),
                        None,
                    );
                }
                return;
            }

            // Rule 2: unordered / system-target round robin.
            if msg.target_actor.is_system_target() || msg.is_unordered {
                let live = self.0.gateway_manager.get_live_gateways();
                if live.is_empty() {
                    self.reject_message(&msg, "No gateways available", None);
                    return;
                }
                let n = self.0.num_messages.fetch_add(1, Ordering::SeqCst);
                let uri = &live[(n as usize) % live.len()];
                let endpoint = match Endpoint::from_gateway_uri(uri) {
                    Some(e) => e,
                    None => {
                        warn!("unparseable gateway uri {}", uri);
                        self.reject_message(&msg, "No gateways available", None);
                        return;
                    }
                };
                match self.0.connection_manager().get_connection(endpoint).await {
                    Ok(conn) => self.dispatch_send(conn, msg),
                    Err(_) => {
                        self.0.gateway_manager.mark_as_dead(uri);
                        self.route(msg).await;
                    }
                }
                return;
            }

            // Rule 3: sticky bucket.
            let index = (msg.target_actor.hash_code() as usize) % self.0.bucket_table.len();
            if let Some(conn) = self.0.bucket_table.get(index) {
                if conn.is_valid() {
                    self.dispatch_send(conn, msg);
                    return;
                }
            }

            let uri = match self.0.gateway_manager.get_live_gateway() {
                Some(uri) => uri,
                None => {
                    self.reject_message(&msg, "No gateways available", None);
                    return;
                }
            };
            let endpoint = match Endpoint::from_gateway_uri(&uri) {
                Some(e) => e,
                None => {
                    warn!("unparseable gateway uri {}", uri);
                    self.reject_message(&msg, "No gateways available", None);
                    return;
                }
            };
            match self.0.connection_manager().get_connection(endpoint).await {
                Ok(conn) => {
                    let adopted = self.0.bucket_table.install(index, conn);
                    self.dispatch_send(adopted, msg);
                }
                Err(_) => {
                    self.0.gateway_manager.mark_as_dead(&uri);
                    self.route(msg).await;
                }
            }
        })
    }

    fn dispatch_send(&self, conn: Arc<dyn Connection>, msg: Message) {
        let pinned = msg.target_endpoint.is_some();
        let endpoint = conn.endpoint();
        match conn.send(msg.clone()) {
            Ok(()) => {}
            Err(_) if pinned => {
                self.reject_message(
                    &msg,
                    format!("Target silo {} is unavailable", endpoint),
                    None,
                );
            }
            Err(_) => {
                let center = self.clone();
                let delay = self.0.config.send_retry_delay;
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    center.send_message(msg);
                });
            }
        }
    }

    // ---- observability surface, delegated to the connection manager ----

    pub fn connection_count(&self) -> usize {
        self.0.connection_manager().connection_count()
    }

    pub fn connected_endpoints(&self) -> std::collections::HashSet<Endpoint> {
        self.0.connection_manager().connected_endpoints()
    }

    pub fn gateway_count(&self) -> usize {
        self.0.gateway_count.load(Ordering::SeqCst)
    }
}
