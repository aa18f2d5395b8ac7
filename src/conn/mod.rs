//! A single bidirectional framed transport to one endpoint.
//!
//! Wire framing of `Message` payloads is out of scope for this crate; the
//! default `Connection` is generic over a `Transport` and a
//! `tokio_util::codec` so a caller supplies both.

mod factory;
mod framed;

pub use self::factory::{ConnectionFactory, ConnectionLifecycleHooks, TcpConnectionFactory};
pub use self::framed::FramedConnection;

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::endpoint::Endpoint;
use crate::error::MessageCenterError;
use crate::message::Message;

/// Why a connection was torn down; retained once `is_valid()` flips to
/// `false`.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum CloseReason {
    /// The peer closed the transport, or a read/write failed.
    TransportClosed(String),
    /// `ConnectionManager::abort` closed every connection for an endpoint.
    Aborted,
    /// `ConnectionManager::close` tore the pool down.
    ManagerShutdown,
    /// `ConnectionManager::remove` replaced this connection explicitly.
    Removed,
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            CloseReason::TransportClosed(msg) => write!(f, "transport closed: {}", msg),
            CloseReason::Aborted => f.write_str("aborted"),
            CloseReason::ManagerShutdown => f.write_str("manager shut down"),
            CloseReason::Removed => f.write_str("removed"),
        }
    }
}

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// A single bidirectional framed transport to one endpoint.
///
/// Identity is immutable; `is_valid()` flips exactly once, true to false.
/// `run()` drives the background reader/writer loop and must be spawned by
/// the caller (`ConnectionManager` does this); it completes once the
/// transport closes or `close()` is called.
pub trait Connection: Send + Sync {
    fn endpoint(&self) -> Endpoint;

    fn is_valid(&self) -> bool;

    fn close_reason(&self) -> Option<CloseReason>;

    /// Enqueues `msg` for transmission. Non-blocking; fails immediately if
    /// the connection is no longer valid (the caller lost the race between
    /// selecting this connection and sending on it).
    fn send(&self, msg: Message) -> Result<(), MessageCenterError>;

    /// Tears the connection down with `reason`. Idempotent: a second call
    /// observes the `CloseReason` set by the first.
    fn close(&self, reason: CloseReason);

    /// Drives the connection until it closes. Must be spawned as its own
    /// task; `Connection` is otherwise passive.
    fn run(self: Arc<Self>) -> BoxFuture<'static, ()>;
}
