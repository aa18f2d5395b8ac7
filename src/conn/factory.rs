use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpStream;
use tokio_util::codec::{Decoder, Encoder};

use super::{BoxFuture, Connection, FramedConnection};
use crate::endpoint::Endpoint;
use crate::error::MessageCenterError;
use crate::message::Message;

/// Callbacks a `Connection` invokes over its own lifetime: once when its
/// transport becomes usable, once when it closes, and any number of times
/// as framed messages arrive. Fire-and-forget — `Connection` holds no
/// reference back to whatever these hooks are attached to — the reverse
/// edge from a connection back to its owner is a fire-and-forget
/// notification, not ownership.
pub trait ConnectionLifecycleHooks: Send + Sync {
    fn on_connection_opened(&self);
    fn on_connection_closed(&self);
    fn on_message_received(&self, msg: Message);
}

/// Asynchronously produces a live `Connection` for a given endpoint.
pub trait ConnectionFactory: Send + Sync {
    fn connect(
        &self,
        endpoint: Endpoint,
        hooks: Arc<dyn ConnectionLifecycleHooks>,
    ) -> BoxFuture<'static, Result<Arc<dyn Connection>, MessageCenterError>>;
}

/// Dials a plain TCP connection and frames it with a caller-supplied codec.
///
/// `C` is built fresh for every dial via `make_codec`, matching
/// `tokio_util::codec::Framed`'s requirement that a codec's internal
/// buffering not be shared across connections.
pub struct TcpConnectionFactory<C, F> {
    connect_timeout: Option<Duration>,
    make_codec: F,
    _codec: std::marker::PhantomData<C>,
}

impl<C, F> TcpConnectionFactory<C, F>
where
    C: Decoder<Item = Message> + Encoder<Message> + Send + 'static,
    C::Error: std::fmt::Display + Send,
    F: Fn() -> C + Send + Sync + 'static,
{
    pub fn new(connect_timeout: Option<Duration>, make_codec: F) -> Self {
        TcpConnectionFactory {
            connect_timeout,
            make_codec,
            _codec: std::marker::PhantomData,
        }
    }
}

impl<C, F> ConnectionFactory for TcpConnectionFactory<C, F>
where
    C: Decoder<Item = Message> + Encoder<Message> + Send + 'static,
    C::Error: std::fmt::Display + Send,
    F: Fn() -> C + Send + Sync + 'static,
{
    fn connect(
        &self,
        endpoint: Endpoint,
        hooks: Arc<dyn ConnectionLifecycleHooks>,
    ) -> BoxFuture<'static, Result<Arc<dyn Connection>, MessageCenterError>> {
        let timeout = self.connect_timeout;
        let codec = (self.make_codec)();
        Box::pin(async move {
            let dial = TcpStream::connect(endpoint.addr());
            let stream = match timeout {
                Some(d) => tokio::time::timeout(d, dial).await.map_err(|_| {
                    MessageCenterError::ConnectionFailed {
                        endpoint,
                        reason: "connect timed out".into(),
                    }
                })?,
                None => dial.await,
            }
            .map_err(|e| MessageCenterError::ConnectionFailed {
                endpoint,
                reason: e.to_string(),
            })?;

            // `run()` is spawned by `ConnectionManager` once this connection
            // is registered in the pool, not here: the manager is the one
            // that needs to observe completion and call `remove`.
            let conn = Arc::new(FramedConnection::new(endpoint, stream, codec, hooks));
            Ok(conn as Arc<dyn Connection>)
        })
    }
}
