use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{mpsc, Notify};
use tokio_util::codec::{Decoder, Encoder, Framed};

use super::{BoxFuture, CloseReason, Connection, ConnectionLifecycleHooks};
use crate::endpoint::Endpoint;
use crate::error::MessageCenterError;
use crate::message::Message;

/// The default `Connection`: a framed transport plus the outbound queue and
/// lifecycle bookkeeping every implementation needs. Generic over the
/// transport so tests can substitute an in-memory duplex pipe for a real
/// `TcpStream`.
pub struct FramedConnection<T, C> {
    endpoint: Endpoint,
    valid: AtomicBool,
    close_reason: Mutex<Option<CloseReason>>,
    outbound_tx: mpsc::UnboundedSender<Message>,
    outbound_rx: Mutex<Option<mpsc::UnboundedReceiver<Message>>>,
    transport: Mutex<Option<T>>,
    codec: Mutex<Option<C>>,
    hooks: Arc<dyn ConnectionLifecycleHooks>,
    closed: Notify,
}

impl<T, C> FramedConnection<T, C>
where
    T: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    C: Decoder<Item = Message> + Encoder<Message> + Send + 'static,
    C::Error: std::fmt::Display + Send,
{
    pub fn new(
        endpoint: Endpoint,
        transport: T,
        codec: C,
        hooks: Arc<dyn ConnectionLifecycleHooks>,
    ) -> Self {
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        hooks.on_connection_opened();
        FramedConnection {
            endpoint,
            valid: AtomicBool::new(true),
            close_reason: Mutex::new(None),
            outbound_tx,
            outbound_rx: Mutex::new(Some(outbound_rx)),
            transport: Mutex::new(Some(transport)),
            codec: Mutex::new(Some(codec)),
            hooks,
            closed: Notify::new(),
        }
    }

    fn invalidate(&self, reason: CloseReason) {
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
}

impl<T, C> Connection for FramedConnection<T, C>
where
    T: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    C: Decoder<Item = Message> + Encoder<Message> + Send + 'static,
    C::Error: std::fmt::Display + Send,
{
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
        self.outbound_tx.send(msg).map_err(|_| MessageCenterError::RaceLost {
            endpoint: self.endpoint,
        })
    }

    fn close(&self, reason: CloseReason) {
        self.invalidate(reason);
    }

    fn run(self: Arc<Self>) -> BoxFuture<'static, ()> {
        Box::pin(async move {
            let transport = match self.transport.lock().unwrap().take() {
                Some(t) => t,
                None => return,
            };
            let codec = match self.codec.lock().unwrap().take() {
                Some(c) => c,
                None => return,
            };
            let mut outbound = match self.outbound_rx.lock().unwrap().take() {
                Some(rx) => rx,
                None => return,
            };
            let mut framed = Framed::new(transport, codec);

            loop {
                tokio::select! {
                    biased;

                    _ = self.closed.notified() => {
                        break;
                    }

                    outgoing = outbound.recv() => {
                        match outgoing {
                            Some(msg) => {
                                if let Err(e) = framed.send(msg).await {
                                    self.invalidate(CloseReason::TransportClosed(e.to_string()));
                                    break;
                                }
                            }
                            None => {
                                // Sender side dropped; nothing more will ever be sent,
                                // but keep draining inbound traffic.
                            }
                        }
                    }

                    incoming = framed.next() => {
                        match incoming {
                            Some(Ok(msg)) => self.hooks.on_message_received(msg),
                            Some(Err(e)) => {
                                self.invalidate(CloseReason::TransportClosed(e.to_string()));
                                break;
                            }
                            None => {
                                self.invalidate(CloseReason::TransportClosed("eof".into()));
                                break;
                            }
                        }
                    }
                }
            }
        })
    }
}
