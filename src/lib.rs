//! Client-side message center of a distributed actor runtime.
//!
//! Multiplexes a client's outbound requests across a dynamically-changing
//! set of gateway endpoints while preserving per-actor ordering, and
//! surfaces server-originated messages to the client's upper layers.

#[macro_use]
extern crate log;

pub mod actor;
pub mod center;
pub mod config;
pub mod conn;
pub mod endpoint;
pub mod error;
pub mod gateway;
pub mod manager;
pub mod message;
pub mod status;

pub use actor::ActorId;
pub use center::{ClientMessageCenter, Handler};
pub use config::MessageCenterConfig;
pub use conn::{CloseReason, Connection, ConnectionFactory, ConnectionLifecycleHooks, TcpConnectionFactory};
pub use endpoint::Endpoint;
pub use error::{ConfigError, MessageCenterError};
pub use gateway::{GatewayManager, GatewayManagerConfig, InMemoryGatewayManager};
pub use manager::ConnectionManager;
pub use message::{Category, Direction, Message, MessageFactory, Rejection};
pub use status::{ClusterConnectionStatusListener, NullStatusListener};
