//! Tick-driven TCP server.
//!
//! There is no reactor or thread pool. An external driver calls
//! [`Listener::tick`] and every live [`Connection::tick`] in a loop, and
//! reacts to what the callbacks receive.

mod config;
mod connection;
mod listener;
mod packet;
mod pending;

pub use self::config::{ConnectionConfig, ListenerConfig};
pub use self::connection::{Connection, ReceiveCallback, RecvOutcome};
pub use self::listener::{AcceptOutcome, ConnectionCallback, Listener};
pub use self::packet::Packet;
pub use self::pending::PendingStart;
