pub mod addr;
pub mod metrics;
pub mod server;
pub mod socket;
mod error;
mod sys;

pub use self::error::{ErrorCode, ProvisionError, ResolveError, errno};
pub use self::addr::{
	resolve, AddrFlags, AddressCandidate, Family, Protocol, ResolutionHints, SockType,
};
pub use self::socket::{MsgFlags, OptLevel, Shutdown, SockOption, Socket, SocketState};
pub use self::server::{
	AcceptOutcome, Connection, ConnectionConfig, Listener, ListenerConfig, Packet, PendingStart,
	RecvOutcome,
};
