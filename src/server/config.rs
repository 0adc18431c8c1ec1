use std::time::Duration;

use crate::error::ErrorCode;
use crate::socket::Socket;

// ============================================================================
// Connection Configuration
// ============================================================================

/// Per-connection settings, applied when a connection is built.
#[derive(Debug, Clone, Copy)]
pub struct ConnectionConfig {
	/// Receive buffer capacity for one tick.
	pub recv_capacity: usize,
	/// Pause taken by a tick that found nothing to read.
	pub backoff: Duration,
	/// TCP_NODELAY; left untouched when `None`.
	pub nodelay: Option<bool>,
	/// SO_KEEPALIVE; left untouched when `None`.
	pub keepalive: Option<bool>,
}

impl Default for ConnectionConfig {
	fn default() -> Self {
		Self {
			recv_capacity: 4096,
			backoff: Duration::from_millis(20),
			nodelay: None,
			keepalive: None,
		}
	}
}

impl ConnectionConfig {
	pub fn new() -> Self {
		Self::default()
	}

	/// Clamped to at least one byte, so a tick never reads into an empty
	/// buffer (which would look like an orderly shutdown).
	pub fn recv_capacity(mut self, bytes: usize) -> Self {
		self.recv_capacity = bytes.max(1);
		self
	}

	pub fn backoff(mut self, pause: Duration) -> Self {
		self.backoff = pause;
		self
	}

	pub fn nodelay(mut self, enable: bool) -> Self {
		self.nodelay = Some(enable);
		self
	}

	pub fn keepalive(mut self, enable: bool) -> Self {
		self.keepalive = Some(enable);
		self
	}

	pub(crate) fn apply(&self, socket: &Socket) -> Result<(), ErrorCode> {
		if let Some(enable) = self.nodelay {
			socket.set_tcp_nodelay(enable)?;
		}
		if let Some(enable) = self.keepalive {
			socket.set_keepalive(enable)?;
		}
		Ok(())
	}
}

// ============================================================================
// Listener Configuration
// ============================================================================

/// Settings for [`Listener::start`](super::Listener::start), plus the
/// connection settings handed to every accepted connection.
#[derive(Debug, Clone, Copy)]
pub struct ListenerConfig {
	pub backlog: u32,
	pub reuse_addr: bool,
	/// Switch the listening socket to non-blocking after `listen`.
	pub nonblocking: bool,
	pub connection: ConnectionConfig,
}

impl Default for ListenerConfig {
	fn default() -> Self {
		Self {
			backlog: 3,
			reuse_addr: true,
			nonblocking: true,
			connection: ConnectionConfig::default(),
		}
	}
}

impl ListenerConfig {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn backlog(mut self, backlog: u32) -> Self {
		self.backlog = backlog;
		self
	}

	pub fn reuse_addr(mut self, enable: bool) -> Self {
		self.reuse_addr = enable;
		self
	}

	/// With `false`, `tick` blocks in `accept` until a client arrives.
	pub fn nonblocking(mut self, enable: bool) -> Self {
		self.nonblocking = enable;
		self
	}

	pub fn connection(mut self, config: ConnectionConfig) -> Self {
		self.connection = config;
		self
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn listener_defaults() {
		let cfg = ListenerConfig::default();
		assert_eq!(cfg.backlog, 3);
		assert!(cfg.reuse_addr);
		assert!(cfg.nonblocking);
		assert_eq!(cfg.connection.recv_capacity, 4096);
		assert_eq!(cfg.connection.backoff, Duration::from_millis(20));
		assert_eq!(cfg.connection.nodelay, None);
	}

	#[test]
	fn setters_chain() {
		let cfg = ListenerConfig::new()
			.backlog(128)
			.reuse_addr(false)
			.connection(ConnectionConfig::new().recv_capacity(0).backoff(Duration::ZERO).nodelay(true));
		assert_eq!(cfg.backlog, 128);
		assert!(!cfg.reuse_addr);
		assert_eq!(cfg.connection.recv_capacity, 1);
		assert_eq!(cfg.connection.backoff, Duration::ZERO);
		assert_eq!(cfg.connection.nodelay, Some(true));
	}
}
