use std::fmt;
use std::net::SocketAddr;

use super::config::ListenerConfig;
use super::pending::PendingStart;
use super::Connection;
use crate::addr::{self, ResolutionHints};
use crate::error::{ErrorCode, ProvisionError};
use crate::metrics::Counter;
use crate::socket::Socket;

/// New-connection callback. Takes ownership of each accepted connection.
pub type ConnectionCallback = Box<dyn FnMut(Connection) + Send>;

/// What one [`Listener::tick`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcceptOutcome {
	/// A connection was accepted and handed to the callback.
	Accepted,
	/// No client was waiting.
	Idle,
	/// `accept` (or setting up the accepted socket) failed. The listener
	/// stays usable; the driver decides whether to keep ticking.
	Failed(ErrorCode),
}

/// A bound TCP/IPv4 server socket with a tick-driven accept loop.
///
/// ```text
/// Listener::bind ──> start() ──> PendingStart::wait() ──> tick() ...
///   resolve+bind     reuseaddr, listen, nonblocking       accept
/// ```
pub struct Listener {
	socket: Socket,
	config: ListenerConfig,
	on_connection: Option<ConnectionCallback>,
	accepted: Counter,
}

impl Listener {
	/// Binds `address:port` with the default configuration.
	pub fn bind(address: &str, port: u16) -> Result<Self, ProvisionError> {
		Self::bind_with(address, port, ListenerConfig::default())
	}

	/// Resolves `address:port` as a passive IPv4 stream address and binds the
	/// first candidate that accepts it. Port 0 picks an ephemeral port.
	pub fn bind_with(address: &str, port: u16, config: ListenerConfig) -> Result<Self, ProvisionError> {
		let service = port.to_string();
		let candidates = addr::resolve(Some(address), Some(&service), &ResolutionHints::tcp_v4()).map_err(
			|source| ProvisionError::Resolve {
				host: address.to_owned(),
				service: service.clone(),
				source,
			},
		)?;

		let mut last = ErrorCode::Unknown;
		for candidate in &candidates {
			let attempt = Socket::create_for(candidate).map_err(|err| err.code().unwrap_or(ErrorCode::Unknown));
			let bound = attempt.and_then(|mut socket| socket.bind(candidate).map(|()| socket));
			match bound {
				Ok(socket) => {
					tracing::info!(address = %candidate, "listener bound");
					return Ok(Self {
						socket,
						config,
						on_connection: None,
						accepted: Counter::new(),
					});
				}
				Err(code) => {
					tracing::debug!(address = %candidate, error = %code, "bind candidate failed");
					last = code;
				}
			}
		}

		Err(ProvisionError::Bind {
			host: address.to_owned(),
			service,
			attempts: candidates.len(),
			last,
		})
	}

	/// Runs listen setup on a separate thread. See [`PendingStart`].
	pub fn start(self) -> PendingStart {
		PendingStart::spawn(self)
	}

	/// The setup steps `start` runs, in order.
	pub(crate) fn configure(mut self) -> Result<Self, ProvisionError> {
		if self.config.reuse_addr {
			self.socket
				.set_reuse_addr(true)
				.map_err(|code| ProvisionError::Configure { option: "SO_REUSEADDR", code })?;
		}

		let backlog = self.config.backlog;
		self.socket
			.listen(backlog)
			.map_err(|code| ProvisionError::Listen { backlog, code })?;

		if self.config.nonblocking {
			self.socket
				.set_nonblocking(true)
				.map_err(|code| ProvisionError::NonBlocking { code })?;
		}

		tracing::info!(address = ?self.socket.local_addr().ok(), backlog, "listening");
		Ok(self)
	}

	pub fn on_connection<F>(&mut self, callback: F)
	where
		F: FnMut(Connection) + Send + 'static,
	{
		self.on_connection = Some(Box::new(callback));
	}

	/// One accept step.
	pub fn tick(&mut self) -> AcceptOutcome {
		let socket = match self.socket.accept() {
			Ok(socket) => socket,
			Err(code) if code.is_retry() => return AcceptOutcome::Idle,
			Err(code) => {
				tracing::debug!(error = %code, "accept failed");
				return AcceptOutcome::Failed(code);
			}
		};

		let connection = match Connection::new(socket, self.config.connection) {
			Ok(connection) => connection,
			Err(code) => {
				tracing::debug!(error = %code, "configuring accepted socket failed");
				return AcceptOutcome::Failed(code);
			}
		};

		self.accepted.inc();
		match self.on_connection.as_mut() {
			Some(callback) => callback(connection),
			None => tracing::warn!(id = connection.id(), "no connection callback, connection dropped"),
		}
		AcceptOutcome::Accepted
	}

	/// Connections accepted so far.
	pub fn accepted(&self) -> u64 {
		self.accepted.get()
	}

	pub fn local_addr(&self) -> Result<SocketAddr, ErrorCode> {
		self.socket.local_addr()
	}

	pub fn local_port(&self) -> Result<u16, ErrorCode> {
		self.local_addr().map(|addr| addr.port())
	}

	#[inline]
	pub fn socket(&self) -> &Socket {
		&self.socket
	}
}

impl fmt::Debug for Listener {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Listener")
			.field("socket", &self.socket)
			.field("config", &self.config)
			.field("accepted", &self.accepted.get())
			.finish_non_exhaustive()
	}
}
