use std::cell::Cell;
use std::fmt;
use std::net::SocketAddr;

use super::Packet;
use super::config::ConnectionConfig;
use crate::error::ErrorCode;
use crate::metrics::Counter;
use crate::socket::{MsgFlags, Socket};

static NEXT_ID: Counter = Counter::new();

/// Receive callback. Takes ownership of each packet.
pub type ReceiveCallback = Box<dyn FnMut(Packet) + Send>;

/// What one [`Connection::tick`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecvOutcome {
	/// `n` bytes were read and handed to the receive callback.
	Dispatched(usize),
	/// Nothing to read; the tick paused for the backoff.
	Idle,
	/// The socket is closed. `ErrorCode::None` for an orderly shutdown by
	/// the peer, otherwise the error that closed it.
	Closed(ErrorCode),
}

/// One accepted stream socket with a tick-driven receive loop.
///
/// `tick` borrows the connection mutably, so no receive can be in flight
/// while it is closed or dropped. Dropping closes the socket.
///
/// The receive callback runs on whichever thread calls `tick`.
pub struct Connection {
	id: u64,
	socket: Socket,
	config: ConnectionConfig,
	/// Liveness flag: the first error seen by `is_alive`, kept for the next
	/// `tick` because reading it clears it from the socket.
	fault: Cell<ErrorCode>,
	on_receive: Option<ReceiveCallback>,
	bytes_received: Counter,
	packets_received: Counter,
}

impl Connection {
	/// Wraps a connected socket and applies `config`'s socket options.
	pub fn new(socket: Socket, config: ConnectionConfig) -> Result<Self, ErrorCode> {
		config.apply(&socket)?;
		let id = NEXT_ID.inc();
		tracing::debug!(id, local = ?socket.local_addr().ok(), "connection opened");
		Ok(Self {
			id,
			socket,
			config,
			fault: Cell::new(ErrorCode::None),
			on_receive: None,
			bytes_received: Counter::new(),
			packets_received: Counter::new(),
		})
	}

	/// Process-unique id, for logs.
	#[inline]
	pub fn id(&self) -> u64 {
		self.id
	}

	pub fn on_receive<F>(&mut self, callback: F)
	where
		F: FnMut(Packet) + Send + 'static,
	{
		self.on_receive = Some(Box::new(callback));
	}

	/// Point-in-time liveness probe: the socket is open and reports no
	/// pending error.
	///
	/// Once this sees an error it stays false, and the next `tick` closes
	/// the connection with that error.
	pub fn is_alive(&self) -> bool {
		if !self.fault.get().is_none() {
			return false;
		}
		match self.socket.pending_error() {
			Ok(ErrorCode::None) => true,
			Ok(code) | Err(code) => {
				if self.socket.is_open() {
					tracing::debug!(id = self.id, error = %code, "connection faulted");
					self.fault.set(code);
				}
				false
			}
		}
	}

	/// One non-blocking receive step.
	pub fn tick(&mut self) -> RecvOutcome {
		if !self.socket.is_open() {
			return RecvOutcome::Closed(ErrorCode::BadDescriptor);
		}
		let fault = self.fault.get();
		if !fault.is_none() {
			return self.shut(fault);
		}

		let mut buf = vec![0u8; self.config.recv_capacity.max(1)];
		match self.socket.recv(&mut buf, MsgFlags::DONT_WAIT) {
			Ok(0) => {
				tracing::debug!(id = self.id, "peer closed connection");
				self.shut(ErrorCode::None)
			}
			Ok(n) => {
				buf.truncate(n);
				self.bytes_received.add(n as u64);
				self.packets_received.inc();
				match self.on_receive.as_mut() {
					Some(callback) => callback(Packet::from(buf)),
					None => tracing::warn!(id = self.id, len = n, "no receive callback, packet dropped"),
				}
				RecvOutcome::Dispatched(n)
			}
			Err(code) if code.is_retry() => {
				std::thread::sleep(self.config.backoff);
				RecvOutcome::Idle
			}
			Err(code) => {
				tracing::debug!(id = self.id, error = %code, "receive failed");
				self.shut(code)
			}
		}
	}

	fn shut(&mut self, reason: ErrorCode) -> RecvOutcome {
		let _ = self.close_socket();
		RecvOutcome::Closed(reason)
	}

	/// One `send`. May write fewer bytes than `data` holds.
	pub fn send_data(&self, data: &[u8]) -> Result<usize, ErrorCode> {
		self.socket.send(data, MsgFlags::NONE)
	}

	/// Sends until all of `data` is written or a non-retry error occurs.
	pub fn send_all(&self, mut data: &[u8]) -> Result<(), ErrorCode> {
		while !data.is_empty() {
			match self.socket.send(data, MsgFlags::NONE) {
				Ok(n) => data = &data[n..],
				Err(ErrorCode::Interrupted) => {}
				Err(code) if code.is_would_block() => std::thread::sleep(self.config.backoff),
				Err(code) => return Err(code),
			}
		}
		Ok(())
	}

	/// Closes the socket. Idempotent.
	pub fn close_socket(&mut self) -> Result<(), ErrorCode> {
		if self.socket.is_open() {
			tracing::debug!(
				id = self.id,
				bytes = self.bytes_received.get(),
				packets = self.packets_received.get(),
				"connection closed"
			);
		}
		self.socket.close()
	}

	#[inline]
	pub fn is_open(&self) -> bool {
		self.socket.is_open()
	}

	pub fn bytes_received(&self) -> u64 {
		self.bytes_received.get()
	}

	pub fn packets_received(&self) -> u64 {
		self.packets_received.get()
	}

	pub fn local_addr(&self) -> Result<SocketAddr, ErrorCode> {
		self.socket.local_addr()
	}

	#[inline]
	pub fn socket(&self) -> &Socket {
		&self.socket
	}
}

impl Drop for Connection {
	fn drop(&mut self) {
		let _ = self.close_socket();
	}
}

impl fmt::Debug for Connection {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Connection")
			.field("id", &self.id)
			.field("socket", &self.socket)
			.field("bytes_received", &self.bytes_received.get())
			.finish_non_exhaustive()
	}
}
