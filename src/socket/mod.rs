mod options;

use std::fmt;
use std::net::SocketAddr;
use std::ops::BitOr;

use crate::addr::{AddressCandidate, Family, Protocol, SockType};
use crate::error::{ErrorCode, ProvisionError};
use crate::sys;

/// Per-call message flags for [`Socket::send`] and [`Socket::recv`].
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct MsgFlags(u32);

impl MsgFlags {
	pub const NONE: MsgFlags = MsgFlags(0);
	/// Out-of-band data.
	pub const OOB: MsgFlags = MsgFlags(1 << 0);
	/// Read without consuming.
	pub const PEEK: MsgFlags = MsgFlags(1 << 1);
	pub const TRUNC: MsgFlags = MsgFlags(1 << 2);
	pub const WAIT_ALL: MsgFlags = MsgFlags(1 << 3);
	pub const CTRUNC: MsgFlags = MsgFlags(1 << 4);
	/// Linux only; elsewhere the call fails with `InvalidArgument`.
	pub const ERR_QUEUE: MsgFlags = MsgFlags(1 << 5);
	/// Non-blocking for this call only.
	pub const DONT_WAIT: MsgFlags = MsgFlags(1 << 6);

	#[inline]
	pub const fn contains(self, other: MsgFlags) -> bool {
		self.0 & other.0 == other.0
	}

	#[inline]
	pub const fn bits(self) -> u32 {
		self.0
	}
}

impl BitOr for MsgFlags {
	type Output = MsgFlags;

	fn bitor(self, rhs: MsgFlags) -> MsgFlags {
		MsgFlags(self.0 | rhs.0)
	}
}

impl fmt::Debug for MsgFlags {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "MsgFlags({:#x})", self.0)
	}
}

/// Which halves of a connection [`Socket::shutdown`] disables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Shutdown {
	Read,
	Write,
	Both,
}

/// Option level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OptLevel {
	Socket,
	Tcp,
}

/// Option name. All but `TcpNoDelay` live at [`OptLevel::Socket`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SockOption {
	/// Pending error; reading it clears it.
	Error,
	Broadcast,
	/// Whether the socket is listening.
	AcceptConn,
	Debug,
	DontRoute,
	KeepAlive,
	Linger,
	OobInline,
	RecvBuffer,
	RecvLowat,
	ReuseAddr,
	RecvTimeout,
	SendBuffer,
	SendLowat,
	SendTimeout,
	Type,
	TcpNoDelay,
}

/// Lifecycle of a [`Socket`].
///
/// `Closed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SocketState {
	Unbound,
	Bound,
	Listening,
	/// A non-blocking connect is in flight.
	Connecting,
	Connected,
	Closed,
}

/// Owns exactly one native socket handle.
///
/// Every operation reports failures as an [`ErrorCode`]; creating the
/// handle is the one provisioning step and reports a [`ProvisionError`].
/// Not `Clone`: the handle moves, it is never shared. Once closed, every
/// call other than [`close`](Socket::close) fails with `BadDescriptor`.
///
/// `send`/`recv` make exactly one syscall and may transfer fewer bytes
/// than asked. Loop if you need the whole buffer.
pub struct Socket {
	handle: Option<sys::OwnedHandle>,
	state: SocketState,
	nonblocking: bool,
}

impl Socket {
	/// Allocates a new native socket.
	pub fn create(family: Family, ty: SockType, protocol: Protocol) -> Result<Self, ProvisionError> {
		Self::create_raw(sys::family(family), sys::sock_type(ty), sys::protocol(protocol))
	}

	/// Allocates a socket matching a resolved candidate's family, type and
	/// protocol.
	pub fn create_for(candidate: &AddressCandidate) -> Result<Self, ProvisionError> {
		let (family, ty, protocol) = candidate.native_triple();
		Self::create_raw(family, ty, protocol)
	}

	fn create_raw(family: i32, ty: i32, protocol: i32) -> Result<Self, ProvisionError> {
		let handle = sys::socket(family, ty, protocol).map_err(|code| ProvisionError::Create { code })?;
		tracing::trace!(family, ty, protocol, "socket created");
		Ok(Self::from_handle(handle, SocketState::Unbound, false))
	}

	/// Takes ownership of a handle. The only way a `Socket` comes to hold one.
	pub(crate) fn from_handle(handle: sys::OwnedHandle, state: SocketState, nonblocking: bool) -> Self {
		Self {
			handle: Some(handle),
			state,
			nonblocking,
		}
	}

	#[inline]
	fn raw(&self) -> Result<sys::RawHandle, ErrorCode> {
		self.handle.as_ref().map(sys::as_raw).ok_or(ErrorCode::BadDescriptor)
	}

	#[inline]
	pub fn state(&self) -> SocketState {
		self.state
	}

	#[inline]
	pub fn is_open(&self) -> bool {
		self.handle.is_some()
	}

	#[inline]
	pub fn is_nonblocking(&self) -> bool {
		self.nonblocking
	}

	pub fn set_nonblocking(&mut self, nonblocking: bool) -> Result<(), ErrorCode> {
		sys::set_nonblocking(self.raw()?, nonblocking)?;
		self.nonblocking = nonblocking;
		Ok(())
	}

	/// Binds to the candidate's address. No retry.
	pub fn bind(&mut self, candidate: &AddressCandidate) -> Result<(), ErrorCode> {
		sys::bind(self.raw()?, candidate.raw())?;
		self.state = SocketState::Bound;
		tracing::debug!(addr = %candidate, "socket bound");
		Ok(())
	}

	/// Marks the socket passive. The OS clamps `backlog` to its own maximum.
	pub fn listen(&mut self, backlog: u32) -> Result<(), ErrorCode> {
		let backlog = i32::try_from(backlog).unwrap_or(i32::MAX);
		sys::listen(self.raw()?, backlog)?;
		self.state = SocketState::Listening;
		Ok(())
	}

	/// Starts a connection to `candidate`.
	///
	/// On a non-blocking socket this usually fails with `Again` (or
	/// `WouldBlock` on some platforms). That is not a failure: the socket is
	/// left `Connecting`; poll [`finish_connect`](Socket::finish_connect)
	/// until it stops returning `Again`.
	pub fn connect(&mut self, candidate: &AddressCandidate) -> Result<(), ErrorCode> {
		match sys::connect(self.raw()?, candidate.raw()) {
			Ok(()) => {
				self.state = SocketState::Connected;
				Ok(())
			}
			Err(code) if code.is_would_block() => {
				self.state = SocketState::Connecting;
				Err(code)
			}
			Err(code) => Err(code),
		}
	}

	/// Polls a non-blocking connect.
	///
	/// - `Ok(())`: connected.
	/// - `Err(Again)`: the handshake is still in flight; poll again later.
	/// - `Err(code)`: the attempt failed. The socket drops back to
	///   `Unbound` and later calls return `NotConnected`.
	///
	/// A clean pending-error read is confirmed against the peer address,
	/// since an attempt in flight also reads clean.
	pub fn finish_connect(&mut self) -> Result<(), ErrorCode> {
		match self.state {
			SocketState::Connected => return Ok(()),
			SocketState::Connecting => {}
			SocketState::Closed => return Err(ErrorCode::BadDescriptor),
			_ => return Err(ErrorCode::NotConnected),
		}

		let outcome = match self.pending_error()? {
			ErrorCode::None => sys::peer_addr(self.raw()?).map(|_| ()),
			code => Err(code),
		};
		match outcome {
			Ok(()) => {
				self.state = SocketState::Connected;
				Ok(())
			}
			Err(ErrorCode::NotConnected) => Err(ErrorCode::Again),
			Err(code) => {
				tracing::debug!(error = %code, "connect failed");
				self.state = SocketState::Unbound;
				Err(code)
			}
		}
	}

	/// Accepts one pending connection, handing its new handle to a new
	/// `Socket`. `WouldBlock` on a non-blocking listener means the queue is
	/// empty.
	pub fn accept(&self) -> Result<Socket, ErrorCode> {
		let handle = sys::accept(self.raw()?)?;
		let nonblocking = sys::ACCEPT_INHERITS_NONBLOCKING && self.nonblocking;
		Ok(Socket::from_handle(handle, SocketState::Connected, nonblocking))
	}

	/// One `send` call. Returns how many bytes the OS took.
	pub fn send(&self, buf: &[u8], flags: MsgFlags) -> Result<usize, ErrorCode> {
		let n = sys::send(self.raw()?, buf, flags, self.nonblocking)?;
		tracing::trace!(requested = buf.len(), sent = n, "send");
		Ok(n)
	}

	/// One `recv` call. `Ok(0)` on a stream means the peer shut down its
	/// write half.
	pub fn recv(&self, buf: &mut [u8], flags: MsgFlags) -> Result<usize, ErrorCode> {
		let n = sys::recv(self.raw()?, buf, flags, self.nonblocking)?;
		tracing::trace!(capacity = buf.len(), received = n, "recv");
		Ok(n)
	}

	/// Passes `value` through to the OS option mechanism.
	///
	/// A name that does not belong to `level` fails with `InvalidArgument`.
	pub fn set_option(&self, level: OptLevel, name: SockOption, value: &[u8]) -> Result<(), ErrorCode> {
		let raw = self.raw()?;
		let (level, name) = sys::option(level, name).ok_or(ErrorCode::InvalidArgument)?;
		sys::setsockopt(raw, level, name, value)
	}

	/// Reads an option into `value`, returning how many bytes the OS wrote.
	pub fn get_option(&self, level: OptLevel, name: SockOption, value: &mut [u8]) -> Result<usize, ErrorCode> {
		let raw = self.raw()?;
		let (level, name) = sys::option(level, name).ok_or(ErrorCode::InvalidArgument)?;
		sys::getsockopt(raw, level, name, value)
	}

	/// Disables one or both halves. Independent of [`close`](Socket::close).
	pub fn shutdown(&self, how: Shutdown) -> Result<(), ErrorCode> {
		sys::shutdown(self.raw()?, how)
	}

	/// Releases the handle.
	///
	/// Terminal and idempotent: after the first call the handle is gone and
	/// later calls return `Ok(())`. The handle is released even when the OS
	/// reports an error for the close itself.
	pub fn close(&mut self) -> Result<(), ErrorCode> {
		let Some(handle) = self.handle.take() else {
			return Ok(());
		};
		self.state = SocketState::Closed;
		let result = sys::close(handle);
		tracing::debug!(?result, "socket closed");
		result
	}

	/// The locally bound address.
	pub fn local_addr(&self) -> Result<SocketAddr, ErrorCode> {
		let raw = sys::local_addr(self.raw()?)?;
		sys::decode_sockaddr(&raw).ok_or(ErrorCode::AddressFamilyNotSupported)
	}

	/// The locally bound address as a candidate, e.g. to connect a client
	/// to a listener bound on port 0.
	pub fn local_candidate(&self) -> Result<AddressCandidate, ErrorCode> {
		let raw_handle = self.raw()?;
		let addr = sys::local_addr(raw_handle)?;
		let ty = self.option_int(OptLevel::Socket, SockOption::Type)?;
		let family = sys::decode_sockaddr(&addr)
			.map(|a| if a.is_ipv4() { Family::Ipv4 } else { Family::Ipv6 })
			.ok_or(ErrorCode::AddressFamilyNotSupported)?;
		Ok(AddressCandidate::from_native(sys::family(family), ty, 0, &addr))
	}
}

impl Drop for Socket {
	fn drop(&mut self) {
		let _ = self.close();
	}
}

impl fmt::Debug for Socket {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Socket")
			.field("handle", &self.handle.as_ref().map(sys::as_raw))
			.field("state", &self.state)
			.field("nonblocking", &self.nonblocking)
			.finish()
	}
}

#[cfg(unix)]
mod raw_fd {
	use std::os::fd::{AsRawFd, FromRawFd, IntoRawFd, OwnedFd, RawFd};

	use super::{Socket, SocketState};

	impl AsRawFd for Socket {
		/// `-1` once closed.
		fn as_raw_fd(&self) -> RawFd {
			self.handle.as_ref().map_or(-1, |fd| fd.as_raw_fd())
		}
	}

	impl FromRawFd for Socket {
		/// Adopts an inherited descriptor. State is taken to be `Connected`.
		unsafe fn from_raw_fd(fd: RawFd) -> Self {
			let fd = unsafe { OwnedFd::from_raw_fd(fd) };
			Socket::from_handle(fd, SocketState::Connected, false)
		}
	}

	impl IntoRawFd for Socket {
		/// Gives up ownership without closing. `-1` if already closed.
		fn into_raw_fd(mut self) -> RawFd {
			self.state = SocketState::Closed;
			self.handle.take().map_or(-1, |fd| fd.into_raw_fd())
		}
	}
}

#[cfg(windows)]
mod raw_socket {
	use std::os::windows::io::{AsRawSocket, FromRawSocket, IntoRawSocket, OwnedSocket, RawSocket};

	use super::{Socket, SocketState};

	const INVALID: RawSocket = !0;

	impl AsRawSocket for Socket {
		fn as_raw_socket(&self) -> RawSocket {
			self.handle.as_ref().map_or(INVALID, |s| s.as_raw_socket())
		}
	}

	impl FromRawSocket for Socket {
		unsafe fn from_raw_socket(s: RawSocket) -> Self {
			let s = unsafe { OwnedSocket::from_raw_socket(s) };
			Socket::from_handle(s, SocketState::Connected, false)
		}
	}

	impl IntoRawSocket for Socket {
		fn into_raw_socket(mut self) -> RawSocket {
			self.state = SocketState::Closed;
			self.handle.take().map_or(INVALID, |s| s.into_raw_socket())
		}
	}
}
