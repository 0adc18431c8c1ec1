use std::time::Duration;

use super::{OptLevel, SockOption, Socket};
use crate::error::ErrorCode;
use crate::sys;

// ============================================================================
// Typed option helpers
// ============================================================================
//
// Thin wrappers over `set_option`/`get_option` for the options that carry a
// plain integer, boolean, timeout or linger value. Anything else goes through
// the raw byte interface.

impl Socket {
	/// Sets an integer-valued option.
	pub fn set_option_int(&self, level: OptLevel, name: SockOption, value: i32) -> Result<(), ErrorCode> {
		self.set_option(level, name, &value.to_ne_bytes())
	}

	/// Reads an integer-valued option.
	pub fn option_int(&self, level: OptLevel, name: SockOption) -> Result<i32, ErrorCode> {
		let mut buf = [0u8; 4];
		let len = self.get_option(level, name, &mut buf)?;
		// Windows reports some boolean options as a single byte.
		Ok(match len {
			1 => buf[0] as i32,
			_ => i32::from_ne_bytes(buf),
		})
	}

	fn set_flag(&self, level: OptLevel, name: SockOption, enable: bool) -> Result<(), ErrorCode> {
		self.set_option_int(level, name, enable as i32)
	}

	/// SO_REUSEADDR. Lets a restarted server rebind a port still in TIME_WAIT.
	pub fn set_reuse_addr(&self, enable: bool) -> Result<(), ErrorCode> {
		self.set_flag(OptLevel::Socket, SockOption::ReuseAddr, enable)
	}

	pub fn reuse_addr(&self) -> Result<bool, ErrorCode> {
		Ok(self.option_int(OptLevel::Socket, SockOption::ReuseAddr)? != 0)
	}

	/// SO_KEEPALIVE.
	pub fn set_keepalive(&self, enable: bool) -> Result<(), ErrorCode> {
		self.set_flag(OptLevel::Socket, SockOption::KeepAlive, enable)
	}

	pub fn keepalive(&self) -> Result<bool, ErrorCode> {
		Ok(self.option_int(OptLevel::Socket, SockOption::KeepAlive)? != 0)
	}

	/// SO_BROADCAST. Datagram sockets only.
	pub fn set_broadcast(&self, enable: bool) -> Result<(), ErrorCode> {
		self.set_flag(OptLevel::Socket, SockOption::Broadcast, enable)
	}

	/// TCP_NODELAY. Disables Nagle's algorithm.
	pub fn set_tcp_nodelay(&self, enable: bool) -> Result<(), ErrorCode> {
		self.set_flag(OptLevel::Tcp, SockOption::TcpNoDelay, enable)
	}

	pub fn tcp_nodelay(&self) -> Result<bool, ErrorCode> {
		Ok(self.option_int(OptLevel::Tcp, SockOption::TcpNoDelay)? != 0)
	}

	/// SO_RCVBUF. Linux doubles the value internally.
	pub fn set_recv_buffer_size(&self, size: usize) -> Result<(), ErrorCode> {
		let size = i32::try_from(size).map_err(|_| ErrorCode::InvalidArgument)?;
		self.set_option_int(OptLevel::Socket, SockOption::RecvBuffer, size)
	}

	pub fn recv_buffer_size(&self) -> Result<usize, ErrorCode> {
		Ok(self.option_int(OptLevel::Socket, SockOption::RecvBuffer)?.max(0) as usize)
	}

	/// SO_SNDBUF.
	pub fn set_send_buffer_size(&self, size: usize) -> Result<(), ErrorCode> {
		let size = i32::try_from(size).map_err(|_| ErrorCode::InvalidArgument)?;
		self.set_option_int(OptLevel::Socket, SockOption::SendBuffer, size)
	}

	pub fn send_buffer_size(&self) -> Result<usize, ErrorCode> {
		Ok(self.option_int(OptLevel::Socket, SockOption::SendBuffer)?.max(0) as usize)
	}

	/// SO_LINGER.
	///
	/// - `None`: close returns at once, the OS flushes in the background
	/// - `Some(ZERO)`: close resets the connection and drops unsent data
	/// - `Some(n)`: close blocks up to `n` (whole seconds) while data drains
	pub fn set_linger(&self, linger: Option<Duration>) -> Result<(), ErrorCode> {
		self.set_option(OptLevel::Socket, SockOption::Linger, &sys::encode_linger(linger))
	}

	/// SO_RCVTIMEO. `None` blocks forever.
	pub fn set_recv_timeout(&self, timeout: Option<Duration>) -> Result<(), ErrorCode> {
		self.set_option(OptLevel::Socket, SockOption::RecvTimeout, &sys::encode_timeout(timeout))
	}

	/// SO_SNDTIMEO. `None` blocks forever.
	pub fn set_send_timeout(&self, timeout: Option<Duration>) -> Result<(), ErrorCode> {
		self.set_option(OptLevel::Socket, SockOption::SendTimeout, &sys::encode_timeout(timeout))
	}

	/// Reads and clears SO_ERROR. `ErrorCode::None` when nothing is pending.
	pub fn pending_error(&self) -> Result<ErrorCode, ErrorCode> {
		let raw = self.option_int(OptLevel::Socket, SockOption::Error)?;
		Ok(match raw {
			0 => ErrorCode::None,
			code => ErrorCode::from_raw_os_error(code),
		})
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::addr::{Family, Protocol, SockType};

	fn tcp() -> Socket {
		Socket::create(Family::Ipv4, SockType::Stream, Protocol::Tcp).unwrap()
	}

	#[test]
	fn reuse_addr_roundtrip() {
		let s = tcp();
		s.set_reuse_addr(true).unwrap();
		assert!(s.reuse_addr().unwrap());
		s.set_reuse_addr(false).unwrap();
		assert!(!s.reuse_addr().unwrap());
	}

	#[test]
	fn nodelay_lives_at_tcp_level() {
		let s = tcp();
		s.set_tcp_nodelay(true).unwrap();
		assert!(s.tcp_nodelay().unwrap());
		assert_eq!(
			s.option_int(OptLevel::Socket, SockOption::TcpNoDelay),
			Err(ErrorCode::InvalidArgument)
		);
	}

	#[test]
	fn fresh_socket_has_no_pending_error() {
		assert_eq!(tcp().pending_error(), Ok(ErrorCode::None));
	}

	#[test]
	fn timeouts_and_linger_accepted() {
		let s = tcp();
		s.set_recv_timeout(Some(Duration::from_millis(250))).unwrap();
		s.set_send_timeout(None).unwrap();
		s.set_linger(Some(Duration::from_secs(1))).unwrap();
		s.set_linger(None).unwrap();
	}

	#[test]
	fn buffer_size_is_at_least_requested() {
		let s = tcp();
		s.set_recv_buffer_size(64 * 1024).unwrap();
		assert!(s.recv_buffer_size().unwrap() >= 32 * 1024);
	}
}
