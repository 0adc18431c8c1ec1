use std::ffi::CStr;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr, SocketAddrV4, SocketAddrV6};
use std::os::fd::{AsRawFd, FromRawFd, IntoRawFd, OwnedFd, RawFd};
use std::time::Duration;
use std::{mem, ptr, slice};

use crate::addr::{AddrFlags, AddressCandidate, Family, Protocol, ResolutionHints, SockType};
use crate::error::{ErrorCode, ResolveError};
use crate::socket::{MsgFlags, OptLevel, Shutdown, SockOption};

pub(crate) type RawHandle = RawFd;
pub(crate) type OwnedHandle = OwnedFd;

/// Linux hands out blocking sockets from `accept`; the BSDs copy
/// `O_NONBLOCK` from the listener.
pub(crate) const ACCEPT_INHERITS_NONBLOCKING: bool =
	!cfg!(any(target_os = "linux", target_os = "android"));

#[cfg(any(target_os = "linux", target_os = "android"))]
const SOCK_FLAGS: libc::c_int = libc::SOCK_CLOEXEC;
#[cfg(not(any(target_os = "linux", target_os = "android")))]
const SOCK_FLAGS: libc::c_int = 0;

// no SIGPIPE when the peer has gone away
#[cfg(any(target_os = "linux", target_os = "android"))]
const SEND_FLAGS: libc::c_int = libc::MSG_NOSIGNAL;
#[cfg(not(any(target_os = "linux", target_os = "android")))]
const SEND_FLAGS: libc::c_int = 0;

// ============================================================================
// Errors
// ============================================================================

#[cfg(target_os = "linux")]
#[inline]
pub(crate) fn last_error() -> i32 {
	unsafe { *libc::__errno_location() }
}

#[cfg(any(target_vendor = "apple", target_os = "freebsd"))]
#[inline]
pub(crate) fn last_error() -> i32 {
	unsafe { *libc::__error() }
}

#[cfg(not(any(target_os = "linux", target_vendor = "apple", target_os = "freebsd")))]
#[inline]
pub(crate) fn last_error() -> i32 {
	std::io::Error::last_os_error().raw_os_error().unwrap_or(0)
}

#[inline]
fn last() -> ErrorCode {
	map_error(last_error())
}

/// The one errno → [`ErrorCode`] table for this platform.
pub(crate) fn map_error(code: i32) -> ErrorCode {
	match code {
		0 => ErrorCode::None,
		libc::EINPROGRESS => ErrorCode::Again,
		libc::EAGAIN => ErrorCode::WouldBlock,
		c if c == libc::EWOULDBLOCK => ErrorCode::WouldBlock,
		libc::EBADF => ErrorCode::BadDescriptor,
		libc::ECONNREFUSED => ErrorCode::ConnectionRefused,
		libc::EFAULT => ErrorCode::Fault,
		libc::EINTR => ErrorCode::Interrupted,
		libc::EINVAL => ErrorCode::InvalidArgument,
		libc::ENOBUFS => ErrorCode::NoBufferSpace,
		libc::ENOMEM => ErrorCode::OutOfMemory,
		libc::ENOTCONN => ErrorCode::NotConnected,
		libc::ENOTSOCK => ErrorCode::NotASocket,
		libc::EACCES => ErrorCode::AccessDenied,
		libc::EAFNOSUPPORT => ErrorCode::AddressFamilyNotSupported,
		libc::EMFILE | libc::ENFILE => ErrorCode::TooManyOpenFiles,
		libc::EPROTONOSUPPORT => ErrorCode::ProtocolNotSupported,
		_ => ErrorCode::Unknown,
	}
}

pub(crate) fn map_resolve_error(code: i32) -> ResolveError {
	match code {
		0 => ResolveError::None,
		libc::EAI_AGAIN => ResolveError::Again,
		libc::EAI_BADFLAGS => ResolveError::BadFlags,
		libc::EAI_FAIL => ResolveError::Fail,
		libc::EAI_FAMILY => ResolveError::Family,
		libc::EAI_MEMORY => ResolveError::Memory,
		#[cfg(any(target_os = "linux", target_os = "android", target_vendor = "apple"))]
		libc::EAI_NODATA => ResolveError::NoData,
		libc::EAI_NONAME => ResolveError::NoName,
		libc::EAI_SERVICE => ResolveError::Service,
		libc::EAI_SOCKTYPE => ResolveError::SockType,
		_ => ResolveError::Unknown,
	}
}

// ============================================================================
// Constant mapping
// ============================================================================

pub(crate) fn family(family: Family) -> libc::c_int {
	match family {
		Family::Unspecified => libc::AF_UNSPEC,
		Family::Ipv4 => libc::AF_INET,
		Family::Ipv6 => libc::AF_INET6,
	}
}

pub(crate) fn family_from_raw(raw: libc::c_int) -> Option<Family> {
	match raw {
		libc::AF_UNSPEC => Some(Family::Unspecified),
		libc::AF_INET => Some(Family::Ipv4),
		libc::AF_INET6 => Some(Family::Ipv6),
		_ => None,
	}
}

pub(crate) fn sock_type(ty: SockType) -> libc::c_int {
	match ty {
		SockType::Stream => libc::SOCK_STREAM,
		SockType::Datagram => libc::SOCK_DGRAM,
		SockType::Raw => libc::SOCK_RAW,
		SockType::ReliableDatagram => libc::SOCK_RDM,
		SockType::SeqPacket => libc::SOCK_SEQPACKET,
	}
}

pub(crate) fn protocol(protocol: Protocol) -> libc::c_int {
	match protocol {
		Protocol::Tcp => libc::IPPROTO_TCP,
		Protocol::Udp => libc::IPPROTO_UDP,
	}
}

pub(crate) fn addr_flags(flags: AddrFlags) -> libc::c_int {
	const TABLE: [(AddrFlags, libc::c_int); 7] = [
		(AddrFlags::PASSIVE, libc::AI_PASSIVE),
		(AddrFlags::ADDR_CONFIG, libc::AI_ADDRCONFIG),
		(AddrFlags::NUMERIC_HOST, libc::AI_NUMERICHOST),
		(AddrFlags::NUMERIC_SERVICE, libc::AI_NUMERICSERV),
		(AddrFlags::CANONICAL_NAME, libc::AI_CANONNAME),
		(AddrFlags::ALL, libc::AI_ALL),
		(AddrFlags::V4_MAPPED, libc::AI_V4MAPPED),
	];
	TABLE
		.iter()
		.filter(|(flag, _)| flags.contains(*flag))
		.fold(0, |acc, (_, native)| acc | native)
}

/// Native message flags. Fails with `InvalidArgument` for a flag this
/// platform lacks.
pub(crate) fn msg_flags(flags: MsgFlags) -> Result<libc::c_int, ErrorCode> {
	let mut native = 0;
	if flags.contains(MsgFlags::OOB) {
		native |= libc::MSG_OOB;
	}
	if flags.contains(MsgFlags::PEEK) {
		native |= libc::MSG_PEEK;
	}
	if flags.contains(MsgFlags::TRUNC) {
		native |= libc::MSG_TRUNC;
	}
	if flags.contains(MsgFlags::WAIT_ALL) {
		native |= libc::MSG_WAITALL;
	}
	if flags.contains(MsgFlags::CTRUNC) {
		native |= libc::MSG_CTRUNC;
	}
	if flags.contains(MsgFlags::DONT_WAIT) {
		native |= libc::MSG_DONTWAIT;
	}
	if flags.contains(MsgFlags::ERR_QUEUE) {
		#[cfg(any(target_os = "linux", target_os = "android"))]
		{
			native |= libc::MSG_ERRQUEUE;
		}
		#[cfg(not(any(target_os = "linux", target_os = "android")))]
		{
			return Err(ErrorCode::InvalidArgument);
		}
	}
	Ok(native)
}

pub(crate) fn shutdown_how(how: Shutdown) -> libc::c_int {
	match how {
		Shutdown::Read => libc::SHUT_RD,
		Shutdown::Write => libc::SHUT_WR,
		Shutdown::Both => libc::SHUT_RDWR,
	}
}

/// `(level, name)` for a portable option, or `None` when the name does not
/// belong to the level.
pub(crate) fn option(level: OptLevel, name: SockOption) -> Option<(libc::c_int, libc::c_int)> {
	let native = match (level, name) {
		(OptLevel::Socket, SockOption::Error) => libc::SO_ERROR,
		(OptLevel::Socket, SockOption::Broadcast) => libc::SO_BROADCAST,
		(OptLevel::Socket, SockOption::AcceptConn) => libc::SO_ACCEPTCONN,
		(OptLevel::Socket, SockOption::Debug) => libc::SO_DEBUG,
		(OptLevel::Socket, SockOption::DontRoute) => libc::SO_DONTROUTE,
		(OptLevel::Socket, SockOption::KeepAlive) => libc::SO_KEEPALIVE,
		(OptLevel::Socket, SockOption::Linger) => libc::SO_LINGER,
		(OptLevel::Socket, SockOption::OobInline) => libc::SO_OOBINLINE,
		(OptLevel::Socket, SockOption::RecvBuffer) => libc::SO_RCVBUF,
		(OptLevel::Socket, SockOption::RecvLowat) => libc::SO_RCVLOWAT,
		(OptLevel::Socket, SockOption::ReuseAddr) => libc::SO_REUSEADDR,
		(OptLevel::Socket, SockOption::RecvTimeout) => libc::SO_RCVTIMEO,
		(OptLevel::Socket, SockOption::SendBuffer) => libc::SO_SNDBUF,
		(OptLevel::Socket, SockOption::SendLowat) => libc::SO_SNDLOWAT,
		(OptLevel::Socket, SockOption::SendTimeout) => libc::SO_SNDTIMEO,
		(OptLevel::Socket, SockOption::Type) => libc::SO_TYPE,
		(OptLevel::Tcp, SockOption::TcpNoDelay) => libc::TCP_NODELAY,
		_ => return None,
	};
	let level = match level {
		OptLevel::Socket => libc::SOL_SOCKET,
		OptLevel::Tcp => libc::IPPROTO_TCP,
	};
	Some((level, native))
}

/// `SO_RCVTIMEO`/`SO_SNDTIMEO` value. `None` (or zero) disables the timeout.
pub(crate) fn encode_timeout(timeout: Option<Duration>) -> Vec<u8> {
	let timeout = timeout.unwrap_or_default();
	let tv = libc::timeval {
		tv_sec: timeout.as_secs() as libc::time_t,
		tv_usec: timeout.subsec_micros() as libc::suseconds_t,
	};
	super::struct_bytes(&tv)
}

pub(crate) fn encode_linger(linger: Option<Duration>) -> Vec<u8> {
	let value = libc::linger {
		l_onoff: linger.is_some() as libc::c_int,
		l_linger: linger.map_or(0, |d| d.as_secs() as libc::c_int),
	};
	super::struct_bytes(&value)
}

// ============================================================================
// Syscalls
// ============================================================================

#[inline]
pub(crate) fn as_raw(handle: &OwnedFd) -> RawFd {
	handle.as_raw_fd()
}

#[inline]
fn cvt(result: libc::c_int) -> Result<(), ErrorCode> {
	if result == -1 { Err(last()) } else { Ok(()) }
}

pub(crate) fn socket(family: i32, ty: i32, protocol: i32) -> Result<OwnedFd, ErrorCode> {
	let fd = unsafe { libc::socket(family, ty | SOCK_FLAGS, protocol) };
	if fd == -1 {
		return Err(last());
	}
	let fd = unsafe { OwnedFd::from_raw_fd(fd) };

	#[cfg(target_vendor = "apple")]
	{
		let on: libc::c_int = 1;
		setsockopt(fd.as_raw_fd(), libc::SOL_SOCKET, libc::SO_NOSIGPIPE, &on.to_ne_bytes())?;
	}

	Ok(fd)
}

pub(crate) fn bind(fd: RawFd, addr: &[u8]) -> Result<(), ErrorCode> {
	cvt(unsafe {
		libc::bind(fd, addr.as_ptr() as *const libc::sockaddr, addr.len() as libc::socklen_t)
	})
}

pub(crate) fn listen(fd: RawFd, backlog: i32) -> Result<(), ErrorCode> {
	cvt(unsafe { libc::listen(fd, backlog) })
}

pub(crate) fn connect(fd: RawFd, addr: &[u8]) -> Result<(), ErrorCode> {
	cvt(unsafe {
		libc::connect(fd, addr.as_ptr() as *const libc::sockaddr, addr.len() as libc::socklen_t)
	})
}

pub(crate) fn accept(fd: RawFd) -> Result<OwnedFd, ErrorCode> {
	#[cfg(any(target_os = "linux", target_os = "android"))]
	let new_fd = unsafe {
		libc::accept4(fd, ptr::null_mut(), ptr::null_mut(), libc::SOCK_CLOEXEC)
	};
	#[cfg(not(any(target_os = "linux", target_os = "android")))]
	let new_fd = unsafe { libc::accept(fd, ptr::null_mut(), ptr::null_mut()) };

	if new_fd == -1 {
		return Err(last());
	}
	Ok(unsafe { OwnedFd::from_raw_fd(new_fd) })
}

pub(crate) fn send(
	fd: RawFd,
	buf: &[u8],
	flags: MsgFlags,
	_nonblocking: bool,
) -> Result<usize, ErrorCode> {
	let native = msg_flags(flags)? | SEND_FLAGS;
	let n = unsafe { libc::send(fd, buf.as_ptr() as *const libc::c_void, buf.len(), native) };
	if n == -1 { Err(last()) } else { Ok(n as usize) }
}

pub(crate) fn recv(
	fd: RawFd,
	buf: &mut [u8],
	flags: MsgFlags,
	_nonblocking: bool,
) -> Result<usize, ErrorCode> {
	let native = msg_flags(flags)?;
	let n = unsafe { libc::recv(fd, buf.as_mut_ptr() as *mut libc::c_void, buf.len(), native) };
	if n == -1 { Err(last()) } else { Ok(n as usize) }
}

pub(crate) fn setsockopt(fd: RawFd, level: i32, name: i32, value: &[u8]) -> Result<(), ErrorCode> {
	cvt(unsafe {
		libc::setsockopt(
			fd,
			level,
			name,
			value.as_ptr() as *const libc::c_void,
			value.len() as libc::socklen_t,
		)
	})
}

pub(crate) fn getsockopt(
	fd: RawFd,
	level: i32,
	name: i32,
	value: &mut [u8],
) -> Result<usize, ErrorCode> {
	let mut len = value.len() as libc::socklen_t;
	cvt(unsafe {
		libc::getsockopt(fd, level, name, value.as_mut_ptr() as *mut libc::c_void, &mut len)
	})?;
	Ok(len as usize)
}

pub(crate) fn shutdown(fd: RawFd, how: Shutdown) -> Result<(), ErrorCode> {
	cvt(unsafe { libc::shutdown(fd, shutdown_how(how)) })
}

/// Closes the descriptor, reporting the `close(2)` error that dropping an
/// `OwnedFd` would swallow.
pub(crate) fn close(handle: OwnedFd) -> Result<(), ErrorCode> {
	let fd = handle.into_raw_fd();
	cvt(unsafe { libc::close(fd) })
}

pub(crate) fn set_nonblocking(fd: RawFd, nonblocking: bool) -> Result<(), ErrorCode> {
	let flags = unsafe { libc::fcntl(fd, libc::F_GETFL) };
	if flags == -1 {
		return Err(last());
	}
	let new_flags = if nonblocking {
		flags | libc::O_NONBLOCK
	} else {
		flags & !libc::O_NONBLOCK
	};
	cvt(unsafe { libc::fcntl(fd, libc::F_SETFL, new_flags) })
}

fn sockaddr_bytes(
	call: impl FnOnce(*mut libc::sockaddr, *mut libc::socklen_t) -> libc::c_int,
) -> Result<Vec<u8>, ErrorCode> {
	let mut storage: libc::sockaddr_storage = unsafe { mem::zeroed() };
	let mut len = mem::size_of::<libc::sockaddr_storage>() as libc::socklen_t;
	cvt(call(&mut storage as *mut _ as *mut libc::sockaddr, &mut len))?;
	let bytes = unsafe { slice::from_raw_parts(&storage as *const _ as *const u8, len as usize) };
	Ok(bytes.to_vec())
}

/// Raw `sockaddr` bytes of the locally bound address.
pub(crate) fn local_addr(fd: RawFd) -> Result<Vec<u8>, ErrorCode> {
	sockaddr_bytes(|addr, len| unsafe { libc::getsockname(fd, addr, len) })
}

/// Raw `sockaddr` bytes of the connected peer. `NotConnected` while a
/// non-blocking connect is still in flight.
pub(crate) fn peer_addr(fd: RawFd) -> Result<Vec<u8>, ErrorCode> {
	sockaddr_bytes(|addr, len| unsafe { libc::getpeername(fd, addr, len) })
}

pub(crate) fn decode_sockaddr(raw: &[u8]) -> Option<SocketAddr> {
	let mut storage: libc::sockaddr_storage = unsafe { mem::zeroed() };
	let len = raw.len().min(mem::size_of::<libc::sockaddr_storage>());
	// copy first: the candidate's bytes carry no alignment guarantee
	unsafe {
		ptr::copy_nonoverlapping(raw.as_ptr(), &mut storage as *mut _ as *mut u8, len);
	}

	match storage.ss_family as libc::c_int {
		libc::AF_INET if len >= mem::size_of::<libc::sockaddr_in>() => {
			let sin = unsafe { &*(&storage as *const _ as *const libc::sockaddr_in) };
			Some(SocketAddr::V4(SocketAddrV4::new(
				Ipv4Addr::from(sin.sin_addr.s_addr.to_ne_bytes()),
				u16::from_be(sin.sin_port),
			)))
		}
		libc::AF_INET6 if len >= mem::size_of::<libc::sockaddr_in6>() => {
			let sin6 = unsafe { &*(&storage as *const _ as *const libc::sockaddr_in6) };
			Some(SocketAddr::V6(SocketAddrV6::new(
				Ipv6Addr::from(sin6.sin6_addr.s6_addr),
				u16::from_be(sin6.sin6_port),
				sin6.sin6_flowinfo,
				sin6.sin6_scope_id,
			)))
		}
		_ => None,
	}
}

pub(crate) fn getaddrinfo(
	host: Option<&CStr>,
	service: Option<&CStr>,
	hints: &ResolutionHints,
) -> Result<Vec<AddressCandidate>, ResolveError> {
	let mut native: libc::addrinfo = unsafe { mem::zeroed() };
	native.ai_family = family(hints.family);
	native.ai_socktype = hints.sock_type.map_or(0, sock_type);
	native.ai_protocol = hints.protocol.map_or(0, protocol);
	native.ai_flags = addr_flags(hints.flags);

	let mut list: *mut libc::addrinfo = ptr::null_mut();
	let rc = unsafe {
		libc::getaddrinfo(
			host.map_or(ptr::null(), CStr::as_ptr),
			service.map_or(ptr::null(), CStr::as_ptr),
			&native,
			&mut list,
		)
	};
	if rc != 0 {
		return Err(map_resolve_error(rc));
	}

	let mut candidates = Vec::new();
	let mut cursor = list;
	while !cursor.is_null() {
		let info = unsafe { &*cursor };
		if !info.ai_addr.is_null() {
			let raw = unsafe {
				slice::from_raw_parts(info.ai_addr as *const u8, info.ai_addrlen as usize)
			};
			candidates.push(AddressCandidate::from_native(
				info.ai_family,
				info.ai_socktype,
				info.ai_protocol,
				raw,
			));
		}
		cursor = info.ai_next;
	}

	// head of the list, not the exhausted cursor
	unsafe { libc::freeaddrinfo(list) };
	Ok(candidates)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn errno_table() {
		assert_eq!(map_error(0), ErrorCode::None);
		assert_eq!(map_error(libc::EAGAIN), ErrorCode::WouldBlock);
		assert_eq!(map_error(libc::EWOULDBLOCK), ErrorCode::WouldBlock);
		assert_eq!(map_error(libc::EINPROGRESS), ErrorCode::Again);
		assert_eq!(map_error(libc::EBADF), ErrorCode::BadDescriptor);
		assert_eq!(map_error(libc::EACCES), ErrorCode::AccessDenied);
		assert_eq!(map_error(libc::EMFILE), ErrorCode::TooManyOpenFiles);
		assert_eq!(map_error(libc::EPROTONOSUPPORT), ErrorCode::ProtocolNotSupported);
	}

	#[test]
	fn unmapped_errno_is_unknown_not_none() {
		assert_eq!(map_error(libc::EPIPE), ErrorCode::Unknown);
		assert_eq!(map_error(libc::ECONNRESET), ErrorCode::Unknown);
		assert_eq!(map_error(-1), ErrorCode::Unknown);
		assert_eq!(map_error(i32::MAX), ErrorCode::Unknown);
	}

	#[test]
	fn resolve_table() {
		assert_eq!(map_resolve_error(0), ResolveError::None);
		assert_eq!(map_resolve_error(libc::EAI_NONAME), ResolveError::NoName);
		assert_eq!(map_resolve_error(libc::EAI_AGAIN), ResolveError::Again);
		assert_eq!(map_resolve_error(libc::EAI_SERVICE), ResolveError::Service);
		assert_eq!(map_resolve_error(12345), ResolveError::Unknown);
	}

	#[test]
	fn options_are_level_checked() {
		assert_eq!(
			option(OptLevel::Socket, SockOption::ReuseAddr),
			Some((libc::SOL_SOCKET, libc::SO_REUSEADDR))
		);
		assert_eq!(
			option(OptLevel::Tcp, SockOption::TcpNoDelay),
			Some((libc::IPPROTO_TCP, libc::TCP_NODELAY))
		);
		assert_eq!(option(OptLevel::Tcp, SockOption::ReuseAddr), None);
		assert_eq!(option(OptLevel::Socket, SockOption::TcpNoDelay), None);
	}

	#[test]
	fn flag_translation() {
		assert_eq!(addr_flags(AddrFlags::empty()), 0);
		assert_eq!(
			addr_flags(AddrFlags::PASSIVE | AddrFlags::NUMERIC_HOST),
			libc::AI_PASSIVE | libc::AI_NUMERICHOST
		);
		assert_eq!(msg_flags(MsgFlags::NONE), Ok(0));
		assert_eq!(
			msg_flags(MsgFlags::PEEK | MsgFlags::DONT_WAIT),
			Ok(libc::MSG_PEEK | libc::MSG_DONTWAIT)
		);
	}

	#[test]
	fn sockaddr_roundtrip_through_bytes() {
		let mut sin: libc::sockaddr_in = unsafe { mem::zeroed() };
		sin.sin_family = libc::AF_INET as libc::sa_family_t;
		sin.sin_port = 8080u16.to_be();
		sin.sin_addr.s_addr = u32::from_ne_bytes([127, 0, 0, 1]);
		let raw = crate::sys::struct_bytes(&sin);
		assert_eq!(decode_sockaddr(&raw), Some("127.0.0.1:8080".parse().unwrap()));
		assert_eq!(decode_sockaddr(&raw[..4]), None);
	}
}
