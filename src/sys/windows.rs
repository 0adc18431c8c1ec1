use std::ffi::CStr;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr, SocketAddrV4, SocketAddrV6};
use std::os::windows::io::{AsRawSocket, FromRawSocket, IntoRawSocket, OwnedSocket, RawSocket};
use std::sync::OnceLock;
use std::time::Duration;
use std::{mem, ptr, slice};

use windows_sys::Win32::Networking::WinSock as ws;

use crate::addr::{AddrFlags, AddressCandidate, Family, Protocol, ResolutionHints, SockType};
use crate::error::{ErrorCode, ResolveError};
use crate::socket::{MsgFlags, OptLevel, Shutdown, SockOption};

pub(crate) type RawHandle = RawSocket;
pub(crate) type OwnedHandle = OwnedSocket;

/// Winsock copies the listener's non-blocking mode onto accepted sockets.
pub(crate) const ACCEPT_INHERITS_NONBLOCKING: bool = true;

const AF_UNSPEC: i32 = ws::AF_UNSPEC as i32;
const AF_INET: i32 = ws::AF_INET as i32;
const AF_INET6: i32 = ws::AF_INET6 as i32;

/// `WSAStartup` once per process; the first result is remembered.
fn startup() -> Result<(), ErrorCode> {
	static STARTUP: OnceLock<i32> = OnceLock::new();
	let rc = *STARTUP.get_or_init(|| unsafe {
		let mut data: ws::WSADATA = mem::zeroed();
		ws::WSAStartup(0x202, &mut data) // MAKEWORD(2,2)
	});
	if rc == 0 { Ok(()) } else { Err(map_error(rc)) }
}

// ============================================================================
// Errors
// ============================================================================

#[inline]
pub(crate) fn last_error() -> i32 {
	unsafe { ws::WSAGetLastError() }
}

#[inline]
fn last() -> ErrorCode {
	map_error(last_error())
}

/// The one Winsock → [`ErrorCode`] table for this platform.
pub(crate) fn map_error(code: i32) -> ErrorCode {
	match code {
		0 => ErrorCode::None,
		ws::WSAEINPROGRESS => ErrorCode::Again,
		ws::WSAEWOULDBLOCK => ErrorCode::WouldBlock,
		ws::WSAEBADF => ErrorCode::BadDescriptor,
		ws::WSAECONNREFUSED => ErrorCode::ConnectionRefused,
		ws::WSAEFAULT => ErrorCode::Fault,
		ws::WSAEINTR => ErrorCode::Interrupted,
		ws::WSAEINVAL => ErrorCode::InvalidArgument,
		ws::WSAENOBUFS => ErrorCode::NoBufferSpace,
		ws::WSA_NOT_ENOUGH_MEMORY => ErrorCode::OutOfMemory,
		ws::WSAENOTCONN => ErrorCode::NotConnected,
		ws::WSAENOTSOCK => ErrorCode::NotASocket,
		ws::WSAEACCES => ErrorCode::AccessDenied,
		ws::WSAEAFNOSUPPORT => ErrorCode::AddressFamilyNotSupported,
		ws::WSAEMFILE => ErrorCode::TooManyOpenFiles,
		ws::WSAEPFNOSUPPORT | ws::WSAEPROTONOSUPPORT => ErrorCode::ProtocolNotSupported,
		_ => ErrorCode::Unknown,
	}
}

/// Winsock reports `getaddrinfo` failures with `WSA*` codes; these are
/// the values its `EAI_*` names alias.
pub(crate) fn map_resolve_error(code: i32) -> ResolveError {
	match code {
		0 => ResolveError::None,
		ws::WSATRY_AGAIN => ResolveError::Again,
		ws::WSAEINVAL => ResolveError::BadFlags,
		ws::WSANO_RECOVERY => ResolveError::Fail,
		ws::WSAEAFNOSUPPORT => ResolveError::Family,
		ws::WSA_NOT_ENOUGH_MEMORY => ResolveError::Memory,
		ws::WSANO_DATA => ResolveError::NoData,
		ws::WSAHOST_NOT_FOUND => ResolveError::NoName,
		ws::WSATYPE_NOT_FOUND => ResolveError::Service,
		ws::WSAESOCKTNOSUPPORT => ResolveError::SockType,
		_ => ResolveError::Unknown,
	}
}

// ============================================================================
// Constant mapping
// ============================================================================

pub(crate) fn family(family: Family) -> i32 {
	match family {
		Family::Unspecified => AF_UNSPEC,
		Family::Ipv4 => AF_INET,
		Family::Ipv6 => AF_INET6,
	}
}

pub(crate) fn family_from_raw(raw: i32) -> Option<Family> {
	match raw {
		AF_UNSPEC => Some(Family::Unspecified),
		AF_INET => Some(Family::Ipv4),
		AF_INET6 => Some(Family::Ipv6),
		_ => None,
	}
}

pub(crate) fn sock_type(ty: SockType) -> i32 {
	match ty {
		SockType::Stream => ws::SOCK_STREAM,
		SockType::Datagram => ws::SOCK_DGRAM,
		SockType::Raw => ws::SOCK_RAW,
		SockType::ReliableDatagram => ws::SOCK_RDM,
		SockType::SeqPacket => ws::SOCK_SEQPACKET,
	}
}

pub(crate) fn protocol(protocol: Protocol) -> i32 {
	match protocol {
		Protocol::Tcp => ws::IPPROTO_TCP,
		Protocol::Udp => ws::IPPROTO_UDP,
	}
}

pub(crate) fn addr_flags(flags: AddrFlags) -> i32 {
	const TABLE: [(AddrFlags, u32); 7] = [
		(AddrFlags::PASSIVE, ws::AI_PASSIVE),
		(AddrFlags::ADDR_CONFIG, ws::AI_ADDRCONFIG),
		(AddrFlags::NUMERIC_HOST, ws::AI_NUMERICHOST),
		(AddrFlags::NUMERIC_SERVICE, ws::AI_NUMERICSERV),
		(AddrFlags::CANONICAL_NAME, ws::AI_CANONNAME),
		(AddrFlags::ALL, ws::AI_ALL),
		(AddrFlags::V4_MAPPED, ws::AI_V4MAPPED),
	];
	TABLE
		.iter()
		.filter(|(flag, _)| flags.contains(*flag))
		.fold(0, |acc, (_, native)| acc | *native as i32)
}

/// Native message flags, without `DONT_WAIT`: Winsock has no such flag and
/// [`send`]/[`recv`] emulate it. `ERR_QUEUE` is Linux-only.
pub(crate) fn msg_flags(flags: MsgFlags) -> Result<i32, ErrorCode> {
	if flags.contains(MsgFlags::ERR_QUEUE) {
		return Err(ErrorCode::InvalidArgument);
	}
	let mut native = 0;
	if flags.contains(MsgFlags::OOB) {
		native |= ws::MSG_OOB;
	}
	if flags.contains(MsgFlags::PEEK) {
		native |= ws::MSG_PEEK;
	}
	if flags.contains(MsgFlags::TRUNC) {
		native |= ws::MSG_TRUNC as i32;
	}
	if flags.contains(MsgFlags::WAIT_ALL) {
		native |= ws::MSG_WAITALL;
	}
	if flags.contains(MsgFlags::CTRUNC) {
		native |= ws::MSG_CTRUNC as i32;
	}
	Ok(native)
}

pub(crate) fn shutdown_how(how: Shutdown) -> i32 {
	match how {
		Shutdown::Read => ws::SD_RECEIVE,
		Shutdown::Write => ws::SD_SEND,
		Shutdown::Both => ws::SD_BOTH,
	}
}

pub(crate) fn option(level: OptLevel, name: SockOption) -> Option<(i32, i32)> {
	let native = match (level, name) {
		(OptLevel::Socket, SockOption::Error) => ws::SO_ERROR,
		(OptLevel::Socket, SockOption::Broadcast) => ws::SO_BROADCAST,
		(OptLevel::Socket, SockOption::AcceptConn) => ws::SO_ACCEPTCONN,
		(OptLevel::Socket, SockOption::Debug) => ws::SO_DEBUG,
		(OptLevel::Socket, SockOption::DontRoute) => ws::SO_DONTROUTE,
		(OptLevel::Socket, SockOption::KeepAlive) => ws::SO_KEEPALIVE,
		(OptLevel::Socket, SockOption::Linger) => ws::SO_LINGER,
		(OptLevel::Socket, SockOption::OobInline) => ws::SO_OOBINLINE,
		(OptLevel::Socket, SockOption::RecvBuffer) => ws::SO_RCVBUF,
		(OptLevel::Socket, SockOption::RecvLowat) => ws::SO_RCVLOWAT,
		(OptLevel::Socket, SockOption::ReuseAddr) => ws::SO_REUSEADDR,
		(OptLevel::Socket, SockOption::RecvTimeout) => ws::SO_RCVTIMEO,
		(OptLevel::Socket, SockOption::SendBuffer) => ws::SO_SNDBUF,
		(OptLevel::Socket, SockOption::SendLowat) => ws::SO_SNDLOWAT,
		(OptLevel::Socket, SockOption::SendTimeout) => ws::SO_SNDTIMEO,
		(OptLevel::Socket, SockOption::Type) => ws::SO_TYPE,
		(OptLevel::Tcp, SockOption::TcpNoDelay) => ws::TCP_NODELAY,
		_ => return None,
	};
	let level = match level {
		OptLevel::Socket => ws::SOL_SOCKET,
		OptLevel::Tcp => ws::IPPROTO_TCP,
	};
	Some((level, native))
}

/// Winsock timeouts are a DWORD of milliseconds; zero disables.
pub(crate) fn encode_timeout(timeout: Option<Duration>) -> Vec<u8> {
	let millis: u32 = match timeout {
		None => 0,
		Some(d) if d.is_zero() => 0,
		Some(d) => d.as_millis().clamp(1, u32::MAX as u128) as u32,
	};
	millis.to_ne_bytes().to_vec()
}

pub(crate) fn encode_linger(linger: Option<Duration>) -> Vec<u8> {
	let value = ws::LINGER {
		l_onoff: linger.is_some() as u16,
		l_linger: linger.map_or(0, |d| d.as_secs().min(u16::MAX as u64) as u16),
	};
	super::struct_bytes(&value)
}

// ============================================================================
// Syscalls
// ============================================================================

#[inline]
pub(crate) fn as_raw(handle: &OwnedSocket) -> RawSocket {
	handle.as_raw_socket()
}

#[inline]
fn native(s: RawSocket) -> ws::SOCKET {
	s as ws::SOCKET
}

#[inline]
fn cvt(result: i32) -> Result<(), ErrorCode> {
	if result != 0 { Err(last()) } else { Ok(()) }
}

pub(crate) fn socket(family: i32, ty: i32, protocol: i32) -> Result<OwnedSocket, ErrorCode> {
	startup()?;
	let s = unsafe { ws::socket(family, ty, protocol) };
	if s == ws::INVALID_SOCKET {
		return Err(last());
	}
	Ok(unsafe { OwnedSocket::from_raw_socket(s as RawSocket) })
}

pub(crate) fn bind(s: RawSocket, addr: &[u8]) -> Result<(), ErrorCode> {
	cvt(unsafe { ws::bind(native(s), addr.as_ptr() as *const ws::SOCKADDR, addr.len() as i32) })
}

pub(crate) fn listen(s: RawSocket, backlog: i32) -> Result<(), ErrorCode> {
	cvt(unsafe { ws::listen(native(s), backlog) })
}

pub(crate) fn connect(s: RawSocket, addr: &[u8]) -> Result<(), ErrorCode> {
	cvt(unsafe {
		ws::connect(native(s), addr.as_ptr() as *const ws::SOCKADDR, addr.len() as i32)
	})
}

pub(crate) fn accept(s: RawSocket) -> Result<OwnedSocket, ErrorCode> {
	let new_s = unsafe { ws::accept(native(s), ptr::null_mut(), ptr::null_mut()) };
	if new_s == ws::INVALID_SOCKET {
		return Err(last());
	}
	Ok(unsafe { OwnedSocket::from_raw_socket(new_s as RawSocket) })
}

/// Runs `op` with `DONT_WAIT` emulated: a blocking socket is switched to
/// non-blocking for the one call and switched back afterwards.
fn with_dont_wait<T>(
	s: RawSocket,
	flags: MsgFlags,
	nonblocking: bool,
	op: impl FnOnce(i32) -> Result<T, ErrorCode>,
) -> Result<T, ErrorCode> {
	let native_flags = msg_flags(flags)?;
	let toggle = flags.contains(MsgFlags::DONT_WAIT) && !nonblocking;
	if toggle {
		set_nonblocking(s, true)?;
	}
	let result = op(native_flags);
	if toggle {
		let restored = set_nonblocking(s, false);
		return result.and_then(|value| restored.map(|()| value));
	}
	result
}

pub(crate) fn send(
	s: RawSocket,
	buf: &[u8],
	flags: MsgFlags,
	nonblocking: bool,
) -> Result<usize, ErrorCode> {
	with_dont_wait(s, flags, nonblocking, |native_flags| {
		let len = buf.len().min(i32::MAX as usize) as i32;
		let n = unsafe { ws::send(native(s), buf.as_ptr(), len, native_flags) };
		if n < 0 { Err(last()) } else { Ok(n as usize) }
	})
}

pub(crate) fn recv(
	s: RawSocket,
	buf: &mut [u8],
	flags: MsgFlags,
	nonblocking: bool,
) -> Result<usize, ErrorCode> {
	with_dont_wait(s, flags, nonblocking, |native_flags| {
		let len = buf.len().min(i32::MAX as usize) as i32;
		let n = unsafe { ws::recv(native(s), buf.as_mut_ptr(), len, native_flags) };
		if n < 0 { Err(last()) } else { Ok(n as usize) }
	})
}

pub(crate) fn setsockopt(s: RawSocket, level: i32, name: i32, value: &[u8]) -> Result<(), ErrorCode> {
	cvt(unsafe { ws::setsockopt(native(s), level, name, value.as_ptr(), value.len() as i32) })
}

pub(crate) fn getsockopt(
	s: RawSocket,
	level: i32,
	name: i32,
	value: &mut [u8],
) -> Result<usize, ErrorCode> {
	let mut len = value.len() as i32;
	cvt(unsafe { ws::getsockopt(native(s), level, name, value.as_mut_ptr(), &mut len) })?;
	Ok(len as usize)
}

pub(crate) fn shutdown(s: RawSocket, how: Shutdown) -> Result<(), ErrorCode> {
	cvt(unsafe { ws::shutdown(native(s), shutdown_how(how)) })
}

/// Closes the socket, reporting the `closesocket` error that dropping an
/// `OwnedSocket` would swallow.
pub(crate) fn close(handle: OwnedSocket) -> Result<(), ErrorCode> {
	let s = handle.into_raw_socket();
	cvt(unsafe { ws::closesocket(native(s)) })
}

pub(crate) fn set_nonblocking(s: RawSocket, nonblocking: bool) -> Result<(), ErrorCode> {
	let mut mode = nonblocking as u32;
	cvt(unsafe { ws::ioctlsocket(native(s), ws::FIONBIO, &mut mode) })
}

fn sockaddr_bytes(call: impl FnOnce(*mut ws::SOCKADDR, *mut i32) -> i32) -> Result<Vec<u8>, ErrorCode> {
	let mut storage: ws::SOCKADDR_STORAGE = unsafe { mem::zeroed() };
	let mut len = mem::size_of::<ws::SOCKADDR_STORAGE>() as i32;
	cvt(call(&mut storage as *mut _ as *mut ws::SOCKADDR, &mut len))?;
	let bytes = unsafe { slice::from_raw_parts(&storage as *const _ as *const u8, len as usize) };
	Ok(bytes.to_vec())
}

pub(crate) fn local_addr(s: RawSocket) -> Result<Vec<u8>, ErrorCode> {
	sockaddr_bytes(|addr, len| unsafe { ws::getsockname(native(s), addr, len) })
}

/// `NotConnected` while a non-blocking connect is still in flight.
pub(crate) fn peer_addr(s: RawSocket) -> Result<Vec<u8>, ErrorCode> {
	sockaddr_bytes(|addr, len| unsafe { ws::getpeername(native(s), addr, len) })
}

pub(crate) fn decode_sockaddr(raw: &[u8]) -> Option<SocketAddr> {
	let mut storage: ws::SOCKADDR_STORAGE = unsafe { mem::zeroed() };
	let len = raw.len().min(mem::size_of::<ws::SOCKADDR_STORAGE>());
	// copy first: the candidate's bytes carry no alignment guarantee
	unsafe {
		ptr::copy_nonoverlapping(raw.as_ptr(), &mut storage as *mut _ as *mut u8, len);
	}

	match storage.ss_family {
		ws::AF_INET if len >= mem::size_of::<ws::SOCKADDR_IN>() => {
			let sin = unsafe { &*(&storage as *const _ as *const ws::SOCKADDR_IN) };
			let ip = unsafe { sin.sin_addr.S_un.S_addr };
			Some(SocketAddr::V4(SocketAddrV4::new(
				Ipv4Addr::from(ip.to_ne_bytes()),
				u16::from_be(sin.sin_port),
			)))
		}
		ws::AF_INET6 if len >= mem::size_of::<ws::SOCKADDR_IN6>() => {
			let sin6 = unsafe { &*(&storage as *const _ as *const ws::SOCKADDR_IN6) };
			let (ip, scope_id) = unsafe { (sin6.sin6_addr.u.Byte, sin6.Anonymous.sin6_scope_id) };
			Some(SocketAddr::V6(SocketAddrV6::new(
				Ipv6Addr::from(ip),
				u16::from_be(sin6.sin6_port),
				sin6.sin6_flowinfo,
				scope_id,
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
	startup().map_err(|_| ResolveError::Fail)?;

	let mut native_hints: ws::ADDRINFOA = unsafe { mem::zeroed() };
	native_hints.ai_family = family(hints.family);
	native_hints.ai_socktype = hints.sock_type.map_or(0, sock_type);
	native_hints.ai_protocol = hints.protocol.map_or(0, protocol);
	native_hints.ai_flags = addr_flags(hints.flags);

	let mut list: *mut ws::ADDRINFOA = ptr::null_mut();
	let rc = unsafe {
		ws::getaddrinfo(
			host.map_or(ptr::null(), |h| h.as_ptr() as *const u8),
			service.map_or(ptr::null(), |s| s.as_ptr() as *const u8),
			&native_hints,
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
			let raw = unsafe { slice::from_raw_parts(info.ai_addr as *const u8, info.ai_addrlen) };
			candidates.push(AddressCandidate::from_native(
				info.ai_family,
				info.ai_socktype,
				info.ai_protocol,
				raw,
			));
		}
		cursor = info.ai_next;
	}

	unsafe { ws::freeaddrinfo(list) };
	Ok(candidates)
}
