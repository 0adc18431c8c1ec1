//! Address families, resolution hints and resolved address candidates.
//!
//! Everything here is portable. The native numbers behind each value live
//! in `crate::sys`; a candidate's raw bytes are only ever read by the
//! backend that produced them.

mod resolve;

pub use self::resolve::resolve;

use std::fmt;
use std::net::SocketAddr;
use std::ops::{BitOr, BitOrAssign};

use crate::sys;

/// Address family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Family {
	/// Let the resolver pick (`AF_UNSPEC`).
	#[default]
	Unspecified,
	Ipv4,
	Ipv6,
}

/// Socket type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SockType {
	/// Reliable, ordered byte stream.
	Stream,
	Datagram,
	Raw,
	/// Reliable datagrams (`SOCK_RDM`).
	ReliableDatagram,
	/// Sequenced, reliable, connection-based packets.
	SeqPacket,
}

/// Transport protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Protocol {
	Tcp,
	Udp,
}

/// Resolution flag set.
///
/// Combine with `|`. The bit values are portable; each backend translates
/// them to its own `AI_*` constants.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct AddrFlags(u32);

impl AddrFlags {
	/// Wildcard address for bind-side resolution when no host is given.
	pub const PASSIVE: AddrFlags = AddrFlags(1 << 0);
	pub const ADDR_CONFIG: AddrFlags = AddrFlags(1 << 1);
	/// Host must be a numeric address; no DNS lookup happens.
	pub const NUMERIC_HOST: AddrFlags = AddrFlags(1 << 2);
	pub const NUMERIC_SERVICE: AddrFlags = AddrFlags(1 << 3);
	pub const CANONICAL_NAME: AddrFlags = AddrFlags(1 << 4);
	pub const ALL: AddrFlags = AddrFlags(1 << 5);
	pub const V4_MAPPED: AddrFlags = AddrFlags(1 << 6);

	#[inline]
	pub const fn empty() -> Self {
		AddrFlags(0)
	}

	#[inline]
	pub const fn bits(self) -> u32 {
		self.0
	}

	#[inline]
	pub const fn contains(self, other: AddrFlags) -> bool {
		self.0 & other.0 == other.0
	}

	#[inline]
	pub const fn is_empty(self) -> bool {
		self.0 == 0
	}
}

impl BitOr for AddrFlags {
	type Output = AddrFlags;

	fn bitor(self, rhs: AddrFlags) -> AddrFlags {
		AddrFlags(self.0 | rhs.0)
	}
}

impl BitOrAssign for AddrFlags {
	fn bitor_assign(&mut self, rhs: AddrFlags) {
		self.0 |= rhs.0;
	}
}

impl fmt::Debug for AddrFlags {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		const NAMES: [(AddrFlags, &str); 7] = [
			(AddrFlags::PASSIVE, "PASSIVE"),
			(AddrFlags::ADDR_CONFIG, "ADDR_CONFIG"),
			(AddrFlags::NUMERIC_HOST, "NUMERIC_HOST"),
			(AddrFlags::NUMERIC_SERVICE, "NUMERIC_SERVICE"),
			(AddrFlags::CANONICAL_NAME, "CANONICAL_NAME"),
			(AddrFlags::ALL, "ALL"),
			(AddrFlags::V4_MAPPED, "V4_MAPPED"),
		];
		let mut set = f.debug_set();
		for (flag, name) in NAMES {
			if self.contains(flag) {
				set.entry(&format_args!("{name}"));
			}
		}
		set.finish()
	}
}

/// Hints for one resolution request.
///
/// A plain value: build it with a struct literal or [`configure`].
///
/// ```ignore
/// let hints = ResolutionHints {
///     family: Family::Ipv4,
///     sock_type: Some(SockType::Stream),
///     ..ResolutionHints::default()
/// };
/// ```
///
/// [`configure`]: ResolutionHints::configure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ResolutionHints {
	pub family: Family,
	/// `None` accepts any socket type.
	pub sock_type: Option<SockType>,
	/// `None` accepts any protocol.
	pub protocol: Option<Protocol>,
	pub flags: AddrFlags,
}

impl ResolutionHints {
	pub const fn configure(
		family: Family,
		sock_type: Option<SockType>,
		protocol: Option<Protocol>,
		flags: AddrFlags,
	) -> Self {
		Self { family, sock_type, protocol, flags }
	}

	/// IPv4 TCP stream hints, as a listener uses them.
	pub const fn tcp_v4() -> Self {
		Self::configure(
			Family::Ipv4,
			Some(SockType::Stream),
			Some(Protocol::Tcp),
			AddrFlags(AddrFlags::PASSIVE.0 | AddrFlags::NUMERIC_SERVICE.0),
		)
	}
}

/// One resolved address, usable for bind or connect.
///
/// Owns a copy of the platform's native record: family, socket type and
/// protocol numbers plus the raw `sockaddr` bytes. Immutable.
#[derive(Clone, PartialEq, Eq)]
pub struct AddressCandidate {
	family: i32,
	sock_type: i32,
	protocol: i32,
	addr: Box<[u8]>,
}

impl AddressCandidate {
	pub(crate) fn from_native(family: i32, sock_type: i32, protocol: i32, addr: &[u8]) -> Self {
		Self {
			family,
			sock_type,
			protocol,
			addr: addr.into(),
		}
	}

	/// The portable family, if this backend knows it.
	pub fn family(&self) -> Option<Family> {
		sys::family_from_raw(self.family)
	}

	/// Size of the raw address record in bytes.
	#[inline]
	pub fn len(&self) -> usize {
		self.addr.len()
	}

	#[inline]
	pub fn is_empty(&self) -> bool {
		self.addr.is_empty()
	}

	/// Decodes the address for display and diagnostics.
	///
	/// `None` for families other than IPv4/IPv6.
	pub fn socket_addr(&self) -> Option<SocketAddr> {
		sys::decode_sockaddr(&self.addr)
	}

	#[inline]
	pub(crate) fn native_triple(&self) -> (i32, i32, i32) {
		(self.family, self.sock_type, self.protocol)
	}

	#[inline]
	pub(crate) fn raw(&self) -> &[u8] {
		&self.addr
	}
}

impl fmt::Debug for AddressCandidate {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let mut d = f.debug_struct("AddressCandidate");
		match self.socket_addr() {
			Some(addr) => d.field("addr", &addr),
			None => d.field("family", &self.family),
		};
		d.field("len", &self.addr.len()).finish()
	}
}

impl fmt::Display for AddressCandidate {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self.socket_addr() {
			Some(addr) => write!(f, "{addr}"),
			None => write!(f, "<family {} address, {} bytes>", self.family, self.addr.len()),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn flags_combine() {
		let flags = AddrFlags::PASSIVE | AddrFlags::NUMERIC_HOST;
		assert!(flags.contains(AddrFlags::PASSIVE));
		assert!(flags.contains(AddrFlags::NUMERIC_HOST));
		assert!(!flags.contains(AddrFlags::CANONICAL_NAME));
		assert!(AddrFlags::empty().is_empty());
		assert_eq!(format!("{flags:?}"), "{PASSIVE, NUMERIC_HOST}");
	}

	#[test]
	fn tcp_hints_are_passive_numeric_service() {
		let hints = ResolutionHints::tcp_v4();
		assert_eq!(hints.family, Family::Ipv4);
		assert_eq!(hints.sock_type, Some(SockType::Stream));
		assert_eq!(hints.protocol, Some(Protocol::Tcp));
		assert!(hints.flags.contains(AddrFlags::PASSIVE | AddrFlags::NUMERIC_SERVICE));
	}

	#[test]
	fn default_hints_accept_anything() {
		let hints = ResolutionHints::default();
		assert_eq!(hints.family, Family::Unspecified);
		assert_eq!(hints.sock_type, None);
		assert_eq!(hints.protocol, None);
		assert!(hints.flags.is_empty());
	}
}
