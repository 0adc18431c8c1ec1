use std::fmt;
use std::ops::Deref;

/// Bytes from one receive, owned by whoever holds the packet.
///
/// A connection builds a packet from its receive buffer and moves it into
/// the receive callback; nothing is shared afterwards.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Packet {
	data: Vec<u8>,
}

impl Packet {
	pub fn new() -> Self {
		Self::default()
	}

	#[inline]
	pub fn len(&self) -> usize {
		self.data.len()
	}

	#[inline]
	pub fn is_empty(&self) -> bool {
		self.data.is_empty()
	}

	#[inline]
	pub fn as_slice(&self) -> &[u8] {
		&self.data
	}

	pub fn into_vec(self) -> Vec<u8> {
		self.data
	}
}

impl From<Vec<u8>> for Packet {
	fn from(data: Vec<u8>) -> Self {
		Self { data }
	}
}

impl From<&[u8]> for Packet {
	fn from(data: &[u8]) -> Self {
		Self { data: data.to_vec() }
	}
}

impl Deref for Packet {
	type Target = [u8];

	fn deref(&self) -> &[u8] {
		&self.data
	}
}

impl AsRef<[u8]> for Packet {
	fn as_ref(&self) -> &[u8] {
		&self.data
	}
}

impl fmt::Debug for Packet {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Packet").field("len", &self.data.len()).finish()
	}
}
