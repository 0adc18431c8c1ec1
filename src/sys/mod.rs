//! Native backends.
//!
//! Exactly one of these is compiled in. Each provides the same set of
//! `pub(crate)` items: the owned/raw handle types, one error mapping table,
//! the constant mappings for the portable enums, and thin syscall wrappers
//! that return `Result<_, ErrorCode>`. No native constant escapes this
//! module.

#[cfg(unix)]
mod unix;
#[cfg(unix)]
pub(crate) use self::unix::*;

#[cfg(windows)]
mod windows;
#[cfg(windows)]
pub(crate) use self::windows::*;

#[cfg(not(any(unix, windows)))]
compile_error!("socklane supports unix and windows targets only");

/// Copies a plain C struct into an option value buffer.
pub(crate) fn struct_bytes<T: Copy>(value: &T) -> Vec<u8> {
	// SAFETY: `T: Copy` C structs have no drop glue; we only read
	// size_of::<T>() bytes from a valid reference.
	let bytes = unsafe {
		std::slice::from_raw_parts(value as *const T as *const u8, std::mem::size_of::<T>())
	};
	bytes.to_vec()
}
