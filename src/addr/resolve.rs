use std::ffi::CString;

use super::{AddressCandidate, ResolutionHints};
use crate::error::ResolveError;
use crate::sys;

/// Resolves `host`/`service` into address candidates.
///
/// Synchronous: a name that is not numeric may block on DNS, so callers on
/// a latency-sensitive path should resolve elsewhere first.
///
/// On success the list is never empty and keeps the platform's order, which
/// is the preference order for bind/connect. Each candidate owns a copy of
/// its native record; the platform's list is freed before this returns.
///
/// `None` for `host` resolves the wildcard (with [`AddrFlags::PASSIVE`]) or
/// loopback address. A name containing a NUL byte is `NoName`.
///
/// [`AddrFlags::PASSIVE`]: super::AddrFlags::PASSIVE
pub fn resolve(
	host: Option<&str>,
	service: Option<&str>,
	hints: &ResolutionHints,
) -> Result<Vec<AddressCandidate>, ResolveError> {
	let c_host = host
		.map(|h| CString::new(h))
		.transpose()
		.map_err(|_| ResolveError::NoName)?;
	let c_service = service
		.map(|s| CString::new(s))
		.transpose()
		.map_err(|_| ResolveError::NoName)?;

	let result = sys::getaddrinfo(c_host.as_deref(), c_service.as_deref(), hints);

	match result {
		Ok(candidates) if candidates.is_empty() => {
			tracing::debug!(?host, ?service, "resolution returned no records");
			Err(ResolveError::NoData)
		}
		Ok(candidates) => {
			tracing::debug!(?host, ?service, count = candidates.len(), "resolved");
			Ok(candidates)
		}
		Err(err) => {
			tracing::debug!(?host, ?service, error = %err, "resolution failed");
			Err(err)
		}
	}
}
