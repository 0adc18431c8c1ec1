use std::thread::JoinHandle;

use super::Listener;
use crate::error::ProvisionError;

/// A listener whose setup (reuse-address, `listen`, non-blocking switch) is
/// running on its own thread.
///
/// The listener is moved into the setup thread and handed back by
/// [`wait`](PendingStart::wait), so nothing can tick it half-configured.
#[must_use = "the listener is only returned by wait()"]
pub struct PendingStart {
	handle: JoinHandle<Result<Listener, ProvisionError>>,
}

impl PendingStart {
	pub(crate) fn spawn(listener: Listener) -> Self {
		let handle = std::thread::spawn(move || listener.configure());
		Self { handle }
	}

	/// True once setup has finished; `wait` will then return at once.
	#[inline]
	pub fn is_finished(&self) -> bool {
		self.handle.is_finished()
	}

	/// Joins the setup thread and returns the started listener.
	pub fn wait(self) -> Result<Listener, ProvisionError> {
		self.handle.join().map_err(|_| ProvisionError::SetupPanicked)?
	}
}

impl std::fmt::Debug for PendingStart {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("PendingStart")
			.field("finished", &self.handle.is_finished())
			.finish()
	}
}
