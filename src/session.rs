//! Session-expiry notification: the observer contract and its registration slot.

// self
use crate::{
	_prelude::*,
	error::RefreshFailure,
	obs::{self, RelayEvent},
};

/// Observer invoked once per failed refresh cycle, when the session cannot be restored.
///
/// Typical implementations clear UI state and route the user back to sign-in. The callback runs
/// on the task that performed the refresh, so it should hand heavy work off rather than block.
pub trait SessionExpiredHandler
where
	Self: Send + Sync,
{
	/// Called after every waiting caller has been rejected with the same `cause`.
	fn on_session_expired(&self, cause: &RefreshFailure);
}
impl<F> SessionExpiredHandler for F
where
	F: Send + Sync + Fn(),
{
	fn on_session_expired(&self, _cause: &RefreshFailure) {
		self()
	}
}

/// Holds the registered [`SessionExpiredHandler`], if any.
#[derive(Default)]
pub struct SessionNotifier {
	handler: RwLock<Option<Arc<dyn SessionExpiredHandler>>>,
}
impl SessionNotifier {
	/// Installs `handler`, replacing any previous registration.
	pub fn register(&self, handler: Arc<dyn SessionExpiredHandler>) {
		if self.handler.write().replace(handler).is_some() {
			obs::record_event(RelayEvent::HandlerReplaced);
		}
	}

	/// Removes the registered handler, returning it.
	pub fn clear(&self) -> Option<Arc<dyn SessionExpiredHandler>> {
		self.handler.write().take()
	}

	/// Returns `true` when a handler is installed.
	pub fn is_registered(&self) -> bool {
		self.handler.read().is_some()
	}

	/// Invokes the handler, if one is installed.
	pub(crate) fn notify(&self, cause: &RefreshFailure) {
		// Clone out of the lock so the handler may re-register without deadlocking.
		let handler = self.handler.read().clone();

		if let Some(handler) = handler {
			handler.on_session_expired(cause);
		}
	}
}
impl Debug for SessionNotifier {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("SessionNotifier").field("registered", &self.is_registered()).finish()
	}
}
