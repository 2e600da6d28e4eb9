// self
use crate::{_prelude::*, error::RefreshFailure, obs::FlowKind};

/// Type alias that resolves to an instrumented future when tracing is enabled.
#[cfg(feature = "tracing")]
pub type InstrumentedFlow<F> = tracing::instrument::Instrumented<F>;
/// Passthrough future type when tracing is disabled.
#[cfg(not(feature = "tracing"))]
pub type InstrumentedFlow<F> = F;

/// A span builder used by relay flows.
#[derive(Clone, Debug)]
pub struct FlowSpan {
	#[cfg(feature = "tracing")]
	span: tracing::Span,
}
impl FlowSpan {
	/// Creates a new span tagged with the provided flow kind + stage.
	pub fn new(kind: FlowKind, stage: &'static str) -> Self {
		#[cfg(feature = "tracing")]
		{
			let span = tracing::info_span!("session_relay.flow", flow = kind.as_str(), stage);

			Self { span }
		}
		#[cfg(not(feature = "tracing"))]
		{
			let _ = (kind, stage);

			Self {}
		}
	}

	/// Instruments an async block without holding a guard across `.await` points.
	pub fn instrument<Fut>(&self, fut: Fut) -> InstrumentedFlow<Fut>
	where
		Fut: Future,
	{
		#[cfg(feature = "tracing")]
		{
			use tracing::Instrument;

			fut.instrument(self.span.clone())
		}
		#[cfg(not(feature = "tracing"))]
		{
			fut
		}
	}
}

/// Lifecycle events emitted by the refresh coordinator.
///
/// Every variant renders to one structured event; none of them carries a raw token.
#[derive(Clone, Debug)]
pub enum RelayEvent<'a> {
	/// A caller became the initiator of a new refresh cycle.
	RefreshStarted {
		/// Generation the cycle will replace.
		generation: u64,
	},
	/// A caller joined the in-flight refresh.
	CallerQueued {
		/// 1-based position in the wait queue.
		position: usize,
	},
	/// Refresh succeeded and the queue was drained.
	RefreshSucceeded {
		/// New generation.
		generation: u64,
		/// Fingerprint of the new access token.
		fingerprint: &'a str,
		/// Whether the endpoint rotated the refresh token.
		rotated: bool,
		/// Number of queued callers replayed.
		replayed: usize,
	},
	/// Refresh failed and the queue was rejected.
	RefreshFailed {
		/// Failure cause.
		cause: &'a RefreshFailure,
		/// Number of queued callers rejected.
		rejected: usize,
	},
	/// The initiator was dropped before finishing; waiters were released to retry.
	RefreshAbandoned {
		/// Number of queued callers released.
		released: usize,
	},
	/// A 401 for a superseded token was replayed without a new refresh.
	StaleReplay {
		/// Generation of the token used for the replay.
		generation: u64,
	},
	/// The session-expired handler was replaced.
	HandlerReplaced,
}

/// Emits `event` through `tracing` (when enabled).
pub fn record_event(event: RelayEvent<'_>) {
	#[cfg(feature = "tracing")]
	{
		match event {
			RelayEvent::RefreshStarted { generation } => {
				tracing::debug!(generation, "access token rejected; starting refresh");
			},
			RelayEvent::CallerQueued { position } => {
				tracing::debug!(position, "refresh in flight; caller queued");
			},
			RelayEvent::RefreshSucceeded { generation, fingerprint, rotated, replayed } => {
				tracing::debug!(generation, fingerprint, rotated, replayed, "refresh succeeded");
			},
			RelayEvent::RefreshFailed { cause, rejected } => {
				tracing::warn!(%cause, rejected, "refresh failed; session expired");
			},
			RelayEvent::RefreshAbandoned { released } => {
				tracing::warn!(released, "refresh initiator dropped; releasing waiters");
			},
			RelayEvent::StaleReplay { generation } => {
				tracing::debug!(generation, "replaying request sent with a superseded token");
			},
			RelayEvent::HandlerReplaced => {
				tracing::debug!("session-expired handler replaced");
			},
		}
	}
	#[cfg(not(feature = "tracing"))]
	{
		let _ = event;
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn record_event_accepts_every_variant() {
		let cause = RefreshFailure::MissingRefreshToken;

		record_event(RelayEvent::RefreshStarted { generation: 0 });
		record_event(RelayEvent::CallerQueued { position: 1 });
		record_event(RelayEvent::RefreshSucceeded {
			generation: 1,
			fingerprint: "abc",
			rotated: false,
			replayed: 2,
		});
		record_event(RelayEvent::RefreshFailed { cause: &cause, rejected: 2 });
		record_event(RelayEvent::RefreshAbandoned { released: 0 });
		record_event(RelayEvent::StaleReplay { generation: 1 });
		record_event(RelayEvent::HandlerReplaced);
	}

	#[tokio::test]
	async fn instrument_wraps_future() {
		let span = FlowSpan::new(FlowKind::Refresh, "instrument_wraps_future");
		let value = span.instrument(async { 42 }).await;

		assert_eq!(value, 42);
	}
}
