//! Single-flight credential refresh with an ordered wait queue.
//!
//! [`RefreshCoordinator::handle_unauthorized`] is the only way into the state machine. The first
//! caller to arrive while the coordinator is idle becomes the initiator and performs the refresh;
//! everyone arriving while a refresh is in flight is appended to the queue and parked on a
//! oneshot channel. When the refresh finishes, the queue is taken in the same critical section
//! that returns the phase to idle, then drained front to back: on success each queued request is
//! re-dispatched with the new token, polled once so the exchange starts in queue order, and handed
//! to its caller; on failure each caller is rejected with the same cause and the session-expired
//! handler fires once.
//!
//! Only the store read and the endpoint call run under the refresh timeout. Tokens returned by a
//! successful exchange are always persisted, the rotated refresh token before the access token.

mod metrics;

pub use metrics::RefreshMetrics;

// std
use std::task::Poll;
// crates.io
use http::{
	HeaderValue,
	header::{ACCEPT, CONTENT_TYPE},
};
use tokio::sync::oneshot;
// self
use crate::{
	_prelude::*,
	auth::TokenSecret,
	config::RelayConfig,
	error::RefreshFailure,
	obs::{self, FlowKind, FlowOutcome, FlowSpan, RelayEvent},
	relay::common::{self, AuthHeader},
	session::SessionNotifier,
	store::{CredentialStore, TokenKind},
	transport::{ApiRequest, ApiResponse, RequestOptions, Transport, TransportFuture},
};

/// Coordinator phase.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Phase {
	Idle,
	Refreshing,
}

/// Wire body sent to the refresh endpoint.
#[derive(Serialize)]
struct RefreshRequest<'a> {
	refresh: &'a str,
}

/// Wire body returned by the refresh endpoint.
#[derive(Deserialize)]
struct RefreshResponse {
	access: String,
	#[serde(default)]
	refresh: Option<String>,
}

/// Tokens returned by the refresh endpoint, not yet persisted.
struct Issued {
	access: TokenSecret,
	bearer: HeaderValue,
	rotated: Option<TokenSecret>,
}

/// Token produced by a successful refresh, pre-encoded for replays.
struct Refreshed {
	access: TokenSecret,
	bearer: HeaderValue,
	rotated: bool,
}

/// How a queued caller is released.
enum Settlement {
	/// Refresh succeeded; the caller's replay is already started.
	Replay(TransportFuture),
	/// Refresh failed; the session is over.
	Expired(RefreshFailure),
	/// The initiator went away; try again from the top.
	Reenter,
}

struct PendingCaller {
	settle: oneshot::Sender<Settlement>,
	request: ApiRequest,
}

struct RefreshState {
	phase: Phase,
	queue: VecDeque<PendingCaller>,
	/// Access token installed by the last successful refresh or sign-in.
	current: Option<TokenSecret>,
	generation: u64,
}

enum Admission {
	Initiator,
	Queued(oneshot::Receiver<Settlement>),
	Stale(TokenSecret),
}

/// Owns the refresh state machine; see the module docs for the protocol.
pub(crate) struct RefreshCoordinator {
	state: Mutex<RefreshState>,
	config: Arc<RelayConfig>,
	store: Arc<dyn CredentialStore>,
	transport: Arc<dyn Transport>,
	notifier: Arc<SessionNotifier>,
	metrics: Arc<RefreshMetrics>,
	content_type: HeaderValue,
}
impl RefreshCoordinator {
	pub(crate) fn new(
		config: Arc<RelayConfig>,
		store: Arc<dyn CredentialStore>,
		transport: Arc<dyn Transport>,
		notifier: Arc<SessionNotifier>,
		metrics: Arc<RefreshMetrics>,
		content_type: HeaderValue,
	) -> Self {
		Self {
			state: Mutex::new(RefreshState {
				phase: Phase::Idle,
				queue: VecDeque::new(),
				current: None,
				generation: 0,
			}),
			config,
			store,
			transport,
			notifier,
			metrics,
			content_type,
		}
	}

	/// Resolves a request whose first attempt was rejected as unauthorized.
	///
	/// `request` is the caller's original, uncomposed request and `sent_with` the access token
	/// attached to the rejected attempt.
	pub(crate) async fn handle_unauthorized(
		&self,
		request: ApiRequest,
		sent_with: Option<TokenSecret>,
	) -> Result<ApiResponse> {
		loop {
			match self.admit(&request, sent_with.as_ref()) {
				Admission::Initiator => return self.lead(request).await,
				Admission::Stale(current) => return self.replay_stale(request, current).await,
				Admission::Queued(receiver) => match receiver.await {
					Ok(Settlement::Replay(replay)) => return Ok(replay.await?),
					Ok(Settlement::Expired(cause)) => return Err(Error::SessionExpired(cause)),
					Ok(Settlement::Reenter) | Err(_) => continue,
				},
			}
		}
	}

	/// Records the access token written by an explicit sign-in or sign-out.
	pub(crate) fn install(&self, access: Option<TokenSecret>) {
		self.state.lock().current = access;
	}

	#[cfg(test)]
	pub(crate) fn snapshot(&self) -> (Phase, usize, u64) {
		let state = self.state.lock();

		(state.phase, state.queue.len(), state.generation)
	}

	/// Decides this caller's role in one critical section.
	fn admit(&self, request: &ApiRequest, sent_with: Option<&TokenSecret>) -> Admission {
		let mut state = self.state.lock();
		let phase = state.phase;

		match phase {
			Phase::Refreshing => {
				let (settle, receiver) = oneshot::channel();

				state.queue.push_back(PendingCaller { settle, request: request.clone() });

				let position = state.queue.len();

				drop(state);
				self.metrics.record_queued();
				obs::record_flow_outcome(FlowKind::Refresh, FlowOutcome::Queued);
				obs::record_event(RelayEvent::CallerQueued { position });

				Admission::Queued(receiver)
			},
			Phase::Idle => {
				let stale = state.current.clone().filter(|current| Some(current) != sent_with);

				if let Some(current) = stale {
					self.metrics.record_stale_replay();
					obs::record_event(RelayEvent::StaleReplay { generation: state.generation });

					return Admission::Stale(current);
				}

				state.phase = Phase::Refreshing;

				obs::record_event(RelayEvent::RefreshStarted { generation: state.generation });

				Admission::Initiator
			},
		}
	}

	/// Runs one refresh cycle as the initiator, then retries the initiator's own request.
	async fn lead(&self, request: ApiRequest) -> Result<ApiResponse> {
		const KIND: FlowKind = FlowKind::Refresh;

		let span = FlowSpan::new(KIND, "handle_unauthorized");
		let mut cycle = CycleGuard { coordinator: self, armed: true };

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);
		self.metrics.record_attempt();

		let outcome = span.instrument(self.renew()).await;

		cycle.armed = false;

		match outcome {
			Ok(refreshed) => {
				let (queue, generation) = {
					let mut state = self.state.lock();

					state.phase = Phase::Idle;
					state.current = Some(refreshed.access.clone());
					state.generation += 1;

					(std::mem::take(&mut state.queue), state.generation)
				};
				let replayed = queue.len();

				for pending in queue {
					let replay = start(self.transport.send(common::compose(
						&pending.request,
						AuthHeader::Replace(&refreshed.bearer),
						&self.content_type,
					)))
					.await;

					// A dropped receiver means the caller gave up; its replay is discarded.
					let _ = pending.settle.send(Settlement::Replay(replay));
				}

				self.metrics.record_success();
				obs::record_flow_outcome(KIND, FlowOutcome::Success);
				obs::record_event(RelayEvent::RefreshSucceeded {
					generation,
					fingerprint: &refreshed.access.fingerprint(),
					rotated: refreshed.rotated,
					replayed,
				});

				self.replay(&request, &refreshed.bearer).await
			},
			Err(cause) => {
				let queue = {
					let mut state = self.state.lock();

					state.phase = Phase::Idle;

					std::mem::take(&mut state.queue)
				};
				let rejected = queue.len();

				for pending in queue {
					let _ = pending.settle.send(Settlement::Expired(cause.clone()));
				}

				self.metrics.record_failure();
				obs::record_flow_outcome(KIND, FlowOutcome::Failure);
				obs::record_event(RelayEvent::RefreshFailed { cause: &cause, rejected });
				self.notifier.notify(&cause);

				Err(Error::SessionExpired(cause))
			},
		}
	}

	/// Replays a request whose 401 was for a token that a finished refresh already replaced.
	async fn replay_stale(&self, request: ApiRequest, current: TokenSecret) -> Result<ApiResponse> {
		let bearer = common::bearer_header(&current)?;

		self.replay(&request, &bearer).await
	}

	async fn replay(&self, request: &ApiRequest, bearer: &HeaderValue) -> Result<ApiResponse> {
		const KIND: FlowKind = FlowKind::Replay;

		let span = FlowSpan::new(KIND, "replay");
		let composed = common::compose(request, AuthHeader::Replace(bearer), &self.content_type);

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);

		let result = span.instrument(self.transport.send(composed)).await;

		match &result {
			Ok(_) => obs::record_flow_outcome(KIND, FlowOutcome::Success),
			Err(_) => obs::record_flow_outcome(KIND, FlowOutcome::Failure),
		}

		Ok(result?)
	}

	/// Obtains and persists a new access token.
	async fn renew(&self) -> Result<Refreshed, RefreshFailure> {
		let issued = self.refresh().await?;

		self.persist(issued).await
	}

	/// Reads the refresh token and calls the endpoint under the configured timeout.
	async fn refresh(&self) -> Result<Issued, RefreshFailure> {
		let after = self.config.refresh_timeout;

		tokio::time::timeout(self.config.refresh_timeout_std(), self.exchange())
			.await
			.unwrap_or(Err(RefreshFailure::TimedOut { after }))
	}

	async fn exchange(&self) -> Result<Issued, RefreshFailure> {
		let refresh_token = self
			.store
			.get_token(TokenKind::Refresh)
			.await
			.map_err(|e| RefreshFailure::Storage { message: e.to_string() })?
			.filter(|secret| !secret.is_blank())
			.ok_or(RefreshFailure::MissingRefreshToken)?;
		let options = RequestOptions::post()
			.with_header(CONTENT_TYPE, HeaderValue::from_static("application/json"))
			.with_header(ACCEPT, HeaderValue::from_static("application/json"))
			.with_json(&RefreshRequest { refresh: refresh_token.expose() })
			.map_err(|e| RefreshFailure::Transport { message: render_chain(&e) })?;
		let response = self
			.transport
			.send(ApiRequest::new(self.config.refresh_endpoint.clone(), options))
			.await
			.map_err(|e| RefreshFailure::Transport { message: render_chain(&e) })?;

		if !response.is_success() {
			return Err(RefreshFailure::Rejected { status: response.status.as_u16() });
		}

		let body = response
			.json::<RefreshResponse>()
			.map_err(|e| RefreshFailure::MalformedResponse { message: e.to_string() })?;
		let access = TokenSecret::new(body.access);

		if access.is_blank() {
			return Err(RefreshFailure::MalformedResponse {
				message: "access: token is empty".into(),
			});
		}

		let bearer = common::bearer_header(&access)
			.map_err(|e| RefreshFailure::MalformedResponse { message: render_chain(&e) })?;
		let rotated = body.refresh.map(TokenSecret::new).filter(|secret| !secret.is_blank());

		Ok(Issued { access, bearer, rotated })
	}

	/// Writes the issued tokens; the rotated refresh token goes first.
	async fn persist(&self, issued: Issued) -> Result<Refreshed, RefreshFailure> {
		let Issued { access, bearer, rotated } = issued;
		let was_rotated = rotated.is_some();

		if let Some(secret) = rotated {
			self.store
				.set_token(TokenKind::Refresh, Some(secret))
				.await
				.map_err(|e| RefreshFailure::Storage { message: e.to_string() })?;
		}

		self.store
			.set_token(TokenKind::Access, Some(access.clone()))
			.await
			.map_err(|e| RefreshFailure::Storage { message: e.to_string() })?;

		Ok(Refreshed { access, bearer, rotated: was_rotated })
	}
}

/// Returns the coordinator to idle if the initiator is dropped mid-refresh.
///
/// Waiters are told to re-enter; the first one back becomes the next initiator.
struct CycleGuard<'a> {
	coordinator: &'a RefreshCoordinator,
	armed: bool,
}
impl Drop for CycleGuard<'_> {
	fn drop(&mut self) {
		if !self.armed {
			return;
		}

		let queue = {
			let mut state = self.coordinator.state.lock();

			state.phase = Phase::Idle;

			std::mem::take(&mut state.queue)
		};
		let released = queue.len();

		for pending in queue {
			let _ = pending.settle.send(Settlement::Reenter);
		}

		self.coordinator.metrics.record_abandoned();
		obs::record_event(RelayEvent::RefreshAbandoned { released });
	}
}

/// Polls `replay` once so its exchange begins before the next one is dispatched.
///
/// A replay that completes on the first poll is handed over as a ready future.
async fn start(mut replay: TransportFuture) -> TransportFuture {
	let polled = std::future::poll_fn(|cx| Poll::Ready(replay.as_mut().poll(cx))).await;

	match polled {
		Poll::Ready(result) => Box::pin(std::future::ready(result)),
		Poll::Pending => replay,
	}
}

fn render_chain(error: &(dyn StdError + 'static)) -> String {
	let mut rendered = error.to_string();
	let mut source = error.source();

	while let Some(cause) = source {
		rendered.push_str(": ");
		rendered.push_str(&cause.to_string());

		source = cause.source();
	}

	rendered
}
