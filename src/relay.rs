//! The relay facade: header composition, dispatch, and hand-off to the refresh coordinator.

mod common;
mod refresh;

pub use refresh::RefreshMetrics;

// crates.io
use http::{HeaderValue, Method};
// self
use crate::{
	_prelude::*,
	auth::Credentials,
	config::RelayConfig,
	error::ConfigError,
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
	relay::{common::AuthHeader, refresh::RefreshCoordinator},
	session::{SessionExpiredHandler, SessionNotifier},
	store::{CredentialStore, TokenKind},
	transport::{ApiRequest, ApiResponse, RequestOptions, Transport},
};
#[cfg(feature = "reqwest")]
use crate::transport::ReqwestTransport;

/// Attaches the stored access token to outgoing requests and recovers from expired tokens.
///
/// Every request goes through [`Relay::perform_request`]. When the API answers with one of the
/// configured unauthorized statuses, the relay refreshes the access token once, no matter how
/// many requests failed concurrently, and replays each of them in arrival order with the new
/// token. When the refresh fails, every affected caller receives [`Error::SessionExpired`] and the
/// registered [`SessionExpiredHandler`] runs once.
///
/// Cloning is cheap; clones share the store, transport, and refresh state.
#[derive(Clone)]
pub struct Relay {
	config: Arc<RelayConfig>,
	store: Arc<dyn CredentialStore>,
	transport: Arc<dyn Transport>,
	notifier: Arc<SessionNotifier>,
	metrics: Arc<RefreshMetrics>,
	coordinator: Arc<RefreshCoordinator>,
	content_type: HeaderValue,
}
impl Relay {
	/// Creates a relay that sends requests through the caller-provided transport.
	pub fn with_transport(
		config: RelayConfig,
		store: Arc<dyn CredentialStore>,
		transport: Arc<dyn Transport>,
	) -> Result<Self> {
		config.validate().map_err(ConfigError::from)?;

		let content_type = HeaderValue::from_str(&config.default_content_type)
			.map_err(|source| ConfigError::InvalidHeader { name: "content-type", source })?;
		let config = Arc::new(config);
		let notifier = Arc::new(SessionNotifier::default());
		let metrics = Arc::new(RefreshMetrics::default());
		let coordinator = Arc::new(RefreshCoordinator::new(
			config.clone(),
			store.clone(),
			transport.clone(),
			notifier.clone(),
			metrics.clone(),
			content_type.clone(),
		));

		Ok(Self { config, store, transport, notifier, metrics, coordinator, content_type })
	}

	/// Performs a request, injecting credentials and recovering from an expired access token.
	///
	/// `url` is absolute or relative to [`RelayConfig::base_url`]. `options` is never modified;
	/// the relay composes headers on a private copy so the same options can be replayed.
	///
	/// Non-authorization statuses, including server errors, resolve `Ok` with the upstream
	/// response untouched.
	pub async fn perform_request(
		&self,
		url: &str,
		options: &RequestOptions,
	) -> Result<ApiResponse> {
		const KIND: FlowKind = FlowKind::Dispatch;

		let span = FlowSpan::new(KIND, "perform_request");

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);

		let result = span.instrument(self.dispatch(url, options)).await;

		match &result {
			Ok(_) => obs::record_flow_outcome(KIND, FlowOutcome::Success),
			Err(_) => obs::record_flow_outcome(KIND, FlowOutcome::Failure),
		}

		result
	}

	/// Sends a `GET` request.
	pub async fn get(&self, url: &str) -> Result<ApiResponse> {
		self.perform_request(url, &RequestOptions::get()).await
	}

	/// Sends a `DELETE` request.
	pub async fn delete(&self, url: &str) -> Result<ApiResponse> {
		self.perform_request(url, &RequestOptions::new(Method::DELETE)).await
	}

	/// Sends a `POST` request with `body` serialized as JSON.
	pub async fn post_json<T>(&self, url: &str, body: &T) -> Result<ApiResponse>
	where
		T: ?Sized + Serialize,
	{
		self.send_json(Method::POST, url, body).await
	}

	/// Sends a `PUT` request with `body` serialized as JSON.
	pub async fn put_json<T>(&self, url: &str, body: &T) -> Result<ApiResponse>
	where
		T: ?Sized + Serialize,
	{
		self.send_json(Method::PUT, url, body).await
	}

	/// Sends a `PATCH` request with `body` serialized as JSON.
	pub async fn patch_json<T>(&self, url: &str, body: &T) -> Result<ApiResponse>
	where
		T: ?Sized + Serialize,
	{
		self.send_json(Method::PATCH, url, body).await
	}

	/// Installs the observer notified when a refresh fails, replacing any previous one.
	pub fn register_session_expired_handler<H>(&self, handler: H)
	where
		H: 'static + SessionExpiredHandler,
	{
		self.notifier.register(Arc::new(handler));
	}

	/// Loads the stored credentials.
	pub async fn credentials(&self) -> Result<Credentials> {
		Ok(self.store.load().await?)
	}

	/// Stores credentials obtained from an out-of-band sign-in.
	pub async fn sign_in(&self, credentials: Credentials) -> Result<()> {
		let access = credentials.access_token.clone();

		self.store.replace(credentials).await?;
		self.coordinator.install(access);

		Ok(())
	}

	/// Clears both stored tokens.
	pub async fn sign_out(&self) -> Result<()> {
		self.store.replace(Credentials::default()).await?;
		self.coordinator.install(None);

		Ok(())
	}

	/// Counters describing refresh activity since construction.
	pub fn refresh_metrics(&self) -> &RefreshMetrics {
		&self.metrics
	}

	/// The validated configuration this relay runs with.
	pub fn config(&self) -> &RelayConfig {
		&self.config
	}

	async fn send_json<T>(&self, method: Method, url: &str, body: &T) -> Result<ApiResponse>
	where
		T: ?Sized + Serialize,
	{
		let options = RequestOptions::new(method).with_json(body)?;

		self.perform_request(url, &options).await
	}

	async fn dispatch(&self, url: &str, options: &RequestOptions) -> Result<ApiResponse> {
		let url = common::resolve_url(self.config.base_url.as_ref(), url)?;
		let request = ApiRequest::new(url, options.clone());
		let access = self.store.get_token(TokenKind::Access).await?.filter(|t| !t.is_blank());
		let bearer = access.as_ref().map(common::bearer_header).transpose()?;
		let outgoing =
			common::compose(&request, AuthHeader::IfAbsent(bearer.as_ref()), &self.content_type);
		let sent_with = common::sent_token(&outgoing);
		let response = self.transport.send(outgoing).await?;

		if !self.config.is_unauthorized(response.status) {
			return Ok(response);
		}

		self.coordinator.handle_unauthorized(request, sent_with).await
	}
}
#[cfg(feature = "reqwest")]
impl Relay {
	/// Creates a relay backed by a freshly built reqwest client.
	pub fn new(config: RelayConfig, store: Arc<dyn CredentialStore>) -> Result<Self> {
		let client = ReqwestClient::builder().build().map_err(ConfigError::from)?;

		Self::with_transport(config, store, Arc::new(ReqwestTransport::with_client(client)))
	}
}
impl Debug for Relay {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("Relay")
			.field("config", &self.config)
			.field("transport", &self.transport)
			.field("notifier", &self.notifier)
			.field("metrics", &self.metrics)
			.finish()
	}
}
