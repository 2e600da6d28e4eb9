//! Scripted in-process API shared by the relay integration tests.

#![allow(dead_code)]

// std
use std::sync::{
	Arc,
	atomic::{AtomicUsize, Ordering},
};
// crates.io
use parking_lot::Mutex;
use session_relay::{
	auth::Credentials,
	config::RelayConfig,
	http::{HeaderMap, StatusCode},
	auth::TokenSecret,
	relay::Relay,
	store::{CredentialStore, MemoryStore, StoreError, StoreFuture, TokenKind},
	transport::{ApiRequest, ApiResponse, Transport, TransportFuture},
	url::Url,
};

pub const BASE_URL: &str = "https://api.example.com/v1/";
pub const REFRESH_URL: &str = "https://api.example.com/auth/refresh/";

/// How the scripted refresh endpoint answers.
#[derive(Clone, Debug)]
pub enum RefreshScript {
	/// `200` with the given JSON body.
	Issue(&'static str),
	/// The given status with an empty JSON object.
	Reject(StatusCode),
	/// Never answers.
	Hang,
}

/// API double: protected resources accept only `Bearer T2`; the refresh endpoint follows a script.
pub struct ScriptedApi {
	refresh: RefreshScript,
	refresh_delay: std::time::Duration,
	slow_path: Option<(&'static str, std::time::Duration)>,
	sent: Mutex<Vec<ApiRequest>>,
	refresh_calls: AtomicUsize,
}
impl ScriptedApi {
	pub fn new(refresh: RefreshScript) -> Arc<Self> {
		Self::delayed(refresh, std::time::Duration::ZERO)
	}

	pub fn delayed(refresh: RefreshScript, refresh_delay: std::time::Duration) -> Arc<Self> {
		Self::build(refresh, refresh_delay, None)
	}

	/// Answers requests for `path` only after `delay`; everything else answers at once.
	pub fn with_slow_path(
		refresh: RefreshScript,
		path: &'static str,
		delay: std::time::Duration,
	) -> Arc<Self> {
		Self::build(refresh, std::time::Duration::ZERO, Some((path, delay)))
	}

	fn build(
		refresh: RefreshScript,
		refresh_delay: std::time::Duration,
		slow_path: Option<(&'static str, std::time::Duration)>,
	) -> Arc<Self> {
		Arc::new(Self {
			refresh,
			refresh_delay,
			slow_path,
			sent: Mutex::new(Vec::new()),
			refresh_calls: AtomicUsize::new(0),
		})
	}

	pub fn refresh_calls(&self) -> usize {
		self.refresh_calls.load(Ordering::SeqCst)
	}

	/// Requests sent to protected resources, in dispatch order.
	pub fn api_requests(&self) -> Vec<ApiRequest> {
		self.sent.lock().iter().filter(|r| r.url.as_str() != REFRESH_URL).cloned().collect()
	}

	/// Requests sent to the refresh endpoint.
	pub fn refresh_requests(&self) -> Vec<ApiRequest> {
		self.sent.lock().iter().filter(|r| r.url.as_str() == REFRESH_URL).cloned().collect()
	}

	/// Paths of protected-resource requests carrying `bearer`, in dispatch order.
	pub fn paths_sent_with(&self, bearer: &str) -> Vec<String> {
		self.api_requests()
			.into_iter()
			.filter(|r| r.authorization() == Some(bearer))
			.map(|r| r.url.path().to_owned())
			.collect()
	}
}
impl Transport for ScriptedApi {
	fn send(&self, request: ApiRequest) -> TransportFuture {
		self.sent.lock().push(request.clone());

		if request.url.as_str() != REFRESH_URL {
			let status = match request.authorization() {
				Some("Bearer T2") | Some("Bearer caller") => StatusCode::OK,
				_ => StatusCode::UNAUTHORIZED,
			};
			let body = format!(r#"{{"path":"{}"}}"#, request.url.path());
			let delay = match self.slow_path {
				Some((path, delay)) if path == request.url.path() => delay,
				_ => std::time::Duration::ZERO,
			};

			return Box::pin(async move {
				tokio::time::sleep(delay).await;

				Ok(ApiResponse::new(status, HeaderMap::new(), body))
			});
		}

		self.refresh_calls.fetch_add(1, Ordering::SeqCst);

		let script = self.refresh.clone();
		let delay = self.refresh_delay;

		Box::pin(async move {
			tokio::time::sleep(delay).await;

			match script {
				RefreshScript::Issue(body) => Ok(ApiResponse::from_status(StatusCode::OK, body)),
				RefreshScript::Reject(status) => Ok(ApiResponse::from_status(status, "{}")),
				RefreshScript::Hang => std::future::pending().await,
			}
		})
	}
}

pub fn config() -> RelayConfig {
	RelayConfig::builder()
		.base_url(Url::parse(BASE_URL).expect("Base URL should parse."))
		.refresh_endpoint(Url::parse(REFRESH_URL).expect("Refresh URL should parse."))
		.build()
		.expect("Test config should build.")
}

/// Relay seeded with access `T1` and refresh `R1`.
pub fn relay(api: Arc<ScriptedApi>) -> (Relay, MemoryStore) {
	relay_with(config(), api)
}

pub fn relay_with(config: RelayConfig, api: Arc<ScriptedApi>) -> (Relay, MemoryStore) {
	let store = MemoryStore::with_credentials(Credentials::new("T1", "R1"));
	let relay = Relay::with_transport(config, Arc::new(store.clone()), api)
		.expect("Relay should build from a valid config.");

	(relay, store)
}

/// Counts session-expired notifications.
pub fn count_expiries(relay: &Relay) -> Arc<AtomicUsize> {
	let hits = Arc::new(AtomicUsize::new(0));
	let counter = hits.clone();

	relay.register_session_expired_handler(move || {
		counter.fetch_add(1, Ordering::SeqCst);
	});

	hits
}

/// Credential store whose every operation fails with a backend error.
pub struct FailingStore;
impl CredentialStore for FailingStore {
	fn get_token(&self, _kind: TokenKind) -> StoreFuture<'_, Option<TokenSecret>> {
		Box::pin(async { Err(StoreError::Backend { message: "disk unavailable".into() }) })
	}

	fn set_token(&self, _kind: TokenKind, _value: Option<TokenSecret>) -> StoreFuture<'_, ()> {
		Box::pin(async { Err(StoreError::Backend { message: "disk unavailable".into() }) })
	}
}
