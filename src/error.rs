//! Relay-level error types shared across the dispatcher, coordinator, stores, and transports.

// self
use crate::_prelude::*;

/// Relay-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Canonical relay error exposed by public APIs.
///
/// Successful responses and non-authorization HTTP errors are never mapped into this type; they
/// come back as `Ok(ApiResponse)` with the upstream status untouched.
#[derive(Debug, ThisError)]
pub enum Error {
	/// Storage-layer failure while reading or seeding credentials.
	#[error("{0}")]
	Storage(
		#[from]
		#[source]
		crate::store::StoreError,
	),
	/// Local configuration or request-construction problem.
	#[error(transparent)]
	Config(#[from] ConfigError),
	/// Transport failure (DNS, TCP, TLS) for this caller's own request.
	#[error(transparent)]
	Transport(#[from] TransportError),

	/// The session could not be restored; the user must authenticate again.
	#[error("Session expired: {0}.")]
	SessionExpired(RefreshFailure),
}
impl Error {
	/// Returns `true` when the caller must re-authenticate before retrying.
	pub fn is_session_expired(&self) -> bool {
		matches!(self, Self::SessionExpired(_))
	}
}

/// Configuration and request validation failures.
#[derive(Debug, ThisError)]
pub enum ConfigError {
	/// HTTP client could not be constructed.
	#[error("HTTP client could not be constructed.")]
	HttpClientBuild {
		/// Underlying transport builder failure.
		#[source]
		source: BoxError,
	},
	/// A request URL was empty or could not be resolved.
	#[error("Request URL `{url}` is invalid.")]
	InvalidRequestUrl {
		/// Offending URL as supplied by the caller.
		url: String,
		/// Underlying parsing failure, when the URL was not empty.
		#[source]
		source: Option<url::ParseError>,
	},
	/// A header value could not be encoded.
	#[error("Header `{name}` has an invalid value.")]
	InvalidHeader {
		/// Header name being composed.
		name: &'static str,
		/// Underlying encoding failure.
		#[source]
		source: ::http::header::InvalidHeaderValue,
	},
	/// Request body could not be serialized as JSON.
	#[error("Request body could not be serialized.")]
	BodySerialization(#[source] serde_json::Error),
	/// Relay configuration failed validation.
	#[error(transparent)]
	Relay(#[from] crate::config::RelayConfigError),
}
impl ConfigError {
	/// Wraps a transport's builder failure inside [`ConfigError`].
	pub fn http_client_build(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::HttpClientBuild { source: Box::new(src) }
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for ConfigError {
	fn from(e: ReqwestError) -> Self {
		Self::http_client_build(e)
	}
}

/// Transport-level failures (network, IO).
#[derive(Debug, ThisError)]
pub enum TransportError {
	/// Underlying HTTP client reported a network failure.
	#[error("Network error occurred while calling {url}.")]
	Network {
		/// Target URL of the failed exchange.
		url: String,
		/// Transport-specific network error.
		#[source]
		source: BoxError,
	},
	/// The request could not be converted into the transport's native form.
	#[error("Request to {url} could not be built.")]
	Request {
		/// Target URL of the rejected request.
		url: String,
		/// Transport-specific builder error.
		#[source]
		source: BoxError,
	},
	/// Underlying IO failure surfaced during transport.
	#[error("I/O error occurred during transport.")]
	Io(#[from] std::io::Error),
}
impl TransportError {
	/// Wraps a transport-specific network error.
	pub fn network(url: &Url, src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::Network { url: url.to_string(), source: Box::new(src) }
	}

	/// Wraps a transport-specific request construction error.
	pub fn request(url: &Url, src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::Request { url: url.to_string(), source: Box::new(src) }
	}
}

/// Why a refresh cycle failed.
///
/// Every caller waiting on the failed cycle receives its own clone, so the variants only carry
/// owned, cloneable context.
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
pub enum RefreshFailure {
	/// No refresh token was stored.
	#[error("no refresh token is stored")]
	MissingRefreshToken,
	/// Refresh endpoint answered with a non-success status.
	#[error("refresh endpoint rejected the refresh token with status {status}")]
	Rejected {
		/// HTTP status returned by the refresh endpoint.
		status: u16,
	},
	/// Refresh endpoint could not be reached.
	#[error("refresh endpoint is unreachable: {message}")]
	Transport {
		/// Rendered transport error.
		message: String,
	},
	/// Refresh endpoint answered 2xx with a body that does not decode.
	#[error("refresh endpoint returned a malformed body: {message}")]
	MalformedResponse {
		/// Decoding failure, including the JSON path.
		message: String,
	},
	/// Credential store failed while reading or persisting tokens.
	#[error("credential store failed during refresh: {message}")]
	Storage {
		/// Rendered store error.
		message: String,
	},
	/// Refresh did not complete within the configured bound.
	#[error("refresh did not complete within {after}")]
	TimedOut {
		/// Configured timeout.
		after: Duration,
	},
}
