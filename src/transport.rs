//! Transport primitives: request/response value types and the [`Transport`] contract.
//!
//! The relay's only dependency on an HTTP stack is [`Transport::send`]. Implementations return a
//! future that owns everything it needs (`'static`) and may be lazy: the refresh coordinator polls
//! each queued caller's replay once, in queue order, before handing the future over to its caller.

// std
use std::ops::Deref;
// crates.io
use http::{
	HeaderMap, HeaderName, HeaderValue, Method, StatusCode,
	header::{AUTHORIZATION, CONTENT_TYPE},
};
use serde::de::DeserializeOwned;
// self
use crate::{
	_prelude::*,
	error::{ConfigError, TransportError},
};

/// Boxed future returned by [`Transport::send`].
pub type TransportFuture =
	Pin<Box<dyn Future<Output = Result<ApiResponse, TransportError>> + 'static + Send>>;

/// Failure raised when a response body does not match the expected JSON shape.
pub type DecodeError = serde_path_to_error::Error<serde_json::Error>;

/// Abstraction over HTTP stacks capable of performing one request/response exchange.
pub trait Transport
where
	Self: 'static + Send + Sync,
{
	/// Performs `request` and resolves with the raw response.
	///
	/// Any HTTP status, including errors, resolves `Ok`; `Err` is reserved for failures where no
	/// response was received.
	fn send(&self, request: ApiRequest) -> TransportFuture;
}

/// Request descriptor supplied by callers: method, headers, and body.
///
/// The relay treats a caller's options as immutable and composes auth headers on a private
/// clone.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RequestOptions {
	/// HTTP method.
	pub method: Method,
	/// Caller-supplied headers.
	pub headers: HeaderMap,
	/// Raw request body, if any.
	pub body: Option<Vec<u8>>,
}
impl RequestOptions {
	/// Creates options for `method` without headers or body.
	pub fn new(method: Method) -> Self {
		Self { method, headers: HeaderMap::new(), body: None }
	}

	/// Shorthand for a `GET` request.
	pub fn get() -> Self {
		Self::new(Method::GET)
	}

	/// Shorthand for a `POST` request.
	pub fn post() -> Self {
		Self::new(Method::POST)
	}

	/// Adds or replaces a header.
	pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
		self.headers.insert(name, value);

		self
	}

	/// Sets a raw body.
	pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
		self.body = Some(body.into());

		self
	}

	/// Serializes `value` as the JSON body.
	pub fn with_json<T>(mut self, value: &T) -> Result<Self, ConfigError>
	where
		T: ?Sized + Serialize,
	{
		self.body = Some(serde_json::to_vec(value).map_err(ConfigError::BodySerialization)?);

		Ok(self)
	}

	/// Returns `true` when the caller supplied an `Authorization` header.
	pub fn has_authorization(&self) -> bool {
		self.headers.contains_key(AUTHORIZATION)
	}

	/// Returns `true` when the caller supplied a `Content-Type` header.
	pub fn has_content_type(&self) -> bool {
		self.headers.contains_key(CONTENT_TYPE)
	}
}
impl Default for RequestOptions {
	fn default() -> Self {
		Self::get()
	}
}

/// Fully resolved request handed to a [`Transport`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ApiRequest {
	/// Absolute target URL.
	pub url: Url,
	/// Method, headers, and body.
	pub options: RequestOptions,
}
impl ApiRequest {
	/// Pairs a resolved URL with request options.
	pub fn new(url: Url, options: RequestOptions) -> Self {
		Self { url, options }
	}

	/// Returns the `Authorization` header value, if present and valid UTF-8.
	pub fn authorization(&self) -> Option<&str> {
		self.options.headers.get(AUTHORIZATION).and_then(|value| value.to_str().ok())
	}
}
impl Deref for ApiRequest {
	type Target = RequestOptions;

	fn deref(&self) -> &Self::Target {
		&self.options
	}
}

/// Response returned by a [`Transport`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ApiResponse {
	/// HTTP status code.
	pub status: StatusCode,
	/// Response headers.
	pub headers: HeaderMap,
	/// Raw response body.
	pub body: Vec<u8>,
}
impl ApiResponse {
	/// Builds a response from its parts.
	pub fn new(status: StatusCode, headers: HeaderMap, body: impl Into<Vec<u8>>) -> Self {
		Self { status, headers, body: body.into() }
	}

	/// Builds a response with no headers.
	pub fn from_status(status: StatusCode, body: impl Into<Vec<u8>>) -> Self {
		Self::new(status, HeaderMap::new(), body)
	}

	/// Returns `true` for 2xx statuses.
	pub fn is_success(&self) -> bool {
		self.status.is_success()
	}

	/// Decodes the body as UTF-8, replacing invalid sequences.
	pub fn text(&self) -> String {
		String::from_utf8_lossy(&self.body).into_owned()
	}

	/// Decodes the body as JSON; failures report the offending path.
	pub fn json<T>(&self) -> Result<T, DecodeError>
	where
		T: DeserializeOwned,
	{
		let mut deserializer = serde_json::Deserializer::from_slice(&self.body);

		serde_path_to_error::deserialize(&mut deserializer)
	}
}

/// Thin wrapper around [`ReqwestClient`] implementing [`Transport`].
#[cfg(feature = "reqwest")]
#[derive(Clone, Default)]
pub struct ReqwestTransport(pub ReqwestClient);
#[cfg(feature = "reqwest")]
impl ReqwestTransport {
	/// Wraps an existing reqwest [`ReqwestClient`].
	pub fn with_client(client: ReqwestClient) -> Self {
		Self(client)
	}
}
#[cfg(feature = "reqwest")]
impl AsRef<ReqwestClient> for ReqwestTransport {
	fn as_ref(&self) -> &ReqwestClient {
		&self.0
	}
}
#[cfg(feature = "reqwest")]
impl Deref for ReqwestTransport {
	type Target = ReqwestClient;

	fn deref(&self) -> &Self::Target {
		&self.0
	}
}
#[cfg(feature = "reqwest")]
impl Transport for ReqwestTransport {
	fn send(&self, request: ApiRequest) -> TransportFuture {
		let client = self.0.clone();

		Box::pin(async move {
			let ApiRequest { url, options } = request;
			let RequestOptions { method, headers, body } = options;
			let mut builder = client.request(method, url.clone()).headers(headers);

			if let Some(body) = body {
				builder = builder.body(body);
			}

			let request = builder.build().map_err(|e| TransportError::request(&url, e))?;
			let response =
				client.execute(request).await.map_err(|e| TransportError::network(&url, e))?;
			let status = response.status();
			let headers = response.headers().to_owned();
			let body = response.bytes().await.map_err(|e| TransportError::network(&url, e))?;

			Ok(ApiResponse::new(status, headers, body.to_vec()))
		})
	}
}
impl Debug for dyn Transport {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str("Transport(..)")
	}
}
