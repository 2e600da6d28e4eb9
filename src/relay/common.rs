//! Shared helpers for the dispatcher and the coordinator (URL resolution, header composition).

// crates.io
use http::{
	HeaderValue,
	header::{AUTHORIZATION, CONTENT_TYPE},
};
// self
use crate::{
	_prelude::*,
	auth::TokenSecret,
	error::ConfigError,
	transport::ApiRequest,
};

/// How the `Authorization` header is composed onto a caller's request.
#[derive(Clone, Copy, Debug)]
pub(crate) enum AuthHeader<'a> {
	/// First attempt: inject the stored token unless the caller supplied a header.
	IfAbsent(Option<&'a HeaderValue>),
	/// Replay after a refresh: the refreshed token always wins.
	Replace(&'a HeaderValue),
}

/// Resolves `raw` against the optional base URL.
///
/// Absolute URLs are used as-is. Relative paths are appended under the base path, so
/// `users/1` and `/users/1` against `https://api.example.com/v1` both resolve to
/// `https://api.example.com/v1/users/1`.
pub(crate) fn resolve_url(base: Option<&Url>, raw: &str) -> Result<Url, ConfigError> {
	let trimmed = raw.trim();

	if trimmed.is_empty() {
		return Err(ConfigError::InvalidRequestUrl { url: raw.into(), source: None });
	}

	match (Url::parse(trimmed), base) {
		(Ok(url), _) => Ok(url),
		(Err(url::ParseError::RelativeUrlWithoutBase), Some(base)) => {
			let mut base = base.clone();

			if !base.path().ends_with('/') {
				let path = format!("{}/", base.path());

				base.set_path(&path);
			}

			base.join(trimmed.trim_start_matches('/'))
				.map_err(|source| ConfigError::InvalidRequestUrl {
					url: raw.into(),
					source: Some(source),
				})
		},
		(Err(source), _) =>
			Err(ConfigError::InvalidRequestUrl { url: raw.into(), source: Some(source) }),
	}
}

/// Encodes `secret` as a `Bearer` header value.
pub(crate) fn bearer_header(secret: &TokenSecret) -> Result<HeaderValue, ConfigError> {
	let mut value = HeaderValue::from_str(&secret.bearer())
		.map_err(|source| ConfigError::InvalidHeader { name: "authorization", source })?;

	value.set_sensitive(true);

	Ok(value)
}

/// Bearer token carried by `request`, whether the relay or the caller put it there.
pub(crate) fn sent_token(request: &ApiRequest) -> Option<TokenSecret> {
	request
		.authorization()
		.and_then(|value| value.strip_prefix("Bearer "))
		.map(TokenSecret::new)
		.filter(|token| !token.is_blank())
}

/// Returns a private copy of `original` with auth and content-type headers applied.
///
/// `original` is never modified, so a caller's options can be replayed any number of times.
pub(crate) fn compose(
	original: &ApiRequest,
	auth: AuthHeader<'_>,
	content_type: &HeaderValue,
) -> ApiRequest {
	let mut request = original.clone();
	let headers = &mut request.options.headers;

	match auth {
		AuthHeader::IfAbsent(Some(bearer)) if !headers.contains_key(AUTHORIZATION) => {
			headers.insert(AUTHORIZATION, bearer.clone());
		},
		AuthHeader::IfAbsent(_) => {},
		AuthHeader::Replace(bearer) => {
			headers.insert(AUTHORIZATION, bearer.clone());
		},
	}

	if !headers.contains_key(CONTENT_TYPE) {
		headers.insert(CONTENT_TYPE, content_type.clone());
	}

	request
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::transport::RequestOptions;

	fn url(value: &str) -> Url {
		Url::parse(value).expect("Failed to parse test URL.")
	}

	#[test]
	fn relative_paths_append_under_base() {
		let base = url("https://api.example.com/v1");

		for raw in ["users/1", "/users/1"] {
			assert_eq!(
				resolve_url(Some(&base), raw).expect("Relative path should resolve.").as_str(),
				"https://api.example.com/v1/users/1"
			);
		}

		assert_eq!(
			resolve_url(Some(&base), "https://other.example.com/x")
				.expect("Absolute URL should pass through.")
				.as_str(),
			"https://other.example.com/x"
		);
	}

	#[test]
	fn empty_or_unresolvable_urls_are_rejected() {
		assert!(matches!(
			resolve_url(None, "  "),
			Err(ConfigError::InvalidRequestUrl { source: None, .. })
		));
		assert!(matches!(
			resolve_url(None, "users/1"),
			Err(ConfigError::InvalidRequestUrl {
				source: Some(url::ParseError::RelativeUrlWithoutBase),
				..
			})
		));
	}

	#[test]
	fn compose_keeps_caller_headers_and_original_untouched() {
		let json = HeaderValue::from_static("application/json");
		let stored = bearer_header(&TokenSecret::new("T1")).expect("Token should encode.");
		let fresh = bearer_header(&TokenSecret::new("T2")).expect("Token should encode.");
		let original = ApiRequest::new(
			url("https://api.example.com/items"),
			RequestOptions::get()
				.with_header(AUTHORIZATION, HeaderValue::from_static("Bearer caller"))
				.with_header(CONTENT_TYPE, HeaderValue::from_static("text/plain")),
		);
		let first = compose(&original, AuthHeader::IfAbsent(Some(&stored)), &json);

		assert_eq!(first.authorization(), Some("Bearer caller"));
		assert_eq!(first.options.headers[CONTENT_TYPE], "text/plain");

		let replay = compose(&original, AuthHeader::Replace(&fresh), &json);

		assert_eq!(replay.authorization(), Some("Bearer T2"));
		assert_eq!(original.authorization(), Some("Bearer caller"));
	}

	#[test]
	fn compose_injects_defaults() {
		let json = HeaderValue::from_static("application/json");
		let stored = bearer_header(&TokenSecret::new("T1")).expect("Token should encode.");
		let original = ApiRequest::new(url("https://api.example.com/items"), RequestOptions::get());
		let request = compose(&original, AuthHeader::IfAbsent(Some(&stored)), &json);

		assert_eq!(request.authorization(), Some("Bearer T1"));
		assert_eq!(request.options.headers[CONTENT_TYPE], "application/json");

		let anonymous = compose(&original, AuthHeader::IfAbsent(None), &json);

		assert_eq!(anonymous.authorization(), None);
		assert!(original.options.headers.is_empty());
	}

	#[test]
	fn sent_token_reads_the_outgoing_bearer() {
		let json = HeaderValue::from_static("application/json");
		let stored = bearer_header(&TokenSecret::new("T1")).expect("Token should encode.");
		let own = RequestOptions::get()
			.with_header(AUTHORIZATION, HeaderValue::from_static("Bearer caller"));
		let injected = compose(
			&ApiRequest::new(url("https://api.example.com/a"), RequestOptions::get()),
			AuthHeader::IfAbsent(Some(&stored)),
			&json,
		);
		let supplied = compose(
			&ApiRequest::new(url("https://api.example.com/b"), own),
			AuthHeader::IfAbsent(Some(&stored)),
			&json,
		);
		let basic = ApiRequest::new(
			url("https://api.example.com/c"),
			RequestOptions::get()
				.with_header(AUTHORIZATION, HeaderValue::from_static("Basic eA==")),
		);

		assert_eq!(sent_token(&injected), Some(TokenSecret::new("T1")));
		assert_eq!(sent_token(&supplied), Some(TokenSecret::new("caller")));
		assert_eq!(sent_token(&basic), None);
	}

	#[test]
	fn bearer_header_rejects_control_characters() {
		assert!(matches!(
			bearer_header(&TokenSecret::new("bad\ntoken")),
			Err(ConfigError::InvalidHeader { name: "authorization", .. })
		));
	}
}
