//! Relay configuration: endpoints, refresh bounds, and authorization-failure detection.

// std
use std::net::IpAddr;
// crates.io
use http::StatusCode;
// self
use crate::_prelude::*;

/// Errors raised while constructing or validating a [`RelayConfig`].
#[derive(Debug, PartialEq, Eq, ThisError)]
pub enum RelayConfigError {
	/// The refresh endpoint is mandatory.
	#[error("Missing refresh endpoint.")]
	MissingRefreshEndpoint,
	/// Endpoints must use HTTPS unless they point at a loopback host.
	#[error("The {endpoint} endpoint must use HTTPS: {url}.")]
	InsecureEndpoint {
		/// Which endpoint failed validation.
		endpoint: &'static str,
		/// Endpoint URL that failed validation.
		url: String,
	},
	/// The refresh timeout must be positive.
	#[error("Refresh timeout must be positive.")]
	NonPositiveRefreshTimeout,
	/// At least one status must signal an authorization failure.
	#[error("At least one unauthorized status code must be configured.")]
	NoUnauthorizedStatuses,
	/// Unauthorized statuses must be client errors.
	#[error("Status {status} cannot signal an authorization failure; use a 4xx code.")]
	InvalidUnauthorizedStatus {
		/// Rejected status code.
		status: u16,
	},
	/// Default content type must be a valid header value.
	#[error("Default content type `{value}` is not a valid header value.")]
	InvalidContentType {
		/// Rejected content type.
		value: String,
	},
}

/// Validated relay configuration.
///
/// Build one with [`RelayConfig::builder`] or deserialize it from JSON and call
/// [`RelayConfig::validate`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayConfig {
	/// Base URL that relative request paths are joined onto.
	#[serde(default)]
	pub base_url: Option<Url>,
	/// Endpoint exchanging a refresh token for a new access token.
	pub refresh_endpoint: Url,
	/// Upper bound for one refresh cycle (store read, endpoint call, persist).
	#[serde(default = "RelayConfig::default_refresh_timeout")]
	pub refresh_timeout: Duration,
	/// Statuses treated as "access token expired".
	#[serde(default = "RelayConfig::default_unauthorized_statuses")]
	pub unauthorized_statuses: BTreeSet<u16>,
	/// `Content-Type` injected when the caller does not supply one.
	#[serde(default = "RelayConfig::default_content_type")]
	pub default_content_type: String,
}
impl RelayConfig {
	/// Default upper bound for one refresh cycle.
	pub const DEFAULT_REFRESH_TIMEOUT: Duration = Duration::seconds(30);
	/// Default `Content-Type` for outgoing requests.
	pub const DEFAULT_CONTENT_TYPE: &'static str = "application/json";

	/// Returns an empty builder.
	pub fn builder() -> RelayConfigBuilder {
		RelayConfigBuilder::default()
	}

	/// Checks every invariant; deserialized configs must pass this before use.
	pub fn validate(&self) -> Result<(), RelayConfigError> {
		validate_endpoint("refresh", &self.refresh_endpoint)?;

		if let Some(base) = self.base_url.as_ref() {
			validate_endpoint("base", base)?;
		}
		if !self.refresh_timeout.is_positive() {
			return Err(RelayConfigError::NonPositiveRefreshTimeout);
		}
		if self.unauthorized_statuses.is_empty() {
			return Err(RelayConfigError::NoUnauthorizedStatuses);
		}
		if let Some(&status) = self.unauthorized_statuses.iter().find(|&&code| {
			StatusCode::from_u16(code).map(|status| !status.is_client_error()).unwrap_or(true)
		}) {
			return Err(RelayConfigError::InvalidUnauthorizedStatus { status });
		}
		if http::HeaderValue::from_str(&self.default_content_type).is_err() {
			return Err(RelayConfigError::InvalidContentType {
				value: self.default_content_type.clone(),
			});
		}

		Ok(())
	}

	/// Returns `true` when `status` signals an expired access token.
	pub fn is_unauthorized(&self, status: StatusCode) -> bool {
		self.unauthorized_statuses.contains(&status.as_u16())
	}

	/// Refresh timeout as a [`std::time::Duration`], saturating at zero.
	pub fn refresh_timeout_std(&self) -> std::time::Duration {
		self.refresh_timeout.try_into().unwrap_or_default()
	}

	fn default_refresh_timeout() -> Duration {
		Self::DEFAULT_REFRESH_TIMEOUT
	}

	fn default_unauthorized_statuses() -> BTreeSet<u16> {
		BTreeSet::from([StatusCode::UNAUTHORIZED.as_u16()])
	}

	fn default_content_type() -> String {
		Self::DEFAULT_CONTENT_TYPE.into()
	}
}

/// Builder for [`RelayConfig`] values.
#[derive(Debug, Default)]
pub struct RelayConfigBuilder {
	/// Optional base URL for relative request paths.
	pub base_url: Option<Url>,
	/// Refresh endpoint URL.
	pub refresh_endpoint: Option<Url>,
	/// Optional refresh timeout override.
	pub refresh_timeout: Option<Duration>,
	/// Optional unauthorized status override.
	pub unauthorized_statuses: Option<BTreeSet<u16>>,
	/// Optional default content type override.
	pub default_content_type: Option<String>,
}
impl RelayConfigBuilder {
	/// Sets the base URL for relative request paths.
	pub fn base_url(mut self, url: Url) -> Self {
		self.base_url = Some(url);

		self
	}

	/// Sets the refresh endpoint.
	pub fn refresh_endpoint(mut self, url: Url) -> Self {
		self.refresh_endpoint = Some(url);

		self
	}

	/// Overrides the refresh timeout (defaults to 30 seconds).
	pub fn refresh_timeout(mut self, timeout: Duration) -> Self {
		self.refresh_timeout = Some(timeout);

		self
	}

	/// Replaces the set of statuses treated as authorization failures (defaults to `401`).
	pub fn unauthorized_statuses<I>(mut self, statuses: I) -> Self
	where
		I: IntoIterator<Item = u16>,
	{
		self.unauthorized_statuses = Some(statuses.into_iter().collect());

		self
	}

	/// Overrides the default `Content-Type` (defaults to `application/json`).
	pub fn default_content_type(mut self, value: impl Into<String>) -> Self {
		self.default_content_type = Some(value.into());

		self
	}

	/// Consumes the builder and validates the resulting config.
	pub fn build(self) -> Result<RelayConfig, RelayConfigError> {
		let refresh_endpoint =
			self.refresh_endpoint.ok_or(RelayConfigError::MissingRefreshEndpoint)?;
		let config = RelayConfig {
			base_url: self.base_url,
			refresh_endpoint,
			refresh_timeout: self.refresh_timeout.unwrap_or(RelayConfig::DEFAULT_REFRESH_TIMEOUT),
			unauthorized_statuses: self
				.unauthorized_statuses
				.unwrap_or_else(RelayConfig::default_unauthorized_statuses),
			default_content_type: self
				.default_content_type
				.unwrap_or_else(RelayConfig::default_content_type),
		};

		config.validate()?;

		Ok(config)
	}
}

fn validate_endpoint(name: &'static str, url: &Url) -> Result<(), RelayConfigError> {
	if url.scheme() == "https" || is_loopback(url) {
		Ok(())
	} else {
		Err(RelayConfigError::InsecureEndpoint { endpoint: name, url: url.to_string() })
	}
}

fn is_loopback(url: &Url) -> bool {
	match url.host() {
		Some(url::Host::Domain(domain)) => domain.eq_ignore_ascii_case("localhost"),
		Some(url::Host::Ipv4(ip)) => IpAddr::V4(ip).is_loopback(),
		Some(url::Host::Ipv6(ip)) => IpAddr::V6(ip).is_loopback(),
		None => false,
	}
}
