//! The access/refresh token pair owned by the credential store.

// self
use crate::{_prelude::*, auth::TokenSecret};

/// Snapshot of the credentials currently held by a [`CredentialStore`](crate::store::CredentialStore).
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
	/// Short-lived token attached to outgoing requests.
	pub access_token: Option<TokenSecret>,
	/// Longer-lived token used only to obtain a new access token.
	pub refresh_token: Option<TokenSecret>,
}
impl Credentials {
	/// Builds a pair from raw token strings.
	pub fn new(access_token: impl Into<String>, refresh_token: impl Into<String>) -> Self {
		Self {
			access_token: Some(TokenSecret::new(access_token)),
			refresh_token: Some(TokenSecret::new(refresh_token)),
		}
	}

	/// Returns `true` when neither token is present.
	pub fn is_empty(&self) -> bool {
		self.access_token.is_none() && self.refresh_token.is_none()
	}

	/// Returns `true` when a refresh could be attempted with these credentials.
	pub fn can_refresh(&self) -> bool {
		self.refresh_token.as_ref().is_some_and(|secret| !secret.is_blank())
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn blank_refresh_token_cannot_refresh() {
		let credentials =
			Credentials { access_token: None, refresh_token: Some(TokenSecret::new("  ")) };

		assert!(!credentials.is_empty());
		assert!(!credentials.can_refresh());
		assert!(Credentials::new("a", "r").can_refresh());
		assert!(Credentials::default().is_empty());
	}
}
