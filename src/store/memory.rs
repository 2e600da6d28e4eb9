//! Thread-safe in-memory [`CredentialStore`] implementation for local development and tests.

// self
use crate::{
	_prelude::*,
	auth::{Credentials, TokenSecret},
	store::{CredentialStore, StoreError, StoreFuture, TokenKind},
};

type TokenMap = Arc<RwLock<HashMap<TokenKind, TokenSecret>>>;

/// Thread-safe storage backend that keeps tokens in-process for tests and demos.
#[derive(Clone, Debug, Default)]
pub struct MemoryStore(TokenMap);
impl MemoryStore {
	/// Creates a store pre-seeded with `credentials`.
	pub fn with_credentials(credentials: Credentials) -> Self {
		let store = Self::default();

		{
			let mut guard = store.0.write();

			if let Some(access) = credentials.access_token {
				guard.insert(TokenKind::Access, access);
			}
			if let Some(refresh) = credentials.refresh_token {
				guard.insert(TokenKind::Refresh, refresh);
			}
		}

		store
	}

	/// Returns the current token for `kind` without going through the async contract.
	pub fn peek(&self, kind: TokenKind) -> Option<TokenSecret> {
		self.0.read().get(&kind).cloned()
	}

	fn set_now(
		map: TokenMap,
		kind: TokenKind,
		value: Option<TokenSecret>,
	) -> Result<(), StoreError> {
		let mut guard = map.write();

		match value {
			Some(secret) => guard.insert(kind, secret),
			None => guard.remove(&kind),
		};

		Ok(())
	}
}
impl CredentialStore for MemoryStore {
	fn get_token(&self, kind: TokenKind) -> StoreFuture<'_, Option<TokenSecret>> {
		let map = self.0.clone();

		Box::pin(async move { Ok(map.read().get(&kind).cloned()) })
	}

	fn set_token(&self, kind: TokenKind, value: Option<TokenSecret>) -> StoreFuture<'_, ()> {
		let map = self.0.clone();

		Box::pin(async move { Self::set_now(map, kind, value) })
	}
}
