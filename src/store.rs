//! Storage contracts and built-in credential store implementations.

pub mod file;
pub mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

// self
use crate::{
	_prelude::*,
	auth::{Credentials, TokenSecret},
};

/// Boxed future returned by [`CredentialStore`] operations.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + 'a + Send>>;

/// Durable key/value storage for the relay's tokens.
///
/// Implementations must survive process restarts for production use; [`MemoryStore`] exists for
/// tests and demos. The relay reads the access token before every request and writes tokens only
/// after a successful refresh.
pub trait CredentialStore
where
	Self: Send + Sync,
{
	/// Reads the token stored under `kind`, if any.
	fn get_token(&self, kind: TokenKind) -> StoreFuture<'_, Option<TokenSecret>>;

	/// Replaces the token stored under `kind`; `None` clears it.
	fn set_token(&self, kind: TokenKind, value: Option<TokenSecret>) -> StoreFuture<'_, ()>;
}
impl dyn CredentialStore {
	/// Loads both tokens as one snapshot.
	pub async fn load(&self) -> Result<Credentials, StoreError> {
		let access_token = self.get_token(TokenKind::Access).await?;
		let refresh_token = self.get_token(TokenKind::Refresh).await?;

		Ok(Credentials { access_token, refresh_token })
	}

	/// Writes both tokens, clearing any that are `None`.
	pub async fn replace(&self, credentials: Credentials) -> Result<(), StoreError> {
		self.set_token(TokenKind::Access, credentials.access_token).await?;
		self.set_token(TokenKind::Refresh, credentials.refresh_token).await
	}
}

/// Keys understood by a [`CredentialStore`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenKind {
	/// Access token attached to API calls.
	Access,
	/// Refresh token exchanged at the refresh endpoint.
	Refresh,
}
impl TokenKind {
	/// Returns a stable label suitable for storage keys or log fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			TokenKind::Access => "access_token",
			TokenKind::Refresh => "refresh_token",
		}
	}
}
impl Display for TokenKind {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Error type produced by [`CredentialStore`] implementations.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum StoreError {
	/// Serialization failures surfaced by the backend.
	#[error("Serialization error: {message}.")]
	Serialization {
		/// Human-readable error payload.
		message: String,
	},
	/// Backend-level failure for the storage engine.
	#[error("Backend failure: {message}.")]
	Backend {
		/// Human-readable error payload.
		message: String,
	},
}
