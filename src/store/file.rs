//! Simple file-backed [`CredentialStore`] that keeps the session across process restarts.

// std
use std::{
	fs::{self, File},
	io::Write,
	path::{Path, PathBuf},
};
// self
use crate::{
	_prelude::*,
	auth::TokenSecret,
	store::{CredentialStore, StoreError, StoreFuture, TokenKind},
};

/// On-disk layout of the credential file.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
struct Snapshot {
	#[serde(default, skip_serializing_if = "Option::is_none")]
	access_token: Option<TokenSecret>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	refresh_token: Option<TokenSecret>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	updated_at: Option<OffsetDateTime>,
}
impl Snapshot {
	fn slot(&mut self, kind: TokenKind) -> &mut Option<TokenSecret> {
		match kind {
			TokenKind::Access => &mut self.access_token,
			TokenKind::Refresh => &mut self.refresh_token,
		}
	}

	fn get(&self, kind: TokenKind) -> Option<&TokenSecret> {
		match kind {
			TokenKind::Access => self.access_token.as_ref(),
			TokenKind::Refresh => self.refresh_token.as_ref(),
		}
	}
}

/// Persists the token pair to a JSON file after each mutation.
#[derive(Clone, Debug)]
pub struct FileStore {
	path: PathBuf,
	inner: Arc<RwLock<Snapshot>>,
}
impl FileStore {
	/// Opens (or creates) a store at the provided path, eagerly loading existing data.
	pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
		let path = path.into();

		Self::ensure_parent_exists(&path)?;

		let snapshot = Self::load_snapshot(&path)?;

		Ok(Self { path, inner: Arc::new(RwLock::new(snapshot)) })
	}

	/// Location of the backing file.
	pub fn path(&self) -> &Path {
		&self.path
	}

	/// Instant of the last persisted mutation, if the file has ever been written.
	pub fn updated_at(&self) -> Option<OffsetDateTime> {
		self.inner.read().updated_at
	}

	fn load_snapshot(path: &Path) -> Result<Snapshot, StoreError> {
		if !path.exists() {
			return Ok(Snapshot::default());
		}

		let metadata = path.metadata().map_err(|e| StoreError::Backend {
			message: format!("Failed to inspect {}: {e}", path.display()),
		})?;

		if metadata.len() == 0 {
			return Ok(Snapshot::default());
		}

		let bytes = fs::read(path).map_err(|e| StoreError::Backend {
			message: format!("Failed to read {}: {e}", path.display()),
		})?;

		serde_json::from_slice(&bytes).map_err(|e| StoreError::Serialization {
			message: format!("Failed to parse {}: {e}", path.display()),
		})
	}

	fn ensure_parent_exists(path: &Path) -> Result<(), StoreError> {
		if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
			fs::create_dir_all(parent).map_err(|e| StoreError::Backend {
				message: format!("Failed to create store directory {}: {e}", parent.display()),
			})?;
		}

		Ok(())
	}

	fn persist_locked(&self, contents: &Snapshot) -> Result<(), StoreError> {
		Self::ensure_parent_exists(&self.path)?;

		let serialized =
			serde_json::to_vec_pretty(contents).map_err(|e| StoreError::Serialization {
				message: format!("Failed to serialize credential snapshot: {e}"),
			})?;
		let mut tmp_path = self.path.clone();

		tmp_path.set_extension("tmp");

		{
			let mut file = File::create(&tmp_path).map_err(|e| StoreError::Backend {
				message: format!("Failed to create {}: {e}", tmp_path.display()),
			})?;

			file.write_all(&serialized).map_err(|e| StoreError::Backend {
				message: format!("Failed to write {}: {e}", tmp_path.display()),
			})?;
			file.sync_all().map_err(|e| StoreError::Backend {
				message: format!("Failed to sync {}: {e}", tmp_path.display()),
			})?;
		}

		fs::rename(&tmp_path, &self.path).map_err(|e| StoreError::Backend {
			message: format!("Failed to replace {}: {e}", self.path.display()),
		})
	}
}
impl CredentialStore for FileStore {
	fn get_token(&self, kind: TokenKind) -> StoreFuture<'_, Option<TokenSecret>> {
		Box::pin(async move { Ok(self.inner.read().get(kind).cloned()) })
	}

	fn set_token(&self, kind: TokenKind, value: Option<TokenSecret>) -> StoreFuture<'_, ()> {
		Box::pin(async move {
			let mut guard = self.inner.write();
			let previous = std::mem::replace(guard.slot(kind), value);
			let previous_updated_at = guard.updated_at.replace(OffsetDateTime::now_utc());

			if let Err(e) = self.persist_locked(&guard) {
				*guard.slot(kind) = previous;
				guard.updated_at = previous_updated_at;

				return Err(e);
			}

			Ok(())
		})
	}
}
