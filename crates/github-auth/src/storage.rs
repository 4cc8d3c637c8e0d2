//! Persistent auth storage
//!
//! Token and user records live as JSON files under a state directory. All
//! writes use atomic temp-file + rename to prevent corruption on crash,
//! with 0600 permissions since the token file holds a live credential.
//!
//! Load never fails: an absent, malformed or expired record reads as
//! `None`, so callers always fall back to a safe logged-out default
//! instead of surfacing a hard error.

use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use common::Secret;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::error::{Error, Result};

/// Current unix time in milliseconds.
pub(crate) fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// A stored OAuth token.
///
/// `expires_at` is an absolute unix timestamp in milliseconds, computed at
/// storage time from the exchange response's `expires_in` delta (or the
/// configured fallback TTL when the proxy omits it).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredToken {
    /// Wrapped so a `{:?}` of the whole record cannot leak the credential.
    pub access_token: Secret<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    /// Expiration as unix timestamp in milliseconds
    pub expires_at: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
}

impl StoredToken {
    /// Pure comparison of a clock reading against `expires_at`.
    pub fn is_expired(&self, now_ms: u64) -> bool {
        now_ms >= self.expires_at
    }
}

/// The canonical GitHub identity, as returned by the user-info endpoint.
///
/// Only the fields the site displays. A record without `login` and
/// `avatar_url` is not usable and is discarded on load.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GitHubUser {
    pub id: u64,
    pub login: String,
    pub avatar_url: String,
    pub html_url: String,
}

const TOKEN_FILE: &str = "token.json";
const USER_FILE: &str = "user.json";

/// File-backed store for the token and user records.
///
/// The Mutex serializes writes; reads go straight to the filesystem since
/// the files are the single source of truth.
pub struct AuthStorage {
    token_path: PathBuf,
    user_path: PathBuf,
    write_lock: Mutex<()>,
}

impl AuthStorage {
    /// Open the store rooted at `dir`, creating the directory if needed.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)
            .map_err(|e| Error::Io(format!("creating state dir {}: {e}", dir.display())))?;
        Ok(Self {
            token_path: dir.join(TOKEN_FILE),
            user_path: dir.join(USER_FILE),
            write_lock: Mutex::new(()),
        })
    }

    /// Load the stored token if present, well-formed and not yet expired.
    ///
    /// A well-formed but expired record is a trust-boundary event: both
    /// records are cleared (a token without validity cannot vouch for the
    /// cached identity) and `None` is returned.
    pub async fn load_token(&self) -> Option<StoredToken> {
        let token: StoredToken = read_record(&self.token_path).await?;
        if token.access_token.expose().is_empty() {
            debug!("stored token has empty access_token, treating as absent");
            return None;
        }
        if token.is_expired(now_millis()) {
            info!("stored token expired, clearing auth storage");
            self.clear().await;
            return None;
        }
        Some(token)
    }

    /// Overwrite the stored token unconditionally.
    pub async fn save_token(&self, token: &StoredToken) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        write_atomic(&self.token_path, token).await
    }

    /// Load the cached user if present and well-formed.
    pub async fn load_user(&self) -> Option<GitHubUser> {
        let user: GitHubUser = read_record(&self.user_path).await?;
        if user.login.is_empty() || user.avatar_url.is_empty() {
            debug!("stored user missing login/avatar_url, treating as absent");
            return None;
        }
        Some(user)
    }

    /// Overwrite the cached user unconditionally.
    pub async fn save_user(&self, user: &GitHubUser) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        write_atomic(&self.user_path, user).await
    }

    /// Delete both records. Idempotent; called on logout and on any
    /// trust-boundary failure (expired token, failed user fetch).
    pub async fn clear(&self) {
        let _guard = self.write_lock.lock().await;
        for path in [&self.token_path, &self.user_path] {
            if let Err(e) = tokio::fs::remove_file(path).await
                && e.kind() != std::io::ErrorKind::NotFound
            {
                debug!(path = %path.display(), error = %e, "failed to remove auth record");
            }
        }
    }
}

/// Read and parse a JSON record, swallowing every failure mode into `None`.
async fn read_record<T: serde::de::DeserializeOwned>(path: &Path) -> Option<T> {
    let contents = match tokio::fs::read_to_string(path).await {
        Ok(c) => c,
        Err(e) => {
            if e.kind() != std::io::ErrorKind::NotFound {
                debug!(path = %path.display(), error = %e, "failed to read auth record");
            }
            return None;
        }
    };
    match serde_json::from_str(&contents) {
        Ok(value) => Some(value),
        Err(e) => {
            debug!(path = %path.display(), error = %e, "malformed auth record, treating as absent");
            None
        }
    }
}

/// Write a record to a file atomically.
///
/// Writes to a temporary file in the same directory, then renames it over
/// the target. Sets 0600 permissions since the token file contains a live
/// OAuth credential.
async fn write_atomic<T: Serialize>(path: &Path, data: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(data)
        .map_err(|e| Error::Io(format!("serializing auth record: {e}")))?;

    let dir = path
        .parent()
        .ok_or_else(|| Error::Io("record path has no parent directory".into()))?;

    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("record");
    let tmp_path = dir.join(format!(".{file_name}.tmp.{}", std::process::id()));

    tokio::fs::write(&tmp_path, json.as_bytes())
        .await
        .map_err(|e| Error::Io(format!("writing temp auth record: {e}")))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o600);
        tokio::fs::set_permissions(&tmp_path, perms)
            .await
            .map_err(|e| Error::Io(format!("setting auth record permissions: {e}")))?;
    }

    tokio::fs::rename(&tmp_path, path)
        .await
        .map_err(|e| Error::Io(format!("renaming temp auth record: {e}")))?;

    debug!(path = %path.display(), "persisted auth record");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_token(expires_at: u64) -> StoredToken {
        StoredToken {
            access_token: Secret::new("gho_test123".into()),
            token_type: Some("bearer".into()),
            scope: Some("read:user".into()),
            expires_at,
            refresh_token: None,
        }
    }

    fn test_user() -> GitHubUser {
        GitHubUser {
            id: 42,
            login: "octocat".into(),
            avatar_url: "https://avatars.githubusercontent.com/u/42".into(),
            html_url: "https://github.com/octocat".into(),
        }
    }

    /// Expiration far in the future (year 2100).
    fn future_expiry() -> u64 {
        4_102_444_800_000
    }

    #[tokio::test]
    async fn token_roundtrip_within_validity() {
        let dir = tempfile::tempdir().unwrap();
        let storage = AuthStorage::open(dir.path()).unwrap();

        let token = valid_token(future_expiry());
        storage.save_token(&token).await.unwrap();

        let loaded = storage.load_token().await.unwrap();
        assert_eq!(loaded, token);
    }

    #[tokio::test]
    async fn expired_token_loads_as_absent_and_clears_user() {
        let dir = tempfile::tempdir().unwrap();
        let storage = AuthStorage::open(dir.path()).unwrap();

        storage.save_token(&valid_token(1_000)).await.unwrap();
        storage.save_user(&test_user()).await.unwrap();

        assert!(storage.load_token().await.is_none());
        // The expired token invalidates the cached identity with it
        assert!(storage.load_user().await.is_none());
    }

    #[tokio::test]
    async fn missing_files_load_as_absent() {
        let dir = tempfile::tempdir().unwrap();
        let storage = AuthStorage::open(dir.path()).unwrap();

        assert!(storage.load_token().await.is_none());
        assert!(storage.load_user().await.is_none());
    }

    #[tokio::test]
    async fn malformed_token_loads_as_absent() {
        let dir = tempfile::tempdir().unwrap();
        let storage = AuthStorage::open(dir.path()).unwrap();

        tokio::fs::write(dir.path().join(TOKEN_FILE), "not json {{{")
            .await
            .unwrap();
        assert!(storage.load_token().await.is_none());
    }

    #[tokio::test]
    async fn token_missing_access_token_loads_as_absent() {
        let dir = tempfile::tempdir().unwrap();
        let storage = AuthStorage::open(dir.path()).unwrap();

        let json = format!(r#"{{"access_token":"","expires_at":{}}}"#, future_expiry());
        tokio::fs::write(dir.path().join(TOKEN_FILE), json)
            .await
            .unwrap();
        assert!(storage.load_token().await.is_none());
    }

    #[tokio::test]
    async fn user_missing_login_is_discarded() {
        let dir = tempfile::tempdir().unwrap();
        let storage = AuthStorage::open(dir.path()).unwrap();

        let json = r#"{"id":1,"login":"","avatar_url":"https://x","html_url":"https://y"}"#;
        tokio::fs::write(dir.path().join(USER_FILE), json)
            .await
            .unwrap();
        assert!(storage.load_user().await.is_none());
    }

    #[tokio::test]
    async fn user_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let storage = AuthStorage::open(dir.path()).unwrap();

        let user = test_user();
        storage.save_user(&user).await.unwrap();
        assert_eq!(storage.load_user().await.unwrap(), user);
    }

    #[tokio::test]
    async fn clear_twice_is_safe_and_leaves_storage_empty() {
        let dir = tempfile::tempdir().unwrap();
        let storage = AuthStorage::open(dir.path()).unwrap();

        storage.save_token(&valid_token(future_expiry())).await.unwrap();
        storage.save_user(&test_user()).await.unwrap();

        storage.clear().await;
        assert!(storage.load_token().await.is_none());
        assert!(storage.load_user().await.is_none());

        // Second clear with nothing stored must be a no-op
        storage.clear().await;
        assert!(storage.load_token().await.is_none());
        assert!(storage.load_user().await.is_none());
    }

    #[test]
    fn token_debug_redacts_access_token() {
        let token = valid_token(future_expiry());
        let debug = format!("{token:?}");
        assert!(debug.contains("[REDACTED]"), "got: {debug}");
        assert!(!debug.contains("gho_test123"), "got: {debug}");
    }

    #[tokio::test]
    async fn is_expired_is_a_pure_comparison() {
        let token = valid_token(10_000);
        assert!(!token.is_expired(9_999));
        assert!(token.is_expired(10_000));
        assert!(token.is_expired(10_001));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn token_file_permissions_are_0600() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let storage = AuthStorage::open(dir.path()).unwrap();
        storage.save_token(&valid_token(future_expiry())).await.unwrap();

        let metadata = tokio::fs::metadata(dir.path().join(TOKEN_FILE)).await.unwrap();
        let mode = metadata.permissions().mode() & 0o777;
        assert_eq!(mode, 0o600, "token file must be 0600, got {mode:o}");
    }

    #[tokio::test]
    async fn save_overwrites_unconditionally() {
        let dir = tempfile::tempdir().unwrap();
        let storage = AuthStorage::open(dir.path()).unwrap();

        storage.save_token(&valid_token(future_expiry())).await.unwrap();
        let replacement = StoredToken {
            access_token: Secret::new("gho_replacement".into()),
            token_type: None,
            scope: None,
            expires_at: future_expiry() + 1,
            refresh_token: Some("ghr_refresh".into()),
        };
        storage.save_token(&replacement).await.unwrap();

        assert_eq!(storage.load_token().await.unwrap(), replacement);
    }
}
