//! Credential storage for the signed-in session
//!
//! Holds the current access/refresh pair in memory and mirrors it into a JSON
//! file with two keys (`accessToken`, `refreshToken`) so a restart keeps the
//! session. Reads are synchronous snapshots taken by every outgoing call.
//! Writes use atomic temp-file + rename and are serialized by a tokio Mutex so
//! a refresh and a sign-out can never interleave their file writes.

use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};

use common::Secret;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};

/// The access/refresh credential pair of a session.
///
/// Both tokens are opaque. Nothing here inspects their shape or expiry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialPair {
    /// Short-lived bearer token attached to API calls
    pub access_token: Secret<String>,
    /// Longer-lived token used only against the refresh endpoint
    pub refresh_token: Secret<String>,
}

impl CredentialPair {
    pub fn new(access_token: impl Into<String>, refresh_token: impl Into<String>) -> Self {
        Self {
            access_token: Secret::new(access_token.into()),
            refresh_token: Secret::new(refresh_token.into()),
        }
    }
}

/// On-disk form of the pair, keyed like the browser's local storage.
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredTokens {
    #[serde(default)]
    access_token: Option<String>,
    #[serde(default)]
    refresh_token: Option<String>,
}

impl StoredTokens {
    fn into_pair(self) -> Option<CredentialPair> {
        match (self.access_token, self.refresh_token) {
            (Some(access), Some(refresh)) => Some(CredentialPair::new(access, refresh)),
            _ => None,
        }
    }
}

impl From<&CredentialPair> for StoredTokens {
    fn from(pair: &CredentialPair) -> Self {
        Self {
            access_token: Some(pair.access_token.expose().clone()),
            refresh_token: Some(pair.refresh_token.expose().clone()),
        }
    }
}

/// Process-wide holder of the session's credential pair.
///
/// `path` is `None` for a purely in-memory store (tests, ephemeral sessions).
pub struct CredentialStore {
    path: Option<PathBuf>,
    current: RwLock<Option<CredentialPair>>,
    write_lock: Mutex<()>,
}

impl CredentialStore {
    /// Rehydrate the store from the given file path.
    ///
    /// A missing file means no session yet. A file that lacks either key is
    /// treated the same way, since a lone token cannot sustain a session.
    pub async fn load(path: PathBuf) -> Result<Self> {
        let current = if path.exists() {
            let contents = tokio::fs::read_to_string(&path)
                .await
                .map_err(|e| Error::Io(format!("reading credential file: {e}")))?;
            let stored: StoredTokens = serde_json::from_str(&contents)
                .map_err(|e| Error::CredentialParse(format!("parsing credential file: {e}")))?;
            let pair = stored.into_pair();
            match pair {
                Some(_) => info!(path = %path.display(), "rehydrated session credentials"),
                None => warn!(path = %path.display(), "credential file is incomplete, starting signed out"),
            }
            pair
        } else {
            info!(path = %path.display(), "credential file not found, starting signed out");
            None
        };

        Ok(Self {
            path: Some(path),
            current: RwLock::new(current),
            write_lock: Mutex::new(()),
        })
    }

    /// Create a store that never touches the filesystem.
    pub fn in_memory() -> Self {
        Self {
            path: None,
            current: RwLock::new(None),
            write_lock: Mutex::new(()),
        }
    }

    /// Snapshot of the current pair.
    pub fn get(&self) -> Option<CredentialPair> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Current access token, if signed in.
    pub fn access_token(&self) -> Option<Secret<String>> {
        self.get().map(|pair| pair.access_token)
    }

    /// Current refresh token. An empty string counts as absent.
    pub fn refresh_token(&self) -> Option<Secret<String>> {
        self.get()
            .map(|pair| pair.refresh_token)
            .filter(|token| !token.is_empty())
    }

    /// Whether no pair is held.
    pub fn is_empty(&self) -> bool {
        self.get().is_none()
    }

    /// Backing file, if any.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Replace the pair wholesale and persist it.
    ///
    /// The in-memory pair is updated before the write, so callers see the new
    /// tokens even if persisting fails.
    pub async fn set(&self, pair: CredentialPair) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let stored = StoredTokens::from(&pair);
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = Some(pair);
        debug!("stored credential pair");
        match &self.path {
            Some(path) => write_atomic(path, &stored).await,
            None => Ok(()),
        }
    }

    /// Drop the pair and remove the backing file. Safe to call repeatedly.
    pub async fn clear(&self) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let previous = self
            .current
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if previous.is_some() {
            debug!("cleared credential pair");
        }
        let Some(path) = &self.path else {
            return Ok(());
        };
        match tokio::fs::remove_file(path).await {
            Ok(()) => {
                debug!(path = %path.display(), "removed credential file");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::Io(format!("removing credential file: {e}"))),
        }
    }
}

/// Write tokens to a file atomically.
///
/// Writes to a temporary file in the same directory, then renames it over
/// the target. Sets file permissions to 0600 (owner read/write only) since
/// the file contains bearer credentials.
async fn write_atomic(path: &Path, data: &StoredTokens) -> Result<()> {
    let json = serde_json::to_string_pretty(data)
        .map_err(|e| Error::CredentialParse(format!("serializing credentials: {e}")))?;

    let dir = path
        .parent()
        .ok_or_else(|| Error::Io("credential path has no parent directory".into()))?;

    if !dir.as_os_str().is_empty() {
        tokio::fs::create_dir_all(dir)
            .await
            .map_err(|e| Error::Io(format!("creating credential directory: {e}")))?;
    }

    let tmp_path = dir.join(format!(".credentials.tmp.{}", std::process::id()));

    tokio::fs::write(&tmp_path, json.as_bytes())
        .await
        .map_err(|e| Error::Io(format!("writing temp credential file: {e}")))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o600);
        tokio::fs::set_permissions(&tmp_path, perms)
            .await
            .map_err(|e| Error::Io(format!("setting credential file permissions: {e}")))?;
    }

    tokio::fs::rename(&tmp_path, path)
        .await
        .map_err(|e| Error::Io(format!("renaming temp credential file: {e}")))?;

    debug!(path = %path.display(), "persisted credentials");
    Ok(())
}
