//! Client-side bearer token storage.
//!
//! A `session` store keeps the token in memory for the life of the process.
//! A `local` store additionally writes "remember me" logins to a JSON file
//! and picks them back up on the next start, as long as they have not
//! expired.

use crate::errors::AppError;
use crate::models::{LoginResponse, TokenPersistence, User};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

/// What the client remembers about a login.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
    pub persistence: TokenPersistence,
    pub user: User,
}

impl StoredToken {
    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

impl From<&LoginResponse> for StoredToken {
    fn from(login: &LoginResponse) -> Self {
        Self {
            token: login.token.clone(),
            expires_at: login.expires_at,
            persistence: login.persistence,
            user: login.user.clone(),
        }
    }
}

#[derive(Debug)]
pub struct TokenStore {
    file: Option<PathBuf>,
    current: RwLock<Option<StoredToken>>,
}

impl TokenStore {
    /// In-memory only; nothing survives the process.
    pub fn session() -> Self {
        Self {
            file: None,
            current: RwLock::new(None),
        }
    }

    /// Backed by `path` for remembered logins.
    ///
    /// An unexpired token already in the file is restored. Expired or
    /// unreadable files are removed.
    pub fn local(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let restored = Self::read_file(&path);
        Self {
            file: Some(path),
            current: RwLock::new(restored),
        }
    }

    fn read_file(path: &Path) -> Option<StoredToken> {
        let raw = std::fs::read_to_string(path).ok()?;
        match serde_json::from_str::<StoredToken>(&raw) {
            Ok(stored) if !stored.is_expired(Utc::now()) => {
                tracing::debug!("Restored remembered login for {}", stored.user.email);
                Some(stored)
            }
            Ok(_) => {
                tracing::debug!("Remembered login at {} has expired", path.display());
                let _ = std::fs::remove_file(path);
                None
            }
            Err(e) => {
                tracing::warn!("Discarding unreadable token file {}: {}", path.display(), e);
                let _ = std::fs::remove_file(path);
                None
            }
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, Option<StoredToken>> {
        self.current.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Option<StoredToken>> {
        self.current.write().unwrap_or_else(|e| e.into_inner())
    }

    /// Remembers a fresh login.
    ///
    /// Only `local` logins reach disk; a `session` login also deletes any
    /// previously remembered one so the two never disagree.
    pub fn save(&self, login: &LoginResponse) -> Result<(), AppError> {
        let stored = StoredToken::from(login);

        if let Some(ref path) = self.file {
            if stored.persistence == TokenPersistence::Local {
                let json = serde_json::to_string_pretty(&stored).map_err(|e| {
                    AppError::InternalError(format!("Failed to serialize token: {}", e))
                })?;
                write_private(path, &json).map_err(|e| {
                    AppError::InternalError(format!(
                        "Failed to write token file {}: {}",
                        path.display(),
                        e
                    ))
                })?;
            } else {
                remove_if_present(path)?;
            }
        }

        *self.write() = Some(stored);
        Ok(())
    }

    /// The current token, unless it has expired (in which case it is dropped).
    pub fn token(&self) -> Option<String> {
        let expired = match self.read().as_ref() {
            Some(stored) if !stored.is_expired(Utc::now()) => return Some(stored.token.clone()),
            Some(_) => true,
            None => false,
        };
        if expired {
            tracing::debug!("Stored token expired, clearing");
            if let Err(e) = self.clear() {
                tracing::warn!("{}", e);
            }
        }
        None
    }

    pub fn user(&self) -> Option<User> {
        self.read().as_ref().map(|s| s.user.clone())
    }

    pub fn persistence(&self) -> Option<TokenPersistence> {
        self.read().as_ref().map(|s| s.persistence)
    }

    /// Forgets the login in memory and on disk.
    pub fn clear(&self) -> Result<(), AppError> {
        *self.write() = None;
        match self.file {
            Some(ref path) => remove_if_present(path),
            None => Ok(()),
        }
    }
}

/// Replaces `path` with `contents` atomically.
///
/// The data goes to a sibling temp file, readable only by the owner on
/// unix, which is then renamed over the target.
fn write_private(path: &Path, contents: &str) -> std::io::Result<()> {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    // A leftover temp file may carry wider permissions
    let _ = std::fs::remove_file(&tmp);

    let mut options = OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }

    let written = options.open(&tmp).and_then(|mut file| {
        file.write_all(contents.as_bytes())?;
        file.sync_all()
    });
    let result = written.and_then(|()| std::fs::rename(&tmp, path));
    if result.is_err() {
        let _ = std::fs::remove_file(&tmp);
    }
    result
}

fn remove_if_present(path: &Path) -> Result<(), AppError> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(AppError::InternalError(format!(
            "Failed to remove token file {}: {}",
            path.display(),
            e
        ))),
    }
}
