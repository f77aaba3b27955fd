//! Session persistence backends

use crate::error::{Result, SessionError};
use crate::structs::UserSession;
use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::warn;

/// Persistence backend for user sessions.
///
/// The in-memory store stays authoritative; a backend only seeds sessions the
/// store has not seen yet and mirrors every change.
#[async_trait]
pub trait SessionStorage: Send + Sync {
    /// Load a session, `SessionError::NotFound` when absent
    async fn load_session(&self, user_id: &str) -> Result<UserSession>;

    async fn save_session(&self, user_id: &str, session: &UserSession) -> Result<()>;

    async fn session_exists(&self, user_id: &str) -> bool;

    /// Deleting an absent session succeeds.
    async fn delete_session(&self, user_id: &str) -> Result<()>;
}

/// One JSON document per user under `base_path`.
///
/// File names are the hex encoding of the user id bytes, so distinct ids never
/// share a file and no id can name a path outside the directory.
#[derive(Clone)]
pub struct FileSessionStorage {
    base_path: PathBuf,
}

impl FileSessionStorage {
    pub fn new<P: AsRef<Path>>(base_path: P) -> Self {
        Self {
            base_path: base_path.as_ref().to_path_buf(),
        }
    }

    fn session_path(&self, user_id: &str) -> PathBuf {
        self.base_path
            .join(format!("session-{}.json", hex::encode(user_id.as_bytes())))
    }
}

fn check_owner(user_id: &str, session: &UserSession) -> Result<()> {
    if session.user_id == user_id {
        Ok(())
    } else {
        Err(SessionError::OwnerMismatch {
            requested: user_id.to_string(),
            stored: session.user_id.clone(),
        })
    }
}

#[async_trait]
impl SessionStorage for FileSessionStorage {
    async fn load_session(&self, user_id: &str) -> Result<UserSession> {
        let contents = match fs::read_to_string(self.session_path(user_id)).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == ErrorKind::NotFound => return Err(SessionError::NotFound),
            Err(e) => return Err(e.into()),
        };

        let session: UserSession = serde_json::from_str(&contents)?;
        if let Err(e) = check_owner(user_id, &session) {
            warn!("[{}] Refusing stored session: {}", user_id, e);
            return Err(e);
        }
        Ok(session)
    }

    async fn save_session(&self, user_id: &str, session: &UserSession) -> Result<()> {
        check_owner(user_id, session)?;
        fs::create_dir_all(&self.base_path).await?;

        // Write aside and rename so a crash never leaves a truncated document.
        let path = self.session_path(user_id);
        let staging = path.with_extension("json.tmp");
        fs::write(&staging, serde_json::to_vec_pretty(session)?).await?;
        fs::rename(&staging, &path).await?;
        Ok(())
    }

    async fn session_exists(&self, user_id: &str) -> bool {
        fs::try_exists(self.session_path(user_id))
            .await
            .unwrap_or(false)
    }

    async fn delete_session(&self, user_id: &str) -> Result<()> {
        match fs::remove_file(self.session_path(user_id)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
