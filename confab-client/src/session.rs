use std::{fs, io, path::PathBuf};

use confab_chat::protocol::User;
use serde::{Deserialize, Serialize};

/// The signed-in session as the client keeps it between runs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthSession {
    pub token: String,
    pub user: User,
}

/// Persists the session to disk so a restart doesn't require logging in
/// again.
pub struct SessionStore {
    path: PathBuf,
}

impl SessionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// The stored session, if there is a readable one
    pub fn load(&self) -> Option<AuthSession> {
        let contents = fs::read_to_string(&self.path).ok()?;
        serde_json::from_str(&contents).ok()
    }

    pub fn save(&self, session: &AuthSession) -> io::Result<()> {
        let contents = serde_json::to_string(session).expect("sessions serialize");
        fs::write(&self.path, contents)
    }

    /// Forgets the stored session, used on logout
    pub fn clear(&self) -> io::Result<()> {
        match fs::remove_file(&self.path) {
            Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
            _ => Ok(()),
        }
    }
}
