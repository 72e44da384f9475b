use argon2::{
    password_hash::{Encoding, SaltString},
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
};
use chrono::{Duration, Utc};
use rand::rngs::OsRng;
use std::sync::Arc;
use thiserror::Error;

use crate::{util::random_string, Database, DatabaseError, NewSession, NewUser, SessionData};

/// Creates accounts and issues the bearer tokens that authenticate every
/// request after login.
pub struct Auth {
    db: Arc<dyn Database>,
    argon: Argon2<'static>,
}

#[derive(Debug, Error)]
pub enum AuthError {
    /// Email or password is incorrect
    #[error("Invalid credentials")]
    InvalidCredentials,
    /// Something else went wrong with the database
    #[error(transparent)]
    Db(DatabaseError),
    #[error("HashError: {0}")]
    HashError(String),
}

impl Auth {
    const SESSION_DURATION_IN_DAYS: usize = 7;
    const TOKEN_LENGTH: usize = 32;

    pub fn new(db: &Arc<dyn Database>) -> Self {
        Self {
            db: db.clone(),
            argon: Argon2::default(),
        }
    }

    /// Creates a new account and logs it in, returning the fresh session
    pub async fn register(&self, new_account: NewAccount) -> Result<SessionData, AuthError> {
        let salt = SaltString::generate(&mut OsRng);
        let hashed_password = self
            .argon
            .hash_password(new_account.password.as_bytes(), &salt)
            .map_err(|e| AuthError::HashError(e.to_string()))?
            .to_string();

        let user = self
            .db
            .create_user(NewUser {
                username: new_account.username,
                email: new_account.email,
                password: hashed_password,
            })
            .await
            .map_err(AuthError::Db)?;

        self.create_session(user.id).await
    }

    /// Logs in a user, returning a new session
    pub async fn login(&self, credentials: Credentials) -> Result<SessionData, AuthError> {
        self.clear_expired().await;

        let user = self
            .db
            .user_by_email(&credentials.email)
            .await
            .map_err(|e| match e {
                DatabaseError::NotFound {
                    resource: _,
                    identifier: _,
                } => AuthError::InvalidCredentials,
                err => AuthError::Db(err),
            })?;

        let stored_password = PasswordHash::parse(&user.password, Encoding::default())
            .map_err(|e| AuthError::HashError(e.to_string()))?;

        self.argon
            .verify_password(credentials.password.as_bytes(), &stored_password)
            .map_err(|_| AuthError::InvalidCredentials)?;

        self.create_session(user.id).await
    }

    /// Returns the session a token belongs to, if it exists and is current
    pub async fn session(&self, token: &str) -> Result<SessionData, DatabaseError> {
        let session = self.db.session_by_token(token).await?;

        if session.expires_at < Utc::now() {
            return Err(DatabaseError::NotFound {
                resource: "session",
                identifier: "token",
            });
        }

        Ok(session)
    }

    /// Deletes the associated session, if it exists
    pub async fn logout(&self, token: &str) -> Result<(), DatabaseError> {
        self.db.delete_session_by_token(token).await
    }

    async fn create_session(&self, user_id: crate::PrimaryKey) -> Result<SessionData, AuthError> {
        let expires_at = Utc::now() + Duration::days(Self::SESSION_DURATION_IN_DAYS as i64);

        let new_session = NewSession {
            token: random_string(Self::TOKEN_LENGTH),
            user_id,
            expires_at,
        };

        self.db
            .create_session(new_session)
            .await
            .map_err(AuthError::Db)
    }

    async fn clear_expired(&self) {
        self.db
            .clear_expired_sessions()
            .await
            .expect("sessions are cleared")
    }
}

#[derive(Debug)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

#[derive(Debug)]
pub struct NewAccount {
    pub username: String,
    pub email: String,
    pub password: String,
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::db::memory::MemoryDatabase;

    fn auth() -> Auth {
        let db: Arc<dyn Database> = Arc::new(MemoryDatabase::new());
        Auth::new(&db)
    }

    fn account(username: &str) -> NewAccount {
        NewAccount {
            username: username.to_string(),
            email: format!("{username}@example.com"),
            password: "hunter2hunter2".to_string(),
        }
    }

    #[tokio::test]
    async fn register_then_login() {
        let auth = auth();

        let registered = auth.register(account("john")).await.unwrap();
        assert_eq!(registered.user.username, "john");

        let session = auth
            .login(Credentials {
                email: "john@example.com".to_string(),
                password: "hunter2hunter2".to_string(),
            })
            .await
            .unwrap();

        assert_eq!(session.user.id, registered.user.id);
        assert_ne!(session.token, registered.token);

        let resolved = auth.session(&session.token).await.unwrap();
        assert_eq!(resolved.user.username, "john");
    }

    #[tokio::test]
    async fn login_rejects_bad_credentials() {
        let auth = auth();
        auth.register(account("mary")).await.unwrap();

        let wrong_password = auth
            .login(Credentials {
                email: "mary@example.com".to_string(),
                password: "not-her-password".to_string(),
            })
            .await;

        assert!(matches!(wrong_password, Err(AuthError::InvalidCredentials)));

        let unknown_email = auth
            .login(Credentials {
                email: "nobody@example.com".to_string(),
                password: "hunter2hunter2".to_string(),
            })
            .await;

        assert!(matches!(unknown_email, Err(AuthError::InvalidCredentials)));
    }

    #[tokio::test]
    async fn register_rejects_duplicates() {
        let auth = auth();
        auth.register(account("john")).await.unwrap();

        let same_username = auth
            .register(NewAccount {
                username: "john".to_string(),
                email: "second@example.com".to_string(),
                password: "hunter2hunter2".to_string(),
            })
            .await;

        assert!(matches!(
            same_username,
            Err(AuthError::Db(DatabaseError::Conflict { field: "username", .. }))
        ));

        let same_email = auth
            .register(NewAccount {
                username: "john2".to_string(),
                email: "john@example.com".to_string(),
                password: "hunter2hunter2".to_string(),
            })
            .await;

        assert!(matches!(
            same_email,
            Err(AuthError::Db(DatabaseError::Conflict { field: "email", .. }))
        ));
    }

    #[tokio::test]
    async fn logout_invalidates_the_token() {
        let auth = auth();
        let session = auth.register(account("john")).await.unwrap();

        auth.logout(&session.token).await.unwrap();

        assert!(auth.session(&session.token).await.is_err());
    }
}
