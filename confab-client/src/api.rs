use confab_chat::protocol::{Message, User};
use serde_json::json;

use crate::{AuthSession, ClientError};

/// The REST half of the client: accounts and history.
pub struct Api {
    http: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl Api {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
            token: None,
        }
    }

    pub fn with_token(base_url: impl Into<String>, token: String) -> Self {
        let mut api = Self::new(base_url);
        api.token = Some(token);
        api
    }

    /// Creates an account. The returned session authenticates every request
    /// after this one.
    pub async fn register(
        &mut self,
        username: &str,
        email: &str,
        password: &str,
    ) -> Result<AuthSession, ClientError> {
        let response = self
            .http
            .post(format!("{}/api/auth/register", self.base_url))
            .json(&json!({
                "username": username,
                "email": email,
                "password": password,
            }))
            .send()
            .await?;

        let auth: AuthSession = expect_success(response).await?.json().await?;
        self.token = Some(auth.token.clone());

        Ok(auth)
    }

    /// Logs into an existing account
    pub async fn login(&mut self, email: &str, password: &str) -> Result<AuthSession, ClientError> {
        let response = self
            .http
            .post(format!("{}/api/auth/login", self.base_url))
            .json(&json!({
                "email": email,
                "password": password,
            }))
            .send()
            .await?;

        let auth: AuthSession = expect_success(response).await?.json().await?;
        self.token = Some(auth.token.clone());

        Ok(auth)
    }

    /// The recent history of a room, oldest first
    pub async fn messages(&self, room: &str) -> Result<Vec<Message>, ClientError> {
        let response = self
            .authorized(self.http.get(format!("{}/api/messages/{room}", self.base_url)))
            .send()
            .await?;

        Ok(expect_success(response).await?.json().await?)
    }

    /// Re-validates the stored profile against the server
    pub async fn current_user(&self) -> Result<User, ClientError> {
        let response = self
            .authorized(self.http.get(format!("{}/api/auth/user", self.base_url)))
            .send()
            .await?;

        Ok(expect_success(response).await?.json().await?)
    }

    /// Invalidates the session server-side
    pub async fn logout(&mut self) -> Result<(), ClientError> {
        let response = self
            .authorized(self.http.post(format!("{}/api/auth/logout", self.base_url)))
            .send()
            .await?;

        expect_success(response).await?;
        self.token = None;

        Ok(())
    }

    fn authorized(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }
}

async fn expect_success(response: reqwest::Response) -> Result<reqwest::Response, ClientError> {
    let status = response.status();

    if status.is_success() {
        return Ok(response);
    }

    Err(ClientError::Rejected {
        status: status.as_u16(),
        message: response.text().await.unwrap_or_default(),
    })
}
