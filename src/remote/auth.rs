//! Sign-in against the sync server.
//!
//! A successful sign-up or login returns a bearer token, which is stored
//! with the identity in a small YAML session file so later CLI runs stay
//! signed in.

use async_trait::async_trait;
use fueltrack_core::{Identity, IdentityError, IdentityProvider};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::watch;

use super::client::ErrorBody;

/// A stored sign-in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub server_url: String,
    pub token: String,
    pub identity: Identity,
}

/// Errors reading or writing the session file.
#[derive(Debug)]
pub enum SessionError {
    ReadError(PathBuf, std::io::Error),
    WriteError(PathBuf, std::io::Error),
    ParseError(PathBuf, serde_yaml::Error),
}

impl std::fmt::Display for SessionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionError::ReadError(path, e) => {
                write!(f, "Failed to read session '{}': {}", path.display(), e)
            }
            SessionError::WriteError(path, e) => {
                write!(f, "Failed to write session '{}': {}", path.display(), e)
            }
            SessionError::ParseError(path, e) => {
                write!(f, "Failed to parse session '{}': {}", path.display(), e)
            }
        }
    }
}

impl std::error::Error for SessionError {}

impl Session {
    /// Reads the session file. A missing file means no session.
    pub fn load(path: &Path) -> Result<Option<Self>, SessionError> {
        if !path.exists() {
            return Ok(None);
        }
        let contents = std::fs::read_to_string(path)
            .map_err(|e| SessionError::ReadError(path.to_path_buf(), e))?;
        let session = serde_yaml::from_str(&contents)
            .map_err(|e| SessionError::ParseError(path.to_path_buf(), e))?;
        Ok(Some(session))
    }

    pub fn save(&self, path: &Path) -> Result<(), SessionError> {
        let write_error = |e| SessionError::WriteError(path.to_path_buf(), e);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(write_error)?;
        }
        let contents = serde_yaml::to_string(self)
            .map_err(|e| SessionError::ParseError(path.to_path_buf(), e))?;
        std::fs::write(path, contents).map_err(write_error)
    }

    /// Removes the session file. Returns `false` if there was none.
    pub fn clear(path: &Path) -> Result<bool, SessionError> {
        match std::fs::remove_file(path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(SessionError::WriteError(path.to_path_buf(), e)),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CredentialsRequest<'a> {
    email: &'a str,
    password: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    display_name: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AuthResponse {
    token: String,
    uid: String,
    email: String,
    #[serde(default)]
    display_name: Option<String>,
}

/// Identity provider backed by the sync server's `/auth` routes.
pub struct HttpIdentityProvider {
    client: reqwest::Client,
    base_url: String,
    session_path: PathBuf,
    session: Mutex<Option<Session>>,
    current: watch::Sender<Option<Identity>>,
}

impl HttpIdentityProvider {
    /// Creates a provider, restoring a stored session for the same server.
    pub fn new(
        base_url: impl Into<String>,
        session_path: impl Into<PathBuf>,
        timeout: Duration,
    ) -> Result<Self, IdentityError> {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        let session_path = session_path.into();

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| IdentityError::Network(e.to_string()))?;

        let session = match Session::load(&session_path) {
            Ok(Some(session)) if session.server_url == base_url => Some(session),
            Ok(Some(session)) => {
                tracing::warn!(
                    "Ignoring stored session for {}; configured server is {}",
                    session.server_url,
                    base_url
                );
                None
            }
            Ok(None) => None,
            Err(e) => {
                tracing::warn!("{}", e);
                None
            }
        };

        let (current, _) = watch::channel(session.as_ref().map(|s| s.identity.clone()));

        Ok(Self {
            client,
            base_url,
            session_path,
            session: Mutex::new(session),
            current,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Bearer token of the current session.
    pub fn token(&self) -> Option<String> {
        self.lock().as_ref().map(|s| s.token.clone())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Option<Session>> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn authenticate(
        &self,
        route: &str,
        request: &CredentialsRequest<'_>,
    ) -> Result<Identity, IdentityError> {
        let response = self
            .client
            .post(format!("{}{}", self.base_url, route))
            .json(request)
            .send()
            .await
            .map_err(|e| IdentityError::Network(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            return Err(match response.json::<ErrorBody>().await {
                Ok(body) => IdentityError::from_provider_code(&body.error, &body.message),
                Err(_) => IdentityError::Unknown(format!("Server returned status {}", status)),
            });
        }

        let auth: AuthResponse = response
            .json()
            .await
            .map_err(|e| IdentityError::Unknown(e.to_string()))?;

        let mut identity = Identity::new(auth.uid, auth.email);
        identity.display_name = auth.display_name;

        let session = Session {
            server_url: self.base_url.clone(),
            token: auth.token,
            identity: identity.clone(),
        };
        session
            .save(&self.session_path)
            .map_err(|e| IdentityError::Unknown(e.to_string()))?;

        *self.lock() = Some(session);
        self.current.send_replace(Some(identity.clone()));
        tracing::info!("Signed in as {}", identity.email);

        Ok(identity)
    }
}

#[async_trait]
impl IdentityProvider for HttpIdentityProvider {
    fn current(&self) -> Option<Identity> {
        self.current.borrow().clone()
    }

    fn watch(&self) -> watch::Receiver<Option<Identity>> {
        self.current.subscribe()
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<Identity, IdentityError> {
        self.authenticate(
            "/auth/login",
            &CredentialsRequest {
                email: email.trim(),
                password,
                display_name: None,
            },
        )
        .await
    }

    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        display_name: Option<&str>,
    ) -> Result<Identity, IdentityError> {
        self.authenticate(
            "/auth/signup",
            &CredentialsRequest {
                email: email.trim(),
                password,
                display_name,
            },
        )
        .await
    }

    /// Revokes the token on the server when reachable, then forgets the
    /// session locally either way.
    async fn sign_out(&self) -> Result<(), IdentityError> {
        let token = self.lock().take().map(|s| s.token);

        if let Some(token) = token {
            let result = self
                .client
                .post(format!("{}/auth/logout", self.base_url))
                .bearer_auth(token)
                .send()
                .await;
            if let Err(e) = result {
                tracing::warn!("Failed to revoke session on server: {}", e);
            }
        }

        Session::clear(&self.session_path).map_err(|e| IdentityError::Unknown(e.to_string()))?;
        self.current.send_replace(None);
        Ok(())
    }
}
