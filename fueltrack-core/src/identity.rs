//! Who is signed in.
//!
//! The identity provider is an external collaborator. The rest of the core
//! only needs the current [`Identity`] and a way to hear about changes, which
//! the [`IdentityProvider`] trait exposes as a `watch` channel.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::watch;
use uuid::Uuid;

pub const MIN_PASSWORD_LEN: usize = 6;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    pub uid: String,
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
}

impl Identity {
    pub fn new(uid: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            uid: uid.into(),
            email: email.into(),
            display_name: None,
        }
    }

    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }

    /// Display name when set, email otherwise.
    pub fn label(&self) -> &str {
        self.display_name.as_deref().unwrap_or(&self.email)
    }
}

/// Sign-in and sign-up failures, each with a fixed message fit for users.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdentityError {
    #[error("Invalid email or password.")]
    InvalidCredentials,
    #[error("This domain is not authorized for sign-in. Ask the server administrator to add it to the allowed domains.")]
    UnauthorizedDomain,
    #[error("Sign-up is disabled on this server.")]
    ProviderDisabled,
    #[error("This account has been disabled.")]
    AccountDisabled,
    #[error("An account with this email already exists.")]
    EmailInUse,
    #[error("Password must be at least 6 characters.")]
    WeakPassword,
    #[error("Could not reach the sign-in service: {0}")]
    Network(String),
    #[error("Sign-in failed: {0}")]
    Unknown(String),
}

impl IdentityError {
    /// Maps a provider error code to a variant.
    ///
    /// Accepts both `snake_case` codes and `auth/kebab-case` codes.
    pub fn from_provider_code(code: &str, message: &str) -> Self {
        let normalized = code
            .trim()
            .trim_start_matches("auth/")
            .replace('-', "_")
            .to_lowercase();

        match normalized.as_str() {
            "invalid_credentials" | "invalid_credential" | "wrong_password" | "user_not_found"
            | "invalid_email" => IdentityError::InvalidCredentials,
            "unauthorized_domain" => IdentityError::UnauthorizedDomain,
            "signup_disabled" | "operation_not_allowed" | "provider_disabled" => {
                IdentityError::ProviderDisabled
            }
            "account_disabled" | "user_disabled" => IdentityError::AccountDisabled,
            "email_in_use" | "email_already_in_use" => IdentityError::EmailInUse,
            "weak_password" => IdentityError::WeakPassword,
            "network_request_failed" | "network" => IdentityError::Network(message.to_string()),
            _ => IdentityError::Unknown(message.to_string()),
        }
    }

    /// The code a server sends for this error.
    pub fn code(&self) -> &'static str {
        match self {
            IdentityError::InvalidCredentials => "invalid_credentials",
            IdentityError::UnauthorizedDomain => "unauthorized_domain",
            IdentityError::ProviderDisabled => "signup_disabled",
            IdentityError::AccountDisabled => "account_disabled",
            IdentityError::EmailInUse => "email_in_use",
            IdentityError::WeakPassword => "weak_password",
            IdentityError::Network(_) => "network",
            IdentityError::Unknown(_) => "unknown",
        }
    }
}

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    fn current(&self) -> Option<Identity>;

    /// Receiver that observes every sign-in and sign-out.
    fn watch(&self) -> watch::Receiver<Option<Identity>>;

    async fn sign_in(&self, email: &str, password: &str) -> Result<Identity, IdentityError>;

    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        display_name: Option<&str>,
    ) -> Result<Identity, IdentityError>;

    async fn sign_out(&self) -> Result<(), IdentityError>;
}

struct Account {
    password: String,
    identity: Identity,
    disabled: bool,
}

/// In-process identity provider with the same rules as the sync server.
pub struct MemoryIdentityProvider {
    accounts: Mutex<HashMap<String, Account>>,
    current: watch::Sender<Option<Identity>>,
    signup_enabled: bool,
    allowed_domains: Option<Vec<String>>,
}

impl Default for MemoryIdentityProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryIdentityProvider {
    pub fn new() -> Self {
        let (current, _) = watch::channel(None);
        Self {
            accounts: Mutex::new(HashMap::new()),
            current,
            signup_enabled: true,
            allowed_domains: None,
        }
    }

    pub fn with_signup_enabled(mut self, enabled: bool) -> Self {
        self.signup_enabled = enabled;
        self
    }

    pub fn with_allowed_domains(mut self, domains: Vec<String>) -> Self {
        self.allowed_domains = Some(domains);
        self
    }

    pub fn disable_account(&self, email: &str) {
        let mut accounts = self.accounts.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(account) = accounts.get_mut(&email.to_lowercase()) {
            account.disabled = true;
        }
    }

    fn check_domain(&self, email: &str) -> Result<(), IdentityError> {
        let Some(domains) = &self.allowed_domains else {
            return Ok(());
        };
        let domain = email.rsplit_once('@').map(|(_, d)| d).unwrap_or_default();
        if domains.iter().any(|d| d.eq_ignore_ascii_case(domain)) {
            Ok(())
        } else {
            Err(IdentityError::UnauthorizedDomain)
        }
    }
}

#[async_trait]
impl IdentityProvider for MemoryIdentityProvider {
    fn current(&self) -> Option<Identity> {
        self.current.borrow().clone()
    }

    fn watch(&self) -> watch::Receiver<Option<Identity>> {
        self.current.subscribe()
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<Identity, IdentityError> {
        self.check_domain(email)?;
        let identity = {
            let accounts = self.accounts.lock().unwrap_or_else(PoisonError::into_inner);
            let account = accounts
                .get(&email.to_lowercase())
                .ok_or(IdentityError::InvalidCredentials)?;
            if account.password != password {
                return Err(IdentityError::InvalidCredentials);
            }
            if account.disabled {
                return Err(IdentityError::AccountDisabled);
            }
            account.identity.clone()
        };

        self.current.send_replace(Some(identity.clone()));
        Ok(identity)
    }

    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        display_name: Option<&str>,
    ) -> Result<Identity, IdentityError> {
        if !self.signup_enabled {
            return Err(IdentityError::ProviderDisabled);
        }
        self.check_domain(email)?;
        if password.len() < MIN_PASSWORD_LEN {
            return Err(IdentityError::WeakPassword);
        }

        let key = email.to_lowercase();
        let identity = {
            let mut accounts = self.accounts.lock().unwrap_or_else(PoisonError::into_inner);
            if accounts.contains_key(&key) {
                return Err(IdentityError::EmailInUse);
            }
            let mut identity = Identity::new(Uuid::new_v4().to_string(), email);
            identity.display_name = display_name.map(str::to_string);
            accounts.insert(
                key,
                Account {
                    password: password.to_string(),
                    identity: identity.clone(),
                    disabled: false,
                },
            );
            identity
        };

        self.current.send_replace(Some(identity.clone()));
        Ok(identity)
    }

    async fn sign_out(&self) -> Result<(), IdentityError> {
        self.current.send_replace(None);
        Ok(())
    }
}
