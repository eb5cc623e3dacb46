//! Authentication for the broker.
//!
//! CONNECT packets carrying credentials are checked against an
//! [`AuthProvider`]; connections without credentials bypass the check
//! entirely and are admitted only when the provider permits anonymous
//! clients. Credential comparison is an exact string match against the
//! store.

use mqtt3_protocol::packet::ConnectPacket;
use mqtt3_protocol::types::ConnectReturnCode;
use mqtt3_protocol::{MqttError, Result};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::future::Future;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;
use tokio::fs;
use tracing::{debug, info, warn};

/// Outcome of a CONNECT authentication check.
#[derive(Debug, Clone, Copy)]
pub struct AuthResult {
    pub authenticated: bool,
    pub return_code: ConnectReturnCode,
}

impl AuthResult {
    #[must_use]
    pub fn success() -> Self {
        Self {
            authenticated: true,
            return_code: ConnectReturnCode::Accepted,
        }
    }

    #[must_use]
    pub fn fail(return_code: ConnectReturnCode) -> Self {
        Self {
            authenticated: false,
            return_code,
        }
    }
}

/// Authentication provider trait.
///
/// # Errors
///
/// `authenticate` returns an error only when the check itself cannot run;
/// a rejected credential is a successful check with
/// `authenticated == false`.
pub trait AuthProvider: Send + Sync {
    fn authenticate<'a>(
        &'a self,
        connect: &'a ConnectPacket,
        client_addr: SocketAddr,
    ) -> Pin<Box<dyn Future<Output = Result<AuthResult>> + Send + 'a>>;
}

/// Allow-all provider (development and tests).
#[derive(Debug, Clone, Default)]
pub struct AllowAllAuthProvider;

impl AuthProvider for AllowAllAuthProvider {
    fn authenticate<'a>(
        &'a self,
        _connect: &'a ConnectPacket,
        _client_addr: SocketAddr,
    ) -> Pin<Box<dyn Future<Output = Result<AuthResult>> + Send + 'a>> {
        Box::pin(async move { Ok(AuthResult::success()) })
    }
}

/// Username/password provider backed by an in-memory map, optionally loaded
/// from a file.
///
/// Passwords are stored and compared as plain strings — the credential store
/// this broker replaces worked the same way, and the file format is
/// `username:password` per line with `#` comments.
#[derive(Debug)]
pub struct PasswordAuthProvider {
    users: Arc<RwLock<HashMap<String, String>>>,
    password_file: Option<PathBuf>,
    allow_anonymous: bool,
}

impl PasswordAuthProvider {
    #[must_use]
    pub fn new() -> Self {
        Self {
            users: Arc::new(RwLock::new(HashMap::new())),
            password_file: None,
            allow_anonymous: false,
        }
    }

    /// Creates a provider from a `username:password` file.
    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let provider = Self {
            users: Arc::new(RwLock::new(HashMap::new())),
            password_file: Some(path),
            allow_anonymous: false,
        };
        provider.load_password_file().await?;
        Ok(provider)
    }

    #[must_use]
    pub fn with_anonymous(mut self, allow: bool) -> Self {
        self.allow_anonymous = allow;
        self
    }

    /// Loads or reloads the password file.
    pub async fn load_password_file(&self) -> Result<()> {
        let Some(ref path) = self.password_file else {
            return Ok(());
        };

        let content = fs::read_to_string(path).await.map_err(|e| {
            MqttError::Configuration(format!(
                "Failed to read password file {}: {}",
                path.display(),
                e
            ))
        })?;

        let mut users = HashMap::new();
        for (line_num, line) in content.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let Some((username, password)) = line.split_once(':') else {
                warn!("Invalid format in password file at line {}", line_num + 1);
                continue;
            };
            let username = username.trim();
            if username.is_empty() {
                warn!("Empty username in password file at line {}", line_num + 1);
                continue;
            }
            users.insert(username.to_string(), password.trim().to_string());
        }

        let count = users.len();
        *self.users.write() = users;
        info!(
            "Loaded {} users from password file: {}",
            count,
            path.display()
        );
        Ok(())
    }

    pub fn add_user(&self, username: impl Into<String>, password: impl Into<String>) {
        self.users.write().insert(username.into(), password.into());
    }

    #[must_use]
    pub fn remove_user(&self, username: &str) -> bool {
        self.users.write().remove(username).is_some()
    }

    #[must_use]
    pub fn user_count(&self) -> usize {
        self.users.read().len()
    }

    #[must_use]
    pub fn has_user(&self, username: &str) -> bool {
        self.users.read().contains_key(username)
    }

    fn check(&self, username: &str, password: &str) -> bool {
        self.users
            .read()
            .get(username)
            .is_some_and(|stored| stored == password)
    }
}

impl Default for PasswordAuthProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl AuthProvider for PasswordAuthProvider {
    fn authenticate<'a>(
        &'a self,
        connect: &'a ConnectPacket,
        _client_addr: SocketAddr,
    ) -> Pin<Box<dyn Future<Output = Result<AuthResult>> + Send + 'a>> {
        Box::pin(async move {
            match (&connect.username, &connect.password) {
                (None, None) => {
                    if self.allow_anonymous {
                        debug!("Anonymous connection allowed");
                        Ok(AuthResult::success())
                    } else {
                        debug!("Anonymous connection rejected");
                        Ok(AuthResult::fail(ConnectReturnCode::IdentifierRejected))
                    }
                }
                (Some(username), Some(password)) => {
                    if self.check(username, password) {
                        debug!("Authentication successful for user: {username}");
                        Ok(AuthResult::success())
                    } else {
                        warn!("Authentication failed for user: {username}");
                        Ok(AuthResult::fail(ConnectReturnCode::BadUsernameOrPassword))
                    }
                }
                _ => {
                    warn!("CONNECT carried only one of username/password");
                    Ok(AuthResult::fail(ConnectReturnCode::BadUsernameOrPassword))
                }
            }
        })
    }
}
