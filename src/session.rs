//! Okta state kept between runs: the `sid` session cookie and, optionally,
//! the username/password used for automatic login.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::secret_store::SecretStore;
use crate::APP_NAME;

pub const SESSION_COOKIE_KEY: &str = "__oktad_session_cookie";
pub const LOGIN_CREDENTIALS_KEY: &str = "__oktad_login_credentials";

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginCredentials {
    pub username: String,
    pub password: String,
}

impl LoginCredentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for LoginCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoginCredentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Every write here is fire-and-forget: a failure is logged and the login
/// flow carries on.
pub struct SessionStore<'a> {
    store: &'a dyn SecretStore,
}

impl<'a> SessionStore<'a> {
    pub fn new(store: &'a dyn SecretStore) -> Self {
        Self { store }
    }

    pub fn cookie(&self) -> Option<String> {
        self.read(SESSION_COOKIE_KEY)
    }

    pub fn save_cookie(&self, cookie: &str) {
        self.write(SESSION_COOKIE_KEY, cookie);
    }

    pub fn forget_cookie(&self) {
        self.remove(SESSION_COOKIE_KEY);
    }

    pub fn login(&self) -> Option<LoginCredentials> {
        let stored = self.read(LOGIN_CREDENTIALS_KEY)?;
        match serde_json::from_str(&stored) {
            Ok(login) => Some(login),
            Err(e) => {
                log::warn!("discarding unreadable stored login: {}", e);
                None
            }
        }
    }

    pub fn save_login(&self, login: &LoginCredentials) {
        match serde_json::to_string(login) {
            Ok(json) => self.write(LOGIN_CREDENTIALS_KEY, &json),
            Err(e) => log::warn!("could not encode login: {}", e),
        }
    }

    pub fn forget_login(&self) {
        self.remove(LOGIN_CREDENTIALS_KEY);
    }

    fn read(&self, key: &str) -> Option<String> {
        match self.store.get(APP_NAME, key) {
            Ok(value) => value.filter(|v| !v.is_empty()),
            Err(e) => {
                log::warn!("could not read {}: {}", key, e);
                None
            }
        }
    }

    fn write(&self, key: &str, value: &str) {
        if let Err(e) = self.store.replace(APP_NAME, key, value) {
            log::warn!("could not save {}: {}", key, e);
        }
    }

    fn remove(&self, key: &str) {
        if let Err(e) = self.store.delete(APP_NAME, key) {
            log::warn!("could not delete {}: {}", key, e);
        }
    }
}
