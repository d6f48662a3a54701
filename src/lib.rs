pub mod aws;
pub mod aws_profile;
pub mod broker;
pub mod cache;
pub mod credentials_file;
pub mod error;
pub mod http_client;
pub mod identity_provider;
pub mod interrupt;
pub mod launch;
pub mod okta;
pub mod saml;
pub mod secret_store;
pub mod session;
pub mod settings;
pub mod ui;

pub use error::{BrokerError, Result};

/// Service name for every secret the broker keeps.
pub const APP_NAME: &str = "oktad";
