use thiserror::Error;

pub type Result<T> = std::result::Result<T, BrokerError>;

#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("Error reading config file: {0}")]
    Config(String),

    #[error("Login failed: {0}")]
    LoginFailed(String),

    #[error("MFA factors not present in response")]
    NoMfaConfigured,

    #[error("No valid mfa configured for your account! (a software TOTP factor is required)")]
    UnsupportedMfaFactor,

    /// A single verification attempt was refused; the caller may prompt again.
    #[error("MFA code rejected: {0}")]
    MfaRejected(String),

    #[error("MFA verification failed after {0} attempts")]
    MfaVerificationFailed(u32),

    #[error("Invalid saml response: {0}")]
    InvalidSamlResponse(String),

    #[error("Error assuming first role: {0}")]
    FirstRoleAssumptionFailed(String),

    #[error("Error assuming second role: {0}")]
    SecondRoleAssumptionFailed(String),

    #[error("credentials not found for {0}")]
    CacheNotFound(String),

    #[error("credentials expired for {0}")]
    CacheExpired(String),

    #[error("failed to persist credentials: {0}")]
    CachePersistFailed(String),

    #[error("secret store error: {0}")]
    SecretStore(String),

    #[error("AWS profile {0} not found")]
    ProfileNotFound(String),

    #[error("aborted")]
    Aborted,

    #[error("failed to launch {0}")]
    Launch(String),

    #[error(transparent)]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl BrokerError {
    /// Cache misses and expired entries are handled by re-authenticating.
    pub fn is_cache_miss(&self) -> bool {
        matches!(
            self,
            BrokerError::CacheNotFound(_) | BrokerError::CacheExpired(_)
        )
    }
}
