use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::aws::AwsCredentialSet;
use crate::credentials_file::CredentialsFile;
use crate::error::{BrokerError, Result};
use crate::secret_store::SecretStore;
use crate::APP_NAME;

/// Cache key used when the requested profile does not resolve and only the
/// first hop was assumed.
pub const BASE_PROFILE_KEY: &str = "__oktad_base_credentials";

const RECORD_VERSION: u32 = 1;

#[derive(Serialize, Deserialize)]
struct CacheRecord {
    version: u32,
    credentials: AwsCredentialSet,
}

pub struct CredentialCache<'a> {
    store: &'a dyn SecretStore,
    mirror: Option<CredentialsFile>,
}

impl<'a> CredentialCache<'a> {
    pub fn new(store: &'a dyn SecretStore) -> Self {
        Self {
            store,
            mirror: None,
        }
    }

    /// Also write stored credentials into an AWS CLI credentials file.
    pub fn with_mirror(mut self, mirror: CredentialsFile) -> Self {
        self.mirror = Some(mirror);
        self
    }

    pub fn load(&self, profile_key: &str) -> Result<AwsCredentialSet> {
        self.load_at(profile_key, Utc::now())
    }

    /// Expired records are reported but left in place; the next `store`
    /// replaces them.
    pub fn load_at(&self, profile_key: &str, now: DateTime<Utc>) -> Result<AwsCredentialSet> {
        let encoded = self
            .store
            .get(APP_NAME, profile_key)?
            .ok_or_else(|| BrokerError::CacheNotFound(profile_key.to_string()))?;

        let record = match decode(&encoded) {
            Ok(record) => record,
            Err(e) => {
                log::warn!("ignoring unreadable cache entry for {}: {}", profile_key, e);
                return Err(BrokerError::CacheNotFound(profile_key.to_string()));
            }
        };

        if record.credentials.is_expired_at(now) {
            log::debug!(
                "cached credentials for {} expired at {}",
                profile_key,
                record.credentials.expiration
            );
            return Err(BrokerError::CacheExpired(profile_key.to_string()));
        }

        Ok(record.credentials)
    }

    /// Overwrites whatever was stored for `profile_key`. The credentials-file
    /// mirror is best-effort and is written even when the secret store refuses
    /// the record; only the secret store's failure is returned.
    pub fn store(&self, profile_key: &str, credentials: &AwsCredentialSet) -> Result<()> {
        let saved = encode(credentials).and_then(|encoded| {
            self.store
                .replace(APP_NAME, profile_key, &encoded)
                .map_err(|e| BrokerError::CachePersistFailed(e.to_string()))
        });

        if let Some(mirror) = &self.mirror {
            if let Err(e) = mirror.write_profile(profile_key, credentials) {
                log::warn!(
                    "could not update {}: {}",
                    mirror.path().display(),
                    e
                );
            }
        }

        saved?;
        log::debug!(
            "cached credentials for {} until {}",
            profile_key,
            credentials.expiration
        );
        Ok(())
    }
}

fn encode(credentials: &AwsCredentialSet) -> Result<String> {
    let json = serde_json::to_vec(&CacheRecord {
        version: RECORD_VERSION,
        credentials: credentials.clone(),
    })
    .map_err(|e| BrokerError::CachePersistFailed(e.to_string()))?;
    Ok(STANDARD.encode(json))
}

fn decode(encoded: &str) -> anyhow::Result<CacheRecord> {
    let json = STANDARD.decode(encoded.trim())?;
    let record: CacheRecord = serde_json::from_slice(&json)?;
    anyhow::ensure!(
        record.version == RECORD_VERSION,
        "unsupported record version {}",
        record.version
    );
    Ok(record)
}
