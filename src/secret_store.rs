//! Secret storage backends keyed by `(service, account)`.
//!
//! The OS keychain is preferred; a JSON file under the user's home directory
//! is the fallback for machines without a usable keychain.

use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::fs::{self, File};
use std::io;
use std::path::PathBuf;

use fs2::FileExt;

use crate::error::{BrokerError, Result};

pub trait SecretStore {
    fn add(&self, service: &str, account: &str, secret: &str) -> Result<()>;

    /// `Ok(None)` when nothing is stored for the key.
    fn get(&self, service: &str, account: &str) -> Result<Option<String>>;

    fn delete(&self, service: &str, account: &str) -> Result<()>;

    /// Delete-then-add. The key may not exist yet, so the delete result is ignored.
    fn replace(&self, service: &str, account: &str, secret: &str) -> Result<()> {
        if let Err(e) = self.delete(service, account) {
            log::debug!("ignoring delete failure for {}/{}: {}", service, account, e);
        }
        self.add(service, account, secret)
    }
}

/// Picks the keychain when it answers, the secrets file otherwise.
pub fn open_default_store() -> Result<Box<dyn SecretStore>> {
    let keyring = KeyringStore;
    if keyring.is_available() {
        return Ok(Box::new(keyring));
    }

    let path = FileStore::default_location().ok_or_else(|| {
        BrokerError::SecretStore("unable to determine home directory".to_string())
    })?;
    log::warn!(
        "system keychain unavailable, storing secrets in {}",
        path.display()
    );
    Ok(Box::new(FileStore::new(path)))
}

pub struct KeyringStore;

impl KeyringStore {
    fn entry(service: &str, account: &str) -> Result<keyring::Entry> {
        keyring::Entry::new(service, account)
            .map_err(|e| BrokerError::SecretStore(format!("failed to access keychain: {}", e)))
    }

    /// A lookup that fails with anything other than "no entry" means there is
    /// no keychain to talk to.
    pub fn is_available(&self) -> bool {
        match Self::entry(crate::APP_NAME, "__oktad_probe").map(|e| e.get_password()) {
            Ok(Ok(_)) | Ok(Err(keyring::Error::NoEntry)) => true,
            Ok(Err(e)) => {
                log::debug!("keychain probe failed: {}", e);
                false
            }
            Err(_) => false,
        }
    }
}

impl SecretStore for KeyringStore {
    fn add(&self, service: &str, account: &str, secret: &str) -> Result<()> {
        Self::entry(service, account)?
            .set_password(secret)
            .map_err(|e| BrokerError::SecretStore(format!("failed to store secret: {}", e)))
    }

    fn get(&self, service: &str, account: &str) -> Result<Option<String>> {
        match Self::entry(service, account)?.get_password() {
            Ok(secret) => Ok(Some(secret)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(BrokerError::SecretStore(format!(
                "failed to read secret: {}",
                e
            ))),
        }
    }

    fn delete(&self, service: &str, account: &str) -> Result<()> {
        match Self::entry(service, account)?.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(BrokerError::SecretStore(format!(
                "failed to delete secret: {}",
                e
            ))),
        }
    }
}

/// Legacy file-backed store: one JSON object mapping `service/account` to the
/// secret. Every mutation is a locked whole-file read-modify-write.
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn default_location() -> Option<PathBuf> {
        dirs::home_dir().map(|home| home.join(".okta-aws").join("secrets.json"))
    }

    fn key(service: &str, account: &str) -> String {
        format!("{}/{}", service, account)
    }

    fn read(&self) -> Result<BTreeMap<String, String>> {
        match fs::read_to_string(&self.path) {
            Ok(content) if content.trim().is_empty() => Ok(BTreeMap::new()),
            Ok(content) => serde_json::from_str(&content).map_err(|e| {
                BrokerError::SecretStore(format!("corrupt {}: {}", self.path.display(), e))
            }),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(e) => Err(e.into()),
        }
    }

    fn update<F>(&self, change: F) -> Result<()>
    where
        F: FnOnce(&mut BTreeMap<String, String>),
    {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        let lock_file = File::create(self.path.with_extension("lock"))?;
        lock_file.lock_exclusive()?;

        let mut secrets = self.read()?;
        change(&mut secrets);

        let json = serde_json::to_string_pretty(&secrets)
            .map_err(|e| BrokerError::SecretStore(e.to_string()))?;
        let temp_path = self.path.with_extension("json.tmp");
        fs::write(&temp_path, json)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&temp_path, fs::Permissions::from_mode(0o600))?;
        }

        fs::rename(&temp_path, &self.path)?;
        Ok(())
    }
}

impl SecretStore for FileStore {
    fn add(&self, service: &str, account: &str, secret: &str) -> Result<()> {
        self.update(|secrets| {
            secrets.insert(Self::key(service, account), secret.to_string());
        })
    }

    fn get(&self, service: &str, account: &str) -> Result<Option<String>> {
        Ok(self.read()?.remove(&Self::key(service, account)))
    }

    fn delete(&self, service: &str, account: &str) -> Result<()> {
        self.update(|secrets| {
            secrets.remove(&Self::key(service, account));
        })
    }
}

/// Process-local store, handy for tests and dry runs.
#[derive(Default)]
pub struct MemoryStore {
    secrets: RefCell<HashMap<(String, String), String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.secrets.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.secrets.borrow().is_empty()
    }
}

impl SecretStore for MemoryStore {
    fn add(&self, service: &str, account: &str, secret: &str) -> Result<()> {
        self.secrets
            .borrow_mut()
            .insert((service.to_string(), account.to_string()), secret.to_string());
        Ok(())
    }

    fn get(&self, service: &str, account: &str) -> Result<Option<String>> {
        Ok(self
            .secrets
            .borrow()
            .get(&(service.to_string(), account.to_string()))
            .cloned())
    }

    fn delete(&self, service: &str, account: &str) -> Result<()> {
        self.secrets
            .borrow_mut()
            .remove(&(service.to_string(), account.to_string()));
        Ok(())
    }
}
