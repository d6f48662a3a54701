//! Best-effort mirror of broker credentials into the AWS CLI credentials file.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use configparser::ini::Ini;
use fs2::FileExt;

use crate::aws::AwsCredentialSet;
use crate::error::Result;

pub const CREDENTIALS_FILE_ENV: &str = "AWS_SHARED_CREDENTIALS_FILE";

pub struct CredentialsFile {
    path: PathBuf,
}

impl CredentialsFile {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn default_location() -> Option<PathBuf> {
        match std::env::var(CREDENTIALS_FILE_ENV) {
            Ok(path) if !path.trim().is_empty() => Some(PathBuf::from(path)),
            _ => dirs::home_dir().map(|home| home.join(".aws").join("credentials")),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Replaces `[profile]` and leaves every other section alone. Holds an
    /// exclusive lock on `<file>.lock` for the whole read-modify-write.
    pub fn write_profile(&self, profile: &str, credentials: &AwsCredentialSet) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        let lock_file = File::create(self.path.with_extension("lock"))?;
        lock_file.lock_exclusive()?;

        let mut ini = Ini::new_cs();
        if self.path.exists() {
            ini.load(&self.path)
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        }

        let values = [
            ("aws_access_key_id", credentials.access_key_id.clone()),
            ("aws_secret_access_key", credentials.secret_access_key.clone()),
            ("aws_session_token", credentials.session_token.clone()),
            ("expiration", credentials.expiration.to_rfc3339()),
        ];
        for (key, value) in values {
            ini.set(profile, key, Some(value));
        }

        let temp_path = self.path.with_extension("tmp");
        let mut temp = private_file(&temp_path)?;
        temp.write_all(ini.writes().as_bytes())?;
        temp.sync_all()?;
        drop(temp);
        fs::rename(&temp_path, &self.path)?;

        log::debug!("wrote [{}] to {}", profile, self.path.display());
        Ok(())
    }
}

/// Session tokens go in here, so only the owner may read it.
fn private_file(path: &Path) -> io::Result<File> {
    let mut options = OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }

    let file = options.open(path)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        // a leftover temp file keeps its old mode
        file.set_permissions(fs::Permissions::from_mode(0o600))?;
    }
    Ok(file)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use tempfile::TempDir;

    fn creds(id: &str) -> AwsCredentialSet {
        AwsCredentialSet {
            access_key_id: id.to_string(),
            secret_access_key: "c2VjcmV0+/==".to_string(),
            session_token: "FwoGZXIvYXdzEJr//////////wEaDA==".to_string(),
            expiration: Utc.with_ymd_and_hms(2030, 5, 1, 12, 0, 0).unwrap(),
        }
    }

    fn read(path: &Path) -> Ini {
        let mut ini = Ini::new_cs();
        ini.load(path).unwrap();
        ini
    }

    #[test]
    fn keeps_other_profiles() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("credentials");
        fs::write(
            &path,
            "[personal]\naws_access_key_id = AKIAPERSONAL\naws_secret_access_key = abc\n",
        )
        .unwrap();

        let file = CredentialsFile::new(path.clone());
        file.write_profile("prod", &creds("ASIAPROD")).unwrap();

        let ini = read(&path);
        assert_eq!(
            ini.get("personal", "aws_access_key_id").as_deref(),
            Some("AKIAPERSONAL")
        );
        assert_eq!(ini.get("prod", "aws_access_key_id").as_deref(), Some("ASIAPROD"));
        assert_eq!(
            ini.get("prod", "aws_session_token").as_deref(),
            Some("FwoGZXIvYXdzEJr//////////wEaDA==")
        );
        assert_eq!(
            ini.get("prod", "expiration").as_deref(),
            Some("2030-05-01T12:00:00+00:00")
        );
    }

    #[test]
    fn overwrites_existing_profile() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(".aws").join("credentials");

        let file = CredentialsFile::new(path.clone());
        file.write_profile("prod", &creds("OLD")).unwrap();
        file.write_profile("prod", &creds("NEW")).unwrap();

        assert_eq!(
            read(&path).get("prod", "aws_access_key_id").as_deref(),
            Some("NEW")
        );
    }

    #[cfg(unix)]
    #[test]
    fn mirror_is_private() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let path = dir.path().join("credentials");
        fs::write(&path, "[personal]\naws_access_key_id = AKIAPERSONAL\n").unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o600)).unwrap();
        fs::write(path.with_extension("tmp"), "stale").unwrap();
        fs::set_permissions(path.with_extension("tmp"), fs::Permissions::from_mode(0o644))
            .unwrap();

        CredentialsFile::new(path.clone())
            .write_profile("prod", &creds("ASIAPROD"))
            .unwrap();
        let fresh = dir.path().join("new").join("credentials");
        CredentialsFile::new(fresh.clone())
            .write_profile("prod", &creds("ASIAPROD"))
            .unwrap();

        for written in [path, fresh] {
            let mode = fs::metadata(&written).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o600, "{}", written.display());
        }
    }

    #[test]
    fn concurrent_writers_keep_every_profile() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("credentials");
        let profiles = (0..8).map(|i| format!("profile-{}", i)).collect::<Vec<_>>();

        std::thread::scope(|scope| {
            for profile in &profiles {
                let path = path.clone();
                scope.spawn(move || {
                    let file = CredentialsFile::new(path);
                    for _ in 0..5 {
                        file.write_profile(profile, &creds(profile)).unwrap();
                    }
                });
            }
        });

        let ini = read(&path);
        for profile in &profiles {
            assert_eq!(
                ini.get(profile, "aws_access_key_id").as_deref(),
                Some(profile.as_str())
            );
        }
    }
}
