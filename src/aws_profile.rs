//! Lookup of destination roles in the AWS CLI config file.

use std::path::{Path, PathBuf};

use configparser::ini::Ini;

use crate::error::{BrokerError, Result};

pub const AWS_CONFIG_FILE_ENV: &str = "AWS_CONFIG_FILE";
pub const DEFAULT_REGION: &str = "us-east-1";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AwsProfile {
    pub name: String,
    /// The destination role assumed with the first-hop credentials.
    pub role_arn: String,
    pub region: String,
}

pub struct AwsConfigFile {
    ini: Ini,
}

impl AwsConfigFile {
    pub fn default_location() -> Option<PathBuf> {
        match std::env::var(AWS_CONFIG_FILE_ENV) {
            Ok(path) if !path.trim().is_empty() => Some(PathBuf::from(path)),
            _ => dirs::home_dir().map(|home| home.join(".aws").join("config")),
        }
    }

    /// A missing file is an empty config: every profile is then unresolved.
    pub fn load(path: &Path) -> Result<Self> {
        let mut ini = Ini::new_cs();
        if path.is_file() {
            ini.load(path).map_err(|e| {
                BrokerError::Config(format!("unable to read {}: {}", path.display(), e))
            })?;
        } else {
            log::debug!("no AWS config at {}", path.display());
        }
        Ok(Self { ini })
    }

    pub fn from_ini_str(content: &str) -> Result<Self> {
        let mut ini = Ini::new_cs();
        ini.read(content.to_string())
            .map_err(|e| BrokerError::Config(format!("invalid AWS config: {}", e)))?;
        Ok(Self { ini })
    }

    pub fn empty() -> Self {
        Self { ini: Ini::new_cs() }
    }

    fn section_names(profile: &str) -> Vec<String> {
        let mut names = vec![format!("profile {}", profile)];
        if profile == "default" {
            names.push("default".to_string());
        }
        names
    }

    fn get(&self, profile: &str, key: &str) -> Option<String> {
        Self::section_names(profile)
            .iter()
            .find_map(|section| self.ini.get(section, key))
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
    }

    /// A profile resolves only when it names a `role_arn` to assume.
    pub fn resolve(&self, profile: &str) -> Result<AwsProfile> {
        let role_arn = self
            .get(profile, "role_arn")
            .ok_or_else(|| BrokerError::ProfileNotFound(profile.to_string()))?;

        Ok(AwsProfile {
            name: profile.to_string(),
            role_arn,
            region: self
                .get(profile, "region")
                .unwrap_or_else(|| self.default_region()),
        })
    }

    pub fn default_region(&self) -> String {
        self.get("default", "region")
            .unwrap_or_else(|| DEFAULT_REGION.to_string())
    }
}
