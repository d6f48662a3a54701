use std::collections::HashMap;
use std::path::{Path, PathBuf};

use config::{Config, File, FileFormat};

use crate::error::{BrokerError, Result};

const LOCAL_CONFIG: &str = ".okta";
const GLOBAL_CONFIG: &str = ".okta-aws/config";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OktaConfig {
    /// Okta org URL, always ending in `/`.
    pub base_url: String,
    pub app_url: String,
    /// Replaces the role ARN found in the SAML assertion.
    pub user_arn: Option<String>,
    pub require_mfa: bool,
    pub remember_credentials: bool,
}

impl OktaConfig {
    /// Loads the first config file found: `explicit`, `./.okta`, then
    /// `~/.okta-aws/config`.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let path = find_config(explicit)?;
        log::debug!("loading {}", path.display());

        let settings = Config::builder()
            .add_source(File::from(path.as_path()).format(FileFormat::Ini))
            .build()
            .map_err(|e| BrokerError::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_settings(settings)
    }

    pub fn from_ini_str(content: &str) -> Result<Self> {
        let settings = Config::builder()
            .add_source(File::from_str(content, FileFormat::Ini))
            .build()
            .map_err(|e| BrokerError::Config(e.to_string()))?;
        Self::from_settings(settings)
    }

    fn from_settings(settings: Config) -> Result<Self> {
        let sections = settings
            .try_deserialize::<HashMap<String, HashMap<String, String>>>()
            .map_err(|e| BrokerError::Config(e.to_string()))?;

        let okta = sections
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case("okta"))
            .map(|(_, section)| section)
            .ok_or_else(|| BrokerError::Config("missing [okta] section".to_string()))?;

        // INI keys may come back lowercased depending on the loader
        let get = |key: &str| {
            okta.iter()
                .find(|(k, _)| k.eq_ignore_ascii_case(key))
                .map(|(_, v)| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let required = |key: &str| {
            get(key).ok_or_else(|| BrokerError::Config(format!("missing okta.{}", key)))
        };

        let mut base_url = required("baseUrl")?;
        if !base_url.ends_with('/') {
            base_url.push('/');
        }

        Ok(OktaConfig {
            base_url,
            app_url: required("appUrl")?,
            user_arn: get("userArn"),
            require_mfa: flag(get("requireMfa"), "requireMfa", true)?,
            remember_credentials: flag(get("rememberCredentials"), "rememberCredentials", true)?,
        })
    }
}

fn flag(value: Option<String>, key: &str, default: bool) -> Result<bool> {
    match value.as_deref().map(str::to_ascii_lowercase).as_deref() {
        None => Ok(default),
        Some("true" | "yes" | "on" | "1") => Ok(true),
        Some("false" | "no" | "off" | "0") => Ok(false),
        Some(other) => Err(BrokerError::Config(format!(
            "okta.{} must be true or false, not {:?}",
            key, other
        ))),
    }
}

fn find_config(explicit: Option<&Path>) -> Result<PathBuf> {
    let mut candidates = Vec::new();
    if let Some(path) = explicit {
        candidates.push(path.to_path_buf());
    }
    if let Ok(cwd) = std::env::current_dir() {
        candidates.push(cwd.join(LOCAL_CONFIG));
    }
    if let Some(home) = dirs::home_dir() {
        candidates.push(home.join(GLOBAL_CONFIG));
    }

    for candidate in &candidates {
        if candidate.is_file() {
            return Ok(candidate.clone());
        }
        log::debug!("no config at {}", candidate.display());
    }

    Err(BrokerError::Config("Config file is not found.".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn parses_okta_section() {
        let config = OktaConfig::from_ini_str(
            "[okta]\n\
             baseUrl = https://example.okta.com\n\
             appUrl = https://example.okta.com/home/amazon_aws/0oa1/272\n\
             userArn = arn:aws:iam::111111111111:role/Override\n\
             requireMfa = false\n",
        )
        .unwrap();

        assert_eq!(
            config,
            OktaConfig {
                base_url: "https://example.okta.com/".to_string(),
                app_url: "https://example.okta.com/home/amazon_aws/0oa1/272".to_string(),
                user_arn: Some("arn:aws:iam::111111111111:role/Override".to_string()),
                require_mfa: false,
                remember_credentials: true,
            }
        );
    }

    #[test]
    fn defaults() {
        let config = OktaConfig::from_ini_str(
            "[okta]\nbaseUrl=https://example.okta.com/\nappUrl=https://example.okta.com/app\n",
        )
        .unwrap();

        assert_eq!(config.base_url, "https://example.okta.com/");
        assert_eq!(config.user_arn, None);
        assert!(config.require_mfa);
        assert!(config.remember_credentials);
    }

    #[test]
    fn missing_keys() {
        assert!(matches!(
            OktaConfig::from_ini_str("[okta]\nbaseUrl=https://example.okta.com\n"),
            Err(BrokerError::Config(_))
        ));
        assert!(matches!(
            OktaConfig::from_ini_str("[other]\nbaseUrl=https://example.okta.com\n"),
            Err(BrokerError::Config(_))
        ));
    }

    #[test]
    fn bad_flag() {
        assert!(matches!(
            OktaConfig::from_ini_str(
                "[okta]\nbaseUrl=https://a.okta.com\nappUrl=https://a.okta.com/x\nrequireMfa=maybe\n"
            ),
            Err(BrokerError::Config(_))
        ));
    }

    #[test]
    fn explicit_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("oktad.ini");
        std::fs::write(
            &path,
            "[okta]\nbaseUrl=https://awebsite.com\nappUrl=https://awebsite.com/stuff\n",
        )
        .unwrap();

        let config = OktaConfig::load(Some(&path)).unwrap();
        assert_eq!(config.base_url, "https://awebsite.com/");
        assert_eq!(config.app_url, "https://awebsite.com/stuff");
    }
}
