//! The broker run: cache check, Okta login, role assumption, cache write,
//! launch.

use crate::aws::{AwsCredentialSet, RoleChain, StsApi};
use crate::aws_profile::{AwsConfigFile, AwsProfile};
use crate::cache::{CredentialCache, BASE_PROFILE_KEY};
use crate::error::{BrokerError, Result};
use crate::identity_provider::IdentityProvider;
use crate::launch::Launcher;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunRequest {
    pub profile: String,
    pub command: Vec<String>,
    /// Skip the cache lookup and always authenticate.
    pub force_refresh: bool,
}

/// Where the final credentials come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    /// Both hops: the profile's destination role.
    Destination(AwsProfile),
    /// The profile did not resolve, so the first-hop credentials are final.
    BaseOnly { region: String },
}

impl Target {
    pub fn cache_key(&self) -> &str {
        match self {
            Target::Destination(profile) => &profile.name,
            Target::BaseOnly { .. } => BASE_PROFILE_KEY,
        }
    }

    pub fn region(&self) -> &str {
        match self {
            Target::Destination(profile) => &profile.region,
            Target::BaseOnly { region } => region,
        }
    }
}

pub struct Broker<'a> {
    pub identity_provider: &'a dyn IdentityProvider,
    pub sts: &'a dyn StsApi,
    pub cache: &'a CredentialCache<'a>,
    pub launcher: &'a dyn Launcher,
    pub aws_config: &'a AwsConfigFile,
    /// Role ARN that replaces the one in the SAML assertion.
    pub user_arn: Option<String>,
}

impl<'a> Broker<'a> {
    pub fn resolve_target(&self, profile: &str) -> Result<Target> {
        match self.aws_config.resolve(profile) {
            Ok(profile) => Ok(Target::Destination(profile)),
            Err(BrokerError::ProfileNotFound(name)) => {
                log::info!(
                    "AWS profile {} not found, using base account credentials",
                    name
                );
                Ok(Target::BaseOnly {
                    region: self.aws_config.default_region(),
                })
            }
            Err(e) => Err(e),
        }
    }

    /// Cached credentials when still valid, otherwise a full login and role
    /// assumption. Nothing is cached unless every step succeeded.
    pub fn credentials(&self, profile: &str, force_refresh: bool) -> Result<AwsCredentialSet> {
        let target = self.resolve_target(profile)?;
        let key = target.cache_key();

        if force_refresh {
            log::debug!("forced refresh, ignoring cache for {}", key);
        } else {
            match self.cache.load(key) {
                Ok(credentials) => {
                    log::info!("using cached credentials for {}", key);
                    return Ok(credentials);
                }
                Err(e) if e.is_cache_miss() => log::debug!("{}", e),
                Err(e) => log::warn!("credential cache unavailable: {}", e),
            }
        }

        let saml = self.identity_provider.get_saml_assertion()?;

        let chain = RoleChain::new(self.sts);
        let first_hop =
            chain.assume_first_role(target.region(), &saml, self.user_arn.as_deref())?;
        let credentials = match &target {
            Target::Destination(profile) => {
                chain.assume_destination_role(&profile.region, &profile.role_arn, &first_hop)?
            }
            Target::BaseOnly { .. } => first_hop,
        };

        if let Err(e) = self.cache.store(key, &credentials) {
            log::warn!("{}", e);
        }

        Ok(credentials)
    }

    pub fn run(&self, request: &RunRequest) -> Result<i32> {
        let credentials = self.credentials(&request.profile, request.force_refresh)?;
        self.launcher.launch(&request.command, &credentials)
    }
}
