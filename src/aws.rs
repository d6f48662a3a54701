use std::fmt;

use anyhow::{anyhow, Context};
use aws_config::{BehaviorVersion, Region};
use aws_sdk_sts::config::Credentials;
use aws_sdk_sts::error::DisplayErrorContext;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{BrokerError, Result};
use crate::saml::SAMLAssertion;

pub const SESSION_DURATION_SECONDS: i32 = 3600;
pub const UNKNOWN_USER: &str = "unknown-user";

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AwsCredentialSet {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: String,
    pub expiration: DateTime<Utc>,
}

impl AwsCredentialSet {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expiration
    }

    /// Variables injected into the launched process.
    pub fn environment(&self) -> [(&'static str, &str); 3] {
        [
            ("AWS_ACCESS_KEY_ID", &self.access_key_id),
            ("AWS_SECRET_ACCESS_KEY", &self.secret_access_key),
            ("AWS_SESSION_TOKEN", &self.session_token),
        ]
    }
}

impl fmt::Debug for AwsCredentialSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AwsCredentialSet")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"<redacted>")
            .field("session_token", &"<redacted>")
            .field("expiration", &self.expiration)
            .finish()
    }
}

/// The two STS calls the broker needs.
pub trait StsApi {
    fn assume_role_with_saml(
        &self,
        region: &str,
        role_arn: &str,
        principal_arn: &str,
        saml_assertion: &str,
        duration_seconds: i32,
    ) -> anyhow::Result<AwsCredentialSet>;

    fn assume_role(
        &self,
        region: &str,
        role_arn: &str,
        role_session_name: &str,
        credentials: &AwsCredentialSet,
    ) -> anyhow::Result<AwsCredentialSet>;
}

/// SAML assertion → base account credentials → destination role credentials.
pub struct RoleChain<'a> {
    pub sts: &'a dyn StsApi,
}

impl<'a> RoleChain<'a> {
    pub fn new(sts: &'a dyn StsApi) -> Self {
        Self { sts }
    }

    /// A configured `override_role_arn` wins over the role named in the
    /// assertion; the principal always comes from the assertion.
    pub fn assume_first_role(
        &self,
        region: &str,
        saml: &SAMLAssertion,
        override_role_arn: Option<&str>,
    ) -> Result<AwsCredentialSet> {
        let role_arn = override_role_arn.unwrap_or_else(|| saml.role_arn());
        log::debug!(
            "AssumeRoleWithSAML {} via {} in {}",
            role_arn,
            saml.principal_arn(),
            region
        );

        self.sts
            .assume_role_with_saml(
                region,
                role_arn,
                saml.principal_arn(),
                &saml.raw,
                SESSION_DURATION_SECONDS,
            )
            .map_err(|e| BrokerError::FirstRoleAssumptionFailed(format!("{:#}", e)))
    }

    pub fn assume_destination_role(
        &self,
        region: &str,
        destination_arn: &str,
        first_hop: &AwsCredentialSet,
    ) -> Result<AwsCredentialSet> {
        let session_name = role_session_name();
        log::debug!(
            "AssumeRole {} as {} in {}",
            destination_arn,
            session_name,
            region
        );

        self.sts
            .assume_role(region, destination_arn, &session_name, first_hop)
            .map_err(|e| BrokerError::SecondRoleAssumptionFailed(format!("{:#}", e)))
    }
}

pub fn role_session_name() -> String {
    let user = ["USER", "USERNAME", "LOGNAME"]
        .iter()
        .find_map(|name| std::env::var(name).ok().filter(|v| !v.trim().is_empty()));
    session_name_for(user.as_deref())
}

/// STS accepts `[\w+=,.@-]{2,64}`.
fn session_name_for(user: Option<&str>) -> String {
    let name = user
        .unwrap_or_default()
        .trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || "_+=,.@-".contains(c) {
                c
            } else {
                '-'
            }
        })
        .take(64)
        .collect::<String>();

    if name.len() < 2 {
        UNKNOWN_USER.to_string()
    } else {
        name
    }
}

/// STS over the AWS SDK, driven to completion on a single-threaded runtime so
/// callers stay blocking.
pub struct AwsClient {
    runtime: tokio::runtime::Runtime,
}

impl AwsClient {
    pub fn new() -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        Ok(Self { runtime })
    }
}

impl StsApi for AwsClient {
    fn assume_role_with_saml(
        &self,
        region: &str,
        role_arn: &str,
        principal_arn: &str,
        saml_assertion: &str,
        duration_seconds: i32,
    ) -> anyhow::Result<AwsCredentialSet> {
        self.runtime.block_on(async {
            let config = aws_config::defaults(BehaviorVersion::latest())
                .region(Region::new(region.to_string()))
                .no_credentials()
                .load()
                .await;
            let client = aws_sdk_sts::Client::new(&config);

            let output = client
                .assume_role_with_saml()
                .role_arn(role_arn)
                .principal_arn(principal_arn)
                .saml_assertion(saml_assertion)
                .duration_seconds(duration_seconds)
                .send()
                .await
                .map_err(|e| anyhow!("{}", DisplayErrorContext(&e)))?;

            credential_set(output.credentials())
        })
    }

    fn assume_role(
        &self,
        region: &str,
        role_arn: &str,
        role_session_name: &str,
        credentials: &AwsCredentialSet,
    ) -> anyhow::Result<AwsCredentialSet> {
        let provider = Credentials::new(
            credentials.access_key_id.clone(),
            credentials.secret_access_key.clone(),
            Some(credentials.session_token.clone()),
            None,
            "oktad",
        );

        self.runtime.block_on(async {
            let config = aws_config::defaults(BehaviorVersion::latest())
                .region(Region::new(region.to_string()))
                .credentials_provider(provider)
                .load()
                .await;
            let client = aws_sdk_sts::Client::new(&config);

            let output = client
                .assume_role()
                .role_arn(role_arn)
                .role_session_name(role_session_name)
                .send()
                .await
                .map_err(|e| anyhow!("{}", DisplayErrorContext(&e)))?;

            credential_set(output.credentials())
        })
    }
}

fn credential_set(
    credentials: Option<&aws_sdk_sts::types::Credentials>,
) -> anyhow::Result<AwsCredentialSet> {
    let credentials = credentials.context("STS returned no credentials")?;
    let expiration = credentials.expiration();
    let expiration = DateTime::<Utc>::from_timestamp(expiration.secs(), expiration.subsec_nanos())
        .context("STS returned an out of range expiration")?;

    Ok(AwsCredentialSet {
        access_key_id: credentials.access_key_id().to_string(),
        secret_access_key: credentials.secret_access_key().to_string(),
        session_token: credentials.session_token().to_string(),
        expiration,
    })
}
