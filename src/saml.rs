use std::str::FromStr;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;

use crate::error::{BrokerError, Result};

pub const ROLE_ATTRIBUTE: &str = "https://aws.amazon.com/SAML/Attributes/Role";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AwsRole {
    pub principal_arn: String,
    pub role_arn: String,
}

impl AwsRole {
    pub fn new(principal_arn: String, role_arn: String) -> Self {
        Self {
            principal_arn,
            role_arn,
        }
    }
}

/// Parses a `role,principal` attribute value. Okta emits the pair in either
/// order, so the principal is whichever half names a saml-provider.
impl FromStr for AwsRole {
    type Err = BrokerError;

    fn from_str(s: &str) -> Result<Self> {
        let parts = s.split(',').map(str::trim).collect::<Vec<_>>();
        let (first, second) = match parts.as_slice() {
            [first, second] if !first.is_empty() && !second.is_empty() => (*first, *second),
            _ => {
                return Err(BrokerError::InvalidSamlResponse(format!(
                    "malformed role attribute {:?}",
                    s
                )))
            }
        };

        match (is_provider(first), is_provider(second)) {
            (false, true) => Ok(AwsRole::new(second.to_string(), first.to_string())),
            (true, false) => Ok(AwsRole::new(first.to_string(), second.to_string())),
            _ => Err(BrokerError::InvalidSamlResponse(format!(
                "no single saml-provider in role attribute {:?}",
                s
            ))),
        }
    }
}

fn is_provider(arn: &str) -> bool {
    arn.contains("saml-provider")
}

#[derive(Debug, Clone)]
pub struct SAMLAssertion {
    /// The base64 document exactly as the identity provider returned it.
    pub raw: String,
    pub role: AwsRole,
}

impl SAMLAssertion {
    pub fn from_base64(raw: &str) -> Result<Self> {
        let compact = raw.split_whitespace().collect::<String>();
        let decoded = STANDARD
            .decode(compact.as_bytes())
            .map_err(|e| BrokerError::InvalidSamlResponse(format!("bad base64: {}", e)))?;
        let xml = String::from_utf8(decoded)
            .map_err(|e| BrokerError::InvalidSamlResponse(format!("not utf-8: {}", e)))?;

        log::trace!("saml document: {}", xml);

        let role = extract_role(&xml)?;
        log::debug!(
            "saml role {} via principal {}",
            role.role_arn,
            role.principal_arn
        );

        Ok(SAMLAssertion {
            raw: compact,
            role,
        })
    }

    pub fn role_arn(&self) -> &str {
        &self.role.role_arn
    }

    pub fn principal_arn(&self) -> &str {
        &self.role.principal_arn
    }
}

fn extract_role(xml: &str) -> Result<AwsRole> {
    let doc = roxmltree::Document::parse(xml)
        .map_err(|e| BrokerError::InvalidSamlResponse(format!("bad xml: {}", e)))?;

    let values = doc
        .descendants()
        .filter(|n| n.has_tag_name("Attribute") && n.attribute("Name") == Some(ROLE_ATTRIBUTE))
        .flat_map(|attribute| {
            attribute
                .children()
                .filter(|c| c.has_tag_name("AttributeValue"))
        })
        .map(|value| value.text().unwrap_or_default().trim())
        .collect::<Vec<_>>();

    match values.as_slice() {
        [value] => value.parse(),
        [] => Err(BrokerError::InvalidSamlResponse(
            "no role attribute in assertion".to_string(),
        )),
        many => Err(BrokerError::InvalidSamlResponse(format!(
            "expected one role attribute value, found {}",
            many.len()
        ))),
    }
}
