#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{Duration, Utc};

use oktad::aws::{AwsCredentialSet, StsApi};
use oktad::launch::Launcher;
use oktad::okta::{LoginState, MfaFactor, OktaApi, SamlPage, TOTP_FACTOR_TYPE};
use oktad::saml::SAMLAssertion;
use oktad::session::LoginCredentials;
use oktad::ui::UI;
use oktad::{BrokerError, Result};

pub const BASE_ROLE: &str = "arn:aws:iam::111111111111:role/OktaBase";
pub const PROVIDER: &str = "arn:aws:iam::111111111111:saml-provider/Okta";
pub const DEST_ROLE: &str = "arn:aws:iam::222222222222:role/Deploy";
pub const CORRECT_CODE: &str = "246810";

pub const AWS_CONFIG: &str = "\
[default]
region = us-east-1

[profile prod]
role_arn = arn:aws:iam::222222222222:role/Deploy
region = us-west-2
";

pub fn saml_xml(role_value: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<saml2p:Response xmlns:saml2p="urn:oasis:names:tc:SAML:2.0:protocol" Destination="https://signin.aws.amazon.com/saml">
  <saml2:Assertion xmlns:saml2="urn:oasis:names:tc:SAML:2.0:assertion">
    <saml2:AttributeStatement>
      <saml2:Attribute Name="https://aws.amazon.com/SAML/Attributes/Role" NameFormat="urn:oasis:names:tc:SAML:2.0:attrname-format:uri">
        <saml2:AttributeValue>{}</saml2:AttributeValue>
      </saml2:Attribute>
    </saml2:AttributeStatement>
  </saml2:Assertion>
</saml2p:Response>"#,
        role_value
    )
}

pub fn saml_base64() -> String {
    STANDARD.encode(saml_xml(&format!("{},{}", BASE_ROLE, PROVIDER)))
}

pub fn assertion() -> SAMLAssertion {
    SAMLAssertion::from_base64(&saml_base64()).unwrap()
}

pub fn credentials(id: &str) -> AwsCredentialSet {
    AwsCredentialSet {
        access_key_id: id.to_string(),
        secret_access_key: format!("{}-secret", id),
        session_token: format!("{}-token", id),
        expiration: Utc::now() + Duration::hours(1),
    }
}

pub fn jdoe() -> LoginCredentials {
    LoginCredentials::new("jdoe@example.com", "correct horse")
}

/// Okta stand-in that counts every call it receives.
pub struct FakeOkta {
    pub logins: Cell<u32>,
    pub verifications: Cell<u32>,
    pub token_fetches: Cell<u32>,
    pub cookie_fetches: Cell<u32>,
}

impl FakeOkta {
    pub fn new() -> Self {
        Self {
            logins: Cell::new(0),
            verifications: Cell::new(0),
            token_fetches: Cell::new(0),
            cookie_fetches: Cell::new(0),
        }
    }

    pub fn calls(&self) -> u32 {
        self.logins.get()
            + self.verifications.get()
            + self.token_fetches.get()
            + self.cookie_fetches.get()
    }
}

impl OktaApi for FakeOkta {
    fn login(&self, credentials: &LoginCredentials) -> Result<LoginState> {
        self.logins.set(self.logins.get() + 1);
        if credentials != &jdoe() {
            return Err(BrokerError::LoginFailed(
                "authentication returned status 401".to_string(),
            ));
        }
        Ok(LoginState::MfaRequired {
            state_token: "00state".to_string(),
            factors: vec![MfaFactor {
                id: "uft1".to_string(),
                factor_type: TOTP_FACTOR_TYPE.to_string(),
                provider: "GOOGLE".to_string(),
                verify_link: "https://example.okta.com/api/v1/authn/factors/uft1/verify"
                    .to_string(),
            }],
        })
    }

    fn verify_mfa(&self, _state_token: &str, _factor: &MfaFactor, code: &str) -> Result<String> {
        self.verifications.set(self.verifications.get() + 1);
        if code == CORRECT_CODE {
            Ok("20session".to_string())
        } else {
            Err(BrokerError::MfaRejected("status_code: 403".to_string()))
        }
    }

    fn fetch_saml_via_token(&self, _session_token: &str) -> Result<SamlPage> {
        self.token_fetches.set(self.token_fetches.get() + 1);
        Ok(SamlPage {
            assertion: assertion(),
            session_cookie: Some("102sid".to_string()),
        })
    }

    fn fetch_saml_via_cookie(&self, _cookie: &str) -> Result<SAMLAssertion> {
        self.cookie_fetches.set(self.cookie_fetches.get() + 1);
        Err(BrokerError::InvalidSamlResponse(
            "no SAMLResponse in page".to_string(),
        ))
    }
}

#[derive(Default)]
pub struct FakeSts {
    pub saml_calls: RefCell<Vec<String>>,
    pub role_calls: RefCell<Vec<(String, String)>>,
    pub fail_second_hop: bool,
}

impl StsApi for FakeSts {
    fn assume_role_with_saml(
        &self,
        _region: &str,
        role_arn: &str,
        principal_arn: &str,
        saml_assertion: &str,
        duration_seconds: i32,
    ) -> anyhow::Result<AwsCredentialSet> {
        assert_eq!(principal_arn, PROVIDER);
        assert_eq!(saml_assertion, saml_base64());
        assert_eq!(duration_seconds, 3600);
        self.saml_calls.borrow_mut().push(role_arn.to_string());
        Ok(credentials("ASIAFIRST"))
    }

    fn assume_role(
        &self,
        _region: &str,
        role_arn: &str,
        _role_session_name: &str,
        credentials: &AwsCredentialSet,
    ) -> anyhow::Result<AwsCredentialSet> {
        self.role_calls
            .borrow_mut()
            .push((role_arn.to_string(), credentials.access_key_id.clone()));
        if self.fail_second_hop {
            anyhow::bail!("AccessDenied: User is not authorized to perform: sts:AssumeRole");
        }
        Ok(self::credentials("ASIAFINAL"))
    }
}

#[derive(Default)]
pub struct RecordingLauncher {
    pub launches: RefCell<Vec<(Vec<String>, AwsCredentialSet)>>,
}

impl Launcher for RecordingLauncher {
    fn launch(&self, command: &[String], credentials: &AwsCredentialSet) -> Result<i32> {
        self.launches
            .borrow_mut()
            .push((command.to_vec(), credentials.clone()));
        Ok(0)
    }
}

pub struct ScriptedUI {
    pub login: Option<LoginCredentials>,
    pub codes: RefCell<VecDeque<String>>,
    pub login_prompts: Cell<u32>,
    pub code_prompts: Cell<u32>,
    pub errors: RefCell<Vec<String>>,
}

impl ScriptedUI {
    pub fn new(login: Option<LoginCredentials>, codes: &[&str]) -> Self {
        Self {
            login,
            codes: RefCell::new(codes.iter().map(|c| c.to_string()).collect()),
            login_prompts: Cell::new(0),
            code_prompts: Cell::new(0),
            errors: RefCell::new(Vec::new()),
        }
    }

    pub fn silent() -> Self {
        Self::new(None, &[])
    }
}

impl UI for ScriptedUI {
    fn get_username_and_password(&self) -> Result<LoginCredentials> {
        self.login_prompts.set(self.login_prompts.get() + 1);
        self.login.clone().ok_or(BrokerError::Aborted)
    }

    fn get_mfa_code(&self, _prompt: &str) -> Result<String> {
        self.code_prompts.set(self.code_prompts.get() + 1);
        self.codes.borrow_mut().pop_front().ok_or(BrokerError::Aborted)
    }

    fn info(&self, _message: &str) {}

    fn error(&self, message: &str) {
        self.errors.borrow_mut().push(message.to_string());
    }
}
