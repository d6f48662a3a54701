use std::collections::HashMap;
use std::sync::Arc;

use reqwest::cookie::{CookieStore, Jar};
use reqwest::header::ACCEPT;
use scraper::{Html, Selector};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{BrokerError, Result};
use crate::http_client;
use crate::identity_provider::IdentityProvider;
use crate::saml::SAMLAssertion;
use crate::secret_store::SecretStore;
use crate::session::{LoginCredentials, SessionStore};
use crate::settings::OktaConfig;
use crate::ui::UI;

pub const TOTP_FACTOR_TYPE: &str = "token:software:totp";
pub const MFA_ATTEMPTS: u32 = 3;
pub const MFA_REQUIRED_MESSAGE: &str = "MFA required to use this tool";
pub const SESSION_COOKIE_NAME: &str = "sid";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MfaFactor {
    pub id: String,
    pub factor_type: String,
    pub provider: String,
    pub verify_link: String,
}

/// Outcome of a primary authentication call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoginState {
    Success(String),
    MfaRequired {
        state_token: String,
        factors: Vec<MfaFactor>,
    },
    Failed(String),
}

/// A SAML page fetched with a one-time token, plus the session cookie Okta
/// set while serving it.
#[derive(Debug, Clone)]
pub struct SamlPage {
    pub assertion: SAMLAssertion,
    pub session_cookie: Option<String>,
}

/// The identity provider's HTTP surface.
pub trait OktaApi {
    fn login(&self, credentials: &LoginCredentials) -> Result<LoginState>;

    /// `MfaRejected` means the code was refused and another may be tried.
    fn verify_mfa(&self, state_token: &str, factor: &MfaFactor, code: &str) -> Result<String>;

    fn fetch_saml_via_token(&self, session_token: &str) -> Result<SamlPage>;

    fn fetch_saml_via_cookie(&self, cookie: &str) -> Result<SAMLAssertion>;
}

#[derive(Serialize, Debug)]
struct AuthnRequest<'a> {
    username: &'a str,
    password: &'a str,
    options: AuthnOptions,
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
struct AuthnOptions {
    multi_optional_factor_enroll: bool,
    warn_before_password_expired: bool,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AuthnResponse {
    status: String,
    session_token: Option<String>,
    state_token: Option<String>,
    #[serde(rename = "_embedded", default)]
    embedded: Option<AuthnResponseEmbedded>,
}

#[derive(Deserialize, Default)]
struct AuthnResponseEmbedded {
    #[serde(default)]
    factors: Vec<OktaMfaFactor>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct OktaMfaFactor {
    id: String,
    factor_type: String,
    #[serde(default)]
    provider: String,
    #[serde(rename = "_links", default)]
    links: HashMap<String, serde_json::Value>,
}

impl OktaMfaFactor {
    fn into_factor(self) -> Option<MfaFactor> {
        let verify_link = self
            .links
            .get("verify")
            .and_then(|link| link.get("href"))
            .and_then(|href| href.as_str())?
            .to_string();

        Some(MfaFactor {
            id: self.id,
            factor_type: self.factor_type,
            provider: self.provider,
            verify_link,
        })
    }
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
struct VerifyRequest<'a> {
    state_token: &'a str,
    pass_code: &'a str,
}

impl From<AuthnResponse> for LoginState {
    fn from(resp: AuthnResponse) -> Self {
        match (resp.status.as_str(), resp.session_token, resp.state_token) {
            ("SUCCESS", Some(session_token), _) => LoginState::Success(session_token),
            ("SUCCESS", None, _) => LoginState::Failed("no session token in response".to_string()),
            ("MFA_REQUIRED", _, Some(state_token)) => LoginState::MfaRequired {
                state_token,
                factors: resp
                    .embedded
                    .unwrap_or_default()
                    .factors
                    .into_iter()
                    .filter_map(OktaMfaFactor::into_factor)
                    .collect(),
            },
            ("MFA_REQUIRED", _, None) => LoginState::Failed("no state token in response".to_string()),
            ("LOCKED_OUT", _, _) => LoginState::Failed("account is locked out".to_string()),
            ("PASSWORD_EXPIRED", _, _) => LoginState::Failed("password has expired".to_string()),
            ("MFA_ENROLL", _, _) => {
                LoginState::Failed("an MFA factor must be enrolled first".to_string())
            }
            (other, _, _) => LoginState::Failed(format!("unexpected status {}", other)),
        }
    }
}

pub fn decode_login_state(body: &str) -> Result<LoginState> {
    let resp: AuthnResponse = serde_json::from_str(body)
        .map_err(|e| BrokerError::LoginFailed(format!("malformed response: {}", e)))?;
    log::debug!("authn status: {}", resp.status);
    Ok(resp.into())
}

/// The broker only supports software TOTP factors.
pub fn extract_totp_factor(factors: &[MfaFactor]) -> Result<&MfaFactor> {
    if factors.is_empty() {
        return Err(BrokerError::NoMfaConfigured);
    }

    factors
        .iter()
        .find(|factor| factor.factor_type == TOTP_FACTOR_TYPE)
        .ok_or(BrokerError::UnsupportedMfaFactor)
}

pub struct OktaClient {
    http_client: reqwest::blocking::Client,
    jar: Arc<Jar>,
    base_url: Url,
    app_url: Url,
}

impl OktaClient {
    pub fn new(config: &OktaConfig) -> Result<Self> {
        let base_url = Url::parse(&config.base_url)
            .map_err(|e| BrokerError::Config(format!("invalid baseUrl: {}", e)))?;
        let app_url = Url::parse(&config.app_url)
            .map_err(|e| BrokerError::Config(format!("invalid appUrl: {}", e)))?;

        let jar = Arc::new(Jar::default());
        let http_client = http_client::create_http_client_with_redirects(jar.clone())?;

        Ok(Self {
            http_client,
            jar,
            base_url,
            app_url,
        })
    }

    fn session_cookie(&self) -> Option<String> {
        [&self.base_url, &self.app_url]
            .into_iter()
            .filter_map(|url| self.jar.cookies(url))
            .filter_map(|header| header.to_str().ok().map(str::to_string))
            .find_map(|header| {
                header.split(';').find_map(|pair| {
                    let (name, value) = pair.trim().split_once('=')?;
                    (name == SESSION_COOKIE_NAME && !value.is_empty()).then(|| value.to_string())
                })
            })
    }

    fn fetch_assertion(&self, url: Url) -> Result<SAMLAssertion> {
        let response = self.http_client.get(url).send()?;
        let status = response.status();
        if !status.is_success() {
            return Err(BrokerError::InvalidSamlResponse(format!(
                "app link returned status {}",
                status.as_u16()
            )));
        }

        let html = response.text()?;
        SAMLAssertion::from_base64(&get_base64_saml_assertion(&html)?)
    }
}

impl OktaApi for OktaClient {
    fn login(&self, credentials: &LoginCredentials) -> Result<LoginState> {
        let uri = self
            .base_url
            .join("api/v1/authn")
            .map_err(|e| BrokerError::Config(format!("invalid baseUrl: {}", e)))?;
        log::debug!("authenticating {} at {}", credentials.username, uri);

        let response = self
            .http_client
            .post(uri)
            .header(ACCEPT, "application/json")
            .json(&AuthnRequest {
                username: &credentials.username,
                password: &credentials.password,
                options: AuthnOptions {
                    multi_optional_factor_enroll: false,
                    warn_before_password_expired: false,
                },
            })
            .send()?;

        let status = response.status();
        if !status.is_success() {
            return Err(BrokerError::LoginFailed(format!(
                "authentication returned status {}",
                status.as_u16()
            )));
        }

        decode_login_state(&response.text()?)
    }

    fn verify_mfa(&self, state_token: &str, factor: &MfaFactor, code: &str) -> Result<String> {
        log::debug!("verify url: {}", factor.verify_link);

        let response = self
            .http_client
            .post(&factor.verify_link)
            .header(ACCEPT, "application/json")
            .json(&VerifyRequest {
                state_token,
                pass_code: code,
            })
            .send()?;

        let status = response.status();
        if !status.is_success() {
            return Err(BrokerError::MfaRejected(format!(
                "status_code: {}",
                status.as_u16()
            )));
        }

        match decode_login_state(&response.text()?)? {
            LoginState::Success(session_token) => Ok(session_token),
            LoginState::Failed(reason) => Err(BrokerError::MfaRejected(reason)),
            LoginState::MfaRequired { .. } => {
                Err(BrokerError::MfaRejected("MFA did not succeed".to_string()))
            }
        }
    }

    fn fetch_saml_via_token(&self, session_token: &str) -> Result<SamlPage> {
        let mut url = self.app_url.clone();
        url.query_pairs_mut()
            .append_pair("onetimetoken", session_token);

        let assertion = self.fetch_assertion(url)?;
        let session_cookie = self.session_cookie();
        if session_cookie.is_none() {
            log::debug!("no {} cookie in saml response", SESSION_COOKIE_NAME);
        }

        Ok(SamlPage {
            assertion,
            session_cookie,
        })
    }

    fn fetch_saml_via_cookie(&self, cookie: &str) -> Result<SAMLAssertion> {
        let value = format!("{}={}; Path=/", SESSION_COOKIE_NAME, cookie);
        self.jar.add_cookie_str(&value, &self.base_url);
        if self.app_url.host() != self.base_url.host() {
            self.jar.add_cookie_str(&value, &self.app_url);
        }

        self.fetch_assertion(self.app_url.clone())
    }
}

pub fn get_base64_saml_assertion(html: &str) -> Result<String> {
    let document = Html::parse_document(html);
    let selector = Selector::parse(r#"input[name="SAMLResponse"]"#)
        .map_err(|e| BrokerError::InvalidSamlResponse(format!("{:?}", e)))?;

    document
        .select(&selector)
        .next()
        .and_then(|element| element.value().attr("value"))
        .filter(|value| !value.trim().is_empty())
        .map(str::to_string)
        .ok_or_else(|| BrokerError::InvalidSamlResponse("no SAMLResponse in page".to_string()))
}

/// Drives Okta to a SAML assertion, preferring the cheapest route: a cached
/// session cookie, then a stored username/password, then the terminal.
pub struct Okta<'a> {
    pub ui: &'a dyn UI,
    pub api: &'a dyn OktaApi,
    pub sessions: SessionStore<'a>,
    pub require_mfa: bool,
    pub remember_credentials: bool,
}

impl<'a> Okta<'a> {
    pub fn new(
        ui: &'a dyn UI,
        api: &'a dyn OktaApi,
        store: &'a dyn SecretStore,
        config: &OktaConfig,
    ) -> Self {
        Self {
            ui,
            api,
            sessions: SessionStore::new(store),
            require_mfa: config.require_mfa,
            remember_credentials: config.remember_credentials,
        }
    }

    fn authenticate(&self) -> Result<String> {
        if let Some(stored) = self.sessions.login() {
            log::debug!("trying stored login for {}", stored.username);
            match self.api.login(&stored) {
                Ok(LoginState::Failed(reason)) | Err(BrokerError::LoginFailed(reason)) => {
                    log::warn!("stored login failed ({}), prompting instead", reason);
                    self.sessions.forget_login();
                }
                Ok(state) => return self.complete_login(self.enforce_mfa_policy(state)?),
                Err(e) => return Err(e),
            }
        }

        let login = self.ui.get_username_and_password()?;
        let state = self.primary_auth(&login)?;
        let session_token = self.complete_login(state)?;

        if self.remember_credentials {
            self.sessions.save_login(&login);
        }
        Ok(session_token)
    }

    fn primary_auth(&self, login: &LoginCredentials) -> Result<LoginState> {
        let state = self.api.login(login)?;
        self.enforce_mfa_policy(state)
    }

    /// A session without MFA is refused when MFA is mandatory. That is a
    /// policy outcome, not a rejected password.
    fn enforce_mfa_policy(&self, state: LoginState) -> Result<LoginState> {
        match state {
            LoginState::Failed(reason) => Err(BrokerError::LoginFailed(reason)),
            LoginState::Success(_) if self.require_mfa => {
                Err(BrokerError::LoginFailed(MFA_REQUIRED_MESSAGE.to_string()))
            }
            state => Ok(state),
        }
    }

    fn complete_login(&self, state: LoginState) -> Result<String> {
        match state {
            LoginState::Success(session_token) => Ok(session_token),
            LoginState::MfaRequired {
                state_token,
                factors,
            } => {
                let factor = extract_totp_factor(&factors)?;
                self.verify_mfa_code(&state_token, factor)
            }
            LoginState::Failed(reason) => Err(BrokerError::LoginFailed(reason)),
        }
    }

    fn verify_mfa_code(&self, state_token: &str, factor: &MfaFactor) -> Result<String> {
        self.ui
            .info("Your account requires MFA; please enter a token.");

        for attempt in 1..=MFA_ATTEMPTS {
            let code = self.ui.get_mfa_code(&format!(
                "MFA token ({} - {})",
                factor.provider, factor.factor_type
            ))?;

            match self.api.verify_mfa(state_token, factor, &code) {
                Ok(session_token) => return Ok(session_token),
                Err(BrokerError::MfaRejected(reason)) => {
                    log::debug!("mfa attempt {} of {} rejected", attempt, MFA_ATTEMPTS);
                    self.ui
                        .error(&format!("MFA code verification failed! ({})", reason));
                }
                Err(e) => return Err(e),
            }
        }

        Err(BrokerError::MfaVerificationFailed(MFA_ATTEMPTS))
    }
}

impl IdentityProvider for Okta<'_> {
    fn get_saml_assertion(&self) -> Result<SAMLAssertion> {
        if let Some(cookie) = self.sessions.cookie() {
            match self.api.fetch_saml_via_cookie(&cookie) {
                Ok(assertion) => {
                    log::info!("reusing okta session");
                    return Ok(assertion);
                }
                Err(BrokerError::InvalidSamlResponse(reason)) => {
                    log::debug!("okta session no longer valid: {}", reason);
                    self.sessions.forget_cookie();
                }
                Err(e) => return Err(e),
            }
        }

        let session_token = self.authenticate()?;
        let page = self.api.fetch_saml_via_token(&session_token)?;
        if let Some(cookie) = &page.session_cookie {
            self.sessions.save_cookie(cookie);
        }
        Ok(page.assertion)
    }
}
