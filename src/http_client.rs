use std::sync::Arc;

use reqwest::cookie::Jar;

const MAX_REDIRECTS: usize = 10;

/// Blocking client that follows a bounded number of redirects and records
/// cookies in `jar`, so the Okta session cookie survives the redirect chain.
pub fn create_http_client_with_redirects(
    jar: Arc<Jar>,
) -> reqwest::Result<reqwest::blocking::Client> {
    reqwest::blocking::Client::builder()
        .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
        .cookie_provider(jar)
        .redirect(reqwest::redirect::Policy::custom(|attempt| {
            if attempt.previous().len() > MAX_REDIRECTS {
                attempt.error("too many redirects")
            } else {
                attempt.follow()
            }
        }))
        .build()
}
