//! Two-phase login handshake
//!
//! Mirrors the portal's web login:
//! 1. Bootstrap: GET the login page anonymously to obtain a session cookie
//!    and the anti-forgery token embedded in the page's `<meta>` tags
//! 2. Authenticate: POST the login form with that cookie/token pair and
//!    harvest the rotated pair from the signed-in page
//!
//! The negotiator never persists anything. Its output must be committed to
//! the credential store by the caller before it is used for other requests.

use std::sync::LazyLock;

use regex::Regex;
use reqwest::header::{HeaderMap, SET_COOKIE};
use tracing::{debug, info, warn};

use crate::constants::{DEFAULT_SIGN_IN_LABEL, INVALID_CREDENTIAL_PATTERNS, SESSION_COOKIE};
use crate::credentials::{Identity, TokenPair};
use crate::endpoints::{Endpoints, navigation_headers, session_headers};
use crate::error::{Error, Result};

static CSRF_META: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)<meta\s+name=["']csrf-token["']\s+content=["']([^"']+)["']"#)
        .expect("csrf-token meta pattern is valid")
});

/// Extract the session cookie value from a response's `Set-Cookie` headers.
///
/// When the cookie is set more than once the last value wins, as it would in
/// a browser.
pub fn session_cookie(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(SET_COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .filter_map(parse_session_cookie)
        .last()
}

/// Parse one `Set-Cookie` header value, returning the session token if this
/// header sets the session cookie.
pub fn parse_session_cookie(set_cookie: &str) -> Option<String> {
    let pair = set_cookie.split(';').next()?;
    let (name, value) = pair.split_once('=')?;
    if name.trim() != SESSION_COOKIE {
        return None;
    }
    let value = value.trim();
    (!value.is_empty()).then(|| value.to_string())
}

/// Extract the anti-forgery token from the page's `csrf-token` meta tag.
pub fn parse_anti_forgery_token(html: &str) -> Option<String> {
    CSRF_META
        .captures(html)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

/// Whether a sign-in response body carries one of the portal's
/// invalid-credential messages.
pub fn rejects_credentials(body: &str) -> bool {
    let lower = body.to_lowercase();
    INVALID_CREDENTIAL_PATTERNS
        .iter()
        .any(|pattern| lower.contains(pattern))
}

/// Performs the login handshake against the portal.
pub struct Negotiator {
    client: reqwest::Client,
    endpoints: Endpoints,
    sign_in_label: String,
}

impl Negotiator {
    pub fn new(client: reqwest::Client, endpoints: Endpoints) -> Self {
        Self {
            client,
            endpoints,
            sign_in_label: DEFAULT_SIGN_IN_LABEL.to_string(),
        }
    }

    /// Override the submit-button label echoed in the `commit` form field
    /// (it is localized by the portal).
    pub fn with_sign_in_label(mut self, label: impl Into<String>) -> Self {
        self.sign_in_label = label.into();
        self
    }

    /// Run both phases and return a freshly negotiated pair.
    ///
    /// `previous` is the pair currently held in the credential store, used
    /// only for the anti-forgery fallback in the authentication phase.
    pub async fn negotiate(
        &self,
        identity: &Identity,
        previous: Option<&TokenPair>,
    ) -> Result<TokenPair> {
        let bootstrap = self.bootstrap().await?;
        let tokens = self.authenticate(identity, &bootstrap, previous).await?;
        info!(email = %identity.email, "negotiated new session");
        Ok(tokens)
    }

    /// Phase 1: anonymous GET of the login page.
    pub async fn bootstrap(&self) -> Result<TokenPair> {
        let url = self.endpoints.sign_in_url();
        let response = self
            .client
            .get(&url)
            .headers(navigation_headers())
            .send()
            .await
            .map_err(|e| Error::Http(format!("login page request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::BootstrapFailed(format!(
                "login page returned {status}"
            )));
        }

        let cookie = session_cookie(response.headers());
        let body = response
            .text()
            .await
            .map_err(|e| Error::Http(format!("reading login page: {e}")))?;

        let Some(session_token) = cookie else {
            return Err(Error::BootstrapFailed(format!(
                "login page set no {SESSION_COOKIE} cookie"
            )));
        };
        let Some(anti_forgery_token) = parse_anti_forgery_token(&body) else {
            return Err(Error::BootstrapFailed(
                "login page has no csrf-token meta tag".into(),
            ));
        };

        debug!("bootstrap session acquired");
        Ok(TokenPair::new(session_token, anti_forgery_token))
    }

    /// Phase 2: submit the login form using the bootstrap pair.
    ///
    /// Redirects are followed by the client (bounded), so the pair is read
    /// from the final signed-in page.
    pub async fn authenticate(
        &self,
        identity: &Identity,
        bootstrap: &TokenPair,
        previous: Option<&TokenPair>,
    ) -> Result<TokenPair> {
        let url = self.endpoints.sign_in_url();
        let form = [
            ("user[email]", identity.email.as_str()),
            ("user[password]", identity.password.expose().as_str()),
            ("policy_confirmed", "1"),
            ("commit", self.sign_in_label.as_str()),
        ];

        let response = self
            .client
            .post(&url)
            .headers(session_headers(&self.endpoints, bootstrap)?)
            .form(&form)
            .send()
            .await
            .map_err(|e| Error::Http(format!("sign-in request failed: {e}")))?;

        let status = response.status();
        let cookie = session_cookie(response.headers());
        let body = response
            .text()
            .await
            .map_err(|e| Error::Http(format!("reading sign-in response: {e}")))?;

        if matches!(status.as_u16(), 401 | 403 | 422) || rejects_credentials(&body) {
            return Err(Error::AuthenticationFailed(format!(
                "portal rejected credentials for {} ({status})",
                identity.email
            )));
        }
        if !status.is_success() {
            return Err(Error::AuthenticationFailed(format!(
                "sign-in returned {status}"
            )));
        }

        let Some(session_token) = cookie else {
            return Err(Error::AuthenticationFailed(format!(
                "sign-in response set no {SESSION_COOKIE} cookie"
            )));
        };

        // Provider quirk: the signed-in page doesn't always embed a fresh
        // token, and the portal keeps accepting the last one it issued.
        let anti_forgery_token = match parse_anti_forgery_token(&body) {
            Some(token) => token,
            None => {
                let fallback = previous.unwrap_or(bootstrap);
                warn!(
                    from_store = previous.is_some(),
                    "sign-in response has no csrf-token, reusing previous token"
                );
                fallback.anti_forgery_token.expose().clone()
            }
        };

        Ok(TokenPair::new(session_token, anti_forgery_token))
    }
}
