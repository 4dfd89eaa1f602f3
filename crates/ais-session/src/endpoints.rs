//! Provider endpoint addressing and browser header mimicry
//!
//! The portal rejects requests that don't look like they came from its own
//! web client, so every request carries the same content negotiation and
//! same-origin markers a browser would send.

use std::time::Duration;

use reqwest::header::{
    ACCEPT, ACCEPT_LANGUAGE, CACHE_CONTROL, CONNECTION, CONTENT_TYPE, COOKIE, HeaderMap,
    HeaderName, HeaderValue, ORIGIN, REFERER, UPGRADE_INSECURE_REQUESTS,
};

use crate::constants::{
    ACCEPT_DOCUMENT, ACCEPT_XHR, CSRF_HEADER, DEFAULT_BASE_URL, DEFAULT_LOCALE, MAX_REDIRECTS,
    SEC_CH_UA, SESSION_COOKIE, USER_AGENT,
};
use crate::credentials::TokenPair;
use crate::error::{Error, Result};

/// Location of one applicant's schedule on the portal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    /// Scheme + host, no trailing slash (e.g. `https://ais.usvisa-info.com`)
    pub base_url: String,
    /// Locale path segment (e.g. `es-co`)
    pub locale: String,
    /// Applicant schedule identifier from the portal URL
    pub schedule_id: String,
    /// Consulate / facility identifier the dates are listed for
    pub facility_id: u32,
}

impl Endpoints {
    pub fn new(schedule_id: impl Into<String>, facility_id: u32) -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            locale: DEFAULT_LOCALE.to_string(),
            schedule_id: schedule_id.into(),
            facility_id,
        }
    }

    /// Override the base URL (trailing slashes are stripped).
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    pub fn with_locale(mut self, locale: &str) -> Self {
        self.locale = locale.to_string();
        self
    }

    /// Login page (GET) and login submit (POST) share this URL.
    pub fn sign_in_url(&self) -> String {
        format!("{}/{}/niv/users/sign_in", self.base_url, self.locale)
    }

    /// Appointment-days listing, non-expedited.
    pub fn days_url(&self) -> String {
        format!(
            "{}/{}/niv/schedule/{}/appointment/days/{}.json?appointments%5Bexpedite%5D=false",
            self.base_url, self.locale, self.schedule_id, self.facility_id
        )
    }
}

/// Build the HTTP client shared by the negotiator and the fetcher.
///
/// Redirects are followed up to `MAX_REDIRECTS` hops, which the sign-in POST
/// relies on to land on the signed-in page.
pub fn http_client(timeout: Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS))
        .timeout(timeout)
        .user_agent(USER_AGENT)
        .build()
        .map_err(|e| Error::Http(format!("building HTTP client: {e}")))
}

fn insert_client_hints(headers: &mut HeaderMap) {
    headers.insert(
        HeaderName::from_static("sec-ch-ua"),
        HeaderValue::from_static(SEC_CH_UA),
    );
    headers.insert(
        HeaderName::from_static("sec-ch-ua-mobile"),
        HeaderValue::from_static("?0"),
    );
    headers.insert(
        HeaderName::from_static("sec-ch-ua-platform"),
        HeaderValue::from_static("\"Linux\""),
    );
    headers.insert(
        ACCEPT_LANGUAGE,
        HeaderValue::from_static(crate::constants::ACCEPT_LANGUAGE),
    );
}

/// Headers of a top-level navigation to the login page (no session yet).
pub(crate) fn navigation_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    insert_client_hints(&mut headers);
    headers.insert(ACCEPT, HeaderValue::from_static(ACCEPT_DOCUMENT));
    headers.insert(CACHE_CONTROL, HeaderValue::from_static("max-age=0"));
    headers.insert(
        HeaderName::from_static("sec-fetch-dest"),
        HeaderValue::from_static("document"),
    );
    headers.insert(
        HeaderName::from_static("sec-fetch-mode"),
        HeaderValue::from_static("navigate"),
    );
    headers.insert(
        HeaderName::from_static("sec-fetch-site"),
        HeaderValue::from_static("none"),
    );
    headers.insert(
        HeaderName::from_static("sec-fetch-user"),
        HeaderValue::from_static("?1"),
    );
    headers.insert(UPGRADE_INSECURE_REQUESTS, HeaderValue::from_static("1"));
    headers
}

/// Headers of an in-page XHR call carrying the given session.
pub(crate) fn session_headers(endpoints: &Endpoints, tokens: &TokenPair) -> Result<HeaderMap> {
    let mut headers = HeaderMap::new();
    insert_client_hints(&mut headers);
    headers.insert(ACCEPT, HeaderValue::from_static(ACCEPT_XHR));
    headers.insert(CONNECTION, HeaderValue::from_static("keep-alive"));
    headers.insert(
        CONTENT_TYPE,
        HeaderValue::from_static("application/x-www-form-urlencoded; charset=UTF-8"),
    );
    headers.insert(ORIGIN, header_value("origin", &endpoints.base_url)?);
    headers.insert(REFERER, header_value("referer", &endpoints.sign_in_url())?);
    headers.insert(
        HeaderName::from_static("sec-fetch-dest"),
        HeaderValue::from_static("empty"),
    );
    headers.insert(
        HeaderName::from_static("sec-fetch-mode"),
        HeaderValue::from_static("cors"),
    );
    headers.insert(
        HeaderName::from_static("sec-fetch-site"),
        HeaderValue::from_static("same-origin"),
    );
    headers.insert(
        HeaderName::from_static("x-requested-with"),
        HeaderValue::from_static("XMLHttpRequest"),
    );

    let cookie = format!("{SESSION_COOKIE}={}", tokens.session_token.expose());
    headers.insert(COOKIE, header_value("cookie", &cookie)?);
    headers.insert(
        HeaderName::from_static("x-csrf-token"),
        header_value(CSRF_HEADER, tokens.anti_forgery_token.expose())?,
    );
    Ok(headers)
}

fn header_value(name: &str, value: &str) -> Result<HeaderValue> {
    HeaderValue::from_str(value)
        .map_err(|e| Error::Http(format!("invalid value for header {name}: {e}")))
}
