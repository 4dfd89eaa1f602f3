//! Provider wire constants
//!
//! Values the appointment portal's web client sends or expects. These are a
//! compatibility contract with the provider, not tunables: changing any of
//! them risks requests being rejected as non-browser traffic or expiry going
//! undetected.

/// Public base URL of the appointment portal
pub const DEFAULT_BASE_URL: &str = "https://ais.usvisa-info.com";

/// Locale path segment used by the portal (country + language)
pub const DEFAULT_LOCALE: &str = "es-co";

/// Name of the cookie carrying the session token
pub const SESSION_COOKIE: &str = "_yatri_session";

/// Header carrying the anti-forgery token
pub const CSRF_HEADER: &str = "X-CSRF-Token";

/// Exact error message the dates endpoint returns once a session has expired.
pub const SESSION_EXPIRED_MESSAGE: &str =
    "Your session expired, please sign in again to continue.";

/// Label of the sign-in form's submit button for the default locale.
/// The portal expects it echoed back in the `commit` form field.
pub const DEFAULT_SIGN_IN_LABEL: &str = "Iniciar sesión";

/// Maximum redirect hops followed after the sign-in POST
pub const MAX_REDIRECTS: usize = 5;

/// Number of candidate dates kept from the provider's list
pub const MAX_CANDIDATE_DATES: usize = 5;

/// Body phrases the portal uses when it rejects an email/password pair.
pub const INVALID_CREDENTIAL_PATTERNS: &[&str] = &[
    "invalid email or password",
    "correo electrónico o contraseña no válidos",
    "correo electrónico o contraseña inválidos",
];

pub const USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/134.0.0.0 Safari/537.36";

pub const SEC_CH_UA: &str =
    "\"Chromium\";v=\"134\", \"Not:A-Brand\";v=\"24\", \"Google Chrome\";v=\"134\"";

pub const ACCEPT_LANGUAGE: &str = "es-ES,es;q=0.9,en;q=0.8";

/// Accept header of a top-level page navigation
pub const ACCEPT_DOCUMENT: &str = "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,image/apng,*/*;q=0.8,application/signed-exchange;v=b3;q=0.7";

/// Accept header of the portal's XHR calls
pub const ACCEPT_XHR: &str = "*/*;q=0.5, text/javascript, application/javascript, application/ecmascript, application/x-ecmascript";
