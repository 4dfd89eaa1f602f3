//! Session lifecycle for the visa appointment portal
//!
//! Provides credential record storage, the two-phase login handshake and the
//! authenticated appointment-days query. This crate has no opinion on when
//! to re-authenticate; the orchestration lives in `ais-watch`.
//!
//! Session flow:
//! 1. Record loaded via `credentials::CredentialStore::load()`, re-read with
//!    `reload()` at the start of each run
//! 2. Days queried via `fetch::DateFetcher::fetch_available_dates()`
//! 3. On `Classification::Expired`, a new pair is obtained with
//!    `negotiate::Negotiator::negotiate()`
//! 4. The new pair is saved via `credentials::CredentialStore::commit()`
//!    before the query is repeated

pub mod constants;
pub mod credentials;
pub mod endpoints;
pub mod error;
pub mod fetch;
pub mod negotiate;
pub mod retry;

pub use constants::*;
pub use credentials::{
    CredentialRecord, CredentialStore, CredentialUpdate, Identity, NotificationCredentials,
    TokenPair,
};
pub use endpoints::{Endpoints, http_client};
pub use error::{Error, Result};
pub use fetch::{Classification, DateFetcher, classify};
pub use negotiate::Negotiator;
pub use retry::RetryPolicy;
