//! Authenticated appointment-days query
//!
//! Every response from the days endpoint is mapped to a `Classification`
//! rather than an error, so the caller can tell a dead session (recoverable
//! by negotiating again) apart from everything else (surfaced as-is).

use chrono::NaiveDate;
use reqwest::StatusCode;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::constants::{MAX_CANDIDATE_DATES, SESSION_EXPIRED_MESSAGE};
use crate::credentials::TokenPair;
use crate::endpoints::{Endpoints, session_headers};
use crate::error::Error;
use crate::retry::{RetryPolicy, is_retryable_error, is_retryable_status};

/// Outcome of one days query.
#[derive(Debug)]
pub enum Classification {
    /// Earliest candidate dates, in provider order, at most `MAX_CANDIDATE_DATES`
    Success(Vec<NaiveDate>),
    /// The session token is no longer accepted
    Expired,
    /// Anything else; not recoverable by re-authenticating
    Fatal(Error),
}

impl Classification {
    pub fn label(&self) -> &'static str {
        match self {
            Classification::Success(_) => "success",
            Classification::Expired => "expired",
            Classification::Fatal(_) => "fatal",
        }
    }
}

/// One entry of the days listing. Other fields (e.g. `business_day`) are ignored.
#[derive(Debug, Deserialize)]
struct DayEntry {
    date: NaiveDate,
}

/// Classify a days-endpoint response by status and body.
///
/// Expiry is checked first and regardless of status: the portal has been
/// seen to report it with both 200 and 401.
pub fn classify(status: StatusCode, body: &str) -> Classification {
    if body.contains(SESSION_EXPIRED_MESSAGE) {
        return Classification::Expired;
    }

    if !status.is_success() {
        return Classification::Fatal(Error::UnexpectedResponse(format!(
            "days endpoint returned {status}: {}",
            excerpt(body)
        )));
    }

    match serde_json::from_str::<Vec<DayEntry>>(body) {
        Ok(entries) => Classification::Success(
            entries
                .into_iter()
                .take(MAX_CANDIDATE_DATES)
                .map(|entry| entry.date)
                .collect(),
        ),
        Err(e) => Classification::Fatal(Error::UnexpectedResponse(format!(
            "days payload is not a list of dates: {e}"
        ))),
    }
}

fn excerpt(body: &str) -> String {
    const LIMIT: usize = 200;
    if body.chars().count() <= LIMIT {
        body.to_string()
    } else {
        let head: String = body.chars().take(LIMIT).collect();
        format!("{head}...")
    }
}

/// Issues the days query with the current session.
pub struct DateFetcher {
    client: reqwest::Client,
    endpoints: Endpoints,
    retry: RetryPolicy,
}

impl DateFetcher {
    pub fn new(client: reqwest::Client, endpoints: Endpoints, retry: RetryPolicy) -> Self {
        Self {
            client,
            endpoints,
            retry,
        }
    }

    /// Query the available dates with the given pair.
    ///
    /// Transient failures (502, connect errors, timeouts) are retried here
    /// under the retry policy; once it is exhausted the result is
    /// `Fatal(TransientNetwork)`.
    pub async fn fetch_available_dates(&self, tokens: &TokenPair) -> Classification {
        let url = self.endpoints.days_url();
        let mut attempts = 0u32;

        loop {
            attempts += 1;
            let headers = match session_headers(&self.endpoints, tokens) {
                Ok(headers) => headers,
                Err(e) => return Classification::Fatal(e),
            };

            let transient = match self.client.get(&url).headers(headers).send().await {
                Ok(response) => {
                    let status = response.status();
                    if is_retryable_status(status) {
                        format!("days endpoint returned {status}")
                    } else {
                        let body = match response.text().await {
                            Ok(body) => body,
                            Err(e) => {
                                return Classification::Fatal(Error::Http(format!(
                                    "reading days response: {e}"
                                )));
                            }
                        };
                        let classification = classify(status, &body);
                        debug!(
                            %status,
                            attempts,
                            classification = classification.label(),
                            "days query classified"
                        );
                        return classification;
                    }
                }
                Err(e) if is_retryable_error(&e) => format!("days request failed: {e}"),
                Err(e) => {
                    return Classification::Fatal(Error::Http(format!(
                        "days request failed: {e}"
                    )));
                }
            };

            if !self.retry.allows_another(attempts) {
                return Classification::Fatal(Error::TransientNetwork {
                    attempts,
                    message: transient,
                });
            }

            let delay = self.retry.delay(attempts - 1);
            warn!(
                attempts,
                retry_in_ms = delay.as_millis() as u64,
                error = %transient,
                "transient failure querying dates, retrying"
            );
            tokio::time::sleep(delay).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    #[test]
    fn success_keeps_first_five_in_order() {
        let body = r#"[
            {"date":"2025-09-01","business_day":true},
            {"date":"2025-09-10","business_day":true},
            {"date":"2025-09-12","business_day":true},
            {"date":"2025-09-20","business_day":true},
            {"date":"2025-09-22","business_day":true},
            {"date":"2025-10-03","business_day":true},
            {"date":"2025-10-07","business_day":true}
        ]"#;
        match classify(StatusCode::OK, body) {
            Classification::Success(dates) => assert_eq!(
                dates,
                vec![
                    date("2025-09-01"),
                    date("2025-09-10"),
                    date("2025-09-12"),
                    date("2025-09-20"),
                    date("2025-09-22"),
                ]
            ),
            other => panic!("expected success, got {other:?}"),
        }
    }

    #[test]
    fn provider_order_is_preserved() {
        let body = r#"[{"date":"2025-12-01"},{"date":"2025-09-01"}]"#;
        match classify(StatusCode::OK, body) {
            Classification::Success(dates) => {
                assert_eq!(dates, vec![date("2025-12-01"), date("2025-09-01")])
            }
            other => panic!("expected success, got {other:?}"),
        }
    }

    #[test]
    fn empty_list_is_success() {
        assert!(matches!(
            classify(StatusCode::OK, "[]"),
            Classification::Success(dates) if dates.is_empty()
        ));
    }

    #[test]
    fn expiry_message_on_unauthorized_is_expired() {
        let body = format!(r#"{{"error":"{SESSION_EXPIRED_MESSAGE}"}}"#);
        assert!(matches!(
            classify(StatusCode::UNAUTHORIZED, &body),
            Classification::Expired
        ));
    }

    #[test]
    fn expiry_message_on_ok_is_expired() {
        let body = format!(r#"{{"error":"{SESSION_EXPIRED_MESSAGE}"}}"#);
        assert!(matches!(
            classify(StatusCode::OK, &body),
            Classification::Expired
        ));
    }

    #[test]
    fn expiry_message_constant_matches_provider_text() {
        assert_eq!(
            SESSION_EXPIRED_MESSAGE,
            "Your session expired, please sign in again to continue."
        );
    }

    #[test]
    fn other_unauthorized_is_fatal() {
        let body = r#"{"error":"You need to sign in or sign up before continuing."}"#;
        assert!(matches!(
            classify(StatusCode::UNAUTHORIZED, body),
            Classification::Fatal(Error::UnexpectedResponse(_))
        ));
    }

    #[test]
    fn unexpected_schema_is_fatal() {
        assert!(matches!(
            classify(StatusCode::OK, r#"{"dates":[]}"#),
            Classification::Fatal(Error::UnexpectedResponse(_))
        ));
        assert!(matches!(
            classify(StatusCode::OK, r#"[{"date":"not a date"}]"#),
            Classification::Fatal(Error::UnexpectedResponse(_))
        ));
        assert!(matches!(
            classify(StatusCode::OK, "<html>maintenance</html>"),
            Classification::Fatal(Error::UnexpectedResponse(_))
        ));
    }

    #[test]
    fn server_error_is_fatal() {
        assert!(matches!(
            classify(StatusCode::INTERNAL_SERVER_ERROR, "oops"),
            Classification::Fatal(_)
        ));
    }

    #[test]
    fn long_bodies_are_truncated_in_errors() {
        let body = "x".repeat(1000);
        match classify(StatusCode::NOT_FOUND, &body) {
            Classification::Fatal(e) => assert!(e.to_string().len() < 300),
            other => panic!("expected fatal, got {other:?}"),
        }
    }
}
