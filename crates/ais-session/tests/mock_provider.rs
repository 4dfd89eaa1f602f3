//! Mock portal tests for negotiation and date fetching.
//!
//! These tests use wiremock to stand in for the appointment portal so the
//! handshake and classification can be exercised without network access or
//! real credentials.

use std::time::Duration;

use ais_session::{
    Classification, DateFetcher, Endpoints, Error, Identity, Negotiator, RetryPolicy,
    SESSION_EXPIRED_MESSAGE, TokenPair, http_client,
};
use chrono::NaiveDate;
use wiremock::matchers::{body_string_contains, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const SIGN_IN: &str = "/es-co/niv/users/sign_in";
const DAYS: &str = "/es-co/niv/schedule/67530133/appointment/days/25.json";

fn endpoints(server: &MockServer) -> Endpoints {
    Endpoints::new("67530133", 25).with_base_url(&server.uri())
}

fn client() -> reqwest::Client {
    http_client(Duration::from_secs(5)).unwrap()
}

fn identity() -> Identity {
    Identity {
        email: "applicant@example.com".into(),
        password: "hunter2".into(),
        phone: "+573000000000".into(),
    }
}

fn login_page(token: &str) -> String {
    format!(
        r#"<!DOCTYPE html><html><head>
<meta name="csrf-param" content="authenticity_token" />
<meta name="csrf-token" content="{token}" />
</head><body>sign in</body></html>"#
    )
}

fn page_with_session(session: &str, token: Option<&str>) -> ResponseTemplate {
    let body = match token {
        Some(token) => login_page(token),
        None => "<html><body>Bienvenido</body></html>".to_string(),
    };
    ResponseTemplate::new(200)
        .insert_header("set-cookie", format!("_yatri_session={session}; path=/; HttpOnly").as_str())
        .set_body_string(body)
}

async fn mount_bootstrap(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path(SIGN_IN))
        .respond_with(page_with_session("boot_session", Some("boot_csrf")))
        .mount(server)
        .await;
}

fn fast_retry(max_attempts: u32) -> RetryPolicy {
    RetryPolicy {
        max_attempts,
        initial_delay: Duration::from_millis(5),
        max_delay: Duration::from_millis(20),
        jitter_factor: 0.0,
    }
}

fn date(s: &str) -> NaiveDate {
    s.parse().unwrap()
}

// ============================================================================
// Bootstrap
// ============================================================================

#[tokio::test]
async fn bootstrap_extracts_cookie_and_token() {
    let server = MockServer::start().await;
    mount_bootstrap(&server).await;

    let negotiator = Negotiator::new(client(), endpoints(&server));
    let pair = negotiator.bootstrap().await.unwrap();

    assert_eq!(pair, TokenPair::new("boot_session", "boot_csrf"));
}

#[tokio::test]
async fn bootstrap_without_cookie_fails() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(SIGN_IN))
        .respond_with(ResponseTemplate::new(200).set_body_string(login_page("boot_csrf")))
        .mount(&server)
        .await;

    let negotiator = Negotiator::new(client(), endpoints(&server));
    let result = negotiator.bootstrap().await;

    assert!(matches!(result, Err(Error::BootstrapFailed(_))), "got {result:?}");
}

#[tokio::test]
async fn bootstrap_without_token_fails() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(SIGN_IN))
        .respond_with(page_with_session("boot_session", None))
        .mount(&server)
        .await;

    let negotiator = Negotiator::new(client(), endpoints(&server));
    let result = negotiator.bootstrap().await;

    assert!(matches!(result, Err(Error::BootstrapFailed(_))), "got {result:?}");
}

#[tokio::test]
async fn bootstrap_error_status_fails() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(SIGN_IN))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let negotiator = Negotiator::new(client(), endpoints(&server));
    let result = negotiator.bootstrap().await;

    assert!(matches!(result, Err(Error::BootstrapFailed(_))), "got {result:?}");
}

// ============================================================================
// Authentication
// ============================================================================

#[tokio::test]
async fn negotiate_sends_bootstrap_pair_and_returns_rotated_pair() {
    let server = MockServer::start().await;
    mount_bootstrap(&server).await;
    Mock::given(method("POST"))
        .and(path(SIGN_IN))
        .and(header("cookie", "_yatri_session=boot_session"))
        .and(header("x-csrf-token", "boot_csrf"))
        .and(header("x-requested-with", "XMLHttpRequest"))
        .and(body_string_contains("user%5Bemail%5D=applicant%40example.com"))
        .and(body_string_contains("user%5Bpassword%5D=hunter2"))
        .and(body_string_contains("policy_confirmed=1"))
        .respond_with(page_with_session("authed_session", Some("authed_csrf")))
        .expect(1)
        .mount(&server)
        .await;

    let negotiator = Negotiator::new(client(), endpoints(&server));
    let pair = negotiator.negotiate(&identity(), None).await.unwrap();

    assert_eq!(pair, TokenPair::new("authed_session", "authed_csrf"));
}

#[tokio::test]
async fn authentication_without_token_falls_back_to_stored_token() {
    let server = MockServer::start().await;
    mount_bootstrap(&server).await;
    Mock::given(method("POST"))
        .and(path(SIGN_IN))
        .respond_with(page_with_session("authed_session", None))
        .mount(&server)
        .await;

    let stored = TokenPair::new("stale_session", "stored_csrf");
    let negotiator = Negotiator::new(client(), endpoints(&server));
    let pair = negotiator.negotiate(&identity(), Some(&stored)).await.unwrap();

    assert_eq!(pair, TokenPair::new("authed_session", "stored_csrf"));
}

#[tokio::test]
async fn authentication_without_token_or_store_uses_bootstrap_token() {
    let server = MockServer::start().await;
    mount_bootstrap(&server).await;
    Mock::given(method("POST"))
        .and(path(SIGN_IN))
        .respond_with(page_with_session("authed_session", None))
        .mount(&server)
        .await;

    let negotiator = Negotiator::new(client(), endpoints(&server));
    let pair = negotiator.negotiate(&identity(), None).await.unwrap();

    assert_eq!(pair, TokenPair::new("authed_session", "boot_csrf"));
}

#[tokio::test]
async fn authentication_follows_redirects() {
    let server = MockServer::start().await;
    mount_bootstrap(&server).await;
    Mock::given(method("POST"))
        .and(path(SIGN_IN))
        .respond_with(ResponseTemplate::new(302).insert_header("location", "/es-co/niv/account"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/es-co/niv/account"))
        .respond_with(page_with_session("landed_session", Some("landed_csrf")))
        .mount(&server)
        .await;

    let negotiator = Negotiator::new(client(), endpoints(&server));
    let pair = negotiator.negotiate(&identity(), None).await.unwrap();

    assert_eq!(pair, TokenPair::new("landed_session", "landed_csrf"));
}

#[tokio::test]
async fn rejected_status_is_authentication_failure() {
    let server = MockServer::start().await;
    mount_bootstrap(&server).await;
    Mock::given(method("POST"))
        .and(path(SIGN_IN))
        .respond_with(ResponseTemplate::new(401).set_body_string("Invalid email or password."))
        .mount(&server)
        .await;

    let negotiator = Negotiator::new(client(), endpoints(&server));
    let result = negotiator.negotiate(&identity(), None).await;

    assert!(
        matches!(result, Err(Error::AuthenticationFailed(_))),
        "got {result:?}"
    );
}

#[tokio::test]
async fn forbidden_and_unprocessable_are_authentication_failures() {
    for status in [403, 422] {
        let server = MockServer::start().await;
        mount_bootstrap(&server).await;
        Mock::given(method("POST"))
            .and(path(SIGN_IN))
            .respond_with(ResponseTemplate::new(status).set_body_string("<html></html>"))
            .expect(1)
            .mount(&server)
            .await;

        let negotiator = Negotiator::new(client(), endpoints(&server));
        let result = negotiator.negotiate(&identity(), None).await;

        assert!(
            matches!(result, Err(Error::AuthenticationFailed(_))),
            "status {status}: got {result:?}"
        );
    }
}

#[tokio::test]
async fn signed_in_page_without_session_cookie_is_authentication_failure() {
    let server = MockServer::start().await;
    mount_bootstrap(&server).await;
    Mock::given(method("POST"))
        .and(path(SIGN_IN))
        .respond_with(ResponseTemplate::new(200).set_body_string(login_page("fresh_csrf")))
        .mount(&server)
        .await;

    let negotiator = Negotiator::new(client(), endpoints(&server));
    let result = negotiator.negotiate(&identity(), None).await;

    match result {
        Err(Error::AuthenticationFailed(msg)) => {
            assert!(msg.contains("_yatri_session"), "got: {msg}")
        }
        other => panic!("expected AuthenticationFailed, got {other:?}"),
    }
}

#[tokio::test]
async fn redirect_loop_stops_at_hop_limit() {
    let server = MockServer::start().await;
    mount_bootstrap(&server).await;
    Mock::given(method("POST"))
        .and(path(SIGN_IN))
        .respond_with(ResponseTemplate::new(302).insert_header("location", "/es-co/niv/loop"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/es-co/niv/loop"))
        .respond_with(ResponseTemplate::new(302).insert_header("location", "/es-co/niv/loop"))
        .mount(&server)
        .await;

    let negotiator = Negotiator::new(client(), endpoints(&server));
    let result = negotiator.negotiate(&identity(), None).await;

    match result {
        Err(Error::Http(msg)) => assert!(msg.contains("sign-in request failed"), "got: {msg}"),
        other => panic!("expected redirect error, got {other:?}"),
    }

    let loop_hits = server
        .received_requests()
        .await
        .unwrap()
        .iter()
        .filter(|r| r.url.path() == "/es-co/niv/loop")
        .count();
    assert!(loop_hits <= 5, "followed {loop_hits} redirects");
}

#[tokio::test]
async fn rejection_message_on_ok_is_authentication_failure() {
    let server = MockServer::start().await;
    mount_bootstrap(&server).await;
    Mock::given(method("POST"))
        .and(path(SIGN_IN))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("set-cookie", "_yatri_session=anon; path=/")
                .set_body_string("$('.error').text('Invalid email or password.');"),
        )
        .mount(&server)
        .await;

    let negotiator = Negotiator::new(client(), endpoints(&server));
    let result = negotiator.negotiate(&identity(), None).await;

    assert!(
        matches!(result, Err(Error::AuthenticationFailed(_))),
        "got {result:?}"
    );
}

#[tokio::test]
async fn bootstrap_failure_skips_authentication() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(SIGN_IN))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html></html>"))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(SIGN_IN))
        .respond_with(page_with_session("authed_session", Some("authed_csrf")))
        .expect(0)
        .mount(&server)
        .await;

    let negotiator = Negotiator::new(client(), endpoints(&server));
    let result = negotiator.negotiate(&identity(), None).await;

    assert!(matches!(result, Err(Error::BootstrapFailed(_))), "got {result:?}");
}

// ============================================================================
// Fetching
// ============================================================================

fn days_body(dates: &[&str]) -> serde_json::Value {
    serde_json::Value::Array(
        dates
            .iter()
            .map(|d| serde_json::json!({ "date": d, "business_day": true }))
            .collect(),
    )
}

#[tokio::test]
async fn fetch_sends_session_and_truncates_to_five() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(DAYS))
        .and(query_param("appointments[expedite]", "false"))
        .and(header("cookie", "_yatri_session=live_session"))
        .and(header("x-csrf-token", "live_csrf"))
        .respond_with(ResponseTemplate::new(200).set_body_json(days_body(&[
            "2025-09-01",
            "2025-09-10",
            "2025-09-11",
            "2025-09-15",
            "2025-09-18",
            "2025-09-30",
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let fetcher = DateFetcher::new(client(), endpoints(&server), RetryPolicy::none());
    let result = fetcher
        .fetch_available_dates(&TokenPair::new("live_session", "live_csrf"))
        .await;

    match result {
        Classification::Success(dates) => assert_eq!(
            dates,
            vec![
                date("2025-09-01"),
                date("2025-09-10"),
                date("2025-09-11"),
                date("2025-09-15"),
                date("2025-09-18"),
            ]
        ),
        other => panic!("expected success, got {other:?}"),
    }
}

#[tokio::test]
async fn fetch_detects_expired_session() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(DAYS))
        .respond_with(
            ResponseTemplate::new(401)
                .set_body_json(serde_json::json!({ "error": SESSION_EXPIRED_MESSAGE })),
        )
        .mount(&server)
        .await;

    let fetcher = DateFetcher::new(client(), endpoints(&server), RetryPolicy::none());
    let result = fetcher
        .fetch_available_dates(&TokenPair::new("old", "old"))
        .await;

    assert!(matches!(result, Classification::Expired), "got {result:?}");
}

#[tokio::test]
async fn fetch_retries_bad_gateway_then_succeeds() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(DAYS))
        .respond_with(ResponseTemplate::new(502))
        .up_to_n_times(1)
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(DAYS))
        .respond_with(ResponseTemplate::new(200).set_body_json(days_body(&["2025-09-01"])))
        .with_priority(2)
        .mount(&server)
        .await;

    let fetcher = DateFetcher::new(client(), endpoints(&server), fast_retry(3));
    let result = fetcher
        .fetch_available_dates(&TokenPair::new("s", "c"))
        .await;

    assert!(
        matches!(&result, Classification::Success(dates) if dates == &vec![date("2025-09-01")]),
        "got {result:?}"
    );
    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 2);
}

#[tokio::test]
async fn fetch_gives_up_after_retry_cap() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(DAYS))
        .respond_with(ResponseTemplate::new(502))
        .mount(&server)
        .await;

    let fetcher = DateFetcher::new(client(), endpoints(&server), fast_retry(3));
    let result = fetcher
        .fetch_available_dates(&TokenPair::new("s", "c"))
        .await;

    assert!(
        matches!(
            result,
            Classification::Fatal(Error::TransientNetwork { attempts: 3, .. })
        ),
        "got {result:?}"
    );
    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 3);
}

#[tokio::test]
async fn fetch_does_not_retry_other_errors() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(DAYS))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .expect(1)
        .mount(&server)
        .await;

    let fetcher = DateFetcher::new(client(), endpoints(&server), fast_retry(3));
    let result = fetcher
        .fetch_available_dates(&TokenPair::new("s", "c"))
        .await;

    assert!(matches!(result, Classification::Fatal(_)), "got {result:?}");
}
