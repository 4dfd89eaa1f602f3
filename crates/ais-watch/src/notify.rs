//! SMS delivery
//!
//! `Notifier` is the seam the watcher alerts through. `TwilioNotifier` sends
//! through a Twilio messaging service, which picks the sender number.

use std::future::Future;
use std::pin::Pin;

use ais_session::NotificationCredentials;
use common::Secret;
use serde::Deserialize;
use tracing::info;

use crate::error::{Error, Result};

/// Public Twilio REST API base URL
pub const TWILIO_BASE_URL: &str = "https://api.twilio.com";

/// Delivers a text message to a destination (phone number).
pub trait Notifier: Send + Sync {
    fn send<'a>(
        &'a self,
        body: &'a str,
        destination: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>>;
}

#[derive(Debug, Deserialize)]
struct MessageResponse {
    sid: String,
    #[serde(default)]
    status: Option<String>,
}

/// Twilio Messages API client.
pub struct TwilioNotifier {
    client: reqwest::Client,
    base_url: String,
    account_sid: String,
    auth_token: Secret<String>,
    messaging_service_sid: String,
}

impl TwilioNotifier {
    pub fn new(client: reqwest::Client, credentials: &NotificationCredentials) -> Self {
        Self {
            client,
            base_url: TWILIO_BASE_URL.to_string(),
            account_sid: credentials.account_sid.clone(),
            auth_token: credentials.auth_token.clone(),
            messaging_service_sid: credentials.messaging_service_sid.clone(),
        }
    }

    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    fn messages_url(&self) -> String {
        format!(
            "{}/2010-04-01/Accounts/{}/Messages.json",
            self.base_url, self.account_sid
        )
    }

    async fn create_message(&self, body: &str, destination: &str) -> Result<()> {
        let response = self
            .client
            .post(self.messages_url())
            .basic_auth(&self.account_sid, Some(self.auth_token.expose()))
            .form(&[
                ("Body", body),
                ("MessagingServiceSid", self.messaging_service_sid.as_str()),
                ("To", destination),
            ])
            .send()
            .await
            .map_err(|e| Error::Notify(format!("message request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| String::from("<no body>"));
            return Err(Error::Notify(format!("twilio returned {status}: {body}")));
        }

        let message = response
            .json::<MessageResponse>()
            .await
            .map_err(|e| Error::Notify(format!("invalid message response: {e}")))?;
        info!(
            sid = %message.sid,
            status = message.status.as_deref().unwrap_or("unknown"),
            "alert message queued"
        );
        Ok(())
    }
}

impl Notifier for TwilioNotifier {
    fn send<'a>(
        &'a self,
        body: &'a str,
        destination: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
        Box::pin(self.create_message(body, destination))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_string_contains, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn credentials() -> NotificationCredentials {
        NotificationCredentials {
            account_sid: "AC123".into(),
            auth_token: "secret".into(),
            messaging_service_sid: "MG456".into(),
        }
    }

    #[tokio::test]
    async fn posts_message_through_messaging_service() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/2010-04-01/Accounts/AC123/Messages.json"))
            // base64("AC123:secret")
            .and(header("authorization", "Basic QUMxMjM6c2VjcmV0"))
            .and(body_string_contains("MessagingServiceSid=MG456"))
            .and(body_string_contains("To=%2B573000000000"))
            .and(body_string_contains("Body=Nueva+fecha"))
            .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({
                "sid": "SM789",
                "status": "accepted"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let notifier =
            TwilioNotifier::new(reqwest::Client::new(), &credentials()).with_base_url(&server.uri());
        notifier
            .send("Nueva fecha! (Nueva: 2025-09-15, Vieja: 2025-10-01)", "+573000000000")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn error_status_is_notify_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_string("Authenticate"))
            .mount(&server)
            .await;

        let notifier =
            TwilioNotifier::new(reqwest::Client::new(), &credentials()).with_base_url(&server.uri());
        let result = notifier.send("hi", "+570").await;

        match result {
            Err(Error::Notify(msg)) => assert!(msg.contains("401"), "got: {msg}"),
            other => panic!("expected notify error, got {other:?}"),
        }
    }

    #[test]
    fn default_base_url_is_twilio() {
        let notifier = TwilioNotifier::new(reqwest::Client::new(), &credentials());
        assert_eq!(
            notifier.messages_url(),
            "https://api.twilio.com/2010-04-01/Accounts/AC123/Messages.json"
        );
    }
}
