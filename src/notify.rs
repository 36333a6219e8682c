// 📬 Notifications - best-effort "item added" mail through an HTTP mail relay
//
// Sent only after the new list has been persisted. Failures are logged and dropped;
// they never fail or delay the add.

use async_trait::async_trait;
use chrono::{DateTime, Local};
use reqwest::Client;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, instrument, warn};

use crate::entry::Owner;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("mail relay unreachable: {0}")]
    Transport(String),

    #[error("mail relay returned HTTP {0}")]
    Rejected(u16),
}

// ============================================================================
// NOTIFICATION
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub owner: Owner,
    pub item: String,
    pub at: DateTime<Local>,
}

impl Notification {
    pub fn item_added(owner: Owner, item: &str) -> Self {
        Notification {
            owner,
            item: item.to_string(),
            at: Local::now(),
        }
    }

    pub fn subject(&self) -> String {
        format!("[장바구니] {}: {}", self.owner, self.item)
    }

    pub fn body(&self) -> String {
        format!(
            "{}님이 장바구니에 '{}'을(를) 담았습니다.\n시간: {}",
            self.owner,
            self.item,
            self.at.format("%Y-%m-%d %H:%M:%S")
        )
    }
}

// ============================================================================
// NOTIFIER
// ============================================================================

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, notification: &Notification) -> Result<(), NotifyError>;
}

/// Send without waiting; failures end up in the log only
pub fn dispatch(notifier: Arc<dyn Notifier>, notification: Notification) -> JoinHandle<()> {
    tokio::spawn(async move {
        match notifier.send(&notification).await {
            Ok(()) => debug!(item = %notification.item, "Notification sent"),
            Err(e) => warn!(error = %e, item = %notification.item, "Notification dropped"),
        }
    })
}

#[derive(Debug, Serialize)]
struct RelayMessage<'a> {
    from: &'a str,
    to: &'a [String],
    subject: String,
    text: String,
}

/// Posts `{from, to, subject, text}` JSON to a mail relay endpoint
pub struct MailRelayNotifier {
    client: Client,
    url: String,
    token: Option<String>,
    from: String,
    to: Vec<String>,
}

impl MailRelayNotifier {
    pub fn new(url: impl Into<String>, from: impl Into<String>, to: Vec<String>) -> Self {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_else(|_| Client::new());

        MailRelayNotifier {
            client,
            url: url.into(),
            token: None,
            from: from.into(),
            to,
        }
    }

    #[must_use]
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }
}

#[async_trait]
impl Notifier for MailRelayNotifier {
    #[instrument(skip(self, notification), fields(recipients = self.to.len()))]
    async fn send(&self, notification: &Notification) -> Result<(), NotifyError> {
        let message = RelayMessage {
            from: &self.from,
            to: &self.to,
            subject: notification.subject(),
            text: notification.body(),
        };

        let mut request = self.client.post(&self.url).json(&message);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| NotifyError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            return Err(NotifyError::Rejected(response.status().as_u16()));
        }

        Ok(())
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn dad_milk() -> Notification {
        Notification::item_added(Owner::Member("아빠".to_string()), "우유")
    }

    #[test]
    fn test_compose() {
        let notification = dad_milk();
        assert_eq!(notification.subject(), "[장바구니] 아빠: 우유");
        assert!(notification.body().starts_with("아빠님이 장바구니에 '우유'"));
    }

    #[tokio::test]
    async fn test_relay_receives_message() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(header("authorization", "Bearer relay-token"))
            .and(body_partial_json(json!({
                "from": "basket@example.com",
                "to": ["family@example.com"],
                "subject": "[장바구니] 아빠: 우유"
            })))
            .respond_with(ResponseTemplate::new(202))
            .expect(1)
            .mount(&server)
            .await;

        let notifier = MailRelayNotifier::new(
            server.uri(),
            "basket@example.com",
            vec!["family@example.com".to_string()],
        )
        .with_token("relay-token");

        notifier.send(&dad_milk()).await.unwrap();
    }

    #[tokio::test]
    async fn test_relay_failure_is_reported() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let notifier = MailRelayNotifier::new(server.uri(), "a@example.com", vec![]);
        assert!(matches!(
            notifier.send(&dad_milk()).await,
            Err(NotifyError::Rejected(500))
        ));
    }

    #[tokio::test]
    async fn test_dispatch_swallows_failure() {
        let notifier: Arc<dyn Notifier> =
            Arc::new(MailRelayNotifier::new("http://127.0.0.1:9", "a@example.com", vec![]));

        // Completes without panicking even though the relay is unreachable
        dispatch(notifier, dad_milk()).await.unwrap();
    }
}
