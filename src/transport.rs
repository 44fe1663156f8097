//! The outbound delivery transport adapter.
//!
//! Wraps the platform's "send a message" facility behind [`Transport`] and
//! classifies failures. A failure whose diagnostic text carries a known
//! authentication-failure marker is systemic: retrying it burns the attempt
//! budget of every in-flight job without any chance of success, so the retry
//! controller routes it to quarantine instead. Before reporting such a
//! failure, [`Delivery`] runs exactly one credential probe against the
//! transport to enrich the unsent record; the probe is best-effort and its
//! own failures are only logged.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Diagnostic substrings that mark a transport failure as
/// authentication-class.
const AUTH_FAILURE_MARKERS: [&str; 2] =
    ["could not authenticate", "username and password not accepted"];

/// One rendered outbound message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboundEmail {
    pub to: String,
    pub subject: String,
    pub body: String,
    pub headers: Vec<(String, String)>,
}

/// A failed send, carrying the transport's diagnostic text.
#[derive(Debug, Clone, Error)]
#[error("send failed: {detail}")]
pub struct SendFailure {
    pub detail: String,
}

impl SendFailure {
    pub fn new(detail: impl Into<String>) -> Self {
        Self {
            detail: detail.into(),
        }
    }
}

/// Structured data gathered by the credential probe.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProbeReport {
    pub username_length: Option<usize>,
    pub password_length: Option<usize>,
    pub username_has_whitespace: bool,
    pub password_has_whitespace: bool,
    pub detail: String,
}

/// The platform's message-sending facility.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Attempts to deliver one message. Blocking network call; no timeout is
    /// imposed here beyond the transport's own default.
    async fn send(&self, email: &OutboundEmail) -> Result<(), SendFailure>;

    /// A lightweight credential test, run once per authentication-class hard
    /// failure to gather diagnostics for the unsent record.
    async fn probe(&self) -> Result<ProbeReport, SendFailure> {
        Ok(ProbeReport::default())
    }
}

/// How a failed send should be treated by the retry controller.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum FailureClass {
    /// Ordinary failure; retried per the backoff policy.
    Transient,
    /// Authentication-class failure; activates quarantine.
    Authentication,
}

/// Classifies a transport diagnostic by its text.
pub fn classify(detail: &str) -> FailureClass {
    let lowered = detail.to_lowercase();
    if AUTH_FAILURE_MARKERS
        .iter()
        .any(|marker| lowered.contains(marker))
    {
        FailureClass::Authentication
    } else {
        FailureClass::Transient
    }
}

/// The result of one delivery attempt through [`Delivery`].
#[derive(Debug, Clone, PartialEq)]
pub enum SendOutcome {
    Sent,
    Failed {
        class: FailureClass,
        detail: String,
        diagnostic: Option<ProbeReport>,
    },
}

/// Attempts deliveries and classifies their failures.
#[derive(Clone)]
pub struct Delivery {
    transport: Arc<dyn Transport>,
}

impl Delivery {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }

    pub async fn send(&self, email: &OutboundEmail) -> SendOutcome {
        match self.transport.send(email).await {
            Ok(()) => SendOutcome::Sent,
            Err(failure) => {
                let class = classify(&failure.detail);
                let diagnostic = match class {
                    FailureClass::Authentication => self.probe().await,
                    FailureClass::Transient => None,
                };
                tracing::warn!(
                    detail = %failure.detail,
                    ?class,
                    to = %email.to,
                    "Delivery attempt failed"
                );
                SendOutcome::Failed {
                    class,
                    detail: failure.detail,
                    diagnostic,
                }
            }
        }
    }

    async fn probe(&self) -> Option<ProbeReport> {
        match self.transport.probe().await {
            Ok(report) => Some(report),
            Err(err) => {
                tracing::warn!(?err, "Credential probe failed");
                None
            }
        }
    }
}

#[cfg(test)]
mod test {
    use std::sync::atomic::Ordering;

    use crate::testing::MockTransport;

    use super::*;

    fn email() -> OutboundEmail {
        OutboundEmail {
            to: "a@b.com".to_owned(),
            subject: "subject".to_owned(),
            body: "body".to_owned(),
            headers: vec![("From".to_owned(), "ops@example.com".to_owned())],
        }
    }

    #[test]
    fn classification_matches_auth_markers_case_insensitively() {
        assert_eq!(
            classify("SMTP Error: Could not authenticate."),
            FailureClass::Authentication
        );
        assert_eq!(
            classify("535-5.7.8 Username and Password not accepted"),
            FailureClass::Authentication
        );
        assert_eq!(classify("connection timed out"), FailureClass::Transient);
        assert_eq!(classify(""), FailureClass::Transient);
    }

    #[tokio::test]
    async fn successful_send_reports_sent() {
        let transport = Arc::new(MockTransport::default());
        let delivery = Delivery::new(transport.clone());
        assert_eq!(delivery.send(&email()).await, SendOutcome::Sent);
        assert_eq!(transport.sent.lock().unwrap().len(), 1);
        assert_eq!(transport.probe_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn transient_failure_is_not_probed() {
        let transport = Arc::new(MockTransport::failing_with("connection reset"));
        let delivery = Delivery::new(transport.clone());
        let outcome = delivery.send(&email()).await;
        assert!(matches!(
            outcome,
            SendOutcome::Failed {
                class: FailureClass::Transient,
                ..
            }
        ));
        assert_eq!(transport.probe_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn auth_failure_probes_exactly_once() {
        let transport = Arc::new(MockTransport::failing_with("Could not authenticate"));
        *transport.probe_result.lock().unwrap() = Some(Ok(ProbeReport {
            username_length: Some(0),
            ..Default::default()
        }));
        let delivery = Delivery::new(transport.clone());

        let outcome = delivery.send(&email()).await;
        match outcome {
            SendOutcome::Failed {
                class: FailureClass::Authentication,
                diagnostic: Some(report),
                ..
            } => assert_eq!(report.username_length, Some(0)),
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert_eq!(transport.probe_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn probe_failure_is_swallowed() {
        let transport = Arc::new(MockTransport::failing_with("could not authenticate"));
        *transport.probe_result.lock().unwrap() = Some(Err(SendFailure::new("probe broke too")));
        let delivery = Delivery::new(transport.clone());

        let outcome = delivery.send(&email()).await;
        assert!(matches!(
            outcome,
            SendOutcome::Failed {
                class: FailureClass::Authentication,
                diagnostic: None,
                ..
            }
        ));
    }
}
