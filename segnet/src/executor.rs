//! Command execution and response classification.

use std::sync::Arc;
use std::time::Duration;

use log::{debug, warn};

use crate::audit::AuditLog;
use crate::error::TransportError;
use crate::model::CommandStep;
use crate::platform::Dialect;
use crate::report::{Classification, StepOutcome};
use crate::session::DeviceSession;

/// Classifies raw device responses by rejection markers.
///
/// A response containing any marker (case-sensitive substring) is
/// `Rejected`; anything else is `Applied`. Session faults never reach the
/// classifier; the executor maps them to `SessionError` itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseClassifier {
    markers: Vec<String>,
}

impl ResponseClassifier {
    /// Classifier over an explicit marker set.
    pub fn new<I, S>(markers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            markers: markers.into_iter().map(Into::into).collect(),
        }
    }

    /// Classifier over a dialect's built-in markers.
    pub fn for_dialect(dialect: Dialect) -> Self {
        Self::new(dialect.definition().failed_when_contains)
    }

    /// The marker set.
    pub fn markers(&self) -> &[String] {
        &self.markers
    }

    /// First marker found in the response, in marker-set order.
    pub fn matched_marker(&self, response: &str) -> Option<&str> {
        self.markers
            .iter()
            .map(String::as_str)
            .find(|marker| response.contains(marker))
    }

    /// Classify a response the session returned.
    pub fn classify(&self, response: &str) -> Classification {
        match self.matched_marker(response) {
            Some(_) => Classification::Rejected,
            None => Classification::Applied,
        }
    }
}

/// Sends command steps to one device and records each outcome.
pub struct CommandExecutor {
    address: String,
    classifier: ResponseClassifier,
    audit: Arc<AuditLog>,
    timeout: Duration,
}

impl CommandExecutor {
    /// Executor for the device at `address`.
    pub fn new(
        address: impl Into<String>,
        classifier: ResponseClassifier,
        audit: Arc<AuditLog>,
        timeout: Duration,
    ) -> Self {
        Self {
            address: address.into(),
            classifier,
            audit,
            timeout,
        }
    }

    /// The classifier applied to every response.
    pub fn classifier(&self) -> &ResponseClassifier {
        &self.classifier
    }

    /// Send one step as a single configuration transaction.
    ///
    /// Never retries and never fails: faults become `SessionError`
    /// outcomes. Exactly one audit record is written per call.
    pub async fn execute<S: DeviceSession>(&self, session: &mut S, step: &CommandStep) -> StepOutcome {
        debug!("{} <- [{}] {:?}", self.address, step.label(), step.commands());

        let outcome = match tokio::time::timeout(self.timeout, session.send_config(step.commands())).await {
            Ok(Ok(response)) => match self.classifier.matched_marker(&response) {
                Some(marker) => {
                    let marker = marker.to_string();
                    StepOutcome::rejected(step, response, marker)
                }
                None => StepOutcome::applied(step, response),
            },
            Ok(Err(e)) => StepOutcome::session_error(step, e.to_string()),
            Err(_) => StepOutcome::session_error(step, TransportError::Timeout(self.timeout).to_string()),
        };

        if outcome.classification.is_error() {
            warn!("{} [{}] {}: {}", self.address, step.label(), outcome.classification, outcome.cause());
        }

        self.audit_outcome(&outcome).await;
        outcome
    }

    async fn audit_outcome(&self, outcome: &StepOutcome) {
        let detail = outcome.response.trim();
        let event = if detail.is_empty() {
            format!("{} [{}] {}", self.address, outcome.label, outcome.classification)
        } else {
            format!(
                "{} [{}] {}: {}",
                self.address, outcome.label, outcome.classification, detail
            )
        };

        if let Err(e) = self.audit.record(event).await {
            warn!("{}: audit write failed: {}", self.address, e);
        }
    }
}
