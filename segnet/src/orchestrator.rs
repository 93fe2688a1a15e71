//! Per-device orchestration.
//!
//! Acquire a session, elevate, run the role's plan step by step, take the
//! dialect's verification reads, release the session. Steps are applied
//! best-effort: a rejected or faulted step never stops the ones after it,
//! only a session that is confirmed dead does.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use log::{debug, info, warn};
use tokio_util::sync::CancellationToken;

use crate::audit::AuditLog;
use crate::error::TransportError;
use crate::executor::{CommandExecutor, ResponseClassifier};
use crate::model::{DeviceDescriptor, NetworkIntent};
use crate::plan::build_plan;
use crate::platform::Dialect;
use crate::report::{Classification, DeviceReport, StepOutcome, VerificationRead};
use crate::session::{DeviceSession, SessionConnector};

/// Fault text for steps skipped after the session died.
const SESSION_UNUSABLE: &str = "session unusable";

/// Configures one device at a time against the shared intent.
pub struct DeviceOrchestrator<C> {
    connector: C,
    intent: Arc<NetworkIntent>,
    audit: Arc<AuditLog>,
    classifiers: HashMap<Dialect, ResponseClassifier>,
    command_timeout: Duration,
    session_timeout: Duration,
    cancel: CancellationToken,
}

impl<C: SessionConnector> DeviceOrchestrator<C> {
    /// Orchestrator with built-in marker sets and 30s/60s timeouts.
    pub fn new(connector: C, intent: impl Into<Arc<NetworkIntent>>, audit: Arc<AuditLog>) -> Self {
        Self {
            connector,
            intent: intent.into(),
            audit,
            classifiers: Dialect::ALL
                .into_iter()
                .map(|d| (d, ResponseClassifier::for_dialect(d)))
                .collect(),
            command_timeout: Duration::from_secs(30),
            session_timeout: Duration::from_secs(60),
            cancel: CancellationToken::new(),
        }
    }

    /// Override rejection markers per dialect.
    pub fn with_markers(mut self, markers: HashMap<Dialect, Vec<String>>) -> Self {
        for (dialect, set) in markers {
            self.classifiers.insert(dialect, ResponseClassifier::new(set));
        }
        self
    }

    /// Set the per-step and session-acquisition timeouts.
    pub fn with_timeouts(mut self, command: Duration, session: Duration) -> Self {
        self.command_timeout = command;
        self.session_timeout = session;
        self
    }

    /// Stop starting new steps and devices once `token` is cancelled.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// The shared audit log.
    pub fn audit(&self) -> &Arc<AuditLog> {
        &self.audit
    }

    /// The cancellation token checked between steps.
    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    fn classifier(&self, dialect: Dialect) -> ResponseClassifier {
        self.classifiers
            .get(&dialect)
            .cloned()
            .unwrap_or_else(|| ResponseClassifier::for_dialect(dialect))
    }

    async fn record(&self, event: String) {
        if let Err(e) = self.audit.record(event).await {
            warn!("audit write failed: {}", e);
        }
    }

    /// Configure one device and report what happened.
    ///
    /// Never fails: connection problems and step faults end up in the
    /// report and the audit log.
    pub async fn configure_device(&self, device: &DeviceDescriptor) -> DeviceReport {
        if self.cancel.is_cancelled() {
            self.record(format!("{} skipped: run cancelled", device.address)).await;
            return DeviceReport::cancelled(device.clone());
        }

        info!("configuring {} as {}", device, device.role);

        let mut session = match self.acquire(device).await {
            Ok(session) => session,
            Err(outcome) => {
                warn!("{}: {}", device, outcome.response);
                self.record(format!(
                    "{} [{}] CONNECTION FAILED: {}",
                    device.address, outcome.label, outcome.response
                ))
                .await;
                return DeviceReport::connection_failed(device.clone(), outcome);
            }
        };

        let mut report = DeviceReport::new(device.clone());
        let plan = build_plan(device, &self.intent);
        let executor = CommandExecutor::new(
            device.address.clone(),
            self.classifier(device.dialect),
            Arc::clone(&self.audit),
            self.command_timeout,
        );

        let mut steps = plan.iter();
        while let Some(step) = steps.next() {
            if self.cancel.is_cancelled() {
                report.cancelled = true;
                self.record(format!(
                    "{} run cancelled before [{}]",
                    device.address,
                    step.label()
                ))
                .await;
                break;
            }

            let outcome = executor.execute(&mut session, step).await;
            let faulted = outcome.classification == Classification::SessionError;
            report.steps.push(outcome);

            if faulted && !session.is_alive() {
                warn!("{}: session lost, skipping remaining steps", device);
                for skipped in steps.by_ref() {
                    self.record(format!(
                        "{} [{}] {}: {}",
                        device.address,
                        skipped.label(),
                        Classification::SessionError,
                        SESSION_UNUSABLE
                    ))
                    .await;
                    report
                        .steps
                        .push(StepOutcome::session_error(skipped, SESSION_UNUSABLE));
                }
                break;
            }
        }

        if !report.cancelled && session.is_alive() {
            report.verification = self.verify(&mut session, device, executor.classifier()).await;
        }

        match tokio::time::timeout(self.command_timeout, session.close()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => debug!("{}: close failed: {}", device.address, e),
            Err(_) => debug!("{}: close timed out", device.address),
        }

        let applied = report.changes().count();
        let errors = report.errors().count();
        info!("{}: {} applied, {} errors", device, applied, errors);
        self.record(format!(
            "{} finished: {} applied, {} errors",
            device.address, applied, errors
        ))
        .await;

        report
    }

    /// Open and elevate a session within the session timeout.
    async fn acquire(&self, device: &DeviceDescriptor) -> Result<C::Session, StepOutcome> {
        let timed_out = || TransportError::Timeout(self.session_timeout).to_string();

        let opened = tokio::time::timeout(self.session_timeout, self.connector.open(device)).await;
        let mut session = match opened {
            Ok(Ok(session)) => session,
            Ok(Err(e)) => return Err(StepOutcome::connection_failed("connect", e.to_string())),
            Err(_) => return Err(StepOutcome::connection_failed("connect", timed_out())),
        };

        let elevated = tokio::time::timeout(self.session_timeout, session.elevate()).await;
        let fault = match elevated {
            Ok(Ok(())) => return Ok(session),
            Ok(Err(e)) => e.to_string(),
            Err(_) => timed_out(),
        };

        if let Err(e) = session.close().await {
            debug!("{}: close after failed elevation: {}", device.address, e);
        }
        Err(StepOutcome::connection_failed("elevate", fault))
    }

    /// Run the dialect's read-only verification commands.
    ///
    /// A read whose output carries a rejection marker counts as failed.
    async fn verify<S: DeviceSession>(
        &self,
        session: &mut S,
        device: &DeviceDescriptor,
        classifier: &ResponseClassifier,
    ) -> Vec<VerificationRead> {
        let mut reads = Vec::new();

        for command in device.dialect.definition().verification_commands {
            let result = tokio::time::timeout(self.command_timeout, session.send_read(&command)).await;
            let read = match result {
                Ok(Ok(output)) => VerificationRead {
                    failed: classifier.classify(&output) == Classification::Rejected,
                    command,
                    output,
                },
                Ok(Err(e)) => VerificationRead {
                    command,
                    output: e.to_string(),
                    failed: true,
                },
                Err(_) => VerificationRead {
                    command,
                    output: TransportError::Timeout(self.command_timeout).to_string(),
                    failed: true,
                },
            };
            if read.failed {
                warn!("{}: verification '{}' failed: {}", device.address, read.command, read.output);
            }
            reads.push(read);
        }

        reads
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;
    use crate::audit::line_pattern;
    use crate::model::DeviceRole;
    use crate::plan::fixtures::{device, lab_intent};
    use crate::session::scripted::{Reply, Script, ScriptedConnector};

    struct Harness {
        _dir: tempfile::TempDir,
        path: PathBuf,
        connector: ScriptedConnector,
        orchestrator: DeviceOrchestrator<ScriptedConnector>,
    }

    impl Harness {
        async fn new(connector: ScriptedConnector) -> Self {
            let dir = tempfile::tempdir().unwrap();
            let path = dir.path().join("audit.log");
            let audit = Arc::new(AuditLog::open(&path).await.unwrap());
            let orchestrator = DeviceOrchestrator::new(connector.clone(), lab_intent(), audit)
                .with_timeouts(Duration::from_millis(200), Duration::from_secs(5));
            Self {
                _dir: dir,
                path,
                connector,
                orchestrator,
            }
        }

        fn audit_lines(&self) -> Vec<String> {
            std::fs::read_to_string(&self.path)
                .unwrap()
                .lines()
                .map(str::to_string)
                .collect()
        }
    }

    fn switch() -> DeviceDescriptor {
        device("sw57", DeviceRole::AccessSwitch, "10.10.14.2")
    }

    fn plan_len(device: &DeviceDescriptor) -> usize {
        build_plan(device, &lab_intent()).len()
    }

    #[tokio::test]
    async fn test_full_plan_applied() {
        let sw = switch();
        let h = Harness::new(ScriptedConnector::default()).await;

        let report = h.orchestrator.configure_device(&sw).await;
        assert_eq!(report.steps.len(), plan_len(&sw));
        assert!(!report.has_errors());

        let script = h.connector.script(&sw.address);
        let script = script.lock().unwrap();
        assert!(script.elevated);
        assert!(script.closed);
        assert_eq!(script.reads, ["show vlan brief", "show interfaces trunk"]);

        let labels: Vec<_> = report.steps.iter().map(|s| s.label.clone()).collect();
        let expected: Vec<_> = build_plan(&sw, &lab_intent())
            .iter()
            .map(|s| s.label().to_string())
            .collect();
        assert_eq!(labels, expected);
        assert_eq!(report.verification.len(), 2);
        assert!(report.verification.iter().all(|r| !r.failed));

        let lines = h.audit_lines();
        assert_eq!(lines.len(), plan_len(&sw) + 1);
        assert!(lines.iter().all(|l| line_pattern().is_match(l)));
        assert!(lines.last().unwrap().contains("finished: 7 applied, 0 errors"));
    }

    #[tokio::test]
    async fn test_fault_mid_plan_continues() {
        let sw = switch();
        let connector = ScriptedConnector::default().with(
            &sw.address,
            Script::replying([Reply::Output(String::new()), Reply::Fault]),
        );
        let h = Harness::new(connector).await;

        let report = h.orchestrator.configure_device(&sw).await;
        assert_eq!(report.steps.len(), plan_len(&sw));
        assert_eq!(report.steps[0].classification, Classification::Applied);
        assert_eq!(report.steps[1].classification, Classification::SessionError);
        assert!(report.steps[2..]
            .iter()
            .all(|s| s.classification == Classification::Applied));

        let sent = h.connector.script(&sw.address).lock().unwrap().sent.len();
        assert_eq!(sent, plan_len(&sw));
    }

    #[tokio::test]
    async fn test_rejected_step_does_not_stop_plan() {
        let sw = switch();
        let connector = ScriptedConnector::default().with(
            &sw.address,
            Script::replying([Reply::Output("% Invalid input detected at '^' marker.".into())]),
        );
        let h = Harness::new(connector).await;

        let report = h.orchestrator.configure_device(&sw).await;
        assert_eq!(report.steps.len(), plan_len(&sw));
        assert_eq!(report.errors().count(), 1);
        assert_eq!(report.changes().count(), plan_len(&sw) - 1);
    }

    #[tokio::test]
    async fn test_timeout_is_session_error_and_plan_continues() {
        let sw = switch();
        let connector =
            ScriptedConnector::default().with(&sw.address, Script::replying([Reply::Hang]));
        let h = Harness::new(connector).await;

        let report = h.orchestrator.configure_device(&sw).await;
        assert_eq!(report.steps.len(), plan_len(&sw));
        assert_eq!(report.steps[0].classification, Classification::SessionError);
        assert_eq!(report.errors().count(), 1);
    }

    #[tokio::test]
    async fn test_dead_session_records_remaining_steps() {
        let sw = switch();
        let connector = ScriptedConnector::default().with(
            &sw.address,
            Script::replying([Reply::Output(String::new()), Reply::Drop]),
        );
        let h = Harness::new(connector).await;

        let report = h.orchestrator.configure_device(&sw).await;
        assert_eq!(report.steps.len(), plan_len(&sw));
        assert_eq!(report.steps[0].classification, Classification::Applied);
        assert!(report.steps[1..]
            .iter()
            .all(|s| s.classification == Classification::SessionError));
        assert!(report.steps[2..].iter().all(|s| s.response == SESSION_UNUSABLE));
        assert!(report.verification.is_empty());

        let sent = h.connector.script(&sw.address).lock().unwrap().sent.len();
        assert_eq!(sent, 2);

        // one record per step plus the summary
        assert_eq!(h.audit_lines().len(), plan_len(&sw) + 1);
    }

    #[tokio::test]
    async fn test_open_failure_report() {
        let sw = switch();
        let connector = ScriptedConnector::default().with(
            &sw.address,
            Script {
                open_error: true,
                ..Script::default()
            },
        );
        let h = Harness::new(connector).await;

        let report = h.orchestrator.configure_device(&sw).await;
        assert!(report.steps.is_empty());
        let error = report.connection_error.as_ref().unwrap();
        assert_eq!(error.classification, Classification::SessionError);
        assert!(error.response.contains("Authentication failed"));
        assert_eq!(report.errors().count(), 1);

        let lines = h.audit_lines();
        assert_eq!(lines.len(), 1);
        assert!(lines[0].contains("10.10.14.2 [connect] CONNECTION FAILED"));
    }

    #[tokio::test]
    async fn test_elevate_failure_report() {
        let sw = switch();
        let connector = ScriptedConnector::default().with(
            &sw.address,
            Script {
                elevate_error: true,
                ..Script::default()
            },
        );
        let h = Harness::new(connector).await;

        let report = h.orchestrator.configure_device(&sw).await;
        assert!(report.steps.is_empty());
        assert_eq!(report.connection_error.as_ref().unwrap().label, "elevate");

        let script = h.connector.script(&sw.address);
        let script = script.lock().unwrap();
        assert!(script.sent.is_empty());
        assert!(script.closed);
    }

    #[tokio::test]
    async fn test_router_verification_reads() {
        let r1 = device("r1", DeviceRole::EdgeRouter, "10.10.14.1");
        let h = Harness::new(ScriptedConnector::default()).await;

        let report = h.orchestrator.configure_device(&r1).await;
        assert_eq!(report.steps.len(), plan_len(&r1));
        let reads: Vec<_> = report.verification.iter().map(|r| r.command.as_str()).collect();
        assert_eq!(
            reads,
            ["/interface vlan print", "/ip address print", "/ip route print"]
        );
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let sw = switch();
        let h = Harness::new(ScriptedConnector::default()).await;
        h.orchestrator.cancellation_token().cancel();

        let report = h.orchestrator.configure_device(&sw).await;
        assert!(report.cancelled);
        assert!(report.steps.is_empty());
        assert!(h.connector.opened.lock().unwrap().is_empty());
        assert_eq!(h.audit_lines().len(), 1);
    }

    #[tokio::test]
    async fn test_cancelled_mid_plan_stops_remaining_steps() {
        let sw = switch();
        let connector =
            ScriptedConnector::default().with(&sw.address, Script::replying([Reply::Hang]));
        let h = Harness::new(connector).await;

        let cancel = async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            h.orchestrator.cancellation_token().cancel();
        };
        let (report, ()) = tokio::join!(h.orchestrator.configure_device(&sw), cancel);

        assert!(report.cancelled);
        assert_eq!(report.steps.len(), 1);
        assert!(report.steps.len() < plan_len(&sw));
        assert_eq!(report.steps[0].classification, Classification::SessionError);
        assert!(report.verification.is_empty());

        let script = h.connector.script(&sw.address);
        let script = script.lock().unwrap();
        assert_eq!(script.sent.len(), 1);
        assert!(script.reads.is_empty());
        assert!(script.closed);

        let second = build_plan(&sw, &lab_intent())[1].label().to_string();
        let lines = h.audit_lines();
        assert!(lines
            .iter()
            .any(|l| l.ends_with(&format!("10.10.14.2 run cancelled before [{second}]"))));
        assert!(lines.last().unwrap().contains("finished: 0 applied, 1 errors"));
    }

    #[tokio::test]
    async fn test_rejected_verification_read_is_failed() {
        let sw = switch();
        let connector = ScriptedConnector::default().with(
            &sw.address,
            Script {
                read_output: Some("% Invalid input detected at '^' marker.".into()),
                ..Script::default()
            },
        );
        let h = Harness::new(connector).await;

        let report = h.orchestrator.configure_device(&sw).await;
        assert!(!report.has_errors());
        assert_eq!(report.verification.len(), 2);
        assert!(report.verification.iter().all(|r| r.failed));
    }

    #[tokio::test]
    async fn test_marker_override() {
        let sw = switch();
        let connector = ScriptedConnector::default().with(
            &sw.address,
            Script::replying([Reply::Output("name Error-Handling".into())]),
        );
        let mut h = Harness::new(connector).await;
        let mut markers = HashMap::new();
        markers.insert(Dialect::CiscoIos, vec!["% Invalid".to_string()]);
        h.orchestrator = h.orchestrator.with_markers(markers);

        let report = h.orchestrator.configure_device(&sw).await;
        assert!(!report.has_errors());
    }
}
