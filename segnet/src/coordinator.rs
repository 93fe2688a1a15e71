//! Whole-run coordination.

use futures_util::StreamExt;
use futures_util::stream;
use log::{info, warn};

use crate::model::DeviceDescriptor;
use crate::orchestrator::DeviceOrchestrator;
use crate::report::DeviceReport;
use crate::session::SessionConnector;

/// Runs the orchestrator over the whole inventory.
///
/// Switches go first, then routers, each in inventory order. With a
/// concurrency above one, up to that many devices are configured at the same
/// time; reports still come back in inventory order. One device's failure
/// never stops the others.
pub struct RunCoordinator<C> {
    orchestrator: DeviceOrchestrator<C>,
    concurrency: usize,
}

impl<C: SessionConnector> RunCoordinator<C> {
    /// Sequential coordinator.
    pub fn new(orchestrator: DeviceOrchestrator<C>) -> Self {
        Self {
            orchestrator,
            concurrency: 1,
        }
    }

    /// Configure up to `n` devices at once (minimum 1).
    pub fn with_concurrency(mut self, n: usize) -> Self {
        self.concurrency = n.max(1);
        self
    }

    /// The per-device orchestrator.
    pub fn orchestrator(&self) -> &DeviceOrchestrator<C> {
        &self.orchestrator
    }

    async fn record(&self, event: String) {
        if let Err(e) = self.orchestrator.audit().record(event).await {
            warn!("audit write failed: {}", e);
        }
    }

    /// Configure every device and return one report per device.
    pub async fn run(&self, switches: &[DeviceDescriptor], routers: &[DeviceDescriptor]) -> Vec<DeviceReport> {
        self.record(format!(
            "=== Run started: {} switches, {} routers ===",
            switches.len(),
            routers.len()
        ))
        .await;

        let reports: Vec<DeviceReport> = stream::iter(switches.iter().chain(routers))
            .map(|device| self.orchestrator.configure_device(device))
            .buffered(self.concurrency)
            .collect()
            .await;

        let failed = reports.iter().filter(|r| r.has_errors()).count();
        let cancelled = self.orchestrator.cancellation_token().is_cancelled();
        info!(
            "run finished: {} devices, {} with errors{}",
            reports.len(),
            failed,
            if cancelled { " (cancelled)" } else { "" }
        );
        self.record(format!(
            "=== Run finished: {} devices, {} with errors{} ===",
            reports.len(),
            failed,
            if cancelled { ", cancelled" } else { "" }
        ))
        .await;

        if let Err(e) = self.orchestrator.audit().close().await {
            warn!("audit flush failed: {}", e);
        }

        reports
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;
    use crate::audit::{AuditLog, line_pattern};
    use crate::model::DeviceRole;
    use crate::plan::fixtures::{device, lab_intent};
    use crate::session::scripted::{Script, ScriptedConnector};

    fn inventory() -> (Vec<DeviceDescriptor>, Vec<DeviceDescriptor>) {
        (
            vec![
                device("Switch57", DeviceRole::AccessSwitch, "10.10.14.2"),
                device("Switch56", DeviceRole::AccessSwitch, "10.10.14.3"),
            ],
            vec![
                device("R1", DeviceRole::EdgeRouter, "10.10.14.1"),
                device("R2", DeviceRole::RemoteRouter, "10.10.14.4"),
            ],
        )
    }

    async fn coordinator(
        connector: ScriptedConnector,
        dir: &tempfile::TempDir,
    ) -> RunCoordinator<ScriptedConnector> {
        let audit = Arc::new(AuditLog::open(dir.path().join("audit.log")).await.unwrap());
        RunCoordinator::new(
            DeviceOrchestrator::new(connector, lab_intent(), audit)
                .with_timeouts(Duration::from_secs(1), Duration::from_secs(1)),
        )
    }

    fn audit_lines(dir: &tempfile::TempDir) -> Vec<String> {
        std::fs::read_to_string(dir.path().join("audit.log"))
            .unwrap()
            .lines()
            .map(str::to_string)
            .collect()
    }

    #[tokio::test]
    async fn test_switches_then_routers_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let connector = ScriptedConnector::default();
        let (switches, routers) = inventory();

        let reports = coordinator(connector.clone(), &dir)
            .await
            .run(&switches, &routers)
            .await;

        let names: Vec<_> = reports.iter().map(|r| r.device.name.as_str()).collect();
        assert_eq!(names, ["Switch57", "Switch56", "R1", "R2"]);
        assert_eq!(
            *connector.opened.lock().unwrap(),
            ["Switch57", "Switch56", "R1", "R2"]
        );

        let lines = audit_lines(&dir);
        assert!(lines.iter().all(|l| line_pattern().is_match(l)));
        assert!(lines.first().unwrap().contains("Run started: 2 switches, 2 routers"));
        assert!(lines.last().unwrap().contains("Run finished: 4 devices, 0 with errors"));
    }

    #[tokio::test]
    async fn test_connection_failure_does_not_halt_run() {
        let dir = tempfile::tempdir().unwrap();
        let connector = ScriptedConnector::default().with(
            "10.10.14.2",
            Script {
                open_error: true,
                ..Script::default()
            },
        );
        let (switches, routers) = inventory();

        let reports = coordinator(connector.clone(), &dir)
            .await
            .run(&switches, &routers)
            .await;

        assert_eq!(reports.len(), 4);
        assert!(reports[0].connection_error.is_some());
        assert!(reports[0].steps.is_empty());
        assert!(reports[1..].iter().all(|r| !r.has_errors()));
        assert!(!reports[1].steps.is_empty());
        assert!(audit_lines(&dir)
            .last()
            .unwrap()
            .contains("4 devices, 1 with errors"));
    }

    #[tokio::test]
    async fn test_concurrency_preserves_inventory_order() {
        let dir = tempfile::tempdir().unwrap();
        let (switches, routers) = inventory();

        let reports = coordinator(ScriptedConnector::default(), &dir)
            .await
            .with_concurrency(3)
            .run(&switches, &routers)
            .await;

        let names: Vec<_> = reports.iter().map(|r| r.device.name.as_str()).collect();
        assert_eq!(names, ["Switch57", "Switch56", "R1", "R2"]);
        assert!(audit_lines(&dir).iter().all(|l| line_pattern().is_match(l)));
    }

    #[tokio::test]
    async fn test_cancelled_run_skips_devices() {
        let dir = tempfile::tempdir().unwrap();
        let connector = ScriptedConnector::default();
        let (switches, routers) = inventory();

        let coordinator = coordinator(connector.clone(), &dir).await;
        coordinator.orchestrator().cancellation_token().cancel();
        let reports = coordinator.run(&switches, &routers).await;

        assert_eq!(reports.len(), 4);
        assert!(reports.iter().all(|r| r.cancelled && r.steps.is_empty()));
        assert!(connector.opened.lock().unwrap().is_empty());

        let lines = audit_lines(&dir);
        assert_eq!(lines.len(), 1 + 4 + 1);
        assert!(lines.last().unwrap().ends_with("cancelled ==="));
    }
}
