//! Step outcomes and per-device reports.

use std::fmt;

use serde::Serialize;

use crate::model::{CommandStep, DeviceDescriptor};

/// How a step ended.
///
/// Every response maps to exactly one class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Classification {
    /// The device accepted every command in the step.
    Applied,
    /// The device refused a command in the step.
    Rejected,
    /// The session faulted or timed out while sending the step.
    SessionError,
}

impl Classification {
    /// Whether the outcome belongs to the error ledger.
    pub fn is_error(self) -> bool {
        !matches!(self, Classification::Applied)
    }
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Classification::Applied => "APPLIED",
            Classification::Rejected => "REJECTED",
            Classification::SessionError => "SESSION ERROR",
        })
    }
}

/// Result of executing one [`CommandStep`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepOutcome {
    /// Label of the step.
    pub label: String,

    /// Commands that were sent.
    pub commands: Vec<String>,

    /// Raw device response, or the fault text for session errors.
    pub response: String,

    /// Outcome class.
    pub classification: Classification,

    /// Rejection marker that matched, for rejected steps.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub marker: Option<String>,
}

impl StepOutcome {
    /// Outcome for a step the device accepted.
    pub fn applied(step: &CommandStep, response: impl Into<String>) -> Self {
        Self::from_step(step, response.into(), Classification::Applied, None)
    }

    /// Outcome for a step the device refused.
    pub fn rejected(step: &CommandStep, response: impl Into<String>, marker: impl Into<String>) -> Self {
        Self::from_step(
            step,
            response.into(),
            Classification::Rejected,
            Some(marker.into()),
        )
    }

    /// Outcome for a step that hit a session fault.
    pub fn session_error(step: &CommandStep, fault: impl Into<String>) -> Self {
        Self::from_step(step, fault.into(), Classification::SessionError, None)
    }

    /// Top-level outcome for a session that could not be established.
    pub fn connection_failed(label: impl Into<String>, fault: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            commands: Vec::new(),
            response: fault.into(),
            classification: Classification::SessionError,
            marker: None,
        }
    }

    fn from_step(
        step: &CommandStep,
        response: String,
        classification: Classification,
        marker: Option<String>,
    ) -> Self {
        Self {
            label: step.label().to_string(),
            commands: step.commands().to_vec(),
            response,
            classification,
            marker,
        }
    }

    /// One-line cause for the error ledger.
    ///
    /// The response line holding the rejection marker when there is one,
    /// otherwise the first non-blank response line.
    pub fn cause(&self) -> &str {
        let mut lines = self.response.lines().map(str::trim).filter(|l| !l.is_empty());
        let by_marker = self
            .marker
            .as_deref()
            .and_then(|m| self.response.lines().map(str::trim).find(|l| l.contains(m)));

        by_marker
            .or_else(|| lines.next())
            .unwrap_or("no response")
    }
}

/// Output of one read-only verification command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VerificationRead {
    /// The command that was sent.
    pub command: String,

    /// Raw output, or the fault text when the read failed.
    pub output: String,

    /// Whether the read failed.
    pub failed: bool,
}

/// Everything that happened to one device during a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceReport {
    /// The device.
    pub device: DeviceDescriptor,

    /// Set when the session could not be opened or elevated.
    pub connection_error: Option<StepOutcome>,

    /// Step outcomes in plan order.
    pub steps: Vec<StepOutcome>,

    /// Verification read-outs in the order they were issued.
    pub verification: Vec<VerificationRead>,

    /// Set when the run was cancelled before this device finished.
    pub cancelled: bool,
}

impl DeviceReport {
    /// Empty report for a device.
    pub fn new(device: DeviceDescriptor) -> Self {
        Self {
            device,
            connection_error: None,
            steps: Vec::new(),
            verification: Vec::new(),
            cancelled: false,
        }
    }

    /// Report for a device whose session could not be established.
    pub fn connection_failed(device: DeviceDescriptor, outcome: StepOutcome) -> Self {
        Self {
            connection_error: Some(outcome),
            ..Self::new(device)
        }
    }

    /// Report for a device that was never started.
    pub fn cancelled(device: DeviceDescriptor) -> Self {
        Self {
            cancelled: true,
            ..Self::new(device)
        }
    }

    /// Change ledger: applied steps.
    pub fn changes(&self) -> impl Iterator<Item = &StepOutcome> {
        self.steps
            .iter()
            .filter(|s| s.classification == Classification::Applied)
    }

    /// Error ledger: the connection failure, then rejected and faulted steps.
    pub fn errors(&self) -> impl Iterator<Item = &StepOutcome> {
        self.connection_error
            .iter()
            .chain(self.steps.iter().filter(|s| s.classification.is_error()))
    }

    /// Whether anything went wrong on this device.
    pub fn has_errors(&self) -> bool {
        self.errors().next().is_some()
    }
}

impl fmt::Display for DeviceReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== {} ({}) ===", self.device.name, self.device.address)?;

        writeln!(f, "-- Changes --")?;
        for outcome in self.changes() {
            writeln!(f, "\u{2714} {}", outcome.label)?;
        }

        writeln!(f, "-- Errors --")?;
        for outcome in self.errors() {
            writeln!(f, "\u{2718} {} -> {}", outcome.label, outcome.cause())?;
        }

        if self.cancelled {
            writeln!(f, "(run cancelled)")?;
        }

        if !self.verification.is_empty() {
            writeln!(f, "-- Verification --")?;
            for read in &self.verification {
                writeln!(f, ">> {}", read.command)?;
                writeln!(f, "{}", read.output.trim_end())?;
            }
        }

        Ok(())
    }
}
