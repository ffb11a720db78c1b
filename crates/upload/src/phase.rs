//! Phase tracking for one upload run.
//!
//! Every lifecycle stage is started, then ended as a success or failure and
//! appended to an append-only history. At most one phase is pending at a
//! time; concurrent writers go through [`SharedStatus`].

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

use serde::Serialize;

use crate::error::PhaseError;

/// Lifecycle stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PhaseKind {
    Initialization,
    PartUpload,
    Verification,
    Completion,
}

impl fmt::Display for PhaseKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Initialization => "upload initialization",
            Self::PartUpload => "part upload",
            Self::Verification => "verification",
            Self::Completion => "completion",
        };
        f.write_str(name)
    }
}

/// One finished stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Phase {
    pub kind: PhaseKind,
    /// Only meaningful for [`PhaseKind::PartUpload`].
    pub part_number: Option<u32>,
    pub success: bool,
    pub message: String,
    pub error: Option<String>,
}

impl Phase {
    /// `✓ part upload (Part 2): message (error)`; the error only on failure.
    pub fn summary_line(&self) -> String {
        let glyph = if self.success { "✓" } else { "✗" };
        let mut line = format!("{glyph} {}", self.kind);
        if let (PhaseKind::PartUpload, Some(n)) = (self.kind, self.part_number) {
            line.push_str(&format!(" (Part {n})"));
        }
        if !self.message.is_empty() {
            line.push_str(&format!(": {}", self.message));
        }
        if let Some(err) = self.error.as_ref().filter(|_| !self.success) {
            line.push_str(&format!(" ({err})"));
        }
        line
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct PendingPhase {
    kind: PhaseKind,
    part_number: Option<u32>,
}

/// Ordered phase history plus the in-flight phase.
#[derive(Debug, Clone, Default)]
pub struct UploadStatus {
    phases: Vec<Phase>,
    pending: Option<PendingPhase>,
}

impl UploadStatus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens a phase. Fails if another phase is still pending.
    pub fn start_phase(
        &mut self,
        kind: PhaseKind,
        part_number: Option<u32>,
    ) -> Result<(), PhaseError> {
        if let Some(pending) = self.pending {
            return Err(PhaseError::AlreadyPending(pending.kind.to_string()));
        }
        self.pending = Some(PendingPhase { kind, part_number });
        Ok(())
    }

    /// Closes the pending phase and appends it to the history.
    pub fn end_phase(
        &mut self,
        success: bool,
        message: impl Into<String>,
        error: Option<String>,
    ) -> Result<&Phase, PhaseError> {
        let pending = self.pending.take().ok_or(PhaseError::NotStarted)?;
        self.phases.push(Phase {
            kind: pending.kind,
            part_number: pending.part_number,
            success,
            message: message.into(),
            error,
        });
        Ok(&self.phases[self.phases.len() - 1])
    }

    /// Starts and ends a phase in one step.
    pub fn record(
        &mut self,
        kind: PhaseKind,
        part_number: Option<u32>,
        success: bool,
        message: impl Into<String>,
        error: Option<String>,
    ) -> Result<&Phase, PhaseError> {
        self.start_phase(kind, part_number)?;
        self.end_phase(success, message, error)
    }

    pub fn phases(&self) -> &[Phase] {
        &self.phases
    }

    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }

    pub fn last(&self) -> Option<&Phase> {
        self.phases.last()
    }

    /// First failed phase, if any.
    pub fn failed_phase(&self) -> Option<&Phase> {
        self.phases.iter().find(|p| !p.success)
    }

    pub fn is_success(&self) -> bool {
        !self.phases.is_empty() && self.phases.iter().all(|p| p.success)
    }

    /// Number of phases of `kind` with the given outcome.
    pub fn count(&self, kind: PhaseKind, success: bool) -> usize {
        self.phases
            .iter()
            .filter(|p| p.kind == kind && p.success == success)
            .count()
    }

    /// Renders the history, one line per phase.
    pub fn summary(&self) -> String {
        let mut out = String::from("=== Upload Phase Summary ===");
        for phase in &self.phases {
            out.push('\n');
            out.push_str(&phase.summary_line());
        }
        out
    }
}

/// Thread-safe handle to an [`UploadStatus`].
#[derive(Debug, Clone, Default)]
pub struct SharedStatus {
    inner: Arc<Mutex<UploadStatus>>,
}

impl SharedStatus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn start_phase(
        &self,
        kind: PhaseKind,
        part_number: Option<u32>,
    ) -> Result<(), PhaseError> {
        self.lock().start_phase(kind, part_number)
    }

    /// Ends the pending phase and returns a copy of it.
    pub fn end_phase(
        &self,
        success: bool,
        message: impl Into<String>,
        error: Option<String>,
    ) -> Result<Phase, PhaseError> {
        self.lock().end_phase(success, message, error).cloned()
    }

    pub fn record(
        &self,
        kind: PhaseKind,
        part_number: Option<u32>,
        success: bool,
        message: impl Into<String>,
        error: Option<String>,
    ) -> Result<Phase, PhaseError> {
        self.lock()
            .record(kind, part_number, success, message, error)
            .cloned()
    }

    /// Copy of the current status.
    pub fn snapshot(&self) -> UploadStatus {
        self.lock().clone()
    }

    fn lock(&self) -> MutexGuard<'_, UploadStatus> {
        // A panicking writer cannot leave the history half-appended.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}
