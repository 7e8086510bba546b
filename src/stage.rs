//! Stage identity, warnings and failure policy handling shared by all stages.

use crate::agents::FailurePolicy;
use crate::error::{InstallError, Result};
use std::fmt;

/// Orchestrator states, in the order a successful run visits them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Validating,
    Configuring,
    Linking,
    Building,
    ActivatingNetwork,
    ActivatingAgents,
    Done,
    Failed,
}

impl RunState {
    pub fn name(&self) -> &'static str {
        match self {
            RunState::Validating => "validating",
            RunState::Configuring => "configuring",
            RunState::Linking => "linking",
            RunState::Building => "building",
            RunState::ActivatingNetwork => "activating-network",
            RunState::ActivatingAgents => "activating-agents",
            RunState::Done => "done",
            RunState::Failed => "failed",
        }
    }

    /// Next state on success. Terminal states map to themselves.
    pub fn next(&self) -> RunState {
        match self {
            RunState::Validating => RunState::Configuring,
            RunState::Configuring => RunState::Linking,
            RunState::Linking => RunState::Building,
            RunState::Building => RunState::ActivatingNetwork,
            RunState::ActivatingNetwork => RunState::ActivatingAgents,
            RunState::ActivatingAgents => RunState::Done,
            RunState::Done => RunState::Done,
            RunState::Failed => RunState::Failed,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, RunState::Done | RunState::Failed)
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A non-fatal problem, kept for the final summary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Warning {
    pub stage: RunState,
    pub message: String,
}

/// Warning sink for the stage currently running.
#[derive(Debug)]
pub struct StageLog {
    stage: RunState,
    warnings: Vec<Warning>,
}

impl StageLog {
    pub fn new(stage: RunState) -> Self {
        Self {
            stage,
            warnings: Vec::new(),
        }
    }

    pub fn stage(&self) -> RunState {
        self.stage
    }

    /// Log a warning now and keep it for the summary.
    pub fn warn(&mut self, message: impl Into<String>) {
        let message = message.into();
        tracing::warn!("{}", message);
        self.warnings.push(Warning {
            stage: self.stage,
            message,
        });
    }

    pub fn warnings(&self) -> &[Warning] {
        &self.warnings
    }

    pub fn into_warnings(self) -> Vec<Warning> {
        self.warnings
    }

    /// Route a step error through its failure policy: `Abort` propagates
    /// it, `Warn` records it and lets the stage continue.
    pub fn apply(&mut self, policy: FailurePolicy, result: Result<()>) -> Result<()> {
        match (result, policy) {
            (Ok(()), _) => Ok(()),
            (Err(e), FailurePolicy::Abort) => Err(e),
            (Err(e), FailurePolicy::Warn) => {
                self.warn(e.to_string());
                Ok(())
            }
        }
    }
}

/// Outcome of one stage as shown in the summary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageStatus {
    Ok,
    OkWithWarnings,
    Fatal,
}

impl StageStatus {
    pub fn label(&self) -> &'static str {
        match self {
            StageStatus::Ok => "ok",
            StageStatus::OkWithWarnings => "ok-with-warnings",
            StageStatus::Fatal => "fatal",
        }
    }
}

/// Convenience for stages that fail on a non-zero exit.
pub fn ensure_success(
    output: &crate::process::CommandOutput,
    what: impl FnOnce(String) -> InstallError,
) -> Result<()> {
    if output.success {
        Ok(())
    } else {
        Err(what(output.failure_reason()))
    }
}
