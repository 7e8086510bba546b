//! Drives the stages in order and turns their results into a [`RunOutcome`].

use crate::activate::ServiceActivator;
use crate::agents::{AgentDescriptor, FailurePolicy};
use crate::config::InvalidChoice;
use crate::environment::TargetEnvironment;
use crate::error::{InstallError, Result};
use crate::images::BuildOrchestrator;
use crate::links::UnitLinkManager;
use crate::materialize::prompt::Prompter;
use crate::materialize::ConfigMaterializer;
use crate::preflight::PreflightValidator;
use crate::stage::{RunState, StageLog, StageStatus, Warning};
use semver::Version;
use std::collections::BTreeMap;
use std::fmt::Write;

/// Per-run policy knobs.
#[derive(Debug, Clone)]
pub struct RunPolicy {
    pub min_python: Version,
    pub invalid_choice: InvalidChoice,
    /// Build policy overrides keyed by agent name
    pub build: BTreeMap<String, FailurePolicy>,
    /// Host name for host-derived defaults; detected when `None`
    pub hostname: Option<String>,
}

impl Default for RunPolicy {
    fn default() -> Self {
        Self {
            min_python: Version::new(3, 11, 0),
            invalid_choice: InvalidChoice::Abort,
            build: BTreeMap::new(),
            hostname: None,
        }
    }
}

impl RunPolicy {
    pub fn build_policy(&self, agent: &AgentDescriptor) -> FailurePolicy {
        self.build
            .get(agent.name)
            .copied()
            .unwrap_or(agent.build_policy)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageReport {
    pub stage: RunState,
    pub status: StageStatus,
}

/// The fatal error that ended a run.
#[derive(Debug)]
pub struct Failure {
    pub stage: RunState,
    pub error: InstallError,
}

#[derive(Debug)]
pub struct RunOutcome {
    pub state: RunState,
    pub stages: Vec<StageReport>,
    pub warnings: Vec<Warning>,
    pub failure: Option<Failure>,
}

impl RunOutcome {
    pub fn is_success(&self) -> bool {
        self.state == RunState::Done
    }

    /// Finished, but with warnings to look at.
    pub fn is_degraded(&self) -> bool {
        self.is_success() && !self.warnings.is_empty()
    }

    pub fn exit_code(&self) -> i32 {
        if self.is_success() {
            0
        } else {
            1
        }
    }

    pub fn status_of(&self, stage: RunState) -> Option<StageStatus> {
        self.stages.iter().find(|r| r.stage == stage).map(|r| r.status)
    }

    /// Operator-facing summary printed at the end of a run.
    pub fn summary(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "\nInstallation summary");
        for report in &self.stages {
            let _ = writeln!(out, "  {:<20} {}", report.stage.name(), report.status.label());
        }

        if !self.warnings.is_empty() {
            let _ = writeln!(out, "\nWarnings ({}):", self.warnings.len());
            for warning in &self.warnings {
                let _ = writeln!(out, "  ⚠ [{}] {}", warning.stage, warning.message);
            }
        }

        let result = match (&self.failure, self.is_degraded()) {
            (Some(failure), _) => format!("Failed during {}: {}", failure.stage, failure.error),
            (None, true) => "Done (degraded)".to_string(),
            (None, false) => "Done".to_string(),
        };
        let _ = writeln!(out, "\nResult: {}", result);
        out
    }
}

pub struct Orchestrator<'a> {
    env: &'a TargetEnvironment,
    agents: Vec<&'static AgentDescriptor>,
    policy: RunPolicy,
    state: RunState,
    stages: Vec<StageReport>,
    warnings: Vec<Warning>,
}

impl<'a> Orchestrator<'a> {
    pub fn new(
        env: &'a TargetEnvironment,
        agents: Vec<&'static AgentDescriptor>,
        policy: RunPolicy,
    ) -> Self {
        Self {
            env,
            agents,
            policy,
            state: RunState::Validating,
            stages: Vec::new(),
            warnings: Vec::new(),
        }
    }

    /// Run every stage in order. The first fatal error moves the run to
    /// `Failed` and no later stage starts.
    pub fn run(mut self, prompter: &mut dyn Prompter) -> RunOutcome {
        let env = self.env;
        let agents = self.agents.clone();
        let policy = self.policy.clone();

        while !self.state.is_terminal() {
            let stage = self.state;
            let span = tracing::info_span!("stage", name = stage.name());
            let _guard = span.enter();

            let mut log = StageLog::new(stage);
            let result = run_stage(stage, env, &agents, &policy, prompter, &mut log);
            let had_warnings = !log.warnings().is_empty();
            self.warnings.extend(log.into_warnings());

            match result {
                Ok(()) => {
                    let status = if had_warnings {
                        StageStatus::OkWithWarnings
                    } else {
                        StageStatus::Ok
                    };
                    self.stages.push(StageReport { stage, status });
                    self.state = stage.next();
                }
                Err(error) => {
                    tracing::error!("{}", error);
                    self.stages.push(StageReport {
                        stage,
                        status: StageStatus::Fatal,
                    });
                    self.state = RunState::Failed;
                    return self.finish(Some(Failure { stage, error }));
                }
            }
        }

        self.finish(None)
    }

    fn finish(self, failure: Option<Failure>) -> RunOutcome {
        RunOutcome {
            state: self.state,
            stages: self.stages,
            warnings: self.warnings,
            failure,
        }
    }
}

fn run_stage(
    stage: RunState,
    env: &TargetEnvironment,
    agents: &[&'static AgentDescriptor],
    policy: &RunPolicy,
    prompter: &mut dyn Prompter,
    log: &mut StageLog,
) -> Result<()> {
    match stage {
        RunState::Validating => {
            PreflightValidator::new(env, agents, policy.min_python.clone()).validate()
        }
        RunState::Configuring => {
            let mut materializer = ConfigMaterializer::new(env, agents, policy.invalid_choice);
            if let Some(hostname) = &policy.hostname {
                materializer = materializer.with_hostname(hostname);
            }
            materializer.materialize(prompter, log).map(drop)
        }
        RunState::Linking => UnitLinkManager::new(env, agents).install_all().map(drop),
        RunState::Building => {
            BuildOrchestrator::new(env, agents, |a| policy.build_policy(a)).build_all(log)
        }
        RunState::ActivatingNetwork => {
            let activator = ServiceActivator::new(env, agents);
            activator.prepare(log)?;
            activator.start_network(log);
            Ok(())
        }
        RunState::ActivatingAgents => {
            ServiceActivator::new(env, agents).start_agents(log);
            Ok(())
        }
        RunState::Done | RunState::Failed => Ok(()),
    }
}
