//! Container image builds.

use crate::agents::{AgentDescriptor, BuildStyle, FailurePolicy};
use crate::environment::TargetEnvironment;
use crate::error::{InstallError, Result};
use crate::preflight::{CONTAINER_TOOL, SHELL};
use crate::process::Invocation;
use crate::stage::StageLog;
use std::fs;

/// One image build with the policy that decides what its failure means.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuildStep {
    pub agent: &'static AgentDescriptor,
    pub style: BuildStyle,
    pub policy: FailurePolicy,
}

pub struct BuildOrchestrator<'a> {
    env: &'a TargetEnvironment,
    steps: Vec<BuildStep>,
}

impl<'a> BuildOrchestrator<'a> {
    /// Plan builds for the agents that have an image. `policy_for` maps an
    /// agent to its effective failure policy.
    pub fn new(
        env: &'a TargetEnvironment,
        agents: &[&'static AgentDescriptor],
        policy_for: impl Fn(&AgentDescriptor) -> FailurePolicy,
    ) -> Self {
        let steps = agents
            .iter()
            .copied()
            .filter_map(|agent| {
                agent.build.map(|style| BuildStep {
                    agent,
                    style,
                    policy: policy_for(agent),
                })
            })
            .collect();
        Self { env, steps }
    }

    pub fn steps(&self) -> &[BuildStep] {
        &self.steps
    }

    /// Run every build in order. A failing `Abort` step ends the stage; a
    /// failing `Warn` step is logged and the next build starts.
    pub fn build_all(&self, log: &mut StageLog) -> Result<()> {
        for step in &self.steps {
            tracing::info!(
                "building {} image (on failure: {})",
                step.agent.name,
                step.policy.as_str()
            );
            let result = self.build(step);
            if result.is_ok() {
                tracing::info!("{} image built", step.agent.name);
            }
            log.apply(step.policy, result)?;
        }
        Ok(())
    }

    fn build(&self, step: &BuildStep) -> Result<()> {
        let agent = step.agent;
        let context = self.env.build_context_dir(agent);
        self.stage_sources(agent)?;

        let invocation = match step.style {
            BuildStyle::Script { script } => {
                Invocation::new(SHELL, &[script]).in_dir(&context)
            }
            BuildStyle::Generic { tag } => {
                let context_arg = context.to_string_lossy();
                Invocation::new(
                    CONTAINER_TOOL,
                    &["build", "--no-cache", "-t", tag, &context_arg],
                )
            }
        }
        .streaming();

        let output = self.env.runner().run(&invocation)?;
        if !output.success {
            return Err(InstallError::Build {
                agent: agent.name.to_string(),
                reason: format!(
                    "'{}' failed with {}",
                    invocation.display(),
                    output.failure_reason()
                ),
            });
        }
        Ok(())
    }

    /// Copy the agent's packaged files into its build context.
    fn stage_sources(&self, agent: &AgentDescriptor) -> Result<()> {
        let context = self.env.build_context_dir(agent);
        self.env.ensure_dir(&context)?;
        for file in agent.source_files {
            let source = self.env.bundle_source(agent, file);
            let dest = context.join(file);
            fs::copy(&source, &dest).map_err(|e| InstallError::fs(&source, e))?;
        }
        Ok(())
    }
}
