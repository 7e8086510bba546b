#![forbid(unsafe_code)]

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use satellite_install::agents::registry;
use satellite_install::cli::Cli;
use satellite_install::config::Config;
use satellite_install::environment::TargetEnvironment;
use satellite_install::materialize::prompt::TerminalPrompter;
use satellite_install::orchestrator::{Orchestrator, RunPolicy};
use satellite_install::process::SystemRunner;

fn main() -> Result<()> {
    let _cli = Cli::parse();

    // Log lines go to stderr so prompts and the summary own stdout
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("SATELLITE_LOG").unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let config = Config::load().context("Failed to load installer configuration")?;

    let root = config
        .root_dir()
        .context("No installation root: set HOME or SATELLITE_ROOT")?;
    let bundle = config.bundle_dir()?;
    let agents = registry::select(&config.agent_names())?;

    let policy = RunPolicy {
        min_python: semver::Version::parse(&config.host.min_python)?,
        invalid_choice: config.policy.invalid_choice,
        build: config.policy.build.clone(),
        hostname: None,
    };

    let runner = SystemRunner::new(config.command_timeout());
    let env = TargetEnvironment::for_current_user(root, bundle, Box::new(runner))?;

    println!("Installing satellites into {}", env.root().display());
    println!(
        "Agents: {}",
        agents.iter().map(|a| a.name).collect::<Vec<_>>().join(", ")
    );

    let mut prompter = TerminalPrompter::new();
    let outcome = Orchestrator::new(&env, agents, policy).run(&mut prompter);

    print!("{}", outcome.summary());

    if let Some(failure) = &outcome.failure {
        eprintln!("Error: {} failed: {}", failure.stage, failure.error);
    }

    std::process::exit(outcome.exit_code());
}
