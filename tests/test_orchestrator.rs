mod common;

use common::{all_agents, first_run_answers, policy, Fixture, ScriptedPrompter, DT_URL_TEMPLATE};
use satellite_install::error::InstallError;
use satellite_install::orchestrator::Orchestrator;
use satellite_install::stage::{RunState, StageStatus};
use std::fs;

#[test]
fn test_fresh_install_completes() {
    let fx = Fixture::new();
    let env = fx.env();

    let outcome = Orchestrator::new(&env, all_agents(), policy()).run(&mut first_run_answers());

    assert_eq!(outcome.state, RunState::Done);
    assert!(outcome.is_success());
    assert!(!outcome.is_degraded());
    assert_eq!(outcome.exit_code(), 0);
    assert_eq!(outcome.stages.len(), 6);

    let dtrack = fx.read_env("dtrack.env");
    assert!(dtrack.contains(&format!("DT_URL={}\n", DT_URL_TEMPLATE)));
    assert!(dtrack.contains("DT_API_KEY=odt_first_key\n"));

    let opensearch = fx.read_env("opensearch.env");
    assert!(opensearch.contains("AGENT_MODE=local\n"));
    assert!(opensearch.contains(&format!(
        "PODMAN_SOCKET_PATH={}\n",
        fx.socket_path().display()
    )));

    for unit in [
        "satellites.network",
        "dtrack-agent.container",
        "opensearch-agent.container",
        "cadvisor.container",
    ] {
        let link = fx.discovery().join(unit);
        assert_eq!(
            fs::read_link(&link).unwrap(),
            fx.root().join("quadlets").join(unit)
        );
    }

    let lines = fx.runner.lines();
    let network = lines
        .iter()
        .position(|l| l == "systemctl --user start satellites-network.service")
        .unwrap();
    let first_agent = lines
        .iter()
        .position(|l| l == "systemctl --user start dtrack-agent.service")
        .unwrap();
    assert!(network < first_agent);
    assert!(lines.contains(&"systemctl --user start cadvisor.service".to_string()));
    assert!(outcome.summary().contains("Result: Done"));
}

#[test]
fn test_invalid_mode_fails_during_configuring() {
    let fx = Fixture::new();
    let env = fx.env();
    let mut prompter = ScriptedPrompter::new()
        .answer("DT_API_KEY", "odt_key")
        .answer("AGENT_MODE", "remote");

    let outcome = Orchestrator::new(&env, all_agents(), policy()).run(&mut prompter);

    assert_eq!(outcome.state, RunState::Failed);
    assert_eq!(outcome.exit_code(), 1);
    let failure = outcome.failure.as_ref().unwrap();
    assert_eq!(failure.stage, RunState::Configuring);
    assert!(matches!(failure.error, InstallError::InvalidChoice { .. }));
    assert_eq!(outcome.status_of(RunState::Configuring), Some(StageStatus::Fatal));
    assert_eq!(outcome.status_of(RunState::Linking), None);

    assert!(!fx.root().join("quadlets").exists());
    assert!(!fx.root().join("secrets").exists());
    assert_eq!(fs::read_dir(fx.discovery()).unwrap().count(), 0);
    assert!(!fx.runner.ran("podman build"));
    assert!(!fx.runner.ran("bash"));
    assert!(!fx.runner.ran("systemctl --user start"));
}

#[test]
fn test_preflight_failure_writes_nothing() {
    let fx = Fixture::new();
    fx.runner.fail("podman info");
    let env = fx.env();
    let mut prompter = first_run_answers();

    let outcome = Orchestrator::new(&env, all_agents(), policy()).run(&mut prompter);

    assert_eq!(outcome.failure.as_ref().unwrap().stage, RunState::Validating);
    assert!(prompter.asked.is_empty());
    assert!(!fx.root().exists());
    assert_eq!(fx.runner.lines(), vec!["podman info --format {{.Host.Security.Rootless}}"]);
}

#[test]
fn test_missing_socket_fails_before_any_start() {
    let fx = Fixture::without_socket();
    let env = fx.env();

    let outcome = Orchestrator::new(&env, all_agents(), policy()).run(&mut first_run_answers());

    let failure = outcome.failure.as_ref().unwrap();
    assert_eq!(failure.stage, RunState::ActivatingNetwork);
    assert!(matches!(failure.error, InstallError::SocketNotFound(_)));
    assert!(!fx.runner.ran("systemctl --user start"));
    assert!(fx
        .read_env("opensearch.env")
        .contains("PODMAN_SOCKET_PATH=/run/podman/podman.sock\n"));
}

#[test]
fn test_rerun_is_idempotent() {
    let fx = Fixture::new();
    let env = fx.env();

    let first = Orchestrator::new(&env, all_agents(), policy()).run(&mut first_run_answers());
    assert!(first.is_success());
    let dtrack = fs::read(fx.env_file("dtrack.env")).unwrap();
    let opensearch = fs::read(fx.env_file("opensearch.env")).unwrap();
    let links: Vec<_> = fs::read_dir(fx.discovery())
        .unwrap()
        .map(|e| e.unwrap().path())
        .collect();

    let mut second_prompter = ScriptedPrompter::new();
    let second = Orchestrator::new(&env, all_agents(), policy()).run(&mut second_prompter);

    assert!(second.is_success());
    assert_eq!(fs::read(fx.env_file("dtrack.env")).unwrap(), dtrack);
    assert_eq!(fs::read(fx.env_file("opensearch.env")).unwrap(), opensearch);
    assert_eq!(fs::read_dir(fx.discovery()).unwrap().count(), links.len());
    assert_eq!(
        second_prompter.default_offered("DT_API_KEY"),
        Some(Some("odt_first_key".to_string()))
    );
}

#[test]
fn test_warnings_degrade_but_do_not_fail() {
    let fx = Fixture::new();
    fx.runner.fail("podman build");
    fx.runner.fail("systemctl --user start cadvisor.service");
    let env = fx.env();

    let outcome = Orchestrator::new(&env, all_agents(), policy()).run(&mut first_run_answers());

    assert_eq!(outcome.state, RunState::Done);
    assert!(outcome.is_degraded());
    assert_eq!(outcome.exit_code(), 0);
    assert_eq!(outcome.warnings.len(), 2);
    assert_eq!(
        outcome.status_of(RunState::Building),
        Some(StageStatus::OkWithWarnings)
    );
    assert_eq!(
        outcome.status_of(RunState::ActivatingAgents),
        Some(StageStatus::OkWithWarnings)
    );
    assert!(outcome.summary().contains("Done (degraded)"));
}

#[test]
fn test_abort_build_stops_before_activation() {
    let fx = Fixture::new();
    fx.runner.fail("bash build.sh");
    let env = fx.env();

    let outcome = Orchestrator::new(&env, all_agents(), policy()).run(&mut first_run_answers());

    assert_eq!(outcome.failure.as_ref().unwrap().stage, RunState::Building);
    assert!(!fx.runner.ran("systemctl --user daemon-reload"));
}
