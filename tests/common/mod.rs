#![allow(dead_code)]

use satellite_install::agents::registry;
use satellite_install::environment::TargetEnvironment;
use satellite_install::error::Result;
use satellite_install::materialize::prompt::{Prompter, Question};
use satellite_install::orchestrator::RunPolicy;
use satellite_install::process::{CommandOutput, CommandRunner, Invocation};
use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::fs;
use std::os::unix::net::UnixListener;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use tempfile::TempDir;

pub const DT_URL_TEMPLATE: &str = "https://dtrack.test.internal";

#[derive(Default)]
struct FakeState {
    calls: Vec<Invocation>,
    failing: Vec<String>,
    missing: Vec<String>,
    hidden_units: Vec<String>,
    python_version: Option<String>,
    rootless: Option<String>,
}

/// Records every invocation and answers like a healthy rootless host,
/// unless told otherwise.
#[derive(Clone, Default)]
pub struct FakeRunner {
    state: Rc<RefCell<FakeState>>,
}

impl FakeRunner {
    /// Any invocation whose command line starts with `prefix` fails.
    pub fn fail(&self, prefix: &str) {
        self.state.borrow_mut().failing.push(prefix.to_string());
    }

    pub fn missing(&self, program: &str) {
        self.state.borrow_mut().missing.push(program.to_string());
    }

    /// Pretend the supervisor did not generate `service`.
    pub fn hide_unit(&self, service: &str) {
        self.state.borrow_mut().hidden_units.push(service.to_string());
    }

    pub fn python_version(&self, version: &str) {
        self.state.borrow_mut().python_version = Some(version.to_string());
    }

    /// What `podman info` reports for the rootless flag.
    pub fn rootless(&self, answer: &str) {
        self.state.borrow_mut().rootless = Some(answer.to_string());
    }

    pub fn calls(&self) -> Vec<Invocation> {
        self.state.borrow().calls.clone()
    }

    pub fn lines(&self) -> Vec<String> {
        self.calls().iter().map(|c| c.display()).collect()
    }

    pub fn ran(&self, prefix: &str) -> bool {
        self.lines().iter().any(|l| l.starts_with(prefix))
    }

    pub fn clear(&self) {
        self.state.borrow_mut().calls.clear();
    }
}

impl CommandRunner for FakeRunner {
    fn resolve(&self, program: &str) -> Option<PathBuf> {
        if self.state.borrow().missing.iter().any(|p| p == program) {
            None
        } else {
            Some(PathBuf::from("/usr/bin").join(program))
        }
    }

    fn run(&self, invocation: &Invocation) -> Result<CommandOutput> {
        let line = invocation.display();
        let mut state = self.state.borrow_mut();
        state.calls.push(invocation.clone());

        if state.failing.iter().any(|p| line.starts_with(p.as_str())) {
            return Ok(CommandOutput {
                success: false,
                code: Some(1),
                stdout: String::new(),
                stderr: "simulated failure".to_string(),
            });
        }

        let mut out = CommandOutput {
            success: true,
            code: Some(0),
            ..Default::default()
        };

        if invocation.program == "python3" {
            let version = state.python_version.as_deref().unwrap_or("3.12.3");
            out.stdout = format!("Python {}\n", version);
        } else if line.starts_with("systemctl --user list-unit-files") {
            let service = invocation.args.last().cloned().unwrap_or_default();
            if state.hidden_units.contains(&service) {
                out.success = false;
                out.code = Some(1);
            } else {
                out.stdout = format!("{} generated -\n", service);
            }
        } else if line.starts_with("podman info") {
            let rootless = state.rootless.as_deref().unwrap_or("true");
            out.stdout = format!("{}\n", rootless);
        }

        Ok(out)
    }
}

/// Answers keyed by env key; unanswered questions get an empty answer.
#[derive(Default)]
pub struct ScriptedPrompter {
    answers: HashMap<String, VecDeque<String>>,
    pub asked: Vec<(String, Option<String>)>,
    pub notices: Vec<String>,
}

impl ScriptedPrompter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn answer(mut self, key: &str, value: &str) -> Self {
        self.answers
            .entry(key.to_string())
            .or_default()
            .push_back(value.to_string());
        self
    }

    pub fn default_offered(&self, key: &str) -> Option<Option<String>> {
        self.asked
            .iter()
            .rev()
            .find(|(k, _)| k == key)
            .map(|(_, d)| d.clone())
    }

    pub fn times_asked(&self, key: &str) -> usize {
        self.asked.iter().filter(|(k, _)| k == key).count()
    }
}

impl Prompter for ScriptedPrompter {
    fn ask(&mut self, question: &Question<'_>) -> Result<String> {
        self.asked.push((
            question.key.to_string(),
            question.default.map(str::to_string),
        ));
        Ok(self
            .answers
            .get_mut(question.key)
            .and_then(|q| q.pop_front())
            .unwrap_or_default())
    }

    fn notify(&mut self, message: &str) {
        self.notices.push(message.to_string());
    }
}

/// Temporary host: a bundle, an install root, a discovery directory and
/// (optionally) a live control socket.
pub struct Fixture {
    pub dir: TempDir,
    pub runner: FakeRunner,
    _socket: Option<UnixListener>,
}

impl Fixture {
    pub fn new() -> Self {
        let fixture = Self::without_socket();
        let socket = fixture.socket_path();
        fs::create_dir_all(socket.parent().unwrap()).unwrap();
        let listener = UnixListener::bind(&socket).unwrap();
        Self {
            _socket: Some(listener),
            ..fixture
        }
    }

    pub fn without_socket() -> Self {
        let dir = tempfile::tempdir().unwrap();
        write_bundle(&dir.path().join("bundle"));
        Self {
            dir,
            runner: FakeRunner::default(),
            _socket: None,
        }
    }

    pub fn root(&self) -> PathBuf {
        self.dir.path().join("root")
    }

    pub fn bundle(&self) -> PathBuf {
        self.dir.path().join("bundle")
    }

    pub fn discovery(&self) -> PathBuf {
        self.dir.path().join("config/containers/systemd")
    }

    pub fn socket_path(&self) -> PathBuf {
        self.dir.path().join("run/podman/podman.sock")
    }

    pub fn env(&self) -> TargetEnvironment {
        TargetEnvironment::new(
            self.root(),
            self.bundle(),
            self.discovery(),
            vec![
                self.dir.path().join("missing/podman.sock"),
                self.socket_path(),
            ],
            Box::new(self.runner.clone()),
        )
    }

    pub fn env_file(&self, name: &str) -> PathBuf {
        self.root().join("secrets").join(name)
    }

    pub fn read_env(&self, name: &str) -> String {
        fs::read_to_string(self.env_file(name)).unwrap()
    }
}

pub fn policy() -> RunPolicy {
    RunPolicy {
        hostname: Some("test-host".to_string()),
        ..RunPolicy::default()
    }
}

pub fn all_agents() -> Vec<&'static satellite_install::agents::AgentDescriptor> {
    registry::ALL.to_vec()
}

/// The answers a first-time operator gives: an API key and local mode.
pub fn first_run_answers() -> ScriptedPrompter {
    ScriptedPrompter::new()
        .answer("DT_API_KEY", "odt_first_key")
        .answer("AGENT_MODE", "local")
}

pub fn write_bundle(bundle: &Path) {
    let write = |rel: &str, content: &str| {
        let path = bundle.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    };

    write(
        "templates/dtrack.env",
        &format!(
            "DT_URL={}\nDT_API_KEY=template-key-must-not-be-used\nDT_PROJECT_VERSION=v1.0.0\n",
            DT_URL_TEMPLATE
        ),
    );
    write(
        "templates/opensearch.env",
        "PODMAN_SOCKET_PATH=/run/podman/podman.sock\n\
         OPENSEARCH_URL=http://logs.test:9200\n\
         AGENT_MODE=opensearch\n",
    );
    write("quadlets/satellites.network", "[Network]\n");
    write("quadlets/dtrack-agent.container", "[Container]\nImage=dtrack\n");
    write("quadlets/opensearch-agent.container", "[Container]\nImage=os\n");
    write("quadlets/cadvisor.container", "[Container]\nImage=cadvisor\n");
    write("image_builds/dtrack/Containerfile", "FROM scratch\n");
    write("image_builds/dtrack/agent.py", "print('dtrack')\n");
    write("image_builds/dtrack/build.sh", "podman build .\n");
    write("image_builds/opensearch/Containerfile", "FROM scratch\n");
    write("image_builds/opensearch/agent.py", "print('opensearch')\n");
}
