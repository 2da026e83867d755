//! Shared test utilities and fixtures
//!
//! Common infrastructure for integration tests: a scripted console, recording
//! tool fakes, and a mock Gemini endpoint.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};

use reqwest::Client;
use scribe_config::SettingsStore;
use scribe_context::{ContextLimits, IgnoreRules, ProjectIndex};
use scribe_engine::{Collaborators, Console, Session};
use scribe_providers::retry::RetryConfig;
use scribe_providers::{GeminiClient, ModelClient, ModelRegistry};
use scribe_tools::{CommandOutput, LaunchOutcome, ScriptLauncher, TestRunner, ToolError};
use serde_json::json;
use tempfile::TempDir;
use tokio::runtime::{Builder, Runtime};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// One line of console output, tagged by kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Line {
    Notice(String),
    Error(String),
    Agent(String, String),
    Raw(String),
}

/// [`Console`] that answers prompts from a script and records all output.
#[derive(Debug, Default)]
pub struct ScriptedConsole {
    inputs: VecDeque<String>,
    pub lines: Vec<Line>,
    pub prompts: Vec<String>,
}

impl ScriptedConsole {
    pub fn with_inputs(inputs: &[&str]) -> Self {
        Self {
            inputs: inputs.iter().map(ToString::to_string).collect(),
            ..Self::default()
        }
    }

    pub fn push_inputs(&mut self, inputs: &[&str]) {
        self.inputs.extend(inputs.iter().map(ToString::to_string));
    }

    pub fn saw(&self, needle: &str) -> bool {
        self.lines.iter().any(|line| match line {
            Line::Notice(text) | Line::Error(text) | Line::Raw(text) => text.contains(needle),
            Line::Agent(_, text) => text.contains(needle),
        })
    }

    pub fn errors(&self) -> Vec<&str> {
        self.lines
            .iter()
            .filter_map(|line| match line {
                Line::Error(text) => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }
}

impl Console for ScriptedConsole {
    fn notice(&mut self, text: &str) {
        self.lines.push(Line::Notice(text.to_string()));
    }

    fn error(&mut self, text: &str) {
        self.lines.push(Line::Error(text.to_string()));
    }

    fn agent(&mut self, name: &str, text: &str) {
        self.lines
            .push(Line::Agent(name.to_string(), text.to_string()));
    }

    fn raw(&mut self, text: &str) {
        self.lines.push(Line::Raw(text.to_string()));
    }

    fn prompt(&mut self, prompt: &str) -> Option<String> {
        self.prompts.push(prompt.to_string());
        self.inputs.pop_front()
    }
}

/// Test runner that records invocations and always passes.
#[derive(Debug, Default)]
pub struct RecordingRunner {
    pub calls: Vec<(String, Vec<String>)>,
}

impl TestRunner for RecordingRunner {
    fn run(
        &mut self,
        command: &str,
        args: &[String],
        _cwd: &Path,
    ) -> Result<CommandOutput, ToolError> {
        self.calls.push((command.to_string(), args.to_vec()));
        Ok(CommandOutput {
            exit_code: Some(0),
            stdout: "all passed".to_string(),
            stderr: String::new(),
        })
    }
}

/// Launcher that never opens a terminal.
#[derive(Debug, Default)]
pub struct RecordingLauncher;

impl ScriptLauncher for RecordingLauncher {
    fn launch(&mut self, script: &Path, admin_mode: bool) -> Result<LaunchOutcome, ToolError> {
        if !admin_mode {
            return Ok(LaunchOutcome::AdminDisabled);
        }
        if script.extension().is_none_or(|ext| ext != "py") {
            return Ok(LaunchOutcome::NotAScript);
        }
        Ok(LaunchOutcome::Launched {
            terminal: "test-terminal".to_string(),
        })
    }
}

/// Temporary project directory with a few seeded files.
pub struct Project {
    pub dir: TempDir,
    pub root: PathBuf,
}

impl Project {
    pub fn new(files: &[(&str, &str)]) -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        let root = dir.path().join("demo");
        fs::create_dir_all(&root).expect("create root");
        for (rel, content) in files {
            let path = root.join(rel);
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent).expect("create parent");
            }
            fs::write(path, content).expect("seed file");
        }
        Self { dir, root }
    }

    pub fn read(&self, rel: &str) -> String {
        fs::read_to_string(self.root.join(rel)).expect("read project file")
    }

    pub fn index(&self) -> ProjectIndex {
        ProjectIndex::open(&self.root, IgnoreRules::default())
    }
}

/// Runtime used only for wiremock setup; provider calls run on the registry's own runtime.
pub fn setup_runtime() -> Runtime {
    Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("test runtime")
}

/// Start a mock Gemini server answering every request with `reply`.
pub fn start_gemini_mock(runtime: &Runtime, reply: &str) -> MockServer {
    let body = json!({
        "candidates": [{
            "content": { "parts": [{ "text": reply }] },
            "finishReason": "STOP"
        }]
    });
    runtime.block_on(async {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/models/gemini-test:generateContent"))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .mount(&server)
            .await;
        server
    })
}

/// Registry with a single `gemini` model pointed at `server`.
pub fn gemini_registry(server: &MockServer) -> ModelRegistry {
    let client = GeminiClient::new(Client::new(), "test-key", "gemini-test")
        .with_base_url(server.uri())
        .with_retry(RetryConfig::immediate(0));
    let mut registry = ModelRegistry::new().expect("registry");
    registry.register("gemini", ModelClient::Gemini(client));
    registry
}

/// Session over `project` talking to `registry`, with in-memory settings.
pub fn session(project: &Project, registry: ModelRegistry, admin_mode: bool) -> Session {
    let store = SettingsStore::open_in_memory().expect("settings store");
    let settings = store.load(admin_mode).expect("settings");
    Session::new(
        project.index(),
        store,
        settings,
        ContextLimits::default(),
        Collaborators {
            chat: Box::new(registry),
            tests: Box::new(RecordingRunner::default()),
            launcher: Box::new(RecordingLauncher),
            capture: None,
        },
    )
}
