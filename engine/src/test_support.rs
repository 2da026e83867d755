//! Scripted console and fake collaborators for engine tests.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::time::Duration;

use scribe_config::SettingsStore;
use scribe_context::{ContextLimits, IgnoreRules, ProjectIndex};
use scribe_providers::{ChatBackend, ProviderError};
use scribe_tools::{
    CaptureSource, CommandOutput, LaunchOutcome, ScriptLauncher, TestRunner, ToolError,
};
use scribe_types::{ContentPart, ModelHint, Settings};
use tempfile::TempDir;

use crate::console::Console;
use crate::session::{Collaborators, Session};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Kind {
    Notice,
    Error,
    Agent,
    Raw,
}

/// Console fed from a fixed list of input lines. Running out means end of input.
#[derive(Debug, Default)]
pub(crate) struct ScriptedConsole {
    inputs: VecDeque<String>,
    lines: Vec<(Kind, String)>,
    prompts: Vec<String>,
}

impl ScriptedConsole {
    pub(crate) fn with_inputs(inputs: &[&str]) -> Self {
        Self {
            inputs: inputs.iter().map(ToString::to_string).collect(),
            ..Self::default()
        }
    }

    pub(crate) fn output(&self) -> &[(Kind, String)] {
        &self.lines
    }

    fn of(&self, kind: Kind) -> Vec<&str> {
        self.lines
            .iter()
            .filter(|(k, _)| *k == kind)
            .map(|(_, text)| text.as_str())
            .collect()
    }

    pub(crate) fn notices(&self) -> Vec<&str> {
        self.of(Kind::Notice)
    }

    pub(crate) fn errors(&self) -> Vec<&str> {
        self.of(Kind::Error)
    }

    pub(crate) fn raw_lines(&self) -> Vec<&str> {
        self.of(Kind::Raw)
    }

    pub(crate) fn prompts(&self) -> &[String] {
        &self.prompts
    }

    /// Whether any output line contains `needle`.
    pub(crate) fn saw(&self, needle: &str) -> bool {
        self.lines.iter().any(|(_, text)| text.contains(needle))
    }

    pub(crate) fn remaining_inputs(&self) -> usize {
        self.inputs.len()
    }
}

impl Console for ScriptedConsole {
    fn notice(&mut self, text: &str) {
        self.lines.push((Kind::Notice, text.to_string()));
    }

    fn error(&mut self, text: &str) {
        self.lines.push((Kind::Error, text.to_string()));
    }

    fn agent(&mut self, name: &str, text: &str) {
        self.lines.push((Kind::Agent, format!("{name}: {text}")));
    }

    fn raw(&mut self, text: &str) {
        self.lines.push((Kind::Raw, text.to_string()));
    }

    fn prompt(&mut self, prompt: &str) -> Option<String> {
        self.prompts.push(prompt.to_string());
        self.inputs.pop_front()
    }
}

#[derive(Debug)]
pub(crate) struct ChatCall {
    pub(crate) parts: Vec<ContentPart>,
    pub(crate) model: String,
    pub(crate) hint: ModelHint,
}

#[derive(Debug, Default)]
pub(crate) struct ChatLog {
    replies: VecDeque<Result<String, ProviderError>>,
    pub(crate) calls: Vec<ChatCall>,
}

/// Chat backend answering from a queue of canned replies.
#[derive(Debug, Clone)]
pub(crate) struct FakeChat {
    models: Vec<String>,
    log: Rc<RefCell<ChatLog>>,
}

impl FakeChat {
    pub(crate) fn new(models: &[&str]) -> Self {
        Self {
            models: models.iter().map(ToString::to_string).collect(),
            log: Rc::default(),
        }
    }

    pub(crate) fn reply(self, text: &str) -> Self {
        self.log.borrow_mut().replies.push_back(Ok(text.to_string()));
        self
    }

    pub(crate) fn fail(self, error: ProviderError) -> Self {
        self.log.borrow_mut().replies.push_back(Err(error));
        self
    }
}

impl ChatBackend for FakeChat {
    fn available_models(&self) -> Vec<String> {
        self.models.clone()
    }

    fn chat(
        &mut self,
        parts: &[ContentPart],
        model: &str,
        hint: ModelHint,
        _temperature: f64,
    ) -> Result<String, ProviderError> {
        let mut log = self.log.borrow_mut();
        log.calls.push(ChatCall {
            parts: parts.to_vec(),
            model: model.to_string(),
            hint,
        });
        log.replies.pop_front().unwrap_or_else(|| Ok(String::new()))
    }
}

#[derive(Debug, Clone)]
pub(crate) enum RunnerBehavior {
    Output(CommandOutput),
    Timeout,
}

#[derive(Debug)]
pub(crate) struct RunnerLog {
    behavior: RunnerBehavior,
    pub(crate) calls: Vec<(String, Vec<String>, PathBuf)>,
}

#[derive(Debug, Clone)]
pub(crate) struct FakeRunner {
    log: Rc<RefCell<RunnerLog>>,
}

impl FakeRunner {
    pub(crate) fn new(behavior: RunnerBehavior) -> Self {
        Self {
            log: Rc::new(RefCell::new(RunnerLog {
                behavior,
                calls: Vec::new(),
            })),
        }
    }
}

impl TestRunner for FakeRunner {
    fn run(
        &mut self,
        command: &str,
        args: &[String],
        cwd: &Path,
    ) -> Result<CommandOutput, ToolError> {
        let mut log = self.log.borrow_mut();
        log.calls
            .push((command.to_string(), args.to_vec(), cwd.to_path_buf()));
        match &log.behavior {
            RunnerBehavior::Output(output) => Ok(output.clone()),
            RunnerBehavior::Timeout => Err(ToolError::Timeout {
                tool: "test command".to_string(),
                elapsed: Duration::from_secs(300),
            }),
        }
    }
}

/// Launcher recording every request; mirrors the real gating rules without spawning.
#[derive(Debug, Clone, Default)]
pub(crate) struct FakeLauncher {
    pub(crate) launched: Rc<RefCell<Vec<PathBuf>>>,
}

impl ScriptLauncher for FakeLauncher {
    fn launch(&mut self, script: &Path, admin_mode: bool) -> Result<LaunchOutcome, ToolError> {
        if !admin_mode {
            return Ok(LaunchOutcome::AdminDisabled);
        }
        if script.extension().is_none_or(|ext| ext != "py") {
            return Ok(LaunchOutcome::NotAScript);
        }
        self.launched.borrow_mut().push(script.to_path_buf());
        Ok(LaunchOutcome::Launched {
            terminal: "fake-term".to_string(),
        })
    }
}

#[derive(Debug, Clone)]
pub(crate) enum FakeCapture {
    Image,
    Timeout,
}

impl CaptureSource for FakeCapture {
    fn capture(&mut self) -> Result<ContentPart, ToolError> {
        match self {
            FakeCapture::Image => Ok(ContentPart::Image {
                mime_type: "image/png".to_string(),
                data_base64: "iVBORw0KGgo=".to_string(),
            }),
            FakeCapture::Timeout => Err(ToolError::Timeout {
                tool: "screen capture".to_string(),
                elapsed: Duration::from_secs(15),
            }),
        }
    }
}

/// A session over a temp project with fake collaborators.
pub(crate) struct Harness {
    pub(crate) session: Session,
    dir: TempDir,
    chat: Rc<RefCell<ChatLog>>,
    runner: Rc<RefCell<RunnerLog>>,
    launcher: FakeLauncher,
}

impl Harness {
    pub(crate) fn new(chat: FakeChat) -> Self {
        Self::build(chat, Vec::new(), ContextLimits::default(), Some(FakeCapture::Image))
    }

    /// Project pre-populated with `files` before the first scan.
    pub(crate) fn with_files(chat: FakeChat, files: &[(&str, &str)]) -> Self {
        let files = files
            .iter()
            .map(|(p, c)| ((*p).to_string(), (*c).to_string()))
            .collect();
        Self::build(chat, files, ContextLimits::default(), Some(FakeCapture::Image))
    }

    pub(crate) fn build(
        chat: FakeChat,
        files: Vec<(String, String)>,
        limits: ContextLimits,
        capture: Option<FakeCapture>,
    ) -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        let root = dir.path().join("project");
        fs::create_dir_all(&root).expect("project dir");
        for (rel, content) in &files {
            let path = root.join(rel);
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent).expect("parent");
            }
            fs::write(path, content).expect("seed file");
        }

        let store = SettingsStore::open(dir.path().join("settings.db")).expect("store");
        let settings = store.load(false).expect("settings");
        let index = ProjectIndex::open(&root, IgnoreRules::default());

        let chat_log = Rc::clone(&chat.log);
        let runner = FakeRunner::new(RunnerBehavior::Output(CommandOutput {
            exit_code: Some(0),
            stdout: "all good".to_string(),
            stderr: String::new(),
        }));
        let runner_log = Rc::clone(&runner.log);
        let launcher = FakeLauncher::default();

        let collaborators = Collaborators {
            chat: Box::new(chat),
            tests: Box::new(runner),
            launcher: Box::new(launcher.clone()),
            capture: capture.map(|c| Box::new(c) as Box<dyn CaptureSource>),
        };
        let session = Session::new(index, store, settings, limits, collaborators);
        Self {
            session,
            dir,
            chat: chat_log,
            runner: runner_log,
            launcher,
        }
    }

    pub(crate) fn root(&self) -> PathBuf {
        self.session.root().to_path_buf()
    }

    pub(crate) fn write(&self, rel: &str, content: &str) {
        let path = self.root().join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("parent");
        }
        fs::write(path, content).expect("write");
    }

    pub(crate) fn read(&self, rel: &str) -> Option<String> {
        fs::read_to_string(self.root().join(rel)).ok()
    }

    pub(crate) fn set_admin(&mut self, on: bool) {
        self.session.settings.admin_mode_enabled = on;
    }

    pub(crate) fn set_test_command(&mut self, command: &str) {
        self.session.settings.set_test_command(Some(command));
    }

    pub(crate) fn set_runner(&mut self, behavior: RunnerBehavior) {
        self.runner.borrow_mut().behavior = behavior;
    }

    /// Settings as persisted in the database.
    pub(crate) fn stored_settings(&self) -> Settings {
        SettingsStore::open(self.dir.path().join("settings.db"))
            .expect("reopen store")
            .load(false)
            .expect("load")
    }

    pub(crate) fn chat_calls(&self) -> usize {
        self.chat.borrow().calls.len()
    }

    pub(crate) fn last_chat(&self) -> Option<(Vec<ContentPart>, String, ModelHint)> {
        self.chat
            .borrow()
            .calls
            .last()
            .map(|c| (c.parts.clone(), c.model.clone(), c.hint))
    }

    pub(crate) fn test_runs(&self) -> Vec<(String, Vec<String>)> {
        self.runner
            .borrow()
            .calls
            .iter()
            .map(|(c, a, _)| (c.clone(), a.clone()))
            .collect()
    }

    pub(crate) fn launched(&self) -> Vec<PathBuf> {
        self.launcher.launched.borrow().clone()
    }
}
