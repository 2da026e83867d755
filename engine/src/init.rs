//! Session bootstrap from resolved configuration.

use anyhow::{Context, Result, bail};
use scribe_config::{ProviderCredentials, ResolvedConfig, ResolvedLimits, SettingsStore};
use scribe_context::{ContextLimits, IgnoreRules, ProjectIndex};
use scribe_providers::{
    CODESTRAL_API_BASE_URL, DEFAULT_CODESTRAL_MODEL, DEFAULT_GEMINI_MODEL, DEFAULT_MISTRAL_MODEL,
    GeminiClient, MistralClient, ModelClient, ModelRegistry, ProviderError, http_client,
};
use scribe_tools::{CaptureSource, CommandCapture, ShellTestRunner, TerminalLauncher};
use tracing::{info, warn};

use crate::console::Console;
use crate::session::{Collaborators, Session};

/// Extension of images written by a configured capture command.
const CAPTURE_EXTENSION: &str = "png";

/// Register a client for every provider that has an API key.
///
/// Order is fixed: `gemini`, `mistral`, `codestral`.
pub fn build_registry(credentials: &ProviderCredentials) -> Result<ModelRegistry, ProviderError> {
    let mut registry = ModelRegistry::new()?;
    if !credentials.has_any_key() {
        return Ok(registry);
    }
    let http = http_client()?;

    if let Some(key) = &credentials.gemini_api_key {
        let model = credentials
            .gemini_model
            .as_deref()
            .unwrap_or(DEFAULT_GEMINI_MODEL);
        registry.register(
            "gemini",
            ModelClient::Gemini(GeminiClient::new(http.clone(), key, model)),
        );
    }
    if let Some(key) = &credentials.mistral_api_key {
        let model = credentials
            .mistral_model
            .as_deref()
            .unwrap_or(DEFAULT_MISTRAL_MODEL);
        let client = MistralClient::new(http.clone(), key, model).with_agents(
            credentials.code_agent_id.clone(),
            credentials.architect_agent_id.clone(),
        );
        registry.register("mistral", ModelClient::Mistral(client));
    }
    if let Some(key) = &credentials.codestral_api_key {
        let model = credentials
            .codestral_model
            .as_deref()
            .unwrap_or(DEFAULT_CODESTRAL_MODEL);
        let client = MistralClient::new(http, key, model).with_base_url(CODESTRAL_API_BASE_URL);
        registry.register("codestral", ModelClient::Mistral(client));
    }
    Ok(registry)
}

#[must_use]
pub fn context_limits(limits: &ResolvedLimits) -> ContextLimits {
    ContextLimits {
        per_file_chars: limits.per_file_chars,
        total_chars: limits.total_chars,
        summarize_input_chars: limits.summarize_input_chars,
        summarize_trigger_chars: limits.summarize_trigger_chars,
        max_file_bytes: limits.max_file_bytes,
    }
}

fn capture_source(config: &ResolvedConfig) -> Option<Box<dyn CaptureSource>> {
    let capture = match &config.tools.capture_command {
        Some(argv) => CommandCapture::new(argv.clone(), CAPTURE_EXTENSION),
        None => CommandCapture::platform_default(),
    };
    match capture {
        Ok(capture) => Some(Box::new(capture.with_timeout(config.tools.capture_timeout))),
        Err(e) => {
            warn!("Screen capture unavailable: {e}");
            None
        }
    }
}

/// Open the settings store, providers, and project index, then greet the user.
///
/// Fails when no model can be registered at all.
pub fn start_session(config: &ResolvedConfig, console: &mut dyn Console) -> Result<Session> {
    let store = SettingsStore::open(&config.database_path).with_context(|| {
        format!(
            "failed to open settings database {}",
            config.database_path.display()
        )
    })?;
    let settings = store
        .load(config.default_admin_mode)
        .context("failed to load settings")?;

    let registry = build_registry(&config.providers).context("failed to set up AI providers")?;
    if registry.is_empty() {
        bail!(
            "No AI models are available. Set GEMINI_API_KEY, MISTRAL_API_KEY, or CODESTRAL_API_KEY."
        );
    }

    let tests = ShellTestRunner::with_timeout(config.tools.test_timeout)
        .context("failed to set up test runner")?;
    let launcher = config
        .tools
        .script_interpreter
        .as_deref()
        .map_or_else(TerminalLauncher::default, TerminalLauncher::new);

    console.notice(&format!(
        "Indexing project '{}'...",
        config.code_folder.display()
    ));
    let index = ProjectIndex::open(&config.code_folder, IgnoreRules::default());
    info!(
        root = %index.root().display(),
        files = index.len(),
        "Project indexed"
    );

    let collaborators = Collaborators {
        chat: Box::new(registry),
        tests: Box::new(tests),
        launcher: Box::new(launcher),
        capture: capture_source(config),
    };
    let mut session = Session::new(
        index,
        store,
        settings,
        context_limits(&config.limits),
        collaborators,
    );
    if session.ensure_model(console).is_none() {
        bail!("No AI models are available.");
    }

    session.print_startup_info(console);
    Ok(session)
}

impl Session {
    pub(crate) fn print_startup_info(&self, console: &mut dyn Console) {
        console.clear();
        console.raw("Type '/help' for commands, '/exit' to quit");
        console.raw(&format!("AI Model: {}", self.settings.model_name));
        console.raw(&format!(
            "Environment: {} [{}]",
            self.root().display(),
            self.index.len()
        ));
        console.raw(&format!(
            "Admin Mode: {}",
            if self.admin_mode() { "ON" } else { "OFF" }
        ));
        console.raw("");
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;
    use std::time::Duration;

    use scribe_config::ResolvedTools;
    use scribe_providers::ChatBackend;

    use super::*;
    use crate::test_support::ScriptedConsole;

    fn config(dir: &Path, providers: ProviderCredentials) -> ResolvedConfig {
        ResolvedConfig {
            code_folder: dir.join("code"),
            database_path: dir.join("db/scribe.db"),
            log_file: dir.join("scribe.log"),
            default_admin_mode: true,
            limits: ResolvedLimits {
                per_file_chars: 1,
                total_chars: 2,
                summarize_input_chars: 3,
                summarize_trigger_chars: 4,
                max_file_bytes: 5,
            },
            providers,
            tools: ResolvedTools {
                test_timeout: Duration::from_secs(5),
                capture_timeout: Duration::from_secs(1),
                capture_command: Some(vec!["true".to_string(), "{output}".to_string()]),
                script_interpreter: None,
            },
        }
    }

    #[test]
    fn registry_follows_keys_in_fixed_order() {
        let credentials = ProviderCredentials {
            codestral_api_key: Some("c".to_string()),
            gemini_api_key: Some("g".to_string()),
            ..ProviderCredentials::default()
        };
        let registry = build_registry(&credentials).expect("registry");
        assert_eq!(registry.available_models(), ["gemini", "codestral"]);

        let empty = build_registry(&ProviderCredentials::default()).expect("registry");
        assert!(empty.is_empty());
    }

    #[test]
    fn limits_are_copied_field_for_field() {
        let dir = tempfile::tempdir().expect("tempdir");
        let limits = context_limits(&config(dir.path(), ProviderCredentials::default()).limits);
        assert_eq!(
            limits,
            ContextLimits {
                per_file_chars: 1,
                total_chars: 2,
                summarize_input_chars: 3,
                summarize_trigger_chars: 4,
                max_file_bytes: 5,
            }
        );
    }

    #[test]
    fn start_fails_without_any_model() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut console = ScriptedConsole::default();
        let result = start_session(&config(dir.path(), ProviderCredentials::default()), &mut console);
        assert!(result.is_err());
    }

    #[test]
    fn start_falls_back_to_an_available_model_and_indexes() {
        let dir = tempfile::tempdir().expect("tempdir");
        let credentials = ProviderCredentials {
            mistral_api_key: Some("m".to_string()),
            ..ProviderCredentials::default()
        };
        let mut console = ScriptedConsole::default();
        let session = start_session(&config(dir.path(), credentials), &mut console)
            .expect("session");

        assert_eq!(session.settings().model_name, "mistral");
        assert!(session.admin_mode());
        assert_eq!(session.root(), dir.path().join("code"));
        assert!(session.root().is_dir());
        assert!(console.saw("Switching to the first available model: 'mistral'"));
        assert!(console.saw("AI Model: mistral"));
        session.shutdown();
    }
}
