use std::env;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;
use tracing::warn;

/// Directory under the home directory holding config, database, and logs.
pub const SCRIBE_DIR: &str = ".scribe";
pub const CONFIG_FILE: &str = "config.toml";
pub const DEFAULT_CODE_FOLDER: &str = "Code";
pub const DEFAULT_DATABASE_FILE: &str = "scribe.db";
pub const DEFAULT_LOG_FILE: &str = "logs/scribe.log";

pub const DEFAULT_PER_FILE_CHARS: usize = 10_000;
pub const DEFAULT_TOTAL_CHARS: usize = 50_000;
pub const DEFAULT_SUMMARIZE_INPUT_CHARS: usize = 15_000;
pub const DEFAULT_SUMMARIZE_TRIGGER_CHARS: usize = 15_000;
pub const DEFAULT_MAX_FILE_BYTES: u64 = 2 * 1024 * 1024;
pub const DEFAULT_TEST_TIMEOUT_SECS: u64 = 300;
pub const DEFAULT_CAPTURE_TIMEOUT_SECS: u64 = 15;

/// Raw `~/.scribe/config.toml`. Every section is optional.
#[derive(Debug, Default, Deserialize)]
pub struct AppConfig {
    pub app: Option<AppSection>,
    pub limits: Option<LimitsSection>,
    pub providers: Option<ProvidersSection>,
    pub tools: Option<ToolsSection>,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config at {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to parse config at {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

impl ConfigError {
    pub fn path(&self) -> &Path {
        match self {
            ConfigError::Read { path, .. } | ConfigError::Parse { path, .. } => path,
        }
    }
}

/// ```toml
/// [app]
/// code_folder = "~/projects/demo"
/// database_path = "${HOME}/.scribe/scribe.db"
/// default_admin_mode = false
/// ```
#[derive(Debug, Default, Deserialize)]
pub struct AppSection {
    pub code_folder: Option<String>,
    pub database_path: Option<String>,
    pub log_file: Option<String>,
    pub default_admin_mode: Option<bool>,
}

/// Character caps for prompt assembly.
#[derive(Debug, Default, Deserialize)]
pub struct LimitsSection {
    pub per_file_chars: Option<usize>,
    pub total_chars: Option<usize>,
    pub summarize_input_chars: Option<usize>,
    pub summarize_trigger_chars: Option<usize>,
    pub max_file_bytes: Option<u64>,
}

#[derive(Default, Deserialize)]
pub struct ProvidersSection {
    pub gemini_api_key: Option<String>,
    pub mistral_api_key: Option<String>,
    pub codestral_api_key: Option<String>,
    pub code_agent_id: Option<String>,
    pub architect_agent_id: Option<String>,
    pub gemini_model: Option<String>,
    pub mistral_model: Option<String>,
    pub codestral_model: Option<String>,
}

// Manual Debug impl to prevent leaking API keys in logs.
impl fmt::Debug for ProvidersSection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProvidersSection")
            .field("gemini_api_key", &mask(self.gemini_api_key.as_deref()))
            .field("mistral_api_key", &mask(self.mistral_api_key.as_deref()))
            .field("codestral_api_key", &mask(self.codestral_api_key.as_deref()))
            .field("code_agent_id", &self.code_agent_id)
            .field("architect_agent_id", &self.architect_agent_id)
            .field("gemini_model", &self.gemini_model)
            .field("mistral_model", &self.mistral_model)
            .field("codestral_model", &self.codestral_model)
            .finish()
    }
}

fn mask(value: Option<&str>) -> &'static str {
    if value.is_some() { "[REDACTED]" } else { "None" }
}

/// ```toml
/// [tools]
/// test_timeout_secs = 120
/// capture_command = ["grim", "{output}"]
/// script_interpreter = "python3"
/// ```
#[derive(Debug, Default, Deserialize)]
pub struct ToolsSection {
    pub test_timeout_secs: Option<u64>,
    pub capture_timeout_secs: Option<u64>,
    pub capture_command: Option<Vec<String>>,
    pub script_interpreter: Option<String>,
}

/// Replace `${VAR}` with the variable's value; unset variables become empty.
pub fn expand_env_vars(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut rest = value;

    while let Some(start) = rest.find("${") {
        let after = &rest[start + 2..];
        let Some(end) = after.find('}') else {
            break;
        };
        out.push_str(&rest[..start]);
        let var = &after[..end];
        if !var.is_empty() {
            out.push_str(&env::var(var).unwrap_or_default());
        }
        rest = &after[end + 1..];
    }

    out.push_str(rest);
    out
}

/// `~/.scribe`, or `./.scribe` when no home directory is known.
#[must_use]
pub fn scribe_home() -> PathBuf {
    dirs::home_dir().map_or_else(|| PathBuf::from(SCRIBE_DIR), |home| home.join(SCRIBE_DIR))
}

#[must_use]
pub fn config_path() -> PathBuf {
    scribe_home().join(CONFIG_FILE)
}

impl AppConfig {
    /// Load `~/.scribe/config.toml`. A missing file is `Ok(None)`.
    pub fn load() -> Result<Option<Self>, ConfigError> {
        Self::load_from(&config_path())
    }

    pub fn load_from(path: &Path) -> Result<Option<Self>, ConfigError> {
        if !path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(path).map_err(|source| {
            warn!(path = %path.display(), error = %source, "Failed to read config");
            ConfigError::Read {
                path: path.to_path_buf(),
                source,
            }
        })?;
        Self::parse(&content)
            .map(Some)
            .map_err(|source| {
                warn!(path = %path.display(), error = %source, "Failed to parse config");
                ConfigError::Parse {
                    path: path.to_path_buf(),
                    source,
                }
            })
    }

    pub fn parse(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Apply process environment overrides and defaults.
    #[must_use]
    pub fn resolve(self) -> ResolvedConfig {
        self.resolve_with(|name| env::var(name).ok(), &scribe_home())
    }

    /// Apply overrides from `lookup` and defaults rooted at `home`.
    pub fn resolve_with(
        self,
        lookup: impl Fn(&str) -> Option<String>,
        home: &Path,
    ) -> ResolvedConfig {
        let env_value = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        let file_value = |value: Option<String>| {
            value
                .map(|v| expand_env_vars(&v))
                .filter(|v| !v.trim().is_empty())
        };

        let app = self.app.unwrap_or_default();
        let limits = self.limits.unwrap_or_default();
        let providers = self.providers.unwrap_or_default();
        let tools = self.tools.unwrap_or_default();

        let path_setting = |var: &str, configured: Option<String>, default: &str| {
            env_value(var)
                .or_else(|| file_value(configured))
                .map_or_else(|| home.join(default), |raw| expand_home(&raw))
        };

        let default_admin_mode = match env_value("DEFAULT_ADMIN_MODE_ENABLED") {
            Some(raw) => parse_admin_default(&raw),
            None => app.default_admin_mode.unwrap_or(false),
        };

        ResolvedConfig {
            code_folder: path_setting("CODE_FOLDER_PATH", app.code_folder, DEFAULT_CODE_FOLDER),
            database_path: path_setting("DATABASE_PATH", app.database_path, DEFAULT_DATABASE_FILE),
            log_file: path_setting("LOG_FILE_PATH", app.log_file, DEFAULT_LOG_FILE),
            default_admin_mode,
            limits: ResolvedLimits {
                per_file_chars: limits.per_file_chars.unwrap_or(DEFAULT_PER_FILE_CHARS),
                total_chars: limits.total_chars.unwrap_or(DEFAULT_TOTAL_CHARS),
                summarize_input_chars: limits
                    .summarize_input_chars
                    .unwrap_or(DEFAULT_SUMMARIZE_INPUT_CHARS),
                summarize_trigger_chars: limits
                    .summarize_trigger_chars
                    .unwrap_or(DEFAULT_SUMMARIZE_TRIGGER_CHARS),
                max_file_bytes: limits.max_file_bytes.unwrap_or(DEFAULT_MAX_FILE_BYTES),
            },
            providers: ProviderCredentials {
                gemini_api_key: env_value("GEMINI_API_KEY")
                    .or_else(|| file_value(providers.gemini_api_key)),
                mistral_api_key: env_value("MISTRAL_API_KEY")
                    .or_else(|| file_value(providers.mistral_api_key)),
                codestral_api_key: env_value("CODESTRAL_API_KEY")
                    .or_else(|| file_value(providers.codestral_api_key)),
                code_agent_id: env_value("CODE_AGENT_ID")
                    .or_else(|| file_value(providers.code_agent_id)),
                architect_agent_id: env_value("ARCHITECT_AGENT_ID")
                    .or_else(|| file_value(providers.architect_agent_id)),
                gemini_model: file_value(providers.gemini_model),
                mistral_model: file_value(providers.mistral_model),
                codestral_model: file_value(providers.codestral_model),
            },
            tools: ResolvedTools {
                test_timeout: Duration::from_secs(
                    tools.test_timeout_secs.unwrap_or(DEFAULT_TEST_TIMEOUT_SECS),
                ),
                capture_timeout: Duration::from_secs(
                    tools
                        .capture_timeout_secs
                        .unwrap_or(DEFAULT_CAPTURE_TIMEOUT_SECS),
                ),
                capture_command: tools.capture_command.filter(|argv| !argv.is_empty()),
                script_interpreter: file_value(tools.script_interpreter),
            },
        }
    }
}

/// `DEFAULT_ADMIN_MODE_ENABLED` accepts `true`/`false` or an integer.
fn parse_admin_default(raw: &str) -> bool {
    let value = raw.trim().to_ascii_lowercase();
    match value.as_str() {
        "true" => true,
        "false" => false,
        _ => match value.parse::<i64>() {
            Ok(n) => n != 0,
            Err(_) => {
                warn!(value = raw, "Invalid DEFAULT_ADMIN_MODE_ENABLED; admin mode defaults to off");
                false
            }
        },
    }
}

fn expand_home(raw: &str) -> PathBuf {
    if let Some(rest) = raw.strip_prefix("~/")
        && let Some(home) = dirs::home_dir()
    {
        return home.join(rest);
    }
    PathBuf::from(raw)
}

/// Effective configuration after env overrides and defaults.
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub code_folder: PathBuf,
    pub database_path: PathBuf,
    pub log_file: PathBuf,
    pub default_admin_mode: bool,
    pub limits: ResolvedLimits,
    pub providers: ProviderCredentials,
    pub tools: ResolvedTools,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedLimits {
    pub per_file_chars: usize,
    pub total_chars: usize,
    pub summarize_input_chars: usize,
    pub summarize_trigger_chars: usize,
    pub max_file_bytes: u64,
}

#[derive(Clone, Default)]
pub struct ProviderCredentials {
    pub gemini_api_key: Option<String>,
    pub mistral_api_key: Option<String>,
    pub codestral_api_key: Option<String>,
    pub code_agent_id: Option<String>,
    pub architect_agent_id: Option<String>,
    pub gemini_model: Option<String>,
    pub mistral_model: Option<String>,
    pub codestral_model: Option<String>,
}

impl ProviderCredentials {
    #[must_use]
    pub fn has_any_key(&self) -> bool {
        self.gemini_api_key.is_some()
            || self.mistral_api_key.is_some()
            || self.codestral_api_key.is_some()
    }
}

impl fmt::Debug for ProviderCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderCredentials")
            .field("gemini_api_key", &mask(self.gemini_api_key.as_deref()))
            .field("mistral_api_key", &mask(self.mistral_api_key.as_deref()))
            .field("codestral_api_key", &mask(self.codestral_api_key.as_deref()))
            .field("code_agent_id", &self.code_agent_id)
            .field("architect_agent_id", &self.architect_agent_id)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone)]
pub struct ResolvedTools {
    pub test_timeout: Duration,
    pub capture_timeout: Duration,
    pub capture_command: Option<Vec<String>>,
    pub script_interpreter: Option<String>,
}
