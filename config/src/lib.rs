//! Configuration for Scribe.
//!
//! - [`AppConfig`]: optional `~/.scribe/config.toml`, resolved against environment
//!   overrides into a [`ResolvedConfig`]
//! - [`SettingsStore`]: the persisted per-user [`scribe_types::Settings`] record

mod app_config;
mod settings_store;
mod sqlite_security;

pub use app_config::{
    AppConfig, AppSection, ConfigError, LimitsSection, ProviderCredentials, ProvidersSection,
    ResolvedConfig, ResolvedLimits, ResolvedTools, ToolsSection, config_path, expand_env_vars,
    scribe_home,
};
pub use settings_store::SettingsStore;
