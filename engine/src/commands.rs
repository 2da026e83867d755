//! Slash command table and dispatch.
//!
//! This module handles commands like /add, /apply, /settings, etc.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use scribe_providers::SUPPORTED_MODELS;
use scribe_tools::lexical_normalize;
use scribe_types::{SettingKey, SettingsError, Temperature, parse_flag};
use tracing::info;

use crate::console::Console;
use crate::help::run_help;
use crate::session::{Flow, Session, display_name};

#[derive(Debug, Clone, Copy)]
pub struct CommandSpec {
    pub name: &'static str,
    pub description: &'static str,
}

pub const COMMAND_SPECS: &[CommandSpec] = &[
    CommandSpec {
        name: "/help",
        description: "Show this help message.",
    },
    CommandSpec {
        name: "/quit",
        description: "Exit the application.",
    },
    CommandSpec {
        name: "/exit",
        description: "Exit the application.",
    },
    CommandSpec {
        name: "/clear",
        description: "Clear the terminal screen.",
    },
    CommandSpec {
        name: "/add",
        description: "Pin file(s) or all files in a directory to the immediate context. Usage: /add <path_in_project>...",
    },
    CommandSpec {
        name: "/drop",
        description: "Unpin file(s) or 'all' from the immediate context. Usage: /drop <filename_or_path_or_all>...",
    },
    CommandSpec {
        name: "/list",
        description: "List pinned files and show project index summary.",
    },
    CommandSpec {
        name: "/apply",
        description: "Review & apply proposed code changes (auto-executes Python files if Admin ON).",
    },
    CommandSpec {
        name: "/discard",
        description: "Discard proposed code changes.",
    },
    CommandSpec {
        name: "/model",
        description: "View/change AI model client. Usage: /model [client_name]",
    },
    CommandSpec {
        name: "/settings",
        description: "Display or modify application settings. Usage: /settings [key value]",
    },
    CommandSpec {
        name: "/codefolder",
        description: "Show the configured Code Folder path.",
    },
    CommandSpec {
        name: "/sudo",
        description: "Toggle Admin Mode (allows file creation/execution). Usage: /sudo [on|off]",
    },
    CommandSpec {
        name: "/runtest",
        description: "Run the configured test command. Usage: /runtest [optional_args]",
    },
    CommandSpec {
        name: "/reindex",
        description: "Manually rescan the Code Folder and refresh the project index.",
    },
    CommandSpec {
        name: "/find",
        description: "Search for files in the project index by name. Usage: /find <substring>",
    },
    CommandSpec {
        name: "/capture_context",
        description: "Capture screen & send with prompt to AI. Usage: /capture_context [prompt]",
    },
];

/// Command names, for completion.
#[must_use]
pub fn command_names() -> Vec<&'static str> {
    COMMAND_SPECS.iter().map(|spec| spec.name).collect()
}

/// Matches returned by `/find`.
const FIND_LIMIT: usize = 20;
/// Candidates considered when `/add` falls back to a substring match.
const ADD_CANDIDATES: usize = 5;

/// Parsed command with typed arguments.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Command<'a> {
    Help,
    Quit,
    Clear,
    Add(Vec<&'a str>),
    Drop(Vec<&'a str>),
    List,
    Apply,
    Discard,
    Model(Option<&'a str>),
    Settings(Vec<&'a str>),
    CodeFolder,
    Sudo(Option<&'a str>),
    RunTest(Vec<&'a str>),
    Reindex,
    Find(Vec<&'a str>),
    CaptureContext(Vec<&'a str>),
    Unknown(&'a str),
}

impl<'a> Command<'a> {
    /// Parse a raw `/command arg...` line. The command name is case-insensitive.
    pub(crate) fn parse(raw: &'a str) -> Self {
        let mut parts = raw.split_whitespace();
        let name = parts.next().unwrap_or_default();
        let args: Vec<&str> = parts.collect();

        match name.to_ascii_lowercase().as_str() {
            "/help" => Command::Help,
            "/quit" | "/exit" => Command::Quit,
            "/clear" => Command::Clear,
            "/add" => Command::Add(args),
            "/drop" => Command::Drop(args),
            "/list" => Command::List,
            "/apply" => Command::Apply,
            "/discard" => Command::Discard,
            "/model" => Command::Model(args.first().copied()),
            "/settings" => Command::Settings(args),
            "/codefolder" => Command::CodeFolder,
            "/sudo" => Command::Sudo(args.first().copied()),
            "/runtest" => Command::RunTest(args),
            "/reindex" => Command::Reindex,
            "/find" => Command::Find(args),
            "/capture_context" => Command::CaptureContext(args),
            _ => Command::Unknown(name),
        }
    }
}

fn kib(bytes: u64) -> f64 {
    bytes as f64 / 1024.0
}

fn on_off(flag: bool) -> &'static str {
    if flag { "ON" } else { "OFF" }
}

impl Session {
    /// Process a slash command entered by the user.
    pub(crate) fn run_command(&mut self, line: &str, console: &mut dyn Console) -> Flow {
        let parsed = Command::parse(line);
        info!(command = ?parsed, "Processing command");

        match parsed {
            Command::Help => run_help(console),
            Command::Quit => return Flow::Quit,
            Command::Clear => console.clear(),
            Command::Add(args) => self.add_pins(&args, console),
            Command::Drop(args) => self.drop_pins(&args, console),
            Command::List => self.list_pins(console),
            Command::Apply => self.apply_pending(console),
            Command::Discard => {
                if self.pending.take().is_some() {
                    info!("User discarded proposed changes");
                    console.notice("Proposed code changes have been discarded.");
                } else {
                    console.notice("No proposed changes are currently available to discard.");
                }
            }
            Command::Model(name) => self.select_model(name, console),
            Command::Settings(args) => self.settings_command(&args, console),
            Command::CodeFolder => self.show_code_folder(console),
            Command::Sudo(arg) => self.sudo(arg, console),
            Command::RunTest(args) => {
                let Some(command) = self.settings.test_command().map(str::to_string) else {
                    console.notice(
                        "No test command is configured. Use '/settings test_command <your_command>' to set one.",
                    );
                    return Flow::Continue;
                };
                let args: Vec<String> = args.iter().map(ToString::to_string).collect();
                self.run_test_command(&command, &args, console);
            }
            Command::Reindex => {
                console.notice("Manually refreshing project index...");
                self.reindex(console);
                console.notice(&format!(
                    "Project index for '{}/' refreshed. Found {} files.",
                    self.index.root_name(),
                    self.index.len()
                ));
            }
            Command::Find(args) => self.find(&args.join(" "), console),
            Command::CaptureContext(args) => {
                let instruction = args.join(" ");
                let instruction = (!instruction.is_empty()).then_some(instruction.as_str());
                self.capture_context(instruction, console);
            }
            Command::Unknown(name) => console.error(&format!(
                "Unknown command: '{name}'. Type /help for a list of available commands."
            )),
        }
        Flow::Continue
    }

    fn add_pins(&mut self, args: &[&str], console: &mut dyn Console) {
        if args.is_empty() {
            console.error("Usage: /add <path_in_project_or_directory_name> [...]");
            console.notice("Example: /add src/utils.py my_folder");
            console.notice("Pins files/dirs to immediate context for the next query.");
            return;
        }

        let mut added = 0;
        let mut skipped = 0;
        for arg in args {
            let cleaned = arg.trim_matches(|c| matches!(c, '\'' | '"' | '`'));
            let Some(target) = self.resolve_add_target(cleaned, console) else {
                skipped += 1;
                continue;
            };

            let files = if target.is_dir() {
                let rel_dir = self.index.relative_key(&target).unwrap_or_default();
                let shown = if rel_dir.is_empty() {
                    self.index.root_name()
                } else {
                    rel_dir.clone()
                };
                console.notice(&format!(
                    "Processing directory '{shown}' to pin its direct files..."
                ));
                let files: Vec<PathBuf> = self
                    .index
                    .direct_children(&rel_dir)
                    .into_iter()
                    .map(|entry| entry.absolute_path.clone())
                    .collect();
                if files.is_empty() {
                    console.notice(&format!(
                        "No files found directly within directory '{shown}'. (Sub-directories are not recursively added)."
                    ));
                } else {
                    console.notice(&format!("Found {} file(s) in '{shown}'.", files.len()));
                }
                files
            } else if target.is_file() {
                vec![target]
            } else {
                console.error(&format!(
                    "Item '{cleaned}' resolved to '{}' which is not a recognized file or directory in the index.",
                    target.display()
                ));
                skipped += 1;
                continue;
            };

            for file in files {
                let name = display_name(&file);
                if self.pinned.contains(&file) {
                    console.notice(&format!("File '{name}' is already pinned."));
                } else if self.index.lookup_absolute(&file).is_some() {
                    info!(path = %file.display(), "Pinned file");
                    self.pinned.insert(file);
                    console.notice(&format!("Pinned '{name}' to context."));
                    added += 1;
                } else {
                    console.error(&format!(
                        "File '{name}' is not currently in the project index. Try '/reindex'."
                    ));
                    skipped += 1;
                }
            }
        }

        if added > 0 {
            console.notice(&format!(
                "Successfully pinned {added} file(s) to the context for the next query."
            ));
        }
        if skipped > 0 {
            console.error(&format!(
                "Skipped or failed to pin {skipped} item(s). Please check paths or use '/find'."
            ));
        }
        if added == 0 && skipped == 0 {
            console.notice(
                "No new files were pinned (items might have been already pinned or not found).",
            );
        }
    }

    /// Existing path inside the root for an `/add` argument.
    ///
    /// Tried as a root-relative path, then as an absolute path, then as a
    /// unique substring of an indexed path.
    fn resolve_add_target(&self, item: &str, console: &mut dyn Console) -> Option<PathBuf> {
        let root = self.index.root();
        let inside = |p: &Path| p.starts_with(root) && p.exists();

        let relative = lexical_normalize(&root.join(item));
        if inside(&relative) {
            return Some(relative);
        }
        if Path::new(item).is_absolute() {
            let absolute = lexical_normalize(Path::new(item));
            if inside(&absolute) {
                return Some(absolute);
            }
        }

        let matches = self.index.find_by_substring(item, ADD_CANDIDATES);
        match matches.as_slice() {
            [only] => {
                console.notice(&format!(
                    "Interpreted '{item}' as '{}'.",
                    only.relative_path
                ));
                Some(only.absolute_path.clone())
            }
            [] => {
                console.error(&format!(
                    "Path or item '{item}' not found in the project index or is ambiguous. Try '/find {item}'."
                ));
                None
            }
            many => {
                console.error(&format!(
                    "Path '{item}' is ambiguous. Did you mean one of these?"
                ));
                for (i, entry) in many.iter().enumerate() {
                    console.raw(&format!(
                        "  {}. {} ({:.1} KB)",
                        i + 1,
                        entry.relative_path,
                        entry.size_kib()
                    ));
                }
                console.notice("Please use a more specific path or one from the list above.");
                None
            }
        }
    }

    fn drop_pins(&mut self, args: &[&str], console: &mut dyn Console) {
        if args.is_empty() {
            console.error("Usage: /drop <filename_or_pinned_path_substring_or_all> [...]");
            console.notice("Example: /drop utils.py specific/file.txt all");
            console.notice("Unpins specified files or all files from the immediate context.");
            return;
        }
        if self.pinned.is_empty() {
            console.notice("No files are currently pinned.");
            return;
        }
        if let [only] = args
            && only.eq_ignore_ascii_case("all")
        {
            let count = self.pinned.clear();
            console.notice(&format!("Unpinned all {count} file(s)."));
            return;
        }

        let candidates = self.pinned.to_vec();
        let mut marked: Vec<PathBuf> = Vec::new();
        let mut unmatched: Vec<&str> = Vec::new();
        for arg in args {
            let needle = arg.to_lowercase().replace('\\', "/");
            let mut found = false;
            for path in &candidates {
                if marked.contains(path) {
                    continue;
                }
                let name = display_name(path).to_lowercase();
                let rel = self.display_path(path).to_lowercase();
                if rel.contains(&needle) || name.contains(&needle) {
                    console.notice(&format!(
                        "Marked '{}' for unpinning based on '{arg}'.",
                        display_name(path)
                    ));
                    marked.push(path.clone());
                    found = true;
                }
            }
            if !found {
                unmatched.push(*arg);
            }
        }

        if !marked.is_empty() {
            for path in &marked {
                self.pinned.remove(path);
            }
            console.notice(&format!("Successfully unpinned {} file(s).", marked.len()));
        }
        if !unmatched.is_empty() {
            console.error(&format!(
                "Could not find or unpin based on: {}. Check pinned files with /list.",
                unmatched.join(", ")
            ));
        }
    }

    fn list_pins(&self, console: &mut dyn Console) {
        console.notice(&format!(
            "Project Index: {} files indexed in '{}/'.",
            self.index.len(),
            self.index.root_name()
        ));
        if self.pinned.is_empty() {
            console.notice(
                "\nNo files currently pinned. Use '/add <path>' to add files, or '/find <name>' to search for files.",
            );
            return;
        }

        console.notice("\nCurrently Pinned Files (will be included in AI context):");
        let mut total_bytes: u64 = 0;
        for (i, path) in self.pinned.iter().enumerate() {
            let size = match fs::metadata(path) {
                Ok(meta) if meta.is_file() => {
                    total_bytes += meta.len();
                    format!("({:.1} KB)", kib(meta.len()))
                }
                _ => "(size N/A or file missing)".to_string(),
            };
            console.raw(&format!("  {}. {} {size}", i + 1, self.display_path(path)));
        }
        console.notice(&format!(
            "Total size of pinned files: {:.1} KB.",
            kib(total_bytes)
        ));
        let cap = self.limits.total_chars as u64;
        if total_bytes * 5 > cap * 4 {
            console.notice(&format!(
                "Warning: Total size of pinned files is approaching context limit ({:.0} KB). \
                 Some content may be truncated or summarized.",
                kib(cap)
            ));
        }
    }

    fn find(&self, query: &str, console: &mut dyn Console) {
        if query.is_empty() {
            console.error("Usage: /find <substring_in_filepath>");
            console.notice("Example: /find models.py");
            return;
        }
        console.notice(&format!(
            "Searching project for paths containing '{query}'..."
        ));
        let found = self.index.find_by_substring(query, FIND_LIMIT);
        if found.is_empty() {
            console.notice(&format!("No files found matching '{query}'."));
            return;
        }
        console.notice(&format!(
            "Found {n} matching file(s) (displaying top {n}):",
            n = found.len()
        ));
        for (i, entry) in found.iter().enumerate() {
            console.raw(&format!(
                "  {}. {} ({:.1} KB)",
                i + 1,
                entry.relative_path,
                entry.size_kib()
            ));
        }
        console.notice("Use '/add <path_from_list>' to pin files to context.");
    }

    fn select_model(&mut self, name: Option<&str>, console: &mut dyn Console) {
        let available = self.available_models();
        let Some(name) = name else {
            console.notice(&format!(
                "Current AI model client: {}",
                self.settings.model_name
            ));
            if available.is_empty() {
                console.error(
                    "No AI model clients are currently available. Please check API key configurations and logs.",
                );
            } else {
                console.notice(&format!(
                    "Available model clients: {}",
                    available.join(", ")
                ));
            }
            console.notice("Usage: /model <client_name_from_list>");
            return;
        };

        let wanted = name.to_ascii_lowercase();
        if available.contains(&wanted) {
            let chosen = wanted.clone();
            if self.update_settings(console, move |s| s.model_name = chosen) {
                info!(model = %wanted, "User changed model");
                console.notice(&format!("AI model client set to: {wanted}"));
            }
        } else if SUPPORTED_MODELS.contains(&wanted.as_str()) {
            console.error(&format!(
                "Model client '{wanted}' is configured but currently unavailable \
                 (e.g., missing API key or initialization error). Please check logs."
            ));
        } else {
            console.error(&format!("Unsupported model client: '{wanted}'."));
            if available.is_empty() {
                console.notice("No model clients are currently available.");
            } else {
                console.notice(&format!("Available options: {}", available.join(", ")));
            }
        }
    }

    fn settings_command(&mut self, args: &[&str], console: &mut dyn Console) {
        match args {
            [] => self.show_settings(console),
            [view] if matches!(view.to_ascii_lowercase().as_str(), "show" | "view" | "list") => {
                self.show_settings(console);
            }
            [key] => match SettingKey::parse(key) {
                Ok(key) => console.notice(&format!(
                    "{key}: {}",
                    self.settings.display_value(key)
                )),
                Err(_) => console.error(
                    "Invalid usage. To view all: /settings. To set: /settings <key> <value>.",
                ),
            },
            [key, values @ ..] => {
                let key = match SettingKey::parse(key) {
                    Ok(key) => key,
                    Err(e) => {
                        console.error(&format!("{e}. Valid keys are: {}", SettingKey::valid_keys()));
                        return;
                    }
                };
                if key != SettingKey::TestCommand && values.len() > 1 {
                    console.error(
                        "Invalid usage. To view all: /settings. To set: /settings <key> <value>.",
                    );
                    return;
                }
                self.set_setting(key, &values.join(" "), console);
            }
        }
    }

    fn show_settings(&self, console: &mut dyn Console) {
        console.notice("Current application settings:");
        for key in SettingKey::ALL {
            console.raw(&format!(
                "  {:<20}: {}",
                key.as_str(),
                self.settings.display_value(key)
            ));
        }
        console.notice("\nUse '/settings <key> <value>' to change a setting.");
        console.notice("Example: /settings temperature 0.7");
        console.notice("To clear test_command: /settings test_command none");
    }

    fn set_setting(&mut self, key: SettingKey, value: &str, console: &mut dyn Console) {
        let saved = match key {
            SettingKey::Temperature => match Temperature::parse(value) {
                Ok(temperature) => self.update_settings(console, |s| s.temperature = temperature),
                Err(e) => {
                    console.error(&e.to_string());
                    return;
                }
            },
            SettingKey::AdminModeEnabled => match parse_flag(value) {
                Some(flag) => self.update_settings(console, |s| s.admin_mode_enabled = flag),
                None => {
                    console.error(&SettingsError::InvalidFlag(value.to_string()).to_string());
                    return;
                }
            },
            SettingKey::TestCommand => {
                self.update_settings(console, |s| s.set_test_command(Some(value)))
            }
            SettingKey::ModelName => {
                let wanted = value.to_ascii_lowercase();
                let available = self.available_models();
                if !available.contains(&wanted) {
                    let listed = if available.is_empty() {
                        "None".to_string()
                    } else {
                        available.join(", ")
                    };
                    console.error(&format!(
                        "Invalid model client '{value}'. Available: {listed}"
                    ));
                    return;
                }
                self.update_settings(console, |s| s.model_name = wanted)
            }
        };
        if saved {
            let shown = match key {
                SettingKey::TestCommand => self
                    .settings
                    .test_command()
                    .unwrap_or("Not set")
                    .to_string(),
                _ => self.settings.display_value(key),
            };
            info!(setting = %key, value = %shown, "Setting updated");
            console.notice(&format!("Setting '{key}' has been updated to '{shown}'."));
        }
    }

    fn show_code_folder(&self, console: &mut dyn Console) {
        let root = self.index.root();
        console.notice("Current Code Folder (Project Root for indexing):");
        let relative = env::current_dir()
            .ok()
            .and_then(|cwd| root.strip_prefix(cwd).ok().map(Path::to_path_buf))
            .map_or_else(
                || "(Path cannot be made relative to current location)".to_string(),
                |rel| {
                    if rel.as_os_str().is_empty() {
                        ".".to_string()
                    } else {
                        rel.display().to_string()
                    }
                },
            );
        console.notice(&format!("  Relative to current dir: {relative}"));
        console.notice(&format!("  Absolute path: {}", root.display()));

        if !root.exists() {
            console.error(
                "Warning: The configured Code Folder path does not currently exist on the filesystem.",
            );
        } else if !root.is_dir() {
            console.error("Warning: The configured Code Folder path exists but is not a directory.");
        } else {
            console.notice("Status: Path exists and is a directory.");
        }
    }

    fn sudo(&mut self, arg: Option<&str>, console: &mut dyn Console) {
        let current = self.admin_mode();
        let (wanted, verb) = match arg {
            None => (!current, "Toggled"),
            Some(raw) => match parse_flag(raw) {
                Some(flag) => (flag, "Set"),
                None => {
                    console.error(
                        "Invalid argument. Usage: /sudo [on|off] (or just /sudo to toggle).",
                    );
                    return;
                }
            },
        };
        if arg.is_some() && wanted == current {
            console.notice(&format!(
                "Admin Mode is already {}. No change made.",
                on_off(current)
            ));
            return;
        }
        if !self.update_settings(console, |s| s.admin_mode_enabled = wanted) {
            return;
        }
        info!(admin_mode = wanted, "Admin mode changed");
        console.notice(&format!("{verb} Admin Mode to: {}", on_off(wanted)));
        if wanted {
            console.notice(
                "Warning: Admin Mode is now ON. This allows the AI to propose and potentially \
                 execute filesystem operations or run commands (like tests). \
                 Use with caution and review all actions.",
            );
        } else {
            console.notice(
                "Admin Mode is OFF. AI capabilities for direct system changes are restricted.",
            );
        }
    }
}
