//! SQLite-backed persistence for the session [`Settings`] record.
//!
//! The table holds a single row (`id = 1`). `load` inserts defaults on first
//! run; `save` replaces the whole row.

use std::path::Path;

use anyhow::{Context, Result};
use rusqlite::{Connection, OptionalExtension, params};
use scribe_types::{DEFAULT_MODEL_NAME, Settings, Temperature};
use tracing::{debug, info, warn};

use crate::sqlite_security::prepare_db_path;

const SETTINGS_ROW_ID: i64 = 1;

/// Columns the settings table must carry, with their SQL types.
const REQUIRED_COLUMNS: [(&str, &str); 4] = [
    ("model_name", "TEXT"),
    ("temperature", "REAL"),
    ("admin_mode_enabled", "INTEGER"),
    ("test_command", "TEXT"),
];

pub struct SettingsStore {
    db: Connection,
}

impl SettingsStore {
    const SCHEMA: &'static str = r"
        CREATE TABLE IF NOT EXISTS settings (
            id INTEGER PRIMARY KEY,
            model_name TEXT,
            temperature REAL,
            admin_mode_enabled INTEGER,
            test_command TEXT
        );
    ";

    /// Open or create the settings database at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        prepare_db_path(path)?;

        let db = Connection::open(path)
            .with_context(|| format!("Failed to open settings database at {}", path.display()))?;
        info!(path = %path.display(), "Settings database opened");
        Self::initialize(db)
    }

    /// Open an in-memory store (for testing).
    pub fn open_in_memory() -> Result<Self> {
        let db = Connection::open_in_memory().context("Failed to open in-memory settings store")?;
        Self::initialize(db)
    }

    fn initialize(db: Connection) -> Result<Self> {
        db.execute_batch(Self::SCHEMA)
            .context("Failed to create settings schema")?;
        let store = Self { db };
        store.add_missing_columns()?;
        Ok(store)
    }

    /// Older databases may predate some columns; add them in place.
    fn add_missing_columns(&self) -> Result<()> {
        let existing: Vec<String> = {
            let mut stmt = self
                .db
                .prepare("PRAGMA table_info(settings)")
                .context("Failed to inspect settings table")?;
            stmt.query_map([], |row| row.get::<_, String>(1))
                .context("Failed to read settings columns")?
                .collect::<rusqlite::Result<_>>()
                .context("Failed to read settings columns")?
        };

        for (name, sql_type) in REQUIRED_COLUMNS {
            if existing.iter().any(|c| c == name) {
                continue;
            }
            info!(column = name, "Adding missing settings column");
            self.db
                .execute_batch(&format!("ALTER TABLE settings ADD COLUMN {name} {sql_type}"))
                .with_context(|| format!("Failed to add settings column {name}"))?;
        }
        Ok(())
    }

    /// Stored settings, or freshly inserted defaults on first run.
    ///
    /// NULL columns fall back to defaults; a NULL admin flag uses `default_admin`.
    pub fn load(&self, default_admin: bool) -> Result<Settings> {
        let row = self
            .db
            .query_row(
                "SELECT model_name, temperature, admin_mode_enabled, test_command
                 FROM settings WHERE id = ?1",
                params![SETTINGS_ROW_ID],
                |row| {
                    Ok((
                        row.get::<_, Option<String>>(0)?,
                        row.get::<_, Option<f64>>(1)?,
                        row.get::<_, Option<i64>>(2)?,
                        row.get::<_, Option<String>>(3)?,
                    ))
                },
            )
            .optional()
            .context("Failed to load settings")?;

        let Some((model_name, temperature, admin, test_command)) = row else {
            info!("No stored settings; inserting defaults");
            let defaults = Settings::with_defaults(default_admin);
            self.save(&defaults)?;
            return Ok(defaults);
        };

        let mut settings = Settings::with_defaults(default_admin);
        if let Some(name) = model_name.filter(|n| !n.trim().is_empty()) {
            settings.model_name = name;
        }
        if let Some(value) = temperature {
            settings.temperature = Temperature::new(value).unwrap_or_else(|_| {
                warn!(value, "Stored temperature out of range; using default");
                Temperature::DEFAULT
            });
        }
        if let Some(flag) = admin {
            settings.admin_mode_enabled = flag != 0;
        }
        settings.set_test_command(test_command.as_deref());
        debug!(model = %settings.model_name, "Settings loaded");
        Ok(settings)
    }

    /// Whole-record upsert. Blank test commands are stored as NULL.
    pub fn save(&self, settings: &Settings) -> Result<()> {
        let model_name = if settings.model_name.trim().is_empty() {
            DEFAULT_MODEL_NAME
        } else {
            settings.model_name.as_str()
        };
        self.db
            .execute(
                "INSERT OR REPLACE INTO settings
                 (id, model_name, temperature, admin_mode_enabled, test_command)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    SETTINGS_ROW_ID,
                    model_name,
                    settings.temperature.value(),
                    i64::from(settings.admin_mode_enabled),
                    settings.test_command(),
                ],
            )
            .context("Failed to save settings")?;
        debug!("Settings saved");
        Ok(())
    }

    /// Close the connection, reporting any error from SQLite.
    pub fn close(self) -> Result<()> {
        self.db
            .close()
            .map_err(|(_, e)| e)
            .context("Failed to close settings database")
    }
}
