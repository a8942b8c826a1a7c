use crate::display::PresentationSink;
use crate::error::PrefsError;
use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{info, warn};

pub const THEME_KEY: &str = "uuplastination-theme";

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    Light,
    #[default]
    Dark,
}

impl Theme {
    pub fn as_str(self) -> &'static str {
        match self {
            Theme::Light => "light",
            Theme::Dark => "dark",
        }
    }

    pub fn toggled(self) -> Self {
        match self {
            Theme::Light => Theme::Dark,
            Theme::Dark => Theme::Light,
        }
    }
}

impl fmt::Display for Theme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Theme {
    type Err = PrefsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "light" => Ok(Theme::Light),
            "dark" => Ok(Theme::Dark),
            other => Err(PrefsError::InvalidTheme(other.to_string())),
        }
    }
}

/// Local key/value persistence.
pub trait PreferenceStore: Send + Sync + 'static {
    fn get(&self, key: &str) -> Result<Option<String>, PrefsError>;
    fn set(&self, key: &str, value: &str) -> Result<(), PrefsError>;
}

pub struct SqlitePreferences {
    conn: Mutex<Connection>,
}

impl SqlitePreferences {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, PrefsError> {
        Self::init(Connection::open(path)?)
    }

    pub fn in_memory() -> Result<Self, PrefsError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, PrefsError> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS preferences (key TEXT PRIMARY KEY, value TEXT NOT NULL)",
            [],
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        match self.conn.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl PreferenceStore for SqlitePreferences {
    fn get(&self, key: &str) -> Result<Option<String>, PrefsError> {
        let value = self
            .conn()
            .query_row(
                "SELECT value FROM preferences WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    fn set(&self, key: &str, value: &str) -> Result<(), PrefsError> {
        self.conn().execute(
            "INSERT INTO preferences (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![key, value],
        )?;
        Ok(())
    }
}

pub struct ThemeManager {
    store: Arc<dyn PreferenceStore>,
    sink: Arc<dyn PresentationSink>,
    current: Mutex<Theme>,
}

impl ThemeManager {
    /// A saved preference wins; otherwise the system preference applies and
    /// is persisted.
    pub fn init(
        store: Arc<dyn PreferenceStore>,
        sink: Arc<dyn PresentationSink>,
        system_prefers_dark: bool,
    ) -> Self {
        let system = if system_prefers_dark {
            Theme::Dark
        } else {
            Theme::Light
        };
        let saved = match store.get(THEME_KEY) {
            Ok(Some(raw)) => match raw.parse::<Theme>() {
                Ok(theme) => Some(theme),
                Err(e) => {
                    warn!("Ignoring stored theme: {}", e);
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                warn!("Failed to read theme preference: {}", e);
                None
            }
        };

        let theme = saved.unwrap_or(system);
        let manager = Self {
            store,
            sink,
            current: Mutex::new(theme),
        };
        manager.set(theme);
        manager
    }

    pub fn current(&self) -> Theme {
        *self.lock()
    }

    pub fn set(&self, theme: Theme) {
        *self.lock() = theme;
        if let Err(e) = self.store.set(THEME_KEY, theme.as_str()) {
            warn!("Failed to persist theme preference: {}", e);
        }
        self.sink.display_field("theme", theme.as_str());
        let (icon, other) = match theme {
            Theme::Dark => ("☀️", Theme::Light),
            Theme::Light => ("🌙", Theme::Dark),
        };
        self.sink.display_field("theme-toggle-icon", icon);
        self.sink
            .display_field("theme-toggle-label", &format!("Switch to {other} mode"));
    }

    pub fn toggle(&self) -> Theme {
        let next = self.current().toggled();
        self.set(next);
        info!("Theme switched to {}", next);
        next
    }

    pub fn stored(&self) -> Result<Option<Theme>, PrefsError> {
        self.store.get(THEME_KEY)?.map(|raw| raw.parse()).transpose()
    }

    fn lock(&self) -> MutexGuard<'_, Theme> {
        match self.current.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}
