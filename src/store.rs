//! Saved connections and user preferences
//!
//! The settings document is a single JSON file:
//!
//! ```json
//! {
//!   "language": "en",
//!   "theme": "dark",
//!   "connection_mode": "proxy",
//!   "connections": [ { "id": "...", "name": "...", "protocol": "vless", "url": "...", "config": "{...}" } ]
//! }
//! ```
//!
//! Connection order is insertion order. Writes go through a temp file in the
//! same directory and a rename, so a crash never leaves a torn document.

use crate::error::{Result, VpnError};
use crate::types::{ConnectionMode, ConnectionRecord};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Interface languages the front end ships translations for
pub const SUPPORTED_LANGUAGES: [&str; 2] = ["en", "ru"];

const APP_DIR: &str = ".rvpnmux";
const SETTINGS_FILE: &str = "settings.json";

/// Persisted settings document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default = "default_language")]
    pub language: String,
    #[serde(default = "default_theme")]
    pub theme: String,
    #[serde(default)]
    pub connection_mode: ConnectionMode,
    #[serde(default)]
    pub connections: Vec<ConnectionRecord>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            language: default_language(),
            theme: default_theme(),
            connection_mode: ConnectionMode::default(),
            connections: Vec::new(),
        }
    }
}

fn default_language() -> String {
    "en".to_string()
}

fn default_theme() -> String {
    "dark".to_string()
}

/// Ordered connection list plus preferences, optionally backed by a file
#[derive(Debug, Clone, Default)]
pub struct ConnectionStore {
    path: Option<PathBuf>,
    settings: Settings,
}

impl ConnectionStore {
    /// Store that never touches the filesystem
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// `~/.rvpnmux/settings.json`, when a home directory is known
    pub fn default_path() -> Option<PathBuf> {
        dirs::home_dir().map(|home| home.join(APP_DIR).join(SETTINGS_FILE))
    }

    /// Load the document at `path`, creating a default one if it is missing
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if !path.exists() {
            let store = Self {
                path: Some(path),
                settings: Settings::default(),
            };
            store.save()?;
            return Ok(store);
        }

        let contents = fs::read_to_string(&path).map_err(|e| {
            VpnError::Storage(format!("failed to read {}: {e}", path.display()))
        })?;
        let settings: Settings = serde_json::from_str(&contents).map_err(|e| {
            VpnError::Storage(format!("failed to parse {}: {e}", path.display()))
        })?;

        Ok(Self {
            path: Some(path),
            settings,
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn is_persistent(&self) -> bool {
        self.path.is_some()
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Append a record; ids must be unique
    pub fn add(&mut self, record: ConnectionRecord) -> Result<()> {
        if self.get(&record.id).is_some() {
            return Err(VpnError::Storage(format!(
                "connection {} already exists",
                record.id
            )));
        }
        self.settings.connections.push(record);
        Ok(())
    }

    /// Put a record back at `index`, clamped to the end of the list
    pub fn insert(&mut self, index: usize, record: ConnectionRecord) -> Result<()> {
        if self.get(&record.id).is_some() {
            return Err(VpnError::Storage(format!(
                "connection {} already exists",
                record.id
            )));
        }
        let index = index.min(self.settings.connections.len());
        self.settings.connections.insert(index, record);
        Ok(())
    }

    /// Remove a record, returning it with the position it held
    pub fn remove(&mut self, id: &str) -> Option<(usize, ConnectionRecord)> {
        let index = self
            .settings
            .connections
            .iter()
            .position(|record| record.id == id)?;
        Some((index, self.settings.connections.remove(index)))
    }

    pub fn get(&self, id: &str) -> Option<&ConnectionRecord> {
        self.settings
            .connections
            .iter()
            .find(|record| record.id == id)
    }

    pub fn list(&self) -> &[ConnectionRecord] {
        &self.settings.connections
    }

    pub fn language(&self) -> &str {
        &self.settings.language
    }

    pub fn set_language(&mut self, language: &str) -> Result<()> {
        if !SUPPORTED_LANGUAGES.contains(&language) {
            return Err(VpnError::InvalidLanguage(language.to_string()));
        }
        self.settings.language = language.to_string();
        Ok(())
    }

    pub fn connection_mode(&self) -> ConnectionMode {
        self.settings.connection_mode
    }

    pub fn set_connection_mode(&mut self, mode: ConnectionMode) {
        self.settings.connection_mode = mode;
    }

    /// Write the document back; a no-op for in-memory stores
    pub fn save(&self) -> Result<()> {
        let Some(path) = self.path.as_deref() else {
            return Ok(());
        };
        write_atomically(path, &self.settings).map_err(|e| {
            VpnError::Storage(format!("failed to write {}: {e}", path.display()))
        })
    }
}

fn write_atomically(path: &Path, settings: &Settings) -> Result<()> {
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir)?;

    let mut file = tempfile::NamedTempFile::new_in(dir)?;
    serde_json::to_writer_pretty(&mut file, settings)?;
    file.write_all(b"\n")?;
    file.flush()?;
    file.persist(path).map_err(|e| VpnError::Io(e.error))?;
    Ok(())
}
