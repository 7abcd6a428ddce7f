//! Persisted application settings.
//!
//! One JSON file at `{config_dir}/JulyAgent/settings.json`, whole-record
//! read/modify/write. Loads never fail: a missing or unparsable file falls
//! back to defaults without touching the disk. Every accessor re-reads the
//! file, so edits made outside the process show up on the next read.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";
pub const DEFAULT_THEME: &str = "dark";
pub const DEFAULT_HOTKEY: &str = "Ctrl+Win+J";
pub const DEFAULT_PROMPT: &str = "You are a helpful AI assistant. Please provide clear, accurate, \
     and helpful responses to the user's questions and requests.";

const COMPANY_NAME: &str = "JulyAgent";
const SETTINGS_FILE_NAME: &str = "settings.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    pub model: String,
    pub theme: String,
    pub hotkey: String,
    pub auto_start: bool,
    pub prompt: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_key: None,
            model: DEFAULT_MODEL.to_string(),
            theme: DEFAULT_THEME.to_string(),
            hotkey: DEFAULT_HOTKEY.to_string(),
            auto_start: false,
            prompt: DEFAULT_PROMPT.to_string(),
        }
    }
}

impl Settings {
    /// The stored credential, treating a blank string the same as absent.
    pub fn api_key(&self) -> Option<&str> {
        self.api_key.as_deref().filter(|k| !k.trim().is_empty())
    }
}

/// Handle on the settings file. Cheap to clone; holds no cached state.
///
/// Mutators are full load-modify-save cycles over one shared file. The app
/// is single-instance so this is unguarded: two interleaved mutators can
/// lose one update (last write wins).
#[derive(Debug, Clone)]
pub struct SettingsStore {
    path: PathBuf,
}

impl SettingsStore {
    pub fn new() -> Self {
        Self {
            path: default_settings_path(),
        }
    }

    /// Store rooted at an explicit file path instead of the platform default.
    pub fn with_path(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Read the settings file, falling back to defaults on any failure.
    ///
    /// Does not create the file; defaults are only persisted by an explicit
    /// [`save`](Self::save).
    pub fn load(&self) -> Settings {
        let contents = match std::fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Settings::default();
            }
            Err(e) => {
                warn!(path = %self.path.display(), err = %e, "failed to read settings, using defaults");
                return Settings::default();
            }
        };

        match serde_json::from_str(&contents) {
            Ok(settings) => settings,
            Err(e) => {
                warn!(path = %self.path.display(), err = %e, "failed to parse settings, using defaults");
                Settings::default()
            }
        }
    }

    /// Serialize the whole record and overwrite the file, creating the
    /// containing directory if needed.
    pub fn save(&self, settings: &Settings) -> Result<()> {
        if let Some(dir) = self.path.parent() {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("failed to create settings directory {}", dir.display()))?;
        }
        let json = serde_json::to_string_pretty(settings).context("failed to serialize settings")?;
        std::fs::write(&self.path, json)
            .with_context(|| format!("failed to write settings to {}", self.path.display()))?;
        info!(path = %self.path.display(), "settings saved");
        Ok(())
    }

    pub fn api_key(&self) -> Option<String> {
        self.load().api_key().map(str::to_string)
    }

    pub fn model(&self) -> String {
        self.load().model
    }

    pub fn theme(&self) -> String {
        self.load().theme
    }

    pub fn hotkey(&self) -> String {
        self.load().hotkey
    }

    pub fn auto_start(&self) -> bool {
        self.load().auto_start
    }

    pub fn prompt(&self) -> String {
        self.load().prompt
    }

    pub fn update_api_key(&self, api_key: &str) -> Result<()> {
        self.update(|s| s.api_key = Some(api_key.to_string()))
    }

    pub fn update_model(&self, model: &str) -> Result<()> {
        self.update(|s| s.model = model.to_string())
    }

    pub fn update_theme(&self, theme: &str) -> Result<()> {
        self.update(|s| s.theme = theme.to_string())
    }

    pub fn update_hotkey(&self, hotkey: &str) -> Result<()> {
        self.update(|s| s.hotkey = hotkey.to_string())
    }

    pub fn update_auto_start(&self, auto_start: bool) -> Result<()> {
        self.update(|s| s.auto_start = auto_start)
    }

    pub fn update_prompt(&self, prompt: &str) -> Result<()> {
        self.update(|s| s.prompt = prompt.to_string())
    }

    fn update(&self, mutate: impl FnOnce(&mut Settings)) -> Result<()> {
        let mut settings = self.load();
        mutate(&mut settings);
        self.save(&settings)
    }
}

impl Default for SettingsStore {
    fn default() -> Self {
        Self::new()
    }
}

fn default_settings_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(COMPANY_NAME)
        .join(SETTINGS_FILE_NAME)
}
