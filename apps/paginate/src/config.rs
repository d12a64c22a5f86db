use std::{fs, path::Path, time::Duration};

use paginator::{
    config::{DEFAULT_COMMAND_BUFFER, DEFAULT_IDLE_TIMEOUT},
    ControlSymbols, PaginatorConfig,
};
use serde::Deserialize;
use shared::domain::UserId;
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub idle_timeout_seconds: u64,
    pub allow_others: bool,
    pub allowed_users: Vec<i64>,
    pub command_buffer: usize,
    pub edit_delay_ms: u64,
    pub controls: ControlSymbols,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            idle_timeout_seconds: DEFAULT_IDLE_TIMEOUT.as_secs(),
            allow_others: false,
            allowed_users: Vec::new(),
            command_buffer: DEFAULT_COMMAND_BUFFER,
            edit_delay_ms: 0,
            controls: ControlSymbols::default(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct FileSettings {
    idle_timeout_seconds: Option<u64>,
    allow_others: Option<bool>,
    allowed_users: Option<Vec<i64>>,
    command_buffer: Option<usize>,
    edit_delay_ms: Option<u64>,
    controls: Option<ControlSymbols>,
}

impl Settings {
    pub fn paginator_config(&self, page_count: u32) -> PaginatorConfig {
        let mut config = PaginatorConfig::new(page_count)
            .with_idle_timeout(Duration::from_secs(self.idle_timeout_seconds))
            .with_allow_others(self.allow_others)
            .with_allowed_users(self.allowed_users.iter().copied().map(UserId))
            .with_controls(self.controls.clone());
        config.command_buffer = self.command_buffer;
        config
    }

    fn apply_file(&mut self, file: FileSettings) {
        if let Some(v) = file.idle_timeout_seconds {
            self.idle_timeout_seconds = v;
        }
        if let Some(v) = file.allow_others {
            self.allow_others = v;
        }
        if let Some(v) = file.allowed_users {
            self.allowed_users = v;
        }
        if let Some(v) = file.command_buffer {
            self.command_buffer = v;
        }
        if let Some(v) = file.edit_delay_ms {
            self.edit_delay_ms = v;
        }
        if let Some(v) = file.controls {
            self.controls = v;
        }
    }

    fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(v) = lookup("PAGINATE_IDLE_TIMEOUT") {
            self.set_parsed("PAGINATE_IDLE_TIMEOUT", &v, |s, parsed| {
                s.idle_timeout_seconds = parsed
            });
        }
        if let Some(v) = lookup("APP__IDLE_TIMEOUT_SECONDS") {
            self.set_parsed("APP__IDLE_TIMEOUT_SECONDS", &v, |s, parsed| {
                s.idle_timeout_seconds = parsed
            });
        }
        if let Some(v) = lookup("APP__ALLOW_OTHERS") {
            self.set_parsed("APP__ALLOW_OTHERS", &v, |s, parsed| s.allow_others = parsed);
        }
        if let Some(v) = lookup("APP__ALLOWED_USERS") {
            let parsed = v
                .split(',')
                .map(str::trim)
                .filter(|id| !id.is_empty())
                .map(str::parse::<i64>)
                .collect::<Result<Vec<_>, _>>();
            match parsed {
                Ok(users) => self.allowed_users = users,
                Err(err) => warn!("config: ignoring APP__ALLOWED_USERS={v}: {err}"),
            }
        }
        if let Some(v) = lookup("APP__COMMAND_BUFFER") {
            self.set_parsed("APP__COMMAND_BUFFER", &v, |s, parsed| s.command_buffer = parsed);
        }
        if let Some(v) = lookup("APP__EDIT_DELAY_MS") {
            self.set_parsed("APP__EDIT_DELAY_MS", &v, |s, parsed| s.edit_delay_ms = parsed);
        }
    }

    fn set_parsed<T: std::str::FromStr>(
        &mut self,
        key: &str,
        raw: &str,
        apply: impl FnOnce(&mut Self, T),
    ) where
        T::Err: std::fmt::Display,
    {
        match raw.trim().parse::<T>() {
            Ok(parsed) => apply(self, parsed),
            Err(err) => warn!("config: ignoring {key}={raw}: {err}"),
        }
    }
}

/// Defaults, then `path` if it exists, then environment overrides.
pub fn load_settings(path: &Path) -> Settings {
    let mut settings = Settings::default();

    if let Ok(raw) = fs::read_to_string(path) {
        match toml::from_str::<FileSettings>(&raw) {
            Ok(file) => settings.apply_file(file),
            Err(err) => warn!("config: ignoring {}: {err}", path.display()),
        }
    }
    settings.apply_env(|key| std::env::var(key).ok());

    settings
}
