use std::{collections::HashSet, time::Duration};

use serde::{Deserialize, Serialize};
use shared::domain::UserId;

use crate::error::PaginatorError;

pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(60);
pub const DEFAULT_COMMAND_BUFFER: usize = 32;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlSymbols {
    pub prev: String,
    pub next: String,
    pub stop: String,
    pub jump: Option<String>,
    pub first: Option<String>,
    pub last: Option<String>,
}

impl Default for ControlSymbols {
    fn default() -> Self {
        Self {
            prev: "⬅".into(),
            next: "➡".into(),
            stop: "⏹".into(),
            jump: Some("🔢".into()),
            first: Some("⏮".into()),
            last: Some("⏭".into()),
        }
    }
}

impl ControlSymbols {
    /// Minimal set: previous, next and stop only.
    pub fn basic() -> Self {
        Self {
            jump: None,
            first: None,
            last: None,
            ..Self::default()
        }
    }

    /// Controls in the order they are attached to the message.
    pub fn attach_order(&self) -> Vec<String> {
        [
            self.first.as_ref(),
            Some(&self.prev),
            Some(&self.next),
            self.last.as_ref(),
            self.jump.as_ref(),
            Some(&self.stop),
        ]
        .into_iter()
        .flatten()
        .cloned()
        .collect()
    }

    fn validate(&self) -> Result<(), PaginatorError> {
        let symbols = self.attach_order();
        if let Some(empty) = symbols.iter().position(|symbol| symbol.trim().is_empty()) {
            return Err(PaginatorError::InvalidConfig(format!(
                "control symbol #{} is empty",
                empty + 1
            )));
        }
        let mut seen = HashSet::new();
        for symbol in &symbols {
            if !seen.insert(symbol.as_str()) {
                return Err(PaginatorError::InvalidConfig(format!(
                    "control symbol '{symbol}' is bound more than once"
                )));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PaginatorConfig {
    pub page_count: u32,
    #[serde(with = "duration_secs", rename = "idle_timeout_seconds")]
    pub idle_timeout: Duration,
    pub allow_others: bool,
    pub allowed_users: Vec<UserId>,
    pub controls: ControlSymbols,
    pub command_buffer: usize,
}

impl Default for PaginatorConfig {
    fn default() -> Self {
        Self {
            page_count: 1,
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            allow_others: false,
            allowed_users: Vec::new(),
            controls: ControlSymbols::default(),
            command_buffer: DEFAULT_COMMAND_BUFFER,
        }
    }
}

impl PaginatorConfig {
    pub fn new(page_count: u32) -> Self {
        Self {
            page_count,
            ..Self::default()
        }
    }

    pub fn with_idle_timeout(mut self, idle_timeout: Duration) -> Self {
        self.idle_timeout = idle_timeout;
        self
    }

    pub fn with_allow_others(mut self, allow_others: bool) -> Self {
        self.allow_others = allow_others;
        self
    }

    pub fn with_allowed_users(mut self, users: impl IntoIterator<Item = UserId>) -> Self {
        self.allowed_users = users.into_iter().collect();
        self
    }

    pub fn with_controls(mut self, controls: ControlSymbols) -> Self {
        self.controls = controls;
        self
    }

    pub fn validate(&self) -> Result<(), PaginatorError> {
        if self.page_count == 0 {
            return Err(PaginatorError::InvalidConfig(
                "page_count must be at least 1".into(),
            ));
        }
        if self.idle_timeout.is_zero() {
            return Err(PaginatorError::InvalidConfig(
                "idle_timeout must be greater than zero".into(),
            ));
        }
        if self.command_buffer == 0 {
            return Err(PaginatorError::InvalidConfig(
                "command_buffer must be at least 1".into(),
            ));
        }
        self.controls.validate()
    }

    /// Whether `user` may drive a session started by `owner`.
    pub fn permits(&self, owner: UserId, user: UserId) -> bool {
        user == owner || self.allow_others || self.allowed_users.contains(&user)
    }
}

mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_zero_pages() {
        let err = PaginatorConfig::new(0).validate().expect_err("zero pages");
        assert!(matches!(err, PaginatorError::InvalidConfig(_)));
    }

    #[test]
    fn rejects_duplicate_controls() {
        let controls = ControlSymbols {
            stop: "➡".into(),
            ..ControlSymbols::basic()
        };
        let err = PaginatorConfig::new(3)
            .with_controls(controls)
            .validate()
            .expect_err("duplicate symbol");
        assert!(err.to_string().contains("more than once"));
    }

    #[test]
    fn attach_order_skips_unset_controls() {
        assert_eq!(ControlSymbols::basic().attach_order(), vec!["⬅", "➡", "⏹"]);
        assert_eq!(
            ControlSymbols::default().attach_order(),
            vec!["⏮", "⬅", "➡", "⏭", "🔢", "⏹"]
        );
    }

    #[test]
    fn permits_owner_allowed_users_and_everyone_when_open() {
        let owner = UserId(1);
        let config = PaginatorConfig::new(2).with_allowed_users([UserId(7)]);
        assert!(config.permits(owner, owner));
        assert!(config.permits(owner, UserId(7)));
        assert!(!config.permits(owner, UserId(8)));
        assert!(config.with_allow_others(true).permits(owner, UserId(8)));
    }

    #[test]
    fn deserializes_idle_timeout_in_seconds() {
        let config: PaginatorConfig = serde_json::from_str(
            r#"{"page_count":4,"idle_timeout_seconds":15,"controls":{"jump":null}}"#,
        )
        .expect("config");
        assert_eq!(config.page_count, 4);
        assert_eq!(config.idle_timeout, Duration::from_secs(15));
        assert_eq!(config.controls.jump, None);
        assert_eq!(config.controls.next, "➡");
        assert_eq!(config.command_buffer, DEFAULT_COMMAND_BUFFER);
    }
}
