use lazy_static::lazy_static;
use serde::Deserialize;
use std::fs;
use std::time::Duration;

use crate::errors::TourError;

#[derive(Deserialize, Default)]
pub struct Config {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub log_level: Option<String>,
    pub static_path: Option<String>,
    pub static_url_prefix: Option<String>,
    pub session: Option<SessionConfig>,
    #[serde(default)]
    pub tour: TourConfig,
}

#[derive(Deserialize, Clone, Copy, Debug, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum SessionBackend {
    Cookie,
    Memory,
    Redis,
}

#[derive(Deserialize, Clone)]
pub struct SessionConfig {
    pub backend: SessionBackend,
    pub secret_key: String,
    #[serde(default = "default_cookie_name")]
    pub cookie_name: String,
    #[serde(default)]
    pub cookie_secure: bool,
    #[serde(default = "default_true")]
    pub cookie_http_only: bool,
    #[serde(default = "default_cookie_path")]
    pub cookie_path: String,
    pub cookie_domain: Option<String>,
    pub cookie_max_age: Option<i64>,
    pub redis_url: Option<String>,
    pub redis_pool_size: Option<u32>,
}

/// The `data-tour` identifiers of every element the tour reads or drives.
#[derive(Deserialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct TourTargets {
    pub dock_toggle: String,
    pub dock_menu: String,
    pub ai_menu_entry: String,
    pub chat_popup: String,
    pub message_input: String,
    pub message_send: String,
}

impl Default for TourTargets {
    fn default() -> Self {
        Self {
            dock_toggle: "chat-dock-toggle".to_string(),
            dock_menu: "chat-dock-menu".to_string(),
            ai_menu_entry: "ai-menu-entry".to_string(),
            chat_popup: "chat-popup".to_string(),
            message_input: "message-input".to_string(),
            message_send: "message-send".to_string(),
        }
    }
}

#[derive(Deserialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct TourConfig {
    pub storage_path: Option<String>,
    pub completion_key: String,
    pub auto_open: bool,
    pub tour_attribute: String,
    pub targets: TourTargets,
    pub close_label: String,
    pub seed_phrase: String,
    pub dock_settle_ms: u64,
    pub popup_settle_ms: u64,
    pub reset_settle_ms: u64,
    pub reopen_delay_ms: u64,
    pub seed_delay_ms: u64,
}

impl Default for TourConfig {
    fn default() -> Self {
        Self {
            storage_path: None,
            completion_key: "ai-tour-completed".to_string(),
            auto_open: true,
            tour_attribute: "data-tour".to_string(),
            targets: TourTargets::default(),
            close_label: "Close".to_string(),
            seed_phrase: "Hi! Can you summarize today's appointments?".to_string(),
            dock_settle_ms: 300,
            popup_settle_ms: 500,
            reset_settle_ms: 300,
            reopen_delay_ms: 100,
            seed_delay_ms: 100,
        }
    }
}

impl TourConfig {
    pub fn dock_settle(&self) -> Duration {
        Duration::from_millis(self.dock_settle_ms)
    }

    pub fn popup_settle(&self) -> Duration {
        Duration::from_millis(self.popup_settle_ms)
    }

    pub fn reset_settle(&self) -> Duration {
        Duration::from_millis(self.reset_settle_ms)
    }

    pub fn reopen_delay(&self) -> Duration {
        Duration::from_millis(self.reopen_delay_ms)
    }

    pub fn seed_delay(&self) -> Duration {
        Duration::from_millis(self.seed_delay_ms)
    }

    /// CSS selector the browser uses to address a tour target.
    pub fn selector(&self, tour_id: &str) -> String {
        format!("[{}=\"{}\"]", self.tour_attribute, tour_id)
    }
}

fn default_cookie_name() -> String {
    "ai_tour_session".to_string()
}

fn default_cookie_path() -> String {
    "/".to_string()
}

fn default_true() -> bool {
    true
}

impl Config {
    pub fn from_file(path: &str) -> Result<Self, TourError> {
        let content = fs::read_to_string(path).map_err(|e| TourError::Config {
            message: format!("could not read {}: {}", path, e),
        })?;
        Self::from_yaml(&content)
    }

    pub fn from_yaml(content: &str) -> Result<Self, TourError> {
        serde_yaml::from_str(content).map_err(|e| TourError::Config { message: e.to_string() })
    }

    pub fn host(&self) -> &str {
        self.host.as_deref().unwrap_or("127.0.0.1")
    }

    pub fn port(&self) -> u16 {
        self.port.unwrap_or(8080)
    }
}

lazy_static! {
    // The logger is not up yet when this is first touched, so a broken file is
    // reported on stderr and the defaults take over.
    pub static ref CONFIG: Config = match Config::from_file("config.yaml") {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Using the default configuration ({})", e);
            Config::default()
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_when_tour_section_missing() {
        let config = Config::from_yaml("port: 9090\n").unwrap();
        assert_eq!(config.port(), 9090);
        assert_eq!(config.host(), "127.0.0.1");
        assert_eq!(config.tour, TourConfig::default());
        assert_eq!(config.tour.completion_key, "ai-tour-completed");
    }

    #[test]
    fn test_partial_tour_section() {
        let yaml = r#"
tour:
  auto_open: false
  dock_settle_ms: 50
  targets:
    chat_popup: assistant-window
"#;
        let config = Config::from_yaml(yaml).unwrap();
        assert!(!config.tour.auto_open);
        assert_eq!(config.tour.dock_settle(), Duration::from_millis(50));
        assert_eq!(config.tour.popup_settle(), Duration::from_millis(500));
        assert_eq!(config.tour.targets.chat_popup, "assistant-window");
        assert_eq!(config.tour.targets.dock_toggle, "chat-dock-toggle");
    }

    #[test]
    fn test_session_section() {
        let yaml = r#"
session:
  backend: memory
  secret_key: abc
"#;
        let config = Config::from_yaml(yaml).unwrap();
        let session = config.session.unwrap();
        assert_eq!(session.backend, SessionBackend::Memory);
        assert_eq!(session.cookie_name, "ai_tour_session");
        assert!(session.cookie_http_only);
    }

    #[test]
    fn test_selector() {
        let tour = TourConfig::default();
        assert_eq!(tour.selector("chat-popup"), "[data-tour=\"chat-popup\"]");
    }

    #[test]
    fn test_invalid_yaml_is_config_error() {
        match Config::from_yaml("port: [") {
            Err(TourError::Config { .. }) => {}
            other => panic!("Expected a config error, got {:?}", other.map(|_| ())),
        }
    }
}
