// ABOUTME: Configuration loading for zimchat.
// ABOUTME: Reads ~/.zimchat/config.toml, applies env overrides, validates, and saves.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful assistant. You will be answering questions regarding the following source material:";

/// Environment variable that overrides `api_key`.
pub const API_KEY_ENV: &str = "ZIMCHAT_API_KEY";

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Upper bound on tokens in each reply.
    pub response_limit: u32,
    pub api_url: String,
    pub api_key: String,
    pub organization_id: String,
    pub project_id: String,
    /// Empty means the endpoint picks its default model.
    pub model: String,
    /// Prefix of the system turn, before the selected pages.
    pub system_prompt: String,
    /// Pages file loaded at startup.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_pages: Option<PathBuf>,
    /// Request a streamed reply.
    pub stream: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            response_limit: 1024,
            api_url: "http://localhost:5001/v1/chat/completions".to_string(),
            api_key: String::new(),
            organization_id: String::new(),
            project_id: String::new(),
            model: String::new(),
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            default_pages: None,
            stream: true,
        }
    }
}

impl Config {
    /// Load config from an explicit path; a missing file yields defaults.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the endpoint cannot honour.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.response_limit == 0 {
            return Err(ConfigError::InvalidResponseLimit);
        }
        Ok(())
    }

    /// Write the config as TOML, creating the directory if needed.
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        self.validate()?;
        let content = toml::to_string_pretty(self)?;
        let io_err = |source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }
        std::fs::write(path, content).map_err(io_err)?;
        Ok(())
    }

    /// Change one setting from its text form. Connection settings are left
    /// to the file since the transport is built once at startup.
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        let invalid = || ConfigError::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
        };
        match key {
            "response_limit" => {
                self.response_limit = value.trim().parse().map_err(|_| invalid())?;
            }
            "model" => self.model = value.trim().to_string(),
            "system_prompt" => self.system_prompt = value.to_string(),
            "stream" => self.stream = value.trim().parse().map_err(|_| invalid())?,
            "default_pages" => {
                let value = value.trim();
                self.default_pages = (!value.is_empty()).then(|| PathBuf::from(value));
            }
            other => return Err(ConfigError::UnknownSetting(other.to_string())),
        }
        Ok(())
    }

    /// Take the API key from the environment when it is set and non-empty.
    pub fn apply_env(&mut self) {
        if let Ok(key) = std::env::var(API_KEY_ENV) {
            if !key.trim().is_empty() {
                self.api_key = key;
            }
        }
    }

    /// The model to request, if one is configured.
    pub fn model_name(&self) -> Option<String> {
        let model = self.model.trim();
        (!model.is_empty()).then(|| model.to_string())
    }

    /// Base directory for zimchat files.
    pub fn base_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".zimchat")
    }

    /// Path to the config file.
    pub fn config_path() -> PathBuf {
        Self::base_dir().join("config.toml")
    }

    /// Path to the secrets env file.
    pub fn secrets_env_path() -> PathBuf {
        Self::base_dir().join(".env")
    }

    /// Directory for conversations saved without an explicit path.
    pub fn conversations_dir() -> PathBuf {
        Self::base_dir().join("conversations")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_values() {
        let config = Config::default();
        assert_eq!(config.response_limit, 1024);
        assert!(config.stream);
        assert!(config.default_pages.is_none());
        assert_eq!(config.model_name(), None);
        assert!(config.system_prompt.starts_with("You are a helpful assistant."));
    }

    #[test]
    fn parse_config_toml() {
        let toml_str = r#"
response_limit = 512
api_url = "https://api.openai.com/v1/chat/completions"
api_key = "sk-test"
organization_id = "org-1"
project_id = "proj-1"
model = "gpt-4o-mini"
system_prompt = "Answer from my notes:"
default_pages = "/home/user/notes.json"
stream = false
"#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.response_limit, 512);
        assert_eq!(config.api_key, "sk-test");
        assert_eq!(config.organization_id, "org-1");
        assert_eq!(config.project_id, "proj-1");
        assert_eq!(config.model_name().as_deref(), Some("gpt-4o-mini"));
        assert_eq!(config.system_prompt, "Answer from my notes:");
        assert_eq!(
            config.default_pages,
            Some(PathBuf::from("/home/user/notes.json"))
        );
        assert!(!config.stream);
    }

    #[test]
    fn parse_partial_config_uses_defaults() {
        let config: Config = toml::from_str(r#"model = "llama3""#).unwrap();
        assert_eq!(config.model, "llama3");
        assert_eq!(config.response_limit, 1024);
        assert_eq!(config.system_prompt, DEFAULT_SYSTEM_PROMPT);
    }

    #[test]
    fn zero_response_limit_is_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("config.toml");
        std::fs::write(&path, "response_limit = 0\n").unwrap();
        assert!(matches!(
            Config::load_from(&path),
            Err(ConfigError::InvalidResponseLimit)
        ));
    }

    #[test]
    fn missing_file_yields_defaults() {
        let tmp = tempfile::tempdir().unwrap();
        let config = Config::load_from(&tmp.path().join("absent.toml")).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn save_then_load_roundtrip() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("sub").join("config.toml");
        let config = Config {
            response_limit: 2048,
            model: "gpt-4o".into(),
            default_pages: Some(PathBuf::from("pages.json")),
            ..Config::default()
        };
        config.save_to(&path).unwrap();
        assert_eq!(Config::load_from(&path).unwrap(), config);
    }

    #[test]
    fn set_parses_typed_values() {
        let mut config = Config::default();
        config.set("response_limit", "256").unwrap();
        config.set("stream", "false").unwrap();
        config.set("model", " gpt-4o ").unwrap();
        config.set("default_pages", "pages.json").unwrap();
        assert_eq!(config.response_limit, 256);
        assert!(!config.stream);
        assert_eq!(config.model_name().as_deref(), Some("gpt-4o"));
        assert_eq!(config.default_pages, Some(PathBuf::from("pages.json")));
    }

    #[test]
    fn set_rejects_bad_values_and_unknown_keys() {
        let mut config = Config::default();
        assert!(matches!(
            config.set("response_limit", "-5"),
            Err(ConfigError::InvalidValue { .. })
        ));
        assert!(matches!(
            config.set("api_key", "sk-x"),
            Err(ConfigError::UnknownSetting(_))
        ));
        assert_eq!(config, Config::default());
    }

    #[test]
    fn save_rejects_zero_response_limit_without_writing() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("config.toml");
        let mut config = Config::default();
        config.set("response_limit", "0").unwrap();
        assert!(matches!(
            config.save_to(&path),
            Err(ConfigError::InvalidResponseLimit)
        ));
        assert!(!path.exists());
    }

    #[test]
    fn malformed_toml_is_parse_error() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("config.toml");
        std::fs::write(&path, "response_limit = \"lots\"\n").unwrap();
        assert!(matches!(
            Config::load_from(&path),
            Err(ConfigError::Parse { .. })
        ));
    }
}
