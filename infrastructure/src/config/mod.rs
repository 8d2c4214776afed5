//! Configuration file loading with multi-source merging.

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Root of the configuration file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    pub chat: ChatConfig,
    pub remote: RemoteConfig,
    pub runtime: RuntimeConfig,
    pub log: LogConfig,
}

/// Conversation-level settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatConfig {
    /// Starting transport mode: "local" or "remote". A local start still
    /// falls back to remote when the runtime is unavailable.
    pub mode: String,
    /// Conversation identity prefix; the mode is appended per transport.
    pub id_prefix: String,
    /// System instructions supplied once at session creation.
    pub system_prompt: Option<String>,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            mode: "local".to_string(),
            id_prefix: "tandem".to_string(),
            system_prompt: None,
        }
    }
}

/// Remote endpoint settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    pub endpoint: String,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://127.0.0.1:8787".to_string(),
        }
    }
}

/// Model-runner settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Runner binary; resolved on PATH by the capability probe.
    pub command: String,
    pub args: Vec<String>,
    pub temperature: Option<f32>,
    pub top_k: Option<u32>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            command: "tandem-runner".to_string(),
            args: Vec::new(),
            temperature: None,
            top_k: None,
        }
    }
}

/// Transcript logging settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// JSONL conversation transcript path; disabled when unset.
    pub transcript: Option<PathBuf>,
}

/// Configuration loader that handles file discovery and merging.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration from all sources.
    ///
    /// Priority (highest to lowest):
    /// 1. Explicit config path (if provided)
    /// 2. Environment: `TANDEM_` prefix, `__` as the section separator
    /// 3. Project root: `./tandem.toml` or `./.tandem.toml`
    /// 4. Global: `~/.config/tandem/config.toml`
    /// 5. Default values
    pub fn load(config_path: Option<&PathBuf>) -> Result<FileConfig, Box<figment::Error>> {
        let mut figment = Figment::new().merge(Serialized::defaults(FileConfig::default()));

        if let Some(global_path) = Self::global_config_path()
            && global_path.exists()
        {
            figment = figment.merge(Toml::file(&global_path));
        }

        for filename in &["tandem.toml", ".tandem.toml"] {
            let path = PathBuf::from(filename);
            if path.exists() {
                figment = figment.merge(Toml::file(&path));
                break;
            }
        }

        figment = figment.merge(Env::prefixed("TANDEM_").split("__"));

        if let Some(path) = config_path {
            figment = figment.merge(Toml::file(path));
        }

        figment.extract().map_err(Box::new)
    }

    /// The global config file path.
    pub fn global_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("tandem").join("config.toml"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_favor_local_with_fallback() {
        let config = FileConfig::default();
        assert_eq!(config.chat.mode, "local");
        assert_eq!(config.chat.id_prefix, "tandem");
        assert_eq!(config.runtime.command, "tandem-runner");
        assert!(config.log.transcript.is_none());
    }

    #[test]
    fn toml_overrides_defaults_per_section() {
        let config: FileConfig = Figment::new()
            .merge(Serialized::defaults(FileConfig::default()))
            .merge(Toml::string(
                r#"
                [chat]
                mode = "remote"

                [remote]
                endpoint = "https://chat.example.com/"

                [runtime]
                temperature = 0.7
                top_k = 40
                "#,
            ))
            .extract()
            .unwrap();

        assert_eq!(config.chat.mode, "remote");
        assert_eq!(config.remote.endpoint, "https://chat.example.com/");
        assert_eq!(config.runtime.temperature, Some(0.7));
        assert_eq!(config.runtime.top_k, Some(40));
        // Untouched sections keep their defaults.
        assert_eq!(config.chat.id_prefix, "tandem");
    }

    #[test]
    fn global_config_path_points_into_tandem_dir() {
        let path = ConfigLoader::global_config_path();
        assert!(path.is_some());
        assert!(path.unwrap().to_string_lossy().contains("tandem"));
    }
}
