use std::path::{Path, PathBuf};
use std::time::Duration;

use figment::{
    Figment,
    providers::{Format, Json, Serialized},
};
use serde::{Deserialize, Serialize};
use snafu::{ResultExt, Snafu};
use vitaly_sim::{ResponsePool, ScriptError};

pub const SETTINGS_DIRECTORY_NAME: &str = "vitaly";
pub const SETTINGS_FILE_NAME: &str = "settings.json";

pub const DEFAULT_TYPING_DELAY_MS: u64 = 2_000;
pub const DEFAULT_REVEAL_TOKEN_DELAY_MS: u64 = 100;
pub const DEFAULT_SCROLL_SETTLE_MS: u64 = 100;

const DEFAULT_GREETING: &str = "Hello! I'm your AI health assistant. How can I help you today?";

/// Engine tuning and the canned response script.
///
/// Every duration is overridable so tests can run against short, fixed
/// delays; the response pool is validated separately at engine construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineSettings {
    #[serde(default = "default_typing_delay_ms")]
    pub typing_delay_ms: u64,
    #[serde(default = "default_reveal_token_delay_ms")]
    pub reveal_token_delay_ms: u64,
    #[serde(default = "default_scroll_settle_ms")]
    pub scroll_settle_ms: u64,
    #[serde(default = "default_greeting")]
    pub greeting: String,
    #[serde(default = "default_responses")]
    pub responses: Vec<String>,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            typing_delay_ms: default_typing_delay_ms(),
            reveal_token_delay_ms: default_reveal_token_delay_ms(),
            scroll_settle_ms: default_scroll_settle_ms(),
            greeting: default_greeting(),
            responses: default_responses(),
        }
    }
}

impl EngineSettings {
    pub fn typing_delay(&self) -> Duration {
        Duration::from_millis(self.typing_delay_ms)
    }

    pub fn reveal_token_delay(&self) -> Duration {
        Duration::from_millis(self.reveal_token_delay_ms)
    }

    pub fn scroll_settle(&self) -> Duration {
        Duration::from_millis(self.scroll_settle_ms)
    }

    /// Validates the configured responses into a usable pool.
    ///
    /// An empty pool is fatal here, at configuration time, never per turn.
    pub fn response_pool(&self) -> Result<ResponsePool, SettingsError> {
        ResponsePool::new(self.responses.clone()).context(InvalidResponsePoolSnafu {
            stage: "validate-response-pool",
        })
    }

    pub fn normalized(mut self) -> Self {
        self.greeting = self.greeting.trim().to_string();
        if self.greeting.is_empty() {
            self.greeting = default_greeting();
        }

        // Keep only meaningful script entries; an explicitly empty list stays
        // empty so pool validation can reject it.
        self.responses = self
            .responses
            .into_iter()
            .map(|response| response.trim().to_string())
            .filter(|response| !response.is_empty())
            .collect();

        self
    }

    pub fn default_config_dir() -> PathBuf {
        dirs::config_dir()
            .map(|path| path.join(SETTINGS_DIRECTORY_NAME))
            .unwrap_or_else(|| PathBuf::from(".vitaly"))
    }

    pub fn default_config_path() -> PathBuf {
        Self::default_config_dir().join(SETTINGS_FILE_NAME)
    }

    /// Loads settings from a JSON file merged over defaults; unreadable or
    /// invalid files fall back to defaults with a warning.
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        if !path.exists() {
            tracing::info!("settings file not found at {:?}, using defaults", path);
            return Self::default();
        }

        let figment =
            Figment::from(Serialized::defaults(Self::default())).merge(Json::file(path));

        match figment.extract::<Self>() {
            Ok(settings) => settings.normalized(),
            Err(error) => {
                tracing::warn!(
                    "failed to parse settings from {:?}: {}. using defaults",
                    path,
                    error
                );
                Self::default()
            }
        }
    }

    /// Writes settings as pretty JSON via a temporary file and rename.
    pub fn persist(&self, path: impl AsRef<Path>) -> Result<(), SettingsError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).context(CreateDirSnafu {
                stage: "create-settings-directory",
                path: parent.to_path_buf(),
            })?;
        }

        let content = serde_json::to_string_pretty(self).context(SerializeConfigSnafu {
            stage: "serialize-settings-json",
        })?;

        let temp_path = path.with_extension("json.tmp");
        std::fs::write(&temp_path, content).context(WriteFileSnafu {
            stage: "write-temporary-settings-file",
            path: temp_path.clone(),
        })?;

        std::fs::rename(&temp_path, path).context(RenameTempFileSnafu {
            stage: "rename-temporary-settings-file",
            from: temp_path,
            to: path.to_path_buf(),
        })?;

        tracing::info!("saved settings to {:?}", path);
        Ok(())
    }
}

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum SettingsError {
    #[snafu(display("configured response pool is unusable on `{stage}`: {source}"))]
    InvalidResponsePool {
        stage: &'static str,
        source: ScriptError,
    },
    #[snafu(display("failed to create settings directory at {path:?} on `{stage}`: {source}"))]
    CreateDir {
        stage: &'static str,
        path: PathBuf,
        source: std::io::Error,
    },
    #[snafu(display("failed to serialize settings on `{stage}`: {source}"))]
    SerializeConfig {
        stage: &'static str,
        source: serde_json::Error,
    },
    #[snafu(display("failed to write settings file at {path:?} on `{stage}`: {source}"))]
    WriteFile {
        stage: &'static str,
        path: PathBuf,
        source: std::io::Error,
    },
    #[snafu(display(
        "failed to replace settings file from {from:?} to {to:?} on `{stage}`: {source}"
    ))]
    RenameTempFile {
        stage: &'static str,
        from: PathBuf,
        to: PathBuf,
        source: std::io::Error,
    },
}

fn default_typing_delay_ms() -> u64 {
    DEFAULT_TYPING_DELAY_MS
}

fn default_reveal_token_delay_ms() -> u64 {
    DEFAULT_REVEAL_TOKEN_DELAY_MS
}

fn default_scroll_settle_ms() -> u64 {
    DEFAULT_SCROLL_SETTLE_MS
}

fn default_greeting() -> String {
    DEFAULT_GREETING.to_string()
}

fn default_responses() -> Vec<String> {
    vec![
        "Based on your health data, I notice that your sleep pattern has been quite irregular lately. I'd recommend establishing a more consistent sleep schedule to improve your overall health.".to_string(),
        "I've analyzed your recent activity levels, and they're looking good! However, you might want to consider incorporating more strength training exercises into your routine.".to_string(),
        "Your vital signs are within normal ranges, but I notice a slight elevation in stress levels. Would you like some suggestions for stress management techniques?".to_string(),
    ]
}
