use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read configuration {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TimestampMode {
    /// Time since the shell started.
    #[default]
    Elapsed,
    /// Local wall-clock time.
    Wall,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AppConfig {
    pub title: String,
    pub asset_root: PathBuf,
    /// Shaders loaded at startup; the first one is bound for rendering.
    pub shaders: Vec<String>,
    pub clear_color: [f32; 4],
    pub timestamp: TimestampMode,
    pub notifications: bool,
    pub api: ApiConfig,
    pub headless: HeadlessConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            title: "Leto".into(),
            asset_root: PathBuf::from("Assets"),
            shaders: vec!["basic".into()],
            clear_color: [0.0, 0.0, 0.0, 1.0],
            timestamp: TimestampMode::default(),
            notifications: true,
            api: ApiConfig::default(),
            headless: HeadlessConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct ApiConfig {
    pub major: u8,
    pub minor: u8,
    pub core: bool,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            major: 4,
            minor: 6,
            core: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct HeadlessConfig {
    /// Frames to request before closing; `None` runs until interrupted.
    pub frames: Option<u64>,
    pub width: u32,
    pub height: u32,
    pub refresh_rate: u32,
    #[serde(
        deserialize_with = "deserialize_duration",
        serialize_with = "serialize_duration"
    )]
    pub frame_interval: Duration,
}

impl Default for HeadlessConfig {
    fn default() -> Self {
        Self {
            frames: None,
            width: 1920,
            height: 1080,
            refresh_rate: 60,
            frame_interval: Duration::from_millis(16),
        }
    }
}

fn deserialize_duration<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    struct Visitor;
    impl<'de> de::Visitor<'de> for Visitor {
        type Value = Duration;

        fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
            formatter.write_str("a duration as milliseconds or human-readable string")
        }

        fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            humantime::parse_duration(v)
                .map_err(|err| E::custom(format!("invalid duration '{v}': {err}")))
        }

        fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(Duration::from_millis(v))
        }

        fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            if v < 0 {
                return Err(E::custom("duration must be non-negative"));
            }
            Ok(Duration::from_millis(v as u64))
        }
    }

    deserializer.deserialize_any(Visitor)
}

fn serialize_duration<S>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    serializer.serialize_str(&humantime::format_duration(*value).to_string())
}

impl AppConfig {
    pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
        let raw: AppConfig = toml::from_str(input)?;
        raw.validate()?;
        Ok(raw)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let input = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&input)
    }

    /// The shader bound when rendering starts.
    pub fn active_shader(&self) -> Option<&str> {
        self.shaders.first().map(String::as_str)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.shaders.is_empty() {
            return Err(ConfigError::Invalid(
                "config must list at least one shader".into(),
            ));
        }

        for name in &self.shaders {
            if name.trim().is_empty() {
                return Err(ConfigError::Invalid("shader names may not be empty".into()));
            }
            if name.contains(['/', '\\']) {
                return Err(ConfigError::Invalid(format!(
                    "shader name '{name}' must not contain path separators"
                )));
            }
        }

        if let Some(component) = self
            .clear_color
            .iter()
            .find(|c| !(0.0..=1.0).contains(*c))
        {
            return Err(ConfigError::Invalid(format!(
                "clear_color components must be within 0.0..=1.0, got {component}"
            )));
        }

        if self.api.major == 0 {
            return Err(ConfigError::Invalid("api.major must be at least 1".into()));
        }

        if self.headless.width == 0 || self.headless.height == 0 {
            return Err(ConfigError::Invalid(
                "headless width and height must be greater than zero".into(),
            ));
        }

        if self.headless.frames == Some(0) {
            return Err(ConfigError::Invalid(
                "headless.frames must be greater than zero".into(),
            ));
        }

        Ok(())
    }
}
