//! Environment-driven configuration.
//!
//! All settings come from environment variables, resolved once at startup.
//! A missing bot token is fatal; everything else has a default.

use serde::Deserialize;

/// Error raised while reading settings from the environment.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required env var {0}")]
    MissingVar(&'static str),
    #[error("invalid value {value:?} for env var {var}: {reason}")]
    InvalidValue {
        var: &'static str,
        value: String,
        reason: String,
    },
}

/// Which transcription engine to run.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineKind {
    /// Local Vosk model, fed canonical PCM.
    Vosk { model_path: String },
    /// Google Speech `speech:recognize`, fed the original encoded bytes.
    Google { api_key: String, language: String },
}

/// Runtime settings for the bot.
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    /// Telegram bot auth token. Required.
    pub telegram_token: String,
    pub engine: EngineKind,
    /// Canonical PCM sample rate in Hz.
    pub sample_rate: u32,
    /// Maximum accepted clip duration in seconds. 0 disables the cap.
    pub max_clip_secs: u32,
    /// Transcoder binary invoked for PCM normalization.
    pub ffmpeg_path: String,
    /// Per-stage timeout in seconds. 0 disables timeouts.
    pub stage_timeout_secs: u64,
}

impl Settings {
    /// Load settings from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load settings via an arbitrary variable lookup. Test seam.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let telegram_token = lookup("TELEGRAM_BOT_TOKEN")
            .filter(|v| !v.is_empty())
            .ok_or(ConfigError::MissingVar("TELEGRAM_BOT_TOKEN"))?;

        let engine = match lookup("ENGINE").as_deref().unwrap_or("vosk") {
            "vosk" => EngineKind::Vosk {
                model_path: lookup("VOSK_MODEL_PATH")
                    .filter(|v| !v.is_empty())
                    .unwrap_or_else(|| "model".to_string()),
            },
            "google" => EngineKind::Google {
                api_key: lookup("GOOGLE_SPEECH_API_KEY")
                    .filter(|v| !v.is_empty())
                    .ok_or(ConfigError::MissingVar("GOOGLE_SPEECH_API_KEY"))?,
                language: lookup("SPEECH_LANGUAGE").unwrap_or_else(|| "en-US".to_string()),
            },
            other => {
                return Err(ConfigError::InvalidValue {
                    var: "ENGINE",
                    value: other.to_string(),
                    reason: "expected \"vosk\" or \"google\"".to_string(),
                });
            }
        };

        Ok(Self {
            telegram_token,
            engine,
            sample_rate: parse_or("SAMPLE_RATE", &lookup, 16_000)?,
            max_clip_secs: parse_or("MAX_CLIP_SECS", &lookup, 60)?,
            ffmpeg_path: lookup("FFMPEG_PATH").unwrap_or_else(|| "ffmpeg".to_string()),
            stage_timeout_secs: parse_or("STAGE_TIMEOUT_SECS", &lookup, 120)?,
        })
    }
}

fn parse_or<T: std::str::FromStr>(
    var: &'static str,
    lookup: &impl Fn(&str) -> Option<String>,
    default: T,
) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    match lookup(var) {
        Some(raw) if !raw.is_empty() => raw.parse().map_err(|e: T::Err| ConfigError::InvalidValue {
            var,
            value: raw,
            reason: e.to_string(),
        }),
        _ => Ok(default),
    }
}
