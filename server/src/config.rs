// Configuration for the server, read from the environment

use std::str::FromStr;
use std::time::Duration;

use tts_core::{CoordinatorConfig, DEFAULT_FRAME_SIZE};

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub request_timeout_secs: u64,
    pub cors_allowed_origins: Option<Vec<String>>,
    pub model_map: String,
    pub default_language: String,
    pub default_speaker: Option<String>,
    pub max_text_length: usize,
    pub max_segment_length: usize,
    pub chunk_size: usize,
    pub ws_idle_timeout_secs: u64,
    pub body_limit_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            request_timeout_secs: 120,
            cors_allowed_origins: None,
            model_map: "models/map.json".to_string(),
            default_language: "en".to_string(),
            default_speaker: None,
            max_text_length: 5000,
            max_segment_length: 500,
            chunk_size: DEFAULT_FRAME_SIZE,
            ws_idle_timeout_secs: 30,
            body_limit_bytes: 64 * 1024,
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; unset or unparsable values keep their default.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let text = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let cors_allowed_origins = lookup("CORS_ALLOWED_ORIGINS").map(|origins| {
            origins
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect()
        });

        Self {
            host: text("HOST").unwrap_or(defaults.host),
            port: parsed_or(&lookup, "PORT", defaults.port),
            request_timeout_secs: parsed_or(
                &lookup,
                "REQUEST_TIMEOUT_SECS",
                defaults.request_timeout_secs,
            ),
            cors_allowed_origins,
            model_map: text("TTS_MODEL_MAP").unwrap_or(defaults.model_map),
            default_language: text("TTS_DEFAULT_LANGUAGE").unwrap_or(defaults.default_language),
            default_speaker: text("TTS_DEFAULT_SPEAKER"),
            max_text_length: parsed_or(&lookup, "TTS_MAX_TEXT_LENGTH", defaults.max_text_length),
            max_segment_length: parsed_or(
                &lookup,
                "TTS_MAX_SEGMENT_LENGTH",
                defaults.max_segment_length,
            ),
            chunk_size: parsed_or(&lookup, "TTS_CHUNK_SIZE", defaults.chunk_size),
            ws_idle_timeout_secs: parsed_or(
                &lookup,
                "WS_IDLE_TIMEOUT_SECS",
                defaults.ws_idle_timeout_secs,
            ),
            body_limit_bytes: parsed_or(&lookup, "BODY_LIMIT_BYTES", defaults.body_limit_bytes),
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn ws_idle_timeout(&self) -> Duration {
        Duration::from_secs(self.ws_idle_timeout_secs)
    }

    pub fn coordinator_config(&self) -> CoordinatorConfig {
        CoordinatorConfig {
            max_segment_length: self.max_segment_length,
            default_frame_size: self.chunk_size,
            default_language: Some(self.default_language.clone()),
            default_speaker_reference: self.default_speaker.clone(),
            ..CoordinatorConfig::default()
        }
    }
}

fn parsed_or<T, F>(lookup: &F, key: &str, default: T) -> T
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_when_unset() {
        let config = ServerConfig::from_lookup(lookup(&[]));
        assert_eq!(config.port, 8000);
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.default_language, "en");
        assert_eq!(config.chunk_size, 4096);
        assert_eq!(config.max_segment_length, 500);
        assert_eq!(config.ws_idle_timeout(), Duration::from_secs(30));
        assert!(config.cors_allowed_origins.is_none());
        assert!(config.default_speaker.is_none());
    }

    #[test]
    fn test_reads_overrides() {
        let config = ServerConfig::from_lookup(lookup(&[
            ("PORT", "9001"),
            ("TTS_DEFAULT_LANGUAGE", "de_DE"),
            ("TTS_DEFAULT_SPEAKER", "voices/anna.wav"),
            ("TTS_CHUNK_SIZE", "2048"),
            ("CORS_ALLOWED_ORIGINS", "http://a.test, http://b.test,"),
        ]));
        assert_eq!(config.port, 9001);
        assert_eq!(config.default_language, "de_DE");
        assert_eq!(
            config.cors_allowed_origins,
            Some(vec!["http://a.test".to_string(), "http://b.test".to_string()])
        );

        let coordinator = config.coordinator_config();
        assert_eq!(coordinator.default_frame_size, 2048);
        assert_eq!(coordinator.default_language.as_deref(), Some("de_DE"));
        assert_eq!(
            coordinator.default_speaker_reference.as_deref(),
            Some("voices/anna.wav")
        );
    }

    #[test]
    fn test_unparsable_values_fall_back() {
        let config = ServerConfig::from_lookup(lookup(&[
            ("PORT", "eighty"),
            ("TTS_MAX_TEXT_LENGTH", "-3"),
            ("HOST", "  "),
        ]));
        assert_eq!(config.port, 8000);
        assert_eq!(config.max_text_length, 5000);
        assert_eq!(config.host, "0.0.0.0");
    }
}
