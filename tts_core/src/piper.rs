//! Piper voices as a [`SynthesisEngine`].
//!
//! Voices come from a `map.json` keyed by language. An entry is either a
//! config path or `{ "config": "...", "default_speaker": 3 }`; the grouped
//! form `{ "default_voice": "x", "voices": { "x": { "config": "..." } } }`
//! resolves to its default voice. Models load on first use and stay cached.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::Path;

use anyhow::Context;
use piper_rs::synth::{PiperSpeechStreamParallel, PiperSpeechSynthesizer};
use serde::Serialize;
use serde_json::Value;
use tracing::info;

use crate::engine::{Capabilities, RawAudio, SynthesisEngine, SynthesisParams};
use crate::error::{Result, TtsError};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VoiceEntry {
    pub config: String,
    pub default_speaker: Option<i64>,
}

struct LoadedVoice {
    synth: PiperSpeechSynthesizer,
    sample_rate: u32,
}

pub struct PiperEngine {
    voices: BTreeMap<String, VoiceEntry>,
    loaded: HashMap<String, LoadedVoice>,
    capabilities: Capabilities,
}

impl PiperEngine {
    pub fn new(voices: BTreeMap<String, VoiceEntry>) -> Self {
        // One voice means one language: the request language is checked
        // against it but never forwarded.
        let capabilities = Capabilities {
            supports_multi_language: voices.len() > 1,
            supports_speaker_cloning: false,
            languages: voices.keys().cloned().collect(),
        };
        Self {
            voices,
            loaded: HashMap::new(),
            capabilities,
        }
    }

    /// Load from `models/map.json`
    pub fn from_map_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let text = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to load {}", path.as_ref().display()))?;
        let json: Value =
            serde_json::from_str(&text).with_context(|| "voice map is not valid JSON")?;
        Ok(Self::new(parse_voice_map(&json)?))
    }

    pub fn voices(&self) -> &BTreeMap<String, VoiceEntry> {
        &self.voices
    }

    /// Load the given voices now instead of on their first request.
    pub fn preload(&mut self, languages: &[&str]) -> Result<()> {
        for language in languages {
            self.load(language)?;
        }
        Ok(())
    }

    fn load(&mut self, language: &str) -> Result<&LoadedVoice> {
        if !self.loaded.contains_key(language) {
            let entry = self.voices.get(language).ok_or_else(|| {
                TtsError::Capability(format!("No voice configured for '{language}'"))
            })?;
            let model_config =
                read_model_config(&entry.config).map_err(|e| TtsError::Engine(format!("{e:#}")))?;
            let sample_rate = sample_rate_from_config(&model_config)
                .map_err(|e| TtsError::Engine(format!("{e:#}")))?;
            let speaker = speaker_for_config(&model_config, entry.default_speaker)
                .map_err(|e| TtsError::Engine(format!("{e:#}")))?;
            let model = piper_rs::from_config_path(Path::new(&entry.config))
                .map_err(|e| TtsError::Engine(format!("piper load error: {e}")))?;
            if let Some(speaker) = speaker {
                if let Some(e) = model.set_speaker(speaker) {
                    return Err(TtsError::Engine(format!("piper speaker error: {e}")));
                }
            }
            let synth = PiperSpeechSynthesizer::new(model)
                .map_err(|e| TtsError::Engine(format!("piper init error: {e}")))?;

            info!(
                language,
                config = %entry.config,
                sample_rate,
                speaker = ?speaker,
                "Loaded Piper voice"
            );
            self.loaded
                .insert(language.to_string(), LoadedVoice { synth, sample_rate });
        }
        self.loaded
            .get(language)
            .ok_or_else(|| TtsError::Engine(format!("voice '{language}' failed to load")))
    }
}

impl SynthesisEngine for PiperEngine {
    fn capabilities(&self) -> Capabilities {
        self.capabilities.clone()
    }

    fn synthesize(&mut self, text: &str, params: &SynthesisParams) -> Result<RawAudio> {
        self.capabilities.check(params)?;

        let language = match &params.language {
            Some(language) => language.clone(),
            None => self
                .voices
                .keys()
                .next()
                .cloned()
                .ok_or_else(|| TtsError::Engine("no Piper voices configured".to_string()))?,
        };
        let voice = self.load(&language)?;

        let iter: PiperSpeechStreamParallel = voice
            .synth
            .synthesize_parallel(text.to_string(), None)
            .map_err(|e| TtsError::Engine(format!("piper synth error: {e}")))?;

        let mut samples: Vec<f32> = Vec::new();
        for part in iter {
            samples.extend(
                part.map_err(|e| TtsError::Engine(format!("chunk error: {e}")))?
                    .into_vec(),
            );
        }
        Ok(RawAudio::mono(samples, voice.sample_rate))
    }
}

/// Parse the language → voice mapping of a `map.json` document.
pub fn parse_voice_map(json: &Value) -> anyhow::Result<BTreeMap<String, VoiceEntry>> {
    let obj = json
        .as_object()
        .ok_or_else(|| anyhow::anyhow!("voice map must be a JSON object"))?;

    let mut voices = BTreeMap::new();
    for (lang, v) in obj {
        let entry = match v {
            Value::String(path) => VoiceEntry {
                config: path.clone(),
                default_speaker: None,
            },
            Value::Object(o) if o.contains_key("voices") => {
                let default_voice = o
                    .get("default_voice")
                    .and_then(|x| x.as_str())
                    .ok_or_else(|| anyhow::anyhow!("missing 'default_voice' for language {lang}"))?;
                let voice = o
                    .get("voices")
                    .and_then(|x| x.get(default_voice))
                    .ok_or_else(|| {
                        anyhow::anyhow!("default voice '{default_voice}' not listed for {lang}")
                    })?;
                VoiceEntry {
                    config: config_field(voice, lang)?,
                    default_speaker: voice.get("speaker_id").and_then(|x| x.as_i64()),
                }
            }
            Value::Object(o) => VoiceEntry {
                config: config_field(v, lang)?,
                default_speaker: o.get("default_speaker").and_then(|x| x.as_i64()),
            },
            _ => {
                return Err(anyhow::anyhow!(
                    "invalid entry for key {lang} (expected string or object)"
                ))
            }
        };
        voices.insert(lang.clone(), entry);
    }
    Ok(voices)
}

fn config_field(v: &Value, lang: &str) -> anyhow::Result<String> {
    v.get("config")
        .and_then(|x| x.as_str())
        .map(str::to_string)
        .ok_or_else(|| anyhow::anyhow!("missing 'config' for key {lang}"))
}

fn read_model_config<P: AsRef<Path>>(cfg_path: P) -> anyhow::Result<Value> {
    let text = fs::read_to_string(cfg_path.as_ref()).with_context(|| {
        format!("Failed to read config file: {}", cfg_path.as_ref().display())
    })?;
    serde_json::from_str(&text).with_context(|| "Config file is not valid JSON")
}

/// Check a configured speaker id against the model's speakers.
///
/// Single-speaker models ignore the id, so one set for them is an error.
fn speaker_for_config(json: &Value, speaker: Option<i64>) -> anyhow::Result<Option<i64>> {
    let Some(speaker) = speaker else {
        return Ok(None);
    };
    let num_speakers = json.get("num_speakers").and_then(|n| n.as_i64()).unwrap_or(1);
    if num_speakers <= 1 {
        anyhow::bail!("speaker {speaker} set for a single-speaker model");
    }
    let listed = match json.get("speaker_id_map").and_then(|m| m.as_object()) {
        Some(ids) if !ids.is_empty() => ids.values().any(|id| id.as_i64() == Some(speaker)),
        _ => (0..num_speakers).contains(&speaker),
    };
    if !listed {
        anyhow::bail!("speaker {speaker} is not one of the model's {num_speakers} speakers");
    }
    Ok(Some(speaker))
}

fn sample_rate_from_config(json: &Value) -> anyhow::Result<u32> {
    let sample_rate = json
        .get("audio")
        .and_then(|a| a.get("sample_rate"))
        .and_then(|sr| sr.as_u64())
        .ok_or_else(|| anyhow::anyhow!("Missing or invalid 'audio.sample_rate' in config"))?;
    u32::try_from(sample_rate).context("sample rate out of range")
}
