use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::Result;

/// Top-level configuration structure for the application.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub page: PageConfig,
    pub zoom: ZoomConfig,
    pub caption: CaptionConfig,
    pub audio: AudioConfig,
    pub animation: AnimationConfig,
    /// Fixed seed for scene randomness. `None` seeds from entropy.
    pub seed: Option<u64>,
}

impl AppConfig {
    /// Loads a JSON configuration file. Missing sections fall back to their
    /// defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        Self::from_json(&raw)
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        Ok(serde_json::from_str(raw)?)
    }

    /// Defaults with a fixed seed so repeated runs draw the same scenes.
    pub fn deterministic(seed: u64) -> Self {
        Self {
            seed: Some(seed),
            ..Self::default()
        }
    }
}

/// Element ids and default geometry of the host page.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PageConfig {
    /// Container the caption typewriter writes into. Newly mounted
    /// visualization containers are inserted after it.
    pub caption_container_id: String,
    pub selector_id: String,
    pub placeholder_label: String,
    /// Content box a visualization container lays out to once visible.
    pub viewport_width: f64,
    pub viewport_height: f64,
}

impl Default for PageConfig {
    fn default() -> Self {
        Self {
            caption_container_id: "phoneticOutput".to_string(),
            selector_id: "visualizationSelect".to_string(),
            placeholder_label: "Choose a visualization".to_string(),
            viewport_width: 800.0,
            viewport_height: 600.0,
        }
    }
}

/// Wheel zoom and drag parameters.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct ZoomConfig {
    pub min_scale: f64,
    pub max_scale: f64,
    /// Relative scale change applied per wheel notch.
    pub wheel_step: f64,
    /// Fraction of the remaining distance covered on each animation frame.
    pub damping: f64,
    /// Distance under which the zoom animation snaps to its target.
    pub epsilon: f64,
}

impl Default for ZoomConfig {
    fn default() -> Self {
        Self {
            min_scale: 0.2,
            max_scale: 5.0,
            wheel_step: 0.1,
            damping: 0.1,
            epsilon: 0.001,
        }
    }
}

/// Typewriter caption settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptionConfig {
    pub base_font_px: f64,
    pub min_font_px: f64,
    /// Average glyph advance as a fraction of the font size.
    pub char_width_ratio: f64,
    pub width: f64,
}

impl Default for CaptionConfig {
    fn default() -> Self {
        Self {
            base_font_px: 24.0,
            min_font_px: 8.0,
            char_width_ratio: 0.6,
            width: 800.0,
        }
    }
}

/// Availability of the audio backend used by the waveform visualizer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioBackend {
    Available,
    Unavailable,
}

/// Configuration specific to the audio subsystem.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    pub backend: AudioBackend,
    pub sample_rate: u32,
    /// Length of the tone synthesized for each character.
    pub note_ms: u32,
    /// Window handed to the analyser on every frame.
    pub fft_size: usize,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            backend: AudioBackend::Available,
            sample_rate: 48_000,
            note_ms: 120,
            fft_size: 1024,
        }
    }
}

/// Per-style animation parameters, handed to the layer generator and the
/// caption animator.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnimationConfig {
    /// Caption reveal duration in milliseconds.
    pub duration_ms: u64,
    pub layer_depth: usize,
}

impl Default for AnimationConfig {
    fn default() -> Self {
        Self {
            duration_ms: 3_000,
            layer_depth: 3,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_keeps_defaults() {
        let config = AppConfig::from_json(r#"{ "zoom": { "max_scale": 8.0 }, "seed": 7 }"#)
            .expect("config should parse");

        assert_eq!(config.zoom.max_scale, 8.0);
        assert_eq!(config.zoom.min_scale, 0.2);
        assert_eq!(config.seed, Some(7));
        assert_eq!(config.animation.layer_depth, 3);
        assert_eq!(config.page.caption_container_id, "phoneticOutput");
    }

    #[test]
    fn audio_backend_parses_lowercase() {
        let config = AppConfig::from_json(r#"{ "audio": { "backend": "unavailable" } }"#).unwrap();
        assert_eq!(config.audio.backend, AudioBackend::Unavailable);
    }

    #[test]
    fn rejects_malformed_json() {
        assert!(AppConfig::from_json("{ nope").is_err());
    }
}
