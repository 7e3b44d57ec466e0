//! Conversion settings and quality presets.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Output container format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputFormat {
    /// MPEG-4 Part 14 (.mp4)
    #[default]
    Mp4,
    /// WebM
    Webm,
    /// Matroska (.mkv)
    Mkv,
    /// QuickTime (.mov)
    Mov,
    /// Audio Video Interleave (.avi)
    Avi,
}

impl OutputFormat {
    /// Returns the ffmpeg video codec used for this container.
    pub fn video_codec(&self) -> &'static str {
        match self {
            Self::Webm => "libvpx-vp9",
            Self::Mp4 | Self::Mkv | Self::Mov | Self::Avi => "libx264",
        }
    }
}

/// Named quality preset.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QualityTier {
    Low,
    #[default]
    Medium,
    High,
    Ultra,
    /// No preset defaults; every value comes from explicit settings.
    Custom,
}

impl QualityTier {
    /// Returns the preset values for this tier.
    pub fn preset(&self) -> EffectiveSettings {
        let (bitrate, width, height, fps, audio) = match self {
            Self::Low => (1000, 854, 480, 24.0, 96),
            Self::Medium => (2500, 1280, 720, 30.0, 128),
            Self::High => (5000, 1920, 1080, 30.0, 192),
            Self::Ultra => (12000, 3840, 2160, 60.0, 320),
            Self::Custom => return EffectiveSettings::default(),
        };

        EffectiveSettings {
            video_bitrate_kbps: Some(bitrate),
            resolution: Some(Resolution::new(width, height)),
            frame_rate: Some(fps),
            audio_codec: None,
            audio_bitrate_kbps: Some(audio),
        }
    }
}

/// Output frame size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

impl FromStr for Resolution {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (w, h) = s
            .split_once(['x', 'X'])
            .ok_or_else(|| format!("expected WIDTHxHEIGHT, got '{}'", s))?;
        let width = w
            .trim()
            .parse::<u32>()
            .map_err(|e| format!("invalid width '{}': {}", w, e))?;
        let height = h
            .trim()
            .parse::<u32>()
            .map_err(|e| format!("invalid height '{}': {}", h, e))?;
        if width == 0 || height == 0 {
            return Err(format!("resolution must be non-zero, got '{}'", s));
        }
        Ok(Self { width, height })
    }
}

/// Trim window in seconds from the start of the input.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TrimWindow {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_secs: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_secs: Option<f64>,
}

impl TrimWindow {
    /// Start offset, defaulting to the beginning of the input.
    pub fn start(&self) -> f64 {
        self.start_secs.unwrap_or(0.0)
    }

    /// True when neither end is set, so nothing is trimmed.
    pub fn is_empty(&self) -> bool {
        self.start_secs.is_none() && self.end_secs.is_none()
    }

    /// Length of the window, if it has an end.
    pub fn duration(&self) -> Option<f64> {
        self.end_secs.map(|end| end - self.start())
    }

    /// Checks that offsets are non-negative and the end follows the start.
    pub fn validate(&self) -> Result<(), String> {
        if self.start() < 0.0 {
            return Err(format!("trim start must be >= 0, got {}", self.start()));
        }
        if let Some(end) = self.end_secs {
            if end <= self.start() {
                return Err(format!(
                    "trim end ({}) must be after trim start ({})",
                    end,
                    self.start()
                ));
            }
        }
        Ok(())
    }
}

/// Settings requested for one conversion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversionSettings {
    #[serde(default)]
    pub format: OutputFormat,
    #[serde(default)]
    pub quality: QualityTier,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video_bitrate_kbps: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolution: Option<Resolution>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frame_rate: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_codec: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_bitrate_kbps: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trim: Option<TrimWindow>,
    /// Raw encoder arguments appended after the structured ones.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extra_args: Vec<String>,
    #[serde(default = "default_true")]
    pub preserve_aspect_ratio: bool,
}

fn default_true() -> bool {
    true
}

impl Default for ConversionSettings {
    fn default() -> Self {
        Self {
            format: OutputFormat::default(),
            quality: QualityTier::default(),
            video_bitrate_kbps: None,
            resolution: None,
            frame_rate: None,
            audio_codec: None,
            audio_bitrate_kbps: None,
            trim: None,
            extra_args: Vec::new(),
            preserve_aspect_ratio: true,
        }
    }
}

impl ConversionSettings {
    pub fn with_format(mut self, format: OutputFormat) -> Self {
        self.format = format;
        self
    }

    pub fn with_quality(mut self, quality: QualityTier) -> Self {
        self.quality = quality;
        self
    }

    pub fn with_trim(mut self, start_secs: Option<f64>, end_secs: Option<f64>) -> Self {
        self.trim = Some(TrimWindow {
            start_secs,
            end_secs,
        });
        self
    }

    pub fn with_extra_args(mut self, args: Vec<String>) -> Self {
        self.extra_args = args;
        self
    }

    /// Whether the raw arguments ask the encoder to overwrite the output.
    pub fn allows_overwrite(&self) -> bool {
        self.extra_args.iter().any(|a| a == "-y")
    }

    /// Quality preset overridden field by field by explicit settings.
    pub fn resolve(&self) -> EffectiveSettings {
        let preset = self.quality.preset();
        EffectiveSettings {
            video_bitrate_kbps: self.video_bitrate_kbps.or(preset.video_bitrate_kbps),
            resolution: self.resolution.or(preset.resolution),
            frame_rate: self.frame_rate.or(preset.frame_rate),
            audio_codec: self.audio_codec.clone().or(preset.audio_codec),
            audio_bitrate_kbps: self.audio_bitrate_kbps.or(preset.audio_bitrate_kbps),
        }
    }
}

/// Settings after applying the quality preset. `None` means encoder default.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EffectiveSettings {
    pub video_bitrate_kbps: Option<u32>,
    pub resolution: Option<Resolution>,
    pub frame_rate: Option<f32>,
    pub audio_codec: Option<String>,
    pub audio_bitrate_kbps: Option<u32>,
}
