use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::formats;

/// Which elementary stream a codec list or capability set is about
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamKind {
    Audio,
    Video,
}

impl StreamKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Audio => "audio",
            Self::Video => "video",
        }
    }

    /// Stream specifier used by ffmpeg options (`-c:v`, `-c:a`)
    pub fn specifier(&self) -> &'static str {
        match self {
            Self::Audio => "a",
            Self::Video => "v",
        }
    }
}

impl fmt::Display for StreamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StreamKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "audio" | "a" => Ok(Self::Audio),
            "video" | "v" => Ok(Self::Video),
            other => Err(format!("unknown stream kind '{}'", other)),
        }
    }
}

/// Per-stream codec choice in a conversion request
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CodecSelection {
    #[default]
    Auto,
    Copy,
    Named(String),
}

impl CodecSelection {
    pub fn parse(value: &str) -> Self {
        match value.trim() {
            "" | "auto" => Self::Auto,
            "copy" => Self::Copy,
            name => Self::Named(name.to_string()),
        }
    }

    /// The explicit encoder name, if one was requested
    pub fn named(&self) -> Option<&str> {
        match self {
            Self::Named(name) => Some(name),
            _ => None,
        }
    }
}

impl fmt::Display for CodecSelection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Auto => f.write_str("auto"),
            Self::Copy => f.write_str("copy"),
            Self::Named(name) => f.write_str(name),
        }
    }
}

impl FromStr for CodecSelection {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::parse(s))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QualityTier {
    Highest,
    High,
    Medium,
    Low,
}

impl QualityTier {
    /// CRF-scale value (0-51, lower is better) used when no explicit CRF is given
    pub fn crf(&self) -> u8 {
        match self {
            Self::Highest => 18,
            Self::High => 20,
            Self::Medium => 23,
            Self::Low => 28,
        }
    }
}

impl FromStr for QualityTier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "highest" => Ok(Self::Highest),
            "high" => Ok(Self::High),
            "medium" => Ok(Self::Medium),
            "low" => Ok(Self::Low),
            other => Err(format!(
                "unknown quality tier '{}' (expected highest, high, medium or low)",
                other
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetadataPolicy {
    #[default]
    Preserve,
    Strip,
}

/// Hardware decode selection for video inputs
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HwAccelChoice {
    #[default]
    None,
    Auto,
    Named(String),
}

impl HwAccelChoice {
    pub fn parse(value: &str) -> Self {
        match value.trim() {
            "" | "none" | "off" => Self::None,
            "auto" => Self::Auto,
            name => Self::Named(name.to_string()),
        }
    }
}

impl FromStr for HwAccelChoice {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::parse(s))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressEvent {
    /// Always within 0.0..=1.0
    pub fraction: f64,
    pub message: String,
}

impl ProgressEvent {
    pub fn new(fraction: f64, message: impl Into<String>) -> Self {
        Self {
            fraction: fraction.clamp(0.0, 1.0),
            message: message.into(),
        }
    }
}

/// Vendor family of an encoder, assigned once from its name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EncoderFamily {
    Nvenc,
    Qsv,
    Amf,
    VideoToolbox,
    Vaapi,
    Software,
}

impl EncoderFamily {
    pub fn of(name: &str) -> Self {
        let lower = name.to_ascii_lowercase();
        if lower.contains("nvenc") {
            Self::Nvenc
        } else if lower.ends_with("_qsv") {
            Self::Qsv
        } else if lower.ends_with("_amf") {
            Self::Amf
        } else if lower.contains("videotoolbox") {
            Self::VideoToolbox
        } else if lower.ends_with("_vaapi") {
            Self::Vaapi
        } else {
            Self::Software
        }
    }

    pub fn is_hardware(&self) -> bool {
        !matches!(self, Self::Software)
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Nvenc => "NVENC",
            Self::Qsv => "Quick Sync",
            Self::Amf => "AMF",
            Self::VideoToolbox => "VideoToolbox",
            Self::Vaapi => "VA-API",
            Self::Software => "software",
        }
    }
}

/// One entry of a resolved codec candidate list
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Candidate {
    pub name: String,
    pub family: EncoderFamily,
    /// Needs `-strict experimental` when selected
    pub experimental: bool,
}

impl Candidate {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            family: EncoderFamily::of(&name),
            experimental: formats::is_experimental(&name),
            name,
        }
    }

    pub fn copy() -> Self {
        Self::new("copy")
    }

    pub fn is_copy(&self) -> bool {
        self.name == "copy"
    }
}

impl fmt::Display for Candidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}
