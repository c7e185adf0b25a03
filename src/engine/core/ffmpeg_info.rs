use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::ffi::OsStr;
use std::path::Path;
use std::process::Command;
use std::time::Duration;

use super::exec;
use super::types::StreamKind;

#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    format_name: Option<String>,
    duration: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    index: Option<u32>,
    codec_type: Option<String>,
    codec_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    format: Option<FfprobeFormat>,
    #[serde(default)]
    streams: Vec<FfprobeStream>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StreamInfo {
    pub index: u32,
    /// None for data/subtitle/attachment streams
    pub kind: Option<StreamKind>,
    pub codec: Option<String>,
}

/// What ffprobe could tell about a file; empty means "unknown"
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MediaInfo {
    pub container: Option<String>,
    pub duration_s: Option<f64>,
    pub streams: Vec<StreamInfo>,
}

impl MediaInfo {
    pub fn is_empty(&self) -> bool {
        self.container.is_none() && self.duration_s.is_none() && self.streams.is_empty()
    }

    /// Codec of the first stream of the given kind
    pub fn first_codec(&self, kind: StreamKind) -> Option<&str> {
        self.streams
            .iter()
            .find(|s| s.kind == Some(kind))
            .and_then(|s| s.codec.as_deref())
    }

    pub fn has_stream(&self, kind: StreamKind) -> bool {
        self.streams.iter().any(|s| s.kind == Some(kind))
    }
}

/// Parse `ffprobe -print_format json -show_format -show_streams` output
pub fn parse_ffprobe_json(json: &str) -> Option<MediaInfo> {
    let probe: FfprobeOutput = serde_json::from_str(json).ok()?;
    let (container, duration_s) = match probe.format {
        Some(format) => (
            format.format_name,
            format.duration.and_then(|d| d.parse::<f64>().ok()),
        ),
        None => (None, None),
    };
    let streams = probe
        .streams
        .into_iter()
        .enumerate()
        .map(|(i, s)| StreamInfo {
            index: s.index.unwrap_or(i as u32),
            kind: match s.codec_type.as_deref() {
                Some("video") => Some(StreamKind::Video),
                Some("audio") => Some(StreamKind::Audio),
                _ => None,
            },
            codec: s.codec_name,
        })
        .collect();

    Some(MediaInfo {
        container,
        duration_s,
        streams,
    })
}

/// Describe a media file. Any failure (missing ffprobe, timeout, bad JSON)
/// yields an empty `MediaInfo`, never an error.
pub fn get_file_info(ffprobe: &Path, path: &Path, timeout: Duration) -> MediaInfo {
    let args: [&OsStr; 7] = [
        OsStr::new("-v"),
        OsStr::new("quiet"),
        OsStr::new("-print_format"),
        OsStr::new("json"),
        OsStr::new("-show_format"),
        OsStr::new("-show_streams"),
        path.as_os_str(),
    ];
    match exec::capture(ffprobe, &args, timeout) {
        Ok(out) if out.success => parse_ffprobe_json(&out.stdout).unwrap_or_default(),
        Ok(out) => {
            tracing::debug!(
                timed_out = out.timed_out,
                "ffprobe gave no usable result for {}",
                path.display()
            );
            MediaInfo::default()
        }
        Err(e) => {
            tracing::debug!("could not run {}: {}", ffprobe.display(), e);
            MediaInfo::default()
        }
    }
}

fn first_version_line(program: &Path, name: &str) -> Result<String> {
    let output = Command::new(program)
        .arg("-version")
        .output()
        .with_context(|| {
            format!(
                "Failed to execute {}. Is {} installed and in PATH?",
                program.display(),
                name
            )
        })?;

    if !output.status.success() {
        anyhow::bail!("{} command failed with status: {}", name, output.status);
    }

    let version_output = String::from_utf8_lossy(&output.stdout);
    let first_line = version_output.lines().next().unwrap_or("Unknown version");

    Ok(first_line.to_string())
}

/// Check if ffmpeg is available and return its version line
pub fn ffmpeg_version(program: &Path) -> Result<String> {
    first_version_line(program, "ffmpeg")
}

/// Check if ffprobe is available and return its version line
pub fn ffprobe_version(program: &Path) -> Result<String> {
    first_version_line(program, "ffprobe")
}
