//! What the installed ffmpeg says it can do.
//!
//! Each introspection command (`-formats`, `-codecs`, `-encoders`,
//! `-hwaccels`) runs at most once per `Catalog`. Concurrent first callers
//! block on the same `OnceLock` instead of spawning duplicate processes.

use serde::Serialize;
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::OnceLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tracing::{debug, warn};

use super::core::{StreamKind, exec, formats};

/// Immutable set of engine identifiers
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CapabilitySet(BTreeSet<String>);

impl CapabilitySet {
    pub fn contains(&self, name: &str) -> bool {
        self.0.contains(name)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }
}

impl<S: Into<String>> FromIterator<S> for CapabilitySet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}

#[derive(Debug, Clone, Default)]
struct KindSets {
    audio: CapabilitySet,
    video: CapabilitySet,
}

impl KindSets {
    fn get(&self, kind: StreamKind) -> &CapabilitySet {
        match kind {
            StreamKind::Audio => &self.audio,
            StreamKind::Video => &self.video,
        }
    }
}

pub struct Catalog {
    ffmpeg: PathBuf,
    timeout: Duration,
    muxers: OnceLock<CapabilitySet>,
    formats: OnceLock<KindSets>,
    codecs: OnceLock<KindSets>,
    encoders: OnceLock<KindSets>,
    hwaccels: OnceLock<CapabilitySet>,
    degraded: AtomicBool,
}

impl Catalog {
    pub fn new(ffmpeg: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            ffmpeg: ffmpeg.into(),
            timeout,
            muxers: OnceLock::new(),
            formats: OnceLock::new(),
            codecs: OnceLock::new(),
            encoders: OnceLock::new(),
            hwaccels: OnceLock::new(),
            degraded: AtomicBool::new(false),
        }
    }

    /// True once any introspection command failed and defaults were used
    pub fn is_degraded(&self) -> bool {
        self.degraded.load(Ordering::SeqCst)
    }

    fn introspect(&self, flag: &str) -> Option<String> {
        debug!("introspecting {} {}", self.ffmpeg.display(), flag);
        match exec::capture(&self.ffmpeg, &["-hide_banner", flag], self.timeout) {
            Ok(out) if out.success && !out.stdout.trim().is_empty() => Some(out.stdout),
            Ok(out) => {
                warn!(
                    timed_out = out.timed_out,
                    "ffmpeg {} returned nothing usable; using defaults", flag
                );
                self.degraded.store(true, Ordering::SeqCst);
                None
            }
            Err(e) => {
                warn!("could not run {} {}: {}", self.ffmpeg.display(), flag, e);
                self.degraded.store(true, Ordering::SeqCst);
                None
            }
        }
    }

    /// Raw muxer names from `ffmpeg -formats`
    pub fn muxers(&self) -> &CapabilitySet {
        self.muxers.get_or_init(|| {
            self.introspect("-formats")
                .map(|text| parse_muxers(&text))
                .unwrap_or_default()
        })
    }

    /// Target extensions of the given kind whose muxer is available.
    ///
    /// Falls back to a small always-works set when discovery fails.
    pub fn formats(&self, kind: StreamKind) -> &CapabilitySet {
        self.formats
            .get_or_init(|| {
                let muxers = self.muxers();
                let pick = |kind: StreamKind, fallback: &[&str]| -> CapabilitySet {
                    let found: CapabilitySet = formats::known_formats(kind)
                        .filter(|(_, muxer)| muxers.contains(muxer))
                        .map(|(ext, _)| ext)
                        .collect();
                    if found.is_empty() {
                        self.degraded.store(true, Ordering::SeqCst);
                        fallback.iter().copied().collect()
                    } else {
                        found
                    }
                };
                KindSets {
                    audio: pick(StreamKind::Audio, formats::FALLBACK_AUDIO_FORMATS),
                    video: pick(StreamKind::Video, formats::FALLBACK_VIDEO_FORMATS),
                }
            })
            .get(kind)
    }

    /// Codecs the engine can decode or encode, from `ffmpeg -codecs`
    pub fn codecs(&self, kind: StreamKind) -> &CapabilitySet {
        self.codecs
            .get_or_init(|| {
                self.introspect("-codecs")
                    .map(|text| parse_codecs(&text))
                    .unwrap_or_default()
            })
            .get(kind)
    }

    /// Encoder implementations compiled in, from `ffmpeg -encoders`
    pub fn encoders(&self, kind: StreamKind) -> &CapabilitySet {
        self.encoders
            .get_or_init(|| {
                self.introspect("-encoders")
                    .map(|text| parse_encoders(&text))
                    .unwrap_or_default()
            })
            .get(kind)
    }

    /// Hardware decode accelerators, from `ffmpeg -hwaccels`
    pub fn hwaccels(&self) -> &CapabilitySet {
        self.hwaccels.get_or_init(|| {
            self.introspect("-hwaccels")
                .map(|text| parse_hwaccels(&text))
                .unwrap_or_default()
        })
    }
}

/// Skip legend lines such as ` D. = Demuxing supported` and separators
fn flag_and_name(line: &str) -> Option<(&str, &str)> {
    let mut tokens = line.split_whitespace();
    let flags = tokens.next()?;
    let name = tokens.next()?;
    (name != "=").then_some((flags, name))
}

/// Parse `ffmpeg -formats`: names flagged `E` (muxing supported)
pub fn parse_muxers(text: &str) -> CapabilitySet {
    text.lines()
        .filter_map(flag_and_name)
        .filter(|(flags, _)| {
            flags.contains('E') && flags.chars().all(|c| matches!(c, 'D' | 'E' | 'd' | '.'))
        })
        .flat_map(|(_, names)| names.split(','))
        .filter(|name| !name.is_empty())
        .collect()
}

/// Parse `ffmpeg -codecs`: ` DEV.LS h264  H.264 / AVC ...`
fn parse_codecs(text: &str) -> KindSets {
    let mut sets = KindSets::default();
    let mut audio = BTreeSet::new();
    let mut video = BTreeSet::new();
    for (flags, name) in text.lines().filter_map(flag_and_name) {
        let f: Vec<char> = flags.chars().collect();
        if f.len() != 6 || !matches!(f[0], 'D' | '.') || !matches!(f[1], 'E' | '.') {
            continue;
        }
        if f[0] == '.' && f[1] == '.' {
            continue;
        }
        match f[2] {
            'V' => video.insert(name.to_string()),
            'A' => audio.insert(name.to_string()),
            _ => false,
        };
    }
    sets.audio = CapabilitySet(audio);
    sets.video = CapabilitySet(video);
    sets
}

/// Parse `ffmpeg -encoders`: ` V....D libx264  libx264 H.264 ...`
fn parse_encoders(text: &str) -> KindSets {
    let mut audio = BTreeSet::new();
    let mut video = BTreeSet::new();
    for (flags, name) in text.lines().filter_map(flag_and_name) {
        if flags.len() != 6 || !flags[1..].chars().all(|c| matches!(c, '.' | 'F' | 'S' | 'X' | 'B' | 'D')) {
            continue;
        }
        match flags.as_bytes()[0] {
            b'V' => video.insert(name.to_string()),
            b'A' => audio.insert(name.to_string()),
            _ => false,
        };
    }
    KindSets {
        audio: CapabilitySet(audio),
        video: CapabilitySet(video),
    }
}

/// Parse `ffmpeg -hwaccels`: one name per line after the header
fn parse_hwaccels(text: &str) -> CapabilitySet {
    text.lines()
        .skip_while(|line| !line.trim_start().starts_with("Hardware acceleration methods"))
        .skip(1)
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect()
}
