#![allow(dead_code)] // Not every test binary uses every helper

//! A scriptable stand-in for ffmpeg and ffprobe.
//!
//! The fake engine answers the introspection flags from text files, logs
//! every invocation to `calls.log` and, for conversions, writes the output
//! file unless the chosen encoder is listed in `fail_encode`. Hang mode
//! leaves a partial file behind and blocks until killed.

use muxolotl::config::{ConversionConfig, EngineConfig};
use muxolotl::engine::{Converter, GpuProfile, Host};
use std::fs;
use std::io;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tempfile::TempDir;

pub const FORMATS: &str = "\
File formats:
 D. = Demuxing supported
 .E = Muxing supported
 --
 DE avi             AVI (Audio Video Interleaved)
 DE matroska,webm   Matroska / WebM
  E mp4             MP4 (MPEG-4 Part 14)
 DE mp3             MP3 (MPEG audio layer 3)
 DE wav             WAV / WAVE (Waveform Audio)
 DE flac            raw FLAC
";

pub const SOFTWARE_ENCODERS: &[(&str, char)] = &[
    ("libx264", 'V'),
    ("libx265", 'V'),
    ("mpeg4", 'V'),
    ("libvpx-vp9", 'V'),
    ("aac", 'A'),
    ("libopus", 'A'),
    ("libvorbis", 'A'),
    ("libmp3lame", 'A'),
    ("flac", 'A'),
    ("pcm_s16le", 'A'),
];

const FFMPEG_SCRIPT: &str = r#"#!/bin/sh
DIR="__DIR__"
echo "$*" >> "$DIR/calls.log"
case "$2" in
  -formats) cat "$DIR/formats.txt"; exit 0 ;;
  -encoders) cat "$DIR/encoders.txt"; exit 0 ;;
  -codecs) cat "$DIR/codecs.txt" 2>/dev/null; exit 0 ;;
  -hwaccels) cat "$DIR/hwaccels.txt"; exit 0 ;;
esac
case "$1" in
  -version) echo "ffmpeg version 6.1-fake"; exit 0 ;;
esac

last=""
vcodec=""
acodec=""
prev=""
for arg in "$@"; do
  case "$prev" in
    -c:v) vcodec="$arg" ;;
    -c:a) acodec="$arg" ;;
  esac
  prev="$arg"
  last="$arg"
done

listed() {
  [ -n "$1" ] && [ -f "$DIR/$2" ] && grep -qxF -- "$1" "$DIR/$2"
}

# Verification probes write to the null muxer
if [ "$last" = "-" ]; then
  if listed "$vcodec" fail_probe || listed "$acodec" fail_probe; then
    echo "Cannot load libcuda.so.1" >&2
    exit 1
  fi
  exit 0
fi

case "$last" in
  *muxolotl-trial-*)
    if [ -f "$DIR/reject_copy" ]; then
      echo "Could not find tag for codec pcm_s16le in stream #0, codec not currently supported in container" >&2
      exit 1
    fi
    printf trial > "$last"
    exit 0 ;;
esac

# Record conversions whose output path was already occupied
if [ -e "$last" ]; then
  echo "$last" >> "$DIR/occupied.log"
fi

if [ -f "$DIR/hang" ]; then
  printf partial > "$last"
  echo $$ > "$DIR/pid"
  while :; do sleep 1; done
fi

if listed "$vcodec" fail_encode || listed "$acodec" fail_encode; then
  printf partial > "$last"
  echo "Error while opening encoder for output stream - maybe incorrect parameters" >&2
  exit 1
fi

echo "  Duration: 00:00:10.00, start: 0.000000, bitrate: 128 kb/s" >&2
echo "size=      64kB time=00:00:05.00 bitrate= 104.9kbits/s speed=2.0x" >&2
echo "size=     128kB time=00:00:10.00 bitrate= 104.9kbits/s speed=2.0x" >&2
printf converted > "$last"
exit 0
"#;

const FFPROBE_SCRIPT: &str = r#"#!/bin/sh
DIR="__DIR__"
echo "$*" >> "$DIR/probe_calls.log"
if [ -f "$DIR/probe.json" ]; then
  cat "$DIR/probe.json"
  exit 0
fi
exit 1
"#;

pub struct FakeEngine {
    pub dir: TempDir,
}

impl FakeEngine {
    /// Engine listing the given encoders and no hwaccels
    pub fn new(encoders: &[(&str, char)]) -> Self {
        let dir = TempDir::new().expect("temp dir");
        let engine = Self { dir };
        engine.write("formats.txt", FORMATS);
        engine.set_encoders(encoders);
        engine.set_hwaccels(&[]);
        engine.install("ffmpeg", FFMPEG_SCRIPT);
        engine.install("ffprobe", FFPROBE_SCRIPT);
        engine
    }

    pub fn software() -> Self {
        Self::new(SOFTWARE_ENCODERS)
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn ffmpeg(&self) -> PathBuf {
        self.path().join("ffmpeg")
    }

    pub fn ffprobe(&self) -> PathBuf {
        self.path().join("ffprobe")
    }

    fn write(&self, name: &str, contents: &str) {
        fs::write(self.path().join(name), contents).expect("write fixture");
    }

    fn install(&self, name: &str, template: &str) {
        let path = self.path().join(name);
        let script = template.replace("__DIR__", &self.path().to_string_lossy());
        fs::write(&path, script).expect("write script");
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).expect("chmod");
        wait_until_executable(&path);
    }

    pub fn set_encoders(&self, encoders: &[(&str, char)]) {
        let mut text = String::from(
            "Encoders:\n V..... = Video\n A..... = Audio\n ------\n",
        );
        for (name, kind) in encoders {
            text.push_str(&format!(" {}....D {:<20} fake {}\n", kind, name, name));
        }
        self.write("encoders.txt", &text);
    }

    pub fn set_hwaccels(&self, names: &[&str]) {
        let mut text = String::from("Hardware acceleration methods:\n");
        for name in names {
            text.push_str(name);
            text.push('\n');
        }
        self.write("hwaccels.txt", &text);
    }

    /// Encoders whose verification probe fails
    pub fn fail_probe(&self, names: &[&str]) {
        self.write("fail_probe", &lines(names));
    }

    /// Encoders whose conversion attempt fails after writing a partial file
    pub fn fail_encode(&self, names: &[&str]) {
        self.write("fail_encode", &lines(names));
    }

    /// Stream-copy trials fail with an incompatibility diagnostic
    pub fn reject_copy(&self) {
        self.write("reject_copy", "");
    }

    /// Conversions block forever and record their pid
    pub fn hang(&self) {
        self.write("hang", "");
    }

    pub fn pid_file(&self) -> PathBuf {
        self.path().join("pid")
    }

    /// ffprobe reports these `(codec_type, codec_name)` streams
    pub fn set_streams(&self, streams: &[(&str, &str)]) {
        let streams: Vec<serde_json::Value> = streams
            .iter()
            .enumerate()
            .map(|(i, (kind, codec))| {
                serde_json::json!({"index": i, "codec_type": kind, "codec_name": codec})
            })
            .collect();
        let json = serde_json::json!({
            "streams": streams,
            "format": {"format_name": "fake", "duration": "10.000000"}
        });
        self.write("probe.json", &json.to_string());
    }

    /// Every ffmpeg invocation so far, one argument string per line
    pub fn calls(&self) -> Vec<String> {
        fs::read_to_string(self.path().join("calls.log"))
            .unwrap_or_default()
            .lines()
            .map(str::to_string)
            .collect()
    }

    pub fn count_calls(&self, needle: &str) -> usize {
        self.calls().iter().filter(|c| c.contains(needle)).count()
    }

    /// Output paths that already held a file when a conversion started
    pub fn occupied_outputs(&self) -> Vec<String> {
        fs::read_to_string(self.path().join("occupied.log"))
            .unwrap_or_default()
            .lines()
            .map(str::to_string)
            .collect()
    }

    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            ffmpeg: self.ffmpeg(),
            ffprobe: self.ffprobe(),
            vaapi_device: Some("/dev/dri/renderD128".to_string()),
            ..Default::default()
        }
    }

    pub fn host(&self, gpu: GpuProfile) -> Arc<Host> {
        Arc::new(Host::new(self.engine_config()).with_gpu_profile(gpu))
    }

    pub fn converter(&self, gpu: GpuProfile) -> Converter {
        Converter::new(self.host(gpu), ConversionConfig::default())
    }

    /// A small input file next to the engine
    pub fn input(&self, name: &str) -> PathBuf {
        let path = self.path().join(name);
        fs::write(&path, b"not really media").expect("write input");
        path
    }
}

/// Staging files left in `dir` by an unfinished conversion
pub fn leftover_parts(dir: &Path) -> Vec<PathBuf> {
    fs::read_dir(dir)
        .map(|entries| {
            entries
                .filter_map(|e| e.ok())
                .map(|e| e.path())
                .filter(|p| {
                    p.file_name()
                        .is_some_and(|n| n.to_string_lossy().starts_with(".muxolotl-part-"))
                })
                .collect()
        })
        .unwrap_or_default()
}

fn lines(names: &[&str]) -> String {
    names.iter().map(|n| format!("{}\n", n)).collect()
}

/// A freshly written script can briefly fail with ETXTBSY while another
/// test thread is forking; run it once so later spawns are reliable.
fn wait_until_executable(path: &Path) {
    for _ in 0..50 {
        match Command::new(path).arg("-version").output() {
            Err(e) if e.raw_os_error() == Some(libc::ETXTBSY) => {
                thread::sleep(Duration::from_millis(20))
            }
            Err(e) if e.kind() == io::ErrorKind::PermissionDenied => {
                thread::sleep(Duration::from_millis(20))
            }
            _ => return,
        }
    }
}
