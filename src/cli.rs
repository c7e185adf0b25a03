use clap::{ArgAction, Args, Parser, Subcommand};
use muxolotl::engine::{CodecSelection, HwAccelChoice, QualityTier, StreamKind};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "muxolotl")]
#[command(version, about = "Convert media with whatever your ffmpeg can actually do", long_about = None)]
pub struct Cli {
    /// Use this config file instead of the default location
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// More log output (-v debug, -vv trace); MUXOLOTL_LOG overrides
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Check if ffmpeg and ffprobe are installed
    CheckFfmpeg,

    /// Show detected GPUs and the recommended decode accelerator
    Gpu,

    /// List writable formats, compiled-in encoders and hwaccels
    Capabilities {
        /// Run a verification encode for every tabled encoder
        #[arg(long)]
        verify: bool,
    },

    /// Show container, streams and duration of a media file
    Probe {
        /// Path to the media file
        file: PathBuf,
    },

    /// Show the ranked codec candidates for a target format
    Resolve {
        /// Target extension, e.g. mkv or mp3
        format: String,

        /// Stream kind to resolve (defaults to the target's own kind)
        #[arg(long)]
        kind: Option<StreamKind>,

        /// auto, or an explicit encoder name
        #[arg(long, default_value = "auto")]
        codec: CodecSelection,
    },

    /// Show the ffmpeg commands a conversion would try, without running them
    Plan {
        /// Input file
        input: PathBuf,

        #[command(flatten)]
        opts: ConvertOpts,
    },

    /// Convert files, or every media file under the given directories
    Convert {
        /// Files or directories to convert
        #[arg(required = true)]
        inputs: Vec<PathBuf>,

        #[command(flatten)]
        opts: ConvertOpts,

        /// Keep only the audio; the format must be an audio one
        #[arg(long)]
        extract_audio: bool,

        /// Concurrent conversions (defaults to the config's batch.max_workers)
        #[arg(short, long)]
        jobs: Option<usize>,
    },

    /// Show config status and location, or create default config if missing
    InitConfig,
}

/// Options shared by `plan` and `convert`
#[derive(Args, Debug, Clone)]
pub struct ConvertOpts {
    /// Target extension, e.g. mp4, webm, flac
    #[arg(short, long)]
    pub format: String,

    /// Output directory (defaults to each input's directory)
    #[arg(short, long, value_name = "DIR")]
    pub output_dir: Option<PathBuf>,

    /// auto, copy, or an encoder name
    #[arg(long, default_value = "auto")]
    pub video_codec: CodecSelection,

    /// auto, copy, or an encoder name
    #[arg(long, default_value = "auto")]
    pub audio_codec: CodecSelection,

    /// Video bitrate, e.g. 4M
    #[arg(long)]
    pub video_bitrate: Option<String>,

    /// Audio bitrate, e.g. 192k
    #[arg(long)]
    pub audio_bitrate: Option<String>,

    #[arg(long)]
    pub sample_rate: Option<u32>,

    #[arg(long)]
    pub channels: Option<u8>,

    /// Constant quality, 0-51 (lower is better)
    #[arg(long, value_parser = clap::value_parser!(u8).range(0..=51))]
    pub crf: Option<u8>,

    /// highest, high, medium or low
    #[arg(long)]
    pub quality: Option<QualityTier>,

    /// Output size as WIDTHxHEIGHT
    #[arg(long, value_parser = parse_resolution)]
    pub resolution: Option<(u32, u32)>,

    #[arg(long)]
    pub fps: Option<f64>,

    #[arg(long)]
    pub preset: Option<String>,

    #[arg(long)]
    pub tune: Option<String>,

    #[arg(long)]
    pub threads: Option<u32>,

    /// auto, none, or an hwaccel name such as cuda or vaapi
    #[arg(long, default_value = "auto")]
    pub hwaccel: HwAccelChoice,

    /// Drop container and stream metadata
    #[arg(long)]
    pub strip_metadata: bool,

    /// Extra ffmpeg flags placed before the output file, shell-quoted
    #[arg(long, allow_hyphen_values = true, value_name = "FLAGS")]
    pub custom_args: Option<String>,
}

fn parse_resolution(value: &str) -> Result<(u32, u32), String> {
    let (w, h) = value
        .split_once(['x', 'X'])
        .ok_or_else(|| format!("expected WIDTHxHEIGHT, got '{}'", value))?;
    let w: u32 = w.trim().parse().map_err(|_| format!("bad width '{}'", w))?;
    let h: u32 = h.trim().parse().map_err(|_| format!("bad height '{}'", h))?;
    if w == 0 || h == 0 {
        return Err("width and height must be positive".to_string());
    }
    Ok((w, h))
}

pub fn parse() -> Cli {
    Cli::parse()
}
