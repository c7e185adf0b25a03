pub mod exec;
pub mod ffmpeg_cmd;
mod ffmpeg_info;
pub mod formats;
mod progress;
mod scan;
mod types;

pub use exec::{CancelToken, Captured, ExecOutcome, capture, execute};
pub use ffmpeg_cmd::{DEFAULT_VAAPI_DEVICE, EncodeParams, build, format_command, split_custom_args};
pub use ffmpeg_info::{
    MediaInfo, StreamInfo, ffmpeg_version, ffprobe_version, get_file_info, parse_ffprobe_json,
};
pub use progress::{ProgressParser, parse_timestamp};
pub use scan::{collect_inputs, is_media_file, scan, scan_streaming};
pub use types::{
    Candidate, CodecSelection, EncoderFamily, HwAccelChoice, MetadataPolicy, ProgressEvent,
    QualityTier, StreamKind,
};
