use std::ffi::OsString;
use std::path::Path;

use super::formats;
use super::types::{Candidate, EncoderFamily, MetadataPolicy, QualityTier};

/// Render node used for VA-API when none is configured or detected
pub const DEFAULT_VAAPI_DEVICE: &str = "/dev/dri/renderD128";

/// Everything one ffmpeg invocation needs, with codecs already chosen
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EncodeParams {
    /// Muxer passed to `-f`
    pub muxer: String,
    pub hwaccel: Option<String>,
    /// Render node for VA-API encoders (`-vaapi_device`)
    pub vaapi_device: Option<String>,

    pub video_codec: Option<Candidate>,
    pub audio_codec: Option<Candidate>,
    pub drop_video: bool,
    pub drop_audio: bool,

    /// Source codecs, consulted only for stream-copy re-framing
    pub source_video_codec: Option<String>,
    pub source_audio_codec: Option<String>,

    pub video_bitrate: Option<String>,
    /// CRF-scale quality (0-51, lower is better), mapped per encoder family
    pub video_quality: Option<u8>,
    pub preset: Option<String>,
    pub tune: Option<String>,
    pub resolution: Option<(u32, u32)>,
    pub fps: Option<f64>,

    pub audio_bitrate: Option<String>,
    pub audio_quality: Option<QualityTier>,
    pub sample_rate: Option<u32>,
    pub channels: Option<u8>,

    pub threads: Option<u32>,
    pub metadata: MetadataPolicy,
    /// Trailing flags placed just before the output path
    pub custom_args: Vec<String>,
}

impl EncodeParams {
    fn any_experimental(&self) -> bool {
        [&self.video_codec, &self.audio_codec]
            .into_iter()
            .flatten()
            .any(|c| c.experimental)
    }

    fn video_family(&self) -> Option<EncoderFamily> {
        self.video_codec
            .as_ref()
            .filter(|c| !self.drop_video && !c.is_copy())
            .map(|c| c.family)
    }
}

/// Accumulates arguments; keeps the builder code close to the flag layout
struct ArgList(Vec<OsString>);

impl ArgList {
    fn flag(&mut self, flag: &str) -> &mut Self {
        self.0.push(flag.into());
        self
    }

    fn opt(&mut self, flag: &str, value: impl Into<OsString>) -> &mut Self {
        self.0.push(flag.into());
        self.0.push(value.into());
        self
    }
}

/// Build the ffmpeg argument vector (program name excluded).
///
/// Pure: the same inputs always yield the same vector.
pub fn build(input: &Path, output: &Path, params: &EncodeParams) -> Vec<OsString> {
    let mut args = ArgList(Vec::with_capacity(32));
    args.flag("-hide_banner").flag("-y");

    if let Some(hwaccel) = &params.hwaccel {
        args.opt("-hwaccel", hwaccel.as_str());
    }
    if params.video_family() == Some(EncoderFamily::Vaapi) {
        let device = params
            .vaapi_device
            .as_deref()
            .unwrap_or(DEFAULT_VAAPI_DEVICE);
        args.opt("-vaapi_device", device);
    }

    args.opt("-i", input);

    apply_video(&mut args, params);
    apply_audio(&mut args, params);

    if let Some(threads) = params.threads {
        args.opt("-threads", threads.to_string());
    }
    if params.metadata == MetadataPolicy::Strip {
        args.opt("-map_metadata", "-1");
    }
    if params.any_experimental() {
        args.opt("-strict", "experimental");
    }
    if formats::wants_faststart(&params.muxer) {
        args.opt("-movflags", "+faststart");
    }
    if !params.muxer.is_empty() {
        args.opt("-f", params.muxer.as_str());
    }
    for extra in &params.custom_args {
        args.flag(extra);
    }

    args.0.push(output.as_os_str().to_os_string());
    args.0
}

fn apply_video(args: &mut ArgList, params: &EncodeParams) {
    if params.drop_video {
        args.flag("-vn");
        return;
    }
    let Some(codec) = &params.video_codec else {
        return;
    };

    if codec.is_copy() {
        args.opt("-c:v", "copy");
        if let Some(bsf) = params
            .source_video_codec
            .as_deref()
            .and_then(|src| formats::bitstream_filter(src, &params.muxer))
        {
            args.opt("-bsf:v", bsf);
        }
        return;
    }

    args.opt("-c:v", codec.name.as_str());

    if let Some(q) = params.video_quality {
        apply_video_quality(args, codec, q, params.video_bitrate.is_some());
    }
    if let Some(bitrate) = &params.video_bitrate {
        args.opt("-b:v", bitrate.as_str());
    }
    if let Some(preset) = &params.preset {
        args.opt("-preset", preset.as_str());
    }
    if let Some(tune) = &params.tune {
        args.opt("-tune", tune.as_str());
    }

    if codec.family == EncoderFamily::Vaapi {
        // Frames must be uploaded to the device; scaling has to happen first
        let mut chain = Vec::new();
        if let Some((w, h)) = params.resolution {
            chain.push(format!("scale={}:{}", w, h));
        }
        chain.push("format=nv12".to_string());
        chain.push("hwupload".to_string());
        args.opt("-vf", chain.join(","));
    } else if let Some((w, h)) = params.resolution {
        args.opt("-s", format!("{}x{}", w, h));
    }
    if let Some(fps) = params.fps {
        args.opt("-r", format_rate(fps));
    }
}

/// Vendor-specific quality flag for a CRF-scale value
fn apply_video_quality(args: &mut ArgList, codec: &Candidate, q: u8, has_bitrate: bool) {
    let q = q.min(51);
    match codec.family {
        EncoderFamily::Nvenc => {
            args.opt("-cq", q.to_string());
        }
        EncoderFamily::Qsv => {
            args.opt("-global_quality", q.to_string());
        }
        EncoderFamily::Amf => {
            args.opt("-qp_i", q.to_string()).opt("-qp_p", q.to_string());
        }
        EncoderFamily::Vaapi => {
            args.opt("-qp", q.to_string());
        }
        EncoderFamily::VideoToolbox => {
            args.opt("-q:v", formats::videotoolbox_quality(q).to_string());
        }
        EncoderFamily::Software if formats::takes_crf(&codec.name) => {
            args.opt("-crf", q.to_string());
            // libvpx only honours CRF as constant quality with a zero target bitrate
            if codec.name.starts_with("libvpx") && !has_bitrate {
                args.opt("-b:v", "0");
            }
        }
        EncoderFamily::Software => {
            args.opt("-q:v", formats::qscale_from_crf(q).to_string());
        }
    }
}

fn apply_audio(args: &mut ArgList, params: &EncodeParams) {
    if params.drop_audio {
        args.flag("-an");
        return;
    }
    let Some(codec) = &params.audio_codec else {
        return;
    };

    if codec.is_copy() {
        args.opt("-c:a", "copy");
        if let Some(bsf) = params
            .source_audio_codec
            .as_deref()
            .and_then(|src| formats::bitstream_filter(src, &params.muxer))
        {
            args.opt("-bsf:a", bsf);
        }
        return;
    }

    args.opt("-c:a", codec.name.as_str());
    if let Some((flag, value)) = params
        .audio_quality
        .and_then(|tier| formats::audio_vbr(&codec.name, tier))
    {
        args.opt(flag, value.to_string());
    }
    if let Some(bitrate) = &params.audio_bitrate {
        args.opt("-b:a", bitrate.as_str());
    }
    if let Some(rate) = params.sample_rate {
        args.opt("-ar", rate.to_string());
    }
    if let Some(channels) = params.channels {
        args.opt("-ac", channels.to_string());
    }
}

fn format_rate(fps: f64) -> String {
    if fps.fract() == 0.0 {
        format!("{}", fps as u64)
    } else {
        format!("{:.3}", fps)
            .trim_end_matches('0')
            .trim_end_matches('.')
            .to_string()
    }
}

/// Render a full command line for display, shell-quoted
pub fn format_command(program: &Path, args: &[OsString]) -> String {
    let parts: Vec<String> = std::iter::once(program.as_os_str())
        .chain(args.iter().map(|a| a.as_os_str()))
        .map(|a| a.to_string_lossy().into_owned())
        .collect();
    shlex::try_join(parts.iter().map(String::as_str)).unwrap_or_else(|_| parts.join(" "))
}

/// Split a user-supplied flag string, keeping quoted values together
pub fn split_custom_args(raw: &str) -> Vec<String> {
    if raw.trim().is_empty() {
        return Vec::new();
    }
    shlex::split(raw).unwrap_or_else(|| raw.split_whitespace().map(str::to_string).collect())
}
