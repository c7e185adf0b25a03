//! Static container, codec and quality tables
//!
//! Candidate lists are in preference order: hardware encoders first, then the
//! software encoders that always come last.

use super::types::{QualityTier, StreamKind};

/// Video target extension -> ffmpeg muxer
const VIDEO_MUXERS: &[(&str, &str)] = &[
    ("mp4", "mp4"),
    ("m4v", "mp4"),
    ("mov", "mov"),
    ("avi", "avi"),
    ("mkv", "matroska"),
    ("webm", "webm"),
    ("flv", "flv"),
    ("f4v", "flv"),
    ("ogv", "ogg"),
    ("mpeg", "mpeg"),
    ("mpg", "mpeg"),
    ("ts", "mpegts"),
    ("m2ts", "mpegts"),
    ("mts", "mpegts"),
    ("mxf", "mxf"),
    ("3gp", "3gp"),
    ("3g2", "3g2"),
    ("asf", "asf"),
    ("wmv", "asf"),
    ("vob", "vob"),
];

/// Audio target extension -> ffmpeg muxer
const AUDIO_MUXERS: &[(&str, &str)] = &[
    ("mp3", "mp3"),
    ("wav", "wav"),
    ("flac", "flac"),
    ("ogg", "ogg"),
    ("oga", "ogg"),
    ("opus", "ogg"),
    ("spx", "ogg"),
    ("aac", "adts"),
    ("m4a", "mp4"),
    ("m4b", "mp4"),
    ("m4r", "mp4"),
    ("ac3", "ac3"),
    ("aiff", "aiff"),
    ("aif", "aiff"),
    ("aifc", "aiff"),
    ("caf", "caf"),
    ("au", "au"),
    ("amr", "amr"),
    ("dts", "dts"),
    ("mp2", "mp2"),
    ("wma", "asf"),
    ("wv", "wv"),
    ("mka", "matroska"),
    ("tta", "tta"),
    ("w64", "w64"),
];

/// Formats assumed to work when the engine cannot be introspected
pub const FALLBACK_VIDEO_FORMATS: &[&str] = &["mp4", "mkv", "avi", "mov", "webm"];
pub const FALLBACK_AUDIO_FORMATS: &[&str] = &["mp3", "wav", "flac", "ogg", "aac", "m4a"];

const MP4_VIDEO: &[&str] = &[
    "h264_nvenc", "h264_qsv", "h264_amf", "h264_videotoolbox", "h264_vaapi",
    "libx264", "libx265", "mpeg4",
];
const MOV_VIDEO: &[&str] = &[
    "h264_nvenc", "h264_qsv", "h264_amf", "h264_videotoolbox", "h264_vaapi",
    "libx264", "libx265",
];
const AVI_VIDEO: &[&str] = &[
    "h264_nvenc", "h264_qsv", "h264_amf", "h264_videotoolbox", "h264_vaapi",
    "libx264", "mpeg4",
];
const FLV_VIDEO: &[&str] = &[
    "h264_nvenc", "h264_qsv", "h264_amf", "h264_videotoolbox", "h264_vaapi",
    "libx264", "flv",
];
const THREEGP_VIDEO: &[&str] = &[
    "h264_nvenc", "h264_qsv", "h264_amf", "h264_videotoolbox", "h264_vaapi",
    "libx264", "h263",
];
const WEBM_VIDEO: &[&str] = &["vp9_qsv", "vp9_vaapi", "libvpx-vp9", "libvpx"];
const OGV_VIDEO: &[&str] = &["libtheora"];
const MPEG_VIDEO: &[&str] = &["mpeg2_qsv", "mpeg2video"];
const MXF_VIDEO: &[&str] = &["mpeg2video"];
const ASF_VIDEO: &[&str] = &["wmv2", "msmpeg4"];

const MP4_AUDIO: &[&str] = &["aac", "libfdk_aac"];
const MKV_AUDIO: &[&str] = &["aac", "libopus", "libvorbis"];
const WEBM_AUDIO: &[&str] = &["libopus", "libvorbis"];
const AVI_AUDIO: &[&str] = &["libmp3lame", "aac"];
const OGV_AUDIO: &[&str] = &["libvorbis", "vorbis"];
const MPEG_AUDIO: &[&str] = &["mp2"];
const TS_AUDIO: &[&str] = &["aac", "mp2"];
const ASF_AUDIO: &[&str] = &["wmav2"];
const MXF_AUDIO: &[&str] = &["pcm_s16le"];

/// Encoders that need strict compliance relaxed
const EXPERIMENTAL: &[&str] = &["vorbis", "opus", "dca"];

/// Encoders that take `-crf`; other software video encoders take `-q:v`
const CRF_ENCODERS: &[&str] = &[
    "libx264",
    "libx265",
    "libvpx",
    "libvpx-vp9",
    "libsvtav1",
    "libaom-av1",
];

const PCM_CODECS_PREFIX: &str = "pcm_";

/// Audio targets that can only hold a compressed codec
const COMPRESSED_AUDIO_TARGETS: &[&str] = &[
    "mp3", "aac", "m4a", "m4b", "m4r", "ogg", "oga", "opus", "spx", "wma", "ac3", "dts",
    "ape", "tta", "amr", "mp2",
];

/// Muxers that get `-movflags +faststart`
const FASTSTART_MUXERS: &[&str] = &["mp4", "mov"];

fn normalize(format: &str) -> String {
    format.trim().trim_start_matches('.').to_ascii_lowercase()
}

fn lookup(table: &[(&str, &'static str)], format: &str) -> Option<&'static str> {
    let key = normalize(format);
    table
        .iter()
        .find(|(ext, _)| *ext == key)
        .map(|(_, muxer)| *muxer)
}

/// Whether a target extension produces a video or an audio-only file
pub fn target_kind(format: &str) -> Option<StreamKind> {
    if lookup(VIDEO_MUXERS, format).is_some() {
        Some(StreamKind::Video)
    } else if lookup(AUDIO_MUXERS, format).is_some() {
        Some(StreamKind::Audio)
    } else {
        None
    }
}

/// ffmpeg muxer name for a target extension
pub fn muxer_for(format: &str) -> Option<&'static str> {
    lookup(VIDEO_MUXERS, format).or_else(|| lookup(AUDIO_MUXERS, format))
}

/// Every known target extension of the given kind, in table order
pub fn known_formats(kind: StreamKind) -> impl Iterator<Item = (&'static str, &'static str)> {
    let table = match kind {
        StreamKind::Video => VIDEO_MUXERS,
        StreamKind::Audio => AUDIO_MUXERS,
    };
    table.iter().copied()
}

fn video_target_video(ext: &str) -> Option<&'static [&'static str]> {
    let list = match ext {
        "mp4" | "m4v" => MP4_VIDEO,
        "mov" | "mkv" | "ts" | "m2ts" | "mts" => MOV_VIDEO,
        "avi" => AVI_VIDEO,
        "flv" | "f4v" => FLV_VIDEO,
        "3gp" | "3g2" => THREEGP_VIDEO,
        "webm" => WEBM_VIDEO,
        "ogv" => OGV_VIDEO,
        "mpeg" | "mpg" | "vob" => MPEG_VIDEO,
        "mxf" => MXF_VIDEO,
        "wmv" | "asf" => ASF_VIDEO,
        _ => return None,
    };
    Some(list)
}

fn video_target_audio(ext: &str) -> Option<&'static [&'static str]> {
    let list = match ext {
        "mp4" | "m4v" | "mov" | "3gp" | "3g2" => MP4_AUDIO,
        "mkv" => MKV_AUDIO,
        "webm" => WEBM_AUDIO,
        "avi" | "flv" | "f4v" => AVI_AUDIO,
        "ogv" => OGV_AUDIO,
        "mpeg" | "mpg" | "vob" => MPEG_AUDIO,
        "ts" | "m2ts" | "mts" => TS_AUDIO,
        "wmv" | "asf" => ASF_AUDIO,
        "mxf" => MXF_AUDIO,
        _ => return None,
    };
    Some(list)
}

fn audio_target_audio(ext: &str) -> Option<&'static [&'static str]> {
    let list: &'static [&'static str] = match ext {
        "mp3" => &["libmp3lame"],
        "wav" => &["pcm_s16le", "pcm_s24le", "pcm_s32le"],
        "flac" => &["flac"],
        "ogg" | "oga" => &["libvorbis", "vorbis", "libopus"],
        "opus" => &["libopus", "opus"],
        "spx" => &["libspeex"],
        "aac" | "m4a" | "m4b" | "m4r" => &["aac", "libfdk_aac"],
        "ac3" => &["ac3"],
        "aiff" | "aif" | "aifc" => &["pcm_s16be"],
        "caf" => &["alac", "pcm_s16le"],
        "au" => &["pcm_s16be"],
        "amr" => &["libopencore_amrnb"],
        "dts" => &["dca"],
        "mp2" => &["mp2"],
        "wma" => &["wmav2", "wmav1"],
        "wv" => &["wavpack"],
        "mka" => &["flac", "libopus", "aac"],
        "tta" => &["tta"],
        "w64" => &["pcm_s16le"],
        _ => return None,
    };
    Some(list)
}

/// Static base candidate list for `(format, stream kind)`
pub fn base_candidates(format: &str, kind: StreamKind) -> Option<&'static [&'static str]> {
    let ext = normalize(format);
    match (target_kind(&ext)?, kind) {
        (StreamKind::Video, StreamKind::Video) => video_target_video(&ext),
        (StreamKind::Video, StreamKind::Audio) => video_target_audio(&ext),
        (StreamKind::Audio, StreamKind::Audio) => audio_target_audio(&ext),
        (StreamKind::Audio, StreamKind::Video) => None,
    }
}

/// Best-effort guess at which stream kind an encoder produces
pub fn encoder_kind(name: &str) -> StreamKind {
    let in_audio_tables = AUDIO_MUXERS
        .iter()
        .filter_map(|(ext, _)| audio_target_audio(ext))
        .chain(
            VIDEO_MUXERS
                .iter()
                .filter_map(|(ext, _)| video_target_audio(ext)),
        )
        .any(|list| list.contains(&name));

    if in_audio_tables || name.starts_with(PCM_CODECS_PREFIX) {
        StreamKind::Audio
    } else {
        StreamKind::Video
    }
}

pub fn is_experimental(encoder: &str) -> bool {
    EXPERIMENTAL.contains(&encoder)
}

pub fn takes_crf(encoder: &str) -> bool {
    CRF_ENCODERS.contains(&encoder)
}

pub fn wants_faststart(muxer: &str) -> bool {
    FASTSTART_MUXERS.contains(&muxer)
}

/// Bitstream filter needed when copying `source_codec` into `muxer`
pub fn bitstream_filter(source_codec: &str, muxer: &str) -> Option<&'static str> {
    match (source_codec, muxer) {
        ("h264", "avi" | "mpegts" | "mpeg" | "vob") => Some("h264_mp4toannexb"),
        ("hevc", "avi" | "mpegts" | "mpeg") => Some("hevc_mp4toannexb"),
        ("mpeg4", "mpegts") => Some("mpeg4_unpack_bframes"),
        ("aac", "mp4" | "mov" | "ipod") => Some("aac_adtstoasc"),
        _ => None,
    }
}

/// Stream-copy pairs that cannot work, decided without a trial
pub fn copy_known_impossible(source_codec: &str, format: &str) -> bool {
    let ext = normalize(format);
    source_codec.starts_with(PCM_CODECS_PREFIX) && COMPRESSED_AUDIO_TARGETS.contains(&ext.as_str())
}

/// VBR quality flag for an audio encoder at the given tier
pub fn audio_vbr(encoder: &str, tier: QualityTier) -> Option<(&'static str, u8)> {
    let idx = match tier {
        QualityTier::Highest => 0,
        QualityTier::High => 1,
        QualityTier::Medium => 2,
        QualityTier::Low => 3,
    };
    let (flag, values): (&'static str, [u8; 4]) = match encoder {
        "libmp3lame" => ("-q:a", [0, 2, 4, 6]),
        "libvorbis" | "vorbis" => ("-q:a", [10, 8, 6, 4]),
        "flac" => ("-compression_level", [12, 8, 5, 0]),
        _ => return None,
    };
    Some((flag, values[idx]))
}

/// Map a CRF-scale value onto VideoToolbox's 1-100 "higher is better" scale
pub fn videotoolbox_quality(crf: u8) -> u8 {
    let q = 100.0 - f64::from(crf.min(51)) * 100.0 / 51.0;
    q.round().clamp(1.0, 100.0) as u8
}

/// Map a CRF-scale value onto the 2-31 qscale used by older software encoders
pub fn qscale_from_crf(crf: u8) -> u8 {
    let q = f64::from(crf.min(51)) * 31.0 / 51.0;
    q.round().clamp(2.0, 31.0) as u8
}
