//! The fallback conversion driver.
//!
//! A request is resolved into per-stream candidate lists, the lists are
//! combined into a bounded plan, and the plan is walked until one attempt
//! produces a non-empty output file.

use std::ffi::OsString;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info, warn};
use uuid::Uuid;

use super::Host;
use super::core::{
    CancelToken, Candidate, CodecSelection, EncodeParams, ExecOutcome, HwAccelChoice, MediaInfo,
    MetadataPolicy, ProgressEvent, QualityTier, StreamKind, build, exec, format_command, formats,
    get_file_info,
};
use crate::config::ConversionConfig;
use crate::error::{ConvertError, Result};

/// Progress shown when the first attempt starts
const FIRST_ATTEMPT_FLOOR: f64 = 0.1;
/// Progress a retry restarts from; low but never zero
const RETRY_FLOOR: f64 = 0.05;

/// One file to convert and everything the caller asked for
#[derive(Debug, Clone)]
pub struct ConversionRequest {
    pub input: PathBuf,
    pub output_dir: PathBuf,
    /// Target extension, e.g. `mkv` or `mp3`
    pub format: String,
    pub video_codec: CodecSelection,
    pub audio_codec: CodecSelection,
    pub video_bitrate: Option<String>,
    pub audio_bitrate: Option<String>,
    pub sample_rate: Option<u32>,
    pub channels: Option<u8>,
    /// Explicit CRF-scale quality; wins over `quality`
    pub crf: Option<u8>,
    pub quality: Option<QualityTier>,
    pub resolution: Option<(u32, u32)>,
    pub fps: Option<f64>,
    pub preset: Option<String>,
    pub tune: Option<String>,
    pub threads: Option<u32>,
    pub hwaccel: HwAccelChoice,
    pub metadata: MetadataPolicy,
    pub custom_args: Vec<String>,
    pub cancel: CancelToken,
}

impl ConversionRequest {
    pub fn new(input: impl Into<PathBuf>, output_dir: impl Into<PathBuf>, format: &str) -> Self {
        Self {
            input: input.into(),
            output_dir: output_dir.into(),
            format: format.trim().trim_start_matches('.').to_ascii_lowercase(),
            video_codec: CodecSelection::Auto,
            audio_codec: CodecSelection::Auto,
            video_bitrate: None,
            audio_bitrate: None,
            sample_rate: None,
            channels: None,
            crf: None,
            quality: None,
            resolution: None,
            fps: None,
            preset: None,
            tune: None,
            threads: None,
            hwaccel: HwAccelChoice::Auto,
            metadata: MetadataPolicy::Preserve,
            custom_args: Vec::new(),
            cancel: CancelToken::new(),
        }
    }

    /// `<output_dir>/<input stem>.<format>`
    pub fn output_path(&self) -> PathBuf {
        let stem = self
            .input
            .file_stem()
            .map(|s| s.to_os_string())
            .unwrap_or_else(|| OsString::from("output"));
        let mut name = stem;
        name.push(".");
        name.push(&self.format);
        self.output_dir.join(name)
    }

    /// Cancel this request; safe to call from any thread
    pub fn cancel(&self) {
        self.cancel.cancel();
    }
}

/// Ordered (video, audio) combinations, lexicographic by rank.
///
/// `None` on a side means that stream is not encoded at all.
#[derive(Debug, Clone, PartialEq)]
pub struct FallbackPlan {
    pairs: Vec<(Option<Candidate>, Option<Candidate>)>,
}

impl FallbackPlan {
    /// Combine candidate lists, keeping at most `max_attempts` pairs.
    ///
    /// Audio depth per video candidate is capped so every video candidate
    /// still gets a turn inside the bound.
    pub fn new(
        video: Option<&[Candidate]>,
        audio: Option<&[Candidate]>,
        max_attempts: usize,
    ) -> Self {
        let max_attempts = max_attempts.max(1);
        let mut pairs = Vec::new();
        match (video, audio) {
            (Some(video), Some(audio)) if !video.is_empty() && !audio.is_empty() => {
                let depth = (max_attempts / video.len()).max(1);
                for v in video {
                    for a in audio.iter().take(depth) {
                        pairs.push((Some(v.clone()), Some(a.clone())));
                    }
                }
            }
            (Some(video), _) if !video.is_empty() => {
                pairs.extend(video.iter().map(|v| (Some(v.clone()), None)));
            }
            (_, Some(audio)) => {
                pairs.extend(audio.iter().map(|a| (None, Some(a.clone()))));
            }
            _ => {}
        }
        pairs.truncate(max_attempts);
        Self { pairs }
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    pub fn pairs(&self) -> &[(Option<Candidate>, Option<Candidate>)] {
        &self.pairs
    }
}

/// One planned engine invocation
#[derive(Debug, Clone, PartialEq)]
pub struct ConversionAttempt {
    pub video: Option<Candidate>,
    pub audio: Option<Candidate>,
    pub args: Vec<OsString>,
}

impl ConversionAttempt {
    pub fn label(&self) -> String {
        match (&self.video, &self.audio) {
            (Some(v), Some(a)) => format!("{} + {}", v, a),
            (Some(v), None) => v.to_string(),
            (None, Some(a)) => a.to_string(),
            (None, None) => "remux".to_string(),
        }
    }

    pub fn command_line(&self, program: &Path) -> String {
        format_command(program, &self.args)
    }

    /// The same command with its output (always the last argument) swapped
    fn args_writing_to(&self, path: &Path) -> Vec<OsString> {
        let mut args = self.args.clone();
        if let Some(last) = args.last_mut() {
            *last = path.as_os_str().to_owned();
        }
        args
    }
}

/// A fully resolved request, ready to run or display
#[derive(Debug, Clone)]
pub struct PreparedConversion {
    pub output: PathBuf,
    pub attempts: Vec<ConversionAttempt>,
}

pub struct Converter {
    host: Arc<Host>,
    config: ConversionConfig,
}

impl Converter {
    pub fn new(host: Arc<Host>, config: ConversionConfig) -> Self {
        Self { host, config }
    }

    pub fn host(&self) -> &Host {
        &self.host
    }

    /// Resolve a request into its attempts without running anything but probes
    pub fn plan(&self, request: &ConversionRequest) -> Result<PreparedConversion> {
        self.prepare(request, false)
    }

    /// Convert `request.input` into `request.format`, falling back through
    /// candidates until one works.
    pub fn convert<F>(&self, request: &ConversionRequest, on_progress: F) -> Result<PathBuf>
    where
        F: FnMut(ProgressEvent),
    {
        let prepared = self.prepare(request, false)?;
        self.run(request, prepared, on_progress)
    }

    /// Write only the audio of `request.input`; the format must be an audio one
    pub fn extract_audio<F>(&self, request: &ConversionRequest, on_progress: F) -> Result<PathBuf>
    where
        F: FnMut(ProgressEvent),
    {
        let prepared = self.prepare(request, true)?;
        self.run(request, prepared, on_progress)
    }

    fn prepare(&self, request: &ConversionRequest, audio_only: bool) -> Result<PreparedConversion> {
        let input = &request.input;
        if !input.is_file() {
            return Err(ConvertError::InputNotFound {
                path: input.clone(),
            });
        }

        let format = request.format.as_str();
        let target = formats::target_kind(format);
        let (Some(target), Some(muxer)) = (target, formats::muxer_for(format)) else {
            let kind = if audio_only {
                StreamKind::Audio
            } else {
                StreamKind::Video
            };
            return Err(ConvertError::no_codec(format, kind));
        };
        if audio_only && target != StreamKind::Audio {
            return Err(ConvertError::no_codec(format, StreamKind::Audio));
        }

        let output = request.output_path();
        if same_file(input, &output) {
            return Err(ConvertError::OutputIsInput { path: output });
        }

        let host = &self.host;
        let info = get_file_info(&host.config().ffprobe, input, host.config().file_info_timeout());
        if info.is_empty() {
            debug!("no stream information for {}", input.display());
        }
        let present = |kind: StreamKind| info.is_empty() || info.has_stream(kind);

        let resolver = host.resolver();
        let video = if target == StreamKind::Video && present(StreamKind::Video) {
            Some(resolver.resolve_stream(
                input,
                info.first_codec(StreamKind::Video),
                format,
                StreamKind::Video,
                &request.video_codec,
            )?)
        } else {
            None
        };
        let audio = if present(StreamKind::Audio) {
            let resolved = resolver.resolve_stream(
                input,
                info.first_codec(StreamKind::Audio),
                format,
                StreamKind::Audio,
                &request.audio_codec,
            );
            match resolved {
                Ok(list) => Some(list),
                Err(e) if video.is_some() => {
                    warn!("dropping audio: {}", e);
                    None
                }
                Err(e) => return Err(e),
            }
        } else {
            None
        };
        if video.is_none() && audio.is_none() {
            return Err(ConvertError::no_codec(format, target));
        }

        let encodes_video = video
            .as_ref()
            .is_some_and(|list| list.iter().any(|c| !c.is_copy()));
        let hwaccel = if encodes_video {
            host.resolve_hwaccel(&request.hwaccel)
        } else {
            None
        };

        let plan = FallbackPlan::new(video.as_deref(), audio.as_deref(), self.config.max_attempts);
        let attempts = plan
            .pairs()
            .iter()
            .map(|(v, a)| {
                let params = encode_params(
                    request,
                    muxer,
                    v.clone(),
                    a.clone(),
                    &info,
                    hwaccel.as_deref(),
                    host.vaapi_device(),
                );
                ConversionAttempt {
                    video: v.clone(),
                    audio: a.clone(),
                    args: build(input, &output, &params),
                }
            })
            .collect();

        Ok(PreparedConversion { output, attempts })
    }

    fn run<F>(
        &self,
        request: &ConversionRequest,
        prepared: PreparedConversion,
        mut on_progress: F,
    ) -> Result<PathBuf>
    where
        F: FnMut(ProgressEvent),
    {
        let PreparedConversion { output, attempts } = prepared;
        if let Some(dir) = output.parent() {
            fs::create_dir_all(dir)?;
        }

        // ffmpeg writes beside the output and the result is renamed into place,
        // so a file already at the output path survives a failed run
        let staging = staging_path(&output);
        let program = &self.host.config().ffmpeg;
        let total = attempts.len();
        let mut last_diagnostic = String::new();

        for (index, attempt) in attempts.iter().enumerate() {
            if request.cancel.is_cancelled() {
                return Err(ConvertError::Cancelled);
            }

            let label = attempt.label();
            let floor = if index == 0 {
                on_progress(ProgressEvent::new(FIRST_ATTEMPT_FLOOR, "Starting conversion..."));
                FIRST_ATTEMPT_FLOOR
            } else {
                on_progress(ProgressEvent::new(RETRY_FLOOR, format!("Retrying with {}...", label)));
                RETRY_FLOOR
            };
            info!(
                "attempt {}/{} for {}: {}",
                index + 1,
                total,
                request.input.display(),
                label
            );
            let args = attempt.args_writing_to(&staging);
            debug!("{}", format_command(program, &args));

            let outcome = exec::execute(
                program,
                &args,
                &request.cancel,
                self.config.diagnostic_tail_lines,
                |event| {
                    on_progress(ProgressEvent::new(
                        floor + (1.0 - floor) * event.fraction,
                        event.message,
                    ))
                },
            );

            match outcome {
                Ok(ExecOutcome::Success) if has_content(&staging) => {
                    if let Err(e) = fs::rename(&staging, &output) {
                        remove_partial(&staging);
                        return Err(e.into());
                    }
                    info!("converted {} with {}", request.input.display(), label);
                    on_progress(ProgressEvent::new(1.0, "Completed!"));
                    return Ok(output);
                }
                Ok(ExecOutcome::Success) => {
                    last_diagnostic = format!("{} exited cleanly but wrote no output", label);
                }
                Ok(ExecOutcome::Cancelled) => {
                    remove_partial(&staging);
                    info!("conversion of {} cancelled", request.input.display());
                    return Err(ConvertError::Cancelled);
                }
                Ok(ExecOutcome::Failed { code, tail }) => {
                    last_diagnostic = tail.join("\n");
                    warn!("attempt with {} failed (exit code {:?})", label, code);
                }
                Err(e) => {
                    last_diagnostic = format!("could not start {}: {}", program.display(), e);
                    warn!("{}", last_diagnostic);
                }
            }
            remove_partial(&staging);
        }

        Err(ConvertError::AllAttemptsExhausted {
            attempts: total,
            diagnostic: last_diagnostic,
        })
    }
}

/// Parameters for one attempt, with per-family quality substitution
fn encode_params(
    request: &ConversionRequest,
    muxer: &str,
    video: Option<Candidate>,
    audio: Option<Candidate>,
    info: &MediaInfo,
    hwaccel: Option<&str>,
    vaapi_device: Option<&str>,
) -> EncodeParams {
    let video_copy = video.as_ref().is_some_and(Candidate::is_copy);
    EncodeParams {
        muxer: muxer.to_string(),
        hwaccel: hwaccel.filter(|_| !video_copy).map(str::to_string),
        vaapi_device: vaapi_device.map(str::to_string),
        drop_video: video.is_none(),
        drop_audio: audio.is_none(),
        video_codec: video,
        audio_codec: audio,
        source_video_codec: info.first_codec(StreamKind::Video).map(str::to_string),
        source_audio_codec: info.first_codec(StreamKind::Audio).map(str::to_string),
        video_bitrate: request.video_bitrate.clone(),
        video_quality: request.crf.or(request.quality.map(|q| q.crf())),
        preset: request.preset.clone(),
        tune: request.tune.clone(),
        resolution: request.resolution,
        fps: request.fps,
        audio_bitrate: request.audio_bitrate.clone(),
        // An explicit bitrate replaces the VBR index
        audio_quality: request.quality.filter(|_| request.audio_bitrate.is_none()),
        sample_rate: request.sample_rate,
        channels: request.channels,
        threads: request.threads,
        metadata: request.metadata,
        custom_args: request.custom_args.clone(),
    }
}

fn same_file(a: &Path, b: &Path) -> bool {
    if a == b {
        return true;
    }
    match (fs::canonicalize(a), fs::canonicalize(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

/// Hidden sibling of `output` that keeps its file name as a suffix
fn staging_path(output: &Path) -> PathBuf {
    let name = output
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output".to_string());
    let short = Uuid::new_v4().simple().to_string();
    output.with_file_name(format!(".muxolotl-part-{}-{}", &short[..8], name))
}

fn has_content(path: &Path) -> bool {
    fs::metadata(path).is_ok_and(|m| m.len() > 0)
}

fn remove_partial(path: &Path) {
    match fs::remove_file(path) {
        Ok(()) => debug!("removed partial output {}", path.display()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => warn!("could not remove partial output {}: {}", path.display(), e),
    }
}
