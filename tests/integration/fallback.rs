// Fallback driver against the fake engine

use crate::common::{FakeEngine, leftover_parts};
use muxolotl::ConvertError;
use muxolotl::engine::{CodecSelection, ConversionRequest, GpuProfile, ProgressEvent};
use std::fs;

/// Two video encoders and one audio encoder, so mkv plans are x264+aac, x265+aac
const NARROW: &[(&str, char)] = &[("libx264", 'V'), ("libx265", 'V'), ("aac", 'A')];

fn mkv_request(engine: &FakeEngine) -> ConversionRequest {
    let input = engine.input("clip.mov");
    ConversionRequest::new(input, engine.path().join("out"), "mkv")
}

#[test]
fn test_first_working_candidate_wins() {
    let engine = FakeEngine::software();
    engine.set_streams(&[("video", "h264"), ("audio", "aac")]);
    let converter = engine.converter(GpuProfile::default());
    let request = mkv_request(&engine);

    let mut events: Vec<ProgressEvent> = Vec::new();
    let output = converter.convert(&request, |e| events.push(e)).unwrap();

    assert_eq!(output, engine.path().join("out").join("clip.mkv"));
    assert_eq!(fs::read_to_string(&output).unwrap(), "converted");
    assert_eq!(engine.count_calls("-c:v libx264"), 1);
    assert_eq!(engine.count_calls("-c:v libx265"), 0);

    assert_eq!(events.first().unwrap().fraction, 0.1);
    assert_eq!(events.first().unwrap().message, "Starting conversion...");
    let last = events.last().unwrap();
    assert_eq!(last.fraction, 1.0);
    assert_eq!(last.message, "Completed!");
    assert!(
        events.windows(2).all(|w| w[0].fraction <= w[1].fraction),
        "progress must not go backwards within one attempt: {:?}",
        events
    );
}

#[test]
fn test_failed_attempt_falls_back_and_cleans_up() {
    let engine = FakeEngine::new(NARROW);
    engine.set_streams(&[("video", "h264"), ("audio", "aac")]);
    engine.fail_encode(&["libx264"]);
    let converter = engine.converter(GpuProfile::default());
    let request = mkv_request(&engine);

    let mut messages = Vec::new();
    let output = converter
        .convert(&request, |e| messages.push(e.message))
        .unwrap();

    assert_eq!(fs::read_to_string(&output).unwrap(), "converted");
    assert_eq!(engine.count_calls("-c:v libx264"), 1);
    assert_eq!(engine.count_calls("-c:v libx265"), 1);
    assert!(
        messages.iter().any(|m| m == "Retrying with libx265 + aac..."),
        "{:?}",
        messages
    );
    // The libx264 attempt left a partial file; the retry must start clean
    assert!(engine.occupied_outputs().is_empty(), "{:?}", engine.occupied_outputs());
    assert!(leftover_parts(&engine.path().join("out")).is_empty());
}

#[test]
fn test_failed_run_keeps_existing_output() {
    let engine = FakeEngine::new(NARROW);
    engine.set_streams(&[("video", "h264"), ("audio", "aac")]);
    engine.fail_encode(&["libx264", "libx265"]);
    let converter = engine.converter(GpuProfile::default());
    let request = mkv_request(&engine);
    let output = request.output_path();
    fs::create_dir_all(output.parent().unwrap()).unwrap();
    fs::write(&output, "precious").unwrap();

    let result = converter.convert(&request, |_| {});

    assert!(matches!(result, Err(ConvertError::AllAttemptsExhausted { .. })));
    assert_eq!(fs::read_to_string(&output).unwrap(), "precious");
    assert!(leftover_parts(output.parent().unwrap()).is_empty());
    // ffmpeg never wrote to the real output path
    let real_target = format!(" {}", output.display());
    assert!(!engine.calls().iter().any(|c| c.ends_with(&real_target)));
}

#[test]
fn test_successful_run_replaces_existing_output() {
    let engine = FakeEngine::software();
    engine.set_streams(&[("video", "h264"), ("audio", "aac")]);
    let converter = engine.converter(GpuProfile::default());
    let request = mkv_request(&engine);
    let output = request.output_path();
    fs::create_dir_all(output.parent().unwrap()).unwrap();
    fs::write(&output, "stale").unwrap();

    let written = converter.convert(&request, |_| {}).unwrap();

    assert_eq!(written, output);
    assert_eq!(fs::read_to_string(&output).unwrap(), "converted");
    assert!(leftover_parts(output.parent().unwrap()).is_empty());
}

#[test]
fn test_exhausted_plan_reports_last_diagnostic() {
    let engine = FakeEngine::new(NARROW);
    engine.set_streams(&[("video", "h264"), ("audio", "aac")]);
    engine.fail_encode(&["libx264", "libx265"]);
    let converter = engine.converter(GpuProfile::default());
    let request = mkv_request(&engine);

    let err = converter.convert(&request, |_| {}).unwrap_err();
    match err {
        ConvertError::AllAttemptsExhausted {
            attempts,
            diagnostic,
        } => {
            assert_eq!(attempts, 2);
            assert!(diagnostic.contains("Error while opening encoder"), "{}", diagnostic);
        }
        other => panic!("expected exhaustion, got {:?}", other),
    }
    assert!(!request.output_path().exists());
    assert!(
        leftover_parts(&engine.path().join("out")).is_empty(),
        "partial output must be removed"
    );
}

#[test]
fn test_copy_leads_the_plan_when_trial_passes() {
    let engine = FakeEngine::software();
    engine.set_streams(&[("video", "h264"), ("audio", "aac")]);
    let converter = engine.converter(GpuProfile::default());
    let mut request = mkv_request(&engine);
    request.video_codec = CodecSelection::Copy;
    request.audio_codec = CodecSelection::Copy;

    let prepared = converter.plan(&request).unwrap();
    assert!(prepared.attempts[0].video.as_ref().unwrap().is_copy());
    assert!(prepared.attempts[0].audio.as_ref().unwrap().is_copy());
    assert_eq!(engine.count_calls("muxolotl-trial-"), 2);

    let output = converter.convert(&request, |_| {}).unwrap();
    assert_eq!(fs::read_to_string(output).unwrap(), "converted");
    assert_eq!(engine.count_calls("-c:v copy -c:a copy"), 1);
}

#[test]
fn test_rejected_copy_trial_falls_back_to_encoding() {
    let engine = FakeEngine::software();
    engine.set_streams(&[("video", "h264"), ("audio", "aac")]);
    engine.reject_copy();
    let converter = engine.converter(GpuProfile::default());
    let mut request = mkv_request(&engine);
    request.video_codec = CodecSelection::Copy;

    let prepared = converter.plan(&request).unwrap();
    assert!(
        prepared
            .attempts
            .iter()
            .all(|a| !a.video.as_ref().unwrap().is_copy())
    );
    assert_eq!(prepared.attempts[0].video.as_ref().unwrap().name, "libx264");
}

#[test]
fn test_pcm_into_mp3_skips_the_copy_trial() {
    let engine = FakeEngine::software();
    engine.set_streams(&[("audio", "pcm_s16le")]);
    let converter = engine.converter(GpuProfile::default());
    let input = engine.input("take.wav");
    let mut request = ConversionRequest::new(input, engine.path(), "mp3");
    request.audio_codec = CodecSelection::Copy;

    let output = converter.convert(&request, |_| {}).unwrap();

    assert_eq!(output, engine.path().join("take.mp3"));
    assert_eq!(engine.count_calls("muxolotl-trial-"), 0);
    let conversions: Vec<String> = engine
        .calls()
        .into_iter()
        .filter(|c| c.ends_with("take.mp3"))
        .collect();
    assert_eq!(conversions.len(), 1);
    assert!(conversions[0].contains("-vn -c:a libmp3lame"), "{}", conversions[0]);
}

#[test]
fn test_extract_audio_drops_video() {
    let engine = FakeEngine::software();
    engine.set_streams(&[("video", "h264"), ("audio", "aac")]);
    let converter = engine.converter(GpuProfile::default());
    let input = engine.input("talk.mp4");
    let request = ConversionRequest::new(input, engine.path(), "flac");

    let output = converter.extract_audio(&request, |_| {}).unwrap();
    assert_eq!(output, engine.path().join("talk.flac"));
    assert_eq!(engine.count_calls("-vn -c:a flac"), 1);
}

#[test]
fn test_missing_engine_is_exhaustion_not_panic() {
    let engine = FakeEngine::software();
    let mut config = engine.engine_config();
    config.ffmpeg = engine.path().join("not-installed");
    config.ffprobe = engine.path().join("not-installed-either");
    let host = std::sync::Arc::new(
        muxolotl::engine::Host::new(config).with_gpu_profile(GpuProfile::default()),
    );
    let converter =
        muxolotl::engine::Converter::new(host, muxolotl::config::ConversionConfig::default());
    let request = mkv_request(&engine);

    let err = converter.convert(&request, |_| {}).unwrap_err();
    match err {
        ConvertError::AllAttemptsExhausted { diagnostic, .. } => {
            assert!(diagnostic.contains("could not start"), "{}", diagnostic);
        }
        other => panic!("expected exhaustion, got {:?}", other),
    }
}
