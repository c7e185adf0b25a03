// Candidate resolution with a scripted engine

use crate::common::FakeEngine;
use muxolotl::ConvertError;
use muxolotl::engine::{
    CodecSelection, ConversionRequest, GpuProfile, GpuVendor, HwAccelChoice, StreamKind,
};

fn names(list: &[muxolotl::engine::Candidate]) -> Vec<&str> {
    list.iter().map(|c| c.name.as_str()).collect()
}

fn gpu(vendors: &[GpuVendor]) -> GpuProfile {
    let mut gpu = GpuProfile::default();
    for vendor in vendors {
        gpu.mark(*vendor, None);
    }
    gpu
}

#[test]
fn test_software_only_catalog_keeps_table_order() {
    let engine = FakeEngine::software();
    let host = engine.host(gpu(&[GpuVendor::Nvidia, GpuVendor::Intel]));

    let list = host
        .resolver()
        .resolve("mp4", StreamKind::Video, &CodecSelection::Auto)
        .unwrap();
    assert_eq!(names(&list), vec!["libx264", "libx265", "mpeg4"]);
    // Nothing hardware was listed, so nothing was probed
    assert_eq!(engine.count_calls("-f null -"), 0);
}

#[test]
fn test_working_hardware_encoder_ranks_first() {
    let engine = FakeEngine::new(&[("h264_nvenc", 'V'), ("h264_qsv", 'V'), ("libx264", 'V')]);
    let host = engine.host(gpu(&[GpuVendor::Nvidia]));

    let list = host
        .resolver()
        .resolve("mkv", StreamKind::Video, &CodecSelection::Auto)
        .unwrap();
    // h264_qsv is listed but there is no Intel GPU
    assert_eq!(names(&list), vec!["h264_nvenc", "libx264"]);
    assert_eq!(engine.count_calls("h264_qsv"), 0);
}

#[test]
fn test_broken_hardware_encoder_is_dropped() {
    let engine = FakeEngine::new(&[("h264_nvenc", 'V'), ("libx264", 'V')]);
    engine.fail_probe(&["h264_nvenc"]);
    let host = engine.host(gpu(&[GpuVendor::Nvidia]));

    let list = host
        .resolver()
        .resolve("mp4", StreamKind::Video, &CodecSelection::Auto)
        .unwrap();
    assert_eq!(names(&list), vec!["libx264"]);
}

#[test]
fn test_requested_codec_moves_to_front() {
    let engine = FakeEngine::software();
    let host = engine.host(GpuProfile::default());
    let list = host
        .resolver()
        .resolve(
            "mkv",
            StreamKind::Audio,
            &CodecSelection::Named("libvorbis".to_string()),
        )
        .unwrap();
    assert_eq!(names(&list), vec!["libvorbis", "aac", "libopus"]);
}

#[test]
fn test_audio_target_has_no_video_list() {
    let engine = FakeEngine::software();
    let host = engine.host(GpuProfile::default());
    let err = host
        .resolver()
        .resolve("flac", StreamKind::Video, &CodecSelection::Auto)
        .unwrap_err();
    assert!(matches!(err, ConvertError::NoCompatibleCodec { .. }));
}

#[test]
fn test_hwaccel_is_dropped_for_stream_copy() {
    let engine = FakeEngine::software();
    engine.set_hwaccels(&["cuda", "vaapi"]);
    engine.set_streams(&[("video", "h264"), ("audio", "aac")]);
    let converter = engine.converter(gpu(&[GpuVendor::Nvidia]));
    let input = engine.input("movie.mp4");
    let mut request = ConversionRequest::new(input, engine.path().join("out"), "mkv");
    request.video_codec = CodecSelection::Copy;
    request.hwaccel = HwAccelChoice::Auto;

    let prepared = converter.plan(&request).unwrap();
    let copy_line = prepared.attempts[0].command_line(&engine.ffmpeg());
    assert!(!copy_line.contains("-hwaccel"), "{}", copy_line);

    let encode = prepared
        .attempts
        .iter()
        .find(|a| !a.video.as_ref().unwrap().is_copy())
        .unwrap();
    let encode_line = encode.command_line(&engine.ffmpeg());
    assert!(encode_line.contains("-hwaccel cuda"), "{}", encode_line);
}

#[test]
fn test_output_onto_input_is_refused() {
    let engine = FakeEngine::software();
    let converter = engine.converter(GpuProfile::default());
    let input = engine.input("song.mp3");
    let request = ConversionRequest::new(&input, engine.path(), "mp3");
    let err = converter.plan(&request).unwrap_err();
    assert!(matches!(err, ConvertError::OutputIsInput { .. }));
    assert_eq!(std::fs::read(&input).unwrap(), b"not really media");
}
