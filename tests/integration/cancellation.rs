// Cancelling a running conversion

use crate::common::{FakeEngine, leftover_parts};
use muxolotl::ConvertError;
use muxolotl::engine::{ConversionRequest, GpuProfile};
use std::fs;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

fn wait_for_pid(engine: &FakeEngine) -> libc::pid_t {
    let deadline = Instant::now() + Duration::from_secs(20);
    loop {
        if let Ok(text) = fs::read_to_string(engine.pid_file())
            && let Ok(pid) = text.trim().parse()
        {
            return pid;
        }
        assert!(Instant::now() < deadline, "fake ffmpeg never started");
        thread::sleep(Duration::from_millis(20));
    }
}

#[test]
fn test_cancel_terminates_child_and_removes_partial_output() {
    let engine = FakeEngine::software();
    engine.set_streams(&[("video", "h264"), ("audio", "aac")]);
    engine.hang();
    let converter = Arc::new(engine.converter(GpuProfile::default()));
    let input = engine.input("long.mov");
    let request = ConversionRequest::new(input, engine.path(), "mkv");
    let output = request.output_path();

    let worker = {
        let converter = Arc::clone(&converter);
        let request = request.clone();
        thread::spawn(move || converter.convert(&request, |_| {}))
    };

    let pid = wait_for_pid(&engine);
    assert_eq!(leftover_parts(engine.path()).len(), 1);
    request.cancel();

    let result = worker.join().unwrap();
    assert!(matches!(result, Err(ConvertError::Cancelled)), "{:?}", result);
    assert!(!output.exists());
    assert!(leftover_parts(engine.path()).is_empty(), "partial output must be removed");

    let alive = unsafe { libc::kill(pid, 0) } == 0;
    assert!(!alive, "child {} still running after cancel", pid);

    // Only the first attempt ran; cancellation does not fall back
    assert_eq!(engine.count_calls("long.mkv"), 1);
}

#[test]
fn test_cancelled_before_start_runs_nothing() {
    let engine = FakeEngine::software();
    engine.set_streams(&[("audio", "pcm_s16le")]);
    let converter = engine.converter(GpuProfile::default());
    let input = engine.input("memo.wav");
    let request = ConversionRequest::new(input, engine.path(), "flac");
    request.cancel();

    let result = converter.convert(&request, |_| {});
    assert!(matches!(result, Err(ConvertError::Cancelled)));
    assert_eq!(engine.count_calls("memo.flac"), 0);
}
