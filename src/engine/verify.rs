//! Functional verification of encoders and hardware decoders.
//!
//! Being listed by `ffmpeg -encoders` only means compiled in. Each name gets
//! one tiny synthetic encode into the null muxer, and the verdict is cached
//! for the rest of the process.

use serde::Serialize;
use std::collections::HashMap;
use std::ffi::OsString;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};
use std::time::Duration;

use tracing::{debug, info};

use super::core::{Captured, DEFAULT_VAAPI_DEVICE, EncoderFamily, StreamKind, exec, formats};
use super::diagnostics::{DiagnosticClassifier, ProbeKind, VerifyReason};
use super::hardware::GpuProfile;

const SOFTWARE_TIMEOUT: Duration = Duration::from_secs(10);
const HARDWARE_TIMEOUT: Duration = Duration::from_secs(20);

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VerificationResult {
    pub name: String,
    pub works: bool,
    pub reason: VerifyReason,
}

type Cells<T> = Mutex<HashMap<String, Arc<OnceLock<T>>>>;

pub struct Verifier {
    ffmpeg: PathBuf,
    software_timeout: Duration,
    hardware_timeout: Duration,
    vaapi_device: Option<String>,
    classifier: Arc<dyn DiagnosticClassifier>,
    encoders: Cells<VerificationResult>,
    hwaccels: Cells<bool>,
    /// Held for every probe that touches a GPU
    hw_probe_lock: Mutex<()>,
}

/// Fetch or create the compute-once cell for `name`
fn cell<T>(cells: &Cells<T>, name: &str) -> Arc<OnceLock<T>> {
    let mut map = cells.lock().unwrap_or_else(PoisonError::into_inner);
    Arc::clone(map.entry(name.to_string()).or_default())
}

impl Verifier {
    pub fn new(ffmpeg: impl Into<PathBuf>, classifier: Arc<dyn DiagnosticClassifier>) -> Self {
        Self {
            ffmpeg: ffmpeg.into(),
            software_timeout: SOFTWARE_TIMEOUT,
            hardware_timeout: HARDWARE_TIMEOUT,
            vaapi_device: None,
            classifier,
            encoders: Mutex::new(HashMap::new()),
            hwaccels: Mutex::new(HashMap::new()),
            hw_probe_lock: Mutex::new(()),
        }
    }

    pub fn with_timeouts(mut self, software: Duration, hardware: Duration) -> Self {
        self.software_timeout = software;
        self.hardware_timeout = hardware;
        self
    }

    pub fn with_vaapi_device(mut self, device: Option<String>) -> Self {
        self.vaapi_device = device;
        self
    }

    fn hardware_guard(&self) -> MutexGuard<'_, ()> {
        self.hw_probe_lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Verify that `name` can actually encode on this host.
    ///
    /// Hardware encoders whose vendor is absent from `gpu` are rejected
    /// without running anything.
    pub fn verify_encoder(&self, name: &str, gpu: &GpuProfile) -> VerificationResult {
        let family = EncoderFamily::of(name);
        if !gpu.permits(family) {
            debug!("{} skipped: no {} device", name, family.label());
            return VerificationResult {
                name: name.to_string(),
                works: false,
                reason: VerifyReason::DeviceUnavailable,
            };
        }

        cell(&self.encoders, name)
            .get_or_init(|| self.probe_encoder(name, family))
            .clone()
    }

    /// Verify that a hardware decoder initialises
    pub fn verify_hwaccel(&self, name: &str) -> bool {
        *cell(&self.hwaccels, name).get_or_init(|| {
            let args = hwaccel_probe_args(name);
            let outcome = {
                let _guard = self.hardware_guard();
                exec::capture(&self.ffmpeg, &args, self.hardware_timeout)
            };
            let (works, reason) = judge(outcome.ok().as_ref(), ProbeKind::Hwaccel, &*self.classifier);
            debug!("hwaccel {}: {:?}", name, reason);
            works
        })
    }

    fn probe_encoder(&self, name: &str, family: EncoderFamily) -> VerificationResult {
        let device = self.vaapi_device.as_deref().unwrap_or(DEFAULT_VAAPI_DEVICE);
        let args = encoder_probe_args(name, family, device);
        debug!("verifying {} with {:?}", name, args);

        let outcome = if family.is_hardware() {
            let _guard = self.hardware_guard();
            exec::capture(&self.ffmpeg, &args, self.hardware_timeout)
        } else {
            exec::capture(&self.ffmpeg, &args, self.software_timeout)
        };
        if let Err(e) = &outcome {
            debug!("could not start {}: {}", self.ffmpeg.display(), e);
        }

        let (works, reason) = judge(
            outcome.ok().as_ref(),
            ProbeKind::Encoder(family),
            &*self.classifier,
        );
        info!(encoder = name, works, reason = ?reason, "encoder verified");
        VerificationResult {
            name: name.to_string(),
            works,
            reason,
        }
    }
}

/// Turn a probe run into a verdict.
///
/// Unrecognised failures are inconclusive: software encoders are still
/// trusted, hardware paths are not.
fn judge(
    outcome: Option<&Captured>,
    probe: ProbeKind,
    classifier: &dyn DiagnosticClassifier,
) -> (bool, VerifyReason) {
    let hardware = match probe {
        ProbeKind::Encoder(family) => family.is_hardware(),
        ProbeKind::Hwaccel => true,
    };
    let Some(out) = outcome else {
        return (false, VerifyReason::Inconclusive);
    };
    if out.timed_out {
        return (false, VerifyReason::Timeout);
    }
    if out.success {
        return (true, VerifyReason::Ok);
    }
    match classifier.classify(probe, &out.combined_lower()) {
        Some(reason) => (false, reason),
        None => (!hardware, VerifyReason::Inconclusive),
    }
}

/// Arguments for a one-frame (or 0.1s of audio) encode into the null muxer
pub fn encoder_probe_args(name: &str, family: EncoderFamily, vaapi_device: &str) -> Vec<OsString> {
    let mut args: Vec<String> = vec!["-hide_banner".into(), "-v".into(), "error".into()];

    match family {
        EncoderFamily::Qsv => args.extend(
            ["-init_hw_device", "qsv=hw", "-filter_hw_device", "hw"].map(String::from),
        ),
        EncoderFamily::Vaapi => {
            args.push("-init_hw_device".into());
            args.push(format!("vaapi=hw:{}", vaapi_device));
            args.extend(["-filter_hw_device", "hw"].map(String::from));
        }
        _ => {}
    }

    let kind = formats::encoder_kind(name);
    let source = match kind {
        StreamKind::Audio => "anullsrc=r=44100:cl=stereo",
        StreamKind::Video if family.is_hardware() => "color=c=black:s=256x256:d=0.1:r=1",
        StreamKind::Video => "testsrc=duration=0.1:size=256x256:rate=1",
    };
    args.extend(["-f", "lavfi", "-i", source].map(String::from));

    if family == EncoderFamily::Vaapi {
        args.extend(["-vf", "format=nv12,hwupload"].map(String::from));
    }

    match kind {
        StreamKind::Audio => {
            args.extend(["-t", "0.1", "-c:a", name].map(String::from));
        }
        StreamKind::Video => {
            args.extend(["-c:v", name, "-frames:v", "1"].map(String::from));
        }
    }
    if formats::is_experimental(name) {
        args.extend(["-strict", "experimental"].map(String::from));
    }
    args.extend(["-f", "null", "-"].map(String::from));
    args.into_iter().map(OsString::from).collect()
}

/// Arguments for a short decode through the given hwaccel
pub fn hwaccel_probe_args(name: &str) -> Vec<OsString> {
    [
        "-hide_banner",
        "-v",
        "error",
        "-hwaccel",
        name,
        "-f",
        "lavfi",
        "-i",
        "nullsrc=s=256x256:d=0.1",
        "-f",
        "null",
        "-",
    ]
    .into_iter()
    .map(OsString::from)
    .collect()
}
