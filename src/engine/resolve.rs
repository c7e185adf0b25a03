//! Target format -> ordered codec candidates.

use std::ffi::OsString;
use std::fs;
use std::io;
use std::path::Path;
use std::time::Duration;

use tracing::{debug, info, warn};
use uuid::Uuid;

use super::catalog::{CapabilitySet, Catalog};
use super::core::{Candidate, CodecSelection, StreamKind, exec, formats};
use super::diagnostics::DiagnosticClassifier;
use super::hardware::GpuProfile;
use super::verify::Verifier;
use crate::error::{ConvertError, Result};

/// Order candidates for one stream.
///
/// `base` is the static preference list, `encoders` what the engine has
/// compiled in, and `verified` is asked only about hardware encoders that
/// survived GPU pruning and catalog intersection.
pub fn rank_candidates<F>(
    base: Option<&[&str]>,
    requested: &CodecSelection,
    encoders: &CapabilitySet,
    gpu: &GpuProfile,
    mut verified: F,
) -> Vec<Candidate>
where
    F: FnMut(&str) -> bool,
{
    // A requested codec the detected GPU cannot drive never reaches the plan
    let requested_candidate = requested
        .named()
        .map(Candidate::new)
        .filter(|c| gpu.permits(c.family));

    let Some(base) = base else {
        return requested_candidate
            .filter(|c| !c.family.is_hardware() || verified(&c.name))
            .into_iter()
            .collect();
    };

    let permitted: Vec<Candidate> = base
        .iter()
        .map(|name| Candidate::new(*name))
        .filter(|c| gpu.permits(c.family))
        .collect();

    let mut list: Vec<Candidate> = Vec::with_capacity(permitted.len());
    if let Some(name) = requested.named() {
        match permitted.iter().find(|c| c.name == name) {
            Some(c) => list.push(c.clone()),
            None => debug!("requested codec {} does not fit this target", name),
        }
    }

    for candidate in &permitted {
        if list.contains(candidate) || !encoders.contains(&candidate.name) {
            continue;
        }
        if candidate.family.is_hardware() && !verified(&candidate.name) {
            continue;
        }
        list.push(candidate.clone());
    }

    if list.is_empty() {
        // Nothing confirmed; give the driver something to fail on with a real diagnostic
        if let Some(first) = permitted.first() {
            list.push(first.clone());
        } else if let Some(candidate) = requested_candidate {
            list.push(candidate);
        }
    }
    list
}

pub struct Resolver<'a> {
    pub(crate) catalog: &'a Catalog,
    pub(crate) verifier: &'a Verifier,
    pub(crate) gpu: &'a GpuProfile,
    pub(crate) classifier: &'a dyn DiagnosticClassifier,
    pub(crate) ffmpeg: &'a Path,
    pub(crate) trial_timeout: Duration,
    pub(crate) trial_seconds: f64,
}

impl Resolver<'_> {
    /// Candidate list for encoding `kind` streams into `format`.
    ///
    /// `copy` cannot be judged without an input and is treated as `auto`.
    pub fn resolve(
        &self,
        format: &str,
        kind: StreamKind,
        requested: &CodecSelection,
    ) -> Result<Vec<Candidate>> {
        let requested = match requested {
            CodecSelection::Copy => CodecSelection::Auto,
            other => other.clone(),
        };
        let list = rank_candidates(
            formats::base_candidates(format, kind),
            &requested,
            self.catalog.encoders(kind),
            self.gpu,
            |name| self.verifier.verify_encoder(name, self.gpu).works,
        );
        if list.is_empty() {
            return Err(ConvertError::no_codec(format, kind));
        }
        debug!(
            "{} {} candidates: {}",
            format,
            kind,
            list.iter().map(|c| c.name.as_str()).collect::<Vec<_>>().join(", ")
        );
        Ok(list)
    }

    /// Candidate list for one stream of a concrete input.
    ///
    /// A `copy` request is accepted only if a short trial re-mux succeeds;
    /// it then leads the list, followed by the regular candidates.
    pub fn resolve_stream(
        &self,
        input: &Path,
        source_codec: Option<&str>,
        format: &str,
        kind: StreamKind,
        requested: &CodecSelection,
    ) -> Result<Vec<Candidate>> {
        let mut list = Vec::new();
        if *requested == CodecSelection::Copy && self.copy_works(input, source_codec, format, kind) {
            list.push(Candidate::copy());
        }
        match self.resolve(format, kind, requested) {
            Ok(rest) => list.extend(rest),
            Err(e) if list.is_empty() => return Err(e),
            Err(e) => debug!("only stream copy available: {}", e),
        }
        Ok(list)
    }

    fn copy_works(
        &self,
        input: &Path,
        source_codec: Option<&str>,
        format: &str,
        kind: StreamKind,
    ) -> bool {
        if let Some(codec) = source_codec
            && formats::copy_known_impossible(codec, format)
        {
            info!("{} cannot be stream-copied into {}, re-encoding", codec, format);
            return false;
        }
        let Some(muxer) = formats::muxer_for(format) else {
            return false;
        };

        let ext = format.trim().trim_start_matches('.').to_ascii_lowercase();
        let scratch = std::env::temp_dir().join(format!("muxolotl-trial-{}.{}", Uuid::new_v4(), ext));
        let args = copy_trial_args(
            input,
            &scratch,
            source_codec,
            muxer,
            kind,
            self.trial_seconds,
        );
        debug!("copy trial: {:?}", args);
        let outcome = exec::capture(self.ffmpeg, &args, self.trial_timeout);
        remove_scratch(&scratch);

        let accepted = match outcome {
            Ok(out) if out.timed_out => false,
            Ok(out) if out.success => true,
            Ok(out) => !self.classifier.rejects_copy(&out.combined_lower()),
            Err(e) => {
                warn!("copy trial could not run: {}", e);
                false
            }
        };
        if accepted {
            info!("stream copy of {} into {} accepted", kind, format);
        } else {
            warn!("stream copy of {} into {} rejected", kind, format);
        }
        accepted
    }
}

fn remove_scratch(path: &Path) {
    if let Err(e) = fs::remove_file(path)
        && e.kind() != io::ErrorKind::NotFound
    {
        warn!("could not remove {}: {}", path.display(), e);
    }
}

/// Arguments for a short stream-copy re-mux of the first `kind` stream
pub fn copy_trial_args(
    input: &Path,
    scratch: &Path,
    source_codec: Option<&str>,
    muxer: &str,
    kind: StreamKind,
    seconds: f64,
) -> Vec<OsString> {
    let mut args: Vec<OsString> = ["-hide_banner", "-v", "error", "-y", "-i"]
        .into_iter()
        .map(OsString::from)
        .collect();
    args.push(input.into());
    args.push("-t".into());
    args.push(seconds.to_string().into());
    args.push("-map".into());
    args.push(format!("0:{}:0", kind.specifier()).into());
    args.push(format!("-c:{}", kind.specifier()).into());
    args.push("copy".into());
    if let Some(bsf) = source_codec.and_then(|codec| formats::bitstream_filter(codec, muxer)) {
        args.push(format!("-bsf:{}", kind.specifier()).into());
        args.push(bsf.into());
    }
    args.push("-f".into());
    args.push(muxer.into());
    args.push(scratch.into());
    args
}
