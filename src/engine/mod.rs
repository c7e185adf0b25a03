// Conversion core - independent of the CLI

pub mod catalog;
pub mod convert;
pub mod core;
pub mod diagnostics;
pub mod hardware;
pub mod resolve;
pub mod verify;
pub mod worker;

use std::collections::BTreeSet;
use std::sync::{Arc, OnceLock};

use tracing::warn;

use crate::config::{Config, EngineConfig};

pub use catalog::{CapabilitySet, Catalog};
pub use convert::{ConversionAttempt, ConversionRequest, Converter, FallbackPlan, PreparedConversion};
pub use core::*;
pub use diagnostics::{DiagnosticClassifier, PatternClassifier, PatternScope, ProbeKind, VerifyReason};
pub use hardware::{GpuProfile, GpuVendor};
pub use resolve::Resolver;
pub use verify::{VerificationResult, Verifier};
pub use worker::{ConversionJob, WorkerMessage, WorkerPool};

/// Process-lifetime state shared by every conversion: the capability
/// catalog, verification verdicts and the GPU profile.
///
/// All three are filled on first use and never invalidated.
pub struct Host {
    config: EngineConfig,
    catalog: Catalog,
    verifier: Verifier,
    vaapi_device: Option<String>,
    gpu: OnceLock<GpuProfile>,
    classifier: Arc<dyn DiagnosticClassifier>,
}

impl Host {
    pub fn new(config: EngineConfig) -> Self {
        Self::with_classifier(config, Arc::new(PatternClassifier::default()))
    }

    pub fn with_classifier(config: EngineConfig, classifier: Arc<dyn DiagnosticClassifier>) -> Self {
        let vaapi_device = config
            .vaapi_device
            .clone()
            .or_else(hardware::detect_render_device);
        let catalog = Catalog::new(&config.ffmpeg, config.discovery_timeout());
        let verifier = Verifier::new(&config.ffmpeg, Arc::clone(&classifier))
            .with_timeouts(config.software_probe_timeout(), config.hardware_probe_timeout())
            .with_vaapi_device(vaapi_device.clone());
        Self {
            config,
            catalog,
            verifier,
            vaapi_device,
            gpu: OnceLock::new(),
            classifier,
        }
    }

    /// Use a known GPU profile instead of detecting one
    pub fn with_gpu_profile(mut self, gpu: GpuProfile) -> Self {
        self.gpu = OnceLock::from(gpu);
        self
    }

    /// The process-wide host, configured from the user's config file
    pub fn shared() -> Arc<Host> {
        static SHARED: OnceLock<Arc<Host>> = OnceLock::new();
        Arc::clone(SHARED.get_or_init(|| {
            let config = Config::load().map(|c| c.engine).unwrap_or_else(|e| {
                warn!("using default engine settings: {:#}", e);
                EngineConfig::default()
            });
            Arc::new(Host::new(config))
        }))
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn verifier(&self) -> &Verifier {
        &self.verifier
    }

    /// Configured or detected VA-API render node
    pub fn vaapi_device(&self) -> Option<&str> {
        self.vaapi_device.as_deref()
    }

    pub fn classifier(&self) -> &dyn DiagnosticClassifier {
        &*self.classifier
    }

    /// GPU profile, detected on first call
    pub fn gpu(&self) -> &GpuProfile {
        self.gpu.get_or_init(hardware::detect)
    }

    pub fn resolver(&self) -> Resolver<'_> {
        Resolver {
            catalog: &self.catalog,
            verifier: &self.verifier,
            gpu: self.gpu(),
            classifier: &*self.classifier,
            ffmpeg: &self.config.ffmpeg,
            trial_timeout: self.config.copy_trial_timeout(),
            trial_seconds: self.config.copy_trial_seconds,
        }
    }

    /// Target extensions of `kind` the installed engine can write
    pub fn supported_formats(&self, kind: StreamKind) -> Vec<String> {
        self.catalog
            .formats(kind)
            .iter()
            .map(str::to_string)
            .collect()
    }

    /// Highest-priority decode accelerator that is listed, fits the GPU and works
    pub fn best_hwaccel(&self) -> Option<String> {
        let listed = self.catalog.hwaccels();
        let gpu = self.gpu();
        hardware::HWACCEL_PRIORITY
            .iter()
            .copied()
            .filter(|name| listed.contains(name) && gpu.permits_hwaccel(name))
            .find(|name| self.verifier.verify_hwaccel(name))
            .map(str::to_string)
    }

    /// Turn a user's hwaccel choice into the `-hwaccel` value to use, if any
    pub fn resolve_hwaccel(&self, choice: &HwAccelChoice) -> Option<String> {
        match choice {
            HwAccelChoice::None => None,
            HwAccelChoice::Auto => self.best_hwaccel(),
            HwAccelChoice::Named(name) => {
                if self.verifier.verify_hwaccel(name) {
                    Some(name.clone())
                } else {
                    warn!("hwaccel {} does not work here, decoding in software", name);
                    None
                }
            }
        }
    }

    /// Verify every tabled encoder of `kind` the engine lists
    pub fn verify_known_encoders(&self, kind: StreamKind) -> Vec<VerificationResult> {
        let listed = self.catalog.encoders(kind);
        let gpu = self.gpu();
        let mut names = BTreeSet::new();
        for target_kind in [StreamKind::Video, StreamKind::Audio] {
            for (ext, _) in formats::known_formats(target_kind) {
                if let Some(list) = formats::base_candidates(ext, kind) {
                    names.extend(list.iter().copied().filter(|n| listed.contains(n)));
                }
            }
        }
        names
            .into_iter()
            .map(|name| self.verifier.verify_encoder(name, gpu))
            .collect()
    }
}
