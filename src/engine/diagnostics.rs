//! Classification of ffmpeg diagnostic text.
//!
//! All free-form error matching lives here so new engine messages can be
//! taught to the verifier and the copy trial without touching either.

use serde::Serialize;

use super::core::EncoderFamily;

/// Why a verification probe concluded what it did
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum VerifyReason {
    Ok,
    UnknownEncoder,
    DeviceUnavailable,
    InitFailed,
    Timeout,
    /// Nonzero exit with no recognised pattern
    Inconclusive,
}

/// What kind of synthetic job produced the diagnostic
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeKind {
    Encoder(EncoderFamily),
    Hwaccel,
}

impl ProbeKind {
    fn is_hardware(&self) -> bool {
        match self {
            Self::Encoder(family) => family.is_hardware(),
            Self::Hwaccel => true,
        }
    }
}

pub trait DiagnosticClassifier: Send + Sync {
    /// Classify the output of a failed probe. `None` means no pattern matched.
    fn classify(&self, probe: ProbeKind, diagnostic: &str) -> Option<VerifyReason>;

    /// Whether a failed stream-copy trial shows a real incompatibility
    fn rejects_copy(&self, diagnostic: &str) -> bool;
}

/// Where a pattern applies
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatternScope {
    Any,
    Hardware,
    Family(EncoderFamily),
    Hwaccel,
}

#[derive(Debug, Clone)]
struct Pattern {
    needle: String,
    reason: VerifyReason,
    scope: PatternScope,
}

/// Substring-table classifier; patterns are matched case-insensitively
#[derive(Debug, Clone)]
pub struct PatternClassifier {
    patterns: Vec<Pattern>,
    copy_patterns: Vec<String>,
}

impl PatternClassifier {
    /// A classifier with no patterns at all
    pub fn empty() -> Self {
        Self {
            patterns: Vec::new(),
            copy_patterns: Vec::new(),
        }
    }

    pub fn with_pattern(
        mut self,
        needle: impl Into<String>,
        reason: VerifyReason,
        scope: PatternScope,
    ) -> Self {
        self.patterns.push(Pattern {
            needle: needle.into().to_lowercase(),
            reason,
            scope,
        });
        self
    }

    pub fn with_copy_pattern(mut self, needle: impl Into<String>) -> Self {
        self.copy_patterns.push(needle.into().to_lowercase());
        self
    }

    fn applies(scope: PatternScope, probe: ProbeKind) -> bool {
        match scope {
            PatternScope::Any => true,
            PatternScope::Hardware => probe.is_hardware(),
            PatternScope::Family(f) => probe == ProbeKind::Encoder(f),
            PatternScope::Hwaccel => probe == ProbeKind::Hwaccel,
        }
    }
}

impl Default for PatternClassifier {
    fn default() -> Self {
        use PatternScope::*;
        use VerifyReason::*;

        let critical = [
            ("unknown encoder", UnknownEncoder),
            ("encoder not found", UnknownEncoder),
            ("could not find encoder", UnknownEncoder),
            ("not compiled", UnknownEncoder),
            ("cannot load", InitFailed),
            ("could not dynamically load", InitFailed),
        ];
        let hardware = [
            ("no device available", DeviceUnavailable),
            ("device creation failed", DeviceUnavailable),
            ("no hwaccel device", DeviceUnavailable),
            ("failed to open", DeviceUnavailable),
            ("cannot initialize", InitFailed),
            ("not supported", InitFailed),
        ];
        let hwaccel = [
            ("hardware device setup failed", DeviceUnavailable),
            ("not found", DeviceUnavailable),
        ];
        let qsv = [
            ("mfx", InitFailed),
            ("session", InitFailed),
            ("error creating", InitFailed),
        ];
        let amf = [
            ("failed to initialize", InitFailed),
            ("context creation", InitFailed),
            ("amf", InitFailed),
        ];

        let mut classifier = Self::empty();
        for (needle, reason) in critical {
            classifier = classifier.with_pattern(needle, reason, Any);
        }
        for (needle, reason) in hardware {
            classifier = classifier.with_pattern(needle, reason, Hardware);
        }
        for (needle, reason) in hwaccel {
            classifier = classifier.with_pattern(needle, reason, Hwaccel);
        }
        for (needle, reason) in qsv {
            classifier = classifier.with_pattern(needle, reason, Family(EncoderFamily::Qsv));
        }
        for (needle, reason) in amf {
            classifier = classifier.with_pattern(needle, reason, Family(EncoderFamily::Amf));
        }

        for needle in [
            "invalid",
            "incompatible",
            "codec not currently supported",
            "bitstream filter",
            "malformed",
            "could not write header",
        ] {
            classifier = classifier.with_copy_pattern(needle);
        }
        classifier
    }
}

impl DiagnosticClassifier for PatternClassifier {
    fn classify(&self, probe: ProbeKind, diagnostic: &str) -> Option<VerifyReason> {
        let text = diagnostic.to_lowercase();
        self.patterns
            .iter()
            .filter(|p| Self::applies(p.scope, probe))
            .find(|p| text.contains(&p.needle))
            .map(|p| p.reason)
    }

    fn rejects_copy(&self, diagnostic: &str) -> bool {
        let text = diagnostic.to_lowercase();
        self.copy_patterns.iter().any(|p| text.contains(p))
    }
}
