//! Host GPU detection, used to prune vendor encoders before verification

use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use super::core::{EncoderFamily, exec};

const LISTING_TIMEOUT: Duration = Duration::from_secs(5);

/// Hwaccel names in the order they are tried for `auto` decode selection
pub const HWACCEL_PRIORITY: &[&str] = &["cuda", "qsv", "dxva2", "d3d11va", "videotoolbox", "vaapi"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum GpuVendor {
    Nvidia,
    Amd,
    Intel,
    Apple,
}

impl GpuVendor {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Nvidia => "NVIDIA",
            Self::Amd => "AMD",
            Self::Intel => "Intel",
            Self::Apple => "Apple",
        }
    }
}

/// Which GPU vendors are physically present
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct GpuProfile {
    pub nvidia: bool,
    pub amd: bool,
    pub intel: bool,
    pub apple: bool,
    pub models: BTreeMap<GpuVendor, String>,
}

impl GpuProfile {
    pub fn has(&self, vendor: GpuVendor) -> bool {
        match vendor {
            GpuVendor::Nvidia => self.nvidia,
            GpuVendor::Amd => self.amd,
            GpuVendor::Intel => self.intel,
            GpuVendor::Apple => self.apple,
        }
    }

    pub fn any(&self) -> bool {
        self.nvidia || self.amd || self.intel || self.apple
    }

    /// Record a vendor; the first model string seen for it is kept
    pub fn mark(&mut self, vendor: GpuVendor, model: Option<&str>) {
        match vendor {
            GpuVendor::Nvidia => self.nvidia = true,
            GpuVendor::Amd => self.amd = true,
            GpuVendor::Intel => self.intel = true,
            GpuVendor::Apple => self.apple = true,
        }
        if let Some(model) = model.map(str::trim).filter(|m| !m.is_empty()) {
            self.models
                .entry(vendor)
                .or_insert_with(|| model.to_string());
        }
    }

    /// Whether encoders of this family can possibly run on this host
    pub fn permits(&self, family: EncoderFamily) -> bool {
        match family {
            EncoderFamily::Nvenc => self.nvidia,
            EncoderFamily::Qsv => self.intel,
            EncoderFamily::Amf => self.amd,
            EncoderFamily::VideoToolbox => self.apple,
            // VA-API drivers exist for all three PC vendors
            EncoderFamily::Vaapi => self.nvidia || self.amd || self.intel,
            EncoderFamily::Software => true,
        }
    }

    /// Whether a decode accelerator can possibly run on this host
    pub fn permits_hwaccel(&self, hwaccel: &str) -> bool {
        match hwaccel {
            "cuda" | "nvdec" | "cuvid" => self.nvidia,
            "qsv" => self.intel,
            "videotoolbox" => self.apple,
            "vaapi" | "vdpau" => self.nvidia || self.amd || self.intel,
            "dxva2" | "d3d11va" | "d3d12va" => self.any(),
            _ => self.any(),
        }
    }

    /// First hwaccel from the priority list suited to the detected vendors
    pub fn recommended_hwaccel(&self) -> Option<&'static str> {
        HWACCEL_PRIORITY
            .iter()
            .copied()
            .filter(|h| match *h {
                "dxva2" | "d3d11va" => cfg!(windows),
                "videotoolbox" => cfg!(target_os = "macos"),
                "vaapi" => cfg!(target_os = "linux"),
                _ => true,
            })
            .find(|h| self.permits_hwaccel(h) && self.any())
    }

    pub fn summary(&self) -> String {
        let vendors: Vec<String> = [
            GpuVendor::Nvidia,
            GpuVendor::Amd,
            GpuVendor::Intel,
            GpuVendor::Apple,
        ]
        .into_iter()
        .filter(|v| self.has(*v))
        .map(|v| match self.models.get(&v) {
            Some(model) => format!("{} ({})", v.label(), model),
            None => v.label().to_string(),
        })
        .collect();

        if vendors.is_empty() {
            "no GPU detected".to_string()
        } else {
            vendors.join(", ")
        }
    }
}

/// Vendor implied by an adapter name
fn classify_adapter(name: &str) -> Option<GpuVendor> {
    let lower = name.to_lowercase();
    if ["nvidia", "geforce", "quadro", "rtx", "tesla"]
        .iter()
        .any(|k| lower.contains(k))
    {
        Some(GpuVendor::Nvidia)
    } else if ["amd", "radeon", "advanced micro devices", "ati technologies", "rx "]
        .iter()
        .any(|k| lower.contains(k))
    {
        Some(GpuVendor::Amd)
    } else if lower.contains("intel") {
        Some(GpuVendor::Intel)
    } else if lower.contains("apple")
        || ["m1", "m2", "m3", "m4"]
            .iter()
            .any(|chip| lower.split_whitespace().any(|w| w == *chip))
    {
        Some(GpuVendor::Apple)
    } else {
        None
    }
}

/// Parse `lspci` output; only display-class devices count
pub fn parse_lspci(text: &str) -> GpuProfile {
    let mut profile = GpuProfile::default();
    for line in text.lines() {
        let lower = line.to_lowercase();
        if !(lower.contains("vga") || lower.contains("display") || lower.contains("3d controller"))
        {
            continue;
        }
        // Model is everything after the last colon
        let model = line.rsplit(':').next().map(str::trim);
        if let Some(vendor) = model.and_then(classify_adapter) {
            profile.mark(vendor, model);
        }
    }
    profile
}

/// Parse `wmic path win32_VideoController get name`
pub fn parse_wmic(text: &str) -> GpuProfile {
    let mut profile = GpuProfile::default();
    for line in text.lines().map(str::trim).filter(|l| !l.is_empty()) {
        if line.eq_ignore_ascii_case("name") {
            continue;
        }
        if let Some(vendor) = classify_adapter(line) {
            profile.mark(vendor, Some(line));
        }
    }
    profile
}

/// Parse `system_profiler SPDisplaysDataType`
pub fn parse_system_profiler(text: &str) -> GpuProfile {
    let mut profile = GpuProfile::default();
    for line in text.lines() {
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        if key.trim() != "Chipset Model" {
            continue;
        }
        if let Some(vendor) = classify_adapter(value) {
            profile.mark(vendor, Some(value));
        }
    }
    profile
}

fn listing(program: &str, args: &[&str]) -> Option<String> {
    let out = exec::capture(Path::new(program), args, LISTING_TIMEOUT).ok()?;
    out.success.then_some(out.stdout)
}

/// Detect NVIDIA GPU model using nvidia-smi
pub fn detect_nvidia_gpu() -> Option<String> {
    let stdout = listing("nvidia-smi", &["--query-gpu=name", "--format=csv,noheader"])?;
    let name = stdout.lines().next()?.trim();
    if name.is_empty() {
        None
    } else {
        Some(name.to_string())
    }
}

/// Detect available render device
/// Scans /dev/dri/renderD* and returns the first available
pub fn detect_render_device() -> Option<String> {
    detect_render_device_in(Path::new("/dev/dri"))
}

pub fn detect_render_device_in(dri_path: &Path) -> Option<String> {
    let mut devices: Vec<_> = std::fs::read_dir(dri_path)
        .ok()?
        .filter_map(|e| e.ok())
        .filter(|e| {
            e.file_name()
                .to_str()
                .is_some_and(|n| n.starts_with("renderD"))
        })
        .map(|e| e.path())
        .collect();

    // renderD128 before renderD129
    devices.sort();
    devices.first().map(|p| p.to_string_lossy().to_string())
}

/// Enumerate display adapters for the current OS
pub fn detect() -> GpuProfile {
    let mut profile = if cfg!(target_os = "windows") {
        listing("wmic", &["path", "win32_VideoController", "get", "name"])
            .map(|text| parse_wmic(&text))
            .unwrap_or_default()
    } else if cfg!(target_os = "macos") {
        listing("system_profiler", &["SPDisplaysDataType"])
            .map(|text| parse_system_profiler(&text))
            .unwrap_or_default()
    } else {
        listing("lspci", &[])
            .map(|text| parse_lspci(&text))
            .unwrap_or_default()
    };

    // nvidia-smi names the card precisely and works where lspci is missing
    if !cfg!(target_os = "macos") {
        if let Some(model) = detect_nvidia_gpu() {
            profile.models.remove(&GpuVendor::Nvidia);
            profile.mark(GpuVendor::Nvidia, Some(&model));
        }
    }

    tracing::info!("GPU profile: {}", profile.summary());
    profile
}
