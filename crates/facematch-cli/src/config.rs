use clap::ValueEnum;
use facematch_core::capture::{BURST_INTERVAL, HOLD_DELAY};
use facematch_core::frame::CAPTURE_SIZE;
use facematch_core::scorer::{DESCRIPTOR_DISTANCE_BUDGET, PIXEL_GRID_SIZE, PIXEL_SENSITIVITY};
use facematch_core::{CaptureTiming, DEFAULT_ACCEPT_THRESHOLD};
use facematch_io::CaptureFormat;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Fixed pause before a scan result is shown.
const SCAN_DELAY_MS: u64 = 2000;

/// Largest accepted luma grid side.
const MAX_GRID_SIZE: u32 = 1024;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config file: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Similarity backend, chosen once at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// Mean luma deviation on a downsampled grid; no model needed.
    Pixel,
    /// Euclidean distance between ArcFace descriptors.
    Descriptor,
}

impl FromStr for Backend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pixel" => Ok(Backend::Pixel),
            "descriptor" => Ok(Backend::Descriptor),
            other => Err(ConfigError::Invalid(format!(
                "unknown backend {other:?} (expected pixel or descriptor)"
            ))),
        }
    }
}

/// Engine configuration: defaults, then an optional TOML file named by
/// `FACEMATCH_CONFIG`, then `FACEMATCH_*` environment variables.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub backend: Backend,
    /// ArcFace ONNX model, used by the descriptor backend.
    pub model_path: PathBuf,
    /// Scores strictly above this are accepted.
    pub threshold: f32,
    pub grid_size: u32,
    pub sensitivity: f32,
    pub distance_budget: f32,
    pub hold_ms: u64,
    pub burst_interval_ms: u64,
    pub scan_delay_ms: u64,
    /// Side length captures are normalised to.
    pub capture_size: u32,
    /// Mirror captures horizontally.
    pub mirror: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            backend: Backend::Pixel,
            model_path: default_model_dir().join("w600k_r50.onnx"),
            threshold: DEFAULT_ACCEPT_THRESHOLD,
            grid_size: PIXEL_GRID_SIZE,
            sensitivity: PIXEL_SENSITIVITY,
            distance_budget: DESCRIPTOR_DISTANCE_BUDGET,
            hold_ms: HOLD_DELAY.as_millis() as u64,
            burst_interval_ms: BURST_INTERVAL.as_millis() as u64,
            scan_delay_ms: SCAN_DELAY_MS,
            capture_size: CAPTURE_SIZE,
            mirror: true,
        }
    }
}

impl Config {
    /// Load from the optional config file and the process environment.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = match std::env::var("FACEMATCH_CONFIG") {
            Ok(path) => Self::from_file(Path::new(&path))?,
            Err(_) => Self::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml(&text)?;
        tracing::debug!(path = %path.display(), "loaded config file");
        Ok(config)
    }

    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Apply `FACEMATCH_*` overrides from `lookup`. Unparseable numbers are
    /// ignored, like the defaults they would replace.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(backend) = lookup("FACEMATCH_BACKEND") {
            self.backend = backend.parse()?;
        }
        if let Some(path) = lookup("FACEMATCH_MODEL_PATH") {
            self.model_path = PathBuf::from(path);
        }
        self.threshold = parsed(&lookup, "FACEMATCH_THRESHOLD", self.threshold);
        self.grid_size = parsed(&lookup, "FACEMATCH_GRID_SIZE", self.grid_size);
        self.sensitivity = parsed(&lookup, "FACEMATCH_SENSITIVITY", self.sensitivity);
        self.distance_budget = parsed(&lookup, "FACEMATCH_DISTANCE_BUDGET", self.distance_budget);
        self.hold_ms = parsed(&lookup, "FACEMATCH_HOLD_MS", self.hold_ms);
        self.burst_interval_ms = parsed(&lookup, "FACEMATCH_BURST_INTERVAL_MS", self.burst_interval_ms);
        self.scan_delay_ms = parsed(&lookup, "FACEMATCH_SCAN_DELAY_MS", self.scan_delay_ms);
        self.capture_size = parsed(&lookup, "FACEMATCH_CAPTURE_SIZE", self.capture_size);
        if let Some(v) = lookup("FACEMATCH_MIRROR") {
            self.mirror = v != "0";
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: String| Err(ConfigError::Invalid(msg));
        if !(0.0..100.0).contains(&self.threshold) {
            return invalid(format!("threshold {} must be in [0, 100)", self.threshold));
        }
        if !(1..=MAX_GRID_SIZE).contains(&self.grid_size) {
            return invalid(format!(
                "grid_size {} must be between 1 and {MAX_GRID_SIZE}",
                self.grid_size
            ));
        }
        if self.sensitivity.is_nan() || self.sensitivity <= 0.0 {
            return invalid(format!("sensitivity {} must be positive", self.sensitivity));
        }
        if self.distance_budget.is_nan() || self.distance_budget <= 0.0 {
            return invalid(format!("distance_budget {} must be positive", self.distance_budget));
        }
        if self.burst_interval_ms == 0 {
            return invalid("burst_interval_ms must be positive".into());
        }
        if self.capture_size == 0 {
            return invalid("capture_size must be positive".into());
        }
        Ok(())
    }

    pub fn capture_timing(&self) -> CaptureTiming {
        CaptureTiming {
            hold_delay: Duration::from_millis(self.hold_ms),
            burst_interval: Duration::from_millis(self.burst_interval_ms),
        }
    }

    pub fn capture_format(&self) -> CaptureFormat {
        CaptureFormat {
            size: self.capture_size,
            mirror: self.mirror,
        }
    }

    pub fn scan_delay(&self) -> Duration {
        Duration::from_millis(self.scan_delay_ms)
    }
}

fn default_model_dir() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".local/share")
        })
        .join("facematch/models")
}

fn parsed<T, F>(lookup: &F, key: &str, current: T) -> T
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(current)
}
