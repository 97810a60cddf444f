//! Station configuration structures.
//!
//! Built once at startup and passed by reference to the builder; nothing in
//! the crate reads configuration from global state.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::core::positioner::StepMode;

/// Scan geometry.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// Steps from home to the first positional reading.
    pub start_offset: u32,
    /// Positional readings per scan.
    pub positions: u32,
    /// Steps between positional readings.
    pub step_increment: u32,
    /// Drive style used for sweep moves.
    pub step_mode: StepMode,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            start_offset: 50,
            positions: 100,
            step_increment: 2,
            step_mode: StepMode::Interleave,
        }
    }
}

/// Homing behaviour.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HomingConfig {
    /// Steps taken to leave the switch when homing starts on it.
    pub clearing_steps: u32,
    /// Delay before re-checking a trigger, milliseconds.
    pub settle_ms: u64,
    /// Consecutive homing failures after which the station stops.
    pub max_consecutive_failures: u32,
}

impl Default for HomingConfig {
    fn default() -> Self {
        Self {
            clearing_steps: 100,
            settle_ms: 1000,
            max_consecutive_failures: 3,
        }
    }
}

/// Analysis worker pool.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Maximum concurrently running analysis jobs.
    pub capacity: usize,
    /// Stack size for worker threads, bytes.
    pub thread_stack_size: usize,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            capacity: 3,
            thread_stack_size: 2 * 1024 * 1024,
        }
    }
}

/// Settings handed to the analysis collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// External analysis program and leading arguments. `None` logs scans only.
    pub command: Option<Vec<String>>,
    /// Directory with reference cross-sections.
    pub reference_dir: PathBuf,
    /// Fit window start, nm.
    pub wave_start: f64,
    /// Fit window end, nm.
    pub wave_stop: f64,
    /// Order of the background polynomial.
    pub poly_order: u32,
    /// Initial fit parameters.
    pub initial_params: Vec<f64>,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            command: None,
            reference_dir: PathBuf::from("data_bases/Ref"),
            wave_start: 305.0,
            wave_stop: 318.0,
            poly_order: 3,
            initial_params: vec![1.0, 1.0, 1.0, -0.2, 0.05, 1.0, 1.0e16, 1.0e17, 1.0e19],
        }
    }
}

/// Root station configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StationConfig {
    /// Station identity used in logs and artifact names.
    pub station_name: String,
    /// Daily scanning start, fractional hours.
    pub start_time: f64,
    /// Daily scanning stop, fractional hours.
    pub stop_time: f64,
    /// Root of the dated results tree.
    pub results_root: PathBuf,
    /// Persisted positioner position.
    pub position_file: PathBuf,
    /// Directory for daily log files.
    pub log_dir: Option<PathBuf>,
    /// Heartbeat status file; `None` disables the status worker.
    pub status_file: Option<PathBuf>,
    /// Seconds between status writes.
    pub status_interval_secs: u64,
    /// Sleep between iterations outside the window, seconds.
    pub idle_interval_secs: u64,
    /// Sensor integration time, microseconds.
    pub integration_time_us: u64,
    /// Scan geometry.
    pub scan: ScanConfig,
    /// Homing behaviour.
    pub homing: HomingConfig,
    /// Analysis worker pool.
    pub dispatch: DispatchConfig,
    /// Analysis settings.
    pub analysis: AnalysisConfig,
}

impl Default for StationConfig {
    fn default() -> Self {
        Self {
            station_name: "TEST".into(),
            start_time: 7.0,
            stop_time: 18.0,
            results_root: PathBuf::from("Results"),
            position_file: PathBuf::from("Station/position.txt"),
            log_dir: Some(PathBuf::from("log")),
            status_file: Some(PathBuf::from("Station/status.json")),
            status_interval_secs: 30,
            idle_interval_secs: 60,
            integration_time_us: 1_500_000,
            scan: ScanConfig::default(),
            homing: HomingConfig::default(),
            dispatch: DispatchConfig::default(),
            analysis: AnalysisConfig::default(),
        }
    }
}

/// A typed value from the legacy settings format.
#[derive(Debug, Clone, PartialEq)]
pub enum SettingValue {
    /// `<class 'float'>`
    Float(f64),
    /// `<class 'int'>`
    Int(i64),
    /// `<class 'bool'>`
    Bool(bool),
    /// `<class 'str'>`
    Str(String),
}

impl SettingValue {
    #[allow(clippy::cast_precision_loss)]
    fn as_f64(&self, name: &str) -> Result<f64, String> {
        match self {
            Self::Float(v) => Ok(*v),
            Self::Int(v) => Ok(*v as f64),
            other => Err(format!("setting `{name}` must be numeric, got {other:?}")),
        }
    }

    fn as_u64(&self, name: &str) -> Result<u64, String> {
        match self {
            Self::Int(v) => u64::try_from(*v).map_err(|_| format!("setting `{name}` must not be negative")),
            other => Err(format!("setting `{name}` must be an integer, got {other:?}")),
        }
    }

    fn as_string(&self, name: &str) -> Result<String, String> {
        match self {
            Self::Str(v) => Ok(v.clone()),
            other => Err(format!("setting `{name}` must be a string, got {other:?}")),
        }
    }
}

/// Parse the legacy `name;value;<class 'type'>` settings format.
///
/// # Errors
///
/// Returns a message naming the first malformed line.
pub fn parse_settings(input: &str) -> Result<HashMap<String, SettingValue>, String> {
    let mut settings = HashMap::new();
    for (lineno, line) in input.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let mut parts = line.split(';');
        let (Some(name), Some(raw), Some(dtype), None) = (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(format!("line {}: expected `name;value;type`", lineno + 1));
        };
        let bad = |what: &str| format!("line {}: {what} value `{raw}` for `{name}`", lineno + 1);
        let value = match dtype {
            "<class 'float'>" => SettingValue::Float(raw.parse().map_err(|_| bad("invalid float"))?),
            "<class 'int'>" => SettingValue::Int(raw.parse().map_err(|_| bad("invalid int"))?),
            "<class 'bool'>" => match raw {
                "True" => SettingValue::Bool(true),
                "False" => SettingValue::Bool(false),
                _ => return Err(bad("invalid bool")),
            },
            "<class 'str'>" => SettingValue::Str(raw.to_string()),
            other => return Err(format!("line {}: unsupported type `{other}`", lineno + 1)),
        };
        settings.insert(name.to_string(), value);
    }
    Ok(settings)
}

impl StationConfig {
    /// Validate configuration values.
    ///
    /// # Errors
    ///
    /// Returns a message describing the first invalid value.
    pub fn validate(&self) -> Result<(), String> {
        if self.station_name.trim().is_empty() {
            return Err("station_name must not be empty".into());
        }
        for (name, value) in [("start_time", self.start_time), ("stop_time", self.stop_time)] {
            if !(0.0..24.0).contains(&value) {
                return Err(format!("{name} must be within [0, 24), got {value}"));
            }
        }
        if self.idle_interval_secs == 0 {
            return Err("idle_interval_secs must be greater than 0".into());
        }
        if self.status_interval_secs == 0 {
            return Err("status_interval_secs must be greater than 0".into());
        }
        if self.scan.positions == 0 {
            return Err("scan.positions must be greater than 0".into());
        }
        if self.scan.step_increment == 0 {
            return Err("scan.step_increment must be greater than 0".into());
        }
        if self.homing.max_consecutive_failures == 0 {
            return Err("homing.max_consecutive_failures must be greater than 0".into());
        }
        if self.dispatch.capacity == 0 {
            return Err("dispatch.capacity must be greater than 0".into());
        }
        if self.analysis.command.as_ref().is_some_and(Vec::is_empty) {
            return Err("analysis.command must name a program".into());
        }
        Ok(())
    }

    /// Parse configuration from a JSON string and validate.
    ///
    /// # Errors
    ///
    /// Returns a parse or validation message.
    pub fn from_json_str(input: &str) -> Result<Self, String> {
        let cfg: Self = serde_json::from_str(input).map_err(|e| format!("parse error: {e}"))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Read and validate a JSON configuration file.
    ///
    /// # Errors
    ///
    /// Returns a read, parse or validation message.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, String> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| format!("cannot read {}: {e}", path.display()))?;
        Self::from_json_str(&text)
    }

    /// Apply legacy settings text on top of `self` and validate.
    ///
    /// Recognised keys: `start_time`, `stop_time`, `station_name`,
    /// `results_root`, `position_file`, `idle_interval_secs`,
    /// `integration_time_us`, `dispatch_capacity`. Others are ignored.
    ///
    /// # Errors
    ///
    /// Returns a parse, type or validation message.
    pub fn with_settings_str(mut self, input: &str) -> Result<Self, String> {
        for (name, value) in parse_settings(input)? {
            match name.as_str() {
                "start_time" => self.start_time = value.as_f64(&name)?,
                "stop_time" => self.stop_time = value.as_f64(&name)?,
                "station_name" => self.station_name = value.as_string(&name)?,
                "results_root" => self.results_root = PathBuf::from(value.as_string(&name)?),
                "position_file" => self.position_file = PathBuf::from(value.as_string(&name)?),
                "idle_interval_secs" => self.idle_interval_secs = value.as_u64(&name)?,
                "integration_time_us" => self.integration_time_us = value.as_u64(&name)?,
                "dispatch_capacity" => {
                    self.dispatch.capacity = usize::try_from(value.as_u64(&name)?)
                        .map_err(|_| "dispatch_capacity is too large".to_string())?;
                }
                _ => debug!(setting = %name, "Ignoring unrecognised setting"),
            }
        }
        self.validate()?;
        Ok(self)
    }

    /// Read a legacy settings file on top of the defaults.
    ///
    /// # Errors
    ///
    /// Returns a read, parse or validation message.
    pub fn from_settings_file(path: impl AsRef<Path>) -> Result<Self, String> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| format!("cannot read {}: {e}", path.display()))?;
        Self::default().with_settings_str(&text)
    }
}
