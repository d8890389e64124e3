//! Configuration system for the simulator.
//!
//! This module defines the configuration structure and enums that
//! parameterize a run. It provides:
//! 1. **Defaults:** baseline constants (channels, queue depths, CPU clock).
//! 2. **File formats:** the INI-like `key value` format (unknown keys are
//!    ignored) and JSON via serde.
//! 3. **Enums:** standard, cache topology, translation, scheduler, and row
//!    policy selections.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::Deserialize;
use thiserror::Error;

use crate::controller::rowpolicy::RowPolicyKind;
use crate::controller::scheduler::SchedulerKind;

/// Default configuration constants.
mod defaults {
    /// Channels per memory system.
    pub const CHANNELS: usize = 1;
    /// Ranks per channel.
    pub const RANKS: usize = 1;
    /// Subarrays per bank (SALP only).
    pub const SUBARRAYS: usize = 8;
    /// CPU clock in MHz.
    pub const CPU_FREQUENCY_MHZ: u64 = 3200;
}

/// Errors raised while loading or validating a configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("cannot read config {path}: {source}")]
    Io {
        /// Offending path.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },
    /// A JSON configuration failed to deserialize.
    #[error("bad JSON config: {0}")]
    Json(#[from] serde_json::Error),
    /// A known key carried an unparsable value.
    #[error("bad value {value:?} for config key {key:?}")]
    BadValue {
        /// The key.
        key: String,
        /// The offending value.
        value: String,
    },
    /// A key appeared without a value.
    #[error("config line {line} has no value: {text:?}")]
    MissingValue {
        /// 1-based line number.
        line: usize,
        /// The offending line.
        text: String,
    },
    /// The requested standard is not bundled.
    #[error("unknown standard {name:?} (supported: DDR3, DDR4, SALP)")]
    UnknownStandard {
        /// The requested name.
        name: String,
    },
    /// The requested org/speed preset does not exist for the standard.
    #[error("unknown {standard} preset {preset:?}")]
    UnknownPreset {
        /// Standard whose preset table was searched.
        standard: &'static str,
        /// The requested preset.
        preset: String,
    },
    /// The configuration is self-inconsistent.
    #[error("inconsistent configuration: {0}")]
    Inconsistent(String),
}

/// Supported DRAM standards.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum StandardKind {
    /// DDR3 SDRAM.
    Ddr3,
    /// DDR4 SDRAM (bank groups).
    Ddr4,
    /// Subarray-level parallelism DRAM.
    Salp,
}

impl StandardKind {
    /// Name as written in configuration files.
    pub fn name(self) -> &'static str {
        match self {
            StandardKind::Ddr3 => "DDR3",
            StandardKind::Ddr4 => "DDR4",
            StandardKind::Salp => "SALP",
        }
    }
}

impl FromStr for StandardKind {
    type Err = ConfigError;
    fn from_str(s: &str) -> Result<Self, ConfigError> {
        match s.to_ascii_uppercase().as_str() {
            "DDR3" => Ok(StandardKind::Ddr3),
            "DDR4" => Ok(StandardKind::Ddr4),
            "SALP" => Ok(StandardKind::Salp),
            _ => Err(ConfigError::UnknownStandard { name: s.to_string() }),
        }
    }
}

/// Cache levels placed in front of main memory.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheTopology {
    /// Per-core L1/L2 plus a shared L3.
    All,
    /// Shared L3 only.
    #[serde(alias = "L3")]
    L3,
    /// Per-core L1/L2 only.
    #[serde(alias = "L1L2")]
    L1L2,
    /// No caches.
    None,
}

impl FromStr for CacheTopology {
    type Err = ConfigError;
    fn from_str(s: &str) -> Result<Self, ConfigError> {
        match s.to_ascii_lowercase().as_str() {
            "all" => Ok(CacheTopology::All),
            "l3" => Ok(CacheTopology::L3),
            "l1l2" => Ok(CacheTopology::L1L2),
            "no" | "none" | "off" => Ok(CacheTopology::None),
            _ => Err(ConfigError::BadValue {
                key: "cache".to_string(),
                value: s.to_string(),
            }),
        }
    }
}

/// Address translation applied before mapping.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
pub enum TranslationKind {
    /// Physical addresses used as-is.
    None,
    /// Page frames permuted with a fixed seed at construction.
    Random,
}

impl FromStr for TranslationKind {
    type Err = ConfigError;
    fn from_str(s: &str) -> Result<Self, ConfigError> {
        match s.to_ascii_lowercase().as_str() {
            "none" => Ok(TranslationKind::None),
            "random" => Ok(TranslationKind::Random),
            _ => Err(ConfigError::BadValue {
                key: "translation".to_string(),
                value: s.to_string(),
            }),
        }
    }
}

/// Front-end driving the memory system.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SimMode {
    /// Trace-driven cores with a reorder window (and optional caches).
    Cpu,
    /// Raw DRAM-trace replay into the controllers.
    Dram,
}

impl FromStr for SimMode {
    type Err = ConfigError;
    fn from_str(s: &str) -> Result<Self, ConfigError> {
        match s.to_ascii_lowercase().as_str() {
            "cpu" => Ok(SimMode::Cpu),
            "dram" => Ok(SimMode::Dram),
            _ => Err(ConfigError::BadValue {
                key: "mode".to_string(),
                value: s.to_string(),
            }),
        }
    }
}

/// Root configuration for one run.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Config {
    /// DRAM standard to simulate.
    pub standard: StandardKind,
    /// Channels per memory system.
    #[serde(alias = "channel")]
    pub channels: usize,
    /// Ranks per channel.
    #[serde(alias = "rank")]
    pub ranks: usize,
    /// Subarrays per bank (SALP only).
    #[serde(alias = "subarray")]
    pub subarrays: usize,
    /// Cache topology in front of memory.
    pub cache: CacheTopology,
    /// End the run when the first core drains.
    pub early_exit: bool,
    /// Speed preset name; the standard's default when absent.
    pub speed: Option<String>,
    /// Organization preset name; the standard's default when absent.
    pub org: Option<String>,
    /// Keep issued commands on the controllers for inspection.
    pub record_cmd_trace: bool,
    /// Print each issued command to stdout.
    pub print_cmd_trace: bool,
    /// Address translation mode.
    pub translation: TranslationKind,
    /// Bound on requests in flight across the memory system; 0 = unbounded.
    pub inflight_limit: usize,
    /// CPU clock in MHz.
    #[serde(alias = "cpu_frequency")]
    pub cpu_frequency_mhz: u64,
    /// Scheduling policy.
    pub scheduler: SchedulerKind,
    /// Row management policy.
    pub row_policy: RowPolicyKind,
    /// Front-end mode; normally set by the CLI.
    pub mode: SimMode,
    /// Trace files; core count in cpu mode.
    pub traces: Vec<PathBuf>,
    /// Statistics output path; `<standard>.stats` when absent.
    pub stats_path: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            standard: StandardKind::Ddr3,
            channels: defaults::CHANNELS,
            ranks: defaults::RANKS,
            subarrays: defaults::SUBARRAYS,
            cache: CacheTopology::None,
            early_exit: true,
            speed: None,
            org: None,
            record_cmd_trace: false,
            print_cmd_trace: false,
            translation: TranslationKind::None,
            inflight_limit: 0,
            cpu_frequency_mhz: defaults::CPU_FREQUENCY_MHZ,
            scheduler: SchedulerKind::Frfcfs,
            row_policy: RowPolicyKind::Opened,
            mode: SimMode::Cpu,
            traces: Vec::new(),
            stats_path: None,
        }
    }
}

fn parse_on_off(key: &str, value: &str) -> Result<bool, ConfigError> {
    match value.to_ascii_lowercase().as_str() {
        "on" | "true" | "1" | "yes" => Ok(true),
        "off" | "false" | "0" | "no" => Ok(false),
        _ => Err(ConfigError::BadValue {
            key: key.to_string(),
            value: value.to_string(),
        }),
    }
}

fn parse_num<T: FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.parse::<T>().map_err(|_| ConfigError::BadValue {
        key: key.to_string(),
        value: value.to_string(),
    })
}

impl Config {
    /// Loads a configuration file: JSON when the extension says so, the
    /// INI-like `key value` format otherwise.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        if path.extension().is_some_and(|e| e == "json") {
            Ok(serde_json::from_str(&text)?)
        } else {
            Self::from_ini_str(&text)
        }
    }

    /// Parses the INI-like format: one `key value` (or `key = value`) pair
    /// per line, `#` starting a comment, unknown keys ignored.
    pub fn from_ini_str(text: &str) -> Result<Self, ConfigError> {
        let mut cfg = Self::default();
        for (line_no, raw) in text.lines().enumerate() {
            let line = raw.split('#').next().unwrap_or("").trim();
            if line.is_empty() {
                continue;
            }
            let (key, value) = match line.split_once('=') {
                Some((k, v)) => (k.trim(), v.trim()),
                None => match line.split_once(char::is_whitespace) {
                    Some((k, v)) => (k.trim(), v.trim()),
                    None => {
                        return Err(ConfigError::MissingValue {
                            line: line_no + 1,
                            text: raw.to_string(),
                        })
                    }
                },
            };
            if value.is_empty() {
                return Err(ConfigError::MissingValue {
                    line: line_no + 1,
                    text: raw.to_string(),
                });
            }
            cfg.set(key, value)?;
        }
        Ok(cfg)
    }

    /// Applies one `key value` pair; unknown keys are ignored.
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        match key {
            "standard" => self.standard = value.parse()?,
            "channel" | "channels" => self.channels = parse_num(key, value)?,
            "rank" | "ranks" => self.ranks = parse_num(key, value)?,
            "subarray" | "subarrays" => self.subarrays = parse_num(key, value)?,
            "cache" => self.cache = value.parse()?,
            "early_exit" => self.early_exit = parse_on_off(key, value)?,
            "speed" => self.speed = Some(value.to_string()),
            "org" => self.org = Some(value.to_string()),
            "record_cmd_trace" => self.record_cmd_trace = parse_on_off(key, value)?,
            "print_cmd_trace" => self.print_cmd_trace = parse_on_off(key, value)?,
            "translation" => self.translation = value.parse()?,
            "inflight_limit" => self.inflight_limit = parse_num(key, value)?,
            "cpu_frequency" => self.cpu_frequency_mhz = parse_num(key, value)?,
            "scheduler" => {
                self.scheduler = match value.to_ascii_uppercase().as_str() {
                    "FCFS" => SchedulerKind::Fcfs,
                    "FRFCFS" => SchedulerKind::Frfcfs,
                    "FRFCFS_CAP" => SchedulerKind::FrfcfsCap,
                    "FRFCFS_PRIORHIT" => SchedulerKind::FrfcfsPriorHit,
                    _ => {
                        return Err(ConfigError::BadValue {
                            key: key.to_string(),
                            value: value.to_string(),
                        })
                    }
                }
            }
            "row_policy" => {
                self.row_policy = match value.to_ascii_lowercase().as_str() {
                    "opened" | "open" => RowPolicyKind::Opened,
                    "closed" => RowPolicyKind::Closed,
                    "closedap" => RowPolicyKind::ClosedAp,
                    "timeout" => RowPolicyKind::Timeout,
                    _ => {
                        return Err(ConfigError::BadValue {
                            key: key.to_string(),
                            value: value.to_string(),
                        })
                    }
                }
            }
            _ => {} // unknown keys are ignored
        }
        Ok(())
    }

    /// Statistics output path, defaulting to `<standard>.stats`.
    pub fn stats_path(&self) -> PathBuf {
        self.stats_path
            .clone()
            .unwrap_or_else(|| PathBuf::from(format!("{}.stats", self.standard.name())))
    }
}
