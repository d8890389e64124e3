//! Configuration parsing.

use memsim_core::config::{
    CacheTopology, Config, ConfigError, SimMode, StandardKind, TranslationKind,
};
use memsim_core::controller::rowpolicy::RowPolicyKind;
use memsim_core::controller::scheduler::SchedulerKind;

// ══════════════════════════════════════════════════════════
// 1. INI-like format
// ══════════════════════════════════════════════════════════

#[test]
fn parses_key_value_pairs() {
    let text = "\
standard = DDR4
channel = 2
rank 2
subarray = 4
cache all
early_exit off
translation Random
scheduler FRFCFS_Cap
row_policy timeout
record_cmd_trace on
inflight_limit 64
cpu_frequency 4000
";
    let cfg = Config::from_ini_str(text).expect("parse");
    assert_eq!(cfg.standard, StandardKind::Ddr4);
    assert_eq!(cfg.channels, 2);
    assert_eq!(cfg.ranks, 2);
    assert_eq!(cfg.subarrays, 4);
    assert_eq!(cfg.cache, CacheTopology::All);
    assert!(!cfg.early_exit);
    assert_eq!(cfg.translation, TranslationKind::Random);
    assert_eq!(cfg.scheduler, SchedulerKind::FrfcfsCap);
    assert_eq!(cfg.row_policy, RowPolicyKind::Timeout);
    assert!(cfg.record_cmd_trace);
    assert_eq!(cfg.inflight_limit, 64);
    assert_eq!(cfg.cpu_frequency_mhz, 4000);
}

#[test]
fn defaults_apply_when_absent() {
    let cfg = Config::from_ini_str("standard DDR3\n").expect("parse");
    assert_eq!(cfg.channels, 1);
    assert_eq!(cfg.ranks, 1);
    assert_eq!(cfg.cache, CacheTopology::None);
    assert!(cfg.early_exit);
    assert_eq!(cfg.translation, TranslationKind::None);
    assert_eq!(cfg.scheduler, SchedulerKind::Frfcfs);
}

#[test]
fn comments_and_unknown_keys_are_ignored() {
    let text = "\
# main settings
standard = DDR3   # inline comment
mystery_knob = 42
";
    let cfg = Config::from_ini_str(text).expect("unknown keys ignored");
    assert_eq!(cfg.standard, StandardKind::Ddr3);
}

#[test]
fn bad_values_are_rejected() {
    let err = Config::from_ini_str("channel = many\n").expect_err("bad value");
    assert!(matches!(err, ConfigError::BadValue { .. }));

    let err = Config::from_ini_str("standard = DDR9\n").expect_err("unknown standard");
    assert!(matches!(err, ConfigError::UnknownStandard { .. }));

    let err = Config::from_ini_str("standard\n").expect_err("missing value");
    assert!(matches!(err, ConfigError::MissingValue { line: 1, .. }));
}

// ══════════════════════════════════════════════════════════
// 2. JSON format
// ══════════════════════════════════════════════════════════

#[test]
fn parses_json() {
    let json = r#"{
        "standard": "SALP",
        "channel": 2,
        "subarray": 4,
        "cache": "l1l2",
        "mode": "dram"
    }"#;
    let cfg: Config = serde_json::from_str(json).expect("deserialize");
    assert_eq!(cfg.standard, StandardKind::Salp);
    assert_eq!(cfg.channels, 2);
    assert_eq!(cfg.subarrays, 4);
    assert_eq!(cfg.cache, CacheTopology::L1L2);
    assert_eq!(cfg.mode, SimMode::Dram);
}

// ══════════════════════════════════════════════════════════
// 3. Derived values
// ══════════════════════════════════════════════════════════

#[test]
fn stats_path_defaults_to_standard_name() {
    let mut cfg = Config::default();
    cfg.standard = StandardKind::Ddr4;
    assert_eq!(cfg.stats_path().to_string_lossy(), "DDR4.stats");
}

#[test]
fn mode_parses_from_cli_strings() {
    assert_eq!("cpu".parse::<SimMode>().expect("cpu"), SimMode::Cpu);
    assert_eq!("DRAM".parse::<SimMode>().expect("dram"), SimMode::Dram);
    assert!("both".parse::<SimMode>().is_err());
}
