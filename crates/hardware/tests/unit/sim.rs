//! Whole-run smoke tests for both front-end modes.

use std::io::Write as _;
use std::path::PathBuf;

use tempfile::TempDir;

use memsim_core::config::{Config, SimMode};
use memsim_core::sim;

fn write_trace(dir: &TempDir, name: &str, content: &str) -> PathBuf {
    let path = dir.path().join(name);
    let mut f = std::fs::File::create(&path).expect("create trace");
    f.write_all(content.as_bytes()).expect("write trace");
    path
}

// ══════════════════════════════════════════════════════════
// 1. DRAM-trace replay
// ══════════════════════════════════════════════════════════

#[test]
fn dram_mode_runs_to_completion() {
    let dir = TempDir::new().expect("tempdir");
    let trace = write_trace(&dir, "dram.trace", "100 R\n140 W\n180\n");

    let mut cfg = Config::default();
    cfg.mode = SimMode::Dram;
    cfg.traces = vec![trace];
    cfg.stats_path = Some(dir.path().join("out.stats"));

    let summary = sim::run(&cfg).expect("run");
    assert_eq!(summary.reads, 2);
    assert_eq!(summary.writes, 1);
    assert!(summary.cycles > 0, "simulation advanced");

    let stats = std::fs::read_to_string(dir.path().join("out.stats")).expect("stats written");
    assert!(stats.contains("row_hits"), "per-channel row tallies reported");
    assert!(stats.contains("memsim.dram_cycles"));
}

// ══════════════════════════════════════════════════════════
// 2. CPU-trace mode
// ══════════════════════════════════════════════════════════

#[test]
fn cpu_mode_runs_to_completion() {
    let dir = TempDir::new().expect("tempdir");
    let trace = write_trace(&dir, "cpu.trace", "2 0x0\n1 0x40\n3 0x80\n");

    let mut cfg = Config::default();
    cfg.mode = SimMode::Cpu;
    cfg.traces = vec![trace];
    cfg.stats_path = Some(dir.path().join("out.stats"));

    let summary = sim::run(&cfg).expect("run");
    assert!(summary.cycles > 0);
    assert!(summary.ipc > 0.0, "bubbles and reads retired");
    assert_eq!(summary.reads, 3);

    let stats = std::fs::read_to_string(dir.path().join("out.stats")).expect("stats written");
    assert!(stats.contains("cpu_instructions"));
    assert!(stats.contains("memory_access_cycles"));
}

#[test]
fn cpu_mode_without_traces_is_a_config_error() {
    let mut cfg = Config::default();
    cfg.mode = SimMode::Cpu;
    cfg.stats_path = Some(std::env::temp_dir().join("memsim-no-trace.stats"));
    assert!(sim::run(&cfg).is_err());
}
