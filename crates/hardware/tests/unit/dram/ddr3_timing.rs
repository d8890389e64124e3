//! DDR3 command sequencing through the controller.
//!
//! Exercises the canonical single-read, row-hit-streak, and row-conflict
//! sequences, write handling, refresh interleaving, and the row policies,
//! checking both the command mnemonics and their spacing against the
//! DDR3_1600K grade (nRCD 11, nCCD 4, nRAS 28, nRP 11, nCL 11, nBL 4).

use std::sync::Arc;

use memsim_core::config::Config;
use memsim_core::controller::rowpolicy::RowPolicyKind;
use memsim_core::controller::Controller;
use memsim_core::dram::standards::ddr3::Ddr3;
use memsim_core::request::{Request, RequestKind};

fn spec() -> Arc<Ddr3> {
    Arc::new(Ddr3::new("DDR3_2Gb_x8", "DDR3_1600K", 1, 1).expect("preset"))
}

fn tracing_config() -> Config {
    let mut cfg = Config::default();
    cfg.record_cmd_trace = true;
    cfg
}

fn controller(cfg: &Config) -> Controller<Ddr3> {
    Controller::new(spec(), 0, cfg)
}

fn read(addr: i64, bank: i64, row: i64, col: i64) -> Request {
    let mut req = Request::new(addr, RequestKind::Read, 0);
    req.addr_vec = vec![0, 0, bank, row, col];
    req
}

fn write(addr: i64, bank: i64, row: i64, col: i64) -> Request {
    let mut req = Request::new(addr, RequestKind::Write, 0);
    req.addr_vec = vec![0, 0, bank, row, col];
    req
}

fn run(ctrl: &mut Controller<Ddr3>, cycles: usize) -> Vec<Request> {
    let mut done = Vec::new();
    for _ in 0..cycles {
        ctrl.tick();
        done.append(&mut ctrl.take_completed());
    }
    done
}

fn labels(ctrl: &Controller<Ddr3>) -> Vec<&'static str> {
    ctrl.cmd_trace.iter().map(|c| c.1).collect()
}

// ══════════════════════════════════════════════════════════
// 1. Single read to an idle bank: ACT, then RD after nRCD
// ══════════════════════════════════════════════════════════

#[test]
fn single_read_activate_then_read() {
    let cfg = tracing_config();
    let mut ctrl = controller(&cfg);
    ctrl.enqueue(read(0x40, 0, 0, 1)).expect("admitted");

    let done = run(&mut ctrl, 200);
    assert_eq!(done.len(), 1);
    assert_eq!(labels(&ctrl), vec!["ACT", "RD"]);

    let act_clk = ctrl.cmd_trace[0].0;
    let rd_clk = ctrl.cmd_trace[1].0;
    assert_eq!(rd_clk - act_clk, 11, "RD follows ACT by exactly nRCD");
    assert_eq!(done[0].depart, rd_clk + 15, "read latency is nCL + nBL");

    assert_eq!(ctrl.row_misses, 1);
    assert_eq!(ctrl.row_hits, 0);
    assert_eq!(ctrl.row_conflicts, 0);
}

// ══════════════════════════════════════════════════════════
// 2. Row-hit streak: one ACT, five RDs spaced by nCCD
// ══════════════════════════════════════════════════════════

#[test]
fn row_hit_streak() {
    let cfg = tracing_config();
    let mut ctrl = controller(&cfg);
    for i in 0..5 {
        ctrl.enqueue(read(i * 8, 0, 3, i)).expect("admitted");
    }

    let done = run(&mut ctrl, 200);
    assert_eq!(done.len(), 5);
    assert_eq!(labels(&ctrl), vec!["ACT", "RD", "RD", "RD", "RD", "RD"]);

    let rd_clks: Vec<i64> = ctrl.cmd_trace[1..].iter().map(|c| c.0).collect();
    for pair in rd_clks.windows(2) {
        assert!(pair[1] - pair[0] >= 4, "column accesses spaced by nCCD");
    }

    assert_eq!(ctrl.row_hits, 4);
    assert_eq!(ctrl.row_misses, 1);
    assert_eq!(ctrl.row_conflicts, 0);
}

// ══════════════════════════════════════════════════════════
// 3. Row conflict: PRE then re-ACT for the second row
// ══════════════════════════════════════════════════════════

#[test]
fn row_conflict_precharges_and_reactivates() {
    let cfg = tracing_config();
    let mut ctrl = controller(&cfg);
    ctrl.enqueue(read(0x00, 0, 0, 0)).expect("admitted");
    ctrl.enqueue(read(0x80, 0, 1, 0)).expect("admitted");

    let done = run(&mut ctrl, 200);
    assert_eq!(done.len(), 2);
    assert_eq!(labels(&ctrl), vec!["ACT", "RD", "PRE", "ACT", "RD"]);

    let act0 = ctrl.cmd_trace[0].0;
    let pre = ctrl.cmd_trace[2].0;
    let act1 = ctrl.cmd_trace[3].0;
    assert_eq!(pre - act0, 28, "PRE waits out nRAS");
    assert_eq!(act1 - pre, 11, "re-ACT waits out nRP");

    assert_eq!(ctrl.row_conflicts, 1);
    assert_eq!(ctrl.row_misses, 1);
}

// ══════════════════════════════════════════════════════════
// 4. Write handling: coalescing and read forwarding
// ══════════════════════════════════════════════════════════

#[test]
fn duplicate_write_coalesces() {
    let cfg = tracing_config();
    let mut ctrl = controller(&cfg);
    ctrl.enqueue(write(0x100, 0, 0, 4)).expect("admitted");
    ctrl.enqueue(write(0x100, 0, 0, 4)).expect("admitted");
    assert_eq!(ctrl.writeq.len(), 1, "second write absorbed");
    assert_eq!(ctrl.write_merges, 1);
    // The absorbed write completes immediately.
    assert_eq!(ctrl.take_completed().len(), 1);
}

#[test]
fn read_forwarded_from_write_queue() {
    let cfg = tracing_config();
    let mut ctrl = controller(&cfg);
    ctrl.enqueue(write(0x200, 0, 0, 8)).expect("admitted");
    ctrl.enqueue(read(0x200, 0, 0, 8)).expect("admitted");
    assert_eq!(ctrl.read_forwards, 1);

    let done = run(&mut ctrl, 300);
    let forwarded = done
        .iter()
        .find(|r| r.kind == RequestKind::Read)
        .expect("forwarded read completes");
    assert_eq!(forwarded.depart - forwarded.arrive, 1, "served from the queue");
}

// ══════════════════════════════════════════════════════════
// 5. Write-mode hysteresis at the 0.8 / 0.2 thresholds
// ══════════════════════════════════════════════════════════

#[test]
fn write_mode_hysteresis() {
    let cfg = tracing_config();
    let mut ctrl = controller(&cfg);
    // Conflicting reads on one bank keep the read queue occupied while the
    // write queue fills.
    for i in 0..3i64 {
        ctrl.enqueue(read(0x7000 + i * 64, 7, 100 + i, 0)).expect("admitted");
    }
    for i in 0..24i64 {
        ctrl.enqueue(write(i * 64, i % 8, i / 8, 0)).expect("admitted");
    }
    ctrl.tick();
    assert!(!ctrl.in_write_mode(), "24 of 32 stays under the 0.8 threshold");

    ctrl.enqueue(write(24 * 64, 0, 3, 0)).expect("admitted");
    ctrl.tick();
    assert!(ctrl.in_write_mode(), "25 of 32 crosses the 0.8 threshold");

    // Drain writes; the parked read keeps the queue from going empty, and
    // the controller leaves write mode at the 0.2 threshold.
    let mut left_at = None;
    for _ in 0..20_000 {
        ctrl.tick();
        let _ = ctrl.take_completed();
        if !ctrl.in_write_mode() {
            left_at = Some(ctrl.writeq.len());
            break;
        }
    }
    let remaining = left_at.expect("controller left write mode");
    assert!(remaining <= 6, "exit at or below the 0.2 threshold");
}

// ══════════════════════════════════════════════════════════
// 6. Refresh: one REF per rank per nREFI, reads resume after
// ══════════════════════════════════════════════════════════

#[test]
fn refresh_fires_once_per_interval() {
    let cfg = tracing_config();
    let mut ctrl = controller(&cfg);
    let _ = run(&mut ctrl, 6300); // nREFI = 6240
    let refs = labels(&ctrl).iter().filter(|l| **l == "REF").count();
    assert_eq!(refs, 1);
    assert!(ctrl.channel.total_refresh_cycles > 0);
}

#[test]
fn refresh_closes_open_rows_first() {
    let cfg = tracing_config();
    let mut ctrl = controller(&cfg);
    ctrl.enqueue(read(0x00, 0, 0, 0)).expect("admitted");
    let _ = run(&mut ctrl, 6300);

    let cmds = labels(&ctrl);
    let prea = cmds.iter().position(|l| *l == "PREA").expect("PREA issued");
    let refresh = cmds.iter().position(|l| *l == "REF").expect("REF issued");
    assert!(prea < refresh, "open bank precharged before refresh");

    // A read enqueued after the refresh window still completes legally.
    ctrl.enqueue(read(0x40, 0, 0, 1)).expect("admitted");
    let done = run(&mut ctrl, 400); // nRFC = 128
    assert_eq!(done.len(), 1);
}

// ══════════════════════════════════════════════════════════
// 7. Row policies
// ══════════════════════════════════════════════════════════

#[test]
fn closed_policy_precharges_idle_row() {
    let mut cfg = tracing_config();
    cfg.row_policy = RowPolicyKind::Closed;
    let mut ctrl = controller(&cfg);
    ctrl.enqueue(read(0x00, 0, 0, 0)).expect("admitted");

    let _ = run(&mut ctrl, 300);
    assert_eq!(labels(&ctrl), vec!["ACT", "RD", "PRE"]);
    assert!(ctrl.rowtable.is_empty(), "speculative precharge closed the row");
}

#[test]
fn closed_ap_policy_uses_autoprecharge() {
    let mut cfg = tracing_config();
    cfg.row_policy = RowPolicyKind::ClosedAp;
    let mut ctrl = controller(&cfg);
    ctrl.enqueue(read(0x00, 0, 0, 0)).expect("admitted");
    let done = run(&mut ctrl, 100);
    assert_eq!(done.len(), 1);
    assert_eq!(labels(&ctrl), vec!["ACT", "RDA"]);

    // The auto-precharge closed the bank: the next read misses again.
    ctrl.enqueue(read(0x40, 0, 0, 1)).expect("admitted");
    let _ = run(&mut ctrl, 200);
    assert_eq!(ctrl.row_misses, 2);
    assert_eq!(ctrl.row_hits, 0);
}

// ══════════════════════════════════════════════════════════
// 8. Admission bounds
// ══════════════════════════════════════════════════════════

#[test]
fn full_read_queue_rejects() {
    let cfg = Config::default();
    let mut ctrl = controller(&cfg);
    for i in 0..32i64 {
        ctrl.enqueue(read(i * 64, i % 8, i, 0)).expect("admitted");
    }
    let rejected = ctrl.enqueue(read(33 * 64, 0, 40, 0));
    assert!(rejected.is_err(), "33rd read bounces off the full queue");
}
