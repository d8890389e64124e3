//! Subarray-level parallelism: per-subarray row buffers and the
//! offending-subarray precharge.

use std::sync::Arc;

use memsim_core::dram::standards::salp::{Command, Salp};
use memsim_core::dram::spec::DramSpec;
use memsim_core::dram::Dram;

fn spec_with_limit(open_limit: usize) -> Arc<Salp> {
    Arc::new(Salp::new("SALP_4Gb_x8", "SALP_1600K", 1, 1, 8, open_limit).expect("preset"))
}

// Address vector layout: [channel, rank, bank, subarray, row, column].

// ══════════════════════════════════════════════════════════
// 1. Independent row buffers per subarray
// ══════════════════════════════════════════════════════════

#[test]
fn subarrays_hold_rows_independently() {
    let spec = spec_with_limit(4);
    let mut ch = Dram::new(spec, 0, 0);
    ch.update(Command::Act, &[0, 0, 0, 0, 3, 0], 0);
    ch.update(Command::Act, &[0, 0, 0, 1, 7, 0], 10);

    // Both rows stay open at once; reads to either decode directly.
    assert_eq!(ch.decode(Command::Rd, &[0, 0, 0, 0, 3, 0]), Command::Rd);
    assert_eq!(ch.decode(Command::Rd, &[0, 0, 0, 1, 7, 0]), Command::Rd);
    assert!(ch.check_row_hit(Command::Rd, &[0, 0, 0, 0, 3, 0]));
    assert!(ch.check_row_hit(Command::Rd, &[0, 0, 0, 1, 7, 0]));
}

#[test]
fn tree_has_subarray_level() {
    let spec = spec_with_limit(4);
    let ch = Dram::new(spec, 0, 0);
    assert_eq!(ch.children.len(), 1, "one rank");
    assert_eq!(ch.children[0].children.len(), 8, "eight banks");
    assert_eq!(ch.children[0].children[0].children.len(), 8, "eight subarrays");
}

// ══════════════════════════════════════════════════════════
// 2. Open-subarray bound forces PRE_OTHER
// ══════════════════════════════════════════════════════════

#[test]
fn exceeding_open_limit_decodes_pre_other() {
    let spec = spec_with_limit(1);
    let mut ch = Dram::new(Arc::clone(&spec), 0, 0);
    ch.update(Command::Act, &[0, 0, 0, 0, 3, 0], 0);

    // Subarray 1 is closed and the bank is at its open bound.
    let addr = [0, 0, 0, 1, 7, 0];
    assert_eq!(ch.decode(Command::Rd, &addr), Command::PreOther);

    // The precharge targets the *other* (open) subarray, row wildcarded.
    let offending = spec
        .alternate_addr_vec(&ch, Command::PreOther, &addr)
        .expect("PRE_OTHER redirects");
    assert_eq!(offending[3], 0, "offending subarray is the open one");
    assert_eq!(offending[4], -1, "row is wildcarded");

    // After the offending subarray closes, the activate proceeds.
    ch.update(Command::PreOther, &offending, 50);
    assert_eq!(ch.decode(Command::Rd, &addr), Command::Act);
}

#[test]
fn under_open_limit_activates_directly() {
    let spec = spec_with_limit(2);
    let mut ch = Dram::new(spec, 0, 0);
    ch.update(Command::Act, &[0, 0, 0, 0, 3, 0], 0);
    assert_eq!(ch.decode(Command::Rd, &[0, 0, 0, 1, 7, 0]), Command::Act);
}

// ══════════════════════════════════════════════════════════
// 3. PRE_OTHER honors the row cycle of its target
// ══════════════════════════════════════════════════════════

#[test]
fn pre_other_waits_out_tras() {
    let spec = spec_with_limit(1);
    let mut ch = Dram::new(Arc::clone(&spec), 0, 0);
    ch.update(Command::Act, &[0, 0, 0, 0, 3, 0], 0);

    let addr = [0, 0, 0, 1, 7, 0];
    let offending = spec
        .alternate_addr_vec(&ch, Command::PreOther, &addr)
        .expect("PRE_OTHER redirects");
    assert!(!ch.check(Command::PreOther, &offending, 27));
    assert!(ch.check(Command::PreOther, &offending, 28), "nRAS = 28");
}
