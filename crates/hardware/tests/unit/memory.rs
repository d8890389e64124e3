//! Address mapping and channel fanout.

use std::sync::Arc;

use proptest::prelude::*;

use memsim_core::config::{Config, TranslationKind};
use memsim_core::dram::standards::ddr3::Ddr3;
use memsim_core::dram::DramSpec;
use memsim_core::memory::Memory;
use memsim_core::request::{Request, RequestKind};

fn memory(channels: usize, ranks: usize, cfg: &Config) -> Memory<Ddr3> {
    let spec = Arc::new(Ddr3::new("DDR3_2Gb_x8", "DDR3_1600K", channels, ranks).expect("preset"));
    Memory::new(spec, cfg).expect("power-of-two organization")
}

// Address layout for DDR3_2Gb_x8 with 2 channels, 1 rank, from LSB:
// 6 tx bits, 1 channel bit, 0 rank bits, 3 bank bits, 15 row bits,
// 4 column-high bits.

// ══════════════════════════════════════════════════════════
// 1. Bit slicing
// ══════════════════════════════════════════════════════════

#[test]
fn map_addr_slices_lowest_bits_first() {
    let cfg = Config::default();
    let mem = memory(2, 1, &cfg);

    assert_eq!(mem.map_addr(0), vec![0, 0, 0, 0, 0]);
    assert_eq!(mem.map_addr(1 << 6)[0], 1, "channel sits above the tx bits");
    assert_eq!(mem.map_addr(1 << 7)[2], 1, "bank sits above the channel");
    assert_eq!(mem.map_addr(1 << 10)[3], 1, "row sits above the banks");
    assert_eq!(mem.map_addr(1 << 25)[4], 1, "column-high sits above the rows");
}

#[test]
fn map_addr_ignores_tx_offset() {
    let cfg = Config::default();
    let mem = memory(2, 1, &cfg);
    assert_eq!(mem.map_addr(0x00), mem.map_addr(0x3f), "same transaction");
    assert_ne!(mem.map_addr(0x00), mem.map_addr(0x40));
}

proptest! {
    #[test]
    fn mapped_fields_stay_in_bounds(addr in 0i64..(1i64 << 40)) {
        let cfg = Config::default();
        let mem = memory(2, 2, &cfg);
        let spec = Arc::new(Ddr3::new("DDR3_2Gb_x8", "DDR3_1600K", 2, 2).expect("preset"));
        let vec = mem.map_addr(addr);
        for (level, &count) in spec.org().count.iter().enumerate() {
            if count > 0 {
                prop_assert!(vec[level] >= 0 && vec[level] < count,
                    "level {} value {} out of 0..{}", level, vec[level], count);
            }
        }
    }
}

// ══════════════════════════════════════════════════════════
// 2. Fanout and backpressure
// ══════════════════════════════════════════════════════════

#[test]
fn send_routes_by_channel_bits() {
    let cfg = Config::default();
    let mut mem = memory(2, 1, &cfg);
    mem.send(Request::new(0, RequestKind::Read, 0)).expect("accepted");
    mem.send(Request::new(1 << 6, RequestKind::Read, 0)).expect("accepted");
    assert_eq!(mem.ctrls[0].pending_requests(), 1);
    assert_eq!(mem.ctrls[1].pending_requests(), 1);
    assert_eq!(mem.pending_requests(), 2);
}

#[test]
fn inflight_limit_rejects_excess() {
    let mut cfg = Config::default();
    cfg.inflight_limit = 2;
    let mut mem = memory(1, 1, &cfg);
    mem.send(Request::new(0x000, RequestKind::Read, 0)).expect("accepted");
    mem.send(Request::new(0x100, RequestKind::Read, 0)).expect("accepted");
    let third = mem.send(Request::new(0x200, RequestKind::Read, 0));
    assert!(third.is_err(), "in-flight bound enforced");
}

#[test]
fn requests_complete_through_tick() {
    let cfg = Config::default();
    let mut mem = memory(1, 1, &cfg);
    mem.send(Request::new(0x40, RequestKind::Read, 3)).expect("accepted");
    let mut done = Vec::new();
    for _ in 0..200 {
        done.append(&mut mem.tick());
    }
    assert_eq!(done.len(), 1);
    assert_eq!(done[0].coreid, 3, "completion carries the owner back");
    assert!(done[0].depart > done[0].arrive);
    assert_eq!(mem.pending_requests(), 0);
}

// ══════════════════════════════════════════════════════════
// 3. Random translation is deterministic per construction
// ══════════════════════════════════════════════════════════

#[test]
fn random_translation_is_reproducible() {
    let mut cfg = Config::default();
    cfg.translation = TranslationKind::Random;
    let mut a = memory(1, 1, &cfg);
    let mut b = memory(1, 1, &cfg);
    for page in 0..16i64 {
        let addr = page << 12;
        a.send(Request::new(addr, RequestKind::Read, 0)).expect("accepted");
        b.send(Request::new(addr, RequestKind::Read, 0)).expect("accepted");
    }
    let avecs: Vec<_> = a.ctrls[0].readq.q.iter().map(|r| r.addr_vec.clone()).collect();
    let bvecs: Vec<_> = b.ctrls[0].readq.q.iter().map(|r| r.addr_vec.clone()).collect();
    assert_eq!(avecs, bvecs, "same seed, same frame assignment");
}
