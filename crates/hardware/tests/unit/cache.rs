//! Inclusive cache hierarchy: MSHR behavior, LRU, inclusion, writeback.

use memsim_core::cache::{CacheLevel, Hierarchy};
use memsim_core::request::{Request, RequestKind};

const L3_SIZE: usize = 1 << 23;
const ASSOC: usize = 8;
const BLOCK: usize = 64;
const MSHR: usize = 16;

/// Stride that lands successive addresses in the same L3 set with distinct
/// tags: sets (16384) times the block size.
const L3_SET_STRIDE: i64 = (L3_SIZE as i64 / (BLOCK as i64 * ASSOC as i64)) * BLOCK as i64;

fn l3_only() -> (Hierarchy, usize) {
    let mut h = Hierarchy::new();
    let l3 = h.add_cache(CacheLevel::L3, L3_SIZE, ASSOC, BLOCK, MSHR, None);
    (h, l3)
}

fn full_hierarchy() -> (Hierarchy, usize, usize, usize) {
    let mut h = Hierarchy::new();
    let l3 = h.add_cache(CacheLevel::L3, L3_SIZE, ASSOC, BLOCK, MSHR, None);
    let l2 = h.add_cache(CacheLevel::L2, 1 << 18, ASSOC, BLOCK, MSHR, Some(l3));
    let l1 = h.add_cache(CacheLevel::L1, 1 << 15, ASSOC, BLOCK, MSHR, Some(l2));
    (h, l1, l2, l3)
}

fn read(addr: i64) -> Request {
    Request::new(addr, RequestKind::Read, 0)
}

fn write(addr: i64) -> Request {
    Request::new(addr, RequestKind::Write, 0)
}

/// Drains the wait list for `cycles`, collecting everything sent to memory.
fn drain(h: &mut Hierarchy, cycles: usize) -> (Vec<Request>, Vec<Request>) {
    let mut to_memory = Vec::new();
    let mut completed = Vec::new();
    for _ in 0..cycles {
        let mut send = |req: Request| {
            to_memory.push(req);
            Ok(())
        };
        completed.append(&mut h.tick(&mut send));
    }
    (to_memory, completed)
}

// ══════════════════════════════════════════════════════════
// 1. Miss allocates a locked line and one MSHR entry
// ══════════════════════════════════════════════════════════

#[test]
fn miss_allocates_locked_line() {
    let (mut h, l3) = l3_only();
    h.send(l3, read(0x1000)).expect("accepted");
    assert_eq!(h.cache(l3).mshr_len(), 1);
    let line = h.cache(l3).lookup(0x1000).expect("line allocated");
    assert!(line.lock);
    assert!(!line.dirty);

    let (to_memory, _) = drain(&mut h, 60);
    assert_eq!(to_memory.len(), 1, "exactly one fill goes to memory");
    assert_eq!(to_memory[0].kind, RequestKind::Read);
}

// ══════════════════════════════════════════════════════════
// 2. Write coalescing: one fill, dirty line after completion
// ══════════════════════════════════════════════════════════

#[test]
fn coalesced_writes_issue_one_fill() {
    let (mut h, l3) = l3_only();
    h.send(l3, write(0x2000)).expect("accepted");
    h.send(l3, write(0x2008)).expect("accepted, same 64-byte block");
    assert_eq!(h.cache(l3).mshr_len(), 1, "second write coalesced");
    assert_eq!(h.cache(l3).mshr_coalesced, 1);

    let (to_memory, _) = drain(&mut h, 60);
    assert_eq!(to_memory.len(), 1, "one downstream fill for both writes");

    h.callback(l3, &to_memory[0]);
    assert_eq!(h.cache(l3).mshr_len(), 0);
    let line = h.cache(l3).lookup(0x2000).expect("line resident");
    assert!(!line.lock, "fill completion unlocked the line");
    assert!(line.dirty, "write-allocate kept the dirty bit");
}

// ══════════════════════════════════════════════════════════
// 3. Back-to-back reads: miss then hit
// ══════════════════════════════════════════════════════════

#[test]
fn second_access_hits_after_fill() {
    let (mut h, l3) = l3_only();
    h.send(l3, read(0x3000)).expect("accepted");
    let (to_memory, _) = drain(&mut h, 60);
    h.callback(l3, &to_memory[0]);

    h.send(l3, read(0x3010)).expect("accepted");
    assert_eq!(h.cache(l3).hits, 1);
    let (_, completed) = drain(&mut h, 60);
    assert_eq!(completed.len(), 1, "hit completes after its latency");
    assert!(completed[0].depart > 0);
}

// ══════════════════════════════════════════════════════════
// 4. Rejection: full MSHR, fully locked set
// ══════════════════════════════════════════════════════════

#[test]
fn full_mshr_rejects() {
    let (mut h, l3) = l3_only();
    for i in 0..MSHR as i64 {
        h.send(l3, read(i * BLOCK as i64)).expect("accepted");
    }
    let r = h.send(l3, read(MSHR as i64 * BLOCK as i64));
    assert!(r.is_err(), "17th outstanding miss bounces");
    assert_eq!(h.cache(l3).mshr_unavailable, 1);
}

#[test]
fn fully_locked_set_rejects() {
    let (mut h, l3) = l3_only();
    for i in 0..ASSOC as i64 {
        h.send(l3, read(i * L3_SET_STRIDE)).expect("accepted");
    }
    let r = h.send(l3, read(ASSOC as i64 * L3_SET_STRIDE));
    assert!(r.is_err(), "every way locked: no victim available");
    assert_eq!(h.cache(l3).set_locked, 1);
    // The rejected request keeps its original kind for the retry.
    let r2 = h.send(l3, write(ASSOC as i64 * L3_SET_STRIDE));
    let rejected = r2.expect_err("still locked");
    assert_eq!(rejected.kind, RequestKind::Write);

    // Once one fill completes, its line unlocks and the retry goes through.
    h.callback(l3, &read(0));
    h.send(l3, rejected).expect("victim available after the fill");
}

// ══════════════════════════════════════════════════════════
// 5. Inclusive eviction: upper copies erased, dirty written back
// ══════════════════════════════════════════════════════════

#[test]
fn l3_eviction_invalidates_upward_and_writes_back() {
    let (mut h, l1, l2, l3) = full_hierarchy();

    // Fill block 0 through the whole hierarchy and complete the fill.
    h.send(l1, read(0)).expect("accepted");
    let (to_memory, _) = drain(&mut h, 60);
    assert_eq!(to_memory.len(), 1);
    h.callback(l3, &to_memory[0]);
    assert!(h.cache(l1).lookup(0).is_some_and(|l| !l.lock));
    assert!(h.cache(l2).lookup(0).is_some_and(|l| !l.lock));
    assert!(h.cache(l3).lookup(0).is_some_and(|l| !l.lock));

    // Dirty the block in L1 only.
    h.send(l1, write(8)).expect("hit");
    assert!(h.cache(l1).lookup(0).is_some_and(|l| l.dirty));
    assert!(h.cache(l3).lookup(0).is_some_and(|l| !l.dirty));

    // Crowd block 0 out of its L3 set: it is the only unlocked line once
    // seven more misses land, so the eighth eviction victimizes it.
    for i in 1..=ASSOC as i64 {
        h.send(l3, read(i * L3_SET_STRIDE)).expect("accepted");
    }

    assert!(h.cache(l1).lookup(0).is_none(), "inclusion erased the L1 copy");
    assert!(h.cache(l2).lookup(0).is_none(), "inclusion erased the L2 copy");
    assert!(h.cache(l3).lookup(0).is_none(), "victim left the L3");
    assert!(h.cache(l1).invalidations >= 1);

    // The dirty bit collected on the way up turns into a memory write.
    let (to_memory, _) = drain(&mut h, 400);
    let wb = to_memory
        .iter()
        .find(|r| r.kind == RequestKind::Write)
        .expect("writeback reaches memory");
    assert_eq!(wb.addr, 0);
}

// ══════════════════════════════════════════════════════════
// 6. Fill completion unlocks every level
// ══════════════════════════════════════════════════════════

#[test]
fn callback_unlocks_the_whole_path() {
    let (mut h, l1, l2, l3) = full_hierarchy();
    h.send(l1, read(0x4000)).expect("accepted");
    assert_eq!(h.cache(l1).mshr_len(), 1);
    assert_eq!(h.cache(l2).mshr_len(), 1);
    assert_eq!(h.cache(l3).mshr_len(), 1);

    let (to_memory, _) = drain(&mut h, 60);
    h.callback(l3, &to_memory[0]);
    for id in [l1, l2, l3] {
        assert_eq!(h.cache(id).mshr_len(), 0);
        assert!(h.cache(id).lookup(0x4000).is_some_and(|l| !l.lock));
    }
}

// ══════════════════════════════════════════════════════════
// 7. Backpressure from memory keeps the wait list intact
// ══════════════════════════════════════════════════════════

#[test]
fn wait_list_retries_on_rejection() {
    let (mut h, l3) = l3_only();
    h.send(l3, read(0x5000)).expect("accepted");

    // Memory refuses for a while; the entry must survive and retry.
    let mut refused = 0;
    for _ in 0..80 {
        let mut send = |req: Request| {
            refused += 1;
            Err(req)
        };
        let _ = h.tick(&mut send);
    }
    assert!(refused > 1, "the same miss retried");
    assert_eq!(h.pending(), 1);

    let (to_memory, _) = drain(&mut h, 10);
    assert_eq!(to_memory.len(), 1, "accepted once memory relents");
}
