//! Inclusive multi-level cache hierarchy.
//!
//! All cache levels live in one arena owned by [`Hierarchy`], linked by ids;
//! recursion between levels (fills downward, invalidation upward) walks the
//! arena explicitly. It provides:
//! 1. **Lookup:** set-associative LRU, list position encoding recency.
//! 2. **MSHR:** block-aligned miss tracking with write coalescing; the MSHR
//!    entry is the authoritative in-flight state, lines carry the lock bit.
//! 3. **Inclusion:** eviction at a lower level erases upper copies and folds
//!    their dirty bits into the writeback decision.
//! 4. **Tick:** drains the miss wait-list into memory (retrying on
//!    backpressure) and completes delayed hits.

use std::collections::HashMap;

use crate::request::{Request, RequestKind};
use crate::stats::StatsWriter;

/// Lookup latency of each level by itself.
const LATENCY_EACH: [i64; 3] = [4, 12, 31];
/// Accumulated latency from the core down to each level.
const LATENCY: [i64; 3] = [4, 16, 47];

/// Cache level position.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CacheLevel {
    /// Per-core first level.
    L1,
    /// Per-core second level.
    L2,
    /// Shared last level.
    L3,
}

impl CacheLevel {
    /// Dense index of the level.
    pub fn index(self) -> usize {
        self as usize
    }
}

/// One cache line. `lock` means a fill is in flight and the line cannot hit,
/// though it still occupies its way.
#[derive(Clone, Debug)]
pub struct Line {
    /// Address that installed the line.
    pub addr: i64,
    /// Tag within its set.
    pub tag: i64,
    /// True while the fill is outstanding.
    pub lock: bool,
    /// True once a write has touched the block.
    pub dirty: bool,
}

/// One set-associative cache level.
pub struct Cache {
    /// Position in the hierarchy.
    pub level: CacheLevel,
    assoc: usize,
    block_size: i64,
    index_mask: i64,
    index_offset: u32,
    tag_offset: u32,
    mshr_entry_num: usize,
    mshr: Vec<i64>,
    // Line order within a set is the LRU order: least recent at the front.
    sets: HashMap<i64, Vec<Line>>,
    lower: Option<usize>,
    higher: Vec<usize>,

    /// Lookup hits.
    pub hits: u64,
    /// Lookup misses (including coalesced ones).
    pub misses: u64,
    /// Misses absorbed by an in-flight MSHR entry.
    pub mshr_coalesced: u64,
    /// Rejections due to a full MSHR.
    pub mshr_unavailable: u64,
    /// Rejections because every way in the set was locked.
    pub set_locked: u64,
    /// Victim lines evicted.
    pub evictions: u64,
    /// Dirty last-level evictions turned into memory writes.
    pub writebacks: u64,
    /// Lines erased by inclusive invalidation.
    pub invalidations: u64,
}

impl Cache {
    fn new(
        level: CacheLevel,
        size: usize,
        assoc: usize,
        block_size: usize,
        mshr_entry_num: usize,
        lower: Option<usize>,
    ) -> Self {
        assert!(size.is_power_of_two(), "cache size must be a power of two");
        assert!(block_size.is_power_of_two(), "block size must be a power of two");
        assert!(assoc.is_power_of_two(), "associativity must be a power of two");
        assert!(size >= block_size, "cache smaller than one block");
        let block_num = size / (block_size * assoc);
        let index_offset = (block_size as u64).trailing_zeros();
        let tag_offset = (block_num as u64).trailing_zeros() + index_offset;
        Self {
            level,
            assoc,
            block_size: block_size as i64,
            index_mask: block_num as i64 - 1,
            index_offset,
            tag_offset,
            mshr_entry_num,
            mshr: Vec::new(),
            sets: HashMap::new(),
            lower,
            higher: Vec::new(),
            hits: 0,
            misses: 0,
            mshr_coalesced: 0,
            mshr_unavailable: 0,
            set_locked: 0,
            evictions: 0,
            writebacks: 0,
            invalidations: 0,
        }
    }

    fn index(&self, addr: i64) -> i64 {
        (addr >> self.index_offset) & self.index_mask
    }

    fn tag(&self, addr: i64) -> i64 {
        addr >> self.tag_offset
    }

    /// Block-aligns an address.
    pub fn align(&self, addr: i64) -> i64 {
        addr & !(self.block_size - 1)
    }

    /// The resident line holding `addr`, if any.
    pub fn lookup(&self, addr: i64) -> Option<&Line> {
        self.sets
            .get(&self.index(addr))?
            .iter()
            .find(|l| l.tag == self.tag(addr))
    }

    /// Outstanding MSHR entries.
    pub fn mshr_len(&self) -> usize {
        self.mshr.len()
    }

    /// Number of lines currently resident in the set holding `addr`.
    pub fn set_occupancy(&self, addr: i64) -> usize {
        self.sets.get(&self.index(addr)).map_or(0, Vec::len)
    }
}

/// Arena of cache levels plus the shared miss/hit drain lists.
pub struct Hierarchy {
    caches: Vec<Cache>,
    /// Cache-system clock.
    pub clk: i64,
    wait_list: Vec<(i64, Request)>,
    hit_list: Vec<(i64, Request)>,
}

impl Default for Hierarchy {
    fn default() -> Self {
        Self::new()
    }
}

impl Hierarchy {
    /// Creates an empty hierarchy.
    pub fn new() -> Self {
        Self {
            caches: Vec::new(),
            clk: 0,
            wait_list: Vec::new(),
            hit_list: Vec::new(),
        }
    }

    /// Adds a cache level wired above `lower` (or talking to memory when
    /// `lower` is `None`) and returns its id.
    pub fn add_cache(
        &mut self,
        level: CacheLevel,
        size: usize,
        assoc: usize,
        block_size: usize,
        mshr_entry_num: usize,
        lower: Option<usize>,
    ) -> usize {
        let id = self.caches.len();
        if let Some(l) = lower {
            self.caches[l].higher.push(id);
        }
        self.caches
            .push(Cache::new(level, size, assoc, block_size, mshr_entry_num, lower));
        id
    }

    /// Immutable view of one cache level.
    pub fn cache(&self, id: usize) -> &Cache {
        &self.caches[id]
    }

    /// Entries queued toward memory plus delayed hits.
    pub fn pending(&self) -> usize {
        self.wait_list.len() + self.hit_list.len()
    }

    /// Presents `req` to cache `id`.
    ///
    /// Hits reorder the line to most-recent and schedule completion after the
    /// level's accumulated latency. Misses allocate a locked line and an MSHR
    /// entry, converting writes to fills; a full MSHR or a fully locked set
    /// rejects the request for the caller to retry.
    pub fn send(&mut self, id: usize, mut req: Request) -> Result<(), Request> {
        let (index, tag, align, level_idx, assoc, mshr_cap, lower) = {
            let c = &self.caches[id];
            (
                c.index(req.addr),
                c.tag(req.addr),
                c.align(req.addr),
                c.level.index(),
                c.assoc,
                c.mshr_entry_num,
                c.lower,
            )
        };

        {
            let c = &mut self.caches[id];
            let lines = c.sets.entry(index).or_default();
            if let Some(pos) = lines.iter().position(|l| l.tag == tag && !l.lock) {
                let mut line = lines.remove(pos);
                line.dirty |= req.kind == RequestKind::Write;
                lines.push(line);
                c.hits += 1;
                tracing::trace!(level = ?c.level, addr = req.addr, "cache hit");
                self.hit_list.push((self.clk + LATENCY[level_idx], req));
                return Ok(());
            }
            c.misses += 1;
        }

        let orig_kind = req.kind;
        let dirty = req.kind == RequestKind::Write;
        if req.kind == RequestKind::Write {
            // Write-allocate: the fill travels downstream as a read.
            req.kind = RequestKind::Read;
        }

        {
            let c = &mut self.caches[id];
            if c.mshr.contains(&align) {
                let lines = c.sets.get_mut(&index).expect("MSHR entry without a set");
                let line = lines
                    .iter_mut()
                    .find(|l| l.tag == tag)
                    .expect("MSHR entry without its locked line");
                debug_assert!(line.lock, "MSHR-referenced line must be locked");
                line.dirty |= dirty;
                c.mshr_coalesced += 1;
                return Ok(());
            }
            if c.mshr.len() == mshr_cap {
                c.mshr_unavailable += 1;
                req.kind = orig_kind;
                return Err(req);
            }
            let lines = c.sets.entry(index).or_default();
            if lines.len() == assoc && lines.iter().all(|l| l.lock) {
                c.set_locked += 1;
                req.kind = orig_kind;
                return Err(req);
            }
            debug_assert!(
                lines.iter().all(|l| l.tag != tag),
                "miss with a matching resident tag"
            );
        }

        let needs_eviction = self.caches[id].sets[&index].len() == assoc;
        if needs_eviction {
            let victim = {
                let lines = self.caches[id].sets.get_mut(&index).expect("set exists");
                let pos = lines
                    .iter()
                    .position(|l| !l.lock)
                    .expect("unlocked victim was just checked");
                lines.remove(pos)
            };
            self.evict(id, victim);
        }

        {
            let c = &mut self.caches[id];
            let lines = c.sets.entry(index).or_default();
            lines.push(Line {
                addr: req.addr,
                tag,
                lock: true,
                dirty,
            });
            c.mshr.push(align);
            tracing::trace!(level = ?c.level, addr = req.addr, "cache miss allocated");
        }

        if let Some(lower) = lower {
            let _ = self.send(lower, req);
        } else {
            self.wait_list.push((self.clk + LATENCY[level_idx], req));
        }
        Ok(())
    }

    /// Evicts `victim` (already removed from its set at `id`): invalidates
    /// upper copies, then either refreshes the lower level's copy or, at the
    /// last level, schedules a dirty writeback toward memory.
    fn evict(&mut self, id: usize, victim: Line) {
        let level_idx = self.caches[id].level.index();
        let addr = victim.addr;
        let mut dirty = victim.dirty;
        let mut invalidate_time = 0i64;
        let higher = self.caches[id].higher.clone();
        for h in higher {
            let (delay, upper_dirty) = self.invalidate(h, addr);
            invalidate_time = invalidate_time
                .max(delay + if upper_dirty { LATENCY_EACH[level_idx] } else { 0 });
            dirty |= upper_dirty;
        }
        self.caches[id].evictions += 1;
        tracing::trace!(level = ?self.caches[id].level, addr, dirty, "evict");
        if let Some(lower) = self.caches[id].lower {
            self.evictline(lower, addr, dirty);
        } else if dirty {
            let wb = Request::writeback(self.caches[id].align(addr));
            self.wait_list
                .push((self.clk + invalidate_time + LATENCY[level_idx], wb));
            self.caches[id].writebacks += 1;
        }
    }

    /// Erases `addr` here and recursively above, returning the accumulated
    /// delay (doubled along paths that returned dirty data) and whether any
    /// erased copy was dirty.
    fn invalidate(&mut self, id: usize, addr: i64) -> (i64, bool) {
        let (index, tag, level_idx) = {
            let c = &self.caches[id];
            (c.index(addr), c.tag(addr), c.level.index())
        };
        let delay = LATENCY_EACH[level_idx];
        let line = {
            let c = &mut self.caches[id];
            let Some(lines) = c.sets.get_mut(&index) else {
                return (0, false);
            };
            if lines.is_empty() {
                return (0, false);
            }
            let Some(pos) = lines.iter().position(|l| l.tag == tag) else {
                // Not here, so not above either.
                return (delay, false);
            };
            debug_assert!(!lines[pos].lock, "invalidation reached an in-flight line");
            c.invalidations += 1;
            lines.remove(pos)
        };
        let mut dirty = line.dirty;
        let mut max_delay = delay;
        let higher = self.caches[id].higher.clone();
        for h in higher {
            let (d, upper_dirty) = self.invalidate(h, addr);
            max_delay = max_delay.max(delay + if upper_dirty { d * 2 } else { d });
            dirty |= upper_dirty;
        }
        (max_delay, dirty)
    }

    /// Refreshes the lower-level copy of an evicted block: bumps it to
    /// most-recent and folds in the upper level's dirty bit.
    fn evictline(&mut self, id: usize, addr: i64, dirty: bool) {
        let (index, tag) = {
            let c = &self.caches[id];
            (c.index(addr), c.tag(addr))
        };
        let c = &mut self.caches[id];
        let lines = c
            .sets
            .get_mut(&index)
            .expect("inclusion violated: lower level lost the set");
        let pos = lines
            .iter()
            .position(|l| l.tag == tag)
            .expect("inclusion violated: lower level lost the block");
        let mut line = lines.remove(pos);
        line.dirty |= dirty;
        lines.push(line);
    }

    /// Completes a fill at cache `id`: clears the lock on the referenced
    /// line, retires the MSHR entry, and repeats at every level above.
    pub fn callback(&mut self, id: usize, req: &Request) {
        let (index, tag, align) = {
            let c = &self.caches[id];
            (c.index(req.addr), c.tag(req.addr), c.align(req.addr))
        };
        {
            let c = &mut self.caches[id];
            if let Some(pos) = c.mshr.iter().position(|&a| a == align) {
                c.mshr.remove(pos);
                if let Some(line) = c
                    .sets
                    .get_mut(&index)
                    .and_then(|lines| lines.iter_mut().find(|l| l.tag == tag))
                {
                    line.lock = false;
                }
            }
        }
        let higher = self.caches[id].higher.clone();
        for h in higher {
            self.callback(h, req);
        }
    }

    /// Advances one cycle: pushes due misses to memory (keeping rejected ones
    /// for retry) and returns the hits whose latency has elapsed.
    pub fn tick(
        &mut self,
        send_memory: &mut dyn FnMut(Request) -> Result<(), Request>,
    ) -> Vec<Request> {
        self.clk += 1;

        let mut i = 0;
        while i < self.wait_list.len() && self.clk >= self.wait_list[i].0 {
            let (due, req) = self.wait_list.remove(i);
            match send_memory(req) {
                Ok(()) => {}
                Err(req) => {
                    self.wait_list.insert(i, (due, req));
                    i += 1;
                }
            }
        }

        let mut done = Vec::new();
        let mut j = 0;
        while j < self.hit_list.len() {
            if self.clk >= self.hit_list[j].0 {
                let (_, mut req) = self.hit_list.remove(j);
                req.depart = self.clk;
                done.push(req);
            } else {
                j += 1;
            }
        }
        done
    }

    /// Emits per-level statistics under `prefix`.
    pub fn report(&self, prefix: &str, w: &mut StatsWriter) {
        for (i, c) in self.caches.iter().enumerate() {
            let name = format!("{prefix}.{:?}_{i}", c.level);
            w.emit_u64(&format!("{name}.hits"), c.hits, "cache hits");
            w.emit_u64(&format!("{name}.misses"), c.misses, "cache misses");
            w.emit_u64(&format!("{name}.mshr_coalesced"), c.mshr_coalesced, "misses merged into an in-flight fill");
            w.emit_u64(&format!("{name}.mshr_unavailable"), c.mshr_unavailable, "rejections on a full MSHR");
            w.emit_u64(&format!("{name}.set_locked"), c.set_locked, "rejections with every way locked");
            w.emit_u64(&format!("{name}.evictions"), c.evictions, "victim lines evicted");
            w.emit_u64(&format!("{name}.writebacks"), c.writebacks, "dirty last-level evictions written back");
            w.emit_u64(&format!("{name}.invalidations"), c.invalidations, "lines erased by inclusive invalidation");
        }
    }
}
