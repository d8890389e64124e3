//! Processor model: trace-driven cores in front of the memory system.
//!
//! Each core consumes one trace through a reorder window (depth 128, retire
//! width 4): bubbles retire immediately, reads occupy a slot until their
//! completion callback matches the slot's block address, writes are sent and
//! forgotten. It provides:
//! 1. **Window:** circular buffer with prefix-match ready marking.
//! 2. **Core:** trace consumption with backpressure-aware request issue.
//! 3. **Processor:** cache hierarchy wiring, completion routing, and the
//!    early-exit / all-finished termination modes.

/// Trace file readers.
pub mod trace;

use std::path::{Path, PathBuf};

use crate::cache::{CacheLevel, Hierarchy};
use crate::config::{CacheTopology, Config};
use crate::request::{Request, RequestKind};
use crate::stats::StatsWriter;

use self::trace::{Trace, TraceError};

/// Reorder window depth.
pub const WINDOW_DEPTH: usize = 128;
/// Instructions retired per cycle.
pub const WINDOW_IPC: usize = 4;

const L1_SIZE: usize = 1 << 15;
const L1_ASSOC: usize = 1 << 3;
const L1_BLOCK: usize = 1 << 6;
const L1_MSHR: usize = 16;

const L2_SIZE: usize = 1 << 18;
const L2_ASSOC: usize = 1 << 3;
const L2_BLOCK: usize = 1 << 6;
const L2_MSHR: usize = 16;

const L3_SIZE: usize = 1 << 23;
const L3_ASSOC: usize = 1 << 3;
const L3_BLOCK: usize = 1 << 6;
const MSHR_PER_CORE: usize = 16;

/// In-order reorder window over a circular buffer.
pub struct Window {
    /// Retire width per cycle.
    pub ipc: usize,
    /// Capacity.
    pub depth: usize,
    load: usize,
    head: usize,
    tail: usize,
    ready_list: Vec<bool>,
    addr_list: Vec<i64>,
}

impl Default for Window {
    fn default() -> Self {
        Self::new()
    }
}

impl Window {
    /// Creates an empty window with the default depth and retire width.
    pub fn new() -> Self {
        Self {
            ipc: WINDOW_IPC,
            depth: WINDOW_DEPTH,
            load: 0,
            head: 0,
            tail: 0,
            ready_list: vec![false; WINDOW_DEPTH],
            addr_list: vec![-1; WINDOW_DEPTH],
        }
    }

    /// True when no further instruction fits.
    pub fn is_full(&self) -> bool {
        self.load == self.depth
    }

    /// True when nothing is in flight.
    pub fn is_empty(&self) -> bool {
        self.load == 0
    }

    /// Occupied slots.
    pub fn load(&self) -> usize {
        self.load
    }

    /// Inserts an instruction at the head.
    pub fn insert(&mut self, ready: bool, addr: i64) {
        assert!(self.load < self.depth, "reorder window overflow");
        self.ready_list[self.head] = ready;
        self.addr_list[self.head] = addr;
        self.head = (self.head + 1) % self.depth;
        self.load += 1;
    }

    /// Retires up to `ipc` ready instructions from the tail, in order.
    pub fn retire(&mut self) -> i64 {
        let mut retired = 0;
        while self.load > 0 && retired < self.ipc {
            if !self.ready_list[self.tail] {
                break;
            }
            self.tail = (self.tail + 1) % self.depth;
            self.load -= 1;
            retired += 1;
        }
        retired as i64
    }

    /// Marks every slot whose masked address equals `addr & mask` as ready.
    pub fn set_ready(&mut self, addr: i64, mask: i64) {
        if self.load == 0 {
            return;
        }
        for i in 0..self.load {
            let idx = (self.tail + i) % self.depth;
            if (self.addr_list[idx] & mask) != (addr & mask) {
                continue;
            }
            self.ready_list[idx] = true;
        }
    }

    /// True while any slot waits on memory.
    pub fn has_unready(&self) -> bool {
        (0..self.load).any(|i| !self.ready_list[(self.tail + i) % self.depth])
    }
}

/// One trace-driven core.
pub struct Core {
    /// Core id; also the `coreid` stamped on its requests.
    pub id: usize,
    /// Core clock.
    pub clk: i64,
    /// Instructions retired.
    pub retired: i64,
    /// Cycles with a memory read outstanding in the window.
    pub memory_access_cycles: i64,
    /// Cache the core sends into (its L1, or the shared cache), if any.
    pub entry_cache: Option<usize>,
    /// Cache level whose callback unlocks this core's fills.
    pub last_level: Option<usize>,

    window: Window,
    trace: Trace,
    filtered: bool,
    bubble_cnt: i64,
    req_addr: i64,
    req_kind: RequestKind,
    more_reqs: bool,
}

impl Core {
    fn new(
        id: usize,
        trace_path: &Path,
        filtered: bool,
        entry_cache: Option<usize>,
        last_level: Option<usize>,
    ) -> Result<Self, TraceError> {
        let mut core = Self {
            id,
            clk: 0,
            retired: 0,
            memory_access_cycles: 0,
            entry_cache,
            last_level,
            window: Window::new(),
            trace: Trace::new(trace_path)?,
            filtered,
            bubble_cnt: 0,
            req_addr: -1,
            req_kind: RequestKind::Read,
            more_reqs: true,
        };
        core.fetch_next()?;
        Ok(core)
    }

    fn fetch_next(&mut self) -> Result<(), TraceError> {
        let record = if self.filtered {
            self.trace.get_filtered_request()?
        } else {
            self.trace.get_unfiltered_request()?
        };
        match record {
            Some(rec) => {
                self.bubble_cnt = rec.bubble_cnt;
                self.req_addr = rec.addr;
                self.req_kind = rec.kind;
            }
            None => self.more_reqs = false,
        }
        Ok(())
    }

    /// Advances one core cycle, retiring and inserting through `send`.
    pub fn tick(
        &mut self,
        send: &mut dyn FnMut(Request) -> Result<(), Request>,
    ) -> Result<(), TraceError> {
        self.clk += 1;
        self.retired += self.window.retire();
        if self.window.has_unready() {
            self.memory_access_cycles += 1;
        }
        if !self.more_reqs {
            return Ok(());
        }

        let mut inserted = 0;
        while self.bubble_cnt > 0 {
            if inserted == self.window.ipc || self.window.is_full() {
                return Ok(());
            }
            self.window.insert(true, -1);
            inserted += 1;
            self.bubble_cnt -= 1;
        }

        match self.req_kind {
            RequestKind::Read => {
                if inserted == self.window.ipc || self.window.is_full() {
                    return Ok(());
                }
                let req = Request::new(self.req_addr, RequestKind::Read, self.id);
                if send(req).is_err() {
                    return Ok(());
                }
                self.window.insert(false, self.req_addr);
            }
            RequestKind::Write => {
                let req = Request::new(self.req_addr, RequestKind::Write, self.id);
                if send(req).is_err() {
                    return Ok(());
                }
            }
            _ => unreachable!("trace records are reads or writes"),
        }
        self.fetch_next()
    }

    /// Completion delivery: marks every window slot in the same L1 block
    /// ready.
    pub fn receive(&mut self, req: &Request) {
        self.window.set_ready(req.addr, !(L1_BLOCK as i64 - 1));
    }

    /// True when the trace is exhausted and the window has drained.
    pub fn finished(&self) -> bool {
        !self.more_reqs && self.window.is_empty()
    }

    /// Retired instructions per cycle so far.
    pub fn calc_ipc(&self) -> f64 {
        if self.clk == 0 {
            0.0
        } else {
            self.retired as f64 / self.clk as f64
        }
    }
}

/// All cores plus the shared cache hierarchy.
pub struct Processor {
    /// The cores, one per trace.
    pub cores: Vec<Core>,
    /// Cache arena; `None` when every core talks to memory directly.
    pub hierarchy: Option<Hierarchy>,
    llc: Option<usize>,
    early_exit: bool,
    ipcs: Vec<f64>,
    /// Aggregate IPC, filled when the run finishes.
    pub ipc: f64,
}

impl Processor {
    /// Builds cores and the cache topology the configuration asks for.
    pub fn new(cfg: &Config, traces: &[PathBuf]) -> Result<Self, TraceError> {
        assert!(!traces.is_empty(), "cpu mode needs at least one trace");
        let cores_n = traces.len();
        let mut hierarchy = None;
        let mut llc = None;
        let mut per_core: Vec<(Option<usize>, Option<usize>)> = Vec::new();

        match cfg.cache {
            CacheTopology::All => {
                let mut h = Hierarchy::new();
                let l3 = h.add_cache(
                    CacheLevel::L3,
                    L3_SIZE,
                    L3_ASSOC,
                    L3_BLOCK,
                    MSHR_PER_CORE * cores_n,
                    None,
                );
                for _ in 0..cores_n {
                    let l2 = h.add_cache(CacheLevel::L2, L2_SIZE, L2_ASSOC, L2_BLOCK, L2_MSHR, Some(l3));
                    let l1 = h.add_cache(CacheLevel::L1, L1_SIZE, L1_ASSOC, L1_BLOCK, L1_MSHR, Some(l2));
                    per_core.push((Some(l1), Some(l3)));
                }
                hierarchy = Some(h);
                llc = Some(l3);
            }
            CacheTopology::L3 => {
                let mut h = Hierarchy::new();
                let l3 = h.add_cache(
                    CacheLevel::L3,
                    L3_SIZE,
                    L3_ASSOC,
                    L3_BLOCK,
                    MSHR_PER_CORE * cores_n,
                    None,
                );
                for _ in 0..cores_n {
                    per_core.push((Some(l3), Some(l3)));
                }
                hierarchy = Some(h);
                llc = Some(l3);
            }
            CacheTopology::L1L2 => {
                let mut h = Hierarchy::new();
                for _ in 0..cores_n {
                    let l2 = h.add_cache(CacheLevel::L2, L2_SIZE, L2_ASSOC, L2_BLOCK, L2_MSHR, None);
                    let l1 = h.add_cache(CacheLevel::L1, L1_SIZE, L1_ASSOC, L1_BLOCK, L1_MSHR, Some(l2));
                    per_core.push((Some(l1), Some(l2)));
                }
                hierarchy = Some(h);
            }
            CacheTopology::None => {
                for _ in 0..cores_n {
                    per_core.push((None, None));
                }
            }
        }

        // Filtered traces pair with configurations lacking core caches.
        let filtered = !matches!(cfg.cache, CacheTopology::All | CacheTopology::L1L2);
        let mut cores = Vec::with_capacity(cores_n);
        for (i, path) in traces.iter().enumerate() {
            let (entry, last) = per_core[i];
            cores.push(Core::new(i, path, filtered, entry, last)?);
        }

        Ok(Self {
            cores,
            hierarchy,
            llc,
            early_exit: cfg.early_exit,
            ipcs: vec![-1.0; cores_n],
            ipc: 0.0,
        })
    }

    /// Advances one CPU cycle: drains the cache system, then ticks every
    /// core.
    pub fn tick(
        &mut self,
        send_memory: &mut dyn FnMut(Request) -> Result<(), Request>,
    ) -> Result<(), TraceError> {
        let hits = match self.hierarchy.as_mut() {
            Some(h) => h.tick(send_memory),
            None => Vec::new(),
        };
        for req in hits {
            self.deliver(&req);
        }
        let hierarchy = &mut self.hierarchy;
        for core in &mut self.cores {
            match (hierarchy.as_mut(), core.entry_cache) {
                (Some(h), Some(entry)) => core.tick(&mut |req| h.send(entry, req))?,
                _ => core.tick(send_memory)?,
            }
        }
        Ok(())
    }

    /// Routes a completed request: unlocks cache fills and wakes the
    /// originating core's window.
    pub fn receive(&mut self, req: &Request) {
        self.deliver(req);
    }

    fn deliver(&mut self, req: &Request) {
        if !matches!(req.kind, RequestKind::Read | RequestKind::Extension) {
            return;
        }
        let start = self
            .cores
            .get(req.coreid)
            .and_then(|c| c.last_level)
            .or(self.llc);
        if let (Some(h), Some(start)) = (self.hierarchy.as_mut(), start) {
            h.callback(start, req);
        }
        if let Some(core) = self.cores.get_mut(req.coreid) {
            core.receive(req);
        }
    }

    /// Termination check; fills per-core and aggregate IPC on the way out.
    ///
    /// With early exit, the run ends as soon as the first core drains; all
    /// cores' IPCs are read at that instant. Otherwise every core must drain
    /// and each IPC is latched when its core finishes.
    pub fn finished(&mut self) -> bool {
        if self.early_exit {
            if self.cores.iter().any(Core::finished) {
                self.ipc = self.cores.iter().map(Core::calc_ipc).sum();
                return true;
            }
            false
        } else {
            for i in 0..self.cores.len() {
                if !self.cores[i].finished() {
                    return false;
                }
                if self.ipcs[i] < 0.0 {
                    self.ipcs[i] = self.cores[i].calc_ipc();
                    self.ipc += self.ipcs[i];
                }
            }
            true
        }
    }

    /// Largest core clock, the run's CPU cycle count.
    pub fn cpu_cycles(&self) -> i64 {
        self.cores.iter().map(|c| c.clk).max().unwrap_or(0)
    }

    /// Emits CPU-side statistics under `prefix`.
    pub fn report(&self, prefix: &str, w: &mut StatsWriter) {
        w.emit(&format!("{prefix}.cpu_cycles"), self.cpu_cycles(), "CPU cycles simulated");
        w.emit_f64(&format!("{prefix}.ipc"), self.ipc, 6, "aggregate instructions per cycle");
        for core in &self.cores {
            let name = format!("{prefix}.core_{}", core.id);
            w.emit(&format!("{name}.cpu_instructions"), core.retired, "instructions retired");
            w.emit(&format!("{name}.cpu_cycles"), core.clk, "cycles simulated");
            w.emit(
                &format!("{name}.memory_access_cycles"),
                core.memory_access_cycles,
                "cycles with a memory read outstanding",
            );
            w.emit_f64(&format!("{name}.ipc"), core.calc_ipc(), 6, "instructions per cycle");
        }
        if let Some(h) = &self.hierarchy {
            h.report(&format!("{prefix}.cache"), w);
        }
    }
}
