//! Top-level memory: address mapping and channel fanout.
//!
//! Splits the flat byte address into per-level indices (channel bits sit just
//! above the transaction offset, subarray bits at the top where the standard
//! has them), optionally randomizes page frames, and demultiplexes requests
//! onto the per-channel controllers.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::config::{Config, ConfigError, TranslationKind};
use crate::controller::Controller;
use crate::dram::spec::{DramSpec, LevelEnum};
use crate::request::{Request, RequestKind};
use crate::stats::StatsWriter;

const PAGE_SHIFT: u32 = 12;

/// Seed for the Random translation; fixed so runs are reproducible.
const TRANSLATION_SEED: u64 = 0x6d65_6d73_696d;

/// The memory system: one controller per channel plus the address mapper.
pub struct Memory<T: DramSpec> {
    spec: Arc<T>,
    /// Per-channel controllers, indexed by channel id.
    pub ctrls: Vec<Controller<T>>,

    addr_bits: Vec<u32>,
    mapping_order: Vec<usize>,
    tx_bits: u32,

    translation: TranslationKind,
    page_map: HashMap<i64, i64>,
    used_frames: HashSet<i64>,
    frame_count: i64,
    rng: StdRng,

    inflight_limit: usize,

    /// Accepted reads (and extensions).
    pub incoming_reads: u64,
    /// Accepted writes.
    pub incoming_writes: u64,
    /// Accepted refresh/power requests sent from outside.
    pub incoming_other: u64,
}

impl<T: DramSpec> Memory<T> {
    /// Builds the memory system described by the configuration.
    pub fn new(spec: Arc<T>, cfg: &Config) -> Result<Self, ConfigError> {
        let org = spec.org();
        let mut addr_bits = Vec::with_capacity(T::Level::COUNT);
        for (level, &count) in org.count.iter().enumerate() {
            if count < 0 || (count != 0 && count & (count - 1) != 0) {
                return Err(ConfigError::Inconsistent(format!(
                    "level {level} count {count} is not a power of two"
                )));
            }
            addr_bits.push(if count == 0 { 0 } else { count.trailing_zeros() });
        }
        let tx_bytes = spec.prefetch_size() * spec.channel_width() / 8;
        let tx_bits = (tx_bytes as u64).trailing_zeros();
        // Column-low bits ride inside the transaction; only column-high bits
        // are mapped.
        let col_level = spec.row_level() + 1;
        if addr_bits[col_level] < tx_bits {
            return Err(ConfigError::Inconsistent(format!(
                "column bits {} smaller than transaction bits {tx_bits}",
                addr_bits[col_level]
            )));
        }
        addr_bits[col_level] -= tx_bits;

        let total_bits: u32 = addr_bits.iter().sum::<u32>() + tx_bits;
        let frame_count = if total_bits >= PAGE_SHIFT {
            1i64 << (total_bits - PAGE_SHIFT)
        } else {
            1
        };

        let channels = org.count[0] as usize;
        let mut ctrls = Vec::with_capacity(channels);
        for c in 0..channels {
            ctrls.push(Controller::new(Arc::clone(&spec), c, cfg));
        }

        Ok(Self {
            ctrls,
            addr_bits,
            mapping_order: spec.mapping_order(),
            tx_bits,
            translation: cfg.translation,
            page_map: HashMap::new(),
            used_frames: HashSet::new(),
            frame_count,
            rng: StdRng::seed_from_u64(TRANSLATION_SEED),
            inflight_limit: cfg.inflight_limit,
            incoming_reads: 0,
            incoming_writes: 0,
            incoming_other: 0,
            spec,
        })
    }

    /// The standard in effect.
    pub fn spec(&self) -> &T {
        &self.spec
    }

    /// Memory clock period in nanoseconds.
    pub fn clk_ns(&self) -> f64 {
        self.spec.t_ck_ns()
    }

    /// Maps a byte address to per-level indices.
    pub fn map_addr(&self, addr: i64) -> Vec<i64> {
        let mut a = addr >> self.tx_bits;
        let mut vec = vec![-1i64; self.addr_bits.len()];
        for &level in &self.mapping_order {
            let bits = self.addr_bits[level];
            vec[level] = a & ((1i64 << bits) - 1);
            a >>= bits;
        }
        vec
    }

    fn translate(&mut self, addr: i64) -> i64 {
        match self.translation {
            TranslationKind::None => addr,
            TranslationKind::Random => {
                let page = addr >> PAGE_SHIFT;
                let offset = addr & ((1 << PAGE_SHIFT) - 1);
                if let Some(&frame) = self.page_map.get(&page) {
                    return (frame << PAGE_SHIFT) | offset;
                }
                assert!(
                    (self.used_frames.len() as i64) < self.frame_count,
                    "physical page pool exhausted"
                );
                let frame = loop {
                    let candidate = (self.rng.gen::<u64>() % self.frame_count as u64) as i64;
                    if self.used_frames.insert(candidate) {
                        break candidate;
                    }
                };
                self.page_map.insert(page, frame);
                (frame << PAGE_SHIFT) | offset
            }
        }
    }

    /// Admits a request: computes its address vector and enqueues it in the
    /// owning channel's controller. Returns the request on backpressure.
    pub fn send(&mut self, mut req: Request) -> Result<(), Request> {
        if self.inflight_limit > 0 && self.pending_requests() >= self.inflight_limit {
            return Err(req);
        }
        let mapped = self.translate(req.addr);
        req.addr_vec = self.map_addr(mapped);
        let channel = req.addr_vec[0] as usize;
        let kind = req.kind;
        match self.ctrls[channel].enqueue(req) {
            Ok(()) => {
                match kind {
                    RequestKind::Read | RequestKind::Extension => self.incoming_reads += 1,
                    RequestKind::Write => self.incoming_writes += 1,
                    _ => self.incoming_other += 1,
                }
                Ok(())
            }
            Err(req) => Err(req),
        }
    }

    /// Advances every controller one memory cycle and returns the requests
    /// that completed.
    pub fn tick(&mut self) -> Vec<Request> {
        let mut done = Vec::new();
        for ctrl in &mut self.ctrls {
            ctrl.tick();
            done.append(&mut ctrl.take_completed());
        }
        done
    }

    /// Outstanding work across all channels.
    pub fn pending_requests(&self) -> usize {
        self.ctrls.iter().map(Controller::pending_requests).sum()
    }

    /// Emits memory-wide and per-channel statistics.
    pub fn report(&self, prefix: &str, w: &mut StatsWriter) {
        w.emit_u64(&format!("{prefix}.incoming_reads"), self.incoming_reads, "accepted read requests");
        w.emit_u64(&format!("{prefix}.incoming_writes"), self.incoming_writes, "accepted write requests");
        w.emit_f64(
            &format!("{prefix}.t_ck_ns"),
            self.clk_ns(),
            6,
            "memory clock period (ns)",
        );
        w.emit(
            &format!("{prefix}.read_latency_cycles"),
            self.spec.read_latency(),
            "cycles from final read command to data",
        );
        for (i, ctrl) in self.ctrls.iter().enumerate() {
            ctrl.report(&format!("{prefix}.channel_{i}"), w);
        }
    }
}
