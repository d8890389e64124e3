//! Per-channel memory controller.
//!
//! Owns the channel's device tree and its request queues, and issues at most
//! one legal DRAM command per memory cycle. It provides:
//! 1. **Queues:** bounded read/write/other queues plus an activation queue
//!    for requests whose row is already being opened.
//! 2. **Write drain:** hysteresis between read and write phases.
//! 3. **Refresh:** rank-level REFRESH injection every nREFI cycles.
//! 4. **Scheduling:** pluggable scheduler and row policy.
//! 5. **Statistics:** row hit/miss/conflict tallies, latency histogram, and
//!    the channel's cycle accounting.

/// Refresh interval tracking.
pub mod refresh;
/// Row precharge policies.
pub mod rowpolicy;
/// Open-row bookkeeping.
pub mod rowtable;
/// Request schedulers.
pub mod scheduler;

use std::collections::VecDeque;
use std::sync::Arc;

use crate::config::Config;
use crate::dram::node::Dram;
use crate::dram::spec::{CommandEnum, DramSpec, LevelEnum};
use crate::request::{Request, RequestKind};
use crate::stats::{Histogram, StatsWriter};

use self::refresh::Refresh;
use self::rowpolicy::RowPolicy;
use self::rowtable::RowTable;
use self::scheduler::Scheduler;

/// Default capacity of each request queue.
pub const QUEUE_CAPACITY: usize = 32;

/// A bounded request queue.
#[derive(Debug, Default)]
pub struct Queue {
    /// Queued requests, in insertion order.
    pub q: Vec<Request>,
    /// Capacity; admission fails when reached.
    pub max: usize,
}

impl Queue {
    fn with_capacity(max: usize) -> Self {
        Self { q: Vec::new(), max }
    }

    /// Number of queued requests.
    pub fn len(&self) -> usize {
        self.q.len()
    }

    /// True when nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.q.is_empty()
    }

    fn is_full(&self) -> bool {
        self.q.len() >= self.max
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum QueueSel {
    Read,
    Write,
    Other,
    Act,
}

/// Per-channel controller, generic over the DRAM standard.
pub struct Controller<T: DramSpec> {
    spec: Arc<T>,
    /// The channel's device tree.
    pub channel: Dram<T>,
    /// Memory-clock cycle count.
    pub clk: i64,

    /// Demand reads (and extensions) awaiting service.
    pub readq: Queue,
    /// Writes awaiting the next write phase.
    pub writeq: Queue,
    /// Refresh and power-mode requests; served before reads and writes.
    pub otherq: Queue,
    /// Requests whose row activation has been issued but not their column
    /// access.
    pub actq: Queue,
    /// Reads awaiting their departure cycle.
    pub pending: VecDeque<Request>,

    write_mode: bool,
    refresh: Refresh,
    /// Scheduling policy.
    pub scheduler: Scheduler,
    /// Row management policy.
    pub rowpolicy: RowPolicy,
    /// Open-row bookkeeping.
    pub rowtable: RowTable,

    record_cmd_trace: bool,
    print_cmd_trace: bool,
    /// Issued commands, kept when command tracing is enabled.
    pub cmd_trace: Vec<(i64, &'static str, Vec<i64>)>,

    completed: Vec<Request>,

    /// Row-buffer hits among first commands.
    pub row_hits: u64,
    /// Accesses to a closed bank.
    pub row_misses: u64,
    /// Accesses conflicting with a different open row.
    pub row_conflicts: u64,
    /// Read-side split of the row tallies.
    pub read_row_hits: u64,
    /// Read-side row misses.
    pub read_row_misses: u64,
    /// Read-side row conflicts.
    pub read_row_conflicts: u64,
    /// Write-side row hits.
    pub write_row_hits: u64,
    /// Write-side row misses.
    pub write_row_misses: u64,
    /// Write-side row conflicts.
    pub write_row_conflicts: u64,
    /// Accepted read/extension requests.
    pub read_transactions: u64,
    /// Accepted write requests.
    pub write_transactions: u64,
    /// Writes absorbed into an already-queued write.
    pub write_merges: u64,
    /// Reads served from the write queue.
    pub read_forwards: u64,
    read_latency_sum: i64,
    /// Distribution of read latencies in memory cycles.
    pub read_latency_hist: Histogram,
    queue_len_sum: u64,
    read_queue_len_sum: u64,
    write_queue_len_sum: u64,
}

impl<T: DramSpec> Controller<T> {
    /// Creates the controller for channel `channel_id`.
    pub fn new(spec: Arc<T>, channel_id: usize, cfg: &Config) -> Self {
        let channel = Dram::new(Arc::clone(&spec), 0, channel_id);
        let refresh = Refresh::new(spec.refresh_interval());
        let rowtable = RowTable::new(spec.row_level());
        Self {
            channel,
            clk: 0,
            readq: Queue::with_capacity(QUEUE_CAPACITY),
            writeq: Queue::with_capacity(QUEUE_CAPACITY),
            otherq: Queue::with_capacity(QUEUE_CAPACITY),
            actq: Queue::with_capacity(QUEUE_CAPACITY),
            pending: VecDeque::new(),
            write_mode: false,
            refresh,
            scheduler: Scheduler::new(cfg.scheduler),
            rowpolicy: RowPolicy::new(cfg.row_policy),
            rowtable,
            record_cmd_trace: cfg.record_cmd_trace,
            print_cmd_trace: cfg.print_cmd_trace,
            cmd_trace: Vec::new(),
            completed: Vec::new(),
            row_hits: 0,
            row_misses: 0,
            row_conflicts: 0,
            read_row_hits: 0,
            read_row_misses: 0,
            read_row_conflicts: 0,
            write_row_hits: 0,
            write_row_misses: 0,
            write_row_conflicts: 0,
            read_transactions: 0,
            write_transactions: 0,
            write_merges: 0,
            read_forwards: 0,
            read_latency_sum: 0,
            read_latency_hist: Histogram::new(0, 1999, 40),
            queue_len_sum: 0,
            read_queue_len_sum: 0,
            write_queue_len_sum: 0,
            spec,
        }
    }

    /// The standard this controller drives.
    pub fn spec(&self) -> &T {
        &self.spec
    }

    /// Whether the controller is currently draining writes.
    pub fn in_write_mode(&self) -> bool {
        self.write_mode
    }

    /// Requests enqueued or awaiting departure.
    pub fn pending_requests(&self) -> usize {
        self.readq.len()
            + self.writeq.len()
            + self.otherq.len()
            + self.actq.len()
            + self.pending.len()
    }

    /// Takes the requests completed since the last call.
    pub fn take_completed(&mut self) -> Vec<Request> {
        std::mem::take(&mut self.completed)
    }

    /// Admits a request, stamping its arrival cycle. Writes matching a
    /// queued write are absorbed; reads matching a queued write are served
    /// from it. Returns the request on a full queue.
    pub fn enqueue(&mut self, mut req: Request) -> Result<(), Request> {
        debug_assert_eq!(
            req.addr_vec[0] as usize,
            self.channel.id,
            "request routed to the wrong channel"
        );
        match req.kind {
            RequestKind::Read | RequestKind::Extension => {
                if self.readq.is_full() {
                    return Err(req);
                }
                req.arrive = self.clk;
                self.read_transactions += 1;
                if req.addr != -1 && self.writeq.q.iter().any(|w| w.addr == req.addr) {
                    req.depart = self.clk + 1;
                    self.read_forwards += 1;
                    self.pending.push_back(req);
                } else {
                    self.readq.q.push(req);
                }
            }
            RequestKind::Write => {
                if self.writeq.is_full() {
                    return Err(req);
                }
                req.arrive = self.clk;
                self.write_transactions += 1;
                if req.addr != -1 && self.writeq.q.iter().any(|w| w.addr == req.addr) {
                    req.depart = self.clk;
                    self.write_merges += 1;
                    self.completed.push(req);
                } else {
                    self.writeq.q.push(req);
                }
            }
            _ => {
                if self.otherq.is_full() {
                    return Err(req);
                }
                req.arrive = self.clk;
                self.otherq.q.push(req);
            }
        }
        Ok(())
    }

    /// Advances one memory cycle: retires the head of `pending`, drives
    /// refresh, updates the write-mode hysteresis, and issues at most one
    /// command.
    pub fn tick(&mut self) {
        self.clk += 1;
        self.queue_len_sum += self.pending_requests() as u64;
        self.read_queue_len_sum += self.readq.len() as u64;
        self.write_queue_len_sum += self.writeq.len() as u64;

        self.channel.update_active_cycle();
        self.channel.update_refresh_cycle(self.clk);
        self.channel.update_busy_cycle(self.clk);

        // 1. Serve the completed read at the head of pending.
        if let Some(head) = self.pending.front() {
            if head.depart <= self.clk {
                let req = self.pending.pop_front().expect("pending head checked");
                if req.depart - req.arrive > 1 {
                    // Forwarded reads never touched the array.
                    self.read_latency_sum += req.depart - req.arrive;
                    self.read_latency_hist.sample(req.depart - req.arrive);
                    self.channel.update_serving_requests(&req.addr_vec, -1);
                }
                self.completed.push(req);
            }
        }

        // 2. Refresh.
        if self.refresh.tick() {
            self.inject_refresh();
        }

        // 3. Write-mode hysteresis.
        let hi = (0.8 * self.writeq.max as f64) as usize;
        let lo = (0.2 * self.writeq.max as f64) as usize;
        if !self.write_mode {
            if self.writeq.len() >= hi || self.readq.is_empty() {
                self.write_mode = true;
            }
        } else if self.writeq.len() <= lo && !self.readq.is_empty() {
            self.write_mode = false;
        }

        // 4. Queue selection: refreshes and power commands are rare, so the
        // other-queue preempts reads and writes.
        let primary = if !self.otherq.is_empty() {
            QueueSel::Other
        } else if self.write_mode {
            QueueSel::Write
        } else {
            QueueSel::Read
        };

        // 5. Schedule, falling back to half-served activations. Refresh and
        // power requests never row-hit, so the other-queue is always picked
        // with plain FR-FCFS.
        let primary_sched = if primary == QueueSel::Other {
            Scheduler::new(scheduler::SchedulerKind::Frfcfs)
        } else {
            self.scheduler
        };
        let mut chosen: Option<(QueueSel, usize)> = None;
        if let Some(i) =
            primary_sched.get_head(&self.channel, &self.rowtable, self.clk, &self.queue(primary).q)
        {
            if self.is_ready_at(primary, i) {
                chosen = Some((primary, i));
            }
        }
        if chosen.is_none() {
            if let Some(i) =
                self.scheduler
                    .get_head(&self.channel, &self.rowtable, self.clk, &self.actq.q)
            {
                if self.is_ready_at(QueueSel::Act, i) {
                    chosen = Some((QueueSel::Act, i));
                }
            }
        }
        let Some((sel, idx)) = chosen else {
            // Nothing issuable: try to close a row speculatively.
            let victim = self.rowpolicy.get_victim(&self.channel, &self.rowtable, self.clk);
            if !victim.is_empty() {
                let pre = self.spec.pre_command();
                self.issue_cmd(pre, &victim);
            }
            return;
        };

        // 6. Issue one command on behalf of the chosen request.
        let (kind, is_first, req_addr_vec) = {
            let req = &self.queue(sel).q[idx];
            (req.kind, req.is_first_command, req.addr_vec.clone())
        };
        let plain = self.channel.decode(self.spec.translate(kind), &req_addr_vec);
        let mut cmd = self.rowpolicy.upgrade(&*self.spec, kind, plain);
        if cmd != plain {
            let addr = self.get_addr_vec(cmd, &req_addr_vec);
            if !self.channel.check(cmd, &addr, self.clk) {
                cmd = plain;
            }
        }
        let cmd_addr = self.get_addr_vec(cmd, &req_addr_vec);

        if is_first {
            if matches!(kind, RequestKind::Read | RequestKind::Write) {
                self.channel.update_serving_requests(&req_addr_vec, 1);
            }
            let terminal = self.spec.translate(kind);
            let hit = self.channel.check_row_hit(terminal, &req_addr_vec);
            let open = self.channel.check_row_open(terminal, &req_addr_vec);
            match kind {
                RequestKind::Read | RequestKind::Extension => {
                    if hit {
                        self.row_hits += 1;
                        self.read_row_hits += 1;
                    } else if open {
                        self.row_conflicts += 1;
                        self.read_row_conflicts += 1;
                    } else {
                        self.row_misses += 1;
                        self.read_row_misses += 1;
                    }
                }
                RequestKind::Write => {
                    if hit {
                        self.row_hits += 1;
                        self.write_row_hits += 1;
                    } else if open {
                        self.row_conflicts += 1;
                        self.write_row_conflicts += 1;
                    } else {
                        self.row_misses += 1;
                        self.write_row_misses += 1;
                    }
                }
                _ => {}
            }
        }

        {
            let clk = self.clk;
            let req = &mut self.queue_mut(sel).q[idx];
            req.is_first_command = false;
            req.add_command(cmd.label(), clk);
        }
        self.issue_cmd(cmd, &cmd_addr);

        // 7. Completion bookkeeping for the terminal command.
        let terminal = self.spec.translate(kind);
        let is_terminal = cmd == terminal || self.spec.autoprecharge(terminal) == Some(cmd);
        if is_terminal {
            let mut req = self.queue_mut(sel).q.remove(idx);
            match req.kind {
                RequestKind::Read | RequestKind::Extension => {
                    req.depart = self.clk + self.spec.read_latency();
                    self.pending.push_back(req);
                }
                RequestKind::Write => {
                    self.channel.update_serving_requests(&req.addr_vec, -1);
                    req.depart = self.clk;
                    self.completed.push(req);
                }
                _ => {} // refresh and power requests retire silently
            }
        } else if self.spec.is_opening(cmd)
            && matches!(sel, QueueSel::Read | QueueSel::Write)
        {
            // The row is on its way up; park the request so the scheduler
            // can finish it even while another queue takes priority.
            let req = self.queue_mut(sel).q.remove(idx);
            self.actq.q.push(req);
        }
    }

    fn queue(&self, sel: QueueSel) -> &Queue {
        match sel {
            QueueSel::Read => &self.readq,
            QueueSel::Write => &self.writeq,
            QueueSel::Other => &self.otherq,
            QueueSel::Act => &self.actq,
        }
    }

    fn queue_mut(&mut self, sel: QueueSel) -> &mut Queue {
        match sel {
            QueueSel::Read => &mut self.readq,
            QueueSel::Write => &mut self.writeq,
            QueueSel::Other => &mut self.otherq,
            QueueSel::Act => &mut self.actq,
        }
    }

    /// Address vector a command actually targets; standards may redirect
    /// (e.g. SALP's precharge of the offending subarray).
    fn get_addr_vec(&self, cmd: T::Command, addr_vec: &[i64]) -> Vec<i64> {
        self.spec
            .alternate_addr_vec(&self.channel, cmd, addr_vec)
            .unwrap_or_else(|| addr_vec.to_vec())
    }

    fn is_ready_at(&self, sel: QueueSel, idx: usize) -> bool {
        let req = &self.queue(sel).q[idx];
        let cmd = self.channel.decode(self.spec.translate(req.kind), &req.addr_vec);
        let addr = self.get_addr_vec(cmd, &req.addr_vec);
        self.channel.check(cmd, &addr, self.clk)
    }

    fn issue_cmd(&mut self, cmd: T::Command, addr_vec: &[i64]) {
        debug_assert!(
            self.channel.check(cmd, addr_vec, self.clk),
            "command issued against a closed timing window"
        );
        self.channel.update(cmd, addr_vec, self.clk);
        self.rowtable.update(&*self.spec, cmd, addr_vec, self.clk);
        tracing::trace!(
            channel = self.channel.id,
            clk = self.clk,
            cmd = cmd.label(),
            ?addr_vec,
            "issue"
        );
        if self.record_cmd_trace {
            self.cmd_trace.push((self.clk, cmd.label(), addr_vec.to_vec()));
        }
        if self.print_cmd_trace {
            println!("{} {} {:?}", self.clk, cmd.label(), addr_vec);
        }
    }

    fn inject_refresh(&mut self) {
        let ranks = self.channel.children.len();
        for rank in 0..ranks {
            let mut addr_vec = vec![-1i64; T::Level::COUNT];
            addr_vec[0] = self.channel.id as i64;
            addr_vec[1] = rank as i64;
            let accepted = self.enqueue(Request::refresh(addr_vec)).is_ok();
            assert!(accepted, "refresh rejected: other-queue full");
        }
        self.refresh.mark();
        tracing::debug!(channel = self.channel.id, clk = self.clk, "refresh round injected");
    }

    /// Emits this channel's statistics under `prefix`.
    pub fn report(&self, prefix: &str, w: &mut StatsWriter) {
        w.emit_u64(&format!("{prefix}.read_transactions"), self.read_transactions, "accepted read/extension requests");
        w.emit_u64(&format!("{prefix}.write_transactions"), self.write_transactions, "accepted write requests");
        w.emit_u64(&format!("{prefix}.row_hits"), self.row_hits, "row-buffer hits");
        w.emit_u64(&format!("{prefix}.row_misses"), self.row_misses, "accesses to a closed bank");
        w.emit_u64(&format!("{prefix}.row_conflicts"), self.row_conflicts, "accesses conflicting with an open row");
        w.emit_u64(&format!("{prefix}.read_row_hits"), self.read_row_hits, "read row-buffer hits");
        w.emit_u64(&format!("{prefix}.read_row_misses"), self.read_row_misses, "read row misses");
        w.emit_u64(&format!("{prefix}.read_row_conflicts"), self.read_row_conflicts, "read row conflicts");
        w.emit_u64(&format!("{prefix}.write_row_hits"), self.write_row_hits, "write row-buffer hits");
        w.emit_u64(&format!("{prefix}.write_row_misses"), self.write_row_misses, "write row misses");
        w.emit_u64(&format!("{prefix}.write_row_conflicts"), self.write_row_conflicts, "write row conflicts");
        w.emit_u64(&format!("{prefix}.write_merges"), self.write_merges, "writes absorbed by a queued write");
        w.emit_u64(&format!("{prefix}.read_forwards"), self.read_forwards, "reads served from the write queue");
        w.emit(&format!("{prefix}.read_latency_sum"), self.read_latency_sum, "sum of read latencies in memory cycles");
        w.emit_u64(&format!("{prefix}.queue_len_sum"), self.queue_len_sum, "sum of outstanding requests per cycle");
        w.emit_u64(&format!("{prefix}.read_queue_len_sum"), self.read_queue_len_sum, "sum of read-queue length per cycle");
        w.emit_u64(&format!("{prefix}.write_queue_len_sum"), self.write_queue_len_sum, "sum of write-queue length per cycle");
        self.read_latency_hist.report(&format!("{prefix}.read_latency"), w, "read latency (memory cycles)");
        self.channel.report(prefix, w);
    }
}
