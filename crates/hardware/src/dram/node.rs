//! Hierarchical DRAM state/timing tree.
//!
//! One [`Dram`] node per Channel, Rank, Bank (and Subarray where the standard
//! has them); rows are tracked in their bank's `row_state` map rather than
//! instantiated. Each node remembers, per command, the earliest future cycle
//! at which that command may issue (`next`) and a bounded history of recent
//! issue cycles (`prev`), sized by the largest `dist` any timing constraint
//! references.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use crate::dram::spec::{CommandEnum, DramSpec};
use crate::stats::StatsWriter;

/// One node of the device tree, generic over the standard.
pub struct Dram<T: DramSpec> {
    spec: Arc<T>,
    level: usize,
    /// Index of this node within its parent.
    pub id: usize,
    /// Current device state at this node.
    pub state: T::State,
    /// State of opened rows; entries exist only for rows opened since the
    /// last precharge.
    pub row_state: HashMap<i64, T::State>,
    /// Child nodes; empty at and below the bank-equivalent leaf.
    pub children: Vec<Dram<T>>,

    cur_clk: i64,
    next: Vec<i64>,
    prev: Vec<VecDeque<i64>>,

    /// Read/write requests currently in flight against this subtree.
    pub cur_serving_requests: i64,
    /// Cycle at which the latest refresh stops blocking row activation.
    pub end_of_refreshing: i64,

    /// Cycles with at least one request in flight here.
    pub total_active_cycles: u64,
    /// Sum over cycles of in-flight request counts.
    pub total_serving_requests: u64,
    /// Cycles spent inside a refresh window.
    pub total_refresh_cycles: u64,
    /// Cycles active or refreshing.
    pub total_busy_cycles: u64,
}

impl<T: DramSpec> Dram<T> {
    /// Builds the subtree rooted at `level` with the given id, sized by the
    /// standard's organization. Construction stops above the Row level or at
    /// a level whose count is unspecified.
    pub fn new(spec: Arc<T>, level: usize, id: usize) -> Self {
        let cmd_count = T::Command::COUNT;
        let next = vec![-1i64; cmd_count];
        let mut prev = Vec::with_capacity(cmd_count);
        for cmd in T::Command::ALL {
            let dist = spec
                .timing(level, *cmd)
                .iter()
                .map(|t| t.dist)
                .max()
                .unwrap_or(0);
            prev.push(VecDeque::from(vec![-1i64; dist]));
        }

        let mut node = Self {
            state: spec.start_state(level),
            spec: Arc::clone(&spec),
            level,
            id,
            row_state: HashMap::new(),
            children: Vec::new(),
            cur_clk: 0,
            next,
            prev,
            cur_serving_requests: 0,
            end_of_refreshing: -1,
            total_active_cycles: 0,
            total_serving_requests: 0,
            total_refresh_cycles: 0,
            total_busy_cycles: 0,
        };

        let child_level = level + 1;
        if child_level == spec.row_level() {
            return node;
        }
        let child_max = spec.org().count[child_level];
        if child_max == 0 {
            return node;
        }
        for i in 0..child_max as usize {
            node.children.push(Dram::new(Arc::clone(&spec), child_level, i));
        }
        node
    }

    /// The standard this tree models.
    pub fn spec(&self) -> &T {
        &self.spec
    }

    /// Hierarchy level of this node.
    pub fn level(&self) -> usize {
        self.level
    }

    fn child_id(&self, addr: &[i64]) -> i64 {
        addr.get(self.level + 1).copied().unwrap_or(-1)
    }

    /// Resolves `cmd` at `addr` to the next command that must issue first,
    /// which is `cmd` itself when no prerequisite applies at any level.
    pub fn decode(&self, cmd: T::Command, addr: &[i64]) -> T::Command {
        let child_id = self.child_id(addr);
        if let Some(prereq) = self.spec.prereq(self, cmd, child_id) {
            return prereq;
        }
        if child_id < 0 || self.children.is_empty() {
            return cmd;
        }
        self.children[child_id as usize].decode(cmd, addr)
    }

    /// True when `cmd` at `addr` is legal at `clk`: every node from here down
    /// to the command's scope passes its timing gate.
    pub fn check(&self, cmd: T::Command, addr: &[i64], clk: i64) -> bool {
        let ci = cmd.index();
        if self.next[ci] != -1 && clk < self.next[ci] {
            return false;
        }
        let child_id = self.child_id(addr);
        if child_id < 0 || self.level == self.spec.scope(cmd) || self.children.is_empty() {
            return true;
        }
        self.children[child_id as usize].check(cmd, addr, clk)
    }

    /// Row-buffer-hit probe along the same path as [`Self::check`]; first
    /// definitive answer wins. Used for statistics and scheduling only.
    pub fn check_row_hit(&self, cmd: T::Command, addr: &[i64]) -> bool {
        let child_id = self.child_id(addr);
        if let Some(hit) = self.spec.row_hit(self, cmd, child_id) {
            return hit;
        }
        if child_id < 0 || self.children.is_empty() {
            return false;
        }
        self.children[child_id as usize].check_row_hit(cmd, addr)
    }

    /// Row-buffer-open probe, distinguishing conflicts (open, wrong row) from
    /// plain misses (closed).
    pub fn check_row_open(&self, cmd: T::Command, addr: &[i64]) -> bool {
        let child_id = self.child_id(addr);
        if let Some(open) = self.spec.row_open(self, cmd, child_id) {
            return open;
        }
        if child_id < 0 || self.children.is_empty() {
            return false;
        }
        self.children[child_id as usize].check_row_open(cmd, addr)
    }

    /// Earliest cycle at which `cmd` at `addr` could issue, taking the
    /// maximum of `next[cmd]` along the path from here to the command scope.
    pub fn get_next(&self, cmd: T::Command, addr: &[i64]) -> i64 {
        let ci = cmd.index();
        let mut next_clk = self.cur_clk.max(self.next[ci]);
        let mut node = self;
        let scope = self.spec.scope(cmd);
        let mut level = self.level;
        while level < scope
            && !node.children.is_empty()
            && addr.get(level + 1).copied().unwrap_or(-1) >= 0
        {
            node = &node.children[addr[level + 1] as usize];
            next_clk = next_clk.max(node.next[ci]);
            level += 1;
        }
        next_clk
    }

    /// Commits `cmd` at `addr` at cycle `clk`: applies state transitions down
    /// to the command scope, then propagates timing constraints (including
    /// sibling constraints) through the tree.
    pub fn update(&mut self, cmd: T::Command, addr: &[i64], clk: i64) {
        self.cur_clk = clk;
        self.update_state(cmd, addr);
        self.update_timing(cmd, addr, clk);
    }

    fn update_state(&mut self, cmd: T::Command, addr: &[i64]) {
        let child_id = self.child_id(addr);
        let spec = Arc::clone(&self.spec);
        spec.apply_state(self, cmd, child_id);
        if self.level == spec.scope(cmd) || self.children.is_empty() {
            return;
        }
        debug_assert!(
            child_id >= 0,
            "state update for a command scoped below an unspecified address level"
        );
        self.children[child_id as usize].update_state(cmd, addr);
    }

    fn update_timing(&mut self, cmd: T::Command, addr: &[i64], clk: i64) {
        let ci = cmd.index();
        let spec = Arc::clone(&self.spec);

        if self.id as i64 != addr[self.level] {
            // Sibling of the target node: only sibling-flagged constraints
            // apply, and never recursively.
            for t in spec.timing(self.level, cmd) {
                if !t.sibling {
                    continue;
                }
                debug_assert!(t.dist == 1, "sibling timing entries must have dist 1");
                let ni = t.cmd.index();
                self.next[ni] = self.next[ni].max(clk + t.val);
            }
            return;
        }

        if !self.prev[ci].is_empty() {
            self.prev[ci].pop_back();
            self.prev[ci].push_front(clk);
        }

        for t in spec.timing(self.level, cmd) {
            if t.sibling {
                continue;
            }
            let past = self.prev[ci][t.dist - 1];
            if past < 0 {
                continue;
            }
            let ni = t.cmd.index();
            self.next[ni] = self.next[ni].max(past + t.val);
            if spec.is_refreshing(cmd) && spec.is_opening(t.cmd) {
                self.end_of_refreshing = self.end_of_refreshing.max(self.next[ni]);
            }
        }

        // Some commands carry timings wider than their scope, so the walk
        // continues through every child rather than stopping at the scope.
        if self.children.is_empty() {
            return;
        }
        for child in &mut self.children {
            child.update_timing(cmd, addr, clk);
        }
        let child_refresh_end = self
            .children
            .iter()
            .map(|c| c.end_of_refreshing)
            .max()
            .unwrap_or(-1);
        self.end_of_refreshing = self.end_of_refreshing.max(child_refresh_end);
    }

    /// Adjusts the in-flight request count along the path named by `addr`,
    /// down to the bank-equivalent level.
    pub fn update_serving_requests(&mut self, addr: &[i64], delta: i64) {
        debug_assert!(
            self.id as i64 == addr[self.level],
            "serving-request update walked off the addressed path"
        );
        self.cur_serving_requests += delta;
        debug_assert!(self.cur_serving_requests >= 0, "negative in-flight count");
        let child_id = self.child_id(addr);
        if child_id < 0 || self.children.is_empty() || self.level > self.spec.bank_level() {
            return;
        }
        self.children[child_id as usize].update_serving_requests(addr, delta);
    }

    /// Per-cycle accounting of active cycles and the serving-request sum.
    pub fn update_active_cycle(&mut self) {
        if self.cur_serving_requests > 0 {
            self.total_active_cycles += 1;
            self.total_serving_requests += self.cur_serving_requests as u64;
        }
        if self.children.is_empty() || self.level >= self.spec.bank_level() {
            return;
        }
        for child in &mut self.children {
            child.update_active_cycle();
        }
    }

    /// Per-cycle accounting of refresh cycles; counts while the current cycle
    /// lies inside the refresh window (bank-closing time included, since the
    /// other-queue is served before reads and writes).
    pub fn update_refresh_cycle(&mut self, clk: i64) {
        if clk <= self.end_of_refreshing {
            self.total_refresh_cycles += 1;
        }
        if self.children.is_empty() || self.level > self.spec.bank_level() {
            return;
        }
        for child in &mut self.children {
            child.update_refresh_cycle(clk);
        }
    }

    /// Per-cycle accounting of busy cycles (active or refreshing).
    pub fn update_busy_cycle(&mut self, clk: i64) {
        if clk <= self.end_of_refreshing || self.cur_serving_requests > 0 {
            self.total_busy_cycles += 1;
        }
        if self.children.is_empty() || self.level > self.spec.bank_level() {
            return;
        }
        for child in &mut self.children {
            child.update_busy_cycle(clk);
        }
    }

    /// Emits this node's cycle counters under `prefix`.
    pub fn report(&self, prefix: &str, w: &mut StatsWriter) {
        w.emit_u64(
            &format!("{prefix}.total_active_cycles"),
            self.total_active_cycles,
            "cycles with at least one request in flight",
        );
        w.emit_u64(
            &format!("{prefix}.total_serving_requests"),
            self.total_serving_requests,
            "sum of in-flight read/write requests per cycle",
        );
        w.emit_u64(
            &format!("{prefix}.total_refresh_cycles"),
            self.total_refresh_cycles,
            "cycles spent under refresh",
        );
        w.emit_u64(
            &format!("{prefix}.total_busy_cycles"),
            self.total_busy_cycles,
            "cycles active or under refresh",
        );
    }
}
