//! The DRAM standard trait.
//!
//! A standard is its tables: which command is a prerequisite of which, what a
//! command does to node state, which timings gate it, and where in the
//! hierarchy each decision terminates. The engine ([`crate::dram::Dram`],
//! [`crate::controller::Controller`]) is generic over this trait and knows
//! nothing about any particular standard.

use crate::config::{Config, ConfigError};
use crate::dram::node::Dram;
use crate::request::RequestKind;

/// Hierarchy level enum of a standard (Channel < Rank < … < Row < Column).
pub trait LevelEnum: Copy + Eq + std::fmt::Debug + Send + Sync + 'static {
    /// Number of levels, including Row and Column.
    const COUNT: usize;
    /// All levels in hierarchy order.
    const ALL: &'static [Self];
    /// Position of this level in the hierarchy, root first.
    fn index(self) -> usize;
}

/// Command enum of a standard.
pub trait CommandEnum: Copy + Eq + std::fmt::Debug + Send + Sync + 'static {
    /// Number of distinct commands.
    const COUNT: usize;
    /// All commands, in index order.
    const ALL: &'static [Self];
    /// Dense index of this command.
    fn index(self) -> usize;
    /// Mnemonic used in command traces.
    fn label(self) -> &'static str;
}

/// One timing constraint: after `dist`-th most recent issue of the keyed
/// command, `cmd` may not fire earlier than that issue cycle plus `val`.
///
/// Entries with `sibling` apply to sibling nodes at the same level instead of
/// the issuing node's subtree, and must have `dist == 1`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TimingEntry<C> {
    /// Command whose earliest legal cycle is raised.
    pub cmd: C,
    /// Which past issuance to measure from (1 = most recent).
    pub dist: usize,
    /// Minimum separation in memory cycles.
    pub val: i64,
    /// Apply at sibling nodes rather than the issuing subtree.
    pub sibling: bool,
}

/// Organization of one device: density, interface width, and the node count
/// at every hierarchy level (rows and columns included).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OrgEntry {
    /// Device density in megabits.
    pub size_mb: i64,
    /// Interface width (DQ pins) of one device.
    pub dq: i64,
    /// Node count per level; index 0 (Channel) and 1 (Rank) come from the
    /// run configuration.
    pub count: Vec<i64>,
}

/// Behavior tables of one DRAM standard.
///
/// `prereq`, `row_hit`, `row_open` and `apply_state` dispatch on the node's
/// level and the command; returning `None` from the first three defers the
/// decision to the next level down. The timing tables are plain data built at
/// construction.
pub trait DramSpec: Send + Sync + Sized + 'static {
    /// Hierarchy level enum.
    type Level: LevelEnum;
    /// Command enum.
    type Command: CommandEnum;
    /// Node state enum.
    type State: Copy + Eq + std::fmt::Debug + Send + Sync + 'static;

    /// Standard name as it appears in configuration files.
    const NAME: &'static str;

    /// Builds the standard from the run configuration (org/speed presets,
    /// channel/rank/subarray counts).
    fn from_config(cfg: &Config) -> Result<Self, ConfigError>;

    /// Organization in effect.
    fn org(&self) -> &OrgEntry;
    /// Memory clock frequency in MHz.
    fn frequency_mhz(&self) -> f64;
    /// Memory clock period in nanoseconds.
    fn t_ck_ns(&self) -> f64;
    /// Burst prefetch width in column beats.
    fn prefetch_size(&self) -> i64;
    /// Channel width in bits.
    fn channel_width(&self) -> i64;
    /// Cycles from a read's final command to data return (nCL + nBL).
    fn read_latency(&self) -> i64;
    /// Average refresh interval in memory cycles (nREFI).
    fn refresh_interval(&self) -> i64;

    /// Initial state for a node at `level`.
    fn start_state(&self, level: usize) -> Self::State;
    /// Deepest level whose timing/state matters for `cmd`'s legality.
    fn scope(&self, cmd: Self::Command) -> usize;
    /// Terminal command that completes a request of `kind`.
    fn translate(&self, kind: RequestKind) -> Self::Command;
    /// Auto-precharging variant of `cmd`, if the standard defines one.
    fn autoprecharge(&self, cmd: Self::Command) -> Option<Self::Command>;
    /// The plain precharge command, used for speculative row closing.
    fn pre_command(&self) -> Self::Command;

    /// True for commands that open a row.
    fn is_opening(&self, cmd: Self::Command) -> bool;
    /// True for column accesses (reads and writes, with or without AP).
    fn is_accessing(&self, cmd: Self::Command) -> bool;
    /// True for commands that close one or more rows.
    fn is_closing(&self, cmd: Self::Command) -> bool;
    /// True for refresh commands.
    fn is_refreshing(&self, cmd: Self::Command) -> bool;

    /// Prerequisite of `cmd` at `node`, or `None` to defer to the child at
    /// `child_id`. Returning `cmd` itself means it may issue as-is.
    fn prereq(&self, node: &Dram<Self>, cmd: Self::Command, child_id: i64)
        -> Option<Self::Command>;
    /// Row-buffer-hit verdict at `node`, or `None` to defer downward.
    fn row_hit(&self, node: &Dram<Self>, cmd: Self::Command, child_id: i64) -> Option<bool>;
    /// Row-buffer-open verdict at `node`, or `None` to defer downward.
    fn row_open(&self, node: &Dram<Self>, cmd: Self::Command, child_id: i64) -> Option<bool>;
    /// State transition applied at `node` when `cmd` issues.
    fn apply_state(&self, node: &mut Dram<Self>, cmd: Self::Command, child_id: i64);
    /// Timing constraints triggered by `cmd` at nodes of `level`.
    fn timing(&self, level: usize, cmd: Self::Command) -> &[TimingEntry<Self::Command>];

    /// Index of the Row level; tree construction stops above it.
    fn row_level(&self) -> usize;
    /// Index of the Bank level; cycle accounting walks down to it.
    fn bank_level(&self) -> usize;
    /// Level indices in address-slicing order, lowest bits first.
    fn mapping_order(&self) -> Vec<usize>;

    /// Alternate address vector for commands that target a node other than
    /// the request's own (e.g. SALP's precharge of an offending subarray).
    fn alternate_addr_vec(
        &self,
        _channel: &Dram<Self>,
        _cmd: Self::Command,
        _addr_vec: &[i64],
    ) -> Option<Vec<i64>> {
        None
    }
}

/// Builds an empty `[level][cmd]` timing table for a standard.
pub fn empty_timing<C: CommandEnum>(levels: usize) -> Vec<Vec<Vec<TimingEntry<C>>>> {
    (0..levels)
        .map(|_| (0..C::COUNT).map(|_| Vec::new()).collect())
        .collect()
}
