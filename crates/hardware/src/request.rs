//! Memory request representation.
//!
//! A [`Request`] is the unit of work that flows from the processor model (or a
//! DRAM trace) through the cache hierarchy into a per-channel controller. It
//! carries the flat byte address, the per-level address vector produced by the
//! address mapper, and the log of DRAM commands issued on its behalf.
//!
//! Completion is delivered by value: `Memory::tick` returns departed requests
//! to its caller, which routes them by `coreid`. This replaces the stored
//! closure of the usual callback pattern and guarantees exactly one delivery
//! per accepted request.

/// Classification of a memory request.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RequestKind {
    /// Demand read; completes `read_latency` cycles after its final command.
    Read,
    /// Write; completes when its final command is issued.
    Write,
    /// Refresh, injected by the controller's refresh driver.
    Refresh,
    /// Power-down entry request.
    PowerDown,
    /// Self-refresh entry request.
    SelfRefresh,
    /// Migration/extension request; accounted as a read.
    Extension,
}

/// One DRAM command issued on behalf of a request, with its issue cycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CommandRecord {
    /// Mnemonic of the issued command.
    pub cmd: &'static str,
    /// Memory-clock cycle at which the command was issued.
    pub clk: i64,
}

/// A single memory request.
///
/// Immutable after construction except for `arrive`, `depart`, `addr_vec`,
/// `is_first_command`, and the accumulated `cmds` log. Once a request sits in
/// a controller queue its `addr_vec` is fully populated and names that
/// controller's channel.
#[derive(Clone, Debug)]
pub struct Request {
    /// Flat byte address; `-1` for internally generated requests that carry
    /// a pre-built address vector instead.
    pub addr: i64,
    /// Per-level indices after address mapping; `-1` marks an unused level.
    pub addr_vec: Vec<i64>,
    /// Request classification.
    pub kind: RequestKind,
    /// Cycle the request entered its controller queue.
    pub arrive: i64,
    /// Cycle the request completes; `-1` until scheduled.
    pub depart: i64,
    /// Index of the originating core; `usize::MAX` for internal requests.
    pub coreid: usize,
    /// True until the first DRAM command for this request is issued.
    pub is_first_command: bool,
    /// Log of commands issued on behalf of this request.
    pub cmds: Vec<CommandRecord>,
}

impl Request {
    /// Creates a request for the given byte address and kind.
    pub fn new(addr: i64, kind: RequestKind, coreid: usize) -> Self {
        Self {
            addr,
            addr_vec: Vec::new(),
            kind,
            arrive: -1,
            depart: -1,
            coreid,
            is_first_command: true,
            cmds: Vec::new(),
        }
    }

    /// Creates a refresh request from a pre-built address vector.
    pub fn refresh(addr_vec: Vec<i64>) -> Self {
        Self {
            addr: -1,
            addr_vec,
            kind: RequestKind::Refresh,
            arrive: -1,
            depart: -1,
            coreid: usize::MAX,
            is_first_command: true,
            cmds: Vec::new(),
        }
    }

    /// Creates a writeback generated by a last-level cache eviction.
    pub fn writeback(addr: i64) -> Self {
        Self::new(addr, RequestKind::Write, usize::MAX)
    }

    /// Records an issued command on this request.
    pub fn add_command(&mut self, cmd: &'static str, clk: i64) {
        self.cmds.push(CommandRecord { cmd, clk });
    }
}
