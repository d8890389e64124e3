//! Cycle-accurate DRAM timing and command-scheduling simulator library.
//!
//! This crate implements a main-memory simulator core with the following:
//! 1. **Device model:** a hierarchical state/timing tree generic over a DRAM
//!    standard (DDR3, DDR4, SALP), answering command legality in constant
//!    amortized time against per-standard timing tables.
//! 2. **Controller:** per-channel queues, write-drain hysteresis, refresh,
//!    pluggable schedulers and row policies, one command per cycle.
//! 3. **Memory:** address mapping, optional page-frame randomization, and
//!    channel fanout with non-blocking admission.
//! 4. **Caches:** an inclusive L1/L2/L3 hierarchy with MSHR-based miss
//!    tracking, LRU replacement, and writeback on dirty eviction.
//! 5. **Processor:** trace-driven cores retiring through a reorder window.
//! 6. **Simulation:** run loops, configuration, and statistics reporting.

/// Inclusive multi-level cache hierarchy.
pub mod cache;
/// Run configuration (defaults, enums, file parsing).
pub mod config;
/// Per-channel memory controller, scheduler, and row policy.
pub mod controller;
/// DRAM device model: spec trait, node tree, standards.
pub mod dram;
/// Top-level memory: address mapping and channel fanout.
pub mod memory;
/// Trace-driven processor model.
pub mod processor;
/// Memory request representation.
pub mod request;
/// Run loops and error types.
pub mod sim;
/// Statistics collection and reporting.
pub mod stats;

/// Root configuration type; parse with `Config::from_file` or build from
/// `Config::default()`.
pub use crate::config::Config;
/// The memory system: controllers plus the address mapper.
pub use crate::memory::Memory;
/// The unit of work flowing through the simulator.
pub use crate::request::Request;
/// Runs one simulation to completion.
pub use crate::sim::run;
