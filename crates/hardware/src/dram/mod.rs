//! DRAM device model.
//!
//! This module contains the standard-agnostic engine and the per-standard
//! tables. It provides:
//! 1. **Spec trait:** [`spec::DramSpec`]: levels, commands, states, prereq /
//!    row-hit / state-transition rules and timing tables for one standard.
//! 2. **Node tree:** [`node::Dram`]: Channel/Rank/Bank(/Subarray) state
//!    tracking with constant amortized timing checks.
//! 3. **Standards:** DDR3, DDR4 (bank groups), and SALP (subarrays).

/// Hierarchical state/timing tree node.
pub mod node;
/// The standard trait and its supporting table types.
pub mod spec;
/// Concrete DRAM standards.
pub mod standards;

pub use node::Dram;
pub use spec::{CommandEnum, DramSpec, LevelEnum, OrgEntry, TimingEntry};
