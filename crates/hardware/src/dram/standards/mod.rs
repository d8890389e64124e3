//! Concrete DRAM standards.
//!
//! Each standard supplies its level/command/state enums, organization and
//! speed presets, prerequisite and state-transition rules, and timing tables.
//! The engine never special-cases a standard; everything standard-specific
//! lives behind [`crate::dram::DramSpec`].

/// DDR3 SDRAM.
pub mod ddr3;
/// DDR4 SDRAM with bank groups.
pub mod ddr4;
/// Subarray-level-parallelism DRAM (SALP).
pub mod salp;

pub use ddr3::Ddr3;
pub use ddr4::Ddr4;
pub use salp::Salp;
