//! Device-model tests.

/// DDR3 command sequencing and timing windows.
pub mod ddr3_timing;
/// DDR4 bank-group timing distinctions.
pub mod ddr4_timing;
/// Subarray parallelism and the offending-subarray precharge.
pub mod salp;
