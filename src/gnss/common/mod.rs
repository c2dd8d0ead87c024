/// Coarse/fine code phase search shared by the L1 receiver and its in-channel re-acquisition
pub mod acquisition;

/// Per-period channel records and lock detection
pub mod tracking;
