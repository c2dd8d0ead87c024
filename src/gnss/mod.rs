/// Functionality shared by any GNSS signal: acquisition search and lock detection
pub mod common;

pub mod gps_l1_ca;
