pub mod signal_modulation;
pub mod tracking;
pub mod telemetry_decode;
pub mod channel;
pub mod pvt;
pub mod receiver;

#[cfg(test)]
pub(crate) mod test_signal;

pub const CODE_LENGTH:usize = 1023;
pub const CHIP_RATE_HZ:f64 = 1.023e6;
pub const SEC_PER_CHIP:f64 = 1.0 / CHIP_RATE_HZ;
pub const L1_FREQ_HZ:f64 = 1.57542e9;
pub const MS_PER_BIT:usize = 20;
