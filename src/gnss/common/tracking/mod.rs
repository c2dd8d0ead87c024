use serde::{Serialize, Deserialize};

pub mod lock_detectors;

/// Correlator outputs and loop state at the end of one 1 [ms] integration period
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChannelSnapshot {
	pub prn: usize,
	/// Stream index of the last sample of the period
	pub sample_idx: usize,
	/// Periods completed since tracking last (re)started, counting this one
	pub ms_count: usize,
	pub i_e: f64, pub q_e: f64,
	pub i_p: f64, pub q_p: f64,
	pub i_l: f64, pub q_l: f64,
	pub dll_discr: f64,
	pub dll_nco_hz: f64,
	/// [cycles]
	pub pll_discr: f64,
	pub pll_nco_hz: f64,
	pub fll_discr_hz: f64,
	pub carrier_freq_hz: f64,
	pub doppler_hz: f64,
	pub code_freq_hz: f64,
	/// Code phase [chips] carried into the next period
	pub rem_code_phase: f64,
	pub cn0_db_hz: Option<f64>,
	pub carrier_lock: f64,
	pub locked: bool,
}
