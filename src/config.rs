use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use serde::{Serialize, Deserialize};

use crate::DigSigProcErr;
use crate::io::{SampleFormat, SampleLayout};

/// Receiver-wide settings.  Built once, validated, then passed by reference into every stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReceiverConfig {
	pub sample_rate_hz: f64,
	pub intermediate_freq_hz: f64,
	pub sample_format: SampleFormat,
	pub sample_layout: SampleLayout,
	pub skip_bytes: u64,
	pub ms_to_process: usize,
	pub prns: Vec<usize>,
	pub channel_count: usize,
	/// Length of each block pulled from the sample source after the first one
	pub block_ms: usize,
	pub acquisition: AcquisitionConfig,
	pub tracking: TrackingConfig,
	pub navigation: NavigationConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AcquisitionConfig {
	/// Half-width of the Doppler search around the IF [Hz]
	pub search_band_hz: f64,
	pub search_step_hz: f64,
	pub non_coherent_ms: usize,
	/// Minimum ratio of the strongest to the second-strongest correlation peak
	pub threshold: f64,
	pub fine_step_hz: f64,
	/// Code-wiped data used by the fine frequency search, a multiple of the 20 [ms] bit length
	pub fine_ms: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackingConfig {
	pub dll_bandwidth_hz: f64,
	pub dll_damping: f64,
	pub dll_gain: f64,
	pub pll_bandwidth_hz: f64,
	pub pll_damping: f64,
	pub pll_gain: f64,
	/// Zero disables frequency-lock assistance
	pub fll_bandwidth_hz: f64,
	pub fll_pull_in_ms: usize,
	pub correlator_spacing_chips: f64,
	pub cn0_window_ms: usize,
	pub lock_window_ms: usize,
	pub max_phase_error_cycles: f64,
	pub min_cn0_db_hz: f64,
	pub min_healthy_fraction: f64,
	pub max_reacquisitions: usize,
	pub bit_sync_ms: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NavigationConfig {
	pub nav_period_ms: usize,
	/// Nominal signal travel time used to seed the receiver clock [ms]
	pub start_offset_ms: f64,
	pub elevation_mask_deg: f64,
	pub use_tropo_corr: bool,
	pub use_iono_corr: bool,
	pub weighted: bool,
	pub max_iterations: usize,
	pub convergence_m: f64,
}

impl Default for ReceiverConfig {
	fn default() -> Self {
		Self {
			sample_rate_hz: 18.0e6,
			intermediate_freq_hz: 20.0e3,
			sample_format: SampleFormat::I8,
			sample_layout: SampleLayout::Iq,
			skip_bytes: 0,
			ms_to_process: 60000,
			prns: (1..=32).collect(),
			channel_count: 10,
			block_ms: 100,
			acquisition: AcquisitionConfig::default(),
			tracking: TrackingConfig::default(),
			navigation: NavigationConfig::default(),
		}
	}
}

impl Default for AcquisitionConfig {
	fn default() -> Self {
		Self{ search_band_hz: 7000.0, search_step_hz: 500.0, non_coherent_ms: 10, threshold: 3.5,
			fine_step_hz: 25.0, fine_ms: 20 }
	}
}

impl Default for TrackingConfig {
	fn default() -> Self {
		Self {
			dll_bandwidth_hz: 1.5, dll_damping: 0.7, dll_gain: 1.0,
			pll_bandwidth_hz: 20.0, pll_damping: 0.7, pll_gain: 0.25,
			fll_bandwidth_hz: 0.0, fll_pull_in_ms: 100,
			correlator_spacing_chips: 0.5,
			cn0_window_ms: 40,
			lock_window_ms: 50,
			max_phase_error_cycles: 0.125,
			min_cn0_db_hz: 25.0,
			min_healthy_fraction: 0.6,
			max_reacquisitions: 3,
			bit_sync_ms: 400,
		}
	}
}

impl Default for NavigationConfig {
	fn default() -> Self {
		Self{ nav_period_ms: 500, start_offset_ms: 68.802, elevation_mask_deg: 5.0, use_tropo_corr: true,
			use_iono_corr: false, weighted: false, max_iterations: 10, convergence_m: 1.0e-4 }
	}
}

fn check(cond:bool, msg:&str) -> Result<(), DigSigProcErr> {
	if cond { Ok(()) } else { Err(DigSigProcErr::InvalidConfig(msg.to_string())) }
}

impl ReceiverConfig {

	pub fn from_json_file<P: AsRef<Path>>(path:P) -> Result<Self, DigSigProcErr> {
		let f = File::open(path.as_ref()).map_err(|e| DigSigProcErr::InvalidConfig(format!("{}: {}", path.as_ref().display(), e)))?;
		let cfg:Self = serde_json::from_reader(BufReader::new(f)).map_err(|e| DigSigProcErr::InvalidConfig(e.to_string()))?;
		cfg.validate()?;
		Ok(cfg)
	}

	pub fn samples_per_ms(&self) -> f64 { self.sample_rate_hz / 1000.0 }

	/// Number of samples in one code period, rounded to the nearest whole sample
	pub fn samples_per_code(&self) -> usize { self.samples_per_ms().round() as usize }

	/// Samples needed for one acquisition attempt, coarse and fine stages together
	pub fn acquisition_samples(&self) -> usize {
		let ms = self.acquisition.non_coherent_ms.max(self.acquisition.fine_ms + 1) + 1;
		(self.samples_per_ms() * ms as f64).ceil() as usize
	}

	pub fn epoch_samples(&self) -> usize { (self.samples_per_ms() * self.navigation.nav_period_ms as f64).round() as usize }

	/// Checks every tunable against its documented range
	pub fn validate(&self) -> Result<(), DigSigProcErr> {
		check(self.sample_rate_hz >= 1.023e6, "sample_rate_hz must be at least the chipping rate")?;
		check(self.intermediate_freq_hz.abs() < self.sample_rate_hz / 2.0, "intermediate_freq_hz must be below Nyquist")?;
		check(!self.prns.is_empty(), "prns must not be empty")?;
		check(self.prns.iter().all(|p| (1..=32).contains(p)), "prns must lie in 1 through 32")?;
		check(self.ms_to_process >= 1, "ms_to_process must be at least 1")?;
		check(self.channel_count >= 1, "channel_count must be at least 1")?;
		check(self.block_ms >= 1, "block_ms must be at least 1")?;

		let acq = &self.acquisition;
		check(acq.search_band_hz >= 0.0, "search_band_hz must be non-negative")?;
		check(acq.search_step_hz > 0.0, "search_step_hz must be positive")?;
		check(acq.non_coherent_ms >= 1, "non_coherent_ms must be at least 1")?;
		check(acq.threshold > 1.0, "threshold must exceed 1.0")?;
		check(acq.fine_step_hz > 0.0 && acq.fine_step_hz <= acq.search_step_hz, "fine_step_hz must be in (0, search_step_hz]")?;
		check(acq.fine_ms >= 20 && acq.fine_ms % 20 == 0, "fine_ms must be a positive multiple of 20")?;

		let trk = &self.tracking;
		check(trk.dll_bandwidth_hz > 0.0 && trk.pll_bandwidth_hz > 0.0, "loop bandwidths must be positive")?;
		check(trk.dll_damping > 0.0 && trk.dll_damping <= 2.0, "dll_damping must be in (0, 2]")?;
		check(trk.pll_damping > 0.0 && trk.pll_damping <= 2.0, "pll_damping must be in (0, 2]")?;
		check(trk.dll_gain > 0.0 && trk.pll_gain > 0.0, "loop gains must be positive")?;
		check(trk.fll_bandwidth_hz >= 0.0, "fll_bandwidth_hz must be non-negative")?;
		check(trk.correlator_spacing_chips > 0.0 && trk.correlator_spacing_chips <= 1.0, "correlator_spacing_chips must be in (0, 1]")?;
		check(trk.cn0_window_ms >= 2, "cn0_window_ms must be at least 2")?;
		check(trk.lock_window_ms >= 1, "lock_window_ms must be at least 1")?;
		check(trk.max_phase_error_cycles > 0.0 && trk.max_phase_error_cycles <= 0.25, "max_phase_error_cycles must be in (0, 0.25]")?;
		check(trk.min_healthy_fraction >= 0.0 && trk.min_healthy_fraction <= 1.0, "min_healthy_fraction must be in [0, 1]")?;
		check(trk.bit_sync_ms >= 40 && trk.bit_sync_ms % 20 == 0, "bit_sync_ms must be a multiple of 20 and at least 40")?;

		let nav = &self.navigation;
		check(nav.nav_period_ms >= 1, "nav_period_ms must be at least 1")?;
		check(nav.elevation_mask_deg >= 0.0 && nav.elevation_mask_deg < 90.0, "elevation_mask_deg must be in [0, 90)")?;
		check(nav.max_iterations >= 1, "max_iterations must be at least 1")?;
		check(nav.convergence_m > 0.0, "convergence_m must be positive")?;

		Ok(())
	}

}
