use std::sync::Arc;

use log::{debug, info};
use serde::{Serialize, Deserialize};

use crate::{DigSigProcErr, Sample};
use crate::config::ReceiverConfig;
use crate::gnss::gps_l1_ca::signal_modulation;
use crate::io::SampleBlock;

pub mod basic_pcps;
pub mod two_stage_pcps;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AcquisitionResult {
	pub prn: usize,
	pub detected: bool,
	/// Carrier estimate including the intermediate frequency [Hz]
	pub carrier_freq_hz: f64,
	pub doppler_hz: f64,
	/// Resolution of the frequency grid the estimate came from
	pub doppler_step_hz: f64,
	/// Offset in samples from `sample_idx` to the first sample of a code period
	pub code_phase: usize,
	/// Stream index of the first sample of the searched data
	pub sample_idx: usize,
	pub peak_metric: f64,
}

/// Streaming interface: samples go in one at a time and a result comes out once enough have been buffered.
/// A result is returned whether or not the satellite was detected.
pub trait Acquisition: Send {
	fn provide_sample(&mut self, sample:&Sample) -> Result<(), DigSigProcErr>;
	fn block_for_result(&mut self) -> Result<Option<AcquisitionResult>, DigSigProcErr>;
}

/// Carrier frequencies of the coarse search grid, symmetric about the IF
pub fn coarse_freqs(cfg:&ReceiverConfig) -> Vec<f64> {
	let n:i64 = (cfg.acquisition.search_band_hz / cfg.acquisition.search_step_hz).floor() as i64;
	(-n..=n).map(|k| cfg.intermediate_freq_hz + (k as f64) * cfg.acquisition.search_step_hz).collect()
}

pub fn make_acquisition(prn:usize, cfg:&ReceiverConfig) -> Result<two_stage_pcps::Acquisition, DigSigProcErr> {
	let acq = &cfg.acquisition;
	let code_table = signal_modulation::prn_int_sampled(prn, cfg.sample_rate_hz)?;

	Ok(two_stage_pcps::Acquisition::new(prn, code_table, cfg.sample_rate_hz, cfg.intermediate_freq_hz, coarse_freqs(cfg),
		acq.non_coherent_ms, acq.search_step_hz, acq.fine_step_hz, acq.fine_ms, acq.threshold, cfg.acquisition_samples()))
}

/// Searches one PRN at the start of a block.  A block too short for the search yields an undetected result.
pub fn search(block:&SampleBlock, prn:usize, cfg:&ReceiverConfig) -> Result<AcquisitionResult, DigSigProcErr> {
	let acq = make_acquisition(prn, cfg)?;
	if block.len() < acq.required_len() {
		debug!("PRN {}: block of {} samples is too short for acquisition", prn, block.len());
		return Ok(AcquisitionResult{ prn, sample_idx: block.start_idx, ..Default::default() });
	}

	Ok(acq.search(&block.samples[..acq.required_len()], block.start_idx))
}

/// Searches every configured PRN in parallel on the blocking thread pool.  Results come back in PRN list order.
pub async fn acquire_all(block:Arc<SampleBlock>, cfg:Arc<ReceiverConfig>) -> Result<Vec<AcquisitionResult>, DigSigProcErr> {
	let handles:Vec<_> = cfg.prns.iter().map(|prn| {
		let (block, cfg, prn) = (block.clone(), cfg.clone(), *prn);
		tokio::task::spawn_blocking(move || search(&block, prn, &cfg))
	}).collect();

	let mut results:Vec<AcquisitionResult> = Vec::with_capacity(handles.len());
	for handle in handles {
		let result = handle.await.map_err(|_| DigSigProcErr::Other("acquisition task failed to complete"))??;
		if result.detected {
			info!("Acquired PRN {:02}: doppler {:8.1} [Hz], code phase {:6} [samples], metric {:.2}",
				result.prn, result.doppler_hz, result.code_phase, result.peak_metric);
		} else {
			debug!("PRN {:02} not acquired, metric {:.2}", result.prn, result.peak_metric);
		}
		results.push(result);
	}

	Ok(results)
}

#[cfg(test)]
mod tests {

	use num_complex::Complex;
	use rstest::rstest;

	use super::*;
	use crate::io::{SampleFormat, SampleLayout};
	use crate::gnss::gps_l1_ca::test_signal::{self, SignalSpec};

	fn test_config() -> ReceiverConfig {
		let mut cfg = ReceiverConfig::default();
		cfg.sample_rate_hz = 2.046e6;
		cfg.intermediate_freq_hz = 10.0e3;
		cfg.acquisition.search_band_hz = 5000.0;
		cfg
	}

	fn block_of(samples:Vec<Complex<f64>>, fs:f64) -> SampleBlock {
		SampleBlock{ start_idx: 0, fs, format: SampleFormat::I8, layout: SampleLayout::Iq, samples }
	}

	#[test]
	fn coarse_grid_is_symmetric() {
		let freqs = coarse_freqs(&test_config());
		assert_eq!(freqs.len(), 21);
		assert_eq!(freqs[0], 5000.0);
		assert_eq!(freqs[10], 10000.0);
		assert_eq!(freqs[20], 15000.0);
	}

	#[rstest]
	#[case(1, 1234.0, 1500.3)]
	#[case(7, -3210.0, 12.0)]
	#[case(19, 480.0, 2001.6)]
	#[case(32, -4444.0, 777.0)]
	fn synthetic_satellite_is_found(#[case] prn:usize, #[case] doppler_hz:f64, #[case] code_start:f64) {
		let cfg = test_config();
		let mut spec = SignalSpec::new(prn, cfg.sample_rate_hz, doppler_hz, code_start).with_cn0(45.0);
		spec.if_hz = cfg.intermediate_freq_hz;
		let block = block_of(spec.generate(cfg.acquisition_samples()), cfg.sample_rate_hz);

		let result = search(&block, prn, &cfg).unwrap();
		assert!(result.detected);
		assert!(result.peak_metric > cfg.acquisition.threshold);
		assert!((result.code_phase as f64 - code_start.round()).abs() <= 1.0);
		assert!((result.doppler_hz - doppler_hz).abs() <= 25.0);
		assert!((result.carrier_freq_hz - result.doppler_hz - cfg.intermediate_freq_hz).abs() < 1.0e-9);
	}

	#[test]
	fn noise_is_never_detected() {
		let cfg = test_config();
		let block = block_of(test_signal::noise(cfg.acquisition_samples(), 8.0, 42), cfg.sample_rate_hz);
		for prn in 1..=32 {
			let result = search(&block, prn, &cfg).unwrap();
			assert!(!result.detected, "PRN {} detected in noise", prn);
			assert!(result.peak_metric < cfg.acquisition.threshold);
		}
	}

	#[test]
	fn short_block_is_a_negative_result() {
		let cfg = test_config();
		let block = block_of(vec![Complex{ re: 1.0, im: 0.0 }; 100], cfg.sample_rate_hz);
		let result = search(&block, 3, &cfg).unwrap();
		assert!(!result.detected);
		assert_eq!(result.prn, 3);
	}

	#[tokio::test]
	async fn parallel_search_over_prn_list() {
		let mut cfg = test_config();
		cfg.prns = vec![4, 9, 22];
		let n = cfg.acquisition_samples();

		let a = SignalSpec{ if_hz: cfg.intermediate_freq_hz, ..SignalSpec::new(4, cfg.sample_rate_hz, 2100.0, 400.0).with_cn0(47.0) }.generate(n);
		let b = SignalSpec{ if_hz: cfg.intermediate_freq_hz, ..SignalSpec::new(22, cfg.sample_rate_hz, -900.0, 1700.0).with_cn0(47.0) }.generate(n);
		let samples:Vec<Complex<f64>> = a.iter().zip(b.iter()).map(|(x, y)| x + y).collect();

		let results = acquire_all(Arc::new(block_of(samples, cfg.sample_rate_hz)), Arc::new(cfg)).await.unwrap();
		let prns:Vec<usize> = results.iter().map(|r| r.prn).collect();
		assert_eq!(prns, vec![4, 9, 22]);
		assert!(results[0].detected);
		assert!(!results[1].detected);
		assert!(results[2].detected);
	}

}
