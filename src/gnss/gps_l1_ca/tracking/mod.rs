use std::collections::VecDeque;
use std::f64::consts;

use log::{debug, info, warn};
use num_complex::Complex;
use serde::{Serialize, Deserialize};

use crate::{DigSigProcErr, Sample};
use crate::config::{ReceiverConfig, TrackingConfig};
use crate::filters::{ScalarFilter, ProportionalIntegral, FrequencyLockAssist};
use crate::gnss::common::acquisition::{self, Acquisition, AcquisitionResult, two_stage_pcps};
use crate::gnss::common::tracking::ChannelSnapshot;
use crate::gnss::common::tracking::lock_detectors;
use crate::gnss::gps_l1_ca::{signal_modulation, CHIP_RATE_HZ, CODE_LENGTH, L1_FREQ_HZ};

pub const SYMBOL_LEN_SEC:f64 = 1.0e-3;

const ZERO:Complex<f64> = Complex{ re: 0.0, im: 0.0 };

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum TrackingState {
	Initializing,
	Locked,
	LossOfLock{ attempts: usize },
	Terminated,
}

#[derive(Debug)]
pub enum TrackingResult {
	NotReady,
	Ok(ChannelSnapshot),
	/// Lock was lost at the end of the period with this snapshot
	LostLock(ChannelSnapshot),
	/// Tracking restarts from this acquisition; everything derived from the previous track is stale
	Reacquired(AcquisitionResult),
	Terminated,
	Err(DigSigProcErr),
}

/// Delay and phase lock loops for one satellite, advanced one sample at a time.  When lock is lost the channel
/// feeds samples to its own acquisition engine until it either finds the satellite again or runs out of attempts.
pub struct Tracking<A: Acquisition> {
	pub prn: usize,
	pub fs: f64,
	pub intermediate_freq_hz: f64,
	cfg: TrackingConfig,
	local_code: Vec<i8>,
	state: TrackingState,
	reacquisition: A,

	// First sample of the current track
	start_idx: usize,
	ms_count: usize,

	// Carrier and code
	acq_freq_hz: f64,
	carrier: Complex<f64>,
	carrier_inc: Complex<f64>,
	carrier_freq_hz: f64,
	code_phase: f64,
	code_freq_hz: f64,

	dll: ProportionalIntegral,
	pll: ProportionalIntegral,
	fll: Option<FrequencyLockAssist>,

	// Used during summation over the 1 [ms] interval
	sum_early:  Complex<f64>,
	sum_prompt: Complex<f64>,
	sum_late:   Complex<f64>,
	prev_prompt: Option<Complex<f64>>,

	// Lock detection
	prompt_window: VecDeque<Complex<f64>>,
	health_window: VecDeque<bool>,
	cn0_db_hz: Option<f64>,
}

fn chip_idx(code_phase:f64) -> usize { (code_phase.floor() as i64).rem_euclid(CODE_LENGTH as i64) as usize }

impl<A: Acquisition> Tracking<A> {

	pub fn new(prn:usize, cfg:&ReceiverConfig, reacquisition:A) -> Result<Self, DigSigProcErr> {
		let trk = cfg.tracking.clone();
		let dll = ProportionalIntegral::from_bandwidth(trk.dll_bandwidth_hz, trk.dll_damping, trk.dll_gain, SYMBOL_LEN_SEC);
		let pll = ProportionalIntegral::from_bandwidth(trk.pll_bandwidth_hz, trk.pll_damping, trk.pll_gain, SYMBOL_LEN_SEC);
		let fll = if trk.fll_bandwidth_hz > 0.0 { Some(FrequencyLockAssist::new(trk.fll_bandwidth_hz, SYMBOL_LEN_SEC)) } else { None };

		Ok(Self{ prn, fs: cfg.sample_rate_hz, intermediate_freq_hz: cfg.intermediate_freq_hz, cfg: trk,
			local_code: signal_modulation::prn_int(prn)?, state: TrackingState::Initializing, reacquisition,
			start_idx: 0, ms_count: 0,
			acq_freq_hz: cfg.intermediate_freq_hz, carrier: Complex{ re: 1.0, im: 0.0 }, carrier_inc: Complex{ re: 1.0, im: 0.0 },
			carrier_freq_hz: cfg.intermediate_freq_hz, code_phase: 0.0, code_freq_hz: CHIP_RATE_HZ,
			dll, pll, fll,
			sum_early: ZERO, sum_prompt: ZERO, sum_late: ZERO, prev_prompt: None,
			prompt_window: VecDeque::new(), health_window: VecDeque::new(), cn0_db_hz: None })
	}

	pub fn state(&self) -> TrackingState { self.state }
	pub fn is_locked(&self) -> bool { self.state == TrackingState::Locked }
	pub fn carrier_freq_hz(&self) -> f64 { self.carrier_freq_hz }
	pub fn doppler_hz(&self) -> f64 { self.carrier_freq_hz - self.intermediate_freq_hz }
	pub fn code_freq_hz(&self) -> f64 { self.code_freq_hz }
	pub fn cn0_db_hz(&self) -> Option<f64> { self.cn0_db_hz }
	pub fn start_idx(&self) -> usize { self.start_idx }

	/// Whole code periods completed since the current track started
	pub fn ms_count(&self) -> usize { self.ms_count }

	/// Replica code phase [chips] for the next sample to be processed
	pub fn code_phase_chips(&self) -> f64 { self.code_phase }

	/// Seeds the loops from an acquisition.  Tracking begins with the first code period boundary at or after
	/// `not_before`, projected forward from the acquired code phase.
	pub fn initialize(&mut self, acq:&AcquisitionResult, not_before:usize) {
		let samples_per_code:f64 = self.fs * (CODE_LENGTH as f64) / (CHIP_RATE_HZ * (1.0 + acq.doppler_hz / L1_FREQ_HZ));
		let first:usize = acq.sample_idx + acq.code_phase;
		self.start_idx = if first >= not_before { first } else {
			let k = ((not_before - first) as f64 / samples_per_code).ceil();
			first + (k * samples_per_code).round() as usize
		};
		self.ms_count = 0;

		self.acq_freq_hz = acq.carrier_freq_hz;
		self.carrier_freq_hz = acq.carrier_freq_hz;
		self.carrier = Complex{ re: 1.0, im: 0.0 };
		self.carrier_inc = Self::phase_increment(self.carrier_freq_hz, self.fs);

		self.code_phase = 0.0;
		self.code_freq_hz = CHIP_RATE_HZ * (1.0 + acq.doppler_hz / L1_FREQ_HZ);

		self.dll.initialize();
		self.pll.initialize();
		if let Some(fll) = self.fll.as_mut() { fll.initialize(); }

		self.sum_early  = ZERO;
		self.sum_prompt = ZERO;
		self.sum_late   = ZERO;
		self.prev_prompt = None;
		self.prompt_window.clear();
		self.health_window.clear();
		self.cn0_db_hz = None;

		debug!("PRN {:02}: {:?} -> Locked, doppler {:.1} [Hz], first sample {}", self.prn, self.state, acq.doppler_hz, self.start_idx);
		self.state = TrackingState::Locked;
	}

	fn phase_increment(freq_hz:f64, fs:f64) -> Complex<f64> {
		let dphase_rad = 2.0 * consts::PI * freq_hz / fs;
		Complex{ re: dphase_rad.cos(), im: -dphase_rad.sin() }
	}

	pub fn apply(&mut self, sample:&Sample) -> TrackingResult {
		match self.state {
			TrackingState::Initializing | TrackingState::Terminated => TrackingResult::NotReady,
			TrackingState::LossOfLock{ attempts } => self.reacquire(sample, attempts),
			TrackingState::Locked => {
				if sample.idx < self.start_idx { return TrackingResult::NotReady; }

				// Remove the carrier from the new sample, then increment the carrier phase
				let x = sample.val * self.carrier;
				self.carrier = self.carrier * self.carrier_inc;

				// Integrate early, prompt, and late sums
				let spacing = self.cfg.correlator_spacing_chips;
				self.sum_early  += x * (self.local_code[chip_idx(self.code_phase - spacing)] as f64);
				self.sum_prompt += x * (self.local_code[chip_idx(self.code_phase)] as f64);
				self.sum_late   += x * (self.local_code[chip_idx(self.code_phase + spacing)] as f64);

				self.code_phase += self.code_freq_hz / self.fs;

				if self.code_phase >= CODE_LENGTH as f64 {
					// End of a 1-ms coherent interval; the remainder carries into the next one
					self.code_phase -= CODE_LENGTH as f64;
					self.end_of_period(sample.idx)
				} else { TrackingResult::NotReady }
			},
		}
	}

	fn end_of_period(&mut self, sample_idx:usize) -> TrackingResult {
		let (e, p, l) = (self.sum_early, self.sum_prompt, self.sum_late);

		// Code loop, carrier aided
		let dll_discr:f64 = {
			let (en, ln) = (e.norm(), l.norm());
			if en + ln == 0.0 { 0.0 } else { (en - ln) / (en + ln) }
		};
		let dll_nco_hz = self.dll.apply(dll_discr);

		// Carrier loop.  The in-phase sign wipes the data bit first, so this is a two-quadrant (Costas) angle in
		// [-0.25, 0.25] [cycles] rather than a full four-quadrant one
		let pll_discr:f64 = if p == ZERO { 0.0 } else { (p.im * p.re.signum()).atan2(p.re.abs()) / (2.0 * consts::PI) };
		let pll_nco_hz = self.pll.apply(pll_discr);

		let mut fll_discr_hz:f64 = 0.0;
		if let (Some(fll), Some(prev)) = (self.fll.as_mut(), self.prev_prompt) {
			if self.ms_count < self.cfg.fll_pull_in_ms {
				let cross = prev.re * p.im - prev.im * p.re;
				let dot   = prev.re * p.re + prev.im * p.im;
				fll_discr_hz = (cross * dot.signum()).atan2(dot.abs()) / (2.0 * consts::PI * SYMBOL_LEN_SEC);
				fll.apply(fll_discr_hz);
			}
		}
		let fll_hz = self.fll.as_ref().map(|f| f.output()).unwrap_or(0.0);

		self.carrier_freq_hz = self.acq_freq_hz + pll_nco_hz + fll_hz;
		self.carrier_inc = Self::phase_increment(self.carrier_freq_hz, self.fs);
		self.code_freq_hz = CHIP_RATE_HZ * (1.0 + self.doppler_hz() / L1_FREQ_HZ) - dll_nco_hz;

		// Normalize the carrier at the end of every period
		self.carrier = self.carrier / self.carrier.norm();

		// Signal quality over the sliding windows
		self.prompt_window.push_back(p);
		while self.prompt_window.len() > self.cfg.cn0_window_ms { self.prompt_window.pop_front(); }
		let warmed_up = self.prompt_window.len() >= self.cfg.cn0_window_ms;
		if warmed_up { self.cn0_db_hz = lock_detectors::cn0_vsm_estimator(&self.prompt_window, SYMBOL_LEN_SEC); }
		let carrier_lock = lock_detectors::carrier_lock_detector(&self.prompt_window);

		let cn0_ok = !warmed_up || self.cn0_db_hz.map(|c| c >= self.cfg.min_cn0_db_hz).unwrap_or(false);
		self.health_window.push_back(pll_discr.abs() <= self.cfg.max_phase_error_cycles && cn0_ok);
		while self.health_window.len() > self.cfg.lock_window_ms { self.health_window.pop_front(); }

		let healthy_fraction = self.health_window.iter().filter(|h| **h).count() as f64 / self.health_window.len() as f64;
		let lost = self.health_window.len() >= self.cfg.lock_window_ms && healthy_fraction < self.cfg.min_healthy_fraction;

		self.ms_count += 1;
		self.prev_prompt = Some(p);
		self.sum_early  = ZERO;
		self.sum_prompt = ZERO;
		self.sum_late   = ZERO;

		let snapshot = ChannelSnapshot{ prn: self.prn, sample_idx, ms_count: self.ms_count,
			i_e: e.re, q_e: e.im, i_p: p.re, q_p: p.im, i_l: l.re, q_l: l.im,
			dll_discr, dll_nco_hz, pll_discr, pll_nco_hz, fll_discr_hz,
			carrier_freq_hz: self.carrier_freq_hz, doppler_hz: self.doppler_hz(), code_freq_hz: self.code_freq_hz,
			rem_code_phase: self.code_phase, cn0_db_hz: self.cn0_db_hz, carrier_lock, locked: !lost };

		if lost {
			warn!("PRN {:02}: loss of lock after {} [ms], healthy fraction {:.2}", self.prn, self.ms_count, healthy_fraction);
			self.state = TrackingState::LossOfLock{ attempts: 0 };
			if self.cfg.max_reacquisitions == 0 { self.terminate(); }
			TrackingResult::LostLock(snapshot)
		} else {
			TrackingResult::Ok(snapshot)
		}
	}

	fn reacquire(&mut self, sample:&Sample, attempts:usize) -> TrackingResult {
		if let Err(e) = self.reacquisition.provide_sample(sample) { return TrackingResult::Err(e); }

		match self.reacquisition.block_for_result() {
			Ok(Some(acq)) if acq.detected => {
				info!("PRN {:02}: reacquired, doppler {:.1} [Hz], metric {:.2}", self.prn, acq.doppler_hz, acq.peak_metric);
				self.initialize(&acq, sample.idx + 1);
				TrackingResult::Reacquired(acq)
			},
			Ok(Some(_)) => {
				let attempts = attempts + 1;
				if attempts >= self.cfg.max_reacquisitions {
					self.terminate();
					TrackingResult::Terminated
				} else {
					debug!("PRN {:02}: reacquisition attempt {} failed", self.prn, attempts);
					self.state = TrackingState::LossOfLock{ attempts };
					TrackingResult::NotReady
				}
			},
			Ok(None) => TrackingResult::NotReady,
			Err(e) => TrackingResult::Err(e),
		}
	}

	fn terminate(&mut self) {
		warn!("PRN {:02}: channel terminated", self.prn);
		self.state = TrackingState::Terminated;
	}

}

pub fn new_default_tracker(prn:usize, cfg:&ReceiverConfig) -> Result<Tracking<two_stage_pcps::Acquisition>, DigSigProcErr> {
	Tracking::new(prn, cfg, acquisition::make_acquisition(prn, cfg)?)
}

#[cfg(test)]
mod tests {

	use super::*;
	use crate::gnss::gps_l1_ca::test_signal::{self, SignalSpec};

	fn test_config() -> ReceiverConfig {
		let mut cfg = ReceiverConfig::default();
		cfg.sample_rate_hz = 2.046e6;
		cfg.intermediate_freq_hz = 5.0e3;
		cfg.acquisition.search_band_hz = 5000.0;
		cfg
	}

	fn seed(spec:&SignalSpec, doppler_err_hz:f64) -> AcquisitionResult {
		AcquisitionResult{ prn: spec.prn, detected: true, carrier_freq_hz: spec.if_hz + spec.doppler_hz + doppler_err_hz,
			doppler_hz: spec.doppler_hz + doppler_err_hz, doppler_step_hz: 25.0,
			code_phase: spec.code_start_sample.round() as usize, sample_idx: 0, peak_metric: 10.0 }
	}

	fn run(trk:&mut Tracking<two_stage_pcps::Acquisition>, signal:&[Complex<f64>]) -> Vec<TrackingResult> {
		signal.iter().enumerate()
			.map(|(idx, val)| trk.apply(&Sample{ val: *val, idx }))
			.filter(|r| !matches!(r, TrackingResult::NotReady))
			.collect()
	}

	fn mean(xs:&[&ChannelSnapshot], f:fn(&ChannelSnapshot) -> f64) -> f64 {
		xs.iter().map(|s| f(s)).sum::<f64>() / xs.len() as f64
	}

	fn snapshots(results:&[TrackingResult]) -> Vec<&ChannelSnapshot> {
		results.iter().filter_map(|r| match r { TrackingResult::Ok(s) => Some(s), _ => None }).collect()
	}

	#[test]
	fn starts_on_the_next_code_boundary() {
		let cfg = test_config();
		let mut trk = new_default_tracker(3, &cfg).unwrap();
		assert_eq!(trk.state(), TrackingState::Initializing);

		let acq = AcquisitionResult{ prn: 3, detected: true, carrier_freq_hz: 5.0e3, doppler_hz: 0.0, code_phase: 100,
			sample_idx: 1000, ..Default::default() };
		trk.initialize(&acq, 5000);
		assert_eq!(trk.state(), TrackingState::Locked);
		assert_eq!(trk.start_idx(), 1100 + 2*2046);
	}

	#[test]
	fn converges_and_stays_locked() {
		let cfg = test_config();
		let mut spec = SignalSpec::new(5, cfg.sample_rate_hz, 1500.0, 800.0).with_cn0(45.0);
		spec.if_hz = cfg.intermediate_freq_hz;
		spec.bits = vec![false, true, true, false, true, false, false, false, true, true];

		let mut trk = new_default_tracker(5, &cfg).unwrap();
		trk.initialize(&seed(&spec, 10.0), 0);

		let results = run(&mut trk, &spec.generate(2046 * 600));
		assert!(results.iter().all(|r| matches!(r, TrackingResult::Ok(_))));

		let snaps = snapshots(&results);
		assert!(snaps.len() >= 598);
		let tail = &snaps[snaps.len()-200..];
		assert!(mean(tail, |s| s.pll_discr.abs()) < 0.04);
		assert!(mean(tail, |s| s.dll_discr).abs() < 0.05);
		assert!((mean(tail, |s| s.doppler_hz) - 1500.0).abs() < 1.0);
		assert!(tail.iter().all(|s| s.locked && s.cn0_db_hz.unwrap() > 38.0));
		assert!(tail.iter().all(|s| s.carrier_lock > 0.8));
	}

	#[test]
	fn frequency_assist_pulls_in_large_seed_errors() {
		let mut cfg = test_config();
		cfg.tracking.fll_bandwidth_hz = 10.0;
		let pull_in = cfg.tracking.fll_pull_in_ms;

		for err in [-60.0, 30.0, 60.0].iter() {
			let mut spec = SignalSpec::new(17, cfg.sample_rate_hz, 1500.0, 600.0).with_cn0(48.0);
			spec.if_hz = cfg.intermediate_freq_hz;

			let mut trk = new_default_tracker(17, &cfg).unwrap();
			trk.initialize(&seed(&spec, *err), 0);

			let results = run(&mut trk, &spec.generate(2046 * 600));
			let snaps = snapshots(&results);

			// Active only during pull-in, and it sees the seed error with the opposite sign
			assert!(snaps.iter().filter(|s| s.ms_count <= pull_in).any(|s| s.fll_discr_hz != 0.0));
			assert!(snaps.iter().filter(|s| s.ms_count > pull_in).all(|s| s.fll_discr_hz == 0.0));
			if err.abs() >= 60.0 { assert!(mean(&snaps[1..11], |s| s.fll_discr_hz) * err < 0.0); }

			let tail = &snaps[snaps.len()-200..];
			assert!((mean(tail, |s| s.doppler_hz) - 1500.0).abs() < 1.0, "seed error {}", err);
			assert!(tail.iter().all(|s| s.locked));
			assert!(trk.is_locked());
		}
	}

	#[test]
	fn follows_a_doppler_step() {
		let cfg = test_config();
		let mut spec = SignalSpec::new(12, cfg.sample_rate_hz, -2200.0, 150.0).with_cn0(48.0);
		spec.if_hz = cfg.intermediate_freq_hz;
		spec.doppler_step = Some((0.3, -2195.0));

		let mut trk = new_default_tracker(12, &cfg).unwrap();
		trk.initialize(&seed(&spec, -5.0), 0);

		let results = run(&mut trk, &spec.generate(2046 * 700));
		assert!(results.iter().all(|r| matches!(r, TrackingResult::Ok(_))));

		let snaps = snapshots(&results);
		// The NCO frequency is noisy from one period to the next, so compare averages
		let before = mean(&snaps[230..280], |s| s.doppler_hz);
		let after = mean(&snaps[snaps.len()-100..], |s| s.doppler_hz);
		assert!((before + 2200.0).abs() < 1.0);
		assert!((after + 2195.0).abs() < 1.0);
		assert!(snaps[300..400].iter().all(|s| s.pll_discr.abs() < 0.125));
	}

	#[test]
	fn noise_terminates_after_bounded_retries() {
		let mut cfg = test_config();
		cfg.tracking.max_reacquisitions = 2;

		let mut trk = new_default_tracker(20, &cfg).unwrap();
		let spec = SignalSpec{ if_hz: cfg.intermediate_freq_hz, ..SignalSpec::new(20, cfg.sample_rate_hz, 0.0, 0.0) };
		trk.initialize(&seed(&spec, 0.0), 0);

		let results = run(&mut trk, &test_signal::noise(2046 * 400, 10.0, 77));
		let lost = results.iter().position(|r| matches!(r, TrackingResult::LostLock(_))).unwrap();
		let terminated = results.iter().position(|r| matches!(r, TrackingResult::Terminated)).unwrap();
		assert!(lost < terminated);
		assert!(!results.iter().any(|r| matches!(r, TrackingResult::Reacquired(_))));
		assert_eq!(trk.state(), TrackingState::Terminated);
		assert_eq!(results.last().map(|r| matches!(r, TrackingResult::Terminated)), Some(true));
	}

	#[test]
	fn wrong_code_phase_is_recovered_by_reacquisition() {
		let cfg = test_config();
		let mut spec = SignalSpec::new(9, cfg.sample_rate_hz, 700.0, 1200.0).with_cn0(47.0);
		spec.if_hz = cfg.intermediate_freq_hz;

		let mut trk = new_default_tracker(9, &cfg).unwrap();
		let mut bad = seed(&spec, 0.0);
		bad.code_phase = 400;
		trk.initialize(&bad, 0);

		let results = run(&mut trk, &spec.generate(2046 * 400));
		let lost = results.iter().position(|r| matches!(r, TrackingResult::LostLock(_))).unwrap();
		let reacq = results.iter().position(|r| matches!(r, TrackingResult::Reacquired(_))).unwrap();
		assert!(lost < reacq);

		if let TrackingResult::Reacquired(acq) = &results[reacq] {
			let spc = 2046;
			let offset = (acq.sample_idx + acq.code_phase) as i64 - 1200;
			assert!(offset.rem_euclid(spc).min(spc - offset.rem_euclid(spc)) <= 1);
		}

		assert!(trk.is_locked());
		let tail = snapshots(&results[reacq..]);
		assert!(tail.len() > 200);
		assert!(tail[tail.len()-50..].iter().all(|s| s.pll_discr.abs() < 0.125));
	}

}
