use std::f64::consts;

use num_complex::Complex;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand_distr::{Distribution, Normal};

use crate::gnss::gps_l1_ca::{signal_modulation, CHIP_RATE_HZ, CODE_LENGTH, L1_FREQ_HZ, MS_PER_BIT};

/// Synthetic C/A signal: a single satellite with optional data bits, a Doppler step and white complex noise
#[derive(Debug, Clone)]
pub struct SignalSpec {
	pub prn: usize,
	pub fs: f64,
	pub if_hz: f64,
	pub doppler_hz: f64,
	/// (time [s], new Doppler [Hz])
	pub doppler_step: Option<(f64, f64)>,
	/// Fractional sample index at which chip 0 of a code period begins
	pub code_start_sample: f64,
	pub amplitude: f64,
	pub noise_sigma: f64,
	pub bits: Vec<bool>,
	pub seed: u64,
}

impl SignalSpec {

	pub fn new(prn:usize, fs:f64, doppler_hz:f64, code_start_sample:f64) -> Self {
		Self{ prn, fs, if_hz: 0.0, doppler_hz, doppler_step: None, code_start_sample, amplitude: 1.0,
			noise_sigma: 0.0, bits: vec![], seed: prn as u64 }
	}

	/// Sets the noise level for a carrier-to-noise density ratio, noise counted over the full complex bandwidth
	pub fn with_cn0(mut self, cn0_db_hz:f64) -> Self {
		self.noise_sigma = self.amplitude * (self.fs / (2.0 * (10.0_f64).powf(cn0_db_hz / 10.0))).sqrt();
		self
	}

	fn integrate(&self, t:f64, rate_at:impl Fn(f64) -> f64) -> f64 {
		match self.doppler_step {
			Some((ts, d1)) if t > ts => rate_at(self.doppler_hz) * ts + rate_at(d1) * (t - ts),
			_ => rate_at(self.doppler_hz) * t,
		}
	}

	pub fn generate(&self, n:usize) -> Vec<Complex<f64>> {
		let code = signal_modulation::prn_int(self.prn).unwrap();
		let mut rng = StdRng::seed_from_u64(self.seed);
		let noise = Normal::new(0.0, self.noise_sigma.max(1.0e-300)).unwrap();

		let code_rate = |d:f64| CHIP_RATE_HZ * (1.0 + d / L1_FREQ_HZ);
		let chips0 = self.integrate(self.code_start_sample / self.fs, code_rate);
		(0..n).map(|k| {
			let t = k as f64 / self.fs;
			let chips = self.integrate(t, code_rate) - chips0;
			let chip_idx = chips.floor().rem_euclid(CODE_LENGTH as f64) as usize;

			let data:f64 = if self.bits.is_empty() { 1.0 } else {
				let bit_idx = (chips / (CODE_LENGTH * MS_PER_BIT) as f64).floor().rem_euclid(self.bits.len() as f64) as usize;
				if self.bits[bit_idx] { -1.0 } else { 1.0 }
			};

			let phase = 2.0 * consts::PI * self.integrate(t, |d| self.if_hz + d);
			let clean = Complex{ re: phase.cos(), im: phase.sin() } * (self.amplitude * data * code[chip_idx] as f64);
			if self.noise_sigma > 0.0 {
				clean + Complex{ re: noise.sample(&mut rng), im: noise.sample(&mut rng) }
			} else { clean }
		}).collect()
	}

}

/// White complex noise only
pub fn noise(n:usize, sigma:f64, seed:u64) -> Vec<Complex<f64>> {
	let mut rng = StdRng::seed_from_u64(seed);
	let dist = Normal::new(0.0, sigma).unwrap();
	(0..n).map(|_| Complex{ re: dist.sample(&mut rng), im: dist.sample(&mut rng) }).collect()
}
