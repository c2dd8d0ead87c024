use std::f64::consts;
use std::sync::Arc;

use num_complex::Complex;
use num_traits::Zero;
use rustfft::{Fft, FftPlanner};

/// Output of a coarse parallel code phase search
#[derive(Debug, Clone, Copy)]
pub struct CoarseResult {
	pub carrier_freq_hz: f64,
	pub code_phase: usize,
	pub peak: f64,
	pub second_peak: f64,
}

impl CoarseResult {

	pub fn peak_metric(&self) -> f64 {
		if self.second_peak > 0.0 { self.peak / self.second_peak } else { 0.0 }
	}

}

/// Parallel code phase search: for every candidate carrier frequency, circular correlation against one code
/// period is done in the frequency domain and the squared magnitudes are accumulated non-coherently.
pub struct Acquisition {
	pub fs:f64,
	pub carrier_freqs:Vec<f64>,
	pub non_coherent:usize,
	pub len_fft:usize,
	samples_per_chip:f64,
	fft:Arc<dyn Fft<f64>>,
	ifft:Arc<dyn Fft<f64>>,
	local_code_freq_domain:Vec<Complex<f64>>,
}

impl Acquisition {

	pub fn new(symbol:&[i8], fs:f64, carrier_freqs:Vec<f64>, non_coherent:usize) -> Self {
		let len_fft:usize = symbol.len();

		let mut planner = FftPlanner::new();
		let fft = planner.plan_fft_forward(len_fft);
		let ifft = planner.plan_fft_inverse(len_fft);

		// Forward FFT of the local code, conjugated once here so every search is a plain multiplication
		let mut local_code_freq_domain: Vec<Complex<f64>> = symbol.iter().map(|b| Complex{ re: *b as f64, im: 0.0 }).collect();
		fft.process(&mut local_code_freq_domain);
		for c in local_code_freq_domain.iter_mut() { *c = c.conj(); }

		let samples_per_chip:f64 = fs / crate::gnss::gps_l1_ca::CHIP_RATE_HZ;

		Self{ fs, carrier_freqs, non_coherent, len_fft, samples_per_chip, fft, ifft, local_code_freq_domain }
	}

	/// Number of samples search() consumes
	pub fn required_len(&self) -> usize { self.len_fft * self.non_coherent }

	/// Accumulated correlation power over all code phases at one carrier frequency
	pub fn correlate(&self, signal:&[Complex<f64>], carrier_freq_hz:f64) -> Vec<f64> {
		let n = self.len_fft;
		let phase_step_rad:f64 = (-2.0 * consts::PI * carrier_freq_hz) / self.fs;
		let mut acc:Vec<f64> = vec![0.0; n];
		let mut buffer:Vec<Complex<f64>> = vec![Complex::zero(); n];

		for (block_idx, chunk) in signal.chunks_exact(n).take(self.non_coherent).enumerate() {
			// Wipe the carrier off, keeping phase continuous from one code period to the next
			for (idx, (dst, x)) in buffer.iter_mut().zip(chunk.iter()).enumerate() {
				let phase = phase_step_rad * ((block_idx * n + idx) as f64);
				*dst = *x * Complex{ re: phase.cos(), im: phase.sin() };
			}

			self.fft.process(&mut buffer);
			for (a, b) in buffer.iter_mut().zip(self.local_code_freq_domain.iter()) { *a = *a * *b; }
			self.ifft.process(&mut buffer);

			for (a, c) in acc.iter_mut().zip(buffer.iter()) { *a += c.norm_sqr(); }
		}

		acc
	}

	/// Largest value in acc at least one chip away from the peak, circularly
	fn second_peak(&self, acc:&[f64], peak_idx:usize) -> f64 {
		let n = acc.len();
		acc.iter().enumerate()
			.filter(|(idx, _)| {
				let d = if *idx > peak_idx { idx - peak_idx } else { peak_idx - idx };
				(d.min(n - d) as f64) >= self.samples_per_chip
			})
			.map(|(_, p)| *p)
			.fold(0.0, f64::max)
	}

	pub fn search(&self, signal:&[Complex<f64>]) -> CoarseResult {
		let mut best = CoarseResult{ carrier_freq_hz: 0.0, code_phase: 0, peak: 0.0, second_peak: 0.0 };
		let mut best_row:Vec<f64> = vec![];

		// Try every frequency and update the best match every time we find a new best
		for freq in self.carrier_freqs.iter() {
			let acc = self.correlate(signal, *freq);

			let (mut idx, mut p) = (0, 0.0);
			for (i, x) in acc.iter().enumerate() {
				if *x > p { idx = i; p = *x; }
			}

			if p > best.peak {
				best.carrier_freq_hz = *freq;
				best.code_phase = idx;
				best.peak = p;
				best_row = acc;
			}
		}

		if !best_row.is_empty() { best.second_peak = self.second_peak(&best_row, best.code_phase); }
		best
	}

}
