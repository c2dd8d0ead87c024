use std::f64::consts;

use num_complex::Complex;

use crate::{DigSigProcErr, Sample};
use crate::gnss::gps_l1_ca::MS_PER_BIT;
use super::{basic_pcps, AcquisitionResult};

/// Coarse PCPS over the whole Doppler grid followed by a fine frequency search across one coarse bin.  Samples
/// are buffered until there are enough for both stages.
pub struct Acquisition {
	pub prn: usize,
	pub fs: f64,
	pub intermediate_freq_hz: f64,
	pub threshold: f64,
	pub coarse_step_hz: f64,
	pub fine_step_hz: f64,
	pub fine_ms: usize,
	required_len: usize,
	code_table: Vec<i8>,
	stage_one: basic_pcps::Acquisition,
	buffer: Vec<Complex<f64>>,
	first_idx: usize,
}

impl Acquisition {

	pub fn new(prn:usize, code_table:Vec<i8>, fs:f64, intermediate_freq_hz:f64, carrier_freqs:Vec<f64>, non_coherent:usize,
		coarse_step_hz:f64, fine_step_hz:f64, fine_ms:usize, threshold:f64, required_len:usize) -> Self {

		let stage_one = basic_pcps::Acquisition::new(&code_table, fs, carrier_freqs, non_coherent);
		let required_len = required_len.max(stage_one.required_len()).max(code_table.len() * (fine_ms + 1));

		Self{ prn, fs, intermediate_freq_hz, threshold, coarse_step_hz, fine_step_hz, fine_ms, required_len, code_table,
			stage_one, buffer: Vec::with_capacity(required_len), first_idx: 0 }
	}

	pub fn required_len(&self) -> usize { self.required_len }

	/// Candidate carrier frequencies of the fine stage, one coarse bin wide and centered on the coarse estimate
	pub fn fine_freqs(&self, coarse_freq_hz:f64) -> Vec<f64> {
		let n_fine:usize = (self.coarse_step_hz / self.fine_step_hz).round() as usize;
		(0..=n_fine).map(|i| coarse_freq_hz - 0.5*self.coarse_step_hz + (i as f64)*self.fine_step_hz).collect()
	}

	/// Prompt sums, one per code period, of the code-wiped signal starting at `start` with the carrier removed at `freq_hz`
	fn prompt_sums(&self, wiped:&[Complex<f64>], start:usize, freq_hz:f64) -> Vec<Complex<f64>> {
		let n = self.code_table.len();
		let dphase:f64 = -2.0 * consts::PI * freq_hz / self.fs;
		let rot = Complex{ re: dphase.cos(), im: dphase.sin() };

		wiped.chunks_exact(n).enumerate().map(|(m, chunk)| {
			// Phase is referenced to the start of the buffer so consecutive periods stay coherent
			let phase0 = dphase * ((start + m*n) as f64);
			let mut lo = Complex{ re: phase0.cos(), im: phase0.sin() };
			let mut acc = Complex{ re: 0.0, im: 0.0 };
			for x in chunk {
				acc += *x * lo;
				lo = lo * rot;
			}
			acc
		}).collect()
	}

	/// Coherent energy of the prompt sums, maximized over the possible data bit edge positions
	fn bit_edge_energy(sums:&[Complex<f64>]) -> f64 {
		(0..MS_PER_BIT).map(|k| {
			let mut energy:f64 = 0.0;
			let mut seg = Complex{ re: 0.0, im: 0.0 };
			for (m, p) in sums.iter().enumerate() {
				if m >= k && (m - k) % MS_PER_BIT == 0 && m > 0 {
					energy += seg.norm_sqr();
					seg = Complex{ re: 0.0, im: 0.0 };
				}
				seg += *p;
			}
			energy + seg.norm_sqr()
		}).fold(0.0, f64::max)
	}

	/// Runs both stages on a contiguous signal whose first sample has stream index `first_idx`
	pub fn search(&self, signal:&[Complex<f64>], first_idx:usize) -> AcquisitionResult {
		let coarse = self.stage_one.search(&signal[..self.stage_one.required_len().min(signal.len())]);
		let peak_metric = coarse.peak_metric();

		let mut result = AcquisitionResult{ prn: self.prn, detected: false, carrier_freq_hz: coarse.carrier_freq_hz,
			doppler_hz: coarse.carrier_freq_hz - self.intermediate_freq_hz, doppler_step_hz: self.coarse_step_hz,
			code_phase: coarse.code_phase, sample_idx: first_idx, peak_metric };

		if peak_metric <= self.threshold { return result; }

		// Code wipe-off over fine_ms whole periods starting at the detected code phase
		let n = self.code_table.len();
		let start = coarse.code_phase;
		let end = start + self.fine_ms * n;
		if end > signal.len() { return result; }
		let wiped:Vec<Complex<f64>> = signal[start..end].iter().enumerate()
			.map(|(i, x)| *x * (self.code_table[i % n] as f64))
			.collect();

		let mut best:(f64, f64) = (coarse.carrier_freq_hz, 0.0);
		for freq in self.fine_freqs(coarse.carrier_freq_hz) {
			let energy = Self::bit_edge_energy(&self.prompt_sums(&wiped, start, freq));
			if energy > best.1 { best = (freq, energy); }
		}

		result.detected = true;
		result.carrier_freq_hz = best.0;
		result.doppler_hz = best.0 - self.intermediate_freq_hz;
		result.doppler_step_hz = self.fine_step_hz;
		result
	}

}

impl super::Acquisition for Acquisition {

	fn provide_sample(&mut self, sample:&Sample) -> Result<(), DigSigProcErr> {
		// A gap in the stream invalidates whatever was buffered
		if !self.buffer.is_empty() && sample.idx != self.first_idx + self.buffer.len() {
			self.buffer.clear();
		}
		if self.buffer.is_empty() { self.first_idx = sample.idx; }
		if self.buffer.len() < self.required_len { self.buffer.push(sample.val); }
		Ok(())
	}

	fn block_for_result(&mut self) -> Result<Option<AcquisitionResult>, DigSigProcErr> {
		if self.buffer.len() < self.required_len { return Ok(None); }

		let result = self.search(&self.buffer, self.first_idx);
		self.buffer.clear();
		Ok(Some(result))
	}

}

#[cfg(test)]
mod tests {

	use super::*;
	use super::super::Acquisition as _;
	use crate::gnss::gps_l1_ca::signal_modulation;
	use crate::gnss::gps_l1_ca::test_signal::SignalSpec;

	fn make(prn:usize, fs:f64) -> Acquisition {
		let table = signal_modulation::prn_int_sampled(prn, fs).unwrap();
		let freqs:Vec<f64> = (-10..=10).map(|k| k as f64 * 500.0).collect();
		Acquisition::new(prn, table, fs, 0.0, freqs, 4, 500.0, 25.0, 20, 3.5, 0)
	}

	#[test]
	fn fine_grid_spans_one_coarse_bin() {
		let acq = make(1, 2.046e6);
		let freqs = acq.fine_freqs(1000.0);
		assert_eq!(freqs.len(), 21);
		assert_eq!(freqs[0], 750.0);
		assert_eq!(freqs[20], 1250.0);
	}

	#[test]
	fn bit_edge_energy_finds_the_transition() {
		// Sign flips after 7 periods; only the hypothesis k = 7 keeps both segments coherent
		let sums:Vec<Complex<f64>> = (0..20).map(|m| Complex{ re: if m < 7 { 1.0 } else { -1.0 }, im: 0.0 }).collect();
		let energy = Acquisition::bit_edge_energy(&sums);
		assert!((energy - (49.0 + 169.0)).abs() < 1.0e-9);
	}

	#[test]
	fn streaming_refines_frequency() {
		let fs = 2.046e6;
		let mut acq = make(11, fs);
		let signal = SignalSpec::new(11, fs, -1630.0, 333.0).with_cn0(50.0).generate(acq.required_len() + 100);

		let mut result = None;
		for (idx, val) in signal.into_iter().enumerate() {
			acq.provide_sample(&Sample{ val, idx: 5000 + idx }).unwrap();
			if let Some(r) = acq.block_for_result().unwrap() { result = Some(r); break; }
		}

		let r = result.unwrap();
		assert!(r.detected);
		assert_eq!(r.sample_idx, 5000);
		assert!((r.code_phase as i64 - 333).abs() <= 1);
		assert!((r.doppler_hz + 1630.0).abs() <= 25.0);
		assert_eq!(r.doppler_step_hz, 25.0);
	}

}
