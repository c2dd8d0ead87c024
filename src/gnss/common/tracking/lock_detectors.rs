use std::collections::VecDeque;

use num_complex::Complex;

/// Variance summing C/N0 estimate [dB-Hz] over a window of prompt correlator outputs with integration time
/// `coh_integration_time_s`.  None when the window is too noisy for the estimate to exist.
pub fn cn0_vsm_estimator(prompt_buffer:&VecDeque<Complex<f64>>, coh_integration_time_s:f64) -> Option<f64> {
	if prompt_buffer.len() < 2 { return None; }

	let n:f64 = prompt_buffer.len() as f64;
	let z_mean:f64 = prompt_buffer.iter().map(|c| c.norm_sqr()).sum::<f64>() / n;
	let z_var:f64 = prompt_buffer.iter().map(|c| (c.norm_sqr() - z_mean).powi(2)).sum::<f64>() / n;

	let diff = z_mean.powi(2) - z_var;
	if diff <= 0.0 { return None; }
	let p_av = diff.sqrt();

	let noise_var = 0.5 * (z_mean - p_av);
	if noise_var <= 0.0 { return None; }

	Some(10.0 * (p_av / (2.0 * noise_var * coh_integration_time_s)).abs().log10())
}

/// Narrowband carrier lock indicator NBD/NBP, an estimate of cos(2*dphi) that is near 1.0 when phase locked and
/// near zero otherwise.  Squaring each prompt first makes it insensitive to data modulation.
pub fn carrier_lock_detector(prompt_buffer:&VecDeque<Complex<f64>>) -> f64 {
	let nbd:f64 = prompt_buffer.iter().map(|c| c.re * c.re - c.im * c.im).sum();
	let nbp:f64 = prompt_buffer.iter().map(|c| c.norm_sqr()).sum();
	if nbp == 0.0 { 0.0 } else { nbd / nbp }
}

#[cfg(test)]
mod tests {

	use rand::SeedableRng;
	use rand::rngs::StdRng;
	use rand_distr::{Distribution, Normal};

	use super::*;

	fn prompts(amplitude:f64, sigma:f64, n:usize, seed:u64) -> VecDeque<Complex<f64>> {
		let mut rng = StdRng::seed_from_u64(seed);
		let noise = Normal::new(0.0, sigma).unwrap();
		(0..n).map(|k| {
			let bit = if (k / 20) % 2 == 0 { 1.0 } else { -1.0 };
			Complex{ re: bit * amplitude + noise.sample(&mut rng), im: noise.sample(&mut rng) }
		}).collect()
	}

	#[test]
	fn vsm_tracks_known_cn0() {
		// With noise variance s^2 per component, C/N0 = A^2 / (2 s^2 T)
		let (amplitude, sigma, t):(f64, f64, f64) = (100.0, 10.0, 1.0e-3);
		let expected = 10.0 * (amplitude * amplitude / (2.0 * sigma * sigma * t)).log10();

		let buf = prompts(amplitude, sigma, 400, 3);
		let est = cn0_vsm_estimator(&buf, t).unwrap();
		assert!((est - expected).abs() < 1.0, "estimated {} expected {}", est, expected);
	}

	#[test]
	fn vsm_undefined_for_tiny_windows() {
		let buf:VecDeque<Complex<f64>> = vec![Complex{ re: 1.0, im: 0.0 }].into_iter().collect();
		assert!(cn0_vsm_estimator(&buf, 1.0e-3).is_none());
	}

	#[test]
	fn lock_indicator_separates_locked_from_rotating() {
		let locked = prompts(100.0, 5.0, 40, 9);
		assert!(carrier_lock_detector(&locked) > 0.95);

		let rotating:VecDeque<Complex<f64>> = (0..40).map(|k| Complex::from_polar(100.0, k as f64 * 0.5)).collect();
		assert!(carrier_lock_detector(&rotating).abs() < 0.2);
	}

}
