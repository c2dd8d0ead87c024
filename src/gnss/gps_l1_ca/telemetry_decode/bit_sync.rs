use log::debug;

use crate::gnss::gps_l1_ca::MS_PER_BIT;

/// Finds where navigation bits begin within the stream of 1 [ms] prompts.  Every candidate offset is scored by
/// summing the signs of the prompts over consecutive 20 [ms] windows; the best offset is adopted once and held.
pub struct BitSync {
	window_ms: usize,
	signs: Vec<i32>,
	offset: Option<usize>,
}

impl BitSync {

	pub fn new(window_ms:usize) -> Self { Self{ window_ms, signs: Vec::with_capacity(window_ms), offset: None } }

	pub fn reset(&mut self) {
		self.signs.clear();
		self.offset = None;
	}

	/// Offset into the prompt stream of the first bit edge, once found
	pub fn offset(&self) -> Option<usize> { self.offset }

	/// Number of prompts seen so far
	pub fn len(&self) -> usize { self.signs.len() }
	pub fn is_empty(&self) -> bool { self.signs.is_empty() }

	/// Score of one candidate offset: the accumulated |sum of signs| over whole windows.  Every offset is scored
	/// over the same number of windows.
	pub fn score(&self, k:usize) -> i32 {
		let windows = (self.signs.len().saturating_sub(MS_PER_BIT - 1)) / MS_PER_BIT;
		self.signs[k..].chunks_exact(MS_PER_BIT).take(windows).map(|w| w.iter().sum::<i32>().abs()).sum()
	}

	/// Feeds one prompt in-phase value.  Returns the offset on the call that decides it.
	pub fn apply(&mut self, prompt_i:f64) -> Option<usize> {
		if self.offset.is_some() { return None; }

		self.signs.push(if prompt_i < 0.0 { -1 } else { 1 });
		if self.signs.len() < self.window_ms { return None; }

		let scores:Vec<i32> = (0..MS_PER_BIT).map(|k| self.score(k)).collect();
		let (best_k, best) = scores.iter().enumerate().fold((0, i32::MIN), |acc, (k, s)| if *s > acc.1 { (k, *s) } else { acc });
		let worst = scores.iter().copied().min().unwrap_or(best);

		if best > worst {
			debug!("Bit sync at offset {} [ms], score {} against {}", best_k, best, worst);
			self.offset = Some(best_k);
			self.offset
		} else {
			// No transition seen yet; keep looking with a fresh window
			self.signs.clear();
			None
		}
	}

}

#[cfg(test)]
mod tests {

	use rand::SeedableRng;
	use rand::rngs::StdRng;
	use rand_distr::{Distribution, Normal};

	use super::*;

	fn prompts(first_edge:usize, bits:&[bool], n:usize, sigma:f64, seed:u64) -> Vec<f64> {
		let mut rng = StdRng::seed_from_u64(seed);
		let noise = Normal::new(0.0, sigma).unwrap();
		(0..n).map(|m| {
			let bit_idx = (m + MS_PER_BIT - first_edge) / MS_PER_BIT;
			let s = if bits[bit_idx % bits.len()] { -1.0 } else { 1.0 };
			s + noise.sample(&mut rng)
		}).collect()
	}

	#[test]
	fn finds_edge_in_noisy_prompts() {
		let bits = [true, false, false, true, true, false, true, false, false, false, true];
		for first_edge in [0, 3, 11, 19].iter() {
			let mut sync = BitSync::new(400);
			let mut found = None;
			for p in prompts(*first_edge, &bits, 400, 0.5, *first_edge as u64) {
				if let Some(k) = sync.apply(p) { found = Some(k); }
			}
			assert_eq!(found, Some(*first_edge));
			assert_eq!(sync.offset(), Some(*first_edge));
		}
	}

	#[test]
	fn constant_signs_do_not_decide() {
		let mut sync = BitSync::new(40);
		for _ in 0..100 { assert_eq!(sync.apply(1.0), None); }
		assert!(sync.offset().is_none());
		assert!(sync.len() < 40);

		// After a decision the offset is held fixed
		for m in 0..40 { sync.apply(if (m + 13) / 20 % 2 == 0 { 1.0 } else { -1.0 }); }
		let k = sync.offset().unwrap();
		for _ in 0..100 { sync.apply(-1.0); }
		assert_eq!(sync.offset(), Some(k));
	}

}
