use log::{debug, info};

use crate::DigSigProcErr;
use crate::gnss::gps_l1_ca::{CHIP_RATE_HZ, MS_PER_BIT};
use super::bit_sync::BitSync;
use super::frame_sync::{FrameResult, FrameSync};
use super::subframe::{self, Subframe, SECONDS_PER_WEEK};

#[derive(Debug, Clone, PartialEq)]
pub enum DecoderEvent {
	BitSync{ offset_ms:usize },
	FrameAligned{ inverted:bool },
	/// A subframe that passed parity and field checks, with the index of the 1 [ms] period its first bit began in
	Subframe{ sf:Subframe, first_ms:usize },
	Rejected{ err:DigSigProcErr, first_ms:usize },
	AlignmentLost,
}

/// Turns one channel's prompt stream into navigation bits, subframes and a time-of-week reference.  Periods are
/// counted from zero at the start of the current track and must arrive without gaps.
pub struct TelemetryDecoder {
	bit_sync:BitSync,
	frame_sync:FrameSync,
	// Prompts since the last bit edge (or since bit sync began looking)
	pending:Vec<f64>,
	pending_first_ms:usize,
	// (GPS time of week [sec] at the leading edge of a subframe, period index of that edge)
	tow_anchor:Option<(f64, usize)>,
}

impl TelemetryDecoder {

	pub fn new(bit_sync_ms:usize) -> Self {
		Self{ bit_sync: BitSync::new(bit_sync_ms), frame_sync: FrameSync::new(), pending: vec![],
			pending_first_ms: 0, tow_anchor: None }
	}

	pub fn reset(&mut self) {
		self.bit_sync.reset();
		self.frame_sync.reset();
		self.pending.clear();
		self.pending_first_ms = 0;
		self.tow_anchor = None;
	}

	pub fn bit_offset(&self) -> Option<usize> { self.bit_sync.offset() }
	pub fn tow_anchor(&self) -> Option<(f64, usize)> { self.tow_anchor }

	/// SV transmit time [sec of week] at a point `code_phase_chips` into period `ms_idx`, once a subframe has been
	/// decoded on this track
	pub fn transmit_time(&self, ms_idx:usize, code_phase_chips:f64) -> Option<f64> {
		self.tow_anchor.map(|(tow, first_ms)| {
			let elapsed = (ms_idx as f64 - first_ms as f64) * 1.0e-3 + code_phase_chips / CHIP_RATE_HZ;
			(tow + elapsed).rem_euclid(SECONDS_PER_WEEK)
		})
	}

	/// Feeds the prompt in-phase sum of period `ms_idx`
	pub fn apply(&mut self, prompt_i:f64, ms_idx:usize) -> Vec<DecoderEvent> {
		let mut out:Vec<DecoderEvent> = vec![];
		if self.pending.is_empty() { self.pending_first_ms = ms_idx; }
		self.pending.push(prompt_i);

		match self.bit_sync.offset() {
			None => {
				if let Some(k) = self.bit_sync.apply(prompt_i) {
					out.push(DecoderEvent::BitSync{ offset_ms: self.pending_first_ms + k });
					let held:Vec<f64> = self.pending.drain(..).skip(k).collect();
					self.pending_first_ms += k;
					let mut chunks = held.chunks_exact(MS_PER_BIT);
					for chunk in &mut chunks {
						self.emit_bit(chunk, &mut out);
						self.pending_first_ms += MS_PER_BIT;
					}
					self.pending = chunks.remainder().to_vec();
				} else if self.bit_sync.is_empty() {
					// Bit sync started over, so the held prompts no longer line up with it
					self.pending.clear();
				}
			},
			Some(_) => {
				if self.pending.len() == MS_PER_BIT {
					let bit:Vec<f64> = self.pending.drain(..).collect();
					self.emit_bit(&bit, &mut out);
				}
			},
		}

		out
	}

	fn emit_bit(&mut self, prompts:&[f64], out:&mut Vec<DecoderEvent>) {
		let bit = prompts.iter().sum::<f64>() < 0.0;
		for result in self.frame_sync.apply(bit, self.pending_first_ms) {
			match result {
				FrameResult::Aligned{ inverted } => out.push(DecoderEvent::FrameAligned{ inverted }),
				FrameResult::AlignmentLost => out.push(DecoderEvent::AlignmentLost),
				FrameResult::Rejected{ err, first_tag } => out.push(DecoderEvent::Rejected{ err, first_ms: first_tag }),
				FrameResult::Subframe{ data, first_tag } => match subframe::decode(&data) {
					Ok(sf) => {
						if self.tow_anchor.is_none() {
							info!("Time of week {:.0} [sec] at period {}", sf.start_time_of_week(), first_tag);
						}
						debug!("Subframe {} with TOW {}", sf.subframe_id, sf.time_of_week_truncated);
						self.tow_anchor = Some((sf.start_time_of_week(), first_tag));
						out.push(DecoderEvent::Subframe{ sf, first_ms: first_tag });
					},
					Err(err) => out.push(DecoderEvent::Rejected{ err, first_ms: first_tag }),
				},
			}
		}
	}

}

#[cfg(test)]
mod tests {

	use rand::{Rng, SeedableRng};
	use rand::rngs::StdRng;
	use rand_distr::{Distribution, Normal};

	use super::*;
	use super::super::encode_subframe;
	use super::super::subframe::tests::sample_subframes;

	const LEAD_BITS:usize = 37;

	// Prompts for `lead` random bits followed by the given subframes, with the first bit edge `edge` periods in
	fn prompts(edge:usize, subframes:&[Subframe], invert:bool, sigma:f64, seed:u64) -> Vec<f64> {
		let mut rng = StdRng::seed_from_u64(seed);
		let mut bits:Vec<bool> = (0..LEAD_BITS).map(|_| rng.gen()).collect();
		for sf in subframes { bits.extend_from_slice(&encode_subframe(&sf.encode().unwrap())); }
		bits.extend((0..40).map(|_| rng.gen::<bool>()));

		let noise = Normal::new(0.0, sigma).unwrap();
		let partial = if rng.gen() { 1.0 } else { -1.0 };
		let mut ans:Vec<f64> = vec![partial; edge];
		for b in bits {
			let level = if b ^ invert { -1.0 } else { 1.0 };
			for _ in 0..MS_PER_BIT { ans.push(level + noise.sample(&mut rng)); }
		}
		ans
	}

	fn run(dec:&mut TelemetryDecoder, prompts:&[f64]) -> Vec<DecoderEvent> {
		prompts.iter().enumerate().flat_map(|(ms, p)| dec.apply(*p, ms)).collect()
	}

	#[test]
	fn decodes_subframes_and_time_of_week() {
		for (edge, invert) in [(0, false), (7, true), (19, false)].iter() {
			let sfs = sample_subframes(1000);
			let mut dec = TelemetryDecoder::new(400);
			let events = run(&mut dec, &prompts(*edge, &sfs, *invert, 0.4, 5));

			assert_eq!(events[0], DecoderEvent::BitSync{ offset_ms: *edge });
			assert!(events.contains(&DecoderEvent::FrameAligned{ inverted: *invert }));

			let decoded:Vec<(Subframe, usize)> = events.iter().filter_map(|e| match e {
				DecoderEvent::Subframe{ sf, first_ms } => Some((*sf, *first_ms)),
				_ => None,
			}).collect();
			assert_eq!(decoded.len(), 3);
			for (k, (sf, first_ms)) in decoded.iter().enumerate() {
				assert_eq!(*sf, sfs[k]);
				assert_eq!(*first_ms, edge + MS_PER_BIT * (LEAD_BITS + 300 * k));
			}

			// The last subframe starts at 6 * (1000 + 2 - 1) [sec]
			let (tow, first_ms) = dec.tow_anchor().unwrap();
			assert_eq!(tow, 6006.0);
			assert_eq!(first_ms, decoded[2].1);
			let t = dec.transmit_time(first_ms + 250, 511.5).unwrap();
			assert!((t - (6006.0 + 0.25 + 0.5e-3)).abs() < 1.0e-9);
		}
	}

	#[test]
	fn no_time_before_the_first_subframe() {
		let sfs = sample_subframes(20);
		let mut dec = TelemetryDecoder::new(400);
		let p = prompts(3, &sfs, false, 0.3, 9);
		run(&mut dec, &p[..MS_PER_BIT * (LEAD_BITS + 200)]);
		assert_eq!(dec.bit_offset(), Some(3));
		assert_eq!(dec.transmit_time(100, 0.0), None);

		dec.reset();
		assert_eq!(dec.bit_offset(), None);
		assert!(dec.tow_anchor().is_none());
	}

	#[test]
	fn constant_prompts_never_sync() {
		let mut dec = TelemetryDecoder::new(100);
		let events:Vec<DecoderEvent> = (0..2000).flat_map(|ms| dec.apply(1.0, ms)).collect();
		assert!(events.is_empty());
		assert!(dec.pending.len() < 100);
	}

}
