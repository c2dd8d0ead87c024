use std::collections::VecDeque;

use log::{debug, info, warn};

use crate::DigSigProcErr;
use super::{PREAMBLE, WORD_SIZE_BITS, SUBFRAME_SIZE_W_PARITY_BITS, SUBFRAME_SIZE_DATA_ONLY_BITS};

/// Consecutive rejected subframes tolerated before alignment is abandoned
pub const MAX_CONSECUTIVE_FAILURES:usize = 3;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FrameState {
	Searching,
	VerifyingSecondPreamble{ inverted:bool },
	Aligned{ inverted:bool },
}

#[derive(Debug, Clone, PartialEq)]
pub enum FrameResult {
	Aligned{ inverted:bool },
	/// Source data of a subframe that passed parity, tagged with the tag of its first bit
	Subframe{ data:[bool; SUBFRAME_SIZE_DATA_ONLY_BITS], first_tag:usize },
	Rejected{ err:DigSigProcErr, first_tag:usize },
	AlignmentLost,
}

/// Groups demodulated bits into subframes.  Each bit carries a caller-defined tag (normally the index of the
/// first 1 [ms] period of the bit) which follows it through to the output.
pub struct FrameSync {
	state:FrameState,
	buffer:VecDeque<(bool, usize)>,
	// Trailing bits of the last subframe consumed while aligned
	prev_bits:Option<(bool, bool)>,
	consecutive_failures:usize,
}

fn preamble_polarity<'a, I:Iterator<Item=&'a (bool, usize)>>(bits:I) -> Option<bool> {
	let first_eight:Vec<bool> = bits.take(8).map(|(b, _)| *b).collect();
	if first_eight.len() < 8 { None }
	else if first_eight.iter().zip(PREAMBLE.iter()).all(|(a, b)| a == b) { Some(false) }
	else if first_eight.iter().zip(PREAMBLE.iter()).all(|(a, b)| a != b) { Some(true) }
	else { None }
}

impl Default for FrameSync {
	fn default() -> Self { Self::new() }
}

impl FrameSync {

	pub fn new() -> Self {
		Self{ state: FrameState::Searching, buffer: VecDeque::new(), prev_bits: None, consecutive_failures: 0 }
	}

	pub fn state(&self) -> FrameState { self.state }

	pub fn reset(&mut self) {
		self.state = FrameState::Searching;
		self.buffer.clear();
		self.prev_bits = None;
		self.consecutive_failures = 0;
	}

	/// A candidate TLM word at the given offset into the buffer.  Subframes end with D29 = D30 = 0 in true polarity,
	/// so the previous bits are assumed rather than taken from whatever came before.
	fn tlm_candidate(&self, offset:usize) -> Option<bool> {
		if self.buffer.len() < offset + WORD_SIZE_BITS { return None; }
		let inverted = preamble_polarity(self.buffer.iter().skip(offset))?;
		let word:Vec<bool> = self.buffer.iter().skip(offset).take(WORD_SIZE_BITS).map(|(b, _)| *b).collect();
		if super::parity_check(&word, inverted, inverted) { Some(inverted) } else { None }
	}

	fn lose_alignment(&mut self, out:&mut Vec<FrameResult>) {
		warn!("Frame alignment lost");
		self.state = FrameState::Searching;
		self.prev_bits = None;
		self.consecutive_failures = 0;
		out.push(FrameResult::AlignmentLost);
	}

	/// Feeds one bit and returns whatever became decidable
	pub fn apply(&mut self, bit:bool, tag:usize) -> Vec<FrameResult> {
		self.buffer.push_back((bit, tag));
		let mut out:Vec<FrameResult> = vec![];

		loop {
			match self.state {
				FrameState::Searching => {
					if self.buffer.len() < WORD_SIZE_BITS { break; }
					match self.tlm_candidate(0) {
						Some(inverted) => {
							debug!("Preamble candidate (inverted={})", inverted);
							self.state = FrameState::VerifyingSecondPreamble{ inverted };
						},
						None => { self.buffer.pop_front(); },
					}
				},
				FrameState::VerifyingSecondPreamble{ inverted } => {
					if self.buffer.len() < SUBFRAME_SIZE_W_PARITY_BITS + WORD_SIZE_BITS { break; }
					if self.tlm_candidate(SUBFRAME_SIZE_W_PARITY_BITS) == Some(inverted) {
						info!("Frame aligned (inverted={})", inverted);
						self.state = FrameState::Aligned{ inverted };
						self.consecutive_failures = 0;
						out.push(FrameResult::Aligned{ inverted });
					} else {
						debug!("No second preamble, resuming search");
						self.buffer.pop_front();
						self.state = FrameState::Searching;
					}
				},
				FrameState::Aligned{ inverted } => {
					if self.buffer.len() < SUBFRAME_SIZE_W_PARITY_BITS { break; }
					if preamble_polarity(self.buffer.iter()) != Some(inverted) {
						self.lose_alignment(&mut out);
						continue;
					}

					let mut subframe = [false; SUBFRAME_SIZE_W_PARITY_BITS];
					let mut first_tag = 0;
					for (i, b) in subframe.iter_mut().enumerate() {
						if let Some((bit, tag)) = self.buffer.pop_front() {
							*b = bit;
							if i == 0 { first_tag = tag; }
						}
					}

					let (d29, d30) = self.prev_bits.unwrap_or((inverted, inverted));
					self.prev_bits = Some((subframe[SUBFRAME_SIZE_W_PARITY_BITS-2], subframe[SUBFRAME_SIZE_W_PARITY_BITS-1]));

					match super::data_recover(&subframe, d29, d30) {
						Ok(data) => {
							self.consecutive_failures = 0;
							out.push(FrameResult::Subframe{ data, first_tag });
						},
						Err(err) => {
							warn!("Subframe starting at tag {} rejected: {}", first_tag, err);
							self.consecutive_failures += 1;
							out.push(FrameResult::Rejected{ err, first_tag });
							if self.consecutive_failures >= MAX_CONSECUTIVE_FAILURES { self.lose_alignment(&mut out); }
						}
					}
				},
			}
		}

		out
	}

}

#[cfg(test)]
mod tests {

	use rand::{Rng, SeedableRng};
	use rand::rngs::StdRng;

	use super::*;
	use super::super::encode_subframe;

	fn random_subframes(n:usize, seed:u64) -> Vec<[bool; SUBFRAME_SIZE_DATA_ONLY_BITS]> {
		let mut rng = StdRng::seed_from_u64(seed);
		(0..n).map(|_| {
			let mut data = [false; SUBFRAME_SIZE_DATA_ONLY_BITS];
			for b in data.iter_mut() { *b = rng.gen(); }
			data[..8].copy_from_slice(&PREAMBLE);
			data
		}).collect()
	}

	fn feed(sync:&mut FrameSync, bits:&[bool]) -> Vec<FrameResult> {
		bits.iter().enumerate().flat_map(|(i, b)| sync.apply(*b, i)).collect()
	}

	fn decoded(results:&[FrameResult]) -> Vec<([bool; SUBFRAME_SIZE_DATA_ONLY_BITS], usize)> {
		results.iter().filter_map(|r| match r {
			FrameResult::Subframe{ data, first_tag } => Some((*data, *first_tag)),
			_ => None,
		}).collect()
	}

	fn same_fields(a:&[bool; SUBFRAME_SIZE_DATA_ONLY_BITS], b:&[bool; SUBFRAME_SIZE_DATA_ONLY_BITS]) -> bool {
		// The t bits of words 2 and 10 are rewritten by the encoder
		(0..SUBFRAME_SIZE_DATA_ONLY_BITS).filter(|i| ![46, 47, 238, 239].contains(i)).all(|i| a[i] == b[i])
	}

	#[test]
	fn aligns_after_false_preamble() {
		let data = random_subframes(4, 11);

		// Half of a valid-looking subframe with no preamble 300 bits later, then the real stream
		let mut bits:Vec<bool> = encode_subframe(&random_subframes(1, 99)[0])[..150].to_vec();
		for d in data.iter() { bits.extend_from_slice(&encode_subframe(d)); }

		let mut sync = FrameSync::new();
		let results = feed(&mut sync, &bits);

		assert_eq!(results[0], FrameResult::Aligned{ inverted: false });
		let out = decoded(&results);
		assert_eq!(out.len(), 4);
		for (k, (sf, tag)) in out.iter().enumerate() {
			assert!(same_fields(sf, &data[k]));
			assert_eq!(*tag, 150 + 300*k);
		}
		assert_eq!(sync.state(), FrameState::Aligned{ inverted: false });
	}

	#[test]
	fn inverted_stream_decodes_to_true_polarity() {
		let data = random_subframes(3, 12);
		let mut bits:Vec<bool> = vec![true, false, true, true, false];
		for d in data.iter() { bits.extend(encode_subframe(d).iter().map(|b| !b)); }

		let mut sync = FrameSync::new();
		let results = feed(&mut sync, &bits);
		assert!(results.contains(&FrameResult::Aligned{ inverted: true }));

		let out = decoded(&results);
		assert_eq!(out.len(), 3);
		for (k, (sf, _)) in out.iter().enumerate() { assert!(same_fields(sf, &data[k])); }
	}

	#[test]
	fn parity_failure_drops_only_that_subframe() {
		let data = random_subframes(4, 13);
		let mut bits:Vec<bool> = vec![];
		for d in data.iter() { bits.extend_from_slice(&encode_subframe(d)); }
		bits[300 + 100] = !bits[300 + 100];

		let mut sync = FrameSync::new();
		let results = feed(&mut sync, &bits);

		assert!(results.contains(&FrameResult::Rejected{ err: DigSigProcErr::ParityFailure{ word: 4 }, first_tag: 300 }));
		let tags:Vec<usize> = decoded(&results).iter().map(|(_, t)| *t).collect();
		assert_eq!(tags, vec![0, 600, 900]);
	}

	#[test]
	fn repeated_failures_lose_alignment() {
		let data = random_subframes(6, 14);
		let mut bits:Vec<bool> = vec![];
		for d in data.iter() { bits.extend_from_slice(&encode_subframe(d)); }
		for k in 1..4 { bits[300*k + 200] = !bits[300*k + 200]; }

		let mut sync = FrameSync::new();
		let results = feed(&mut sync, &bits);

		let rejected = results.iter().filter(|r| matches!(r, FrameResult::Rejected{ .. })).count();
		assert_eq!(rejected, MAX_CONSECUTIVE_FAILURES);
		assert!(results.contains(&FrameResult::AlignmentLost));

		// The search resumes and picks the stream back up
		let aligned = results.iter().filter(|r| matches!(r, FrameResult::Aligned{ .. })).count();
		assert_eq!(aligned, 2);
		let tags:Vec<usize> = decoded(&results).iter().map(|(_, t)| *t).collect();
		assert_eq!(tags, vec![0, 1200, 1500]);
	}

	#[test]
	fn missing_preamble_loses_alignment() {
		let data = random_subframes(6, 15);
		let mut bits:Vec<bool> = vec![];
		for d in data.iter() { bits.extend_from_slice(&encode_subframe(d)); }
		// Slip the stream by one bit inside the second subframe
		bits.remove(400);

		let mut sync = FrameSync::new();
		let results = feed(&mut sync, &bits);
		assert!(results.contains(&FrameResult::Rejected{ err: DigSigProcErr::ParityFailure{ word: 4 }, first_tag: 300 }));
		assert!(results.contains(&FrameResult::AlignmentLost));

		// Realigned one bit early on the slipped stream
		let tags:Vec<usize> = decoded(&results).iter().map(|(_, t)| *t).collect();
		assert_eq!(tags, vec![0, 899, 1199, 1499]);
	}

}
