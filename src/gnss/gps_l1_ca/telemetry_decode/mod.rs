#![allow(non_snake_case)]

use crate::DigSigProcErr;

pub mod bit_sync;
pub mod decoder;
pub mod frame_sync;
pub mod subframe;

pub use self::decoder::{DecoderEvent, TelemetryDecoder};

pub const WORD_SIZE_BITS:usize = 30;
pub const SUBFRAME_SIZE_W_PARITY_BITS:usize = 300;
pub const SUBFRAME_SIZE_DATA_ONLY_BITS:usize = 240;

pub const PREAMBLE:[bool; 8] = [true, false, false, false, true, false, true, true];

// Source data bits (d1 through d24, zero based here) feeding each of the six parity bits
const PARITY_TAPS:[&[usize]; 6] = [
	&[0, 1, 2, 4, 5, 9, 10, 11, 12, 13, 16, 17, 19, 22],
	&[1, 2, 3, 5, 6, 10, 11, 12, 13, 14, 17, 18, 20, 23],
	&[0, 2, 3, 4, 6, 7, 11, 12, 13, 14, 15, 18, 19, 21],
	&[1, 3, 4, 5, 7, 8, 12, 13, 14, 15, 16, 19, 20, 22],
	&[0, 2, 4, 5, 6, 8, 9, 13, 14, 15, 16, 17, 20, 21, 23],
	&[2, 4, 5, 7, 8, 9, 10, 12, 14, 18, 21, 22, 23],
];

/// Parity bits D25 through D30 of a word with source data `d` given the last two bits of the previous word
pub fn compute_parity(d:&[bool], last_D29:bool, last_D30:bool) -> [bool; 6] {
	let mut parity = [false; 6];
	for (i, taps) in PARITY_TAPS.iter().enumerate() {
		let seed = if i == 0 || i == 2 || i == 5 { last_D29 } else { last_D30 };
		parity[i] = taps.iter().fold(seed, |acc, t| acc ^ d[*t]);
	}
	parity
}

/// Checks one 30-bit word as received.  Inverted polarity passes too as long as the previous bits come from the
/// same (inverted) stream.
pub fn parity_check(word:&[bool], last_D29:bool, last_D30:bool) -> bool {
	if word.len() != WORD_SIZE_BITS { return false; }

	let d:Vec<bool> = word.iter().take(24).map(|b| b ^ last_D30).collect();
	word[24..].iter().zip(compute_parity(&d, last_D29, last_D30).iter()).all(|(a, b)| a == b)
}

/// Checks all ten words of a received subframe and returns the 240 source data bits in true polarity.  The
/// first failing word rejects the whole subframe.
pub fn data_recover(subframe:&[bool; SUBFRAME_SIZE_W_PARITY_BITS], last_D29:bool, last_D30:bool) -> Result<[bool; SUBFRAME_SIZE_DATA_ONLY_BITS], DigSigProcErr> {
	let mut ans = [false; SUBFRAME_SIZE_DATA_ONLY_BITS];

	let (mut d29, mut d30) = (last_D29, last_D30);
	for (word_idx, word) in subframe.chunks_exact(WORD_SIZE_BITS).enumerate() {
		if !parity_check(word, d29, d30) { return Err(DigSigProcErr::ParityFailure{ word: word_idx + 1 }); }

		for bit_idx in 0..24 { ans[24*word_idx + bit_idx] = word[bit_idx] ^ d30; }
		d29 = word[28];
		d30 = word[29];
	}

	Ok(ans)
}

/// Encodes 240 source data bits into a transmitted subframe.  The last two data bits of words 2 and 10 are
/// overwritten with whatever values make D29 and D30 of those words zero.
pub fn encode_subframe(data:&[bool; SUBFRAME_SIZE_DATA_ONLY_BITS]) -> [bool; SUBFRAME_SIZE_W_PARITY_BITS] {
	let mut ans = [false; SUBFRAME_SIZE_W_PARITY_BITS];
	let (mut d29, mut d30) = (false, false);

	for word_idx in 0..10 {
		let mut d:Vec<bool> = data[24*word_idx..24*(word_idx+1)].to_vec();

		if word_idx == 1 || word_idx == 9 {
			for t in 0..4 {
				d[22] = t & 2 != 0;
				d[23] = t & 1 != 0;
				let p = compute_parity(&d, d29, d30);
				if !p[4] && !p[5] { break; }
			}
		}

		let parity = compute_parity(&d, d29, d30);
		let word = &mut ans[WORD_SIZE_BITS*word_idx..WORD_SIZE_BITS*(word_idx+1)];
		for bit_idx in 0..24 { word[bit_idx] = d[bit_idx] ^ d30; }
		word[24..].copy_from_slice(&parity);

		d29 = word[28];
		d30 = word[29];
	}

	ans
}
