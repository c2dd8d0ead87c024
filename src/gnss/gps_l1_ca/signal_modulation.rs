use std::f64::consts;

use num_complex::Complex;

use crate::DigSigProcErr;
use crate::gnss::gps_l1_ca::{CODE_LENGTH, CHIP_RATE_HZ};

// G2 output taps for each PRN, IS-GPS-200 Table 3-Ia
const G2_TAPS:[(usize, usize); 32] = [
	(2, 6), (3, 7), (4, 8), (5, 9), (1, 9), (2, 10), (1, 8), (2, 9),
	(3, 10), (2, 3), (3, 4), (5, 6), (6, 7), (7, 8), (8, 9), (9, 10),
	(1, 4), (2, 5), (3, 6), (4, 7), (5, 8), (6, 9), (1, 3), (4, 6),
	(5, 7), (6, 8), (7, 9), (8, 10), (1, 6), (2, 7), (3, 8), (4, 9),
];

/// The 1023 chips of a PRN's C/A code as 0/1 values
pub fn prn_bits(prn:usize) -> Result<Vec<u8>, DigSigProcErr> {
	let (tap_a, tap_b) = match prn {
		1..=32 => G2_TAPS[prn - 1],
		_ => return Err(DigSigProcErr::InvalidPrn(prn)),
	};

	let mut g1:[u8; 10] = [1; 10];
	let mut g2:[u8; 10] = [1; 10];

	Ok((0..CODE_LENGTH).map(|_| {
		let chip = g1[9] ^ g2[tap_a - 1] ^ g2[tap_b - 1];

		// G1 = 1 + x^3 + x^10, G2 = 1 + x^2 + x^3 + x^6 + x^8 + x^9 + x^10
		let fb1 = g1[2] ^ g1[9];
		let fb2 = g2[1] ^ g2[2] ^ g2[5] ^ g2[7] ^ g2[8] ^ g2[9];
		g1.rotate_right(1);
		g2.rotate_right(1);
		g1[0] = fb1;
		g2[0] = fb2;

		chip
	}).collect())
}

/// The C/A code mapped to +/-1 with a 0 chip becoming +1
pub fn prn_int(prn:usize) -> Result<Vec<i8>, DigSigProcErr> {
	Ok(prn_bits(prn)?.into_iter().map(|b| 1 - 2*(b as i8)).collect())
}

pub fn prn_complex(prn:usize) -> Result<Vec<Complex<f64>>, DigSigProcErr> {
	Ok(prn_int(prn)?.into_iter().map(|x| Complex{ re: x as f64, im: 0.0 }).collect())
}

/// One code period sampled at fs.  Sample k holds the chip in effect at the end of the k-th sample interval,
/// and the final sample always holds the last chip.
pub fn prn_int_sampled(prn:usize, fs:f64) -> Result<Vec<i8>, DigSigProcErr> {
	let samples_per_code:usize = (fs / 1000.0).round() as usize;

	let code = prn_int(prn)?;

	Ok((0..samples_per_code).map(|i| {
		let code_value_idx:usize = (((i+1) as f64) * CHIP_RATE_HZ / fs).ceil() as usize;
		if i == samples_per_code - 1 || code_value_idx > CODE_LENGTH { code[CODE_LENGTH-1] }
		else { code[code_value_idx.max(1) - 1] }
	}).collect())
}

/// Carrier replica exp(-j*(2*pi*f*t + phase0)) for n samples, i.e. the conjugate that wipes the carrier off
pub fn carrier_wipeoff(freq_hz:f64, fs:f64, n:usize, phase0_rad:f64) -> Vec<Complex<f64>> {
	let dphase:f64 = 2.0 * consts::PI * freq_hz / fs;
	(0..n).map(|k| {
		let phase = phase0_rad + dphase * (k as f64);
		Complex{ re: phase.cos(), im: -phase.sin() }
	}).collect()
}

#[cfg(test)]
mod tests {

	use rstest::rstest;

	use super::*;

	fn first_ten_octal(prn:usize) -> u32 {
		prn_bits(prn).unwrap().iter().take(10).fold(0u32, |acc, b| (acc << 1) | (*b as u32))
	}

	#[rstest]
	#[case(1, 0o1440)]
	#[case(2, 0o1620)]
	#[case(5, 0o1133)]
	#[case(10, 0o1504)]
	#[case(19, 0o1633)]
	#[case(23, 0o1063)]
	#[case(32, 0o1712)]
	fn first_ten_chips(#[case] prn:usize, #[case] octal:u32) {
		assert_eq!(first_ten_octal(prn), octal);
	}

	#[test]
	fn gold_code_correlation_values() {
		let a = prn_int(7).unwrap();
		let b = prn_int(21).unwrap();
		let corr = |x:&[i8], y:&[i8], lag:usize| -> i32 {
			(0..CODE_LENGTH).map(|i| (x[i] as i32) * (y[(i + lag) % CODE_LENGTH] as i32)).sum()
		};

		assert_eq!(corr(&a, &a, 0), 1023);
		for lag in 1..CODE_LENGTH {
			assert!([-65, -1, 63].contains(&corr(&a, &a, lag)));
		}
		for lag in 0..CODE_LENGTH {
			assert!([-65, -1, 63].contains(&corr(&a, &b, lag)));
		}
	}

	#[test]
	fn sampled_table() {
		let fs = 2.046e6;
		let code = prn_int(3).unwrap();
		let table = prn_int_sampled(3, fs).unwrap();
		assert_eq!(table.len(), 2046);
		assert_eq!(table[0], code[0]);
		assert_eq!(table[1], code[0]);
		assert_eq!(table[2], code[1]);
		assert_eq!(table[2045], code[1022]);

		assert_eq!(prn_int(33), Err(DigSigProcErr::InvalidPrn(33)));
	}

	#[test]
	fn wipeoff_is_unit_magnitude() {
		let w = carrier_wipeoff(1250.0, 8000.0, 8, 0.0);
		assert!(w.iter().all(|c| (c.norm() - 1.0).abs() < 1.0e-12));
		assert!((w[2] - Complex{ re: (2.0*consts::PI*1250.0*2.0/8000.0).cos(), im: -(2.0*consts::PI*1250.0*2.0/8000.0).sin() }).norm() < 1.0e-12);
	}

}
