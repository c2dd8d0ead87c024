use crate::DigSigProcErr;

// Bit slices are MSB first, matching the order in which navigation bits are transmitted

pub fn to_u64(bools:&[bool]) -> Result<u64, DigSigProcErr> {
	if bools.len() <= 64 {
		Ok(bools.iter().fold(0u64, |acc, b| (acc << 1) | (*b as u64)))
	} else {
		Err(DigSigProcErr::InvalidTelemetryData("x.len() > 64 in bools_to_int::to_u64"))
	}
}

/// Interprets the slice as a two's complement integer of width bools.len()
pub fn to_i64(bools:&[bool]) -> Result<i64, DigSigProcErr> {
	let n = bools.len();
	let raw = to_u64(bools)?;
	if n == 0 || n == 64 || !bools[0] { Ok(raw as i64) }
	else { Ok((raw as i64) - (1i64 << n)) }
}

pub fn to_u8(bools:&[bool]) -> Result<u8, DigSigProcErr> {
	if bools.len() <= 8 { Ok(to_u64(bools)? as u8) }
	else { Err(DigSigProcErr::InvalidTelemetryData("x.len() > 8 in bools_to_int::to_u8")) }
}

pub fn to_u16(bools:&[bool]) -> Result<u16, DigSigProcErr> {
	if bools.len() <= 16 { Ok(to_u64(bools)? as u16) }
	else { Err(DigSigProcErr::InvalidTelemetryData("x.len() > 16 in bools_to_int::to_u16")) }
}

pub fn to_u32(bools:&[bool]) -> Result<u32, DigSigProcErr> {
	if bools.len() <= 32 { Ok(to_u64(bools)? as u32) }
	else { Err(DigSigProcErr::InvalidTelemetryData("x.len() > 32 in bools_to_int::to_u32")) }
}

pub fn to_i8(bools:&[bool]) -> Result<i8, DigSigProcErr> {
	if bools.len() <= 8 { Ok(to_i64(bools)? as i8) }
	else { Err(DigSigProcErr::InvalidTelemetryData("x.len() > 8 in bools_to_int::to_i8")) }
}

pub fn to_i16(bools:&[bool]) -> Result<i16, DigSigProcErr> {
	if bools.len() <= 16 { Ok(to_i64(bools)? as i16) }
	else { Err(DigSigProcErr::InvalidTelemetryData("x.len() > 16 in bools_to_int::to_i16")) }
}

pub fn to_i32(bools:&[bool]) -> Result<i32, DigSigProcErr> {
	if bools.len() <= 32 { Ok(to_i64(bools)? as i32) }
	else { Err(DigSigProcErr::InvalidTelemetryData("x.len() > 32 in bools_to_int::to_i32")) }
}

/// Writes the low dst.len() bits of x into dst, MSB first.  Negative values come out in two's complement.
pub fn write_bits(dst:&mut [bool], x:i64) {
	let n = dst.len();
	for (i, b) in dst.iter_mut().enumerate() {
		*b = (x >> (n - i - 1)) & 1 == 1;
	}
}

/// Quantizes x with the given scale factor and writes it with write_bits
pub fn write_scaled(dst:&mut [bool], x:f64, scale:f64) {
	write_bits(dst, (x / scale).round() as i64);
}

#[cfg(test)]
mod tests {

	use super::*;

	#[test]
	fn unsigned_msb_first() {
		assert_eq!(to_u8(&[true, false, false, false, true, false, true, true]).unwrap(), 0x8B);
		assert_eq!(to_u16(&[true, false, true]).unwrap(), 5);
		assert!(to_u8(&[false; 9]).is_err());
	}

	#[test]
	fn signed_twos_complement() {
		assert_eq!(to_i8(&[true; 8]).unwrap(), -1);
		assert_eq!(to_i8(&[true, false, false, false, false, false, false, false]).unwrap(), -128);
		assert_eq!(to_i16(&[true, true, true, false]).unwrap(), -2);
		assert_eq!(to_i32(&[false, true, true]).unwrap(), 3);
	}

	#[test]
	fn write_then_read() {
		let mut bits = [false; 22];
		write_bits(&mut bits, -12345);
		assert_eq!(to_i32(&bits).unwrap(), -12345);
		write_scaled(&mut bits, 3.0 * (2.0_f64).powi(-31), (2.0_f64).powi(-31));
		assert_eq!(to_i32(&bits).unwrap(), 3);
	}

}
