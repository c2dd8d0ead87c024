use serde::{Serialize, Deserialize};

use crate::DigSigProcErr;
use crate::utils::bools_to_int;
use super::{PREAMBLE, SUBFRAME_SIZE_DATA_ONLY_BITS};

pub mod subframe1;
pub mod subframe2;
pub mod subframe3;
pub mod subframe4;
pub mod subframe5;

pub const SECONDS_PER_WEEK:f64 = 604800.0;
pub const SUBFRAME_DURATION_SEC:f64 = 6.0;

// Largest valid truncated TOW count; one count is 6 [sec]
const MAX_TOW_TRUNCATED:u32 = 100799;

#[derive(Debug, Serialize, Deserialize, Copy, Clone, PartialEq)]
pub struct Subframe {
	pub tlm_message:u16,
	pub time_of_week_truncated:u32,
	pub alert:bool,
	pub anti_spoof:bool,
	pub subframe_id:u8,
	pub body:SubframeBody,
}

#[derive(Debug, Serialize, Deserialize, Copy, Clone, PartialEq)]
pub enum SubframeBody {
	Subframe1(subframe1::Body),
	Subframe2(subframe2::Body),
	Subframe3(subframe3::Body),
	Subframe4(subframe4::Body),
	Subframe5(subframe5::Body),
}

impl Subframe {

	/// GPS time of week [sec] at the start of the following subframe, which is what the HOW count refers to
	pub fn time_of_week(&self) -> f64 { (self.time_of_week_truncated as f64) * SUBFRAME_DURATION_SEC }

	/// GPS time of week [sec] at the leading edge of this subframe's first bit
	pub fn start_time_of_week(&self) -> f64 { (self.time_of_week() - SUBFRAME_DURATION_SEC).rem_euclid(SECONDS_PER_WEEK) }

	/// Source data bits for this subframe with the t bits left clear.  Only subframes 1 through 3 can be encoded.
	pub fn encode(&self) -> Result<[bool; SUBFRAME_SIZE_DATA_ONLY_BITS], DigSigProcErr> {
		let mut bits = [false; SUBFRAME_SIZE_DATA_ONLY_BITS];

		bits[..8].copy_from_slice(&PREAMBLE);
		bools_to_int::write_bits(&mut bits[8..22], self.tlm_message as i64);
		bools_to_int::write_bits(&mut bits[24..41], self.time_of_week_truncated as i64);
		bits[41] = self.alert;
		bits[42] = self.anti_spoof;
		bools_to_int::write_bits(&mut bits[43..46], self.subframe_id as i64);

		match self.body {
			SubframeBody::Subframe1(b) => b.encode(&mut bits),
			SubframeBody::Subframe2(b) => b.encode(&mut bits),
			SubframeBody::Subframe3(b) => b.encode(&mut bits),
			_ => return Err(DigSigProcErr::InvalidTelemetryData("Encoding is only supported for subframes 1 through 3")),
		}

		Ok(bits)
	}

}

pub fn decode(bits:&[bool; SUBFRAME_SIZE_DATA_ONLY_BITS]) -> Result<Subframe, DigSigProcErr> {
	if bits[..8] != PREAMBLE { return Err(DigSigProcErr::InvalidTelemetryData("Missing preamble")); }

	let tlm_message:u16 = bools_to_int::to_u16(&bits[8..22])?;
	let time_of_week_truncated:u32 = bools_to_int::to_u32(&bits[24..41])?;
	if time_of_week_truncated > MAX_TOW_TRUNCATED {
		return Err(DigSigProcErr::InvalidTelemetryData("Time of week beyond the end of the week"));
	}
	let alert = bits[41];
	let anti_spoof = bits[42];
	let subframe_id:u8 = bools_to_int::to_u8(&bits[43..46])?;

	let body = match subframe_id {
		1 => SubframeBody::Subframe1(subframe1::Body::new(bits)?),
		2 => SubframeBody::Subframe2(subframe2::Body::new(bits)?),
		3 => SubframeBody::Subframe3(subframe3::Body::new(bits)?),
		4 => SubframeBody::Subframe4(subframe4::Body::new(bits)?),
		5 => SubframeBody::Subframe5(subframe5::Body::new(bits)?),
		_ => return Err(DigSigProcErr::InvalidTelemetryData("Subframe number other than 1 through 5")),
	};

	Ok(Subframe{ tlm_message, time_of_week_truncated, alert, anti_spoof, subframe_id, body })
}
