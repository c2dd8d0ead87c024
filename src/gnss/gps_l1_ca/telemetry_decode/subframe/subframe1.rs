use serde::{Serialize, Deserialize};

use crate::DigSigProcErr;
use crate::utils::bools_to_int;

#[derive(Debug, Serialize, Deserialize, Copy, Clone, PartialEq)]
#[allow(non_camel_case_types)]
pub enum CodeOnL2 {
	Reserved,
	P_Code,
	CA_Code,
}

/// Clock correction terms and satellite status
#[derive(Debug, Serialize, Deserialize, Copy, Clone, PartialEq)]
pub struct Body {
	/// Ten bit transmitted week number, modulo 1024
	pub week_number:u16,
	pub code_on_l2:CodeOnL2,
	pub ura_index:u8,
	pub sv_health:u8,
	pub iodc:u16,
	pub t_gd:f64,
	pub t_oc:u32,
	pub a_f2:f64,
	pub a_f1:f64,
	pub a_f0:f64,
}

impl Body {

	pub fn new(bits:&[bool; 240]) -> Result<Body, DigSigProcErr> {
		let week_number:u16 = bools_to_int::to_u16(&bits[48..58])?;
		let code_on_l2 = match (bits[58], bits[59]) {
			(false, false) => CodeOnL2::Reserved,
			(false, true ) => CodeOnL2::P_Code,
			(true,  false) => CodeOnL2::CA_Code,
			(true,  true ) => return Err(DigSigProcErr::InvalidTelemetryData("Invalid code_on_l2 field in subframe 1")),
		};
		let ura_index:u8 =  bools_to_int::to_u8(&bits[60..64])?;
		let sv_health:u8 =  bools_to_int::to_u8(&bits[64..70])?;
		let iodc:u16     =  bools_to_int::to_u16(&[&bits[70..72], &bits[168..176]].concat())?;
		let t_gd:f64     = (bools_to_int::to_i8(&bits[160..168])? as f64) * (2.0_f64).powi(-31);
		let t_oc:u32     =  bools_to_int::to_u32(&bits[176..192])? * 16_u32;
		let a_f2:f64     = (bools_to_int::to_i8(&bits[192..200])? as f64) * (2.0_f64).powi(-55);
		let a_f1:f64     = (bools_to_int::to_i16(&bits[200..216])? as f64) * (2.0_f64).powi(-43);
		let a_f0:f64     = (bools_to_int::to_i32(&bits[216..238])? as f64) * (2.0_f64).powi(-31);

		Ok(Body{ week_number, code_on_l2, ura_index, sv_health, iodc, t_gd, t_oc, a_f2, a_f1, a_f0 })
	}

	/// Writes the fields into words 3 through 10 of a subframe, leaving the TLM and HOW untouched
	pub fn encode(&self, bits:&mut [bool; 240]) {
		bools_to_int::write_bits(&mut bits[48..58], self.week_number as i64);
		let (b58, b59) = match self.code_on_l2 {
			CodeOnL2::Reserved => (false, false),
			CodeOnL2::P_Code   => (false, true),
			CodeOnL2::CA_Code  => (true, false),
		};
		bits[58] = b58;
		bits[59] = b59;
		bools_to_int::write_bits(&mut bits[60..64], self.ura_index as i64);
		bools_to_int::write_bits(&mut bits[64..70], self.sv_health as i64);
		bools_to_int::write_bits(&mut bits[70..72], (self.iodc >> 8) as i64);
		bools_to_int::write_bits(&mut bits[168..176], (self.iodc & 0xFF) as i64);
		bools_to_int::write_scaled(&mut bits[160..168], self.t_gd, (2.0_f64).powi(-31));
		bools_to_int::write_bits(&mut bits[176..192], (self.t_oc / 16) as i64);
		bools_to_int::write_scaled(&mut bits[192..200], self.a_f2, (2.0_f64).powi(-55));
		bools_to_int::write_scaled(&mut bits[200..216], self.a_f1, (2.0_f64).powi(-43));
		bools_to_int::write_scaled(&mut bits[216..238], self.a_f0, (2.0_f64).powi(-31));
	}

}
