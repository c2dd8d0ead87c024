use serde::{Serialize, Deserialize};

use crate::DigSigProcErr;
use crate::utils::bools_to_int;

/// Second half of the ephemeris
#[derive(Debug, Serialize, Deserialize, Copy, Clone, PartialEq)]
pub struct Body {
	pub cic:f64,
	pub omega0:f64,
	pub cis:f64,
	pub i0:f64,
	pub crc:f64,
	pub omega:f64,
	pub omega_dot:f64,
	pub iode:u8,
	pub idot:f64,
}

impl Body {

	pub fn new(bits:&[bool; 240]) -> Result<Body, DigSigProcErr> {
		let cic:f64       = (bools_to_int::to_i16(&bits[ 48..64 ])? as f64) * (2.0_f64).powi(-29);
		let omega0:f64    = (bools_to_int::to_i32(&bits[ 64..96 ])? as f64) * (2.0_f64).powi(-31);
		let cis:f64       = (bools_to_int::to_i16(&bits[ 96..112])? as f64) * (2.0_f64).powi(-29);
		let i0:f64        = (bools_to_int::to_i32(&bits[112..144])? as f64) * (2.0_f64).powi(-31);
		let crc:f64       = (bools_to_int::to_i16(&bits[144..160])? as f64) * (2.0_f64).powi(-5);
		let omega:f64     = (bools_to_int::to_i32(&bits[160..192])? as f64) * (2.0_f64).powi(-31);
		let omega_dot:f64 = (bools_to_int::to_i32(&bits[192..216])? as f64) * (2.0_f64).powi(-43);
		let iode:u8       =  bools_to_int::to_u8( &bits[216..224])?;
		let idot:f64      = (bools_to_int::to_i16(&bits[224..238])? as f64) * (2.0_f64).powi(-43);
		Ok(Body{ cic, omega0, cis, i0, crc, omega, omega_dot, iode, idot })
	}

	pub fn encode(&self, bits:&mut [bool; 240]) {
		bools_to_int::write_scaled(&mut bits[ 48..64 ], self.cic,       (2.0_f64).powi(-29));
		bools_to_int::write_scaled(&mut bits[ 64..96 ], self.omega0,    (2.0_f64).powi(-31));
		bools_to_int::write_scaled(&mut bits[ 96..112], self.cis,       (2.0_f64).powi(-29));
		bools_to_int::write_scaled(&mut bits[112..144], self.i0,        (2.0_f64).powi(-31));
		bools_to_int::write_scaled(&mut bits[144..160], self.crc,       (2.0_f64).powi(-5));
		bools_to_int::write_scaled(&mut bits[160..192], self.omega,     (2.0_f64).powi(-31));
		bools_to_int::write_scaled(&mut bits[192..216], self.omega_dot, (2.0_f64).powi(-43));
		bools_to_int::write_bits(  &mut bits[216..224], self.iode as i64);
		bools_to_int::write_scaled(&mut bits[224..238], self.idot,      (2.0_f64).powi(-43));
	}

}
