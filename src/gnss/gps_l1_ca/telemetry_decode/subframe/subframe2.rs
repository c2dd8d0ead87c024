use serde::{Serialize, Deserialize};

use crate::DigSigProcErr;
use crate::utils::bools_to_int;

/// First half of the ephemeris.  Angles stay in semicircles as transmitted.
#[derive(Debug, Serialize, Deserialize, Copy, Clone, PartialEq)]
pub struct Body {
	pub iode:u8,
	pub crs:f64,
	pub dn:f64,
	pub m0:f64,
	pub cuc:f64,
	pub e:f64,
	pub cus:f64,
	pub sqrt_a:f64,
	pub t_oe:f64,
	pub fit_interval:bool,
	pub aodo:u8,
}

impl Body {

	pub fn new(bits:&[bool; 240]) -> Result<Body, DigSigProcErr> {
		let iode:u8    =  bools_to_int::to_u8( &bits[ 48..56 ])?;
		let crs:f64    = (bools_to_int::to_i16(&bits[ 56..72 ])? as f64) * (2.0_f64).powi(-5);
		let dn:f64     = (bools_to_int::to_i16(&bits[ 72..88 ])? as f64) * (2.0_f64).powi(-43);
		let m0:f64     = (bools_to_int::to_i32(&bits[ 88..120])? as f64) * (2.0_f64).powi(-31);
		let cuc:f64    = (bools_to_int::to_i16(&bits[120..136])? as f64) * (2.0_f64).powi(-29);
		let e:f64      = (bools_to_int::to_u32(&bits[136..168])? as f64) * (2.0_f64).powi(-33);
		let cus:f64    = (bools_to_int::to_i16(&bits[168..184])? as f64) * (2.0_f64).powi(-29);
		let sqrt_a:f64 = (bools_to_int::to_u32(&bits[184..216])? as f64) * (2.0_f64).powi(-19);
		let t_oe:f64   = (bools_to_int::to_u16(&bits[216..232])? as f64) * 16.0;
		let fit_interval:bool = bits[232];
		let aodo:u8    =  bools_to_int::to_u8( &bits[233..238])?;
		Ok(Body{ iode, crs, dn, m0, cuc, e, cus, sqrt_a, t_oe, fit_interval, aodo })
	}

	pub fn encode(&self, bits:&mut [bool; 240]) {
		bools_to_int::write_bits(  &mut bits[ 48..56 ], self.iode as i64);
		bools_to_int::write_scaled(&mut bits[ 56..72 ], self.crs,    (2.0_f64).powi(-5));
		bools_to_int::write_scaled(&mut bits[ 72..88 ], self.dn,     (2.0_f64).powi(-43));
		bools_to_int::write_scaled(&mut bits[ 88..120], self.m0,     (2.0_f64).powi(-31));
		bools_to_int::write_scaled(&mut bits[120..136], self.cuc,    (2.0_f64).powi(-29));
		bools_to_int::write_scaled(&mut bits[136..168], self.e,      (2.0_f64).powi(-33));
		bools_to_int::write_scaled(&mut bits[168..184], self.cus,    (2.0_f64).powi(-29));
		bools_to_int::write_scaled(&mut bits[184..216], self.sqrt_a, (2.0_f64).powi(-19));
		bools_to_int::write_scaled(&mut bits[216..232], self.t_oe,   16.0);
		bits[232] = self.fit_interval;
		bools_to_int::write_bits(  &mut bits[233..238], self.aodo as i64);
	}

}
