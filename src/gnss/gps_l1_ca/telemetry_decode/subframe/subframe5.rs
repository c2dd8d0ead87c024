use serde::{Serialize, Deserialize};

use crate::DigSigProcErr;
use crate::utils::bools_to_int;
use super::subframe4::Almanac;

#[derive(Debug, Serialize, Deserialize, Copy, Clone, PartialEq)]
pub struct Body {
	pub data_id:u8,
	pub sv_id:u8,
	pub page:Page,
}

#[derive(Debug, Serialize, Deserialize, Copy, Clone, PartialEq)]
pub enum Page {
	AlmanacData(Almanac),
	/// Almanac reference time and health of SVs 1 through 24
	Page25{ t_oa:u32, wn_a:u8, sv_health:[u8; 24] },
	/// Dummy SV id
	Reserved,
}

impl Body {

	pub fn new(bits:&[bool; 240]) -> Result<Body, DigSigProcErr> {
		let data_id:u8 = bools_to_int::to_u8(&bits[48..50])?;
		let sv_id:u8   = bools_to_int::to_u8(&bits[50..56])?;
		let page:Page = match sv_id {
			1..=24 => Page::AlmanacData(Almanac::new(bits)?),
			51 => {
				let t_oa:u32 = bools_to_int::to_u32(&bits[56..64])? * 2_u32.pow(12);
				let wn_a:u8  = bools_to_int::to_u8(&bits[64..72])?;
				let mut sv_health:[u8; 24] = [0; 24];
				for (i, x) in sv_health.iter_mut().enumerate() {
					*x = bools_to_int::to_u8(&bits[(72+(i*6))..(78+(i*6))])?;
				}
				Page::Page25{ t_oa, wn_a, sv_health }
			},
			0 => Page::Reserved,
			_ => return Err(DigSigProcErr::InvalidTelemetryData("Unexpected SV id in subframe 5")),
		};
		Ok(Body{ data_id, sv_id, page })
	}

}
