use serde::{Serialize, Deserialize};

use crate::DigSigProcErr;
use crate::utils::bools_to_int;

#[derive(Debug, Serialize, Deserialize, Copy, Clone, PartialEq)]
pub struct Body {
	pub data_id:u8,
	pub sv_id:u8,
	pub page:Page,
}

/// Almanac entry shared by subframes 4 and 5.  Angles in semicircles.
#[derive(Debug, Serialize, Deserialize, Copy, Clone, PartialEq)]
pub struct Almanac {
	pub e:f64,
	pub t_oa:u32,
	pub delta_i:f64,
	pub omega_dot:f64,
	pub sv_health:u8,
	pub sqrt_a:f64,
	pub omega0:f64,
	pub omega:f64,
	pub m0:f64,
	pub af0:f64,
	pub af1:f64,
}

impl Almanac {

	pub fn new(bits:&[bool; 240]) -> Result<Almanac, DigSigProcErr> {
		Ok(Almanac{
			e:         (bools_to_int::to_u16(&bits[ 56..72 ])? as f64) * (2.0_f64).powi(-21),
			t_oa:       bools_to_int::to_u32(&bits[ 72..80 ])? * 2_u32.pow(12),
			delta_i:   (bools_to_int::to_i16(&bits[ 80..96 ])? as f64) * (2.0_f64).powi(-19),
			omega_dot: (bools_to_int::to_i16(&bits[ 96..112])? as f64) * (2.0_f64).powi(-38),
			sv_health:  bools_to_int::to_u8( &bits[112..120])?,
			sqrt_a:    (bools_to_int::to_u32(&bits[120..144])? as f64) * (2.0_f64).powi(-11),
			omega0:    (bools_to_int::to_i32(&bits[144..168])? as f64) * (2.0_f64).powi(-23),
			omega:     (bools_to_int::to_i32(&bits[168..192])? as f64) * (2.0_f64).powi(-23),
			m0:        (bools_to_int::to_i32(&bits[192..216])? as f64) * (2.0_f64).powi(-23),
			af0:       (bools_to_int::to_i16(&[&bits[216..224], &bits[235..238]].concat())? as f64) * (2.0_f64).powi(-20),
			af1:       (bools_to_int::to_i16(&bits[224..235])? as f64) * (2.0_f64).powi(-38),
		})
	}

}

#[derive(Debug, Serialize, Deserialize, Copy, Clone, PartialEq)]
pub enum Page {
	AlmanacData(Almanac),
	NavigationMessageCorrectionTable{ availability:u8, erd:[u8; 30] },
	SpecialMessages([u8; 22]),
	/// Ionosphere and UTC parameters
	Page18{
		alpha0:f64, alpha1:f64, alpha2:f64, alpha3:f64,
		beta0:f64,  beta1:f64,  beta2:f64,  beta3:f64,
		a1:f64, a0:f64, t_ot:u32, wn_t:u8,
		delta_t_ls:i8, wn_lsf:u8, dn:u8, delta_t_lsf:i8,
	},
	/// Anti-spoofing flags and configuration for all 32 SVs plus health of SVs 25 through 32
	Page25{ antispoof_and_config:[u8; 32], sv_health:[u8; 8] },
	Reserved,
}

impl Body {

	pub fn new(bits:&[bool; 240]) -> Result<Body, DigSigProcErr> {
		let data_id:u8 = bools_to_int::to_u8(&bits[48..50])?;
		let sv_id:u8   = bools_to_int::to_u8(&bits[50..56])?;
		let page:Page = match sv_id {
			25..=32 => Page::AlmanacData(Almanac::new(bits)?),
			52 => {
				let availability:u8 = bools_to_int::to_u8(&bits[56..58])?;
				let mut erd:[u8; 30] = [0; 30];
				for (i, x) in erd.iter_mut().enumerate() {
					*x = bools_to_int::to_u8(&bits[(58+(i*6))..(64+(i*6))])?;
				}
				Page::NavigationMessageCorrectionTable{ availability, erd }
			},
			55 => {
				let mut message:[u8; 22] = [0; 22];
				for (i, x) in message.iter_mut().enumerate() {
					*x = bools_to_int::to_u8(&bits[(56+(i*8))..(64+(i*8))])?;
				}
				Page::SpecialMessages(message)
			},
			56 => Page::Page18{
				alpha0:      (bools_to_int::to_i8(&bits[ 56..64 ])? as f64) * (2.0_f64).powi(-30),
				alpha1:      (bools_to_int::to_i8(&bits[ 64..72 ])? as f64) * (2.0_f64).powi(-27),
				alpha2:      (bools_to_int::to_i8(&bits[ 72..80 ])? as f64) * (2.0_f64).powi(-24),
				alpha3:      (bools_to_int::to_i8(&bits[ 80..88 ])? as f64) * (2.0_f64).powi(-24),
				beta0:       (bools_to_int::to_i8(&bits[ 88..96 ])? as f64) * (2.0_f64).powi(11),
				beta1:       (bools_to_int::to_i8(&bits[ 96..104])? as f64) * (2.0_f64).powi(14),
				beta2:       (bools_to_int::to_i8(&bits[104..112])? as f64) * (2.0_f64).powi(16),
				beta3:       (bools_to_int::to_i8(&bits[112..120])? as f64) * (2.0_f64).powi(16),
				a1:          (bools_to_int::to_i32(&bits[120..144])? as f64) * (2.0_f64).powi(-50),
				a0:          (bools_to_int::to_i32(&bits[144..176])? as f64) * (2.0_f64).powi(-30),
				t_ot:         bools_to_int::to_u32(&bits[176..184])? * 2_u32.pow(12),
				wn_t:         bools_to_int::to_u8( &bits[184..192])?,
				delta_t_ls:   bools_to_int::to_i8( &bits[192..200])?,
				wn_lsf:       bools_to_int::to_u8( &bits[200..208])?,
				dn:           bools_to_int::to_u8( &bits[208..216])?,
				delta_t_lsf:  bools_to_int::to_i8( &bits[216..224])?,
			},
			63 => {
				let mut antispoof_and_config:[u8; 32] = [0; 32];
				for (i, x) in antispoof_and_config.iter_mut().enumerate() {
					*x = bools_to_int::to_u8(&bits[(56+(i*4))..(60+(i*4))])?;
				}
				let mut sv_health:[u8; 8] = [0; 8];
				for (i, x) in sv_health.iter_mut().enumerate() {
					*x = bools_to_int::to_u8(&bits[(186+(i*6))..(192+(i*6))])?;
				}
				Page::Page25{ antispoof_and_config, sv_health }
			},
			_ => Page::Reserved,
		};

		Ok(Body{ data_id, sv_id, page })
	}

}
