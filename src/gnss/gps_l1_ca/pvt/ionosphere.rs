use std::f64::consts;

use serde::{Serialize, Deserialize};

use crate::gnss::gps_l1_ca::telemetry_decode::subframe::subframe4::Page;
use crate::utils::kinematics::{AzEl, PositionWGS84};

/// Broadcast single-frequency (Klobuchar) ionosphere coefficients
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Model {
	pub alpha0:f64, pub alpha1:f64, pub alpha2:f64, pub alpha3:f64,
	pub beta0:f64,  pub beta1:f64,  pub beta2:f64,  pub beta3:f64,
}

impl Model {

	/// Picks the coefficients out of subframe 4 page 18
	pub fn from_page(page:&Page) -> Option<Model> {
		match page {
			Page::Page18{ alpha0, alpha1, alpha2, alpha3, beta0, beta1, beta2, beta3, .. } =>
				Some(Model{ alpha0: *alpha0, alpha1: *alpha1, alpha2: *alpha2, alpha3: *alpha3,
					beta0: *beta0, beta1: *beta1, beta2: *beta2, beta3: *beta3 }),
			_ => None,
		}
	}

	/// L1 group delay [sec] for a user at `obs` looking along `azel` at GPS time of week t [sec].  Follows
	/// IS-GPS-200, Figure 20-4, which works mostly in semicircles.
	pub fn delay(&self, obs:&PositionWGS84, azel:&AzEl, t:f64) -> f64 {
		let el:f64 = azel.elevation.max(0.0) / consts::PI;                 // [semicircles]
		let phi_u:f64 = obs.latitude / consts::PI;                          // [semicircles]
		let lam_u:f64 = obs.longitude / consts::PI;                         // [semicircles]

		// Earth-centered angle to the ionospheric pierce point
		let psi:f64 = (0.0137 / (el + 0.11)) - 0.022;                       // [semicircles]
		let phi_i:f64 = (phi_u + psi * azel.azimuth.cos()).max(-0.416).min(0.416);
		let lam_i:f64 = lam_u + (psi * azel.azimuth.sin()) / (phi_i * consts::PI).cos();

		// Geomagnetic latitude of the pierce point
		let phi_m:f64 = phi_i + 0.064 * ((lam_i - 1.617) * consts::PI).cos();

		let t_lcl:f64 = (4.32e4 * lam_i + t).rem_euclid(86400.0);           // [sec]
		let f_iono:f64 = 1.0 + 16.0 * (0.53 - el).powi(3);

		let amp:f64 = (self.alpha0 + phi_m*(self.alpha1 + phi_m*(self.alpha2 + phi_m*self.alpha3))).max(0.0);
		let per:f64 = (self.beta0 + phi_m*(self.beta1 + phi_m*(self.beta2 + phi_m*self.beta3))).max(72000.0);
		let x:f64 = 2.0 * consts::PI * (t_lcl - 50400.0) / per;             // [rad]

		if x.abs() < 1.57 {
			f_iono * (5.0e-9 + amp * (1.0 - x.powi(2)/2.0 + x.powi(4)/24.0))
		} else {
			f_iono * 5.0e-9
		}
	}

}
