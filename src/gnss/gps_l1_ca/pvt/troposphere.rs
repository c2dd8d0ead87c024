// Surface refractivity of the standard atmosphere
const NS:f64 = 324.8;

/// Slant tropospheric delay [m] from a closed-form refractivity profile (Niell style mapping) for a user at
/// `height_m` above the ellipsoid seeing the SV at `elevation` [rad].  The profile is only fit up to 1 [km], so
/// heights are clamped to [0, 1] [km].
pub fn delay(elevation:f64, height_m:f64) -> f64 {
	let el = elevation.max(0.0);
	let h_km = (height_m / 1000.0).max(0.0).min(1.0);

	let mapping = 1.0 / (el.sin() + 0.00143 / (el.tan() + 0.0455));

	let delta_n = -7.32 * (0.005577 * NS).exp();
	let zenith = (NS + 0.5*delta_n - NS*h_km - 0.5*delta_n*h_km.powi(2) + 1430.0 + 732.0) * 1.0e-3;

	mapping * zenith
}

#[cfg(test)]
mod tests {

	use super::*;

	#[test]
	fn zenith_delay_is_a_couple_of_meters() {
		let d = delay(std::f64::consts::FRAC_PI_2, 0.0);
		assert!(d > 2.3 && d < 2.6, "zenith delay {}", d);
		assert!(delay(std::f64::consts::FRAC_PI_2, 800.0) < d);
	}

	#[test]
	fn slant_delay_grows_toward_the_horizon() {
		let mut last = 0.0;
		for deg in [90.0_f64, 45.0, 20.0, 10.0, 5.0, 0.0].iter() {
			let d = delay(deg.to_radians(), 100.0);
			assert!(d > last && d.is_finite());
			last = d;
		}
		// Below the horizon behaves like the horizon
		assert_eq!(delay(-0.1, 100.0), delay(0.0, 100.0));
	}

}
