use nalgebra::{Matrix3, Vector3};
use serde::{Serialize, Deserialize};

pub const WGS84_SEMI_MAJOR_AXIS_METERS:f64 = 6378137.0;
pub const WGS84_SEMI_MINOR_AXIS_METERS:f64 = 6356752.314245;

pub const C:f64 = 299792458.0;      // [m/s] speed of light

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PositionWGS84 {
	pub latitude:f64,
	pub longitude:f64,
	pub height_above_ellipsoid:f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct AzEl {
	pub azimuth:f64,
	pub elevation:f64,
	pub range:f64,
}

pub fn ecef_to_wgs84(e1:f64, e2:f64, e3:f64) -> PositionWGS84 {
	let a_sq:f64 = WGS84_SEMI_MAJOR_AXIS_METERS.powi(2);
	let b_sq:f64 = WGS84_SEMI_MINOR_AXIS_METERS.powi(2);

	let e_sq:f64  = (a_sq - b_sq) / a_sq;
	let ep_sq:f64 = (a_sq - b_sq) / b_sq;

	let p:f64 = (e1*e1 + e2*e2).sqrt();
	let r:f64 = (p*p   + e3*e3).sqrt();

	let beta:f64 = (((WGS84_SEMI_MINOR_AXIS_METERS*e3)/(WGS84_SEMI_MAJOR_AXIS_METERS*p)) * (1.0 + ep_sq*(WGS84_SEMI_MINOR_AXIS_METERS/r))).atan();

	let latitude:f64 = {
		let num:f64 = e3 + (ep_sq * WGS84_SEMI_MINOR_AXIS_METERS * beta.sin().powi(3));
		let denom:f64 = p - (e_sq * WGS84_SEMI_MAJOR_AXIS_METERS * beta.cos().powi(3));
		(num/denom).atan()
	};
	let longitude:f64 = e2.atan2(e1);

	let v = WGS84_SEMI_MAJOR_AXIS_METERS / (1.0 - (e_sq*latitude.sin().powi(2))).sqrt();
	let height_above_ellipsoid = p*latitude.cos() + e3*latitude.sin() - (WGS84_SEMI_MAJOR_AXIS_METERS.powi(2) / v);

	PositionWGS84{ latitude, longitude, height_above_ellipsoid }
}

pub fn wgs84_to_ecef(pos:&PositionWGS84) -> Vector3<f64> {
	let a_sq:f64 = WGS84_SEMI_MAJOR_AXIS_METERS.powi(2);
	let e_sq:f64 = (a_sq - WGS84_SEMI_MINOR_AXIS_METERS.powi(2)) / a_sq;
	let (phi, lam, h) = (pos.latitude, pos.longitude, pos.height_above_ellipsoid);
	let n = WGS84_SEMI_MAJOR_AXIS_METERS / (1.0 - e_sq*phi.sin().powi(2)).sqrt();
	Vector3::new((n + h)*phi.cos()*lam.cos(), (n + h)*phi.cos()*lam.sin(), (n*(1.0 - e_sq) + h)*phi.sin())
}

/// Rotation taking ECEF vectors into the local east-north-up frame at the given geodetic latitude and longitude
pub fn dcm_enu_from_ecef(latitude:f64, longitude:f64) -> Matrix3<f64> {
	let (sp, cp) = (latitude.sin(),  latitude.cos());
	let (sl, cl) = (longitude.sin(), longitude.cos());
	Matrix3::new(    -sl,      cl, 0.0,
	             -sp*cl,  -sp*sl,  cp,
	              cp*cl,   cp*sl,  sp)
}

/// Azimuth and elevation [rad] of a target as seen from the observer, both given in ECEF
pub fn topocentric(obs_ecef:&Vector3<f64>, target_ecef:&Vector3<f64>) -> AzEl {
	let obs_wgs84 = ecef_to_wgs84(obs_ecef[0], obs_ecef[1], obs_ecef[2]);
	let r_l = dcm_enu_from_ecef(obs_wgs84.latitude, obs_wgs84.longitude) * (target_ecef - obs_ecef);

	let horizontal = (r_l[0].powi(2) + r_l[1].powi(2)).sqrt();
	let mut azimuth = r_l[0].atan2(r_l[1]);
	if azimuth < 0.0 { azimuth += 2.0 * std::f64::consts::PI; }

	AzEl{ azimuth, elevation: r_l[2].atan2(horizontal), range: r_l.norm() }
}
