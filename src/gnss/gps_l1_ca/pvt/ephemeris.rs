use nalgebra::Vector3;
use serde::{Serialize, Deserialize};

use crate::DigSigProcErr;
use crate::gnss::gps_l1_ca::telemetry_decode::subframe::{subframe1, subframe2, subframe3, SECONDS_PER_WEEK};

pub const MU:f64 = 3.986005e14;              // [m^3/s^2] WGS-84 value of the earth's gravitational constant
pub const F:f64 = -4.442807633e-10;          // [sec/root-meter]
pub const GPS_PI:f64 = 3.1415926535898;      // Value of pi the orbit parameters are defined with

// NOTE: IS-GPS-200 calls this OMEGA_DOT_E but omega_dot would be angular acceleration, so the more common name is used
pub const OMEGA_E:f64 = 7.2921151467e-5;     // [rad/s] WGS-84 value of the earth's rotation rate

// Half-width of the interval used for central-difference velocity [sec]
const VELOCITY_STEP_SEC:f64 = 0.5;

/// Wraps a time difference into +/- half a week
pub fn check_t(t:f64) -> f64 {
	let half_week = SECONDS_PER_WEEK / 2.0;
	if t > half_week { t - SECONDS_PER_WEEK }
	else if t < -half_week { t + SECONDS_PER_WEEK }
	else { t }
}

/// Broadcast clock and orbit parameters from one consistent set of subframes 1 through 3.  Angles are in
/// semicircles and angular rates in semicircles per second, as transmitted.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq)]
pub struct Ephemeris {
	pub week_number:u16, pub t_gd:f64,    pub aodo: u8,    pub fit_interval:bool,
	pub t_oc: f64,       pub a_f0: f64,   pub a_f1: f64,   pub a_f2: f64,
	pub t_oe: f64,       pub sqrt_a: f64, pub dn: f64,     pub m0: f64,
	pub e: f64,          pub omega: f64,  pub omega0: f64, pub omega_dot: f64,
	pub cus: f64,        pub cuc: f64,    pub crs: f64,    pub crc: f64,
	pub cis: f64,        pub cic: f64,    pub i0: f64,     pub idot: f64,
	pub iodc: u16,       pub iode: u8,    pub sv_health: u8, pub ura_index: u8,
}

/// Satellite position, velocity and clock at a transmit time
#[derive(Debug, Clone, Copy)]
pub struct SatelliteState {
	/// ECEF position at transmit time, in the frame of the transmit instant [m]
	pub pos:Vector3<f64>,
	pub vel:Vector3<f64>,
	/// SV clock offset including the relativistic and group delay terms [sec]
	pub clock_corr:f64,
	/// SV clock drift [sec/sec]
	pub clock_drift:f64,
}

impl Ephemeris {

	/// Combines subframes 1 through 3.  The IODE of 2 and 3 must agree with each other and with the low eight bits
	/// of the IODC, or the set straddles an upload and is rejected.
	pub fn from_subframes(sf1:&subframe1::Body, sf2:&subframe2::Body, sf3:&subframe3::Body) -> Result<Self, DigSigProcErr> {
		if sf2.iode != sf3.iode || (sf1.iodc & 0xFF) as u8 != sf2.iode {
			return Err(DigSigProcErr::InvalidTelemetryData("IODE and IODC disagree across subframes 1 through 3"));
		}

		Ok(Ephemeris{
			week_number: sf1.week_number, t_gd: sf1.t_gd, aodo: sf2.aodo, fit_interval: sf2.fit_interval,
			t_oc: sf1.t_oc as f64, a_f0: sf1.a_f0, a_f1: sf1.a_f1, a_f2: sf1.a_f2,
			t_oe: sf2.t_oe, sqrt_a: sf2.sqrt_a, dn: sf2.dn, m0: sf2.m0,
			e: sf2.e, omega: sf3.omega, omega0: sf3.omega0, omega_dot: sf3.omega_dot,
			cus: sf2.cus, cuc: sf2.cuc, crs: sf2.crs, crc: sf3.crc,
			cis: sf3.cis, cic: sf3.cic, i0: sf3.i0, idot: sf3.idot,
			iodc: sf1.iodc, iode: sf2.iode, sv_health: sf1.sv_health, ura_index: sf1.ura_index,
		})
	}

	pub fn is_healthy(&self) -> bool { self.sv_health == 0 }

	/// True while t [sec of week] lies inside the curve fit interval around t_oe
	pub fn is_valid_at(&self, t:f64) -> bool {
		let half_fit = if self.fit_interval { 3.0 * 3600.0 } else { 2.0 * 3600.0 };
		check_t(t - self.t_oe).abs() <= half_fit
	}

	/// SV clock correction without the relativistic term [sec]
	pub fn dt_sv(&self, t:f64) -> f64 {
		let dt = check_t(t - self.t_oc);
		(self.a_f2 * dt + self.a_f1) * dt + self.a_f0 - self.t_gd
	}

	// Position in ECEF at GPS time t along with the eccentric anomaly
	fn position(&self, t:f64) -> (Vector3<f64>, f64) {
		let a:f64 = self.sqrt_a.powi(2);
		let n0:f64 = (MU / a.powi(3)).sqrt();
		let tk:f64 = check_t(t - self.t_oe);
		let n:f64 = n0 + self.dn * GPS_PI;

		// Mean anomaly, then eccentric anomaly by fixed-point iteration
		let mk:f64 = (self.m0 * GPS_PI + n*tk).rem_euclid(2.0 * GPS_PI);
		let mut ek:f64 = mk;
		for _ in 0..10 {
			let ek_old = ek;
			ek = mk + self.e * ek.sin();
			if (ek - ek_old).abs() < 1.0e-12 { break; }
		}

		let nu_k:f64 = ((1.0 - self.e.powi(2)).sqrt() * ek.sin()).atan2(ek.cos() - self.e);
		let phi_k:f64 = nu_k + self.omega * GPS_PI;

		let (s2, c2) = (2.0*phi_k).sin_cos();
		let u_k:f64 = phi_k + self.cus*s2 + self.cuc*c2;
		let r_k:f64 = a*(1.0 - self.e*ek.cos()) + self.crs*s2 + self.crc*c2;
		let i_k:f64 = self.i0 * GPS_PI + self.idot * GPS_PI * tk + self.cis*s2 + self.cic*c2;

		let x_kp:f64 = r_k * u_k.cos();
		let y_kp:f64 = r_k * u_k.sin();

		let omega_k:f64 = self.omega0 * GPS_PI + (self.omega_dot * GPS_PI - OMEGA_E)*tk - OMEGA_E*self.t_oe;

		let pos = Vector3::new(
			x_kp * omega_k.cos() - y_kp * i_k.cos() * omega_k.sin(),
			x_kp * omega_k.sin() + y_kp * i_k.cos() * omega_k.cos(),
			y_kp * i_k.sin());

		(pos, ek)
	}

	/// Position [m] and clock correction [sec] at SV transmit time t_sv
	pub fn pos_and_clock(&self, t_sv:f64) -> (Vector3<f64>, f64) {
		let clock = self.dt_sv(t_sv);
		let (pos, ek) = self.position(t_sv - clock);

		// Relativistic correction to the SV clock
		let dt_r:f64 = F * self.e * self.sqrt_a * ek.sin();

		(pos, clock + dt_r)
	}

	/// ECEF velocity [m/s] by central difference of the propagated position
	pub fn velocity(&self, t:f64) -> Vector3<f64> {
		let (ahead, _) = self.position(t + VELOCITY_STEP_SEC);
		let (behind, _) = self.position(t - VELOCITY_STEP_SEC);
		(ahead - behind) / (2.0 * VELOCITY_STEP_SEC)
	}

	pub fn state(&self, t_sv:f64) -> SatelliteState {
		let (pos, clock_corr) = self.pos_and_clock(t_sv);
		let vel = self.velocity(t_sv - clock_corr);
		let clock_drift = self.a_f1 + 2.0 * self.a_f2 * check_t(t_sv - self.t_oc);
		SatelliteState{ pos, vel, clock_corr, clock_drift }
	}

}

#[cfg(test)]
pub mod tests {

	use super::*;
	use crate::gnss::gps_l1_ca::telemetry_decode::subframe::{self, SubframeBody};

	/// A plausible broadcast set with the orbit plane and phase chosen by the caller [semicircles]
	pub fn synthetic(omega0:f64, m0:f64) -> Ephemeris {
		Ephemeris{
			week_number: 187, t_gd: -5.0e-9, aodo: 0, fit_interval: false,
			t_oc: 302400.0, a_f0: 2.0e-5, a_f1: 1.0e-12, a_f2: 0.0,
			t_oe: 302400.0, sqrt_a: 5153.7, dn: 1.4e-9, m0,
			e: 0.01, omega: 0.3, omega0, omega_dot: -2.6e-9,
			cus: 5.0e-6, cuc: -1.0e-6, crs: 20.0, crc: 250.0,
			cis: 1.0e-7, cic: -5.0e-8, i0: 0.306, idot: 1.0e-10,
			iodc: 0x2A7, iode: 0xA7, sv_health: 0, ura_index: 0,
		}
	}

	#[test]
	fn check_t_wraps_half_week() {
		assert_eq!(check_t(400000.0), 400000.0 - 604800.0);
		assert_eq!(check_t(-400000.0), 604800.0 - 400000.0);
		assert_eq!(check_t(1000.0), 1000.0);
	}

	#[test]
	fn orbit_is_plausible() {
		let eph = synthetic(0.2, -0.4);
		let a = eph.sqrt_a.powi(2);
		for k in 0..12 {
			let t = eph.t_oe + (k as f64) * 1200.0 - 7200.0;
			let st = eph.state(t);
			let r = st.pos.norm();
			assert!(r > a * (1.0 - eph.e) - 2000.0 && r < a * (1.0 + eph.e) + 2000.0, "radius {}", r);
			let v = st.vel.norm();
			assert!(v > 1500.0 && v < 4500.0, "speed {}", v);
			assert!(st.clock_corr.abs() < 1.0e-4);
		}
	}

	#[test]
	fn velocity_matches_position_steps() {
		let eph = synthetic(-0.7, 0.9);
		let t = 305000.0;
		let (p0, _) = eph.position(t);
		let (p1, _) = eph.position(t + 0.01);
		let numeric = (p1 - p0) / 0.01;
		assert!((numeric - eph.velocity(t + 0.005)).norm() < 1.0e-2);
	}

	#[test]
	fn validity_window_follows_fit_flag() {
		let mut eph = synthetic(0.0, 0.0);
		assert!(eph.is_valid_at(eph.t_oe + 7000.0));
		assert!(!eph.is_valid_at(eph.t_oe + 9000.0));
		eph.fit_interval = true;
		assert!(eph.is_valid_at(eph.t_oe - 9000.0));
		assert!(!eph.is_valid_at(eph.t_oe + 11000.0));
	}

	#[test]
	fn assembled_from_decoded_subframes() {
		let sfs = subframe::tests::sample_subframes(50_400);
		let bodies:Vec<SubframeBody> = sfs.iter().map(|sf| sf.body).collect();
		match (bodies[0], bodies[1], bodies[2]) {
			(SubframeBody::Subframe1(s1), SubframeBody::Subframe2(s2), SubframeBody::Subframe3(mut s3)) => {
				let eph = Ephemeris::from_subframes(&s1, &s2, &s3).unwrap();
				assert_eq!(eph.iode, 0xA7);
				assert_eq!(eph.t_oe, 302400.0);
				assert!(eph.fit_interval);

				s3.iode = 0xA8;
				assert!(Ephemeris::from_subframes(&s1, &s2, &s3).is_err());
			},
			_ => panic!("sample subframes out of order"),
		}
	}

}
