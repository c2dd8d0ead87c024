use std::collections::HashMap;

use log::{debug, info, warn};
use nalgebra::{DMatrix, DVector, Matrix3, Vector3, Vector4};
use serde::{Serialize, Deserialize};

use crate::config::{NavigationConfig, ReceiverConfig};
use crate::utils::kinematics::{self, C};
use crate::gnss::gps_l1_ca::L1_FREQ_HZ;

pub mod ephemeris;
pub mod ionosphere;
pub mod store;
pub mod troposphere;

use self::ephemeris::{check_t, OMEGA_E};
use self::store::EphemerisStore;

pub const MIN_SV_COUNT:usize = 4;

// Position estimates closer than this to the earth's center [m] have no meaningful elevation angles yet
const NEAR_SURFACE_M:f64 = 1.0e6;

// Floor on elevation-based weights so a satellite on the horizon still contributes
const MIN_WEIGHT_SIN_EL:f64 = 0.1;

/// One channel's timing at a measurement sample
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Observation {
	pub prn:usize,
	/// Stream index of the measurement sample
	pub sample_idx:usize,
	/// SV time of week [sec] at which the signal arriving at the measurement sample left the satellite
	pub transmit_time:f64,
	pub doppler_hz:f64,
	pub cn0_db_hz:Option<f64>,
}

/// Per-satellite terms entering a fix
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SvMeasurement {
	pub prn:usize,
	pub transmit_time:f64,
	pub raw_pseudorange_m:f64,
	/// Raw pseudorange plus the SV clock correction
	pub pseudorange_m:f64,
	pub sv_pos_ecef:(f64, f64, f64),
	pub sv_vel_ecef:(f64, f64, f64),
	pub sv_clock_corr_s:f64,
	pub sv_clock_drift:f64,
	pub doppler_hz:f64,
	pub cn0_db_hz:Option<f64>,
	pub azimuth_deg:f64,
	pub elevation_deg:f64,
	pub tropo_m:f64,
	pub iono_m:f64,
	pub residual_m:f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum FixStatus {
	Solution,
	InsufficientSatellites,
	NotConverged,
	Singular,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Dop {
	pub gdop:f64,
	pub pdop:f64,
	pub hdop:f64,
	pub vdop:f64,
	pub tdop:f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NavigationSolution {
	pub sample_idx:usize,
	/// GPS time of week [sec] at the measurement sample after removing the estimated clock bias
	pub rx_time:f64,
	pub pos_ecef:(f64, f64, f64),
	pub latitude_deg:f64,
	pub longitude_deg:f64,
	pub height_m:f64,
	pub clock_bias_m:f64,
	pub vel_ecef:(f64, f64, f64),
	pub clock_drift_mps:f64,
	pub dop:Dop,
	pub iterations:usize,
	pub residual_norm:f64,
	pub sv:Vec<SvMeasurement>,
}

/// What the solver made of one epoch
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EpochOutcome {
	pub sample_idx:usize,
	pub rx_time:Option<f64>,
	pub status:FixStatus,
	pub sv_count:usize,
	pub solution:Option<NavigationSolution>,
}

pub struct LsFix {
	pub x:Vector4<f64>,
	pub dop:Dop,
	pub iterations:usize,
	pub residual_norm:f64,
}

fn to_tuple(v:&Vector3<f64>) -> (f64, f64, f64) { (v[0], v[1], v[2]) }
fn from_tuple(t:(f64, f64, f64)) -> Vector3<f64> { Vector3::new(t.0, t.1, t.2) }

/// Rotates an ECEF vector from the frame at transmit time into the frame at receive time
pub fn earth_rotation_correction(travel_time:f64, x:&Vector3<f64>) -> Vector3<f64> {
	let (s, c) = (OMEGA_E * travel_time).sin_cos();
	Matrix3::new( c,   s,   0.0,
	             -s,   c,   0.0,
	              0.0, 0.0, 1.0) * x
}

/// Pseudoranges [m] from transmit times and a receiver time, both in seconds of week
pub fn pseudoranges(obs:&[Observation], rx_time:f64) -> Vec<f64> {
	obs.iter().map(|ob| check_t(rx_time - ob.transmit_time) * C).collect()
}

fn dop(q:&DMatrix<f64>, pos:&Vector3<f64>) -> Dop {
	let geo = kinematics::ecef_to_wgs84(pos[0], pos[1], pos[2]);
	let r = kinematics::dcm_enu_from_ecef(geo.latitude, geo.longitude);
	let q_xyz = Matrix3::from_fn(|i, j| q[(i, j)]);
	let q_enu = r * q_xyz * r.transpose();

	Dop{
		gdop: (q_xyz.trace() + q[(3, 3)]).sqrt(),
		pdop: q_xyz.trace().sqrt(),
		hdop: (q_enu[(0, 0)] + q_enu[(1, 1)]).sqrt(),
		vdop: q_enu[(2, 2)].sqrt(),
		tdop: q[(3, 3)].sqrt(),
	}
}

/// Iterative least squares for position and clock bias [m] starting from x0.  Fills in the per-satellite
/// elevation, corrections and residuals along the way.
pub fn solve_position_and_time(meas:&mut [SvMeasurement], x0:Vector4<f64>, rx_time:f64, cfg:&NavigationConfig,
	iono:Option<&ionosphere::Model>) -> Result<LsFix, FixStatus> {

	let n = meas.len();
	if n < MIN_SV_COUNT { return Err(FixStatus::InsufficientSatellites); }

	let mut x = x0;
	for iter in 0..cfg.max_iterations {
		let pos = Vector3::new(x[0], x[1], x[2]);
		let near_surface = pos.norm() > NEAR_SURFACE_M;
		let geo = kinematics::ecef_to_wgs84(pos[0], pos[1], pos[2]);

		let mut h = DMatrix::from_element(n, 4, 0.0);
		let mut v = DVector::from_element(n, 0.0);
		let mut w = DVector::from_element(n, 1.0);

		for (i, m) in meas.iter_mut().enumerate() {
			let sv = from_tuple(m.sv_pos_ecef);
			let rot = earth_rotation_correction((sv - pos).norm() / C, &sv);
			let los = rot - pos;
			let r = los.norm();

			if near_surface {
				let azel = kinematics::topocentric(&pos, &rot);
				m.azimuth_deg = azel.azimuth.to_degrees();
				m.elevation_deg = azel.elevation.to_degrees();
				m.tropo_m = if cfg.use_tropo_corr { troposphere::delay(azel.elevation, geo.height_above_ellipsoid) } else { 0.0 };
				m.iono_m = match (cfg.use_iono_corr, iono) {
					(true, Some(model)) => model.delay(&geo, &azel, rx_time) * C,
					_ => 0.0,
				};
				if cfg.weighted { w[i] = azel.elevation.sin().max(MIN_WEIGHT_SIN_EL).powi(2); }
			} else {
				m.tropo_m = 0.0;
				m.iono_m = 0.0;
			}

			v[i] = m.pseudorange_m - r - x[3] - m.tropo_m - m.iono_m;
			for j in 0..3 { h[(i, j)] = -los[j] / r; }
			h[(i, 3)] = 1.0;
		}

		if h.rank(1.0e-9) < 4 { return Err(FixStatus::Singular); }

		let hw = DMatrix::from_fn(n, 4, |i, j| w[i] * h[(i, j)]);
		let q = hw.tr_mul(&h).try_inverse().ok_or(FixStatus::Singular)?;
		let dx = &q * hw.tr_mul(&v);
		x += Vector4::new(dx[0], dx[1], dx[2], dx[3]);

		if !x.iter().all(|a| a.is_finite()) { return Err(FixStatus::Singular); }

		if dx.norm() < cfg.convergence_m {
			let post = &v - &h * &dx;
			for (m, res) in meas.iter_mut().zip(post.iter()) { m.residual_m = *res; }

			let q_geom = h.tr_mul(&h).try_inverse().ok_or(FixStatus::Singular)?;
			let pos = Vector3::new(x[0], x[1], x[2]);
			return Ok(LsFix{ x, dop: dop(&q_geom, &pos), iterations: iter + 1, residual_norm: post.norm() });
		}
	}

	Err(FixStatus::NotConverged)
}

/// Receiver velocity [m/s] and clock drift [m/s] from the Doppler of each satellite at a known position
pub fn solve_velocity(meas:&[SvMeasurement], pos:&Vector3<f64>) -> Option<(Vector3<f64>, f64)> {
	let n = meas.len();
	if n < MIN_SV_COUNT { return None; }

	let wavelength = C / L1_FREQ_HZ;
	let mut h = DMatrix::from_element(n, 4, 0.0);
	let mut y = DVector::from_element(n, 0.0);

	for (i, m) in meas.iter().enumerate() {
		let sv = from_tuple(m.sv_pos_ecef);
		let tau = (sv - pos).norm() / C;
		let rot = earth_rotation_correction(tau, &sv);
		let vel = earth_rotation_correction(tau, &from_tuple(m.sv_vel_ecef));
		let u = (rot - pos).normalize();

		let range_rate = -m.doppler_hz * wavelength;
		y[i] = range_rate + C * m.sv_clock_drift - u.dot(&vel);
		for j in 0..3 { h[(i, j)] = -u[j]; }
		h[(i, 3)] = 1.0;
	}

	let q = h.tr_mul(&h).try_inverse()?;
	let x = q * h.tr_mul(&y);
	Some((Vector3::new(x[0], x[1], x[2]), x[3]))
}

/// Turns channel observations into fixes, one epoch at a time.  Keeps the receiver clock, which is seeded from
/// the first usable epoch and steered by every fix, and the last position as the next initial guess.
pub struct Solver {
	cfg:NavigationConfig,
	fs:f64,
	clock:Option<(usize, f64)>,
	x:Vector4<f64>,
	elevations:HashMap<usize, f64>,
}

impl Solver {

	pub fn new(cfg:&ReceiverConfig) -> Self {
		Self{ cfg: cfg.navigation.clone(), fs: cfg.sample_rate_hz, clock: None, x: Vector4::zeros(), elevations: HashMap::new() }
	}

	/// Receiver time of week [sec] at a sample, once the clock has been seeded
	pub fn rx_time_at(&self, sample_idx:usize) -> Option<f64> {
		self.clock.map(|(s0, t0)| t0 + (sample_idx as f64 - s0 as f64) / self.fs)
	}

	pub fn solve_epoch(&mut self, sample_idx:usize, obs:&[Observation], store:&EphemerisStore) -> EpochOutcome {
		let mask = self.cfg.elevation_mask_deg;
		let usable:Vec<(Observation, ephemeris::Ephemeris)> = obs.iter()
			.filter(|ob| self.elevations.get(&ob.prn).map_or(true, |el| *el >= mask))
			.filter_map(|ob| store.valid_at(ob.prn, ob.transmit_time).map(|eph| (*ob, eph)))
			.collect();

		if usable.len() < MIN_SV_COUNT {
			info!("Epoch at sample {}: {} usable satellites, no fix", sample_idx, usable.len());
			return EpochOutcome{ sample_idx, rx_time: self.rx_time_at(sample_idx), status: FixStatus::InsufficientSatellites,
				sv_count: usable.len(), solution: None };
		}

		let rx_time = match self.rx_time_at(sample_idx) {
			Some(t) => t,
			None => {
				let latest = usable.iter().map(|(ob, _)| ob.transmit_time).fold(f64::MIN, f64::max);
				latest + self.cfg.start_offset_ms / 1000.0
			}
		};

		let obs_only:Vec<Observation> = usable.iter().map(|(ob, _)| *ob).collect();
		let raw = pseudoranges(&obs_only, rx_time);

		let mut meas:Vec<SvMeasurement> = usable.iter().zip(raw.iter()).map(|((ob, eph), raw_pr)| {
			let st = eph.state(ob.transmit_time);
			SvMeasurement{
				prn: ob.prn, transmit_time: ob.transmit_time, raw_pseudorange_m: *raw_pr,
				pseudorange_m: raw_pr + st.clock_corr * C,
				sv_pos_ecef: to_tuple(&st.pos), sv_vel_ecef: to_tuple(&st.vel),
				sv_clock_corr_s: st.clock_corr, sv_clock_drift: st.clock_drift,
				doppler_hz: ob.doppler_hz, cn0_db_hz: ob.cn0_db_hz,
				azimuth_deg: 0.0, elevation_deg: 0.0, tropo_m: 0.0, iono_m: 0.0, residual_m: 0.0,
			}
		}).collect();

		let iono = store.ionosphere();
		match solve_position_and_time(&mut meas, self.x, rx_time, &self.cfg, iono.as_ref()) {
			Ok(fix) => {
				let pos = Vector3::new(fix.x[0], fix.x[1], fix.x[2]);
				let clock_bias_m = fix.x[3];
				let geo = kinematics::ecef_to_wgs84(pos[0], pos[1], pos[2]);
				let (vel, clock_drift_mps) = solve_velocity(&meas, &pos).unwrap_or((Vector3::zeros(), 0.0));

				// Steer the receiver clock by the estimated bias
				let corrected = rx_time - clock_bias_m / C;
				self.clock = Some((sample_idx, corrected));
				self.x = Vector4::new(pos[0], pos[1], pos[2], 0.0);
				self.elevations = meas.iter().map(|m| (m.prn, m.elevation_deg)).collect();

				info!("Fix at sample {}: lat {:.6} lon {:.6} h {:.1} [m], {} SVs, PDOP {:.2}", sample_idx,
					geo.latitude.to_degrees(), geo.longitude.to_degrees(), geo.height_above_ellipsoid, meas.len(), fix.dop.pdop);
				debug!("Clock bias {:.3} [m] after {} iterations", clock_bias_m, fix.iterations);

				let sv_count = meas.len();
				let solution = NavigationSolution{
					sample_idx, rx_time: corrected, pos_ecef: to_tuple(&pos),
					latitude_deg: geo.latitude.to_degrees(), longitude_deg: geo.longitude.to_degrees(),
					height_m: geo.height_above_ellipsoid, clock_bias_m,
					vel_ecef: to_tuple(&vel), clock_drift_mps,
					dop: fix.dop, iterations: fix.iterations, residual_norm: fix.residual_norm, sv: meas,
				};
				EpochOutcome{ sample_idx, rx_time: Some(corrected), status: FixStatus::Solution, sv_count, solution: Some(solution) }
			},
			Err(status) => {
				warn!("Fix at sample {} failed: {:?}", sample_idx, status);
				self.clock = Some((sample_idx, rx_time));
				self.x = Vector4::zeros();
				EpochOutcome{ sample_idx, rx_time: Some(rx_time), status, sv_count: meas.len(), solution: None }
			},
		}
	}

}
