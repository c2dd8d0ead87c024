
pub trait ScalarFilter {

	fn apply(&mut self, x:f64) -> f64;
	fn initialize(&mut self);

}

/// Time constants (tau1, tau2) of a second-order loop with the given noise bandwidth [Hz], damping ratio and loop gain
pub fn loop_coefficients(noise_bandwidth_hz:f64, damping:f64, gain:f64) -> (f64, f64) {
	let wn:f64 = (noise_bandwidth_hz * 8.0 * damping) / (4.0 * damping.powi(2) + 1.0);
	let tau1:f64 = gain / wn.powi(2);
	let tau2:f64 = (2.0 * damping) / wn;
	(tau1, tau2)
}

/// Proportional-integral loop filter producing an NCO correction from a discriminator output.  The output
/// accumulates, so it's the total correction since the last call to initialize.
pub struct ProportionalIntegral { pub tau1: f64, pub tau2: f64, pub pdi: f64,
								  nco: f64, last_err: f64 }

impl ProportionalIntegral {

	pub fn new(tau1:f64, tau2:f64, pdi:f64) -> Self { Self{ tau1, tau2, pdi, nco: 0.0, last_err: 0.0 } }

	pub fn from_bandwidth(noise_bandwidth_hz:f64, damping:f64, gain:f64, pdi:f64) -> Self {
		let (tau1, tau2) = loop_coefficients(noise_bandwidth_hz, damping, gain);
		Self::new(tau1, tau2, pdi)
	}

	pub fn output(&self) -> f64 { self.nco }

}

impl ScalarFilter for ProportionalIntegral {

	fn apply(&mut self, err:f64) -> f64 {
		self.nco += (self.tau2 / self.tau1) * (err - self.last_err) + err * (self.pdi / self.tau1);
		self.last_err = err;
		self.nco
	}

	fn initialize(&mut self) {
		self.nco = 0.0;
		self.last_err = 0.0;
	}

}

/// First-order frequency-lock integrator used to assist the carrier loop during pull-in.  Input is a frequency
/// error [Hz], output is the accumulated frequency correction [Hz].
pub struct FrequencyLockAssist { pub gain: f64, acc: f64 }

impl FrequencyLockAssist {

	pub fn new(noise_bandwidth_hz:f64, pdi:f64) -> Self { Self{ gain: 4.0 * noise_bandwidth_hz * pdi, acc: 0.0 } }

	pub fn output(&self) -> f64 { self.acc }

}

impl ScalarFilter for FrequencyLockAssist {

	fn apply(&mut self, freq_err_hz:f64) -> f64 {
		self.acc += self.gain * freq_err_hz;
		self.acc
	}

	fn initialize(&mut self) { self.acc = 0.0; }

}
