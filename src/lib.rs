use num_complex::Complex;

pub mod block;
pub mod config;

pub mod filters;
pub mod io;
pub mod gnss;

pub mod utils;

#[derive(Debug, Clone, Copy)]
pub struct Sample {
	pub val: Complex<f64>,
	pub idx: usize,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DigSigProcErr {
	#[error("loss of lock")]
	LossOfLock,
	#[error("invalid telemetry data: {0}")]
	InvalidTelemetryData(&'static str),
	#[error("parity failure in word {word}")]
	ParityFailure{ word: usize },
	#[error("sample source unreadable: {0}")]
	SourceUnreadable(String),
	#[error("unsupported sample format: {0}")]
	UnsupportedFormat(String),
	#[error("invalid configuration: {0}")]
	InvalidConfig(String),
	#[error("PRN {0} is outside 1 through 32")]
	InvalidPrn(usize),
	#[error("{0}")]
	Other(&'static str),
}
