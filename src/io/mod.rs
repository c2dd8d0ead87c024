use std::fs::File;
use std::io::{self as stdio, BufReader, Read, Seek, SeekFrom};
use std::path::Path;
use std::str::FromStr;

use byteorder::{LittleEndian, ReadBytesExt};
use num_complex::Complex;
use serde::{Serialize, Deserialize};

use crate::{DigSigProcErr, Sample};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SampleFormat {
	I8,
	I16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SampleLayout {
	Real,
	Iq,
}

impl SampleFormat {
	pub fn bytes_per_value(&self) -> usize { match self {
		SampleFormat::I8  => 1,
		SampleFormat::I16 => 2,
	}}
}

impl SampleLayout {
	pub fn values_per_sample(&self) -> usize { match self {
		SampleLayout::Real => 1,
		SampleLayout::Iq   => 2,
	}}
}

impl FromStr for SampleFormat {
	type Err = DigSigProcErr;

	fn from_str(s:&str) -> Result<Self, DigSigProcErr> {
		match s.trim().to_lowercase().as_str() {
			"i8" | "schar" | "int8" => Ok(SampleFormat::I8),
			"i16" | "short" | "int16" => Ok(SampleFormat::I16),
			other => Err(DigSigProcErr::UnsupportedFormat(other.to_string())),
		}
	}
}

impl FromStr for SampleLayout {
	type Err = DigSigProcErr;

	fn from_str(s:&str) -> Result<Self, DigSigProcErr> {
		match s.trim().to_lowercase().as_str() {
			"real" | "1" => Ok(SampleLayout::Real),
			"iq" | "complex" | "2" => Ok(SampleLayout::Iq),
			other => Err(DigSigProcErr::UnsupportedFormat(other.to_string())),
		}
	}
}

/// An immutable run of consecutive samples.  `start_idx` is the index of the first sample counted from the
/// beginning of the stream, so the time of sample k is (start_idx + k) / fs.
#[derive(Debug, Clone)]
pub struct SampleBlock {
	pub start_idx: usize,
	pub fs: f64,
	pub format: SampleFormat,
	pub layout: SampleLayout,
	pub samples: Vec<Complex<f64>>,
}

impl SampleBlock {

	pub fn len(&self) -> usize { self.samples.len() }
	pub fn is_empty(&self) -> bool { self.samples.is_empty() }
	pub fn end_idx(&self) -> usize { self.start_idx + self.samples.len() }
	pub fn start_time(&self) -> f64 { self.start_idx as f64 / self.fs }

	pub fn iter(&self) -> impl Iterator<Item=Sample> + '_ {
		let start_idx = self.start_idx;
		self.samples.iter().enumerate().map(move |(k, val)| Sample{ val: *val, idx: start_idx + k })
	}

}

/// Request-count based block source.  `Ok(None)` means the stream is exhausted, which is not a fault.  A request
/// for zero samples also yields `Ok(None)` and leaves the source where it was.
pub trait SampleSource {
	fn fetch(&mut self, n:usize) -> Result<Option<SampleBlock>, DigSigProcErr>;
}

pub struct FileSource<R: Read> {
	src: R,
	fs: f64,
	format: SampleFormat,
	layout: SampleLayout,
	next_idx: usize,
}

impl FileSource<BufReader<File>> {

	pub fn open<P: AsRef<Path>>(path:P, fs:f64, format:SampleFormat, layout:SampleLayout, skip_bytes:u64) -> Result<Self, DigSigProcErr> {
		let unreadable = |e:stdio::Error| DigSigProcErr::SourceUnreadable(format!("{}: {}", path.as_ref().display(), e));
		let mut f = File::open(path.as_ref()).map_err(unreadable)?;
		f.seek(SeekFrom::Start(skip_bytes)).map_err(unreadable)?;
		Ok(Self::new(BufReader::new(f), fs, format, layout))
	}

}

impl<R: Read> FileSource<R> {

	pub fn new(src:R, fs:f64, format:SampleFormat, layout:SampleLayout) -> Self {
		Self{ src, fs, format, layout, next_idx: 0 }
	}

	fn read_value(&mut self) -> stdio::Result<f64> {
		match self.format {
			SampleFormat::I8  => self.src.read_i8().map(|x| x as f64),
			SampleFormat::I16 => self.src.read_i16::<LittleEndian>().map(|x| x as f64),
		}
	}

	fn read_sample(&mut self) -> Result<Option<Complex<f64>>, DigSigProcErr> {
		let re = match self.read_value() {
			Ok(x) => x,
			Err(ref e) if e.kind() == stdio::ErrorKind::UnexpectedEof => return Ok(None),
			Err(e) => return Err(DigSigProcErr::SourceUnreadable(e.to_string())),
		};
		let im = match self.layout {
			SampleLayout::Real => 0.0,
			SampleLayout::Iq => match self.read_value() {
				Ok(x) => x,
				// A dangling in-phase value without its quadrature partner ends the stream
				Err(ref e) if e.kind() == stdio::ErrorKind::UnexpectedEof => return Ok(None),
				Err(e) => return Err(DigSigProcErr::SourceUnreadable(e.to_string())),
			}
		};
		Ok(Some(Complex{ re, im }))
	}

}

impl<R: Read> SampleSource for FileSource<R> {

	fn fetch(&mut self, n:usize) -> Result<Option<SampleBlock>, DigSigProcErr> {
		let mut samples:Vec<Complex<f64>> = Vec::with_capacity(n);
		while samples.len() < n {
			match self.read_sample()? {
				Some(c) => samples.push(c),
				None    => break,
			}
		}

		if samples.is_empty() { return Ok(None); }

		let block = SampleBlock{ start_idx: self.next_idx, fs: self.fs, format: self.format, layout: self.layout, samples };
		self.next_idx = block.end_idx();
		Ok(Some(block))
	}

}

/// Serves samples already held in memory, mostly for tests and synthetic runs
pub struct MemorySource {
	samples: Vec<Complex<f64>>,
	fs: f64,
	next_idx: usize,
}

impl MemorySource {
	pub fn new(samples:Vec<Complex<f64>>, fs:f64) -> Self { Self{ samples, fs, next_idx: 0 } }
}

impl SampleSource for MemorySource {

	fn fetch(&mut self, n:usize) -> Result<Option<SampleBlock>, DigSigProcErr> {
		if n == 0 || self.next_idx >= self.samples.len() { return Ok(None); }
		let end = (self.next_idx + n).min(self.samples.len());
		let block = SampleBlock{ start_idx: self.next_idx, fs: self.fs, format: SampleFormat::I16, layout: SampleLayout::Iq,
			samples: self.samples[self.next_idx..end].to_vec() };
		self.next_idx = end;
		Ok(Some(block))
	}

}
