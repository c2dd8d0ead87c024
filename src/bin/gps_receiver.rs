use std::fs::File;
use std::io::{BufWriter, Write};
use std::sync::Arc;

use clap::{Arg, App, ArgMatches};
use colored::*;
use log::warn;

use gps_l1_sdr::DigSigProcErr;
use gps_l1_sdr::config::ReceiverConfig;
use gps_l1_sdr::io::FileSource;
use gps_l1_sdr::gnss::common::acquisition::AcquisitionResult;
use gps_l1_sdr::gnss::common::tracking::ChannelSnapshot;
use gps_l1_sdr::gnss::gps_l1_ca::channel::ChannelEvent;
use gps_l1_sdr::gnss::gps_l1_ca::pvt::{EpochOutcome, NavigationSolution};
use gps_l1_sdr::gnss::gps_l1_ca::receiver::{self, ReceiverOutput};
use gps_l1_sdr::gnss::gps_l1_ca::telemetry_decode::subframe::Subframe;

/// Console summaries on stderr, snapshots to an optional JSON-lines file, fixes kept for the end of the run
struct ConsoleOutput {
	snapshots:Option<BufWriter<File>>,
	solutions:Vec<NavigationSolution>,
}

impl ReceiverOutput for ConsoleOutput {

	fn on_acquisition(&mut self, acq:&AcquisitionResult) {
		if acq.detected {
			eprintln!("{}", format!("PRN {:02}: acquired at {:.1} [Hz] doppler, code phase {} [samples], metric {:.2}",
				acq.prn, acq.doppler_hz, acq.code_phase, acq.peak_metric).green());
		}
	}

	fn on_snapshot(&mut self, snapshot:&ChannelSnapshot) {
		let failed = match self.snapshots.as_mut() {
			Some(w) => serde_json::to_writer(&mut *w, snapshot).map_err(|e| e.to_string())
				.and_then(|_| writeln!(w).map_err(|e| e.to_string())).err(),
			None => None,
		};
		if let Some(e) = failed {
			warn!("Snapshot output disabled after write failure: {}", e);
			self.snapshots = None;
		}
	}

	fn on_subframe(&mut self, prn:usize, sf:&Subframe) {
		eprintln!("{}", format!("PRN {:02}: subframe {} TOW {} [sec]", prn, sf.subframe_id, sf.time_of_week()).cyan());
	}

	fn on_event(&mut self, prn:usize, event:&ChannelEvent) {
		match event {
			ChannelEvent::Terminated | ChannelEvent::Fault(_) | ChannelEvent::LockLost{ .. } =>
				eprintln!("{}", format!("PRN {:02}: {:?}", prn, event).red()),
			_ => eprintln!("PRN {:02}: {:?}", prn, event),
		}
	}

	fn on_epoch(&mut self, outcome:&EpochOutcome) {
		match &outcome.solution {
			Some(soln) => {
				eprintln!("{}", format!("Position Fix: {:.5} [deg] lat, {:.5} [deg] lon, {:.1} [m], {} SVs, PDOP {:.2}",
					soln.latitude_deg, soln.longitude_deg, soln.height_m, outcome.sv_count, soln.dop.pdop).green().bold());
				self.solutions.push(soln.clone());
			},
			None => eprintln!("Epoch at sample {}: {:?} ({} SVs)", outcome.sample_idx, outcome.status, outcome.sv_count),
		}
	}

}

fn config_from(matches:&ArgMatches) -> Result<ReceiverConfig, DigSigProcErr> {
	let mut cfg = match matches.value_of("config") {
		Some(path) => ReceiverConfig::from_json_file(path)?,
		None => ReceiverConfig::default(),
	};

	let number = |name:&str| -> Result<Option<f64>, DigSigProcErr> {
		matches.value_of(name).map(|s| s.parse::<f64>()
			.map_err(|_| DigSigProcErr::InvalidConfig(format!("{} is not a number: {}", name, s)))).transpose()
	};

	if let Some(fs) = number("sample_rate_sps")? { cfg.sample_rate_hz = fs; }
	if let Some(f_if) = number("if_hz")? { cfg.intermediate_freq_hz = f_if; }
	if let Some(ms) = number("ms")? { cfg.ms_to_process = ms as usize; }
	if let Some(fmt) = matches.value_of("input_type") { cfg.sample_format = fmt.parse()?; }
	if let Some(layout) = matches.value_of("layout") { cfg.sample_layout = layout.parse()?; }

	cfg.validate()?;
	Ok(cfg)
}

async fn run_app(matches:ArgMatches<'_>) -> Result<(), DigSigProcErr> {
	let cfg = Arc::new(config_from(&matches)?);
	let fname = matches.value_of("filename").ok_or_else(|| DigSigProcErr::InvalidConfig("no input file".into()))?;

	eprintln!("Decoding {} at {} [samples/sec], IF {} [Hz]", fname, cfg.sample_rate_hz, cfg.intermediate_freq_hz);
	let mut src = FileSource::open(fname, cfg.sample_rate_hz, cfg.sample_format, cfg.sample_layout, cfg.skip_bytes)?;

	let snapshots = match matches.value_of("snapshots") {
		Some(path) => Some(BufWriter::new(File::create(path).map_err(|e| DigSigProcErr::SourceUnreadable(format!("{}: {}", path, e)))?)),
		None => None,
	};
	let mut out = ConsoleOutput{ snapshots, solutions: vec![] };

	let summary = receiver::run(&mut src, cfg, &mut out).await?;
	eprintln!("{} fixes from {} epochs over {} samples; tracked PRNs {:?}", summary.fixes, summary.epochs, summary.samples, summary.acquired);

	if let Some(mut w) = out.snapshots.take() {
		if let Err(e) = w.flush() { warn!("Unable to flush snapshot output: {}", e); }
	}

	let json = serde_json::to_string_pretty(&out.solutions).map_err(|_| DigSigProcErr::Other("unable to serialize solutions"))?;
	println!("{}", json);
	Ok(())
}

#[tokio::main]
async fn main() {
	env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

	let matches = App::new("GPS L1 C/A Receiver")
		.version("0.1.0")
		.about("Takes IQ samples centered on 1575.42 MHz and produces GPS fixes")
		.arg(Arg::with_name("filename")
			.short("f").long("filename")
			.help("Input filename")
			.required(true).takes_value(true))
		.arg(Arg::with_name("input_type")
			.short("t").long("type")
			.takes_value(true)
			.possible_values(&["i8", "i16"]))
		.arg(Arg::with_name("layout")
			.long("layout")
			.takes_value(true)
			.possible_values(&["real", "iq"]))
		.arg(Arg::with_name("sample_rate_sps")
			.short("s").long("sample_rate_sps")
			.takes_value(true))
		.arg(Arg::with_name("if_hz")
			.long("if")
			.help("Intermediate frequency [Hz]")
			.takes_value(true))
		.arg(Arg::with_name("ms")
			.long("ms")
			.help("Milliseconds of data to process")
			.takes_value(true))
		.arg(Arg::with_name("config")
			.short("c").long("config")
			.help("JSON receiver configuration; command line values take precedence")
			.takes_value(true))
		.arg(Arg::with_name("snapshots")
			.long("snapshots")
			.help("Write per-millisecond channel snapshots to this file as JSON lines")
			.takes_value(true))
		.get_matches();

	if let Err(e) = run_app(matches).await {
		eprintln!("{}", format!("Fatal: {}", e).red().bold());
		std::process::exit(1);
	}
}
