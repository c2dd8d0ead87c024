use std::collections::BTreeMap;
use std::sync::Arc;

use log::{error, info, warn};
use serde::{Serialize, Deserialize};

use crate::DigSigProcErr;
use crate::block::Block;
use crate::config::ReceiverConfig;
use crate::io::SampleSource;
use crate::gnss::common::acquisition::{self, AcquisitionResult};
use crate::gnss::common::tracking::ChannelSnapshot;
use crate::gnss::gps_l1_ca::channel::{self, BlockReport, ChannelEvent, ChannelInput};
use crate::gnss::gps_l1_ca::pvt::{EpochOutcome, FixStatus, Observation, Solver};
use crate::gnss::gps_l1_ca::pvt::store::EphemerisStore;
use crate::gnss::gps_l1_ca::telemetry_decode::subframe::Subframe;

/// Where the receiver sends what it produces.  Every method has an empty default so a consumer only implements
/// what it cares about.
pub trait ReceiverOutput {
	fn on_acquisition(&mut self, _acq:&AcquisitionResult) {}
	fn on_snapshot(&mut self, _snapshot:&ChannelSnapshot) {}
	fn on_subframe(&mut self, _prn:usize, _sf:&Subframe) {}
	fn on_event(&mut self, _prn:usize, _event:&ChannelEvent) {}
	fn on_epoch(&mut self, _outcome:&EpochOutcome) {}
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunSummary {
	pub samples:usize,
	pub blocks:usize,
	/// PRNs given a channel, strongest first
	pub acquired:Vec<usize>,
	pub epochs:usize,
	pub fixes:usize,
}

/// The strongest detections, at most `count` of them
pub fn select_channels(results:&[AcquisitionResult], count:usize) -> Vec<AcquisitionResult> {
	let mut detected:Vec<AcquisitionResult> = results.iter().filter(|r| r.detected).cloned().collect();
	detected.sort_by(|a, b| b.peak_metric.partial_cmp(&a.peak_metric).unwrap_or(std::cmp::Ordering::Equal));
	detected.truncate(count);
	detected
}

/// Navigation epochs (whole multiples of `period` samples, excluding sample zero) in [start, end)
pub fn epochs_in(start:usize, end:usize, period:usize) -> Vec<usize> {
	if period == 0 { return vec![]; }
	let first = ((start + period - 1) / period).max(1) * period;
	(first..end).step_by(period).collect()
}

fn dispatch<O: ReceiverOutput>(report:BlockReport, out:&mut O, observations:&mut BTreeMap<usize, Vec<Observation>>) {
	let prn = report.prn;
	for snapshot in report.snapshots.iter() { out.on_snapshot(snapshot); }
	for sf in report.subframes.iter() { out.on_subframe(prn, sf); }
	for event in report.events.iter() { out.on_event(prn, event); }
	for obs in report.observations {
		if let Some(epoch) = observations.get_mut(&obs.sample_idx) { epoch.push(obs); }
	}
}

async fn retire(prn:usize, blk:Block<ChannelInput, BlockReport>) {
	if let Err(e) = blk.shutdown().await { error!("PRN {:02}: channel ended with {}", prn, e); }
}

/// Runs the whole receiver over a sample source: acquisition on the first block, then one tracking channel per
/// selected satellite, then one solver epoch per navigation period.  Running out of samples ends the run normally;
/// only configuration and source faults come back as errors.
pub async fn run<S: SampleSource, O: ReceiverOutput>(src:&mut S, cfg:Arc<ReceiverConfig>, out:&mut O) -> Result<RunSummary, DigSigProcErr> {
	cfg.validate()?;

	let limit:usize = (cfg.samples_per_ms() * cfg.ms_to_process as f64).round() as usize;
	let block_len:usize = ((cfg.samples_per_ms() * cfg.block_ms as f64).round() as usize).max(1);
	let period:usize = cfg.epoch_samples();
	let store = Arc::new(EphemerisStore::new());
	let mut summary = RunSummary::default();

	let first = match src.fetch(block_len.max(cfg.acquisition_samples()).min(limit))? {
		Some(b) => Arc::new(b),
		None => {
			warn!("Sample source is empty");
			return Ok(summary);
		}
	};

	let results = acquisition::acquire_all(first.clone(), cfg.clone()).await?;
	for r in results.iter() { out.on_acquisition(r); }
	let chosen = select_channels(&results, cfg.channel_count);
	summary.acquired = chosen.iter().map(|a| a.prn).collect();
	info!("{} of {} PRNs acquired, tracking {:?}", results.iter().filter(|r| r.detected).count(), results.len(), summary.acquired);

	let mut channels:Vec<(usize, Block<ChannelInput, BlockReport>)> = Vec::with_capacity(chosen.len());
	for acq in chosen.iter() {
		let ch = channel::new_default_channel(acq, first.start_idx, &cfg, store.clone())?;
		channels.push((acq.prn, Block::from(ch)));
	}

	let mut solver = Solver::new(&cfg);
	let mut next = Some(first);

	while let Some(block) = next.take() {
		summary.samples += block.len();
		summary.blocks += 1;

		let epochs = epochs_in(block.start_idx, block.end_idx(), period);
		let mut observations:BTreeMap<usize, Vec<Observation>> = epochs.iter().map(|e| (*e, vec![])).collect();

		// Hand the block to every channel before waiting on any of them so they run side by side
		let mut stopped:Vec<bool> = vec![false; channels.len()];
		for (k, (prn, ch)) in channels.iter().enumerate() {
			if ch.send(ChannelInput{ block: block.clone(), epochs: epochs.clone() }).await.is_err() {
				warn!("PRN {:02}: channel stopped taking samples", prn);
				stopped[k] = true;
			}
		}

		for (k, (prn, ch)) in channels.iter_mut().enumerate() {
			if stopped[k] { continue; }
			match ch.recv().await {
				Some(report) => {
					stopped[k] = report.terminated;
					dispatch(report, out, &mut observations);
				},
				None => {
					warn!("PRN {:02}: channel stopped without a report", prn);
					stopped[k] = true;
				},
			}
		}

		for (epoch, obs) in observations {
			let outcome = solver.solve_epoch(epoch, &obs, &store);
			summary.epochs += 1;
			if outcome.status == FixStatus::Solution { summary.fixes += 1; }
			out.on_epoch(&outcome);
		}

		for k in (0..channels.len()).rev() {
			if stopped[k] {
				let (prn, blk) = channels.remove(k);
				info!("PRN {:02}: channel released", prn);
				retire(prn, blk).await;
			}
		}

		let remaining = limit.saturating_sub(summary.samples);
		if remaining > 0 {
			next = src.fetch(block_len.min(remaining))?.map(Arc::new);
		}
	}

	for (prn, blk) in channels { retire(prn, blk).await; }

	info!("Processed {} samples in {} blocks, {} fixes in {} epochs", summary.samples, summary.blocks, summary.fixes, summary.epochs);
	Ok(summary)
}
