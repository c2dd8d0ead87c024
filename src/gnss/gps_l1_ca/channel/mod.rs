use std::sync::Arc;

use log::{debug, info, warn};

use crate::{DigSigProcErr, Sample};
use crate::block::{BlockFunctionality, BlockResult};
use crate::config::ReceiverConfig;
use crate::io::SampleBlock;
use crate::gnss::common::acquisition::{Acquisition, AcquisitionResult, two_stage_pcps};
use crate::gnss::common::tracking::ChannelSnapshot;
use crate::gnss::gps_l1_ca::pvt::{Observation, ephemeris::Ephemeris, ionosphere, store::{EphemerisStore, UpdateOutcome}};
use crate::gnss::gps_l1_ca::telemetry_decode::{DecoderEvent, TelemetryDecoder};
use crate::gnss::gps_l1_ca::telemetry_decode::subframe::{subframe1, subframe2, subframe3, Subframe, SubframeBody as SFB};
use crate::gnss::gps_l1_ca::tracking::{self, Tracking, TrackingResult, TrackingState};

pub type DefaultChannel = Channel<two_stage_pcps::Acquisition>;

/// Things worth telling the outside world about a channel, none of which stop the receiver
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelEvent {
	LockLost{ sample_idx:usize },
	Reacquired{ doppler_hz:f64, sample_idx:usize },
	Terminated,
	BitSync{ offset_ms:usize },
	FrameAligned{ inverted:bool },
	SubframeRejected{ err:DigSigProcErr, first_ms:usize },
	AlignmentLost,
	EphemerisUpdated{ iode:u8, outcome:UpdateOutcome },
	IonosphereUpdated,
	Fault(DigSigProcErr),
}

/// One block of samples along with the sample indices inside it where the receiver wants observations
#[derive(Debug, Clone)]
pub struct ChannelInput {
	pub block:Arc<SampleBlock>,
	pub epochs:Vec<usize>,
}

/// Everything one channel produced while working through one block
#[derive(Debug, Default)]
pub struct BlockReport {
	pub prn:usize,
	pub snapshots:Vec<ChannelSnapshot>,
	pub subframes:Vec<Subframe>,
	pub events:Vec<ChannelEvent>,
	pub observations:Vec<Observation>,
	pub terminated:bool,
}

/// Tracking and navigation message decoding for one satellite.  Ephemeris and ionosphere parameters go into the
/// shared store as soon as they are complete.
pub struct Channel<A: Acquisition> {
	pub prn:usize,
	trk:Tracking<A>,
	tlm:TelemetryDecoder,
	store:Arc<EphemerisStore>,
	last_sf1:Option<subframe1::Body>,
	last_sf2:Option<subframe2::Body>,
	last_sf3:Option<subframe3::Body>,
}

impl<A: Acquisition> Channel<A> {

	/// Starts tracking from an acquisition at the first code boundary at or after `not_before`
	pub fn with_tracker(mut trk:Tracking<A>, acq:&AcquisitionResult, not_before:usize, cfg:&ReceiverConfig, store:Arc<EphemerisStore>) -> Self {
		trk.initialize(acq, not_before);
		Self{ prn: trk.prn, trk, tlm: TelemetryDecoder::new(cfg.tracking.bit_sync_ms), store,
			last_sf1: None, last_sf2: None, last_sf3: None }
	}

	pub fn state(&self) -> TrackingState { self.trk.state() }
	pub fn is_terminated(&self) -> bool { self.trk.state() == TrackingState::Terminated }

	/// Timing for the sample about to be processed, if the channel is locked and knows the time of week
	pub fn observation(&self, sample_idx:usize) -> Option<Observation> {
		if !self.trk.is_locked() || sample_idx < self.trk.start_idx() { return None; }
		self.tlm.transmit_time(self.trk.ms_count(), self.trk.code_phase_chips()).map(|transmit_time| Observation{
			prn: self.prn, sample_idx, transmit_time, doppler_hz: self.trk.doppler_hz(), cn0_db_hz: self.trk.cn0_db_hz() })
	}

	/// Runs a block through the channel.  An observation is taken at each sample index listed in `epochs`.
	pub fn process_block(&mut self, block:&SampleBlock, epochs:&[usize]) -> BlockReport {
		let mut report = BlockReport{ prn: self.prn, ..Default::default() };
		let mut pending_epochs = epochs.iter().peekable();

		for sample in block.iter() {
			while let Some(epoch) = pending_epochs.peek() {
				if **epoch > sample.idx { break; }
				if **epoch == sample.idx {
					if let Some(obs) = self.observation(sample.idx) { report.observations.push(obs); }
				}
				pending_epochs.next();
			}

			if self.is_terminated() { break; }
			self.apply_sample(&sample, &mut report);
		}

		report.terminated = self.is_terminated();
		report
	}

	pub fn apply_sample(&mut self, sample:&Sample, report:&mut BlockReport) {
		match self.trk.apply(sample) {
			TrackingResult::NotReady => {},
			TrackingResult::Ok(snapshot) => {
				for ev in self.tlm.apply(snapshot.i_p, snapshot.ms_count - 1) { self.on_decoder_event(ev, report); }
				report.snapshots.push(snapshot);
			},
			TrackingResult::LostLock(snapshot) => {
				report.events.push(ChannelEvent::LockLost{ sample_idx: snapshot.sample_idx });
				report.snapshots.push(snapshot);
				if self.is_terminated() { report.events.push(ChannelEvent::Terminated); }
			},
			TrackingResult::Reacquired(acq) => {
				// A new track means new bit edges, frame alignment and time of week
				self.tlm.reset();
				self.last_sf1 = None;
				self.last_sf2 = None;
				self.last_sf3 = None;
				report.events.push(ChannelEvent::Reacquired{ doppler_hz: acq.doppler_hz, sample_idx: sample.idx });
			},
			TrackingResult::Terminated => report.events.push(ChannelEvent::Terminated),
			TrackingResult::Err(e) => {
				warn!("PRN {:02}: {}", self.prn, e);
				report.events.push(ChannelEvent::Fault(e));
			},
		}
	}

	fn on_decoder_event(&mut self, ev:DecoderEvent, report:&mut BlockReport) {
		match ev {
			DecoderEvent::BitSync{ offset_ms } => {
				info!("PRN {:02}: bit sync at period {}", self.prn, offset_ms);
				report.events.push(ChannelEvent::BitSync{ offset_ms });
			},
			DecoderEvent::FrameAligned{ inverted } => {
				info!("PRN {:02}: frame aligned (inverted={})", self.prn, inverted);
				report.events.push(ChannelEvent::FrameAligned{ inverted });
			},
			DecoderEvent::AlignmentLost => report.events.push(ChannelEvent::AlignmentLost),
			DecoderEvent::Rejected{ err, first_ms } => {
				warn!("PRN {:02}: subframe at period {} rejected: {}", self.prn, first_ms, err);
				report.events.push(ChannelEvent::SubframeRejected{ err, first_ms });
			},
			DecoderEvent::Subframe{ sf, .. } => {
				self.on_subframe(&sf, report);
				report.subframes.push(sf);
			},
		}
	}

	fn on_subframe(&mut self, sf:&Subframe, report:&mut BlockReport) {
		match sf.body {
			SFB::Subframe1(b) => self.last_sf1 = Some(b),
			SFB::Subframe2(b) => self.last_sf2 = Some(b),
			SFB::Subframe3(b) => self.last_sf3 = Some(b),
			SFB::Subframe4(b) => {
				if let Some(model) = ionosphere::Model::from_page(&b.page) {
					if self.store.ionosphere() != Some(model) {
						info!("PRN {:02}: new ionosphere parameters", self.prn);
						self.store.set_ionosphere(model);
						report.events.push(ChannelEvent::IonosphereUpdated);
					}
				}
				return;
			},
			SFB::Subframe5(_) => return,
		}

		if let (Some(sf1), Some(sf2), Some(sf3)) = (self.last_sf1, self.last_sf2, self.last_sf3) {
			match Ephemeris::from_subframes(&sf1, &sf2, &sf3) {
				Ok(eph) => match self.store.update(self.prn, eph) {
					Ok(UpdateOutcome::Unchanged) => {},
					Ok(outcome) => report.events.push(ChannelEvent::EphemerisUpdated{ iode: eph.iode, outcome }),
					Err(e) => report.events.push(ChannelEvent::Fault(e)),
				},
				// Subframes from either side of an upload; wait for the rest of the new set
				Err(e) => debug!("PRN {:02}: {}", self.prn, e),
			}
		}
	}

}

impl<A: Acquisition> BlockFunctionality<ChannelInput, BlockReport> for Channel<A> {

	fn apply(&mut self, input:&ChannelInput) -> BlockResult<BlockReport> {
		BlockResult::Ready(self.process_block(&input.block, &input.epochs))
	}

}

pub fn new_default_channel(acq:&AcquisitionResult, not_before:usize, cfg:&ReceiverConfig, store:Arc<EphemerisStore>) -> Result<DefaultChannel, DigSigProcErr> {
	let trk = tracking::new_default_tracker(acq.prn, cfg)?;
	Ok(Channel::with_tracker(trk, acq, not_before, cfg, store))
}
