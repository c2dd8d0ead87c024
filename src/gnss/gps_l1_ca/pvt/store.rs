use std::sync::RwLock;

use log::{debug, info};
use serde::{Serialize, Deserialize};

use crate::DigSigProcErr;
use super::ephemeris::Ephemeris;
use super::ionosphere;

pub const MAX_PRN:usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum UpdateOutcome {
	Inserted,
	Superseded{ old_iode:u8 },
	/// Same tag with new content
	Overwritten,
	/// Same tag and same content
	Unchanged,
	/// Tag older than the one held; the entry is kept
	Stale{ held_iode:u8 },
}

/// 8-bit serial number comparison: true when `a` comes after `b` allowing for wrap-around
pub fn iode_is_newer(a:u8, b:u8) -> bool {
	let d = a.wrapping_sub(b);
	d != 0 && d < 128
}

/// Latest ephemeris per satellite, shared between the decoding channels (writers) and the solver (reader).  Every
/// PRN has its own lock so channels never contend with each other.
pub struct EphemerisStore {
	slots:Vec<RwLock<Option<Ephemeris>>>,
	iono:RwLock<Option<ionosphere::Model>>,
}

impl Default for EphemerisStore {
	fn default() -> Self { Self::new() }
}

impl EphemerisStore {

	pub fn new() -> Self {
		Self{ slots: (0..MAX_PRN).map(|_| RwLock::new(None)).collect(), iono: RwLock::new(None) }
	}

	fn slot(&self, prn:usize) -> Result<&RwLock<Option<Ephemeris>>, DigSigProcErr> {
		if prn == 0 || prn > MAX_PRN { return Err(DigSigProcErr::InvalidPrn(prn)); }
		Ok(&self.slots[prn - 1])
	}

	pub fn update(&self, prn:usize, eph:Ephemeris) -> Result<UpdateOutcome, DigSigProcErr> {
		let mut slot = self.slot(prn)?.write().map_err(|_| DigSigProcErr::Other("ephemeris slot lock poisoned"))?;

		let outcome = match *slot {
			None => UpdateOutcome::Inserted,
			Some(held) if held.iode == eph.iode => {
				if held == eph { UpdateOutcome::Unchanged } else { UpdateOutcome::Overwritten }
			},
			Some(held) if iode_is_newer(eph.iode, held.iode) => UpdateOutcome::Superseded{ old_iode: held.iode },
			Some(held) => UpdateOutcome::Stale{ held_iode: held.iode },
		};

		match outcome {
			UpdateOutcome::Unchanged => debug!("PRN {:02} ephemeris IODE {} unchanged", prn, eph.iode),
			UpdateOutcome::Stale{ held_iode } => debug!("PRN {:02} ignoring IODE {} older than {}", prn, eph.iode, held_iode),
			_ => {
				info!("PRN {:02} ephemeris IODE {} stored ({:?})", prn, eph.iode, outcome);
				*slot = Some(eph);
			}
		}

		Ok(outcome)
	}

	pub fn get(&self, prn:usize) -> Option<Ephemeris> {
		self.slot(prn).ok()?.read().ok().and_then(|slot| *slot)
	}

	/// The entry for a PRN if it is healthy and its fit interval covers t
	pub fn valid_at(&self, prn:usize, t:f64) -> Option<Ephemeris> {
		self.get(prn).filter(|eph| eph.is_healthy() && eph.is_valid_at(t))
	}

	pub fn prns(&self) -> Vec<usize> {
		(1..=MAX_PRN).filter(|prn| self.get(*prn).is_some()).collect()
	}

	pub fn set_ionosphere(&self, model:ionosphere::Model) {
		if let Ok(mut iono) = self.iono.write() { *iono = Some(model); }
	}

	pub fn ionosphere(&self) -> Option<ionosphere::Model> {
		self.iono.read().ok().and_then(|iono| *iono)
	}

}

#[cfg(test)]
mod tests {

	use std::sync::Arc;

	use super::*;
	use super::super::ephemeris::tests::synthetic;

	fn with_iode(iode:u8) -> Ephemeris {
		let mut eph = synthetic(0.1, 0.2);
		eph.iode = iode;
		eph.iodc = iode as u16;
		eph
	}

	#[test]
	fn serial_number_order_wraps() {
		assert!(iode_is_newer(5, 4));
		assert!(iode_is_newer(2, 250));
		assert!(!iode_is_newer(250, 2));
		assert!(!iode_is_newer(7, 7));
	}

	#[test]
	fn supersede_rule() {
		let store = EphemerisStore::new();
		assert_eq!(store.update(3, with_iode(254)).unwrap(), UpdateOutcome::Inserted);
		assert_eq!(store.update(3, with_iode(254)).unwrap(), UpdateOutcome::Unchanged);
		assert_eq!(store.update(3, with_iode(1)).unwrap(), UpdateOutcome::Superseded{ old_iode: 254 });
		assert_eq!(store.update(3, with_iode(254)).unwrap(), UpdateOutcome::Stale{ held_iode: 1 });
		assert_eq!(store.get(3).unwrap().iode, 1);

		let mut changed = with_iode(1);
		changed.a_f0 += 1.0e-9;
		assert_eq!(store.update(3, changed).unwrap(), UpdateOutcome::Overwritten);
		assert_eq!(store.get(3).unwrap(), changed);

		assert_eq!(store.prns(), vec![3]);
		assert!(store.get(4).is_none());
		assert_eq!(store.update(33, with_iode(1)), Err(DigSigProcErr::InvalidPrn(33)));
	}

	#[test]
	fn validity_filters_health_and_time() {
		let store = EphemerisStore::new();
		let mut sick = with_iode(9);
		sick.sv_health = 0x3F;
		store.update(1, sick).unwrap();
		store.update(2, with_iode(9)).unwrap();

		let t = with_iode(9).t_oe + 60.0;
		assert!(store.valid_at(1, t).is_none());
		assert!(store.valid_at(2, t).is_some());
		assert!(store.valid_at(2, t + 4.0 * 3600.0).is_none());
	}

	#[test]
	fn concurrent_writers_on_separate_slots() {
		let store = Arc::new(EphemerisStore::new());
		let handles:Vec<_> = (1..=8).map(|prn| {
			let store = store.clone();
			std::thread::spawn(move || {
				for iode in 0..50u8 { store.update(prn, with_iode(iode)).unwrap(); }
			})
		}).collect();
		for h in handles { h.join().unwrap(); }

		for prn in 1..=8 { assert_eq!(store.get(prn).unwrap().iode, 49); }
	}

}
