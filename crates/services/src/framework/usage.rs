//! Per-(registration, consumer) cache of factory-scoped service objects.
//!
//! The table lock is only ever held for map bookkeeping. Each pair owns a
//! slot with its own mutex; the factory callback runs under the slot lock,
//! which serializes first access per pair without blocking other pairs.

use std::sync::Arc;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;

use crate::core::{InterfaceMap, ModuleId, ServiceId};
use crate::factory::ServiceFactory;
use crate::module::Module;

pub(crate) struct Slot {
	pub(crate) factory: Arc<dyn ServiceFactory>,
	/// The consuming module the cached objects are scoped to.
	pub(crate) module: Module,
	pub(crate) inner: Mutex<SlotInner>,
}

#[derive(Default)]
pub(crate) struct SlotInner {
	pub(crate) service: Option<InterfaceMap>,
	pub(crate) count: u32,
	/// Retired: the entry is on its way out of the table and must not serve
	/// new uses. Waiters that find this recreate a fresh slot.
	pub(crate) dead: bool,
}

impl Slot {
	/// Marks the slot dead and hands back the cached objects if an unget
	/// round is still owed. Idempotent; at most one caller gets `Some`.
	pub(crate) fn retire(&self) -> Option<InterfaceMap> {
		let mut inner = self.inner.lock();
		if inner.dead {
			return None;
		}
		inner.dead = true;
		inner.count = 0;
		inner.service.take()
	}
}

pub(crate) struct UsageTable {
	slots: Mutex<FxHashMap<(ServiceId, ModuleId), Arc<Slot>>>,
}

impl UsageTable {
	pub(crate) fn new() -> Self {
		Self { slots: Mutex::new(FxHashMap::default()) }
	}

	pub(crate) fn slot(&self, key: (ServiceId, ModuleId), factory: &Arc<dyn ServiceFactory>, module: &Module) -> Arc<Slot> {
		self.slots
			.lock()
			.entry(key)
			.or_insert_with(|| {
				Arc::new(Slot {
					factory: factory.clone(),
					module: module.clone(),
					inner: Mutex::new(SlotInner::default()),
				})
			})
			.clone()
	}

	pub(crate) fn lookup(&self, key: (ServiceId, ModuleId)) -> Option<Arc<Slot>> {
		self.slots.lock().get(&key).cloned()
	}

	/// Removes `key` only while it still maps to `slot`; a concurrent
	/// replacement stays untouched.
	pub(crate) fn remove_if(&self, key: (ServiceId, ModuleId), slot: &Arc<Slot>) {
		let mut slots = self.slots.lock();
		if slots.get(&key).is_some_and(|s| Arc::ptr_eq(s, slot)) {
			slots.remove(&key);
		}
	}

	/// Removes and returns every slot of a revoked registration.
	pub(crate) fn drain_service(&self, sid: ServiceId) -> Vec<Arc<Slot>> {
		self.drain_matching(|key| key.0 == sid).into_iter().map(|(_, slot)| slot).collect()
	}

	/// Removes and returns every slot held by an unloading consumer.
	pub(crate) fn drain_consumer(&self, module: ModuleId) -> Vec<(ServiceId, Arc<Slot>)> {
		self.drain_matching(|key| key.1 == module).into_iter().map(|(key, slot)| (key.0, slot)).collect()
	}

	fn drain_matching(&self, pred: impl Fn(&(ServiceId, ModuleId)) -> bool) -> Vec<((ServiceId, ModuleId), Arc<Slot>)> {
		let mut slots = self.slots.lock();
		let keys: Vec<_> = slots.keys().copied().filter(|k| pred(k)).collect();
		keys.into_iter().filter_map(|k| slots.remove(&k).map(|slot| (k, slot))).collect()
	}

	/// Registrations a module currently holds scoped objects of.
	pub(crate) fn in_use_by(&self, module: ModuleId) -> Vec<ServiceId> {
		let slots = self.slots.lock();
		let mut ids: Vec<_> = slots
			.iter()
			.filter(|((_, consumer), slot)| *consumer == module && slot.inner.lock().count > 0)
			.map(|((sid, _), _)| *sid)
			.collect();
		ids.sort_unstable();
		ids
	}
}
