//! Registration and module tables. Everything here is guarded by the single
//! state mutex in [`super::RegistryCore`]; no partially-updated view is ever
//! observable outside it.

use std::sync::Arc;

use rustc_hash::FxHashMap;

use crate::core::{InterfaceMap, ModuleId, Properties, ServiceId};
use crate::factory::ServiceFactory;
use crate::module::{Module, ModuleActivator};

/// What a registration publishes: one shared object set, or a factory that
/// produces a module-scoped set per consumer. Exactly one of the two.
pub(crate) enum Payload {
	Object(InterfaceMap),
	Factory(Arc<dyn ServiceFactory>),
}

pub(crate) struct RegistrationData {
	pub(crate) owner: ModuleId,
	pub(crate) payload: Payload,
	pub(crate) props: Properties,
	/// Declared interface ids, in declaration order.
	pub(crate) interfaces: Vec<Box<str>>,
	/// Set once teardown has begun; the registration is still resolvable
	/// until it is removed, but a second `unregister` must fail.
	pub(crate) unregistering: bool,
}

pub(crate) struct ModuleData {
	pub(crate) info: Module,
	/// Owned registrations in registration order; unload revokes them in
	/// this order.
	pub(crate) registrations: Vec<ServiceId>,
	pub(crate) activator: Option<Box<dyn ModuleActivator>>,
}

pub(crate) struct State {
	pub(crate) modules: FxHashMap<ModuleId, ModuleData>,
	pub(crate) registrations: FxHashMap<ServiceId, RegistrationData>,
	/// Interface id -> publishing registrations, in registration order.
	pub(crate) by_interface: FxHashMap<Box<str>, Vec<ServiceId>>,
	next_module: u64,
	next_service: u64,
}

impl State {
	pub(crate) fn new() -> Self {
		Self {
			modules: FxHashMap::default(),
			registrations: FxHashMap::default(),
			by_interface: FxHashMap::default(),
			next_module: 1,
			next_service: 1,
		}
	}

	pub(crate) fn alloc_module_id(&mut self) -> ModuleId {
		let id = ModuleId::new(self.next_module);
		self.next_module += 1;
		id
	}

	pub(crate) fn alloc_service_id(&mut self) -> ServiceId {
		let id = ServiceId::new(self.next_service);
		self.next_service += 1;
		id
	}

	pub(crate) fn insert_registration(&mut self, sid: ServiceId, data: RegistrationData) {
		for interface in &data.interfaces {
			self.by_interface.entry(interface.clone()).or_default().push(sid);
		}
		if let Some(module) = self.modules.get_mut(&data.owner) {
			module.registrations.push(sid);
		}
		self.registrations.insert(sid, data);
	}

	pub(crate) fn remove_registration(&mut self, sid: ServiceId) -> Option<RegistrationData> {
		let data = self.registrations.remove(&sid)?;
		for interface in &data.interfaces {
			let emptied = match self.by_interface.get_mut(interface) {
				Some(list) => {
					list.retain(|s| *s != sid);
					list.is_empty()
				}
				None => false,
			};
			if emptied {
				self.by_interface.remove(interface);
			}
		}
		if let Some(module) = self.modules.get_mut(&data.owner) {
			module.registrations.retain(|s| *s != sid);
		}
		Some(data)
	}

	/// The best provider of `interface`: highest ranking, earliest
	/// registration id on ties.
	pub(crate) fn best_service(&self, interface: &str) -> Option<ServiceId> {
		let ids = self.by_interface.get(interface)?;
		let mut best: Option<(i64, ServiceId)> = None;
		for &sid in ids {
			let Some(reg) = self.registrations.get(&sid) else { continue };
			let rank = reg.props.ranking();
			let better = match best {
				None => true,
				Some((best_rank, best_sid)) => rank > best_rank || (rank == best_rank && sid < best_sid),
			};
			if better {
				best = Some((rank, sid));
			}
		}
		best.map(|(_, sid)| sid)
	}
}
