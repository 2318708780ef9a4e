//! Process-wide registry state and the operations on it.
//!
//! # Mental model
//!
//! * One mutex guards the registration/module tables; every registry
//!   operation reads or writes them atomically, so no caller observes a
//!   half-inserted or half-removed registration.
//! * Events fire after that lock is released but before the triggering call
//!   returns; listeners may reenter the registry.
//! * Factory-scoped objects live in [`usage::UsageTable`], guarded
//!   independently so a slow factory blocks only its own (registration,
//!   consumer) pair.

use std::sync::Arc;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;

pub(crate) mod state;
pub(crate) mod usage;

use crate::context::ModuleContext;
use crate::core::{InterfaceMap, ModuleId, Properties, ServiceError, ServiceId, keys};
use crate::events::{Listeners, ModuleEvent, ModuleEventKind, ServiceEvent, ServiceEventKind};
use crate::module::{Module, ModuleActivator, ModuleState};
use crate::registration::{ServiceReference, ServiceRegistration};
use state::{ModuleData, Payload, RegistrationData, State};
use usage::UsageTable;

const SYSTEM_MODULE_NAME: &str = "quay.framework";

pub(crate) struct RegistryCore {
	pub(crate) state: Mutex<State>,
	pub(crate) usage: UsageTable,
	pub(crate) listeners: Listeners,
	properties: Mutex<FxHashMap<Box<str>, String>>,
	/// Shared libraries stay loaded until the framework is dropped; module
	/// unload revokes services but never unmaps code that published them.
	#[cfg(feature = "loader")]
	pub(crate) libraries: Mutex<Vec<libloading::Library>>,
}

impl RegistryCore {
	fn dispatch_service_event(self: &Arc<Self>, kind: ServiceEventKind, sid: ServiceId, props: &Properties) {
		let event = ServiceEvent { kind, reference: ServiceReference::new(self.clone(), sid) };
		self.listeners.dispatch_service(&event, props);
	}

	fn dispatch_module_event(&self, kind: ModuleEventKind, module: Module) {
		self.listeners.dispatch_module(&ModuleEvent { kind, module });
	}

	pub(crate) fn is_live(&self, sid: ServiceId) -> bool {
		self.state.lock().registrations.contains_key(&sid)
	}

	pub(crate) fn declares(&self, sid: ServiceId, interface: &str) -> bool {
		self.state.lock().registrations.get(&sid).is_some_and(|reg| reg.interfaces.iter().any(|i| &**i == interface))
	}

	pub(crate) fn registration_props(&self, sid: ServiceId) -> Option<Properties> {
		self.state.lock().registrations.get(&sid).map(|reg| reg.props.clone())
	}

	pub(crate) fn registration_owner(&self, sid: ServiceId) -> Option<ModuleId> {
		self.state.lock().registrations.get(&sid).map(|reg| reg.owner)
	}

	pub(crate) fn ranking_of(&self, sid: ServiceId) -> i64 {
		self.state.lock().registrations.get(&sid).map(|reg| reg.props.ranking()).unwrap_or(0)
	}

	pub(crate) fn module_info(&self, id: ModuleId) -> Option<Module> {
		self.state.lock().modules.get(&id).map(|m| m.info.clone())
	}

	pub(crate) fn module_state(&self, id: ModuleId) -> ModuleState {
		if self.state.lock().modules.contains_key(&id) { ModuleState::Loaded } else { ModuleState::Unloaded }
	}

	pub(crate) fn register(
		self: &Arc<Self>,
		owner: ModuleId,
		payload: Payload,
		mut props: Properties,
		interfaces: Vec<Box<str>>,
	) -> Result<ServiceRegistration, ServiceError> {
		if interfaces.is_empty() {
			return Err(ServiceError::InvalidArgument("a registration must declare at least one interface".into()));
		}
		let (sid, snapshot) = {
			let mut state = self.state.lock();
			if !state.modules.contains_key(&owner) {
				return Err(ServiceError::IllegalState("module context is no longer valid"));
			}
			let sid = state.alloc_service_id();
			pin_reserved(&mut props, sid, &interfaces);
			let snapshot = props.clone();
			state.insert_registration(sid, RegistrationData {
				owner,
				payload,
				props,
				interfaces,
				unregistering: false,
			});
			(sid, snapshot)
		};
		tracing::debug!(service = %sid, owner = %owner, "service registered");
		self.dispatch_service_event(ServiceEventKind::Registered, sid, &snapshot);
		Ok(ServiceRegistration::new(self.clone(), sid))
	}

	pub(crate) fn set_properties(self: &Arc<Self>, sid: ServiceId, mut props: Properties) -> Result<(), ServiceError> {
		let snapshot = {
			let mut state = self.state.lock();
			let Some(reg) = state.registrations.get_mut(&sid) else {
				return Err(ServiceError::IllegalState("service already unregistered"));
			};
			if reg.unregistering {
				return Err(ServiceError::IllegalState("service already unregistered"));
			}
			pin_reserved(&mut props, sid, &reg.interfaces);
			reg.props = props;
			reg.props.clone()
		};
		self.dispatch_service_event(ServiceEventKind::Modified, sid, &snapshot);
		Ok(())
	}

	pub(crate) fn unregister(self: &Arc<Self>, sid: ServiceId) -> Result<(), ServiceError> {
		// Win the teardown race first; the registration stays resolvable
		// while UNREGISTERING listeners run.
		let snapshot = {
			let mut state = self.state.lock();
			let Some(reg) = state.registrations.get_mut(&sid) else {
				return Err(ServiceError::IllegalState("service already unregistered"));
			};
			if reg.unregistering {
				return Err(ServiceError::IllegalState("service already unregistered"));
			}
			reg.unregistering = true;
			reg.props.clone()
		};
		self.dispatch_service_event(ServiceEventKind::Unregistering, sid, &snapshot);
		let removed = self.state.lock().remove_registration(sid);
		if let Some(data) = removed {
			self.evict_scoped(sid);
			tracing::debug!(service = %sid, owner = %data.owner, "service unregistered");
		}
		Ok(())
	}

	/// Forces release of every consumer-scoped object of a revoked
	/// registration, invoking each factory unget exactly once.
	fn evict_scoped(self: &Arc<Self>, sid: ServiceId) {
		for slot in self.usage.drain_service(sid) {
			if let Some(service) = slot.retire() {
				let registration = ServiceRegistration::new(self.clone(), sid);
				slot.factory.unget_service(&slot.module, &registration, &service);
			}
		}
	}

	pub(crate) fn get_service_reference(self: &Arc<Self>, interface: &str) -> Option<ServiceReference> {
		let sid = self.state.lock().best_service(interface)?;
		Some(ServiceReference::new(self.clone(), sid))
	}

	pub(crate) fn get_service_references(
		self: &Arc<Self>,
		interface: &str,
		filter: Option<&crate::filter::Filter>,
	) -> Vec<ServiceReference> {
		let state = self.state.lock();
		let Some(ids) = state.by_interface.get(interface) else { return Vec::new() };
		ids.iter()
			.filter(|sid| match (state.registrations.get(*sid), filter) {
				(Some(reg), Some(f)) => f.matches(&reg.props),
				(Some(_), None) => true,
				(None, _) => false,
			})
			.map(|&sid| ServiceReference::new(self.clone(), sid))
			.collect()
	}

	/// Resolves the object set of a registration for `consumer`, bumping the
	/// use count on the factory path. `Ok(None)` when the registration is
	/// gone.
	pub(crate) fn checkout(self: &Arc<Self>, sid: ServiceId, consumer: ModuleId) -> Result<Option<InterfaceMap>, ServiceError> {
		let (factory, declared, module) = {
			let state = self.state.lock();
			let Some(reg) = state.registrations.get(&sid) else { return Ok(None) };
			match &reg.payload {
				Payload::Object(map) => return Ok(Some(map.clone())),
				Payload::Factory(factory) => {
					let Some(consumer_data) = state.modules.get(&consumer) else {
						return Err(ServiceError::IllegalState("module context is no longer valid"));
					};
					(factory.clone(), reg.interfaces.clone(), consumer_data.info.clone())
				}
			}
		};
		loop {
			let slot = self.usage.slot((sid, consumer), &factory, &module);
			let mut inner = slot.inner.lock();
			if inner.dead {
				// Retired by a concurrent release or revocation; replace it.
				drop(inner);
				self.usage.remove_if((sid, consumer), &slot);
				if !self.is_live(sid) {
					return Ok(None);
				}
				continue;
			}
			if inner.service.is_none() {
				if !self.is_live(sid) {
					inner.dead = true;
					drop(inner);
					self.usage.remove_if((sid, consumer), &slot);
					return Ok(None);
				}
				// The slot lock serializes this: exactly one factory call
				// per (registration, consumer) epoch.
				let registration = ServiceRegistration::new(self.clone(), sid);
				let service = match factory.get_service(&module, &registration) {
					Ok(service) => service,
					Err(e) => {
						inner.dead = true;
						drop(inner);
						self.usage.remove_if((sid, consumer), &slot);
						return Err(e);
					}
				};
				if let Some(missing) = declared.iter().find(|i| !service.contains(i)) {
					tracing::error!(
						service = %sid,
						consumer = %consumer,
						interface = %missing,
						"service factory violated its contract: declared interface missing from returned objects"
					);
					let err = ServiceError::FactoryContract {
						module: module.name().to_string(),
						interface: missing.to_string(),
					};
					inner.dead = true;
					drop(inner);
					self.usage.remove_if((sid, consumer), &slot);
					return Err(err);
				}
				inner.service = Some(service);
			}
			inner.count += 1;
			return Ok(inner.service.clone());
		}
	}

	/// Releases one use of a factory-scoped object. Returns `true` when a
	/// use was actually released; the last release triggers the factory's
	/// unget callback.
	pub(crate) fn checkin(self: &Arc<Self>, sid: ServiceId, consumer: ModuleId) -> bool {
		let Some(slot) = self.usage.lookup((sid, consumer)) else { return false };
		let service = {
			let mut inner = slot.inner.lock();
			if inner.dead || inner.count == 0 {
				return false;
			}
			inner.count -= 1;
			if inner.count > 0 {
				return true;
			}
			inner.dead = true;
			inner.service.take()
		};
		if let Some(service) = service {
			let registration = ServiceRegistration::new(self.clone(), sid);
			slot.factory.unget_service(&slot.module, &registration, &service);
		}
		self.usage.remove_if((sid, consumer), &slot);
		true
	}

	pub(crate) fn install(
		self: &Arc<Self>,
		name: &str,
		version: &str,
		mut activator: Box<dyn ModuleActivator>,
	) -> Result<ModuleId, ServiceError> {
		let info = {
			let mut state = self.state.lock();
			let id = state.alloc_module_id();
			let info = Module::new(id, name, version);
			state.modules.insert(id, ModuleData { info: info.clone(), registrations: Vec::new(), activator: None });
			info
		};
		let id = info.id();
		tracing::info!(module = %id, name, version, "loading module");
		let ctx = ModuleContext::new(self.clone(), id);
		if let Err(e) = activator.load(&ctx) {
			tracing::error!(module = %id, error = %e, "module activator failed; revoking its registrations");
			self.teardown_module(id);
			return Err(e);
		}
		if let Some(module) = self.state.lock().modules.get_mut(&id) {
			module.activator = Some(activator);
		}
		self.dispatch_module_event(ModuleEventKind::Loaded, info);
		Ok(id)
	}

	pub(crate) fn uninstall(self: &Arc<Self>, id: ModuleId) -> Result<(), ServiceError> {
		if id == ModuleId::SYSTEM {
			return Err(ServiceError::InvalidArgument("the system module cannot be unloaded".into()));
		}
		let (info, activator) = {
			let mut state = self.state.lock();
			let Some(module) = state.modules.get_mut(&id) else {
				return Err(ServiceError::IllegalState("module is not loaded"));
			};
			(module.info.clone(), module.activator.take())
		};
		tracing::info!(module = %id, name = info.name(), "unloading module");
		self.dispatch_module_event(ModuleEventKind::Unloading, info.clone());
		if let Some(mut activator) = activator {
			let ctx = ModuleContext::new(self.clone(), id);
			if let Err(e) = activator.unload(&ctx) {
				tracing::error!(module = %id, error = %e, "module activator failed during unload");
			}
		}
		self.teardown_module(id);
		self.dispatch_module_event(ModuleEventKind::Unloaded, info);
		Ok(())
	}

	/// Revokes a module's registrations in registration order, releases the
	/// scoped services it was consuming, drops its listeners, and removes it.
	fn teardown_module(self: &Arc<Self>, id: ModuleId) {
		let owned = self.state.lock().modules.get(&id).map(|m| m.registrations.clone()).unwrap_or_default();
		for sid in owned {
			// The activator may have unregistered some already.
			let _ = self.unregister(sid);
		}
		for (sid, slot) in self.usage.drain_consumer(id) {
			if let Some(service) = slot.retire() {
				let registration = ServiceRegistration::new(self.clone(), sid);
				slot.factory.unget_service(&slot.module, &registration, &service);
			}
		}
		self.listeners.remove_owner(id);
		self.state.lock().modules.remove(&id);
	}
}

fn pin_reserved(props: &mut Properties, sid: ServiceId, interfaces: &[Box<str>]) {
	props.insert(keys::SERVICE_ID, sid.as_u64() as i64);
	props.insert(keys::INTERFACES, interfaces.iter().map(|i| i.to_string()).collect::<Vec<_>>());
}

/// An explicitly constructed registry instance.
///
/// There is no ambient global: whoever owns the process entry point builds a
/// `Framework`, installs modules into it, and hands module code its context.
/// Tests construct a fresh framework each.
pub struct Framework {
	core: Arc<RegistryCore>,
}

impl Framework {
	pub fn new() -> Self {
		let core = Arc::new(RegistryCore {
			state: Mutex::new(State::new()),
			usage: UsageTable::new(),
			listeners: Listeners::new(),
			properties: Mutex::new(FxHashMap::default()),
			#[cfg(feature = "loader")]
			libraries: Mutex::new(Vec::new()),
		});
		{
			let mut state = core.state.lock();
			let id = state.alloc_module_id();
			debug_assert_eq!(id, ModuleId::SYSTEM);
			let info = Module::new(id, SYSTEM_MODULE_NAME, env!("CARGO_PKG_VERSION"));
			state.modules.insert(id, ModuleData { info, registrations: Vec::new(), activator: None });
		}
		Self { core }
	}

	/// The framework's own context, always valid for the framework's
	/// lifetime.
	pub fn context(&self) -> ModuleContext {
		ModuleContext::new(self.core.clone(), ModuleId::SYSTEM)
	}

	/// Installs a module: creates it, runs the activator's `load` against
	/// the fresh context, then announces it. A failing activator aborts the
	/// install and revokes whatever it had registered.
	pub fn install(&self, name: &str, version: &str, activator: Box<dyn ModuleActivator>) -> Result<ModuleId, ServiceError> {
		self.core.install(name, version, activator)
	}

	/// Unloads a module: UNLOADING event, activator `unload`, revocation of
	/// its remaining registrations in registration order, release of every
	/// scoped service it consumed, then removal and the UNLOADED event.
	pub fn uninstall(&self, id: ModuleId) -> Result<(), ServiceError> {
		self.core.uninstall(id)
	}

	/// A context acting for an installed module. The framework is the root
	/// of trust; handing contexts to embedders is its call.
	pub fn module_context(&self, id: ModuleId) -> Result<ModuleContext, ServiceError> {
		match self.core.module_state(id) {
			ModuleState::Loaded => Ok(ModuleContext::new(self.core.clone(), id)),
			ModuleState::Unloaded => Err(ServiceError::IllegalState("module is not loaded")),
		}
	}

	pub fn modules(&self) -> Vec<Module> {
		let state = self.core.state.lock();
		let mut all: Vec<_> = state.modules.values().map(|m| m.info.clone()).collect();
		all.sort_by_key(|m| m.id());
		all
	}

	pub fn module(&self, id: ModuleId) -> Option<Module> {
		self.core.module_info(id)
	}

	pub fn module_by_name(&self, name: &str) -> Option<Module> {
		let state = self.core.state.lock();
		let mut found: Vec<_> = state.modules.values().filter(|m| m.info.name() == name).map(|m| m.info.clone()).collect();
		found.sort_by_key(|m| m.id());
		found.into_iter().next()
	}

	/// Framework-level string property, e.g. relaunch arguments set by an
	/// application before it returns the relaunch exit code.
	pub fn set_property(&self, key: &str, value: &str) {
		self.core.properties.lock().insert(Box::from(key), value.to_string());
	}

	pub fn property(&self, key: &str) -> Option<String> {
		self.core.properties.lock().get(key).cloned()
	}

	#[cfg(feature = "loader")]
	pub(crate) fn retain_library(&self, library: libloading::Library) {
		self.core.libraries.lock().push(library);
	}
}

impl Default for Framework {
	fn default() -> Self {
		Self::new()
	}
}
