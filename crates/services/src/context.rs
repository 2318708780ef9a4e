//! Per-module capability handle onto the registry.

use std::sync::Arc;

use crate::core::{InterfaceMap, ModuleId, Properties, ServiceError, ServiceId, interface_id};
use crate::events::{ListenerToken, ModuleEvent, ServiceEvent};
use crate::factory::ServiceFactory;
use crate::filter::Filter;
use crate::framework::RegistryCore;
use crate::framework::state::Payload;
use crate::module::Module;
use crate::registration::{ServiceReference, ServiceRegistration};

/// The only path through which a module registers, looks up and releases
/// services and subscribes to lifecycle events.
///
/// Handed to the module's activator during load. Every operation validates
/// that the module is still loaded and fails with `IllegalState` once it is
/// not; a context never outlives its module's access.
#[derive(Clone)]
pub struct ModuleContext {
	core: Arc<RegistryCore>,
	module: ModuleId,
}

impl ModuleContext {
	pub(crate) fn new(core: Arc<RegistryCore>, module: ModuleId) -> Self {
		Self { core, module }
	}

	fn ensure_live(&self) -> Result<(), ServiceError> {
		match self.core.module_info(self.module) {
			Some(_) => Ok(()),
			None => Err(ServiceError::IllegalState("module context is no longer valid")),
		}
	}

	pub fn module_id(&self) -> ModuleId {
		self.module
	}

	/// Identity of the owning module.
	pub fn module(&self) -> Result<Module, ServiceError> {
		self.core.module_info(self.module).ok_or(ServiceError::IllegalState("module context is no longer valid"))
	}

	/// Publishes one shared object set under every interface id in
	/// `objects`. The map must be non-empty.
	pub fn register_service(&self, objects: InterfaceMap, props: Properties) -> Result<ServiceRegistration, ServiceError> {
		if objects.is_empty() {
			return Err(ServiceError::InvalidArgument("interface map is empty".into()));
		}
		let interfaces: Vec<Box<str>> = objects.interface_ids().map(Box::from).collect();
		self.core.register(self.module, Payload::Object(objects), props, interfaces)
	}

	/// Publishes a factory producing module-scoped object sets for the
	/// declared interfaces (see [`interface_ids!`](crate::interface_ids)).
	pub fn register_factory(
		&self,
		interfaces: &[&str],
		factory: Arc<dyn ServiceFactory>,
		props: Properties,
	) -> Result<ServiceRegistration, ServiceError> {
		let mut declared: Vec<Box<str>> = Vec::with_capacity(interfaces.len());
		for interface in interfaces {
			if declared.iter().any(|d| &**d == *interface) {
				return Err(ServiceError::InvalidArgument(format!("duplicate interface id `{interface}`")));
			}
			declared.push(Box::from(*interface));
		}
		self.core.register(self.module, Payload::Factory(factory), props, declared)
	}

	/// The best provider of `interface`: highest `service.ranking`, earliest
	/// registration on ties. A miss is `Ok(None)`, not an error.
	pub fn get_service_reference(&self, interface: &str) -> Result<Option<ServiceReference>, ServiceError> {
		self.ensure_live()?;
		Ok(self.core.get_service_reference(interface))
	}

	/// Typed sugar over [`get_service_reference`](Self::get_service_reference).
	pub fn get_service_reference_for<T: ?Sized>(&self) -> Result<Option<ServiceReference>, ServiceError> {
		self.get_service_reference(interface_id::<T>())
	}

	/// All live providers of `interface`, optionally narrowed by an LDAP
	/// filter over the registration properties (including the implicit
	/// `interfaces` attribute). Order is unspecified.
	pub fn get_service_references(&self, interface: &str, filter: Option<&str>) -> Result<Vec<ServiceReference>, ServiceError> {
		self.ensure_live()?;
		let filter = filter.map(Filter::new).transpose()?;
		Ok(self.core.get_service_references(interface, filter.as_ref()))
	}

	/// Resolves a reference into the object published under `T`'s interface
	/// id, scoped to this module when the registration is factory-backed.
	///
	/// `Ok(None)` when the registration is gone or does not carry `T`;
	/// factory failures and contract violations surface as errors.
	pub fn get_service<T: ?Sized + Send + Sync + 'static>(&self, reference: &ServiceReference) -> Result<Option<Arc<T>>, ServiceError> {
		self.ensure_live()?;
		let sid = reference.id();
		if !self.core.declares(sid, interface_id::<T>()) {
			return Ok(None);
		}
		let Some(map) = self.core.checkout(sid, self.module)? else {
			return Ok(None);
		};
		match map.get::<T>() {
			Some(obj) => Ok(Some(obj)),
			None => {
				// Declared but published under an incompatible handle type;
				// give the use back before reporting the miss.
				self.core.checkin(sid, self.module);
				Ok(None)
			}
		}
	}

	/// Drops one use of a factory-scoped service. The release that brings
	/// this module's use count to zero triggers the factory's unget
	/// callback. `false` when nothing was held.
	pub fn unget_service(&self, reference: &ServiceReference) -> Result<bool, ServiceError> {
		self.ensure_live()?;
		Ok(self.core.checkin(reference.id(), self.module))
	}

	/// Registrations this module currently holds factory-scoped objects of.
	pub fn services_in_use(&self) -> Vec<ServiceId> {
		self.core.usage.in_use_by(self.module)
	}

	/// Subscribes to REGISTERED/MODIFIED/UNREGISTERING events whose
	/// registration properties match `filter` (no filter matches all).
	/// Delivery is synchronous, in subscription order, on the mutating
	/// thread. The subscription dies with the module.
	pub fn add_service_listener(
		&self,
		filter: Option<&str>,
		listener: impl Fn(&ServiceEvent) + Send + Sync + 'static,
	) -> Result<ListenerToken, ServiceError> {
		self.ensure_live()?;
		let filter = filter.map(Filter::new).transpose()?;
		Ok(self.core.listeners.add_service(self.module, filter, Arc::new(listener)))
	}

	pub fn remove_service_listener(&self, token: ListenerToken) -> bool {
		self.core.listeners.remove_service(token)
	}

	/// Subscribes to LOADED/UNLOADING/UNLOADED module events, same delivery
	/// discipline as service listeners.
	pub fn add_module_listener(
		&self,
		listener: impl Fn(&ModuleEvent) + Send + Sync + 'static,
	) -> Result<ListenerToken, ServiceError> {
		self.ensure_live()?;
		Ok(self.core.listeners.add_module(self.module, Arc::new(listener)))
	}

	pub fn remove_module_listener(&self, token: ListenerToken) -> bool {
		self.core.listeners.remove_module(token)
	}
}

impl core::fmt::Debug for ModuleContext {
	fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
		f.debug_tuple("ModuleContext").field(&self.module).finish()
	}
}
