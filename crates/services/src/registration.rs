//! Handles onto live registrations.
//!
//! Both types hold only the registration id plus a handle to the framework;
//! every accessor validates against the live tables, so neither handle keeps
//! a revoked registration alive.

use std::sync::Arc;

use crate::core::{ModuleId, PropValue, Properties, ServiceError, ServiceId, keys};
use crate::framework::RegistryCore;

/// The registrar's side of one published service.
///
/// Returned by `register_*`; the owning module uses it to update properties
/// or revoke the publication. Cloning shares the same underlying
/// registration.
#[derive(Clone)]
pub struct ServiceRegistration {
	core: Arc<RegistryCore>,
	id: ServiceId,
}

impl ServiceRegistration {
	pub(crate) fn new(core: Arc<RegistryCore>, id: ServiceId) -> Self {
		Self { core, id }
	}

	pub fn id(&self) -> ServiceId {
		self.id
	}

	/// A consumer-side reference to this registration. Fails once the
	/// registration has been unregistered.
	pub fn reference(&self) -> Result<ServiceReference, ServiceError> {
		if self.core.is_live(self.id) {
			Ok(ServiceReference::new(self.core.clone(), self.id))
		} else {
			Err(ServiceError::IllegalState("service already unregistered"))
		}
	}

	/// Current property bag, or `None` once unregistered.
	pub fn properties(&self) -> Option<Properties> {
		self.core.registration_props(self.id)
	}

	/// Replaces the property bag and fires MODIFIED. Ranking changes apply
	/// to subsequent lookups immediately. Reserved keys stay
	/// framework-maintained.
	pub fn set_properties(&self, props: Properties) -> Result<(), ServiceError> {
		self.core.set_properties(self.id, props)
	}

	/// Revokes the publication: fires UNREGISTERING while the service is
	/// still resolvable, removes it, then force-releases factory-scoped
	/// objects. A second call fails with `IllegalState`.
	pub fn unregister(&self) -> Result<(), ServiceError> {
		self.core.unregister(self.id)
	}
}

impl PartialEq for ServiceRegistration {
	fn eq(&self, other: &Self) -> bool {
		self.id == other.id && Arc::ptr_eq(&self.core, &other.core)
	}
}

impl Eq for ServiceRegistration {}

impl core::fmt::Debug for ServiceRegistration {
	fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
		f.debug_tuple("ServiceRegistration").field(&self.id).finish()
	}
}

/// Lightweight, comparable handle to a registration.
///
/// Stays a valid value for equality, hashing and ordering after the
/// registration is gone; it merely resolves to nothing anymore.
#[derive(Clone)]
pub struct ServiceReference {
	core: Arc<RegistryCore>,
	id: ServiceId,
}

impl ServiceReference {
	pub(crate) fn new(core: Arc<RegistryCore>, id: ServiceId) -> Self {
		Self { core, id }
	}

	pub fn id(&self) -> ServiceId {
		self.id
	}

	/// Whether the underlying registration still exists.
	pub fn is_valid(&self) -> bool {
		self.core.is_live(self.id)
	}

	/// Declared interface ids; empty once the registration is gone.
	pub fn interfaces(&self) -> Vec<String> {
		self.core
			.registration_props(self.id)
			.and_then(|p| p.get(keys::INTERFACES).and_then(|v| v.as_list().map(<[String]>::to_vec)))
			.unwrap_or_default()
	}

	pub fn property(&self, key: &str) -> Option<PropValue> {
		self.core.registration_props(self.id).and_then(|p| p.get(key).cloned())
	}

	/// Current ranking; 0 when absent or the registration is gone.
	pub fn ranking(&self) -> i64 {
		self.core.ranking_of(self.id)
	}

	/// The module that owns the registration, while it is live.
	pub fn owner(&self) -> Option<ModuleId> {
		self.core.registration_owner(self.id)
	}
}

impl PartialEq for ServiceReference {
	fn eq(&self, other: &Self) -> bool {
		self.id == other.id && Arc::ptr_eq(&self.core, &other.core)
	}
}

impl Eq for ServiceReference {}

impl std::hash::Hash for ServiceReference {
	fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
		(Arc::as_ptr(&self.core) as usize).hash(state);
		self.id.hash(state);
	}
}

impl PartialOrd for ServiceReference {
	fn partial_cmp(&self, other: &Self) -> Option<core::cmp::Ordering> {
		Some(self.cmp(other))
	}
}

impl Ord for ServiceReference {
	/// Best-service-first: higher ranking sorts earlier; on equal ranking
	/// the earlier registration id wins. Rankings are read live, so the
	/// order tracks `set_properties`.
	fn cmp(&self, other: &Self) -> core::cmp::Ordering {
		other
			.ranking()
			.cmp(&self.ranking())
			.then_with(|| self.id.cmp(&other.id))
			.then_with(|| (Arc::as_ptr(&self.core) as usize).cmp(&(Arc::as_ptr(&other.core) as usize)))
	}
}

impl core::fmt::Debug for ServiceReference {
	fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
		f.debug_tuple("ServiceReference").field(&self.id).finish()
	}
}
