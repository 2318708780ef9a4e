//! Service and module lifecycle events.
//!
//! Delivery is synchronous on the thread that caused the state change, in
//! subscription order. Listener lists are copy-on-write: dispatch iterates a
//! pinned snapshot, so callbacks may add or remove listeners freely and the
//! change applies from the next event on.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use arc_swap::ArcSwap;

use crate::core::{ModuleId, Properties};
use crate::filter::Filter;
use crate::module::Module;
use crate::registration::ServiceReference;

/// What happened to a service registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceEventKind {
	/// The registration became visible to lookups.
	Registered,
	/// The property bag was replaced.
	Modified,
	/// Fired before removal; the service can still be resolved during
	/// delivery.
	Unregistering,
}

#[derive(Clone)]
pub struct ServiceEvent {
	pub kind: ServiceEventKind,
	pub reference: ServiceReference,
}

impl core::fmt::Debug for ServiceEvent {
	fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
		f.debug_struct("ServiceEvent").field("kind", &self.kind).field("service", &self.reference.id()).finish()
	}
}

/// What happened to a module.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModuleEventKind {
	Loaded,
	/// Fired before the module's activator runs its unload hook.
	Unloading,
	Unloaded,
}

#[derive(Debug, Clone)]
pub struct ModuleEvent {
	pub kind: ModuleEventKind,
	pub module: Module,
}

/// Handle for removing a previously added listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerToken(u64);

type ServiceCallback = dyn Fn(&ServiceEvent) + Send + Sync;
type ModuleCallback = dyn Fn(&ModuleEvent) + Send + Sync;

struct ServiceListener {
	token: ListenerToken,
	owner: ModuleId,
	filter: Option<Filter>,
	callback: Arc<ServiceCallback>,
}

struct ModuleListener {
	token: ListenerToken,
	owner: ModuleId,
	callback: Arc<ModuleCallback>,
}

/// Both listener lists plus the token allocator.
pub(crate) struct Listeners {
	service: ArcSwap<Vec<Arc<ServiceListener>>>,
	module: ArcSwap<Vec<Arc<ModuleListener>>>,
	next_token: AtomicU64,
}

impl Listeners {
	pub(crate) fn new() -> Self {
		Self {
			service: ArcSwap::from_pointee(Vec::new()),
			module: ArcSwap::from_pointee(Vec::new()),
			next_token: AtomicU64::new(1),
		}
	}

	fn token(&self) -> ListenerToken {
		ListenerToken(self.next_token.fetch_add(1, Ordering::Relaxed))
	}

	pub(crate) fn add_service(
		&self,
		owner: ModuleId,
		filter: Option<Filter>,
		callback: Arc<ServiceCallback>,
	) -> ListenerToken {
		let token = self.token();
		let entry = Arc::new(ServiceListener { token, owner, filter, callback });
		self.service.rcu(|cur| {
			let mut next = Vec::with_capacity(cur.len() + 1);
			next.extend(cur.iter().cloned());
			next.push(entry.clone());
			next
		});
		token
	}

	pub(crate) fn add_module(&self, owner: ModuleId, callback: Arc<ModuleCallback>) -> ListenerToken {
		let token = self.token();
		let entry = Arc::new(ModuleListener { token, owner, callback });
		self.module.rcu(|cur| {
			let mut next = Vec::with_capacity(cur.len() + 1);
			next.extend(cur.iter().cloned());
			next.push(entry.clone());
			next
		});
		token
	}

	pub(crate) fn remove_service(&self, token: ListenerToken) -> bool {
		let mut removed = false;
		self.service.rcu(|cur| {
			let next: Vec<_> = cur.iter().filter(|l| l.token != token).cloned().collect();
			removed = next.len() != cur.len();
			next
		});
		removed
	}

	pub(crate) fn remove_module(&self, token: ListenerToken) -> bool {
		let mut removed = false;
		self.module.rcu(|cur| {
			let next: Vec<_> = cur.iter().filter(|l| l.token != token).cloned().collect();
			removed = next.len() != cur.len();
			next
		});
		removed
	}

	/// Drops every listener a module added. Runs as part of module unload.
	pub(crate) fn remove_owner(&self, owner: ModuleId) {
		self.service.rcu(|cur| cur.iter().filter(|l| l.owner != owner).cloned().collect::<Vec<_>>());
		self.module.rcu(|cur| cur.iter().filter(|l| l.owner != owner).cloned().collect::<Vec<_>>());
	}

	/// Delivers a service event to every listener whose filter matches
	/// `props`, in subscription order. A panicking listener is reported and
	/// skipped; the rest still run.
	pub(crate) fn dispatch_service(&self, event: &ServiceEvent, props: &Properties) {
		let snapshot = self.service.load();
		for listener in snapshot.iter() {
			if listener.filter.as_ref().is_some_and(|f| !f.matches(props)) {
				continue;
			}
			if catch_unwind(AssertUnwindSafe(|| (listener.callback)(event))).is_err() {
				tracing::error!(service = %event.reference.id(), kind = ?event.kind, "service listener panicked during dispatch");
			}
		}
	}

	/// Module-event counterpart of [`dispatch_service`](Self::dispatch_service).
	pub(crate) fn dispatch_module(&self, event: &ModuleEvent) {
		let snapshot = self.module.load();
		for listener in snapshot.iter() {
			if catch_unwind(AssertUnwindSafe(|| (listener.callback)(event))).is_err() {
				tracing::error!(module = %event.module.id(), kind = ?event.kind, "module listener panicked during dispatch");
			}
		}
	}
}
