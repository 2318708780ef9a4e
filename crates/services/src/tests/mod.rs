//! Cross-module behavior tests. Single-type parser/value tests live next to
//! their modules; everything here exercises the framework surface.

mod events;
mod factory_scope;

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;

use crate::context::ModuleContext;
use crate::core::{InterfaceMap, Properties, ServiceError};
use crate::factory::ServiceFactory;
use crate::module::{Module, ModuleActivator};
use crate::registration::ServiceRegistration;

pub(crate) trait Device: Send + Sync + std::fmt::Debug {
	fn kind(&self) -> &'static str;
}

#[derive(Debug)]
pub(crate) struct Probe(pub &'static str);

impl Device for Probe {
	fn kind(&self) -> &'static str {
		self.0
	}
}

/// Activator running a closure as its load hook.
pub(crate) struct WithLoad<F>(pub F);

impl<F> ModuleActivator for WithLoad<F>
where
	F: FnMut(&ModuleContext) -> Result<(), ServiceError> + Send,
{
	fn load(&mut self, ctx: &ModuleContext) -> Result<(), ServiceError> {
		(self.0)(ctx)
	}
}

/// Activator that does nothing; the test drives the module's context from
/// outside via `Framework::module_context`.
pub(crate) struct Inert;

impl ModuleActivator for Inert {
	fn load(&mut self, _ctx: &ModuleContext) -> Result<(), ServiceError> {
		Ok(())
	}
}

/// Factory producing a fresh `Probe` per consumer and counting both
/// callback directions.
pub(crate) struct CountingFactory {
	pub created: AtomicUsize,
	pub released: AtomicUsize,
	pub released_for: Mutex<Vec<String>>,
}

impl CountingFactory {
	pub(crate) fn new() -> Arc<Self> {
		Arc::new(Self {
			created: AtomicUsize::new(0),
			released: AtomicUsize::new(0),
			released_for: Mutex::new(Vec::new()),
		})
	}
}

impl ServiceFactory for CountingFactory {
	fn get_service(&self, _module: &Module, _registration: &ServiceRegistration) -> Result<InterfaceMap, ServiceError> {
		self.created.fetch_add(1, Ordering::SeqCst);
		Ok(InterfaceMap::of::<dyn Device>(Arc::new(Probe("scoped"))))
	}

	fn unget_service(&self, module: &Module, _registration: &ServiceRegistration, _service: &InterfaceMap) {
		self.released.fetch_add(1, Ordering::SeqCst);
		self.released_for.lock().push(module.name().to_string());
	}
}

pub(crate) fn probe_service(kind: &'static str) -> InterfaceMap {
	InterfaceMap::of::<dyn Device>(Arc::new(Probe(kind)))
}

pub(crate) fn ranked(rank: i64) -> Properties {
	Properties::new().with(crate::core::keys::SERVICE_RANKING, rank)
}
