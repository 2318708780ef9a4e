use std::sync::Arc;

use crate::context::ModuleContext;
use crate::core::{ModuleId, ServiceError};

/// Identity of a loadable unit: id, symbolic name and version.
///
/// This is a snapshot value; whether the module is currently loaded is a
/// property of the framework, not of this handle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Module {
	id: ModuleId,
	name: Arc<str>,
	version: Arc<str>,
}

impl Module {
	pub(crate) fn new(id: ModuleId, name: &str, version: &str) -> Self {
		Self { id, name: Arc::from(name), version: Arc::from(version) }
	}

	pub fn id(&self) -> ModuleId {
		self.id
	}

	pub fn name(&self) -> &str {
		&self.name
	}

	pub fn version(&self) -> &str {
		&self.version
	}
}

impl core::fmt::Display for Module {
	fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
		write!(f, "{} {}", self.name, self.version)
	}
}

/// Load state of a module.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModuleState {
	Loaded,
	Unloaded,
}

/// Explicit entry points of a module.
///
/// All service registration happens inside [`load`](Self::load), against the
/// context the framework hands in; modules never register from static
/// initializers, so the registry cannot observe a registration before the
/// owning module's context exists.
pub trait ModuleActivator: Send {
	/// Called while the module is being installed. Registrations made here
	/// are visible to other modules as soon as each `register_*` call
	/// returns. An error aborts the install and revokes anything already
	/// registered.
	fn load(&mut self, ctx: &ModuleContext) -> Result<(), ServiceError>;

	/// Called while the module is being uninstalled, before the framework
	/// revokes the module's remaining registrations. Errors are logged and
	/// do not stop the teardown.
	fn unload(&mut self, ctx: &ModuleContext) -> Result<(), ServiceError> {
		let _ = ctx;
		Ok(())
	}
}
