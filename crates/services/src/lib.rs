//! Module and service registry runtime.
//!
//! Independently loadable units ("modules") publish capabilities
//! ("services") under one or more interface-id keys; consumers look them up
//! by id or by LDAP filter, resolve references into objects, and subscribe
//! to registration and module lifecycle events. The framework owns all
//! bookkeeping: monotonic ids, rank-ordered lookup, per-consumer scoping of
//! factory-produced objects, and synchronous in-order event delivery.
//!
//! ```
//! use std::sync::Arc;
//! use quay_services::{Framework, InterfaceMap, Properties};
//!
//! trait Codec: Send + Sync {
//! 	fn name(&self) -> &'static str;
//! }
//!
//! struct Nrrd;
//! impl Codec for Nrrd {
//! 	fn name(&self) -> &'static str {
//! 		"nrrd"
//! 	}
//! }
//!
//! let framework = Framework::new();
//! let ctx = framework.context();
//! ctx.register_service(
//! 	InterfaceMap::of::<dyn Codec>(Arc::new(Nrrd)),
//! 	Properties::new().with("format", "nrrd"),
//! )
//! .unwrap();
//!
//! let reference = ctx.get_service_reference_for::<dyn Codec>().unwrap().unwrap();
//! let codec = ctx.get_service::<dyn Codec>(&reference).unwrap().unwrap();
//! assert_eq!(codec.name(), "nrrd");
//! ```

pub mod context;
pub mod core;
pub mod events;
pub mod factory;
pub mod filter;
pub mod framework;
#[cfg(feature = "loader")]
pub mod loader;
pub mod module;
pub mod registration;

pub use context::ModuleContext;
pub use crate::core::{InterfaceMap, ModuleId, PropValue, Properties, ServiceError, ServiceId, interface_id, keys};
pub use events::{ListenerToken, ModuleEvent, ModuleEventKind, ServiceEvent, ServiceEventKind};
pub use factory::ServiceFactory;
pub use filter::{Filter, FilterError};
pub use framework::Framework;
#[cfg(feature = "loader")]
pub use loader::{LoadError, MODULE_ENTRY_SYMBOL, ModuleEntry};
pub use module::{Module, ModuleActivator, ModuleState};
pub use registration::{ServiceReference, ServiceRegistration};

#[cfg(test)]
mod tests;
