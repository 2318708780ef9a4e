use crate::core::{InterfaceMap, ServiceError};
use crate::module::Module;
use crate::registration::ServiceRegistration;

/// Alternate publication mode: instead of one shared object, the factory is
/// asked for a fresh [`InterfaceMap`] the first time each consuming module
/// resolves the registration, and is told when that module fully releases it.
///
/// The framework serializes `get_service` per (registration, consumer) pair
/// and caches the result, so a conforming factory sees exactly one
/// `get_service` / `unget_service` round per consumer epoch. The returned map
/// must contain an entry for every interface id the registration declared;
/// anything less is a contract violation surfaced to the resolving caller.
pub trait ServiceFactory: Send + Sync {
	/// Produces the service objects scoped to `module`.
	///
	/// Errors are surfaced to the single caller that triggered creation;
	/// nothing is cached and the registration stays live.
	fn get_service(&self, module: &Module, registration: &ServiceRegistration) -> Result<InterfaceMap, ServiceError>;

	/// Called exactly once when `module` drops its last use of the cached
	/// objects, or forcibly when the registration is revoked while cached.
	fn unget_service(&self, module: &Module, registration: &ServiceRegistration, service: &InterfaceMap);
}
