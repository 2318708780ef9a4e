use thiserror::Error;

use crate::filter::FilterError;

/// Errors produced by registry operations.
///
/// Lookup misses are not errors; they surface as `None`/empty results.
#[derive(Error, Debug, Clone)]
pub enum ServiceError {
	/// Malformed registration input, such as an empty interface map.
	#[error("invalid argument: {0}")]
	InvalidArgument(String),
	/// Operation on an already-unregistered registration or a context whose
	/// module has unloaded. The registry state is unchanged.
	#[error("illegal state: {0}")]
	IllegalState(&'static str),
	/// Malformed LDAP filter, reported at query or subscription time.
	#[error(transparent)]
	FilterSyntax(#[from] FilterError),
	/// A service factory returned an object set missing a declared interface.
	#[error("service factory for {module} returned no object for interface `{interface}`")]
	FactoryContract {
		module: String,
		interface: String,
	},
	/// Failure raised by a service factory itself; surfaced to the single
	/// caller, the registration stays live.
	#[error("{0}")]
	Other(String),
}
