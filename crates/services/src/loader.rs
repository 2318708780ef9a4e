//! Shared-library module loading.
//!
//! A loadable library exports a single entry point (see
//! [`export_module!`](crate::export_module)) returning the module's
//! activator. All registration still happens inside the activator's `load`,
//! never at library-initializer time. Loaded libraries stay mapped until the
//! framework is dropped: unloading a module revokes its services, but code
//! that published `Arc`s must outlive every clone of them.

use std::ffi::OsStr;
use std::path::{Path, PathBuf};

use libloading::{Library, Symbol};
use thiserror::Error;

use crate::core::{ModuleId, ServiceError};
use crate::framework::Framework;
use crate::module::ModuleActivator;

/// Symbol every loadable module exports.
pub const MODULE_ENTRY_SYMBOL: &[u8] = b"quay_module_entry\0";

/// Signature of the exported entry point. The returned pointer is a
/// `Box<Box<dyn ModuleActivator>>` in raw form; [`export_module!`]
/// generates a conforming definition.
pub type ModuleEntry = unsafe extern "C" fn() -> *mut core::ffi::c_void;

/// Defines the entry point [`Framework::install_library`] resolves, from any
/// expression producing a [`ModuleActivator`](crate::ModuleActivator).
#[macro_export]
macro_rules! export_module {
	($activator:expr) => {
		#[unsafe(no_mangle)]
		pub extern "C" fn quay_module_entry() -> *mut ::core::ffi::c_void {
			let activator: Box<dyn $crate::ModuleActivator> = Box::new($activator);
			Box::into_raw(Box::new(activator)) as *mut ::core::ffi::c_void
		}
	};
}

/// Why a library failed to become a module.
#[derive(Debug, Error)]
pub enum LoadError {
	#[error("failed to load library {path}: {source}")]
	Library {
		path: PathBuf,
		#[source]
		source: libloading::Error,
	},
	#[error("{path} does not export `quay_module_entry`")]
	MissingEntry { path: PathBuf },
	#[error("module entry of {path} returned a null activator")]
	NullActivator { path: PathBuf },
	#[error(transparent)]
	Install(#[from] ServiceError),
}

impl Framework {
	/// Loads a shared library, resolves its entry point and installs the
	/// returned activator as a module named after the library file.
	pub fn install_library(&self, path: &Path) -> Result<ModuleId, LoadError> {
		let library = unsafe { Library::new(path) }.map_err(|source| LoadError::Library { path: path.to_path_buf(), source })?;
		let activator = {
			let entry: Symbol<'_, ModuleEntry> = unsafe { library.get(MODULE_ENTRY_SYMBOL) }
				.map_err(|_| LoadError::MissingEntry { path: path.to_path_buf() })?;
			let raw = unsafe { entry() };
			if raw.is_null() {
				return Err(LoadError::NullActivator { path: path.to_path_buf() });
			}
			*unsafe { Box::from_raw(raw as *mut Box<dyn ModuleActivator>) }
		};
		// Keep the code mapped for the lifetime of the framework before any
		// of it can run.
		self.retain_library(library);
		let name = module_name(path);
		let id = self.install(&name, "0.0.0", activator)?;
		Ok(id)
	}

	/// Installs every dynamic library in `dir`, logging and skipping the
	/// ones that fail. Returns the modules that did load.
	pub fn install_directory(&self, dir: &Path) -> Vec<ModuleId> {
		let entries = match std::fs::read_dir(dir) {
			Ok(entries) => entries,
			Err(e) => {
				tracing::warn!(dir = %dir.display(), error = %e, "cannot scan module directory");
				return Vec::new();
			}
		};
		let mut loaded = Vec::new();
		for entry in entries.flatten() {
			let path = entry.path();
			if !is_dynamic_lib(&path) {
				continue;
			}
			match self.install_library(&path) {
				Ok(id) => loaded.push(id),
				Err(e) => tracing::warn!(path = %path.display(), error = %e, "skipping module library"),
			}
		}
		loaded
	}
}

fn is_dynamic_lib(path: &Path) -> bool {
	matches!(path.extension().and_then(OsStr::to_str), Some("so") | Some("dylib") | Some("dll"))
}

/// `libfoo_module.so` -> `foo_module`.
fn module_name(path: &Path) -> String {
	let stem = path.file_stem().and_then(OsStr::to_str).unwrap_or("module");
	stem.strip_prefix("lib").unwrap_or(stem).to_string()
}
