//! Application bootstrap for a quay framework.
//!
//! The launcher is a registry consumer, not part of the registry: it
//! installs the configured modules, resolves the application service named
//! by the launch configuration, and drives that application's exit-code
//! contract. Applications that want a restart return [`EXIT_RESTART`];
//! [`EXIT_RELAUNCH`] is passed through to the embedding process, which reads
//! the replacement command line from the [`PROP_RELAUNCH_ARGS`] framework
//! property.

pub mod config;
pub mod provisioning;

use std::sync::Arc;

use thiserror::Error;

use quay_services::loader::LoadError;
use quay_services::{Framework, ModuleContext, ServiceError, interface_id};

pub use config::{LaunchArgs, LaunchConfig};
pub use provisioning::{ProvisioningError, read_provisioning};

/// Normal termination.
pub const EXIT_OK: i32 = 0;
/// Run the application again inside the same process.
pub const EXIT_RESTART: i32 = 23;
/// Relaunch the process with the command line in [`PROP_RELAUNCH_ARGS`].
pub const EXIT_RELAUNCH: i32 = 24;

/// Registration property naming an application service.
pub const PROP_APPLICATION_ID: &str = "application.id";
/// Framework property an application sets before returning
/// [`EXIT_RELAUNCH`].
pub const PROP_RELAUNCH_ARGS: &str = "quay.relaunch.args";

/// The service the launcher resolves and runs.
///
/// Register it under this trait's interface id with a
/// [`PROP_APPLICATION_ID`] property; several applications may coexist and
/// the launch configuration picks one.
pub trait Application: Send + Sync {
	/// Runs the application to completion and returns its exit code.
	fn start(&self, ctx: &ModuleContext) -> i32;

	/// Asks a running application to wind down. The launcher itself never
	/// calls this; embedders with their own shutdown path do.
	fn stop(&self) {}
}

#[derive(Debug, Error)]
pub enum LaunchError {
	#[error("no application registered under id `{0}`")]
	ApplicationNotFound(String),
	#[error("launch configuration error: {0}")]
	Config(&'static str),
	#[error("cannot prepare storage directory {path}: {source}")]
	Storage {
		path: std::path::PathBuf,
		#[source]
		source: std::io::Error,
	},
	#[error(transparent)]
	Provisioning(#[from] ProvisioningError),
	#[error(transparent)]
	Load(#[from] LoadError),
	#[error(transparent)]
	Registry(#[from] ServiceError),
}

/// Installs the configured modules into `framework`, resolves the
/// application and runs it until it returns something other than
/// [`EXIT_RESTART`].
pub fn run(framework: &Framework, config: &LaunchConfig) -> Result<i32, LaunchError> {
	if let Some(dir) = &config.storage_dir {
		std::fs::create_dir_all(dir).map_err(|source| LaunchError::Storage { path: dir.clone(), source })?;
	}
	for library in &config.preload_libraries {
		framework.install_library(library)?;
	}
	if let Some(file) = &config.provisioning_file {
		for library in read_provisioning(file)? {
			framework.install_library(&library)?;
		}
	}
	for dir in &config.plugin_dirs {
		framework.install_directory(dir);
	}

	let id = config.application.as_deref().ok_or(LaunchError::Config("no application id configured"))?;
	let ctx = framework.context();
	let application = resolve_application(&ctx, id)?;
	loop {
		tracing::info!(application = id, "starting application");
		let code = application.start(&ctx);
		if code == EXIT_RESTART {
			tracing::info!(application = id, "application requested a restart");
			continue;
		}
		tracing::info!(application = id, code, "application finished");
		return Ok(code);
	}
}

/// Picks the best-ranked application service carrying the requested id.
fn resolve_application(ctx: &ModuleContext, id: &str) -> Result<Arc<dyn Application>, LaunchError> {
	let filter = format!("({PROP_APPLICATION_ID}={})", escape_filter_value(id));
	let mut references = ctx.get_service_references(interface_id::<dyn Application>(), Some(&filter))?;
	references.sort();
	let Some(reference) = references.into_iter().next() else {
		return Err(LaunchError::ApplicationNotFound(id.to_string()));
	};
	ctx.get_service::<dyn Application>(&reference)?.ok_or_else(|| LaunchError::ApplicationNotFound(id.to_string()))
}

/// Escapes the filter metacharacters so an application id is always matched
/// literally.
fn escape_filter_value(value: &str) -> String {
	let mut out = String::with_capacity(value.len());
	for ch in value.chars() {
		if matches!(ch, '(' | ')' | '*' | '\\') {
			out.push('\\');
		}
		out.push(ch);
	}
	out
}

/// Installs the process-wide tracing subscriber, honoring `RUST_LOG`.
pub fn init_logging() {
	use tracing_subscriber::EnvFilter;
	tracing_subscriber::fmt().with_env_filter(EnvFilter::from_default_env()).init();
}
