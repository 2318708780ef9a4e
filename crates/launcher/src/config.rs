//! Launch configuration: a key/string map the registry core never looks at.

use std::collections::HashMap;
use std::path::PathBuf;

/// Configuration keys accepted in map form.
pub mod keys {
	pub const STORAGE_DIR: &str = "storage.dir";
	/// Colon- or comma-delimited directory list.
	pub const PLUGIN_DIRS: &str = "plugin.dirs";
	pub const PROVISIONING: &str = "provisioning.file";
	/// Semicolon- or colon-delimited library list.
	pub const PRELOAD: &str = "preload.libraries";
	pub const APPLICATION: &str = "application.id";
}

#[derive(Debug, Clone, Default)]
pub struct LaunchConfig {
	/// Working-data directory; created on launch when configured.
	pub storage_dir: Option<PathBuf>,
	/// Directories scanned for module libraries.
	pub plugin_dirs: Vec<PathBuf>,
	/// Provisioning file naming modules to install before the scan.
	pub provisioning_file: Option<PathBuf>,
	/// Libraries installed before anything else.
	pub preload_libraries: Vec<PathBuf>,
	/// Id of the application service to run.
	pub application: Option<String>,
}

impl LaunchConfig {
	/// Builds a configuration from an opaque key/string map, the form the
	/// embedding process hands through.
	pub fn from_map(map: &HashMap<String, String>) -> Self {
		Self {
			storage_dir: map.get(keys::STORAGE_DIR).map(PathBuf::from),
			plugin_dirs: map.get(keys::PLUGIN_DIRS).map(|s| split_paths(s, &[':', ','])).unwrap_or_default(),
			provisioning_file: map.get(keys::PROVISIONING).map(PathBuf::from),
			preload_libraries: map.get(keys::PRELOAD).map(|s| split_paths(s, &[';', ':'])).unwrap_or_default(),
			application: map.get(keys::APPLICATION).cloned(),
		}
	}
}

fn split_paths(list: &str, separators: &[char]) -> Vec<PathBuf> {
	list.split(separators).map(str::trim).filter(|s| !s.is_empty()).map(PathBuf::from).collect()
}

/// Command-line form of [`LaunchConfig`]; every flag can also come from the
/// environment.
#[derive(Debug, clap::Parser)]
#[command(name = "quay", version, about = "Loads modules and runs the configured application service")]
pub struct LaunchArgs {
	/// Id of the application service to run.
	#[arg(long, env = "QUAY_APPLICATION")]
	pub application: Option<String>,

	/// Colon- or comma-delimited plugin directory list.
	#[arg(long, env = "QUAY_PLUGIN_DIRS", value_name = "DIRS")]
	pub plugin_dirs: Option<String>,

	/// Directory for application working data.
	#[arg(long, env = "QUAY_STORAGE_DIR", value_name = "DIR")]
	pub storage_dir: Option<PathBuf>,

	/// Provisioning file listing modules to install.
	#[arg(long, env = "QUAY_PROVISIONING", value_name = "FILE")]
	pub provisioning: Option<PathBuf>,

	/// Semicolon- or colon-delimited libraries to install first.
	#[arg(long, env = "QUAY_PRELOAD", value_name = "LIBS")]
	pub preload: Option<String>,
}

impl From<LaunchArgs> for LaunchConfig {
	fn from(args: LaunchArgs) -> Self {
		Self {
			storage_dir: args.storage_dir,
			plugin_dirs: args.plugin_dirs.as_deref().map(|s| split_paths(s, &[':', ','])).unwrap_or_default(),
			provisioning_file: args.provisioning,
			preload_libraries: args.preload.as_deref().map(|s| split_paths(s, &[';', ':'])).unwrap_or_default(),
			application: args.application,
		}
	}
}
