//! Line-oriented provisioning files.
//!
//! One directive per line: `install <path>`. Blank lines and `#` comments
//! are ignored. Anything else is an error naming the offending line.

use std::path::{Path, PathBuf};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProvisioningError {
	#[error("cannot read provisioning file {path}: {source}")]
	Io {
		path: PathBuf,
		#[source]
		source: std::io::Error,
	},
	#[error("{path}:{line}: unrecognized provisioning directive `{directive}`")]
	UnknownDirective {
		path: PathBuf,
		line: usize,
		directive: String,
	},
}

/// Reads the module libraries a provisioning file names, in file order.
pub fn read_provisioning(path: &Path) -> Result<Vec<PathBuf>, ProvisioningError> {
	let text = std::fs::read_to_string(path).map_err(|source| ProvisioningError::Io { path: path.to_path_buf(), source })?;
	let mut libraries = Vec::new();
	for (index, raw) in text.lines().enumerate() {
		let line = raw.trim();
		if line.is_empty() || line.starts_with('#') {
			continue;
		}
		match line.split_once(char::is_whitespace) {
			Some(("install", rest)) if !rest.trim().is_empty() => libraries.push(PathBuf::from(rest.trim())),
			_ => {
				return Err(ProvisioningError::UnknownDirective {
					path: path.to_path_buf(),
					line: index + 1,
					directive: line.to_string(),
				});
			}
		}
	}
	Ok(libraries)
}
