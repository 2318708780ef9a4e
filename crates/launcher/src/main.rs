use clap::Parser;

use quay_launcher::{EXIT_RELAUNCH, LaunchArgs, LaunchConfig, PROP_RELAUNCH_ARGS};
use quay_services::Framework;

fn main() {
	let args = LaunchArgs::parse();
	quay_launcher::init_logging();

	let framework = Framework::new();
	let config = LaunchConfig::from(args);
	match quay_launcher::run(&framework, &config) {
		Ok(code) => {
			if code == EXIT_RELAUNCH {
				match framework.property(PROP_RELAUNCH_ARGS) {
					Some(relaunch) => tracing::info!(args = %relaunch, "relaunch requested"),
					None => tracing::warn!("relaunch requested without {PROP_RELAUNCH_ARGS} set"),
				}
			}
			std::process::exit(code);
		}
		Err(e) => {
			tracing::error!(error = %e, "launch failed");
			std::process::exit(1);
		}
	}
}
