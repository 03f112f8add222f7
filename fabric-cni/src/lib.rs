//! Library half of the fabric-cni plugin: `main.rs` is a thin binary that
//! wires these modules together behind the CNI protocol handled by the
//! `cni-plugin` crate.

use log::error;

pub mod args;
pub mod datastore;
pub mod engine;
pub mod error;
pub mod ipam;
pub mod orchestrator;
pub mod policy;
pub mod settings;
pub mod veth;

/// Install a panic hook that logs the panic payload, location and a captured
/// backtrace through the standard logger before the default hook runs.
///
/// This doesn't change what happens to the process: a genuine panic still
/// unwinds (or aborts) and exits with Rust's own panic status, it's only
/// additionally captured in the log file alongside everything else (see the
/// `UnexpectedPanic` kind in [`error::AppError`]).
pub fn install_panic_hook() {
	let default_hook = std::panic::take_hook();
	std::panic::set_hook(Box::new(move |info| {
		let backtrace = std::backtrace::Backtrace::force_capture();
		error!("panic: {}\n{:?}", info, backtrace);
		default_hook(info);
	}));
}
