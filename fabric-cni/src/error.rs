//! The plugin's own error taxonomy, layered over the CNI protocol errors.

use cni_plugin::error::CniError;
use semver::Version;
use serde_json::Value;
use thiserror::Error;

use cni_plugin::reply::ErrorReply;

/// All errors that can surface from this plugin.
///
/// Codes 1-99 are reserved for the CNI protocol layer (see
/// [`CniError::into_reply`]); this plugin's own kinds live in the 100+ range.
#[derive(Debug, Error)]
pub enum AppError {
	/// Anything from the CNI protocol layer: malformed env, malformed JSON,
	/// unsupported CNI version.
	#[error(transparent)]
	Cni(#[from] CniError),

	/// A required configuration field was missing or malformed.
	#[error("{field}: expected {expected}, got: {value:?}")]
	ConfigInvalid {
		/// the field path
		field: &'static str,
		/// what was expected
		expected: &'static str,
		/// the offending value
		value: Value,
	},

	/// No executable matching `ipam.type` was found on `CNI_PATH`.
	#[error("no IPAM plugin named {0:?} found on CNI_PATH")]
	IPAMNotFound(String),

	/// The IPAM child exited non-zero, or its output could not be parsed.
	#[error("IPAM plugin {plugin}: {details}")]
	IPAMError {
		/// the IPAM plugin binary name
		plugin: String,
		/// the child's exit code, when one was observed
		code: Option<i32>,
		/// a human-readable description of what went wrong
		details: String,
	},

	/// The datastore rejected the allocated address family.
	#[error("datastore does not support this address family: {0}")]
	AddressFamilyUnsupported(String),

	/// The datastore is unreachable or returned an unexpected error.
	#[error("datastore unavailable: {0}")]
	DatastoreUnavailable(String),

	/// The policy driver rejected the network name.
	#[error("invalid network name: {0:?}, must match [A-Za-z0-9._-]+")]
	InvalidNetworkName(String),

	/// A DELETE found more than one endpoint for the workload key.
	#[error("ambiguous endpoint for workload {0:?}: more than one match")]
	AmbiguousEndpoint(String),

	/// Catch-all for an otherwise-unhandled failure.
	///
	/// Plugin panics are converted to this via the panic hook installed in
	/// [`crate::install_panic_hook`] before the process aborts.
	#[error("unexpected failure: {0}")]
	UnexpectedPanic(String),
}

impl AppError {
	/// Convert into an [`ErrorReply`], picking a stable numeric code per kind.
	pub fn into_reply(self, cni_version: Version) -> ErrorReply<'static> {
		match self {
			Self::Cni(e) => e.into_reply(cni_version),
			e @ Self::ConfigInvalid { .. } => ErrorReply {
				cni_version,
				code: 107,
				msg: "Invalid configuration",
				details: e.to_string(),
			},
			e @ Self::IPAMNotFound(_) => ErrorReply {
				cni_version,
				code: 120,
				msg: "IPAM plugin not found",
				details: e.to_string(),
			},
			e @ Self::IPAMError { .. } => ErrorReply {
				cni_version,
				code: 121,
				msg: "IPAM plugin failed",
				details: e.to_string(),
			},
			e @ Self::AddressFamilyUnsupported(_) => ErrorReply {
				cni_version,
				code: 122,
				msg: "Address family unsupported by datastore",
				details: e.to_string(),
			},
			e @ Self::DatastoreUnavailable(_) => ErrorReply {
				cni_version,
				code: 123,
				msg: "Datastore unavailable",
				details: e.to_string(),
			},
			e @ Self::InvalidNetworkName(_) => ErrorReply {
				cni_version,
				code: 124,
				msg: "Invalid network name",
				details: e.to_string(),
			},
			e @ Self::AmbiguousEndpoint(_) => ErrorReply {
				cni_version,
				code: 125,
				msg: "Ambiguous endpoint",
				details: e.to_string(),
			},
			e @ Self::UnexpectedPanic(_) => ErrorReply {
				cni_version,
				code: 199,
				msg: "Unexpected failure",
				details: e.to_string(),
			},
		}
	}

	/// The process exit code for this error.
	///
	/// Per §4.8/§6, every failure exits `1`, with one exception: an
	/// IPAM-originated failure whose child reported its own exit code
	/// propagates that code instead, so a caller scripting against this
	/// plugin sees the same status the IPAM plugin itself reported. This is
	/// deliberately independent of the JSON reply's own `code` field (the
	/// 100+ diagnostic code), which is never used as a process exit status.
	/// Callers must call this before consuming `self` with
	/// [`into_reply`](Self::into_reply).
	pub fn exit_code(&self) -> i32 {
		match self {
			Self::IPAMError { code: Some(c), .. } => *c,
			_ => 1,
		}
	}
}

/// Convenience alias used throughout the plugin.
pub type AppResult<T> = Result<T, AppError>;
