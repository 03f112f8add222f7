//! Node-local identity and datastore location.
//!
//! These are read once at process start from environment variables outside
//! the CNI contract proper, and threaded explicitly into the orchestrator and
//! datastore adapter from then on — never read again deeper in the call
//! stack.

use std::env;

use log::debug;
use url::Url;

const DEFAULT_ORCHESTRATOR_ID: &str = "fabric";
const DEFAULT_DATASTORE_URL: &str = "http://127.0.0.1:2379/fabric";

/// Process-wide identity and configuration, resolved once at startup.
#[derive(Clone, Debug)]
pub struct Settings {
	/// This host's identity, used as the `hostname` component of the
	/// Endpoint key.
	pub hostname: String,

	/// The orchestrator identity, used as the `orchestrator_id` component of
	/// the Endpoint key.
	pub orchestrator_id: String,

	/// Base URL of the HTTP+JSON datastore.
	pub datastore_url: Url,
}

impl Settings {
	/// Resolve settings from the environment, falling back to defaults.
	pub fn from_env() -> Self {
		let hostname = env::var("FABRIC_HOSTNAME").unwrap_or_else(|_| {
			hostname::get()
				.ok()
				.and_then(|h| h.into_string().ok())
				.unwrap_or_else(|| "localhost".into())
		});

		let orchestrator_id =
			env::var("FABRIC_ORCHESTRATOR_ID").unwrap_or_else(|_| DEFAULT_ORCHESTRATOR_ID.into());

		let datastore_url = env::var("FABRIC_DATASTORE_URL")
			.ok()
			.and_then(|v| Url::parse(&v).ok())
			.unwrap_or_else(|| Url::parse(DEFAULT_DATASTORE_URL).unwrap());

		debug!(
			"settings: hostname={} orchestrator_id={} datastore_url={}",
			hostname, orchestrator_id, datastore_url
		);

		Self {
			hostname,
			orchestrator_id,
			datastore_url,
		}
	}
}
