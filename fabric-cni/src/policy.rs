//! Policy driver (§4.6): attaches and detaches the security profile a
//! workload's endpoint is subject to.

use async_trait::async_trait;
use regex::Regex;

use crate::datastore::FabricStore;
use crate::error::{AppError, AppResult};

/// Capability to set and remove the profile assigned to a workload.
#[async_trait]
pub trait PolicyDriver: Send + Sync {
	/// Ensure the driver's profile is attached to `workload_id`.
	async fn set_profile(&self, store: &dyn FabricStore, workload_id: &str) -> AppResult<()>;

	/// Detach the driver's profile from `workload_id`.
	///
	/// Per §7, failures here are logged and ignored on the DELETE path; this
	/// method still returns a `Result` so the orchestrator can choose to log
	/// it, but callers on DELETE must not propagate the error.
	async fn remove_profile(&self, store: &dyn FabricStore, workload_id: &str) -> AppResult<()>;
}

const NAME_PATTERN: &str = r"^[A-Za-z0-9._-]+$";

/// One profile per network, named after the `NetworkConfig.name` field.
pub struct PerNetwork {
	network_name: String,
}

impl PerNetwork {
	/// Construct a driver for `network_name`, validating it against the
	/// naming rule in §4.6.
	pub fn new(network_name: &str) -> AppResult<Self> {
		// UNWRAP: NAME_PATTERN is a compile-time constant and known to be valid.
		let re = Regex::new(NAME_PATTERN).unwrap();
		if re.is_match(network_name) {
			Ok(Self {
				network_name: network_name.to_string(),
			})
		} else {
			Err(AppError::InvalidNetworkName(network_name.to_string()))
		}
	}
}

#[async_trait]
impl PolicyDriver for PerNetwork {
	async fn set_profile(&self, store: &dyn FabricStore, workload_id: &str) -> AppResult<()> {
		store.attach_profile(&self.network_name, workload_id).await
	}

	async fn remove_profile(&self, store: &dyn FabricStore, workload_id: &str) -> AppResult<()> {
		store.detach_profile(&self.network_name, workload_id).await
	}
}

/// No-op driver selected when `K8S_POD_NAME` is present in `CNI_ARGS`: an
/// out-of-band controller reconciles profiles instead.
pub struct OrchestratorDefault;

#[async_trait]
impl PolicyDriver for OrchestratorDefault {
	async fn set_profile(&self, _store: &dyn FabricStore, _workload_id: &str) -> AppResult<()> {
		Ok(())
	}

	async fn remove_profile(&self, _store: &dyn FabricStore, _workload_id: &str) -> AppResult<()> {
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn valid_name_constructs() {
		assert!(PerNetwork::new("net1").is_ok());
		assert!(PerNetwork::new("net_1.prod-east").is_ok());
	}

	#[test]
	fn name_with_slash_is_rejected() {
		match PerNetwork::new("net/1") {
			Err(AppError::InvalidNetworkName(n)) => assert_eq!(n, "net/1"),
			Ok(_) => panic!("expected InvalidNetworkName, got Ok"),
			Err(other) => panic!("expected InvalidNetworkName, got {:?}", other),
		}
	}
}
