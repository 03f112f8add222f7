//! Container-engine probe (§4.5): reports whether a given container uses
//! host networking.
//!
//! The mechanism of the Docker-aware variant's query is explicitly out of
//! scope for this spec (the implementer treats Docker as a collaborator), so
//! this queries the local Docker daemon the way the corpus's own Docker
//! runtimes do, through `bollard` rather than talking to the socket directly.

use async_trait::async_trait;
use bollard::Docker;
use log::{debug, warn};

use crate::error::AppResult;

/// Capability to probe whether a container is running with host networking.
#[async_trait]
pub trait ContainerEngine: Send + Sync {
	/// Does the container identified by `container_id` use host networking?
	async fn uses_host_networking(&self, container_id: &str) -> AppResult<bool>;
}

/// Always reports that the container is not host-networked.
///
/// Selected when the invocation carries no hints of a container engine we
/// know how to query (§4.7).
pub struct DefaultEngine;

#[async_trait]
impl ContainerEngine for DefaultEngine {
	async fn uses_host_networking(&self, _container_id: &str) -> AppResult<bool> {
		Ok(false)
	}
}

/// Queries a local Docker daemon's inspect endpoint.
///
/// Selected when `K8S_POD_NAME` is present in `CNI_ARGS` (§4.7, §4.5):
/// kubelet's CRI shim runs containers whose networking it sets up itself, so
/// this plugin must recognize and skip them rather than double-provision.
#[derive(Default)]
pub struct DockerEngine;

#[async_trait]
impl ContainerEngine for DockerEngine {
	async fn uses_host_networking(&self, container_id: &str) -> AppResult<bool> {
		debug!("probing docker for {}", container_id);
		let docker = match Docker::connect_with_unix_defaults() {
			Ok(docker) => docker,
			Err(err) => {
				// Docker isn't available or isn't the engine in use; treat as
				// "not host networking" rather than failing the whole plugin.
				warn!("could not connect to docker: {}", err);
				return Ok(false);
			}
		};

		let inspect = match docker.inspect_container(container_id, None).await {
			Ok(inspect) => inspect,
			Err(err) => {
				warn!("could not inspect container {} via docker: {}", container_id, err);
				return Ok(false);
			}
		};

		Ok(inspect
			.host_config
			.and_then(|hc| hc.network_mode)
			.map(|mode| mode == "host")
			.unwrap_or(false))
	}
}
