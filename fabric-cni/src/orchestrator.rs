//! The orchestrator (§4.7): the ADD/DELETE state machine that composes the
//! IPAM client, datastore adapter, veth provisioner, container-engine probe
//! and policy driver, with the failure and compensation rules from the
//! tables in §4.7.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use cni_plugin::config::NetworkConfig;
use log::{debug, error, info, warn};
use serde_json::Value;

use crate::datastore::{EndpointLookup, FabricStore};
use crate::engine::ContainerEngine;
use crate::error::{AppError, AppResult};
use crate::ipam::IpamClient;
use crate::policy::PolicyDriver;
use crate::settings::Settings;
use crate::veth::VethProvisioner;

/// The result of a successful ADD.
pub enum AddOutcome {
	/// The container uses host networking; nothing was provisioned.
	HostNetworking,

	/// The container was provisioned; this is the IPAM result document to
	/// forward verbatim on standard output (§4.8).
	Provisioned(Value),
}

/// Everything the ADD/DELETE paths need that isn't already bundled in the
/// [`Orchestrator`] itself.
pub struct Invocation<'a> {
	/// The container ID, as provided by the runtime.
	pub container_id: &'a str,
	/// The interface name to create inside the namespace.
	pub ifname: &'a str,
	/// The container's namespace path. Absent on DEL is legal per §3.
	pub netns: Option<&'a Path>,
	/// Search path for locating the IPAM executable.
	pub search_path: &'a [PathBuf],
	/// The input network configuration.
	pub config: &'a NetworkConfig,
	/// The environment to forward to the IPAM child (§4.2: "the same
	/// environment the plugin received"), before `CNI_COMMAND` is overridden
	/// per call.
	pub env: &'a HashMap<String, String>,
	/// The container-engine probe selected for this invocation.
	pub engine: &'a dyn ContainerEngine,
	/// The policy driver selected for this invocation.
	pub policy: &'a dyn PolicyDriver,
}

/// Composes the component capabilities and runs the state machine.
pub struct Orchestrator {
	settings: Settings,
	store: Box<dyn FabricStore>,
	veth: Box<dyn VethProvisioner>,
	ipam: Box<dyn IpamClient>,
}

impl Orchestrator {
	/// Build an orchestrator over the given datastore, veth provisioner and
	/// IPAM client.
	pub fn new(
		settings: Settings,
		store: Box<dyn FabricStore>,
		veth: Box<dyn VethProvisioner>,
		ipam: Box<dyn IpamClient>,
	) -> Self {
		Self {
			settings,
			store,
			veth,
			ipam,
		}
	}

	/// Run the ADD state machine (§4.7).
	pub async fn add(&self, inv: &Invocation<'_>) -> AppResult<AddOutcome> {
		// Step 0: Start.
		if inv.engine.uses_host_networking(inv.container_id).await? {
			info!("container {} uses host networking, skipping", inv.container_id);
			return Ok(AddOutcome::HostNetworking);
		}

		let netns = inv
			.netns
			.ok_or_else(|| AppError::ConfigInvalid {
				field: "CNI_NETNS",
				expected: "a path",
				value: Value::Null,
			})?;

		// Step 1: IPAssigned. Nothing external is allocated if this fails.
		debug!("state=IPAssigned: invoking IPAM plugin");
		let (raw_result, cidr) = self.ipam.assign(inv.search_path, inv.env, inv.config).await?;

		// Step 2: EndpointCreated.
		debug!("state=EndpointCreated");
		let mut endpoint = match self
			.store
			.create_endpoint(
				&self.settings.hostname,
				&self.settings.orchestrator_id,
				inv.container_id,
				&[cidr],
			)
			.await
		{
			Ok(endpoint) => endpoint,
			Err(err) => {
				error!("failed to create endpoint, releasing IPAM allocation: {}", err);
				self.ipam.release(inv.search_path, inv.env, inv.config).await;
				return Err(err);
			}
		};

		// Step 3: VethProvisioned.
		debug!("state=VethProvisioned: provisioning {} in {:?}", endpoint.name, netns);
		match self.veth.provision(netns, &endpoint.name, inv.ifname, cidr).await {
			Ok(mac) => {
				endpoint.mac = Some(mac);
				if let Err(err) = self
					.store
					.set_endpoint(&self.settings.hostname, &self.settings.orchestrator_id, inv.container_id, &endpoint)
					.await
				{
					error!("failed to record veth mac, compensating: {}", err);
					self.compensate_add(inv, &endpoint.name).await;
					return Err(err);
				}
			}
			Err(err) => {
				error!("failed to provision veth, compensating: {}", err);
				self.compensate_add(inv, &endpoint.name).await;
				return Err(err);
			}
		}

		// Step 4: ProfileSet.
		debug!("state=ProfileSet");
		if let Err(err) = inv.policy.set_profile(self.store.as_ref(), inv.container_id).await {
			error!("failed to set profile, compensating: {}", err);
			self.compensate_add(inv, &endpoint.name).await;
			return Err(err);
		}

		// Step 5: Done.
		info!("ADD complete for {}", inv.container_id);
		Ok(AddOutcome::Provisioned(raw_result))
	}

	/// Reverse-order compensation for an ADD that failed at or after step 3
	/// (§4.7): remove_veth, remove_workload, IPAM release.
	async fn compensate_add(&self, inv: &Invocation<'_>, endpoint_name: &str) {
		if let Err(err) = self.veth.remove(endpoint_name).await {
			warn!("compensation: failed to remove veth {}: {}", endpoint_name, err);
		}

		if let Err(err) = self
			.store
			.remove_workload(&self.settings.hostname, &self.settings.orchestrator_id, inv.container_id)
			.await
		{
			warn!("compensation: failed to remove endpoint: {}", err);
		}

		self.ipam.release(inv.search_path, inv.env, inv.config).await;
	}

	/// Run the DELETE state machine (§4.7).
	///
	/// Tolerant by design: every non-catastrophic error is logged and
	/// ignored, so a partially-created container from a failed ADD can still
	/// be cleaned up.
	pub async fn del(&self, inv: &Invocation<'_>) -> AppResult<()> {
		// Step 0: Start. IPAM release failure is a logged warning, never fatal.
		self.ipam.release(inv.search_path, inv.env, inv.config).await;

		// Step 1: EndpointLookup.
		let endpoint = match self
			.store
			.get_endpoint(&self.settings.hostname, &self.settings.orchestrator_id, inv.container_id)
			.await?
		{
			EndpointLookup::Found(endpoint) => endpoint,
			EndpointLookup::NotFound => {
				info!("no endpoint for {}, nothing to delete", inv.container_id);
				return Ok(());
			}
		};

		// Step 2: VethRemoved. Idempotent; errors logged and ignored.
		if let Err(err) = self.veth.remove(&endpoint.name).await {
			warn!("failed to remove veth {}: {}", endpoint.name, err);
		}

		// Step 3: EndpointRemoved. NotFound is not an error here either.
		if let Err(err) = self
			.store
			.remove_workload(&self.settings.hostname, &self.settings.orchestrator_id, inv.container_id)
			.await
		{
			warn!("failed to remove endpoint: {}", err);
		}

		// Step 4: ProfileRemoved.
		if let Err(err) = inv.policy.remove_profile(self.store.as_ref(), inv.container_id).await {
			warn!("failed to remove profile: {}", err);
		}

		// Step 5: Done.
		info!("DELETE complete for {}", inv.container_id);
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use std::sync::{Arc, Mutex};

	use async_std::task::block_on;
	use async_trait::async_trait;
	use ipnetwork::IpNetwork;
	use serde_json::json;

	use crate::datastore::Endpoint;
	use crate::engine::ContainerEngine;
	use crate::ipam::IpamClient;
	use crate::policy::PolicyDriver;
	use crate::veth::VethProvisioner;
	use cni_plugin::macaddr::MacAddr;

	use super::*;

	type Log = Arc<Mutex<Vec<String>>>;

	fn test_config() -> NetworkConfig {
		NetworkConfig {
			cni_version: semver::Version::new(1, 0, 0),
			name: "net1".into(),
			plugin: "fabric".into(),
			args: HashMap::new(),
			ip_masq: false,
			ipam: None,
			dns: None,
			runtime: None,
			prev_result: None,
			specific: HashMap::new(),
		}
	}

	struct FakeIpam {
		log: Log,
		fail: bool,
	}

	#[async_trait]
	impl IpamClient for FakeIpam {
		async fn assign(
			&self,
			_search_path: &[PathBuf],
			_env: &HashMap<String, String>,
			_config: &NetworkConfig,
		) -> AppResult<(Value, IpNetwork)> {
			self.log.lock().unwrap().push("ipam.assign".into());
			if self.fail {
				return Err(AppError::IPAMError {
					plugin: "fake".into(),
					code: Some(2),
					details: "pool exhausted".into(),
				});
			}
			let cidr: IpNetwork = "10.0.0.5/24".parse().unwrap();
			Ok((json!({"ip4": {"ip": "10.0.0.5/24"}}), cidr))
		}

		async fn release(&self, _search_path: &[PathBuf], _env: &HashMap<String, String>, _config: &NetworkConfig) {
			self.log.lock().unwrap().push("ipam.release".into());
		}
	}

	struct FakeStore {
		log: Log,
		fail_create: bool,
		endpoint: Mutex<Option<Endpoint>>,
	}

	#[async_trait]
	impl FabricStore for FakeStore {
		async fn create_endpoint(
			&self,
			_hostname: &str,
			_orchestrator_id: &str,
			_workload_id: &str,
			cidrs: &[IpNetwork],
		) -> Result<Endpoint, AppError> {
			self.log.lock().unwrap().push("store.create_endpoint".into());
			if self.fail_create {
				return Err(AppError::AddressFamilyUnsupported(format!("{:?}", cidrs)));
			}
			let endpoint = Endpoint {
				name: "fabveth0".into(),
				mac: None,
				ip_addresses: cidrs.to_vec(),
			};
			*self.endpoint.lock().unwrap() = Some(endpoint.clone());
			Ok(endpoint)
		}

		async fn set_endpoint(
			&self,
			_hostname: &str,
			_orchestrator_id: &str,
			_workload_id: &str,
			endpoint: &Endpoint,
		) -> Result<(), AppError> {
			self.log.lock().unwrap().push("store.set_endpoint".into());
			*self.endpoint.lock().unwrap() = Some(endpoint.clone());
			Ok(())
		}

		async fn get_endpoint(
			&self,
			_hostname: &str,
			_orchestrator_id: &str,
			_workload_id: &str,
		) -> Result<EndpointLookup, AppError> {
			self.log.lock().unwrap().push("store.get_endpoint".into());
			match self.endpoint.lock().unwrap().clone() {
				Some(endpoint) => Ok(EndpointLookup::Found(endpoint)),
				None => Ok(EndpointLookup::NotFound),
			}
		}

		async fn remove_workload(
			&self,
			_hostname: &str,
			_orchestrator_id: &str,
			_workload_id: &str,
		) -> Result<bool, AppError> {
			self.log.lock().unwrap().push("store.remove_workload".into());
			Ok(self.endpoint.lock().unwrap().take().is_some())
		}

		async fn attach_profile(&self, _profile: &str, _workload_id: &str) -> Result<(), AppError> {
			self.log.lock().unwrap().push("store.attach_profile".into());
			Ok(())
		}

		async fn detach_profile(&self, _profile: &str, _workload_id: &str) -> Result<(), AppError> {
			self.log.lock().unwrap().push("store.detach_profile".into());
			Ok(())
		}
	}

	struct FakeVeth {
		log: Log,
		fail_provision: bool,
	}

	#[async_trait]
	impl VethProvisioner for FakeVeth {
		async fn provision(
			&self,
			_netns: &std::path::Path,
			_host_name: &str,
			_ifname: &str,
			_cidr: IpNetwork,
		) -> AppResult<MacAddr> {
			self.log.lock().unwrap().push("veth.provision".into());
			if self.fail_provision {
				return Err(AppError::DatastoreUnavailable("netlink: no such device".into()));
			}
			Ok(MacAddr::from(macaddr::MacAddr6::new(2, 0, 0, 0, 0, 1)))
		}

		async fn remove(&self, _host_name: &str) -> AppResult<()> {
			self.log.lock().unwrap().push("veth.remove".into());
			Ok(())
		}
	}

	struct FakeEngine {
		host_networking: bool,
	}

	#[async_trait]
	impl ContainerEngine for FakeEngine {
		async fn uses_host_networking(&self, _container_id: &str) -> AppResult<bool> {
			Ok(self.host_networking)
		}
	}

	struct FakePolicy {
		log: Log,
	}

	#[async_trait]
	impl PolicyDriver for FakePolicy {
		async fn set_profile(&self, _store: &dyn FabricStore, _workload_id: &str) -> AppResult<()> {
			self.log.lock().unwrap().push("policy.set_profile".into());
			Ok(())
		}

		async fn remove_profile(&self, _store: &dyn FabricStore, _workload_id: &str) -> AppResult<()> {
			self.log.lock().unwrap().push("policy.remove_profile".into());
			Ok(())
		}
	}

	fn settings() -> Settings {
		Settings {
			hostname: "host1".into(),
			orchestrator_id: "fabric".into(),
			datastore_url: "http://127.0.0.1:2379/fabric".parse().unwrap(),
		}
	}

	#[test]
	fn host_networking_add_skips_everything() {
		let log: Log = Arc::new(Mutex::new(Vec::new()));
		let orchestrator = Orchestrator::new(
			settings(),
			Box::new(FakeStore { log: log.clone(), fail_create: false, endpoint: Mutex::new(None) }),
			Box::new(FakeVeth { log: log.clone(), fail_provision: false }),
			Box::new(FakeIpam { log: log.clone(), fail: false }),
		);

		let config = test_config();
		let env = HashMap::new();
		let search_path: Vec<PathBuf> = Vec::new();
		let engine = FakeEngine { host_networking: true };
		let policy = FakePolicy { log: log.clone() };

		let inv = Invocation {
			container_id: "abc",
			ifname: "eth0",
			netns: Some(std::path::Path::new("/proc/1/ns/net")),
			search_path: &search_path,
			config: &config,
			env: &env,
			engine: &engine,
			policy: &policy,
		};

		let outcome = block_on(orchestrator.add(&inv)).expect("host-networked ADD should succeed trivially");
		assert!(matches!(outcome, AddOutcome::HostNetworking));
		assert!(log.lock().unwrap().is_empty(), "no collaborator should be touched");
	}

	#[test]
	fn happy_add_then_delete_round_trips() {
		let log: Log = Arc::new(Mutex::new(Vec::new()));
		let orchestrator = Orchestrator::new(
			settings(),
			Box::new(FakeStore { log: log.clone(), fail_create: false, endpoint: Mutex::new(None) }),
			Box::new(FakeVeth { log: log.clone(), fail_provision: false }),
			Box::new(FakeIpam { log: log.clone(), fail: false }),
		);

		let config = test_config();
		let env = HashMap::new();
		let search_path: Vec<PathBuf> = Vec::new();
		let engine = FakeEngine { host_networking: false };
		let policy = FakePolicy { log: log.clone() };

		let inv = Invocation {
			container_id: "abc",
			ifname: "eth0",
			netns: Some(std::path::Path::new("/proc/1/ns/net")),
			search_path: &search_path,
			config: &config,
			env: &env,
			engine: &engine,
			policy: &policy,
		};

		let outcome = block_on(orchestrator.add(&inv)).expect("ADD should succeed");
		assert!(matches!(outcome, AddOutcome::Provisioned(_)));
		assert_eq!(
			log.lock().unwrap().as_slice(),
			&[
				"ipam.assign",
				"store.create_endpoint",
				"veth.provision",
				"store.set_endpoint",
				"policy.set_profile",
			]
		);

		log.lock().unwrap().clear();
		block_on(orchestrator.del(&inv)).expect("DELETE should succeed");
		assert_eq!(
			log.lock().unwrap().as_slice(),
			&[
				"ipam.release",
				"store.get_endpoint",
				"veth.remove",
				"store.remove_workload",
				"policy.remove_profile",
			]
		);
	}

	#[test]
	fn veth_failure_on_add_compensates_in_reverse_order() {
		let log: Log = Arc::new(Mutex::new(Vec::new()));
		let orchestrator = Orchestrator::new(
			settings(),
			Box::new(FakeStore { log: log.clone(), fail_create: false, endpoint: Mutex::new(None) }),
			Box::new(FakeVeth { log: log.clone(), fail_provision: true }),
			Box::new(FakeIpam { log: log.clone(), fail: false }),
		);

		let config = test_config();
		let env = HashMap::new();
		let search_path: Vec<PathBuf> = Vec::new();
		let engine = FakeEngine { host_networking: false };
		let policy = FakePolicy { log: log.clone() };

		let inv = Invocation {
			container_id: "abc",
			ifname: "eth0",
			netns: Some(std::path::Path::new("/proc/1/ns/net")),
			search_path: &search_path,
			config: &config,
			env: &env,
			engine: &engine,
			policy: &policy,
		};

		let err = block_on(orchestrator.add(&inv)).expect_err("ADD should fail when veth provisioning fails");
		assert!(matches!(err, AppError::DatastoreUnavailable(_)));
		assert_eq!(
			log.lock().unwrap().as_slice(),
			&[
				"ipam.assign",
				"store.create_endpoint",
				"veth.provision",
				"veth.remove",
				"store.remove_workload",
				"ipam.release",
			]
		);
	}

	#[test]
	fn endpoint_create_failure_releases_ipam_only() {
		let log: Log = Arc::new(Mutex::new(Vec::new()));
		let orchestrator = Orchestrator::new(
			settings(),
			Box::new(FakeStore { log: log.clone(), fail_create: true, endpoint: Mutex::new(None) }),
			Box::new(FakeVeth { log: log.clone(), fail_provision: false }),
			Box::new(FakeIpam { log: log.clone(), fail: false }),
		);

		let config = test_config();
		let env = HashMap::new();
		let search_path: Vec<PathBuf> = Vec::new();
		let engine = FakeEngine { host_networking: false };
		let policy = FakePolicy { log: log.clone() };

		let inv = Invocation {
			container_id: "abc",
			ifname: "eth0",
			netns: Some(std::path::Path::new("/proc/1/ns/net")),
			search_path: &search_path,
			config: &config,
			env: &env,
			engine: &engine,
			policy: &policy,
		};

		let err = block_on(orchestrator.add(&inv)).expect_err("ADD should fail when endpoint creation fails");
		assert!(matches!(err, AppError::AddressFamilyUnsupported(_)));
		assert_eq!(
			log.lock().unwrap().as_slice(),
			&["ipam.assign", "store.create_endpoint", "ipam.release"],
			"a failure before veth provisioning must not touch veth or the profile driver"
		);
	}

	#[test]
	fn ipam_failure_on_add_touches_nothing_else() {
		let log: Log = Arc::new(Mutex::new(Vec::new()));
		let orchestrator = Orchestrator::new(
			settings(),
			Box::new(FakeStore { log: log.clone(), fail_create: false, endpoint: Mutex::new(None) }),
			Box::new(FakeVeth { log: log.clone(), fail_provision: false }),
			Box::new(FakeIpam { log: log.clone(), fail: true }),
		);

		let config = test_config();
		let env = HashMap::new();
		let search_path: Vec<PathBuf> = Vec::new();
		let engine = FakeEngine { host_networking: false };
		let policy = FakePolicy { log: log.clone() };

		let inv = Invocation {
			container_id: "abc",
			ifname: "eth0",
			netns: Some(std::path::Path::new("/proc/1/ns/net")),
			search_path: &search_path,
			config: &config,
			env: &env,
			engine: &engine,
			policy: &policy,
		};

		let err = block_on(orchestrator.add(&inv)).expect_err("ADD should fail when IPAM assignment fails");
		assert!(matches!(err, AppError::IPAMError { .. }));
		assert_eq!(
			log.lock().unwrap().as_slice(),
			&["ipam.assign"],
			"nothing is allocated yet, so nothing should be compensated"
		);
	}

	#[test]
	fn delete_on_unknown_container_is_a_noop() {
		let log: Log = Arc::new(Mutex::new(Vec::new()));
		let orchestrator = Orchestrator::new(
			settings(),
			Box::new(FakeStore { log: log.clone(), fail_create: false, endpoint: Mutex::new(None) }),
			Box::new(FakeVeth { log: log.clone(), fail_provision: false }),
			Box::new(FakeIpam { log: log.clone(), fail: false }),
		);

		let config = test_config();
		let env = HashMap::new();
		let search_path: Vec<PathBuf> = Vec::new();
		let engine = FakeEngine { host_networking: false };
		let policy = FakePolicy { log: log.clone() };

		let inv = Invocation {
			container_id: "never-added",
			ifname: "eth0",
			netns: None,
			search_path: &search_path,
			config: &config,
			env: &env,
			engine: &engine,
			policy: &policy,
		};

		block_on(orchestrator.del(&inv)).expect("DELETE of an unknown container must succeed");
		assert_eq!(
			log.lock().unwrap().as_slice(),
			&["ipam.release", "store.get_endpoint"],
			"nothing was ever created, so nothing past the lookup should run"
		);
	}
}
