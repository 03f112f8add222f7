//! The fabric datastore adapter (§4.3): a thin, idempotent capability over
//! workload endpoints and policy profiles.
//!
//! Realized as an HTTP+JSON client, the same shape as this project's other
//! datastore-backed CNI helpers (its Consul and Nomad IPAM backends): `surf`
//! for requests, typed request/response structs, endpoint paths built from
//! the key tuple.

use async_trait::async_trait;
use ipnetwork::IpNetwork;
use log::debug;
use serde::{Deserialize, Serialize};
use surf::{Url, http::StatusCode};

use cni_plugin::macaddr::MacAddr;

use crate::error::AppError;

/// The datastore entity keyed by `(hostname, orchestrator_id, workload_id)`.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct Endpoint {
	/// The host-side veth interface name.
	pub name: String,

	/// The link-layer address, set once the veth is provisioned.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub mac: Option<MacAddr>,

	/// The addresses assigned to this endpoint.
	#[serde(default)]
	pub ip_addresses: Vec<IpNetwork>,
}

/// A policy profile: a named set of workload IDs it's attached to.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
struct Profile {
	#[serde(default)]
	members: Vec<String>,
}

/// The outcome of a `get_endpoint` lookup.
pub enum EndpointLookup {
	/// Exactly one endpoint matched.
	Found(Endpoint),
	/// No endpoint matched the workload key.
	NotFound,
}

/// The capability set the orchestrator needs from the datastore.
///
/// No retries are performed across this boundary; that's the client's
/// concern, not the orchestrator's.
#[async_trait]
pub trait FabricStore: Send + Sync {
	/// Create (or idempotently overwrite) an endpoint.
	async fn create_endpoint(
		&self,
		hostname: &str,
		orchestrator_id: &str,
		workload_id: &str,
		cidrs: &[IpNetwork],
	) -> Result<Endpoint, AppError>;

	/// Idempotently update an existing endpoint.
	async fn set_endpoint(
		&self,
		hostname: &str,
		orchestrator_id: &str,
		workload_id: &str,
		endpoint: &Endpoint,
	) -> Result<(), AppError>;

	/// Look up an endpoint by its workload key.
	///
	/// `Err(AppError::AmbiguousEndpoint(_))` when more than one entity
	/// matches the key (should not happen with the path scheme below, but the
	/// capability contract in §4.3 requires the outcome be representable).
	async fn get_endpoint(
		&self,
		hostname: &str,
		orchestrator_id: &str,
		workload_id: &str,
	) -> Result<EndpointLookup, AppError>;

	/// Remove an endpoint. Returns `false` (not an error) if it was already
	/// absent.
	async fn remove_workload(
		&self,
		hostname: &str,
		orchestrator_id: &str,
		workload_id: &str,
	) -> Result<bool, AppError>;

	/// Ensure a profile exists and is attached to `workload_id`.
	async fn attach_profile(&self, profile: &str, workload_id: &str) -> Result<(), AppError>;

	/// Detach `workload_id` from a profile, deleting the profile if it's left
	/// unreferenced.
	async fn detach_profile(&self, profile: &str, workload_id: &str) -> Result<(), AppError>;
}

/// HTTP+JSON implementation of [`FabricStore`].
pub struct HttpStore {
	base_url: Url,
}

impl HttpStore {
	/// Build a client addressing the datastore at `base_url`.
	pub fn new(base_url: Url) -> Self {
		Self { base_url }
	}

	fn endpoint_url(&self, hostname: &str, orchestrator_id: &str, workload_id: &str) -> Url {
		// UNWRAP: base_url is an absolute URL; joining a relative path cannot fail.
		self.base_url
			.join(&format!(
				"endpoints/{}/{}/{}",
				hostname, orchestrator_id, workload_id
			))
			.unwrap()
	}

	fn profile_url(&self, profile: &str) -> Url {
		// UNWRAP: base_url is an absolute URL; joining a relative path cannot fail.
		self.base_url.join(&format!("profiles/{}", profile)).unwrap()
	}

	async fn get_profile(&self, profile: &str) -> Result<Profile, AppError> {
		let url = self.profile_url(profile);
		let mut res = surf::get(&url)
			.await
			.map_err(|err| AppError::DatastoreUnavailable(err.to_string()))?;

		if res.status() == StatusCode::NotFound {
			return Ok(Profile::default());
		}

		res.body_json()
			.await
			.map_err(|err| AppError::DatastoreUnavailable(err.to_string()))
	}
}

#[async_trait]
impl FabricStore for HttpStore {
	async fn create_endpoint(
		&self,
		hostname: &str,
		orchestrator_id: &str,
		workload_id: &str,
		cidrs: &[IpNetwork],
	) -> Result<Endpoint, AppError> {
		let endpoint = Endpoint {
			name: format!("fab{}", &workload_id[..workload_id.len().min(11)]),
			mac: None,
			ip_addresses: cidrs.to_vec(),
		};

		let url = self.endpoint_url(hostname, orchestrator_id, workload_id);
		debug!("PUT {} {:?}", url, endpoint);
		let res = surf::put(&url)
			.body(surf::Body::from_json(&endpoint).map_err(|err| AppError::DatastoreUnavailable(err.to_string()))?)
			.await
			.map_err(|err| AppError::DatastoreUnavailable(err.to_string()))?;

		match res.status() {
			s if s.is_success() => Ok(endpoint),
			StatusCode::UnprocessableEntity => {
				Err(AppError::AddressFamilyUnsupported(format!("{:?}", cidrs)))
			}
			s => Err(AppError::DatastoreUnavailable(format!(
				"unexpected status creating endpoint: {}",
				s
			))),
		}
	}

	async fn set_endpoint(
		&self,
		hostname: &str,
		orchestrator_id: &str,
		workload_id: &str,
		endpoint: &Endpoint,
	) -> Result<(), AppError> {
		let url = self.endpoint_url(hostname, orchestrator_id, workload_id);
		debug!("PUT {} {:?}", url, endpoint);
		let res = surf::put(&url)
			.body(surf::Body::from_json(endpoint).map_err(|err| AppError::DatastoreUnavailable(err.to_string()))?)
			.await
			.map_err(|err| AppError::DatastoreUnavailable(err.to_string()))?;

		if res.status().is_success() {
			Ok(())
		} else {
			Err(AppError::DatastoreUnavailable(format!(
				"unexpected status updating endpoint: {}",
				res.status()
			)))
		}
	}

	async fn get_endpoint(
		&self,
		hostname: &str,
		orchestrator_id: &str,
		workload_id: &str,
	) -> Result<EndpointLookup, AppError> {
		let url = self.endpoint_url(hostname, orchestrator_id, workload_id);
		debug!("GET {}", url);
		let mut res = surf::get(&url)
			.await
			.map_err(|err| AppError::DatastoreUnavailable(err.to_string()))?;

		match res.status() {
			StatusCode::NotFound => Ok(EndpointLookup::NotFound),
			s if s.is_success() => {
				let endpoint: Endpoint = res
					.body_json()
					.await
					.map_err(|err| AppError::DatastoreUnavailable(err.to_string()))?;
				Ok(EndpointLookup::Found(endpoint))
			}
			StatusCode::MultiStatus => Err(AppError::AmbiguousEndpoint(workload_id.to_string())),
			s => Err(AppError::DatastoreUnavailable(format!(
				"unexpected status fetching endpoint: {}",
				s
			))),
		}
	}

	async fn remove_workload(
		&self,
		hostname: &str,
		orchestrator_id: &str,
		workload_id: &str,
	) -> Result<bool, AppError> {
		let url = self.endpoint_url(hostname, orchestrator_id, workload_id);
		debug!("DELETE {}", url);
		let res = surf::delete(&url)
			.await
			.map_err(|err| AppError::DatastoreUnavailable(err.to_string()))?;

		match res.status() {
			StatusCode::NotFound => Ok(false),
			s if s.is_success() => Ok(true),
			s => Err(AppError::DatastoreUnavailable(format!(
				"unexpected status removing endpoint: {}",
				s
			))),
		}
	}

	async fn attach_profile(&self, profile: &str, workload_id: &str) -> Result<(), AppError> {
		let mut doc = self.get_profile(profile).await?;
		if !doc.members.iter().any(|m| m == workload_id) {
			doc.members.push(workload_id.to_string());
		}

		let url = self.profile_url(profile);
		debug!("PUT {} {:?}", url, doc);
		let res = surf::put(&url)
			.body(surf::Body::from_json(&doc).map_err(|err| AppError::DatastoreUnavailable(err.to_string()))?)
			.await
			.map_err(|err| AppError::DatastoreUnavailable(err.to_string()))?;

		if res.status().is_success() {
			Ok(())
		} else {
			Err(AppError::DatastoreUnavailable(format!(
				"unexpected status attaching profile: {}",
				res.status()
			)))
		}
	}

	async fn detach_profile(&self, profile: &str, workload_id: &str) -> Result<(), AppError> {
		let mut doc = self.get_profile(profile).await?;
		doc.members.retain(|m| m != workload_id);

		let url = self.profile_url(profile);
		let res = if doc.members.is_empty() {
			debug!("DELETE {} (unreferenced)", url);
			surf::delete(&url)
				.await
				.map_err(|err| AppError::DatastoreUnavailable(err.to_string()))?
		} else {
			debug!("PUT {} {:?}", url, doc);
			surf::put(&url)
				.body(surf::Body::from_json(&doc).map_err(|err| AppError::DatastoreUnavailable(err.to_string()))?)
				.await
				.map_err(|err| AppError::DatastoreUnavailable(err.to_string()))?
		};

		if res.status().is_success() || res.status() == StatusCode::NotFound {
			Ok(())
		} else {
			Err(AppError::DatastoreUnavailable(format!(
				"unexpected status detaching profile: {}",
				res.status()
			)))
		}
	}
}
