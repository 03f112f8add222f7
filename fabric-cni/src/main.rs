use std::collections::HashMap;
use std::env;
use std::process::exit;

use async_std::task::block_on;
use cni_plugin::config::NetworkConfig;
use cni_plugin::error::CniError;
use cni_plugin::reply::{reply, SuccessReply};
use cni_plugin::Cni;
use log::{debug, error, info};
use semver::Version;

use fabric_cni::args::{self, K8S_POD_NAME};
use fabric_cni::datastore::{EndpointLookup, FabricStore, HttpStore};
use fabric_cni::engine::{ContainerEngine, DefaultEngine, DockerEngine};
use fabric_cni::error::{AppError, AppResult};
use fabric_cni::ipam::ExternalIpam;
use fabric_cni::orchestrator::{AddOutcome, Invocation, Orchestrator};
use fabric_cni::policy::{OrchestratorDefault, PerNetwork, PolicyDriver};
use fabric_cni::settings::Settings;
use fabric_cni::veth::RtNetlinkVeth;

fn select_variants(config: &NetworkConfig) -> AppResult<(Box<dyn ContainerEngine>, Box<dyn PolicyDriver>)> {
	let raw_args = env::var("CNI_ARGS").unwrap_or_default();
	let parsed_args = args::parse(&raw_args);
	let is_k8s = parsed_args.contains_key(K8S_POD_NAME);

	debug!("CNI_ARGS parsed to {:?}, k8s={}", parsed_args, is_k8s);

	let engine: Box<dyn ContainerEngine> = if is_k8s {
		Box::new(DockerEngine::default())
	} else {
		Box::new(DefaultEngine)
	};

	let policy: Box<dyn PolicyDriver> = if is_k8s {
		Box::new(OrchestratorDefault)
	} else {
		Box::new(PerNetwork::new(&config.name)?)
	};

	Ok((engine, policy))
}

/// Log the error, then exit.
///
/// Unlike [`reply`], nothing is written to standard output: on failure,
/// standard output stays empty (§4.8/§6) and the diagnostic travels only
/// through the log file. The exit status is `1`, except an IPAM-originated
/// failure propagates the child's own exit code instead (§4.8).
fn reply_error(err: AppError, cni_version: Version) -> ! {
	let exit_code = err.exit_code();
	let reply_body = err.into_reply(cni_version);
	debug!("failed with {:#?}, exiting {}", reply_body, exit_code);
	exit(exit_code);
}

fn main() {
	cni_plugin::install_logger("fabric-cni.log");
	fabric_cni::install_panic_hook();
	debug!(
		"{} version {}",
		env!("CARGO_PKG_NAME"),
		env!("CARGO_PKG_VERSION")
	);

	match Cni::load() {
		Cni::Add {
			container_id,
			ifname,
			netns,
			path,
			config,
		} => {
			let cni_version = config.cni_version.clone();
			info!("fabric-cni serving spec v{} command=ADD container={}", cni_version, container_id);

			let res: AppResult<SuccessReply> = block_on(async {
				let (engine, policy) = select_variants(&config)?;
				let env: HashMap<String, String> = env::vars().collect();
				let settings = Settings::from_env();
				let store = Box::new(HttpStore::new(settings.datastore_url.clone()));
				let veth = Box::new(RtNetlinkVeth);
				let ipam = Box::new(ExternalIpam);
				let orchestrator = Orchestrator::new(settings, store, veth, ipam);

				let inv = Invocation {
					container_id: &container_id,
					ifname: &ifname,
					netns: Some(&netns),
					search_path: &path,
					config: &config,
					env: &env,
					engine: engine.as_ref(),
					policy: policy.as_ref(),
				};

				match orchestrator.add(&inv).await? {
					AddOutcome::HostNetworking => Ok(SuccessReply {
						cni_version: config.cni_version,
						interfaces: Default::default(),
						ips: Default::default(),
						routes: Default::default(),
						dns: Default::default(),
						specific: Default::default(),
					}),
					AddOutcome::Provisioned(raw_result) => {
						// The IPAM result is forwarded verbatim (§4.8); we parse it
						// back into our own reply type only so it travels through
						// the same `reply()` helper as every other path.
						serde_json::from_value(raw_result).map_err(|err| AppError::Cni(CniError::Json(err)))
					}
				}
			});

			match res {
				Ok(res) => {
					debug!("success: {:#?}", res);
					reply(res)
				}
				Err(err) => {
					error!("ADD failed: {}", err);
					reply_error(err, cni_version)
				}
			}
		}
		Cni::Del {
			container_id,
			ifname,
			netns,
			path,
			config,
		} => {
			let cni_version = config.cni_version.clone();
			info!("fabric-cni serving spec v{} command=DEL container={}", cni_version, container_id);

			let res: AppResult<()> = block_on(async {
				let (engine, policy) = select_variants(&config)?;
				let env: HashMap<String, String> = env::vars().collect();
				let settings = Settings::from_env();
				let store = Box::new(HttpStore::new(settings.datastore_url.clone()));
				let veth = Box::new(RtNetlinkVeth);
				let ipam = Box::new(ExternalIpam);
				let orchestrator = Orchestrator::new(settings, store, veth, ipam);

				let inv = Invocation {
					container_id: &container_id,
					ifname: &ifname,
					netns: netns.as_deref(),
					search_path: &path,
					config: &config,
					env: &env,
					engine: engine.as_ref(),
					policy: policy.as_ref(),
				};

				orchestrator.del(&inv).await
			});

			match res {
				Ok(()) => {
					debug!("DELETE succeeded, no output");
					std::process::exit(0);
				}
				Err(err) => {
					error!("DEL failed: {}", err);
					reply_error(err, cni_version)
				}
			}
		}
		Cni::Check {
			container_id,
			config,
			..
		} => {
			let cni_version = config.cni_version.clone();
			info!("fabric-cni serving spec v{} command=CHECK container={}", cni_version, container_id);

			let res: AppResult<SuccessReply> = block_on(async {
				let settings = Settings::from_env();
				let store = HttpStore::new(settings.datastore_url.clone());

				match store
					.get_endpoint(&settings.hostname, &settings.orchestrator_id, &container_id)
					.await?
				{
					EndpointLookup::Found(_) => Ok(SuccessReply {
						cni_version: config.cni_version,
						interfaces: Default::default(),
						ips: Default::default(),
						routes: Default::default(),
						dns: Default::default(),
						specific: Default::default(),
					}),
					EndpointLookup::NotFound => Err(AppError::Cni(CniError::Generic(format!(
						"no endpoint recorded for container {}",
						container_id
					)))),
				}
			});

			match res {
				Ok(res) => reply(res),
				Err(err) => {
					error!("CHECK failed: {}", err);
					reply_error(err, cni_version)
				}
			}
		}
		Cni::Version(_) => unreachable!("handled by Cni::load()"),
	}
}
