//! Locating and invoking the external IPAM plugin binary.
//!
//! This plugin doesn't manage its own address pools (see the non-goals in
//! §1); it delegates to a separate executable following the CNI IPAM
//! sub-protocol, the same way the CNI protocol layer's own `delegation`
//! concept works, but with the `CNI_COMMAND` override needed for ADD-path
//! compensation (§4.7): a failed ADD must invoke the IPAM child with `DEL`
//! to release the address it just assigned, even though the top-level
//! command is still `ADD`.

use std::{collections::HashMap, env, path::Path, path::PathBuf};

use async_std::io::prelude::{ReadExt, WriteExt};
use async_std::process::{Command, Stdio};
use async_trait::async_trait;
use cni_plugin::config::NetworkConfig;
use futures::join;
use ipnetwork::IpNetwork;
use log::{debug, warn};
use serde_json::Value;
use which::which_in;

use crate::error::{AppError, AppResult};

/// The capability set the orchestrator needs from the IPAM sub-protocol
/// (§4.2), as a trait so it can be driven against a fake in tests the same
/// way the other collaborators (§4.3–§4.6) are.
#[async_trait]
pub trait IpamClient: Send + Sync {
	/// Locate and invoke the IPAM plugin named in `config.ipam.type`'s `ADD`
	/// command, parsing the resulting `.ip4.ip` CIDR.
	async fn assign(
		&self,
		search_path: &[PathBuf],
		env: &HashMap<String, String>,
		config: &NetworkConfig,
	) -> AppResult<(Value, IpNetwork)>;

	/// Locate and invoke the IPAM plugin's `DEL` command to release a
	/// previously assigned address. Non-fatal: failures are logged, never
	/// propagated (§7).
	async fn release(&self, search_path: &[PathBuf], env: &HashMap<String, String>, config: &NetworkConfig);
}

/// [`IpamClient`] backed by a real executable located on `CNI_PATH`.
pub struct ExternalIpam;

#[async_trait]
impl IpamClient for ExternalIpam {
	async fn assign(
		&self,
		search_path: &[PathBuf],
		env: &HashMap<String, String>,
		config: &NetworkConfig,
	) -> AppResult<(Value, IpNetwork)> {
		let plugin_name = ipam_plugin_name(config)?;
		let binary = locate(search_path, plugin_name)
			.ok_or_else(|| AppError::IPAMNotFound(plugin_name.to_string()))?;
		assign(&binary, env, config).await
	}

	async fn release(&self, search_path: &[PathBuf], env: &HashMap<String, String>, config: &NetworkConfig) {
		let plugin_name = match ipam_plugin_name(config) {
			Ok(name) => name,
			Err(_) => {
				warn!("no ipam.type in config, skipping IPAM release");
				return;
			}
		};

		match locate(search_path, plugin_name) {
			Some(binary) => release(&binary, env, config).await,
			None => warn!("IPAM plugin {} not found on search path, skipping release", plugin_name),
		}
	}
}

fn ipam_plugin_name(config: &NetworkConfig) -> AppResult<&str> {
	config
		.ipam
		.as_ref()
		.map(|ipam| ipam.plugin.as_str())
		.ok_or(AppError::ConfigInvalid {
			field: "ipam.type",
			expected: "string",
			value: Value::Null,
		})
}

/// Find the first regular file named `plugin` in one of the `search_path`
/// directories, in order.
pub fn locate(search_path: &[PathBuf], plugin: &str) -> Option<PathBuf> {
	let joined = env::join_paths(search_path).ok()?;
	let cwd = env::current_dir().ok()?;
	which_in(plugin, Some(joined), cwd).ok()
}

/// Invoke the IPAM binary at `binary`, overriding `CNI_COMMAND` to `command`
/// (`"ADD"` or `"DEL"`), with `config` serialized to its standard input.
///
/// Captures stdout and stderr fully before waiting on the exit status, to
/// avoid the pipe-buffer deadlock that synchronous spawn-and-wait without
/// concurrent draining would risk (§5).
async fn invoke(
	binary: &Path,
	command: &str,
	env: &HashMap<String, String>,
	config: &NetworkConfig,
) -> AppResult<(i32, Vec<u8>, Vec<u8>)> {
	let plugin_name = binary
		.file_name()
		.map(|n| n.to_string_lossy().into_owned())
		.unwrap_or_else(|| binary.to_string_lossy().into_owned());

	debug!("spawning IPAM plugin {:?} as {}", binary, command);

	let mut child = Command::new(binary)
		.envs(env.iter().map(|(k, v)| (k.clone(), v.clone())))
		.env("CNI_COMMAND", command)
		.stdin(Stdio::piped())
		.stdout(Stdio::piped())
		.stderr(Stdio::piped())
		.spawn()
		.map_err(|err| AppError::IPAMError {
			plugin: plugin_name.clone(),
			code: None,
			details: format!("failed to spawn: {}", err),
		})?;

	let mut stdin = child.stdin.take().expect("stdin was piped");
	let mut stdout = child.stdout.take().expect("stdout was piped");
	let mut stderr = child.stderr.take().expect("stderr was piped");

	let payload = serde_json::to_vec(config).map_err(cni_plugin::error::CniError::Json)?;

	let write_and_close = async move {
		stdin.write_all(&payload).await?;
		stdin.flush().await?;
		drop(stdin);
		Ok::<(), std::io::Error>(())
	};

	let mut out_buf = Vec::new();
	let read_stdout = async { stdout.read_to_end(&mut out_buf).await };

	let mut err_buf = Vec::new();
	let read_stderr = async { stderr.read_to_end(&mut err_buf).await };

	let (write_res, out_res, err_res) = join!(write_and_close, read_stdout, read_stderr);
	write_res.map_err(|err| AppError::IPAMError {
		plugin: plugin_name.clone(),
		code: None,
		details: format!("writing input: {}", err),
	})?;
	out_res.map_err(|err| AppError::IPAMError {
		plugin: plugin_name.clone(),
		code: None,
		details: format!("reading stdout: {}", err),
	})?;
	err_res.map_err(|err| AppError::IPAMError {
		plugin: plugin_name.clone(),
		code: None,
		details: format!("reading stderr: {}", err),
	})?;

	let status = child.status().await.map_err(|err| AppError::IPAMError {
		plugin: plugin_name.clone(),
		code: None,
		details: format!("waiting on child: {}", err),
	})?;

	let code = status.code().unwrap_or(1);
	if !status.success() {
		warn!(
			"IPAM plugin {} exited {} stderr={:?}",
			plugin_name,
			code,
			String::from_utf8_lossy(&err_buf)
		);
	}

	Ok((code, out_buf, err_buf))
}

/// Run the IPAM plugin's `ADD`, parsing the resulting `.ip4.ip` CIDR.
///
/// Returns the raw result document (to be forwarded verbatim on plugin
/// success) and the parsed address.
pub async fn assign(
	binary: &Path,
	env: &HashMap<String, String>,
	config: &NetworkConfig,
) -> AppResult<(Value, IpNetwork)> {
	let plugin_name = binary
		.file_name()
		.map(|n| n.to_string_lossy().into_owned())
		.unwrap_or_default();

	let (code, out, err) = invoke(binary, "ADD", env, config).await?;
	if code != 0 {
		return Err(AppError::IPAMError {
			plugin: plugin_name,
			code: Some(code),
			details: String::from_utf8_lossy(&err).into_owned(),
		});
	}

	// From here the child itself exited 0; any failure is this plugin's own
	// parsing, not the child reporting failure, so §4.7 step 1's "none"
	// compensation doesn't apply — the address the child believes it handed
	// out must still be released.
	let result: Value = match serde_json::from_slice(&out) {
		Ok(result) => result,
		Err(parse_err) => {
			release(binary, env, config).await;
			return Err(AppError::IPAMError {
				plugin: plugin_name,
				code: Some(code),
				details: format!("malformed JSON output: {}", parse_err),
			});
		}
	};

	let ip = match result.get("ip4").and_then(|ip4| ip4.get("ip")).and_then(Value::as_str) {
		Some(ip) => ip,
		None => {
			release(binary, env, config).await;
			return Err(AppError::IPAMError {
				plugin: plugin_name,
				code: Some(code),
				details: "missing ip4.ip in IPAM result".into(),
			});
		}
	};

	let cidr: IpNetwork = match ip.parse() {
		Ok(cidr) => cidr,
		Err(parse_err) => {
			let details = format!("malformed CIDR {:?}: {}", ip, parse_err);
			release(binary, env, config).await;
			return Err(AppError::IPAMError {
				plugin: plugin_name,
				code: Some(code),
				details,
			});
		}
	};

	Ok((result, cidr))
}

/// Run the IPAM plugin's `DEL` to release a previously assigned address.
///
/// Per §7, a release failure is a non-fatal warning, never propagated as an
/// error to the caller.
pub async fn release(binary: &Path, env: &HashMap<String, String>, config: &NetworkConfig) {
	match invoke(binary, "DEL", env, config).await {
		Ok((code, _, err)) if code != 0 => warn!(
			"IPAM release exited {}, continuing: {}",
			code,
			String::from_utf8_lossy(&err)
		),
		Ok(_) => debug!("IPAM release succeeded"),
		Err(err) => warn!("IPAM release failed to run, continuing: {}", err),
	}
}
