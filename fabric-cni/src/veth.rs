//! Namespace/veth provisioner (§4.4).
//!
//! Out of scope per §1 ("the low-level netlink / veth primitives, assumed to
//! create and delete veth pairs atomically from the caller's perspective"):
//! this module is the concrete collaborator behind that assumption, built
//! with `rtnetlink` the way this project's other host-side netlink helpers
//! (`host-routes`, `host-neigh`) are.

use std::convert::TryInto;
use std::fs::File;
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};

use async_std::task::spawn_blocking;
use async_trait::async_trait;
use futures::stream::TryStreamExt;
use ipnetwork::IpNetwork;
use log::{debug, info, warn};
use macaddr::MacAddr6;
use nix::sched::{setns, CloneFlags};
use rtnetlink::packet::rtnl::link::nlas::Nla;
use rtnetlink::Handle;

use cni_plugin::macaddr::MacAddr;

use crate::error::{AppError, AppResult};

fn nlerror(context: &'static str) -> impl FnOnce(rtnetlink::Error) -> AppError {
	move |err| AppError::DatastoreUnavailable(format!("netlink {}: {}", context, err))
}

/// Capability to provision and tear down the veth pair for a workload.
#[async_trait]
pub trait VethProvisioner: Send + Sync {
	/// Create a veth pair, move the peer into `netns`, rename it to `ifname`,
	/// assign `cidr` and bring it up. Returns the container-side interface's
	/// link-layer address.
	async fn provision(
		&self,
		netns: &Path,
		host_name: &str,
		ifname: &str,
		cidr: IpNetwork,
	) -> AppResult<MacAddr>;

	/// Remove the host-side interface named `host_name`. Idempotent: a
	/// missing interface is not an error.
	async fn remove(&self, host_name: &str) -> AppResult<()>;
}

/// `rtnetlink`-backed implementation.
pub struct RtNetlinkVeth;

/// Resolve `netns`, joining it against the current working directory when
/// relative, per §4.4.
fn resolve_netns(netns: &Path) -> AppResult<PathBuf> {
	if netns.is_absolute() {
		Ok(netns.to_path_buf())
	} else {
		let cwd = std::env::current_dir().map_err(|_| cni_plugin::error::CniError::NoCwd)?;
		Ok(cwd.join(netns))
	}
}

fn peer_name_for(host_name: &str) -> String {
	// IFNAMSIZ is 16 including the trailing nul; keep well under that.
	let mut name: String = host_name.chars().take(12).collect();
	name.push('p');
	name
}

async fn link_index(handle: &Handle, name: &str) -> AppResult<Option<u32>> {
	let mut links = handle.link().get().set_name_filter(name.to_string()).execute();
	match links.try_next().await.map_err(nlerror("get link"))? {
		Some(link) => Ok(Some(link.header.index)),
		None => Ok(None),
	}
}

#[async_trait]
impl VethProvisioner for RtNetlinkVeth {
	async fn provision(
		&self,
		netns: &Path,
		host_name: &str,
		ifname: &str,
		cidr: IpNetwork,
	) -> AppResult<MacAddr> {
		let netns = resolve_netns(netns)?;
		let peer_name = peer_name_for(host_name);

		debug!(
			"provisioning veth {} <-> {} into {:?} as {}",
			host_name,
			peer_name,
			netns,
			ifname
		);

		let (conn, handle, _) = rtnetlink::new_connection().map_err(nlerror("new connection"))?;
		async_std::task::spawn(conn);

		handle
			.link()
			.add()
			.veth(host_name.to_string(), peer_name.clone())
			.execute()
			.await
			.map_err(nlerror("create veth"))?;

		let host_index = link_index(&handle, host_name)
			.await?
			.ok_or_else(|| AppError::DatastoreUnavailable(format!("veth {} vanished after creation", host_name)))?;
		handle
			.link()
			.set(host_index)
			.up()
			.execute()
			.await
			.map_err(nlerror("bring up host side"))?;

		let peer_index = link_index(&handle, &peer_name)
			.await?
			.ok_or_else(|| AppError::DatastoreUnavailable(format!("peer {} vanished after creation", peer_name)))?;

		let netns_file = File::open(&netns).map_err(|err| {
			AppError::DatastoreUnavailable(format!("opening netns {:?}: {}", netns, err))
		})?;
		let netns_fd = netns_file.as_raw_fd();

		handle
			.link()
			.set(peer_index)
			.setns_by_fd(netns_fd)
			.execute()
			.await
			.map_err(nlerror("move peer into netns"))?;

		// The peer is now invisible to our netlink connection: it lives in
		// another namespace. Finish configuring it from a dedicated thread
		// that switches into that namespace for the duration of the call.
		let ifname = ifname.to_string();
		let peer_name_in_ns = peer_name.clone();
		let mac = spawn_blocking(move || configure_in_netns(netns_fd, &peer_name_in_ns, &ifname, cidr))
			.await?;

		Ok(mac)
	}

	async fn remove(&self, host_name: &str) -> AppResult<()> {
		let (conn, handle, _) = rtnetlink::new_connection().map_err(nlerror("new connection"))?;
		async_std::task::spawn(conn);

		match link_index(&handle, host_name).await? {
			Some(index) => {
				handle
					.link()
					.del(index)
					.execute()
					.await
					.map_err(nlerror("delete veth"))?;
				info!("removed veth {}", host_name);
			}
			None => {
				debug!("veth {} already absent, nothing to do", host_name);
			}
		}

		Ok(())
	}
}

/// Runs on a dedicated blocking thread: switches into the container's network
/// namespace, renames the peer to `ifname`, assigns `cidr`, brings it up, and
/// reads back its MAC address, then switches back.
fn configure_in_netns(target_fd: i32, peer_name: &str, ifname: &str, cidr: IpNetwork) -> AppResult<MacAddr> {
	let original = File::open("/proc/self/ns/net")
		.map_err(|err| AppError::DatastoreUnavailable(format!("opening own netns: {}", err)))?;

	setns(target_fd, CloneFlags::CLONE_NEWNET)
		.map_err(|err| AppError::DatastoreUnavailable(format!("entering container netns: {}", err)))?;

	let result = async_std::task::block_on(async {
		let (conn, handle, _) = rtnetlink::new_connection().map_err(nlerror("new connection (in netns)"))?;
		async_std::task::spawn(conn);

		let index = link_index(&handle, peer_name)
			.await?
			.ok_or_else(|| AppError::DatastoreUnavailable(format!("peer {} not visible in container netns", peer_name)))?;

		handle
			.link()
			.set(index)
			.name(ifname.to_string())
			.execute()
			.await
			.map_err(nlerror("rename interface"))?;

		handle
			.address()
			.add(index, cidr.ip(), cidr.prefix())
			.execute()
			.await
			.map_err(nlerror("assign address"))?;

		handle
			.link()
			.set(index)
			.up()
			.execute()
			.await
			.map_err(nlerror("bring up interface"))?;

		let mut links = handle.link().get().set_name_filter(ifname.to_string()).execute();
		let link = links
			.try_next()
			.await
			.map_err(nlerror("get configured link"))?
			.ok_or_else(|| AppError::DatastoreUnavailable(format!("interface {} vanished after configuration", ifname)))?;

		let addr_bytes = link
			.nlas
			.iter()
			.find_map(|nla| if let Nla::Address(bytes) = nla { Some(bytes.clone()) } else { None })
			.ok_or_else(|| AppError::DatastoreUnavailable(format!("no link-layer address on {}", ifname)))?;

		let addr_bytes: [u8; 6] = addr_bytes
			.try_into()
			.map_err(|bytes: Vec<u8>| AppError::DatastoreUnavailable(format!("address of {} is not 6 bytes: {:?}", ifname, bytes)))?;

		Ok(MacAddr::from(MacAddr6::from(addr_bytes)))
	});

	if let Err(err) = setns(original.as_raw_fd(), CloneFlags::CLONE_NEWNET) {
		warn!("failed to restore original network namespace: {}", err);
	}

	result
}
