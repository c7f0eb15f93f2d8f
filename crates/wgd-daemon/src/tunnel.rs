// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use crate::config::ControlBackend;
use crate::error::TunnelError;
use async_trait::async_trait;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};
use wgd_tunnel_common::{DaemonConfig, PeerConfigDto, PeerEndpoint, PeerSet, WgPrivateKey};
use wireguard_control::{Backend, Device, DeviceUpdate, InterfaceName, Key, PeerConfigBuilder};

/// Full desired state of the WireGuard device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceConfig {
	pub private_key: WgPrivateKey,
	pub listen_port: u16,
	pub peers: PeerSet,
	/// Drop every peer not present in `peers`.
	pub replace_peers: bool,
}

/// The local WireGuard control plane.
#[async_trait]
pub trait TunnelControl: Send + Sync {
	async fn interface_exists(&self, name: &str) -> Result<bool, TunnelError>;

	/// Applies `config` to the device in a single update.
	async fn configure(&self, name: &str, config: &DeviceConfig) -> Result<(), TunnelError>;
}

/// [`TunnelControl`] backed by the `wireguard-control` crate.
#[derive(Debug, Clone, Copy, Default)]
pub struct WireguardControl {
	backend: ControlBackend,
}

impl WireguardControl {
	pub fn new(backend: ControlBackend) -> Self {
		Self { backend }
	}

	fn backend(&self) -> Backend {
		match self.backend {
			#[cfg(target_os = "linux")]
			ControlBackend::Kernel => Backend::Kernel,
			#[cfg(not(target_os = "linux"))]
			ControlBackend::Kernel => Backend::Userspace,
			ControlBackend::Userspace => Backend::Userspace,
		}
	}
}

fn interface_name(name: &str) -> Result<InterfaceName, TunnelError> {
	name
		.parse()
		.map_err(|_| TunnelError::InterfaceName(name.to_string()))
}

fn wg_key(base64: &str) -> Result<Key, TunnelError> {
	Key::from_base64(base64).map_err(|_| TunnelError::Key("key rejected by control plane".to_string()))
}

fn build_update(config: &DeviceConfig) -> Result<DeviceUpdate, TunnelError> {
	let private_key = wg_key(config.private_key.to_base64().expose())?;

	let mut update = DeviceUpdate::new()
		.set_private_key(private_key)
		.set_listen_port(config.listen_port);

	if config.replace_peers {
		update = update.replace_peers();
	}

	for peer in config.peers.iter() {
		let mut builder = PeerConfigBuilder::new(&wg_key(&peer.public_key.to_base64())?)
			.replace_allowed_ips();
		if let Some(endpoint) = peer.endpoint.as_ref().and_then(PeerEndpoint::socket_addr) {
			builder = builder.set_endpoint(endpoint);
		}
		for net in &peer.allowed_ips {
			builder = builder.add_allowed_ip(net.addr(), net.prefix_len());
		}
		update = update.add_peer(builder);
	}

	Ok(update)
}

#[async_trait]
impl TunnelControl for WireguardControl {
	#[instrument(skip(self))]
	async fn interface_exists(&self, name: &str) -> Result<bool, TunnelError> {
		let target = interface_name(name)?;
		let backend = self.backend();
		let devices = tokio::task::spawn_blocking(move || Device::list(backend)).await??;
		Ok(devices.contains(&target))
	}

	#[instrument(skip(self, config), fields(peers = config.peers.len(), listen_port = config.listen_port))]
	async fn configure(&self, name: &str, config: &DeviceConfig) -> Result<(), TunnelError> {
		let iface = interface_name(name)?;
		let update = build_update(config)?;
		let backend = self.backend();

		// Netlink and UAPI calls block.
		tokio::task::spawn_blocking(move || update.apply(&iface, backend)).await??;

		debug!("device configured");
		Ok(())
	}
}

/// Upper bound on one endpoint lookup so a stuck resolver cannot stall a
/// reconciliation cycle.
const RESOLVE_TIMEOUT: Duration = Duration::from_secs(5);

/// Resolves a hostname endpoint to its first address. Failures are logged and
/// leave the peer without an endpoint.
async fn resolve_endpoint(host: &str, port: u16) -> Option<SocketAddr> {
	match tokio::time::timeout(RESOLVE_TIMEOUT, tokio::net::lookup_host((host, port))).await {
		Ok(Ok(mut addrs)) => {
			let addr = addrs.next();
			if addr.is_none() {
				warn!(host, port, "endpoint resolved to no addresses, peer will roam");
			}
			addr
		}
		Ok(Err(e)) => {
			warn!(host, port, error = %e, "failed to resolve endpoint, peer will roam");
			None
		}
		Err(_) => {
			warn!(host, port, "endpoint lookup timed out, peer will roam");
			None
		}
	}
}

/// Translates controller peer lists into device updates for one interface.
pub struct TunnelConfigurator {
	control: Arc<dyn TunnelControl>,
	interface: String,
	private_key: WgPrivateKey,
	listen_port: u16,
}

impl TunnelConfigurator {
	pub fn new(control: Arc<dyn TunnelControl>, interface: String, daemon: &DaemonConfig) -> Self {
		Self {
			control,
			interface,
			private_key: daemon.private_key.clone(),
			listen_port: daemon.listen_port,
		}
	}

	/// Validates a controller peer list and resolves hostname endpoints.
	/// One bad key or range rejects the batch.
	pub async fn prepare(&self, peers: &[PeerConfigDto]) -> Result<PeerSet, TunnelError> {
		let parsed = PeerSet::try_from_dtos(peers)?;

		let mut resolved = Vec::with_capacity(parsed.len());
		for mut peer in parsed {
			if let Some(PeerEndpoint::Host { host, port }) = &peer.endpoint {
				let addr = resolve_endpoint(host, *port).await;
				debug!(host = %host, ?addr, "resolved peer endpoint");
				peer.endpoint = addr.map(PeerEndpoint::Addr);
			}
			resolved.push(peer);
		}

		Ok(PeerSet::new(resolved))
	}

	/// Replaces every peer on the device with `peers` in one control-plane
	/// call, reasserting the daemon's private key and listen port.
	#[instrument(skip(self, peers), fields(interface = %self.interface, peers = peers.len()))]
	pub async fn apply(&self, peers: &PeerSet) -> Result<(), TunnelError> {
		let config = DeviceConfig {
			private_key: self.private_key.clone(),
			listen_port: self.listen_port,
			peers: peers.clone(),
			replace_peers: true,
		};

		self.control.configure(&self.interface, &config).await?;

		info!("applied peer set");
		Ok(())
	}
}

impl std::fmt::Debug for TunnelConfigurator {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("TunnelConfigurator")
			.field("interface", &self.interface)
			.field("public_key", &self.private_key.public_key())
			.field("listen_port", &self.listen_port)
			.finish()
	}
}
