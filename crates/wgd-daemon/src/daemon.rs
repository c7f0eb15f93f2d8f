// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use crate::config::DaemonSettings;
use crate::controller::{Controller, HttpController};
use crate::error::Result;
use crate::heartbeat::{Heartbeat, HeartbeatStats};
use crate::iface::{IpCommandNetwork, NetworkConfig};
use crate::reconcile::{Reconciler, Schedule};
use crate::tunnel::{TunnelConfigurator, TunnelControl, WireguardControl};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};
use wgd_tunnel_common::DaemonConfig;

/// What the daemon did before it stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DaemonReport {
	pub last_applied: Option<u64>,
	pub heartbeat: HeartbeatStats,
}

pub struct WgDaemon {
	settings: DaemonSettings,
	controller: Arc<dyn Controller>,
	network: Arc<dyn NetworkConfig>,
	control: Arc<dyn TunnelControl>,
}

impl WgDaemon {
	pub fn new(
		settings: DaemonSettings,
		controller: Arc<dyn Controller>,
		network: Arc<dyn NetworkConfig>,
		control: Arc<dyn TunnelControl>,
	) -> Self {
		Self {
			settings,
			controller,
			network,
			control,
		}
	}

	/// Wires the production controller client, `ip` command and WireGuard
	/// control plane from `settings`.
	pub fn from_settings(settings: DaemonSettings) -> Result<Self> {
		settings.validate()?;

		let controller = HttpController::new(
			settings.controller_url.clone(),
			settings.api_key.clone(),
			settings.http_timeout,
		)?;
		let network = IpCommandNetwork::with_program(settings.ip_command.clone());
		let control = WireguardControl::new(settings.backend);

		Ok(Self::new(
			settings,
			Arc::new(controller),
			Arc::new(network),
			Arc::new(control),
		))
	}

	/// Brings the tunnel up and keeps it reconciled until `shutdown` is
	/// cancelled.
	///
	/// Any failure before the reconciliation loop starts is returned; the
	/// heartbeat loop is stopped first.
	#[instrument(skip(self, shutdown), fields(interface = %self.settings.interface))]
	pub async fn run(&self, shutdown: CancellationToken) -> Result<DaemonReport> {
		info!(controller = %self.settings.controller_url, "starting WireGuard daemon");

		let dto = self.controller.get_config().await.inspect_err(|e| {
			error!(error = %e, "failed to get daemon config");
		})?;
		let daemon_config = DaemonConfig::from_dto(&dto).inspect_err(|e| {
			error!(error = %e, "failed to parse daemon config");
		})?;

		info!(
			public_key = %daemon_config.public_key(),
			address = %daemon_config.address,
			listen_port = daemon_config.listen_port,
			"obtained daemon config"
		);

		let tasks = shutdown.child_token();

		let heartbeat: JoinHandle<HeartbeatStats> = tokio::spawn(
			Heartbeat::new(Arc::clone(&self.controller), self.settings.heartbeat_interval)
				.run(tasks.clone()),
		);

		if let Err(e) = self.prepare_interface(&daemon_config).await {
			error!(error = %e, "failed to prepare interface");
			tasks.cancel();
			if let Err(join_err) = heartbeat.await {
				warn!(error = %join_err, "heartbeat task failed during startup abort");
			}
			return Err(e);
		}

		let configurator = TunnelConfigurator::new(
			Arc::clone(&self.control),
			self.settings.interface.clone(),
			&daemon_config,
		);
		let reconciler = Reconciler::new(
			Arc::clone(&self.controller),
			Arc::clone(&self.network),
			configurator,
			self.settings.interface.clone(),
		);
		let schedule = Schedule {
			poll_interval: self.settings.poll_interval,
			poll_error_backoff: self.settings.poll_error_backoff,
		};
		let reconcile = tokio::spawn(reconciler.run(schedule, tasks.clone()));

		info!("WireGuard daemon running");

		let (heartbeat, reconcile) = tokio::join!(heartbeat, reconcile);
		// Make sure a panicked loop does not leave its sibling running.
		tasks.cancel();
		let heartbeat = heartbeat?;
		let state = reconcile?;

		if self.settings.cleanup_on_exit {
			match self.network.delete(&self.settings.interface).await {
				Ok(()) => info!("deleted interface on exit"),
				Err(e) => warn!(error = %e, "failed to delete interface on exit"),
			}
		}

		info!(last_applied = ?state.last_applied(), "WireGuard daemon stopped");

		Ok(DaemonReport {
			last_applied: state.last_applied(),
			heartbeat,
		})
	}

	/// Deletes a leftover interface with the configured name, then creates a
	/// fresh one carrying the daemon address.
	async fn prepare_interface(&self, daemon_config: &DaemonConfig) -> Result<()> {
		let name = &self.settings.interface;

		if self.control.interface_exists(name).await? {
			warn!("interface already exists, deleting");
			self.network.delete(name).await?;
		}

		self.network.create(name, &daemon_config.address).await?;
		info!(address = %daemon_config.address, "interface created");

		Ok(())
	}
}

impl std::fmt::Debug for WgDaemon {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("WgDaemon")
			.field("settings", &self.settings)
			.finish()
	}
}
