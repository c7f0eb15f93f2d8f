// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Version-driven reconciliation of peers and routes.
//!
//! Each tick polls the controller's config version. When it differs from the
//! last version applied, the whole topology is rebuilt: the peer list is
//! fetched and validated, the interface's routes are flushed, the device's
//! peers are replaced in one call and a route is added for every allowed
//! range. Only then is the version recorded, so a cycle that fails part way is
//! retried in full on the next tick.
//!
//! A peer list that fails validation is never applied to the device, but the
//! routes are still flushed and every range that parses is routed again.

use crate::controller::Controller;
use crate::iface::NetworkConfig;
use crate::tunnel::TunnelConfigurator;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};
use wgd_tunnel_common::{parse_allowed_ip, IpNet, PeerConfigDto};

/// Mutable state owned by the reconciliation task.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileState {
	last_applied: Option<u64>,
}

impl ReconcileState {
	pub fn new() -> Self {
		Self::default()
	}

	/// State for a daemon that already applied `version`.
	pub fn applied(version: u64) -> Self {
		Self {
			last_applied: Some(version),
		}
	}

	pub fn last_applied(&self) -> Option<u64> {
		self.last_applied
	}

	pub fn needs_reconcile(&self, version: u64) -> bool {
		self.last_applied != Some(version)
	}

	fn commit(&mut self, version: u64) {
		self.last_applied = Some(version);
	}
}

/// Step of a reconciliation cycle that can abort it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileStage {
	FetchPeers,
	ParsePeers,
	FlushRoutes,
	ApplyPeers,
}

impl fmt::Display for ReconcileStage {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(match self {
			Self::FetchPeers => "fetch peers",
			Self::ParsePeers => "parse peers",
			Self::FlushRoutes => "flush routes",
			Self::ApplyPeers => "apply peers",
		})
	}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
	/// The version could not be read; nothing else was attempted.
	PollFailed,
	Unchanged {
		version: u64,
	},
	/// Topology rebuilt and `version` recorded as applied.
	Reconciled {
		version: u64,
		routes_added: usize,
		routes_failed: usize,
	},
	/// The cycle stopped at `stage`; the applied version did not move.
	Aborted {
		version: u64,
		stage: ReconcileStage,
	},
}

/// Timing of the reconciliation loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Schedule {
	pub poll_interval: Duration,
	pub poll_error_backoff: Duration,
}

impl Schedule {
	fn delay_after(&self, outcome: &TickOutcome) -> Duration {
		match outcome {
			TickOutcome::PollFailed => self.poll_error_backoff,
			_ => self.poll_interval,
		}
	}
}

pub struct Reconciler {
	controller: Arc<dyn Controller>,
	network: Arc<dyn NetworkConfig>,
	configurator: TunnelConfigurator,
	interface: String,
	state: ReconcileState,
}

impl Reconciler {
	pub fn new(
		controller: Arc<dyn Controller>,
		network: Arc<dyn NetworkConfig>,
		configurator: TunnelConfigurator,
		interface: String,
	) -> Self {
		Self {
			controller,
			network,
			configurator,
			interface,
			state: ReconcileState::new(),
		}
	}

	pub fn with_state(mut self, state: ReconcileState) -> Self {
		self.state = state;
		self
	}

	pub fn state(&self) -> &ReconcileState {
		&self.state
	}

	/// Runs one poll and, if the version moved, one full reconciliation.
	#[instrument(skip(self), fields(interface = %self.interface, last_applied = ?self.state.last_applied()))]
	pub async fn tick(&mut self) -> TickOutcome {
		let version = match self.controller.get_version().await {
			Ok(version) => version,
			Err(e) => {
				error!(error = %e, "failed to get config version");
				return TickOutcome::PollFailed;
			}
		};

		if !self.state.needs_reconcile(version) {
			debug!(version, "config version unchanged");
			return TickOutcome::Unchanged { version };
		}

		if let Some(previous) = self.state.last_applied() {
			if version < previous {
				warn!(version, previous, "controller config version went backwards");
			}
		}

		info!(version, "config version changed, updating config");

		match self.reconcile().await {
			Ok((routes_added, routes_failed)) => {
				self.state.commit(version);
				info!(
					version,
					routes_added, routes_failed, "reconciled tunnel configuration"
				);
				TickOutcome::Reconciled {
					version,
					routes_added,
					routes_failed,
				}
			}
			Err(stage) => {
				warn!(version, %stage, "reconciliation aborted, will retry on next poll");
				TickOutcome::Aborted { version, stage }
			}
		}
	}

	/// Returns `(routes_added, routes_failed)`, or the stage that aborted the
	/// cycle. Abort points are logged here.
	async fn reconcile(&self) -> Result<(usize, usize), ReconcileStage> {
		let dtos = self.controller.get_peers().await.map_err(|e| {
			error!(error = %e, "failed to fetch peers");
			ReconcileStage::FetchPeers
		})?;

		let prepared = self.configurator.prepare(&dtos).await.inspect_err(|e| {
			error!(error = %e, "failed to parse peers, leaving device peers unchanged");
		});

		self
			.network
			.flush_routes(&self.interface)
			.await
			.map_err(|e| {
				error!(error = %e, "failed to clear routing");
				ReconcileStage::FlushRoutes
			})?;

		let routes = match &prepared {
			Ok(peers) => {
				self.configurator.apply(peers).await.map_err(|e| {
					error!(error = %e, "failed to apply peers");
					ReconcileStage::ApplyPeers
				})?;
				peers.routes().copied().collect()
			}
			Err(_) => parseable_routes(&dtos),
		};

		let (added, failed) = self.add_routes(&routes).await;

		match prepared {
			Ok(_) => Ok((added, failed)),
			Err(_) => Err(ReconcileStage::ParsePeers),
		}
	}

	async fn add_routes(&self, routes: &[IpNet]) -> (usize, usize) {
		let mut added = 0;
		let mut failed = 0;
		for network in routes {
			match self.network.set_route(&self.interface, network).await {
				Ok(()) => added += 1,
				Err(e) => {
					error!(error = %e, %network, "failed to add route");
					failed += 1;
				}
			}
		}
		(added, failed)
	}

	/// Ticks immediately, then after every poll interval (or the error
	/// backoff when the poll failed) until `shutdown` is cancelled.
	///
	/// A tick in progress is allowed to finish. Returns the final state.
	pub async fn run(mut self, schedule: Schedule, shutdown: CancellationToken) -> ReconcileState {
		info!(
			interface = %self.interface,
			poll_interval_secs = schedule.poll_interval.as_secs(),
			"starting reconciliation loop"
		);

		while !shutdown.is_cancelled() {
			let outcome = self.tick().await;
			let delay = schedule.delay_after(&outcome);

			tokio::select! {
				biased;

				_ = shutdown.cancelled() => break,
				_ = tokio::time::sleep(delay) => {}
			}
		}

		info!(last_applied = ?self.state.last_applied(), "reconciliation loop stopped");
		self.state
	}
}

/// Every allowed range in a raw peer list that parses, in peer order.
fn parseable_routes(dtos: &[PeerConfigDto]) -> Vec<IpNet> {
	dtos
		.iter()
		.flat_map(|dto| dto.allowed_ips.iter())
		.filter_map(|value| match parse_allowed_ip(value) {
			Ok(network) => Some(network),
			Err(e) => {
				warn!(error = %e, value = %value, "skipping unparseable route");
				None
			}
		})
		.collect()
}

impl fmt::Debug for Reconciler {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Reconciler")
			.field("interface", &self.interface)
			.field("state", &self.state)
			.finish()
	}
}
