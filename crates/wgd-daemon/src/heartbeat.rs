// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use crate::controller::Controller;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// Counters reported when the heartbeat loop stops.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HeartbeatStats {
	pub sent: u64,
	pub failed: u64,
}

/// Periodic liveness ping to the controller.
pub struct Heartbeat {
	controller: Arc<dyn Controller>,
	interval: Duration,
}

impl Heartbeat {
	pub fn new(controller: Arc<dyn Controller>, interval: Duration) -> Self {
		Self {
			controller,
			interval,
		}
	}

	/// Sends one heartbeat right away and then one per interval until
	/// `shutdown` is cancelled. Failures are logged and never stop the loop.
	pub async fn run(self, shutdown: CancellationToken) -> HeartbeatStats {
		let mut stats = HeartbeatStats::default();
		let mut timer = tokio::time::interval(self.interval);
		timer.set_missed_tick_behavior(MissedTickBehavior::Skip);

		info!(interval_secs = self.interval.as_secs(), "starting heartbeat loop");

		loop {
			tokio::select! {
				biased;

				_ = shutdown.cancelled() => break,

				_ = timer.tick() => {
					match self.controller.send_heartbeat().await {
						Ok(()) => {
							stats.sent += 1;
							debug!(sent = stats.sent, "heartbeat acknowledged");
						}
						Err(e) => {
							stats.failed += 1;
							error!(error = %e, "failed to send heartbeat");
						}
					}
				}
			}
		}

		info!(sent = stats.sent, failed = stats.failed, "heartbeat loop stopped");
		stats
	}
}

impl std::fmt::Debug for Heartbeat {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Heartbeat")
			.field("interval", &self.interval)
			.finish()
	}
}
