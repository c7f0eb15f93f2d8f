// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! WireGuard agent that keeps a local interface in sync with a controller.
//!
//! On startup the daemon fetches its tunnel identity, recreates the
//! interface and then runs two independent loops:
//!
//! - [`heartbeat::Heartbeat`] tells the controller the agent is alive
//! - [`reconcile::Reconciler`] polls the config version and, when it moves,
//!   replaces every peer and route on the interface
//!
//! Host and controller access go through the [`controller::Controller`],
//! [`iface::NetworkConfig`] and [`tunnel::TunnelControl`] traits so the loops
//! can run against in-memory doubles.

pub mod config;
pub mod controller;
pub mod daemon;
pub mod error;
pub mod heartbeat;
pub mod iface;
pub mod reconcile;
pub mod tunnel;

pub use config::{ControlBackend, DaemonSettings};
pub use controller::{Controller, HttpController, DAEMON_KEY_HEADER};
pub use daemon::{DaemonReport, WgDaemon};
pub use error::{ConfigError, ControllerError, DaemonError, IfaceError, Result, TunnelError};
pub use heartbeat::{Heartbeat, HeartbeatStats};
pub use iface::{IpCommandNetwork, NetworkConfig};
pub use reconcile::{ReconcileStage, ReconcileState, Reconciler, Schedule, TickOutcome};
pub use tunnel::{DeviceConfig, TunnelConfigurator, TunnelControl, WireguardControl};
