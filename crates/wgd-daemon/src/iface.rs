// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Host interface and routing management.

use crate::error::IfaceError;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tracing::{debug, instrument, trace, warn};
use wgd_tunnel_common::IpNet;

/// The slice of host network configuration the daemon needs.
///
/// Implementations perform no retries; every failure is returned to the
/// caller with enough context to log.
#[async_trait]
pub trait NetworkConfig: Send + Sync {
	/// Creates a WireGuard interface, assigns `address` and brings it up.
	///
	/// Stops at the first failing step without undoing earlier ones.
	async fn create(&self, name: &str, address: &IpNet) -> Result<(), IfaceError>;

	async fn delete(&self, name: &str) -> Result<(), IfaceError>;

	/// Routes `network` through the interface.
	async fn set_route(&self, name: &str, network: &IpNet) -> Result<(), IfaceError>;

	/// Removes every route bound to the interface.
	async fn flush_routes(&self, name: &str) -> Result<(), IfaceError>;
}

/// [`NetworkConfig`] backed by iproute2's `ip` command.
#[derive(Debug, Clone)]
pub struct IpCommandNetwork {
	program: PathBuf,
}

impl IpCommandNetwork {
	pub fn new() -> Self {
		Self::with_program("ip")
	}

	pub fn with_program(program: impl Into<PathBuf>) -> Self {
		Self {
			program: program.into(),
		}
	}
}

impl Default for IpCommandNetwork {
	fn default() -> Self {
		Self::new()
	}
}

pub(crate) fn create_steps(name: &str, address: &IpNet) -> [(&'static str, Vec<String>); 3] {
	[
		(
			"create interface",
			args(&["link", "add", name, "type", "wireguard"]),
		),
		(
			"add address",
			args(&["address", "add", &address.to_string(), "dev", name]),
		),
		("bring interface up", args(&["link", "set", name, "up"])),
	]
}

pub(crate) fn route_add_args(name: &str, network: &IpNet) -> Vec<String> {
	args(&["route", "add", &network.to_string(), "dev", name])
}

pub(crate) fn flush_args(name: &str, ipv6: bool) -> Vec<String> {
	if ipv6 {
		args(&["-6", "route", "flush", "dev", name])
	} else {
		args(&["route", "flush", "dev", name])
	}
}

fn args(parts: &[&str]) -> Vec<String> {
	parts.iter().map(|s| s.to_string()).collect()
}

#[async_trait]
impl NetworkConfig for IpCommandNetwork {
	#[instrument(skip(self), fields(%address))]
	async fn create(&self, name: &str, address: &IpNet) -> Result<(), IfaceError> {
		for (op, args) in create_steps(name, address) {
			run_ip(&self.program, op, &args).await?;
		}
		debug!("interface created and up");
		Ok(())
	}

	#[instrument(skip(self))]
	async fn delete(&self, name: &str) -> Result<(), IfaceError> {
		run_ip(&self.program, "delete interface", &args(&["link", "delete", name])).await?;
		debug!("interface deleted");
		Ok(())
	}

	#[instrument(skip(self), fields(%network))]
	async fn set_route(&self, name: &str, network: &IpNet) -> Result<(), IfaceError> {
		run_ip(&self.program, "add route", &route_add_args(name, network)).await?;
		debug!("route added");
		Ok(())
	}

	#[instrument(skip(self))]
	async fn flush_routes(&self, name: &str) -> Result<(), IfaceError> {
		// The default family is IPv4 only.
		run_ip(&self.program, "flush routes", &flush_args(name, false)).await?;

		if let Err(e) = run_ip(&self.program, "flush IPv6 routes", &flush_args(name, true)).await {
			warn!(error = %e, "failed to flush IPv6 routes");
		}

		debug!("routes flushed");
		Ok(())
	}
}

/// Runs the configured `ip` binary, mapping a non-zero exit to
/// [`IfaceError::CommandFailed`].
async fn run_ip(program: &Path, op: &'static str, args: &[String]) -> Result<(), IfaceError> {
	trace!(
		cmd = %format!("{} {}", program.display(), args.join(" ")),
		"running network command"
	);

	let output = Command::new(program)
		.args(args)
		.output()
		.await
		.map_err(|e| {
			if e.kind() == std::io::ErrorKind::NotFound {
				IfaceError::NotInstalled(program.display().to_string())
			} else {
				IfaceError::Io(e)
			}
		})?;

	if output.status.success() {
		return Ok(());
	}

	Err(IfaceError::CommandFailed {
		op,
		program: program.display().to_string(),
		args: args.join(" "),
		status: output.status.to_string(),
		stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
	})
}
