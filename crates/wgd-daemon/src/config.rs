// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use crate::error::ConfigError;
use std::path::PathBuf;
use std::time::Duration;
use url::Url;
use wgd_common_secret::SecretString;

pub const DEFAULT_INTERFACE: &str = "wg0";
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(60);
pub const DEFAULT_POLL_ERROR_BACKOFF: Duration = Duration::from_secs(10);
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(10);
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Linux limits interface names to IFNAMSIZ - 1 bytes.
const MAX_INTERFACE_NAME_LEN: usize = 15;

/// Which WireGuard control plane the daemon talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum ControlBackend {
	/// In-kernel WireGuard, configured over netlink.
	#[default]
	Kernel,
	/// A userspace implementation exposing the UAPI socket.
	Userspace,
}

#[derive(Debug, Clone)]
pub struct DaemonSettings {
	pub controller_url: Url,
	pub api_key: SecretString,
	pub interface: String,
	pub poll_interval: Duration,
	pub poll_error_backoff: Duration,
	pub heartbeat_interval: Duration,
	/// `None` disables the per-request timeout.
	pub http_timeout: Option<Duration>,
	pub backend: ControlBackend,
	pub ip_command: PathBuf,
	pub cleanup_on_exit: bool,
}

impl DaemonSettings {
	pub fn new(controller: &str, api_key: SecretString) -> Result<Self, ConfigError> {
		Ok(Self {
			controller_url: parse_controller_url(controller)?,
			api_key,
			interface: DEFAULT_INTERFACE.to_string(),
			poll_interval: DEFAULT_POLL_INTERVAL,
			poll_error_backoff: DEFAULT_POLL_ERROR_BACKOFF,
			heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
			http_timeout: Some(DEFAULT_HTTP_TIMEOUT),
			backend: ControlBackend::default(),
			ip_command: PathBuf::from("ip"),
			cleanup_on_exit: false,
		})
	}

	pub fn validate(&self) -> Result<(), ConfigError> {
		validate_interface_name(&self.interface)?;

		for (name, value) in [
			("poll interval", self.poll_interval),
			("poll error backoff", self.poll_error_backoff),
			("heartbeat interval", self.heartbeat_interval),
		] {
			if value.is_zero() {
				return Err(ConfigError::ZeroInterval(name));
			}
		}

		Ok(())
	}
}

/// Accepts either a bare `host[:port]` (the controller's historical form,
/// implying plain HTTP) or a full `http://` / `https://` URL.
///
/// The returned URL always ends in `/` so endpoint paths can be joined
/// relative to a controller mounted under a path prefix.
pub fn parse_controller_url(value: &str) -> Result<Url, ConfigError> {
	let trimmed = value.trim();
	let invalid = |reason: String| ConfigError::ControllerAddress {
		value: value.to_string(),
		reason,
	};

	if trimmed.is_empty() {
		return Err(invalid("address is empty".to_string()));
	}

	let candidate = if trimmed.contains("://") {
		trimmed.to_string()
	} else {
		format!("http://{trimmed}")
	};

	let mut url = Url::parse(&candidate).map_err(|e| invalid(e.to_string()))?;

	if !matches!(url.scheme(), "http" | "https") {
		return Err(invalid(format!("unsupported scheme {:?}", url.scheme())));
	}
	if url.host_str().is_none() {
		return Err(invalid("missing host".to_string()));
	}

	if !url.path().ends_with('/') {
		let path = format!("{}/", url.path());
		url.set_path(&path);
	}

	Ok(url)
}

pub fn validate_interface_name(name: &str) -> Result<(), ConfigError> {
	let invalid = |reason| ConfigError::InterfaceName {
		name: name.to_string(),
		reason,
	};

	if name.is_empty() {
		return Err(invalid("name is empty"));
	}
	if name.len() > MAX_INTERFACE_NAME_LEN {
		return Err(invalid("name is longer than 15 bytes"));
	}
	if name == "." || name == ".." {
		return Err(invalid("name is reserved"));
	}
	if name
		.chars()
		.any(|c| c == '/' || c == ':' || c.is_whitespace() || c.is_control())
	{
		return Err(invalid("name contains '/', ':' or whitespace"));
	}

	Ok(())
}
