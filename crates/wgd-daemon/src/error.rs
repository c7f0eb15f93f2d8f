// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use thiserror::Error;
use wgd_tunnel_common::{DaemonConfigError, PeerParseError};

#[derive(Debug, Error)]
pub enum DaemonError {
	#[error("controller error: {0}")]
	Controller(#[from] ControllerError),

	#[error("interface error: {0}")]
	Iface(#[from] IfaceError),

	#[error("tunnel error: {0}")]
	Tunnel(#[from] TunnelError),

	#[error("configuration error: {0}")]
	Config(#[from] ConfigError),

	#[error("controller issued an invalid daemon config: {0}")]
	InvalidDaemonConfig(#[from] DaemonConfigError),

	#[error("background task failed: {0}")]
	Task(#[from] tokio::task::JoinError),
}

#[derive(Debug, Error)]
pub enum ControllerError {
	#[error("HTTP error: {0}")]
	Http(#[from] reqwest::Error),

	#[error("controller returned status {status}: {body}")]
	Status { status: u16, body: String },

	#[error("failed to decode {what}: {reason}")]
	Decode { what: &'static str, reason: String },

	#[error("URL parse error: {0}")]
	Url(#[from] url::ParseError),
}

#[derive(Debug, Error)]
pub enum IfaceError {
	#[error("failed to {op}: `{program} {args}` exited with {status}: {stderr}")]
	CommandFailed {
		op: &'static str,
		program: String,
		args: String,
		status: String,
		stderr: String,
	},

	#[error("network tool not found: {0}")]
	NotInstalled(String),

	#[error("IO error: {0}")]
	Io(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum TunnelError {
	#[error("invalid peer list: {0}")]
	Parse(#[from] PeerParseError),

	#[error("invalid interface name: {0:?}")]
	InterfaceName(String),

	#[error("invalid key for device update: {0}")]
	Key(String),

	#[error("device configuration failed: {0}")]
	Io(#[from] std::io::Error),

	#[error("control-plane task failed: {0}")]
	Join(#[from] tokio::task::JoinError),
}

#[derive(Debug, Error)]
pub enum ConfigError {
	#[error("invalid controller address {value:?}: {reason}")]
	ControllerAddress { value: String, reason: String },

	#[error("invalid interface name {name:?}: {reason}")]
	InterfaceName { name: String, reason: &'static str },

	#[error("{0} must be greater than zero")]
	ZeroInterval(&'static str),
}

pub type Result<T> = std::result::Result<T, DaemonError>;
