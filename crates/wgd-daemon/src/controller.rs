// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use crate::error::ControllerError;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use std::time::Duration;
use tracing::{debug, instrument};
use url::Url;
use wgd_common_secret::SecretString;
use wgd_tunnel_common::{DaemonConfigDto, PeerConfigDto};

/// Header carrying the shared daemon secret on every controller request.
pub const DAEMON_KEY_HEADER: &str = "X-Daemon-Key";

const CONFIG_PATH: &str = "api/daemon/config";
const VERSION_PATH: &str = "api/daemon/config/version";
const PEERS_PATH: &str = "api/daemon/peers";
const HEARTBEAT_PATH: &str = "api/daemon/heartbeat";

/// The remote controller as seen by the daemon.
#[async_trait]
pub trait Controller: Send + Sync {
	/// Tunnel identity: private key, interface address and listen port.
	async fn get_config(&self) -> Result<DaemonConfigDto, ControllerError>;

	/// Current topology version. Changes whenever the peer list does.
	async fn get_version(&self) -> Result<u64, ControllerError>;

	/// Full peer list for the current version.
	async fn get_peers(&self) -> Result<Vec<PeerConfigDto>, ControllerError>;

	/// Liveness ping.
	async fn send_heartbeat(&self) -> Result<(), ControllerError>;
}

pub struct HttpController {
	http: Client,
	base_url: Url,
	api_key: SecretString,
}

impl HttpController {
	pub fn new(
		base_url: Url,
		api_key: SecretString,
		timeout: Option<Duration>,
	) -> Result<Self, ControllerError> {
		let http = wgd_common_http::new_client_with_timeout(timeout)?;
		Ok(Self {
			http,
			base_url,
			api_key,
		})
	}

	fn endpoint(&self, path: &str) -> Result<Url, ControllerError> {
		Ok(self.base_url.join(path)?)
	}

	/// Issues an authenticated GET and returns the body of a 200 response.
	async fn get_text(&self, path: &str) -> Result<String, ControllerError> {
		let url = self.endpoint(path)?;

		debug!(%url, "requesting controller endpoint");

		let response = self
			.http
			.get(url)
			.header(DAEMON_KEY_HEADER, self.api_key.expose().as_str())
			.send()
			.await?;

		let status = response.status();
		if status != StatusCode::OK {
			let body = response.text().await.unwrap_or_default();
			return Err(ControllerError::Status {
				status: status.as_u16(),
				body,
			});
		}

		Ok(response.text().await?)
	}
}

#[async_trait]
impl Controller for HttpController {
	#[instrument(skip(self))]
	async fn get_config(&self) -> Result<DaemonConfigDto, ControllerError> {
		let body = self.get_text(CONFIG_PATH).await?;
		serde_json::from_str(&body).map_err(|e| ControllerError::Decode {
			what: "daemon config",
			reason: e.to_string(),
		})
	}

	#[instrument(skip(self))]
	async fn get_version(&self) -> Result<u64, ControllerError> {
		let body = self.get_text(VERSION_PATH).await?;
		body.trim().parse().map_err(|e: std::num::ParseIntError| {
			ControllerError::Decode {
				what: "config version",
				reason: format!("{e} (body {:?})", body.trim()),
			}
		})
	}

	#[instrument(skip(self))]
	async fn get_peers(&self) -> Result<Vec<PeerConfigDto>, ControllerError> {
		let body = self.get_text(PEERS_PATH).await?;
		let peers: Option<Vec<PeerConfigDto>> =
			serde_json::from_str(&body).map_err(|e| ControllerError::Decode {
				what: "peer list",
				reason: e.to_string(),
			})?;
		let peers = peers.unwrap_or_default();
		debug!(count = peers.len(), "fetched peer list");
		Ok(peers)
	}

	#[instrument(skip(self))]
	async fn send_heartbeat(&self) -> Result<(), ControllerError> {
		self.get_text(HEARTBEAT_PATH).await?;
		debug!("heartbeat sent");
		Ok(())
	}
}

impl std::fmt::Debug for HttpController {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("HttpController")
			.field("base_url", &self.base_url)
			.field("api_key", &self.api_key)
			.finish()
	}
}
