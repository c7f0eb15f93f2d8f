// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use crate::dto::DaemonConfigDto;
use crate::keys::{KeyError, WgPrivateKey, WgPublicKey};
use ipnet::IpNet;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DaemonConfigError {
	#[error("invalid private key: {0}")]
	PrivateKey(#[from] KeyError),

	#[error("invalid interface address {value:?}: {source}")]
	Address {
		value: String,
		#[source]
		source: ipnet::AddrParseError,
	},
}

/// Tunnel identity issued by the controller at startup.
///
/// Parsed once and never mutated for the lifetime of the process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DaemonConfig {
	pub private_key: WgPrivateKey,
	/// Interface address with its prefix; host bits are kept so that
	/// `10.8.0.1/24` assigns `10.8.0.1` rather than the network address.
	pub address: IpNet,
	pub listen_port: u16,
}

impl DaemonConfig {
	pub fn from_dto(dto: &DaemonConfigDto) -> Result<Self, DaemonConfigError> {
		let private_key = WgPrivateKey::from_base64(&dto.private_key)?;
		let address = dto
			.address
			.trim()
			.parse::<IpNet>()
			.map_err(|source| DaemonConfigError::Address {
				value: dto.address.clone(),
				source,
			})?;

		Ok(Self {
			private_key,
			address,
			listen_port: dto.port,
		})
	}

	pub fn to_dto(&self) -> DaemonConfigDto {
		DaemonConfigDto {
			private_key: self.private_key.to_base64().expose().clone(),
			address: self.address.to_string(),
			port: self.listen_port,
		}
	}

	pub fn public_key(&self) -> WgPublicKey {
		self.private_key.public_key()
	}
}
