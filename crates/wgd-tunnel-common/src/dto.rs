// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Wire types exchanged with the controller's `/api/daemon/*` endpoints.
//!
//! These are kept as close to the JSON as possible; validation happens when
//! they are converted into [`crate::DaemonConfig`] and [`crate::PeerSet`].

use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// Body of `GET /api/daemon/config`.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DaemonConfigDto {
	pub private_key: String,
	pub address: String,
	pub port: u16,
}

impl fmt::Debug for DaemonConfigDto {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("DaemonConfigDto")
			.field("private_key", &"[REDACTED]")
			.field("address", &self.address)
			.field("port", &self.port)
			.finish()
	}
}

/// One element of `GET /api/daemon/peers`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeerConfigDto {
	pub public_key: String,
	#[serde(default, deserialize_with = "null_as_default")]
	pub endpoint: String,
	#[serde(default, deserialize_with = "null_as_default")]
	pub port: u16,
	#[serde(default, deserialize_with = "null_as_default")]
	pub allowed_ips: Vec<String>,
}

/// The controller serialises missing values as `null` as often as it omits
/// them.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
	D: Deserializer<'de>,
	T: Default + Deserialize<'de>,
{
	Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}
