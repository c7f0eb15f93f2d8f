// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use crate::dto::PeerConfigDto;
use crate::keys::{KeyError, WgPublicKey};
use ipnet::IpNet;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PeerParseError {
	#[error("peer {index}: invalid public key: {source}")]
	PublicKey {
		index: usize,
		#[source]
		source: KeyError,
	},

	#[error("peer {index}: invalid allowed ip {value:?}: {source}")]
	AllowedIp {
		index: usize,
		value: String,
		#[source]
		source: ipnet::AddrParseError,
	},
}

/// Where a peer can be reached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeerEndpoint {
	Addr(SocketAddr),
	/// A hostname, resolved when the peer set is applied.
	Host { host: String, port: u16 },
}

impl PeerEndpoint {
	pub fn socket_addr(&self) -> Option<SocketAddr> {
		match self {
			Self::Addr(addr) => Some(*addr),
			Self::Host { .. } => None,
		}
	}
}

impl fmt::Display for PeerEndpoint {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::Addr(addr) => write!(f, "{addr}"),
			Self::Host { host, port } => write!(f, "{host}:{port}"),
		}
	}
}

/// A peer whose key and allowed ranges have been validated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Peer {
	pub public_key: WgPublicKey,
	pub endpoint: Option<PeerEndpoint>,
	/// Network-normalised ranges (`10.0.0.7/24` becomes `10.0.0.0/24`).
	pub allowed_ips: Vec<IpNet>,
}

impl Peer {
	pub fn from_dto(index: usize, dto: &PeerConfigDto) -> Result<Self, PeerParseError> {
		let public_key = WgPublicKey::from_base64(&dto.public_key)
			.map_err(|source| PeerParseError::PublicKey { index, source })?;

		let allowed_ips = dto
			.allowed_ips
			.iter()
			.map(|value| {
				parse_allowed_ip(value).map_err(|source| PeerParseError::AllowedIp {
					index,
					value: value.clone(),
					source,
				})
			})
			.collect::<Result<Vec<_>, _>>()?;

		Ok(Self {
			public_key,
			endpoint: parse_endpoint(&dto.endpoint, dto.port),
			allowed_ips,
		})
	}
}

/// Parses one allowed-IP range, truncated to its network address.
pub fn parse_allowed_ip(value: &str) -> Result<IpNet, ipnet::AddrParseError> {
	value.trim().parse::<IpNet>().map(|net| net.trunc())
}

/// Endpoints never reject a peer: anything that is not an address is kept as
/// a hostname, and a missing port means the peer roams.
fn parse_endpoint(endpoint: &str, port: u16) -> Option<PeerEndpoint> {
	let endpoint = endpoint.trim();
	if endpoint.is_empty() {
		return None;
	}

	if port != 0 {
		let host = endpoint.trim_start_matches('[').trim_end_matches(']');
		return Some(match host.parse::<IpAddr>() {
			Ok(ip) => PeerEndpoint::Addr(SocketAddr::new(ip, port)),
			Err(_) => PeerEndpoint::Host {
				host: host.to_string(),
				port,
			},
		});
	}

	if let Ok(addr) = endpoint.parse::<SocketAddr>() {
		return Some(PeerEndpoint::Addr(addr));
	}

	match endpoint.rsplit_once(':') {
		Some((host, port)) if !host.is_empty() && !host.contains(':') => {
			let port = port.parse::<u16>().ok().filter(|p| *p != 0)?;
			Some(PeerEndpoint::Host {
				host: host.to_string(),
				port,
			})
		}
		_ => None,
	}
}

/// The complete peer list for one reconciliation cycle.
///
/// Building a set is all-or-nothing: one bad peer rejects the batch so the
/// device is never left with a partially applied topology.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PeerSet {
	peers: Vec<Peer>,
}

impl PeerSet {
	pub fn new(peers: Vec<Peer>) -> Self {
		Self { peers }
	}

	pub fn try_from_dtos(dtos: &[PeerConfigDto]) -> Result<Self, PeerParseError> {
		let peers = dtos
			.iter()
			.enumerate()
			.map(|(index, dto)| Peer::from_dto(index, dto))
			.collect::<Result<Vec<_>, _>>()?;
		Ok(Self { peers })
	}

	pub fn len(&self) -> usize {
		self.peers.len()
	}

	pub fn is_empty(&self) -> bool {
		self.peers.is_empty()
	}

	pub fn iter(&self) -> impl Iterator<Item = &Peer> {
		self.peers.iter()
	}

	/// Every allowed range of every peer, in peer order.
	pub fn routes(&self) -> impl Iterator<Item = &IpNet> {
		self.peers.iter().flat_map(|peer| peer.allowed_ips.iter())
	}
}

impl IntoIterator for PeerSet {
	type Item = Peer;
	type IntoIter = std::vec::IntoIter<Peer>;

	fn into_iter(self) -> Self::IntoIter {
		self.peers.into_iter()
	}
}
