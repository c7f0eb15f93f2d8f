// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

pub mod daemon_config;
pub mod dto;
pub mod keys;
pub mod peer;

pub use daemon_config::{DaemonConfig, DaemonConfigError};
pub use dto::{DaemonConfigDto, PeerConfigDto};
pub use keys::{KeyError, WgPrivateKey, WgPublicKey};
pub use peer::{parse_allowed_ip, Peer, PeerEndpoint, PeerParseError, PeerSet};

/// Re-exported so downstream crates name ranges with the same type.
pub use ipnet::IpNet;
