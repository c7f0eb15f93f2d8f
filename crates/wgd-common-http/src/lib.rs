// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! Shared HTTP client for wgd.
//!
//! Every request the daemon makes carries the same `User-Agent` so the
//! controller can tell agent builds apart in its access logs.

mod client;

pub use client::{builder, new_client, new_client_with_timeout, user_agent};
