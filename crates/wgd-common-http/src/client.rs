// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

use reqwest::{Client, ClientBuilder};
use std::time::Duration;

/// Creates a client builder with the standard wgd User-Agent header.
pub fn builder() -> ClientBuilder {
	Client::builder().user_agent(user_agent())
}

/// Creates a client with the standard User-Agent and no request timeout.
pub fn new_client() -> Result<Client, reqwest::Error> {
	builder().build()
}

/// Creates a client whose requests give up after `timeout`.
///
/// `None` leaves requests unbounded, which means a hung controller can stall
/// shutdown of the loop that issued the request.
pub fn new_client_with_timeout(timeout: Option<Duration>) -> Result<Client, reqwest::Error> {
	match timeout {
		Some(timeout) => builder().timeout(timeout).build(),
		None => builder().build(),
	}
}

/// Returns the User-Agent string, formatted as `wgd/{os}-{arch}/{version}`.
pub fn user_agent() -> String {
	format!(
		"wgd/{}-{}/{}",
		std::env::consts::OS,
		std::env::consts::ARCH,
		env!("CARGO_PKG_VERSION")
	)
}
