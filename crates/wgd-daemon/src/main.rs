// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! `wgd` - WireGuard agent driven by a remote controller.

use anyhow::{anyhow, Context};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use wgd_common_secret::SecretString;
use wgd_daemon::{ControlBackend, DaemonSettings, WgDaemon};

mod version;

#[derive(Parser, Debug)]
#[command(
	name = "wgd",
	about = "Keeps a WireGuard interface in sync with a remote controller",
	version,
	subcommand_negates_reqs = true
)]
struct Args {
	#[command(subcommand)]
	command: Option<Command>,

	/// Controller address, either host[:port] or an http(s) URL
	#[arg(long, alias = "masterIp", env = "WGD_MASTER_IP", required = true)]
	master_ip: Option<String>,

	/// Shared secret sent as X-Daemon-Key
	#[arg(
		long,
		alias = "apiKey",
		env = "WGD_API_KEY",
		hide_env_values = true,
		required = true
	)]
	api_key: Option<SecretString>,

	/// WireGuard interface to manage
	#[arg(long, env = "WGD_INTERFACE", default_value = wgd_daemon::config::DEFAULT_INTERFACE)]
	interface: String,

	/// Seconds between config version polls
	#[arg(long, env = "WGD_POLL_INTERVAL_SECS", default_value_t = 60)]
	poll_interval_secs: u64,

	/// Seconds to wait after a failed version poll
	#[arg(long, env = "WGD_POLL_ERROR_BACKOFF_SECS", default_value_t = 10)]
	poll_error_backoff_secs: u64,

	#[arg(long, env = "WGD_HEARTBEAT_INTERVAL_SECS", default_value_t = 10)]
	heartbeat_interval_secs: u64,

	/// Per-request timeout for controller calls, 0 disables it
	#[arg(long, env = "WGD_HTTP_TIMEOUT_SECS", default_value_t = 30)]
	http_timeout_secs: u64,

	#[arg(long, env = "WGD_BACKEND", value_enum, default_value_t = ControlBackend::Kernel)]
	backend: ControlBackend,

	/// Path to the iproute2 `ip` binary
	#[arg(long, env = "WGD_IP_COMMAND", default_value = "ip")]
	ip_command: PathBuf,

	/// Delete the interface when the daemon stops
	#[arg(long, env = "WGD_CLEANUP_ON_EXIT")]
	cleanup_on_exit: bool,

	#[arg(long, env = "WGD_LOG_FORMAT", value_enum, default_value_t = LogFormat::Json)]
	log_format: LogFormat,
}

#[derive(Subcommand, Debug)]
enum Command {
	/// Show version and build information
	Version,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogFormat {
	Json,
	Text,
}

impl Args {
	fn into_settings(self) -> anyhow::Result<DaemonSettings> {
		let master_ip = self
			.master_ip
			.ok_or_else(|| anyhow!("--master-ip is required"))?;
		let api_key = self.api_key.ok_or_else(|| anyhow!("--api-key is required"))?;

		let mut settings = DaemonSettings::new(&master_ip, api_key)?;
		settings.interface = self.interface;
		settings.poll_interval = Duration::from_secs(self.poll_interval_secs);
		settings.poll_error_backoff = Duration::from_secs(self.poll_error_backoff_secs);
		settings.heartbeat_interval = Duration::from_secs(self.heartbeat_interval_secs);
		settings.http_timeout =
			(self.http_timeout_secs > 0).then(|| Duration::from_secs(self.http_timeout_secs));
		settings.backend = self.backend;
		settings.ip_command = self.ip_command;
		settings.cleanup_on_exit = self.cleanup_on_exit;

		settings.validate()?;
		Ok(settings)
	}
}

fn init_tracing(format: LogFormat) {
	let filter =
		tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into());
	let registry = tracing_subscriber::registry().with(filter);

	match format {
		LogFormat::Json => registry
			.with(tracing_subscriber::fmt::layer().json())
			.init(),
		LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).init(),
	}
}

/// Resolves on SIGINT, or SIGTERM on unix.
async fn shutdown_signal() {
	#[cfg(unix)]
	{
		use tokio::signal::unix::{signal, SignalKind};

		match signal(SignalKind::terminate()) {
			Ok(mut terminate) => {
				tokio::select! {
					_ = tokio::signal::ctrl_c() => {}
					_ = terminate.recv() => {}
				}
				return;
			}
			Err(e) => warn!(error = %e, "failed to install SIGTERM handler"),
		}
	}

	if let Err(e) = tokio::signal::ctrl_c().await {
		error!(error = %e, "failed to listen for ctrl-c");
		std::future::pending::<()>().await;
	}
}

async fn run(args: Args) -> anyhow::Result<()> {
	let settings = args.into_settings().context("invalid configuration")?;
	let daemon = WgDaemon::from_settings(settings).context("failed to initialise daemon")?;

	let shutdown = CancellationToken::new();
	let signal_token = shutdown.clone();
	tokio::spawn(async move {
		shutdown_signal().await;
		info!("received shutdown signal");
		signal_token.cancel();
	});

	let report = daemon.run(shutdown).await?;

	info!(
		last_applied = ?report.last_applied,
		heartbeats_sent = report.heartbeat.sent,
		heartbeats_failed = report.heartbeat.failed,
		"shutdown complete"
	);
	Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
	let args = Args::parse();

	if let Some(Command::Version) = args.command {
		println!("{}", version::format_version_info());
		return ExitCode::SUCCESS;
	}

	init_tracing(args.log_format);

	match run(args).await {
		Ok(()) => ExitCode::SUCCESS,
		Err(e) => {
			error!(error = %format!("{e:#}"), "wgd failed");
			ExitCode::FAILURE
		}
	}
}
