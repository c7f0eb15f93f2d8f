// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

mod common;

use common::{configure, flush, peer, route, Call, Harness, IFACE};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use wgd_daemon::{DaemonError, DaemonSettings, Heartbeat, HeartbeatStats, WgDaemon};

fn settings() -> DaemonSettings {
	let mut settings = DaemonSettings::new("10.0.0.5:8080", "daemon-key".into()).unwrap();
	settings.poll_interval = Duration::from_secs(60);
	settings.poll_error_backoff = Duration::from_secs(10);
	settings.heartbeat_interval = Duration::from_secs(10);
	settings
}

fn daemon(h: &Harness, settings: DaemonSettings) -> WgDaemon {
	WgDaemon::new(
		settings,
		h.controller.clone(),
		h.network.clone(),
		h.control.clone(),
	)
}

fn create(address: &str) -> Call {
	Call::Create {
		name: IFACE.to_string(),
		address: address.to_string(),
	}
}

#[tokio::test(start_paused = true)]
async fn heartbeat_sends_immediately_then_every_interval() {
	let h = Harness::new();
	let shutdown = CancellationToken::new();
	let handle = tokio::spawn(
		Heartbeat::new(h.controller.clone(), Duration::from_secs(10)).run(shutdown.clone()),
	);

	tokio::time::sleep(Duration::from_secs(35)).await;
	shutdown.cancel();

	assert_eq!(
		handle.await.unwrap(),
		HeartbeatStats { sent: 4, failed: 0 }
	);
}

#[tokio::test(start_paused = true)]
async fn heartbeat_failures_keep_the_loop_running() {
	let h = Harness::new();
	h.controller.fail_heartbeats(true);
	let shutdown = CancellationToken::new();
	let handle = tokio::spawn(
		Heartbeat::new(h.controller.clone(), Duration::from_secs(10)).run(shutdown.clone()),
	);

	tokio::time::sleep(Duration::from_secs(25)).await;
	shutdown.cancel();

	assert_eq!(
		handle.await.unwrap(),
		HeartbeatStats { sent: 0, failed: 3 }
	);
}

#[tokio::test(start_paused = true)]
async fn startup_creates_interface_and_reconciles() {
	let h = Harness::new();
	h.controller.set_version(Some(4));
	h.controller.set_peers(Some(vec![peer(&["10.0.0.0/24"])]));
	let shutdown = CancellationToken::new();
	let daemon = daemon(&h, settings());
	let handle = tokio::spawn({
		let shutdown = shutdown.clone();
		async move { daemon.run(shutdown).await }
	});

	tokio::time::sleep(Duration::from_secs(1)).await;
	shutdown.cancel();
	let report = handle.await.unwrap().unwrap();

	assert_eq!(
		h.log.calls(),
		vec![
			Call::InterfaceExists(IFACE.to_string()),
			create("10.8.0.1/24"),
			flush(IFACE),
			configure(IFACE, 1),
			route(IFACE, "10.0.0.0/24"),
		]
	);
	assert_eq!(report.last_applied, Some(4));
	assert_eq!(report.heartbeat.sent, 1);
}

#[tokio::test(start_paused = true)]
async fn stale_interface_is_deleted_before_create() {
	let h = Harness::new();
	h.control.set_exists(true);
	let shutdown = CancellationToken::new();
	let daemon = daemon(&h, settings());
	let handle = tokio::spawn({
		let shutdown = shutdown.clone();
		async move { daemon.run(shutdown).await }
	});

	tokio::time::sleep(Duration::from_secs(1)).await;
	shutdown.cancel();
	handle.await.unwrap().unwrap();

	let calls = h.log.calls();
	assert_eq!(
		&calls[..3],
		&[
			Call::InterfaceExists(IFACE.to_string()),
			Call::Delete(IFACE.to_string()),
			create("10.8.0.1/24"),
		]
	);
}

#[tokio::test]
async fn config_fetch_failure_is_fatal() {
	let h = Harness::new();
	h.controller.set_config(None);

	let result = daemon(&h, settings()).run(CancellationToken::new()).await;

	assert!(matches!(result, Err(DaemonError::Controller(_))));
	assert!(h.log.calls().is_empty());
	assert_eq!(h.controller.heartbeats(), 0);
}

#[tokio::test]
async fn invalid_daemon_config_is_fatal() {
	let h = Harness::new();
	let mut dto = h.daemon.to_dto();
	dto.private_key = "short".to_string();
	h.controller.set_config(Some(dto));

	let result = daemon(&h, settings()).run(CancellationToken::new()).await;

	assert!(matches!(result, Err(DaemonError::InvalidDaemonConfig(_))));
	assert!(h.log.calls().is_empty());
}

#[tokio::test]
async fn interface_create_failure_is_fatal_and_stops_heartbeat() {
	let h = Harness::new();
	h.network.fail_create(true);

	// Never cancelled: returning at all means the heartbeat loop was stopped.
	let result = daemon(&h, settings()).run(CancellationToken::new()).await;

	assert!(matches!(result, Err(DaemonError::Iface(_))));
	assert_eq!(
		h.log.calls(),
		vec![
			Call::InterfaceExists(IFACE.to_string()),
			create("10.8.0.1/24"),
		]
	);
	assert_eq!(h.controller.version_calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn failing_heartbeats_do_not_interrupt_reconciliation() {
	let h = Harness::new();
	h.controller.fail_heartbeats(true);
	h.controller.set_version(Some(1));
	let shutdown = CancellationToken::new();
	let daemon = daemon(&h, settings());
	let handle = tokio::spawn({
		let shutdown = shutdown.clone();
		async move { daemon.run(shutdown).await }
	});

	tokio::time::sleep(Duration::from_secs(30)).await;
	h.controller.set_version(Some(2));
	tokio::time::sleep(Duration::from_secs(40)).await;
	shutdown.cancel();
	let report = handle.await.unwrap().unwrap();

	assert_eq!(report.last_applied, Some(2));
	assert_eq!(report.heartbeat.sent, 0);
	assert!(report.heartbeat.failed >= 7);
	assert_eq!(h.controller.version_calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn cleanup_on_exit_deletes_interface() {
	let h = Harness::new();
	let mut settings = settings();
	settings.cleanup_on_exit = true;
	let shutdown = CancellationToken::new();
	let daemon = Arc::new(daemon(&h, settings));
	let handle = tokio::spawn({
		let daemon = Arc::clone(&daemon);
		let shutdown = shutdown.clone();
		async move { daemon.run(shutdown).await }
	});

	tokio::time::sleep(Duration::from_secs(1)).await;
	shutdown.cancel();
	handle.await.unwrap().unwrap();

	assert_eq!(h.log.calls().last(), Some(&Call::Delete(IFACE.to_string())));
}
