// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! In-memory controller, network and tunnel doubles that record every call
//! into one ordered log.

#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use wgd_daemon::{
	Controller, ControllerError, DeviceConfig, IfaceError, NetworkConfig, Reconciler,
	TunnelConfigurator, TunnelControl, TunnelError,
};
use wgd_tunnel_common::{DaemonConfig, DaemonConfigDto, IpNet, PeerConfigDto, WgPrivateKey};

pub const IFACE: &str = "wg0";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
	InterfaceExists(String),
	Create { name: String, address: String },
	Delete(String),
	FlushRoutes(String),
	SetRoute { name: String, network: String },
	Configure {
		name: String,
		peers: usize,
		replace_peers: bool,
	},
}

#[derive(Debug, Clone, Default)]
pub struct CallLog(Arc<Mutex<Vec<Call>>>);

impl CallLog {
	pub fn push(&self, call: Call) {
		self.0.lock().unwrap().push(call);
	}

	pub fn calls(&self) -> Vec<Call> {
		self.0.lock().unwrap().clone()
	}

	pub fn clear(&self) {
		self.0.lock().unwrap().clear();
	}
}

pub fn flush(name: &str) -> Call {
	Call::FlushRoutes(name.to_string())
}

pub fn route(name: &str, network: &str) -> Call {
	Call::SetRoute {
		name: name.to_string(),
		network: network.to_string(),
	}
}

pub fn configure(name: &str, peers: usize) -> Call {
	Call::Configure {
		name: name.to_string(),
		peers,
		replace_peers: true,
	}
}

fn unavailable() -> ControllerError {
	ControllerError::Status {
		status: 503,
		body: "controller unavailable".to_string(),
	}
}

fn command_failed(op: &'static str, args: String) -> IfaceError {
	IfaceError::CommandFailed {
		op,
		program: "ip".to_string(),
		args,
		status: "exit status: 2".to_string(),
		stderr: "RTNETLINK answers: Operation not permitted".to_string(),
	}
}

/// Controller whose responses are set by the test. `None` means the call
/// fails.
pub struct FakeController {
	config: Mutex<Option<DaemonConfigDto>>,
	version: Mutex<Option<u64>>,
	peers: Mutex<Option<Vec<PeerConfigDto>>>,
	heartbeat_fails: AtomicBool,
	pub version_calls: AtomicUsize,
	pub peer_calls: AtomicUsize,
	pub heartbeats: AtomicUsize,
}

impl FakeController {
	pub fn new(config: DaemonConfigDto) -> Self {
		Self {
			config: Mutex::new(Some(config)),
			version: Mutex::new(Some(1)),
			peers: Mutex::new(Some(Vec::new())),
			heartbeat_fails: AtomicBool::new(false),
			version_calls: AtomicUsize::new(0),
			peer_calls: AtomicUsize::new(0),
			heartbeats: AtomicUsize::new(0),
		}
	}

	pub fn set_config(&self, config: Option<DaemonConfigDto>) {
		*self.config.lock().unwrap() = config;
	}

	pub fn set_version(&self, version: Option<u64>) {
		*self.version.lock().unwrap() = version;
	}

	pub fn set_peers(&self, peers: Option<Vec<PeerConfigDto>>) {
		*self.peers.lock().unwrap() = peers;
	}

	pub fn fail_heartbeats(&self, fail: bool) {
		self.heartbeat_fails.store(fail, Ordering::SeqCst);
	}

	pub fn version_calls(&self) -> usize {
		self.version_calls.load(Ordering::SeqCst)
	}

	pub fn peer_calls(&self) -> usize {
		self.peer_calls.load(Ordering::SeqCst)
	}

	pub fn heartbeats(&self) -> usize {
		self.heartbeats.load(Ordering::SeqCst)
	}
}

#[async_trait]
impl Controller for FakeController {
	async fn get_config(&self) -> Result<DaemonConfigDto, ControllerError> {
		self.config.lock().unwrap().clone().ok_or_else(unavailable)
	}

	async fn get_version(&self) -> Result<u64, ControllerError> {
		self.version_calls.fetch_add(1, Ordering::SeqCst);
		self.version.lock().unwrap().ok_or_else(unavailable)
	}

	async fn get_peers(&self) -> Result<Vec<PeerConfigDto>, ControllerError> {
		self.peer_calls.fetch_add(1, Ordering::SeqCst);
		self.peers.lock().unwrap().clone().ok_or_else(unavailable)
	}

	async fn send_heartbeat(&self) -> Result<(), ControllerError> {
		self.heartbeats.fetch_add(1, Ordering::SeqCst);
		if self.heartbeat_fails.load(Ordering::SeqCst) {
			return Err(unavailable());
		}
		Ok(())
	}
}

pub struct RecordingNetwork {
	log: CallLog,
	failing_routes: Mutex<HashSet<String>>,
	fail_flush: AtomicBool,
	fail_create: AtomicBool,
}

impl RecordingNetwork {
	pub fn new(log: CallLog) -> Self {
		Self {
			log,
			failing_routes: Mutex::new(HashSet::new()),
			fail_flush: AtomicBool::new(false),
			fail_create: AtomicBool::new(false),
		}
	}

	pub fn fail_route(&self, network: &str) {
		self.failing_routes.lock().unwrap().insert(network.to_string());
	}

	pub fn fail_flush(&self, fail: bool) {
		self.fail_flush.store(fail, Ordering::SeqCst);
	}

	pub fn fail_create(&self, fail: bool) {
		self.fail_create.store(fail, Ordering::SeqCst);
	}
}

#[async_trait]
impl NetworkConfig for RecordingNetwork {
	async fn create(&self, name: &str, address: &IpNet) -> Result<(), IfaceError> {
		self.log.push(Call::Create {
			name: name.to_string(),
			address: address.to_string(),
		});
		if self.fail_create.load(Ordering::SeqCst) {
			return Err(command_failed(
				"create interface",
				format!("link add {name} type wireguard"),
			));
		}
		Ok(())
	}

	async fn delete(&self, name: &str) -> Result<(), IfaceError> {
		self.log.push(Call::Delete(name.to_string()));
		Ok(())
	}

	async fn set_route(&self, name: &str, network: &IpNet) -> Result<(), IfaceError> {
		let network = network.to_string();
		self.log.push(route(name, &network));
		if self.failing_routes.lock().unwrap().contains(&network) {
			return Err(command_failed(
				"add route",
				format!("route add {network} dev {name}"),
			));
		}
		Ok(())
	}

	async fn flush_routes(&self, name: &str) -> Result<(), IfaceError> {
		self.log.push(flush(name));
		if self.fail_flush.load(Ordering::SeqCst) {
			return Err(command_failed(
				"flush routes",
				format!("route flush dev {name}"),
			));
		}
		Ok(())
	}
}

pub struct RecordingControl {
	log: CallLog,
	exists: AtomicBool,
	fail_configure: AtomicBool,
	configs: Mutex<Vec<DeviceConfig>>,
}

impl RecordingControl {
	pub fn new(log: CallLog) -> Self {
		Self {
			log,
			exists: AtomicBool::new(false),
			fail_configure: AtomicBool::new(false),
			configs: Mutex::new(Vec::new()),
		}
	}

	pub fn set_exists(&self, exists: bool) {
		self.exists.store(exists, Ordering::SeqCst);
	}

	pub fn fail_configure(&self, fail: bool) {
		self.fail_configure.store(fail, Ordering::SeqCst);
	}

	pub fn configs(&self) -> Vec<DeviceConfig> {
		self.configs.lock().unwrap().clone()
	}
}

#[async_trait]
impl TunnelControl for RecordingControl {
	async fn interface_exists(&self, name: &str) -> Result<bool, TunnelError> {
		self.log.push(Call::InterfaceExists(name.to_string()));
		Ok(self.exists.load(Ordering::SeqCst))
	}

	async fn configure(&self, name: &str, config: &DeviceConfig) -> Result<(), TunnelError> {
		self.log.push(Call::Configure {
			name: name.to_string(),
			peers: config.peers.len(),
			replace_peers: config.replace_peers,
		});
		if self.fail_configure.load(Ordering::SeqCst) {
			return Err(TunnelError::Io(std::io::Error::other("netlink: permission denied")));
		}
		self.configs.lock().unwrap().push(config.clone());
		Ok(())
	}
}

pub fn daemon_config() -> DaemonConfig {
	DaemonConfig {
		private_key: WgPrivateKey::generate(),
		address: "10.8.0.1/24".parse().unwrap(),
		listen_port: 51820,
	}
}

pub fn peer(allowed_ips: &[&str]) -> PeerConfigDto {
	PeerConfigDto {
		public_key: WgPrivateKey::generate().public_key().to_base64(),
		endpoint: "203.0.113.10".to_string(),
		port: 51820,
		allowed_ips: allowed_ips.iter().map(|s| s.to_string()).collect(),
	}
}

/// Doubles sharing one call log, plus the identity they were set up with.
pub struct Harness {
	pub log: CallLog,
	pub daemon: DaemonConfig,
	pub controller: Arc<FakeController>,
	pub network: Arc<RecordingNetwork>,
	pub control: Arc<RecordingControl>,
}

impl Harness {
	pub fn new() -> Self {
		let log = CallLog::default();
		let daemon = daemon_config();
		Self {
			controller: Arc::new(FakeController::new(daemon.to_dto())),
			network: Arc::new(RecordingNetwork::new(log.clone())),
			control: Arc::new(RecordingControl::new(log.clone())),
			daemon,
			log,
		}
	}

	pub fn reconciler(&self) -> Reconciler {
		let configurator =
			TunnelConfigurator::new(self.control.clone(), IFACE.to_string(), &self.daemon);
		Reconciler::new(
			self.controller.clone(),
			self.network.clone(),
			configurator,
			IFACE.to_string(),
		)
	}
}
