// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Test helpers: tracing setup and an in-memory engine.
//!
//! [`FakeLauncher`] stands in for a real server. Every runtime it starts
//! shares one [`FakeEngineState`], which lets a test inject clone failures,
//! slow clones down and observe what was created.

use std::sync::atomic::{AtomicBool, AtomicU16, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use pgwarm_config::{ConnectProperties, EngineConfig, LoggingConfig};
use sqlx::postgres::PgConnectOptions;
use tracing_subscriber::EnvFilter;

use crate::engine::{AdminConnection, CloneRequest, EngineLauncher, EngineRuntime, TemplateDatabase};
use crate::error::{PreparationError, StartupError};
use crate::preparer::SchemaPreparer;

const FIRST_FAKE_PORT: u16 = 40000;

/// Installs a fmt subscriber for tests. Safe to call more than once.
pub fn init_tracing(config: &LoggingConfig) {
	let filter = EnvFilter::try_new(&config.filter).unwrap_or_else(|_| EnvFilter::new("info"));
	let builder = tracing_subscriber::fmt()
		.with_env_filter(filter)
		.with_test_writer();
	let _ = if config.json {
		builder.json().try_init()
	} else {
		builder.try_init()
	};
}

#[derive(Debug, Default)]
pub struct FakeEngineState {
	starts: AtomicUsize,
	closes: AtomicUsize,
	attempts: AtomicUsize,
	fail_start: AtomicBool,
	fail_creates: AtomicBool,
	create_delay_ms: AtomicU64,
	created: Mutex<Vec<String>>,
	next_port: AtomicU16,
}

impl FakeEngineState {
	fn created(&self) -> std::sync::MutexGuard<'_, Vec<String>> {
		self.created.lock().unwrap_or_else(PoisonError::into_inner)
	}
}

#[derive(Debug, Clone, Default)]
pub struct FakeLauncher {
	state: Arc<FakeEngineState>,
}

impl FakeLauncher {
	pub fn new() -> Self {
		Self::default()
	}

	/// Runtimes started so far.
	pub fn starts(&self) -> usize {
		self.state.starts.load(Ordering::SeqCst)
	}

	/// Runtimes closed so far.
	pub fn closes(&self) -> usize {
		self.state.closes.load(Ordering::SeqCst)
	}

	/// Clone commands issued so far, successful or not.
	pub fn attempts(&self) -> usize {
		self.state.attempts.load(Ordering::SeqCst)
	}

	/// Names of databases successfully created, in order.
	pub fn created(&self) -> Vec<String> {
		self.state.created().clone()
	}

	pub fn set_start_failure(&self, fail: bool) {
		self.state.fail_start.store(fail, Ordering::SeqCst);
	}

	pub fn set_create_failures(&self, fail: bool) {
		self.state.fail_creates.store(fail, Ordering::SeqCst);
	}

	pub fn set_create_delay(&self, delay: Duration) {
		self
			.state
			.create_delay_ms
			.store(delay.as_millis() as u64, Ordering::SeqCst);
	}
}

#[async_trait]
impl EngineLauncher for FakeLauncher {
	async fn start(&self, config: &EngineConfig) -> Result<Arc<dyn EngineRuntime>, StartupError> {
		if self.state.fail_start.load(Ordering::SeqCst) {
			return Err(StartupError::Timeout(config.startup_timeout));
		}
		let index = self.state.starts.fetch_add(1, Ordering::SeqCst);
		let port = FIRST_FAKE_PORT + self.state.next_port.fetch_add(1, Ordering::SeqCst);
		let options = PgConnectOptions::new()
			.host(&config.host)
			.port(port)
			.username(&config.superuser);

		Ok(Arc::new(FakeRuntime {
			state: Arc::clone(&self.state),
			host: config.host.clone(),
			port,
			properties: config.connect_properties.clone(),
			template: TemplateDatabase::new(format!("fake_template_{index}"), options),
		}))
	}
}

#[derive(Debug)]
pub struct FakeRuntime {
	state: Arc<FakeEngineState>,
	host: String,
	port: u16,
	properties: ConnectProperties,
	template: TemplateDatabase,
}

#[async_trait]
impl EngineRuntime for FakeRuntime {
	fn host(&self) -> &str {
		&self.host
	}

	fn port(&self) -> u16 {
		self.port
	}

	fn connection_properties(&self) -> &ConnectProperties {
		&self.properties
	}

	fn template_database(&self) -> TemplateDatabase {
		self.template.clone()
	}

	async fn admin_connection(&self, _role: &str) -> Result<Box<dyn AdminConnection>, sqlx::Error> {
		Ok(Box::new(FakeAdminConnection {
			state: Arc::clone(&self.state),
		}))
	}

	async fn close(&self) {
		self.state.closes.fetch_add(1, Ordering::SeqCst);
	}
}

struct FakeAdminConnection {
	state: Arc<FakeEngineState>,
}

#[async_trait]
impl AdminConnection for FakeAdminConnection {
	async fn create_database(&mut self, request: &CloneRequest) -> Result<(), sqlx::Error> {
		self.state.attempts.fetch_add(1, Ordering::SeqCst);

		let delay = self.state.create_delay_ms.load(Ordering::SeqCst);
		if delay > 0 {
			tokio::time::sleep(Duration::from_millis(delay)).await;
		}
		if self.state.fail_creates.load(Ordering::SeqCst) {
			return Err(sqlx::Error::Protocol(
				"simulated admin connection failure".to_string(),
			));
		}

		let mut created = self.state.created();
		if created.contains(&request.name) {
			return Err(sqlx::Error::Protocol(format!(
				"database \"{}\" already exists",
				request.name
			)));
		}
		created.push(request.name.clone());
		Ok(())
	}

	async fn close(&mut self) -> Result<(), sqlx::Error> {
		Ok(())
	}
}

/// Counts how often it prepares a template. Equality is by name and
/// failure mode only, so two recorders with the same name share a cluster.
#[derive(Debug, Clone)]
pub struct RecordingPreparer {
	name: String,
	fail: bool,
	calls: Arc<AtomicUsize>,
}

impl RecordingPreparer {
	pub fn new(name: impl Into<String>) -> Self {
		Self {
			name: name.into(),
			fail: false,
			calls: Arc::new(AtomicUsize::new(0)),
		}
	}

	/// A recorder whose `prepare` always fails.
	pub fn failing(name: impl Into<String>) -> Self {
		Self {
			fail: true,
			..Self::new(name)
		}
	}

	pub fn calls(&self) -> usize {
		self.calls.load(Ordering::SeqCst)
	}
}

impl PartialEq for RecordingPreparer {
	fn eq(&self, other: &Self) -> bool {
		self.name == other.name && self.fail == other.fail
	}
}

impl Eq for RecordingPreparer {}

impl std::hash::Hash for RecordingPreparer {
	fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
		self.name.hash(state);
		self.fail.hash(state);
	}
}

#[async_trait]
impl SchemaPreparer for RecordingPreparer {
	async fn prepare(&self, template: &TemplateDatabase) -> Result<(), PreparationError> {
		self.calls.fetch_add(1, Ordering::SeqCst);
		if self.fail {
			return Err(PreparationError::Failed(format!(
				"{} refused template {}",
				self.name,
				template.name()
			)));
		}
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn test_fake_runtime_rejects_duplicate_names() {
		let launcher = FakeLauncher::new();
		let runtime = launcher.start(&EngineConfig::default()).await.unwrap();
		let request = CloneRequest {
			name: "duplicate".to_string(),
			template: runtime.template_database().name().to_string(),
			owner: "postgres".to_string(),
		};

		let mut admin = runtime.admin_connection("postgres").await.unwrap();
		admin.create_database(&request).await.unwrap();
		assert!(admin.create_database(&request).await.is_err());
		assert_eq!(launcher.attempts(), 2);
		assert_eq!(launcher.created(), vec!["duplicate".to_string()]);
	}

	#[tokio::test]
	async fn test_fake_launcher_counts_and_ports() {
		let launcher = FakeLauncher::new();
		let a = launcher.start(&EngineConfig::default()).await.unwrap();
		let b = launcher.start(&EngineConfig::default()).await.unwrap();
		assert_ne!(a.port(), b.port());
		assert_ne!(a.template_database().name(), b.template_database().name());

		a.close().await;
		assert_eq!(launcher.starts(), 2);
		assert_eq!(launcher.closes(), 1);

		launcher.set_start_failure(true);
		assert!(launcher.start(&EngineConfig::default()).await.is_err());
		assert_eq!(launcher.starts(), 2);
	}

	#[tokio::test]
	async fn test_recording_preparer_counts_calls() {
		let preparer = RecordingPreparer::new("schema");
		let template = TemplateDatabase::new("tmpl", PgConnectOptions::new());
		preparer.prepare(&template).await.unwrap();
		preparer.clone().prepare(&template).await.unwrap();
		assert_eq!(preparer.calls(), 2);

		assert_eq!(preparer, RecordingPreparer::new("schema"));
		assert_ne!(preparer, RecordingPreparer::failing("schema"));
		assert!(RecordingPreparer::failing("x").prepare(&template).await.is_err());
	}

	#[test]
	fn test_init_tracing_is_idempotent() {
		init_tracing(&LoggingConfig::default());
		init_tracing(&LoggingConfig {
			json: true,
			..LoggingConfig::default()
		});
	}
}
