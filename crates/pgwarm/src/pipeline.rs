// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! The per-cluster provisioning pipeline.
//!
//! A background worker clones the template into a fresh database ahead of
//! demand, then parks until a consumer takes the result. At most one
//! finished result exists per cluster, so there is never more than one
//! unclaimed database.
//!
//! The worker runs on its own OS thread with a single-threaded tokio runtime,
//! so a cluster keeps working after the async runtime that created it is
//! gone (each `#[tokio::test]` gets its own runtime).
//!
//! Consumers hand the worker a oneshot reply slot through an unbounded
//! queue; the worker answers one slot per finished result. When a consumer
//! stops waiting, the send fails and the worker keeps the result for the
//! next slot.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;

use rand::Rng;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::connection::ConnectionInfo;
use crate::engine::{CloneRequest, EngineRuntime};
use crate::error::{ProviderError, ProvisioningFailure, StartupError};
use crate::result::ProvisionResult;

pub const DATABASE_NAME_LENGTH: usize = 12;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
	NotStarted,
	Running,
	Stopped,
}

type Demand = oneshot::Sender<ProvisionResult>;

pub struct ProvisionPipeline {
	runtime: Arc<dyn EngineRuntime>,
	owner: String,
	state: Mutex<PipelineState>,
	demand_tx: mpsc::UnboundedSender<Demand>,
	demand_rx: Mutex<Option<mpsc::UnboundedReceiver<Demand>>>,
	cancel: CancellationToken,
	worker: Mutex<Option<JoinHandle<()>>>,
}

impl ProvisionPipeline {
	/// Creates a pipeline that clones the runtime's template as `owner`.
	/// Nothing runs until [`start`](Self::start).
	pub fn new(runtime: Arc<dyn EngineRuntime>, owner: impl Into<String>) -> Self {
		let (demand_tx, demand_rx) = mpsc::unbounded_channel();
		Self {
			runtime,
			owner: owner.into(),
			state: Mutex::new(PipelineState::NotStarted),
			demand_tx,
			demand_rx: Mutex::new(Some(demand_rx)),
			cancel: CancellationToken::new(),
			worker: Mutex::new(None),
		}
	}

	pub fn state(&self) -> PipelineState {
		*lock(&self.state)
	}

	/// Launches the worker and returns immediately. Starting a running
	/// pipeline is a no-op; a stopped pipeline cannot be restarted.
	pub fn start(&self) -> Result<(), ProviderError> {
		let mut state = lock(&self.state);
		match *state {
			PipelineState::Running => return Ok(()),
			PipelineState::Stopped => return Err(ProviderError::PipelineStopped),
			PipelineState::NotStarted => {}
		}

		let runtime = tokio::runtime::Builder::new_current_thread()
			.enable_all()
			.build()
			.map_err(StartupError::Worker)?;

		let Some(demands) = lock(&self.demand_rx).take() else {
			return Err(ProviderError::PipelineStopped);
		};

		let worker = Worker {
			runtime: Arc::clone(&self.runtime),
			template: self.runtime.template_database().name().to_string(),
			owner: self.owner.clone(),
			demands,
			cancel: self.cancel.clone(),
		};

		let port = self.runtime.port();
		let handle = std::thread::Builder::new()
			.name(format!("cluster-{port}-preparer"))
			.spawn(move || runtime.block_on(worker.run()))
			.map_err(|e| {
				*state = PipelineState::Stopped;
				StartupError::Worker(e)
			})?;

		*lock(&self.worker) = Some(handle);
		*state = PipelineState::Running;
		info!(port, "provisioning pipeline started");
		Ok(())
	}

	/// Waits for the next provisioned database.
	///
	/// A failed clone is returned as [`ProviderError::Provisioning`]; the
	/// worker carries on with the next attempt.
	pub async fn next(&self) -> Result<ConnectionInfo, ProviderError> {
		Ok(self.next_result().await?.into_result()?)
	}

	/// Waits for the next result without unwrapping it.
	pub async fn next_result(&self) -> Result<ProvisionResult, ProviderError> {
		if self.cancel.is_cancelled() {
			return Err(ProviderError::PipelineStopped);
		}
		let (reply_tx, reply_rx) = oneshot::channel();
		self
			.demand_tx
			.send(reply_tx)
			.map_err(|_| ProviderError::PipelineStopped)?;
		reply_rx.await.map_err(|_| ProviderError::PipelineStopped)
	}

	/// Stops the worker. Returns without waiting for it to exit; an in-flight
	/// clone is abandoned and consumers still waiting get
	/// [`ProviderError::PipelineStopped`].
	pub fn close(&self) {
		let mut state = lock(&self.state);
		if *state == PipelineState::Stopped {
			return;
		}
		*state = PipelineState::Stopped;
		self.cancel.cancel();
		lock(&self.demand_rx).take();
		info!(port = self.runtime.port(), "provisioning pipeline stopped");
	}

	/// Whether the worker thread has exited (or never started).
	pub fn worker_finished(&self) -> bool {
		lock(&self.worker)
			.as_ref()
			.map_or(true, JoinHandle::is_finished)
	}
}

impl Drop for ProvisionPipeline {
	fn drop(&mut self) {
		self.cancel.cancel();
	}
}

struct Worker {
	runtime: Arc<dyn EngineRuntime>,
	template: String,
	owner: String,
	demands: mpsc::UnboundedReceiver<Demand>,
	cancel: CancellationToken,
}

impl Worker {
	async fn run(mut self) {
		debug!(template = %self.template, "provisioning worker running");
		loop {
			let name = random_database_name();
			// Cancelling abandons an in-flight clone; the server may still finish it and leave it behind.
			let outcome = tokio::select! {
				biased;
				_ = self.cancel.cancelled() => break,
				outcome = self.create(&name) => outcome,
			};

			let result = match outcome {
				Ok(()) => {
					debug!(database = %name, "database provisioned");
					ProvisionResult::Success(self.connection_info(name))
				}
				Err(source) => {
					warn!(database = %name, error = %source, "database provisioning failed");
					ProvisionResult::Failure(ProvisioningFailure {
						database: name,
						source,
					})
				}
			};

			if !self.hand_off(result).await {
				break;
			}
		}
		debug!(template = %self.template, "provisioning worker exited");
	}

	async fn create(&self, name: &str) -> Result<(), sqlx::Error> {
		let request = CloneRequest {
			name: name.to_string(),
			template: self.template.clone(),
			owner: self.owner.clone(),
		};
		let mut admin = self.runtime.admin_connection(&self.owner).await?;
		let created = admin.create_database(&request).await;
		if let Err(e) = admin.close().await {
			debug!(error = %e, "failed to close admin connection");
		}
		created
	}

	/// Delivers `result` to the next waiting consumer. Returns `false` when
	/// the worker should exit instead.
	async fn hand_off(&mut self, mut result: ProvisionResult) -> bool {
		loop {
			let reply = tokio::select! {
				biased;
				_ = self.cancel.cancelled() => return false,
				reply = self.demands.recv() => match reply {
					Some(reply) => reply,
					None => return false,
				},
			};
			match reply.send(result) {
				Ok(()) => return true,
				Err(unclaimed) => {
					trace!("consumer stopped waiting, keeping result");
					result = unclaimed;
				}
			}
		}
	}

	fn connection_info(&self, name: String) -> ConnectionInfo {
		ConnectionInfo::new(
			name,
			self.runtime.host(),
			self.runtime.port(),
			self.owner.clone(),
			self.runtime.connection_properties().clone(),
		)
	}
}

/// A database name of [`DATABASE_NAME_LENGTH`] lowercase ASCII letters.
pub fn generate_database_name<R: Rng + ?Sized>(rng: &mut R) -> String {
	(0..DATABASE_NAME_LENGTH)
		.map(|_| char::from(rng.gen_range(b'a'..=b'z')))
		.collect()
}

pub fn random_database_name() -> String {
	generate_database_name(&mut rand::thread_rng())
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
	mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
