// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Process-wide cache of running clusters keyed by [`ConfigurationIdentity`].

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, OnceLock, PoisonError, RwLock};

use tracing::{debug, info, instrument};

use crate::engine::{EngineLauncher, EngineRuntime};
use crate::error::ProviderError;
use crate::identity::ConfigurationIdentity;
use crate::pipeline::ProvisionPipeline;
use crate::postgres::PostgresLauncher;

/// A running engine with its prepared template and provisioning pipeline.
pub struct Cluster {
	runtime: Arc<dyn EngineRuntime>,
	pipeline: ProvisionPipeline,
}

impl Cluster {
	pub fn new(runtime: Arc<dyn EngineRuntime>, pipeline: ProvisionPipeline) -> Self {
		Self { runtime, pipeline }
	}

	pub fn runtime(&self) -> &Arc<dyn EngineRuntime> {
		&self.runtime
	}

	pub fn pipeline(&self) -> &ProvisionPipeline {
		&self.pipeline
	}

	/// Stops provisioning, then releases the engine.
	pub async fn shutdown(&self) {
		self.pipeline.close();
		self.runtime.close().await;
	}
}

static GLOBAL: OnceLock<Arc<ClusterRegistry>> = OnceLock::new();

pub struct ClusterRegistry {
	launcher: Arc<dyn EngineLauncher>,
	clusters: RwLock<HashMap<ConfigurationIdentity, Arc<Cluster>>>,
	creation: tokio::sync::Mutex<()>,
}

impl ClusterRegistry {
	pub fn new(launcher: Arc<dyn EngineLauncher>) -> Self {
		Self {
			launcher,
			clusters: RwLock::new(HashMap::new()),
			creation: tokio::sync::Mutex::new(()),
		}
	}

	/// The registry shared by every provider that does not bring its own.
	pub fn global() -> Arc<ClusterRegistry> {
		let registry = GLOBAL.get_or_init(|| {
			Arc::new(ClusterRegistry::new(Arc::new(PostgresLauncher::from_environment())))
		});
		Arc::clone(registry)
	}

	pub fn get(&self, identity: &ConfigurationIdentity) -> Option<Arc<Cluster>> {
		self
			.clusters
			.read()
			.unwrap_or_else(PoisonError::into_inner)
			.get(identity)
			.cloned()
	}

	pub fn contains(&self, identity: &ConfigurationIdentity) -> bool {
		self.get(identity).is_some()
	}

	pub fn len(&self) -> usize {
		self.clusters.read().unwrap_or_else(PoisonError::into_inner).len()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	/// Returns the cluster for `identity`, running `factory` to create it if
	/// there is none.
	///
	/// Lookups of existing clusters take only a read lock. Creation is
	/// serialized, and the map is checked again once the creation lock is
	/// held, so `factory` runs at most once per identity. A failing factory
	/// leaves nothing behind.
	pub async fn resolve_or_create<F, Fut>(
		&self,
		identity: &ConfigurationIdentity,
		factory: F,
	) -> Result<Arc<Cluster>, ProviderError>
	where
		F: FnOnce() -> Fut,
		Fut: Future<Output = Result<Cluster, ProviderError>>,
	{
		if let Some(cluster) = self.get(identity) {
			debug!(port = cluster.runtime().port(), "reusing cluster");
			return Ok(cluster);
		}

		let _creating = self.creation.lock().await;
		if let Some(cluster) = self.get(identity) {
			debug!(port = cluster.runtime().port(), "reusing cluster created concurrently");
			return Ok(cluster);
		}

		let cluster = Arc::new(factory().await?);
		self
			.clusters
			.write()
			.unwrap_or_else(PoisonError::into_inner)
			.insert(identity.clone(), Arc::clone(&cluster));
		info!(port = cluster.runtime().port(), clusters = self.len(), "cluster registered");
		Ok(cluster)
	}

	/// Returns the cluster for `identity`, starting and preparing one with
	/// this registry's launcher if needed.
	pub async fn cluster_for(
		&self,
		identity: &ConfigurationIdentity,
	) -> Result<Arc<Cluster>, ProviderError> {
		self
			.resolve_or_create(identity, || launch_cluster(self.launcher.as_ref(), identity))
			.await
	}

	/// Drops the entry for `identity`. Does not shut the cluster down.
	pub fn remove(&self, identity: &ConfigurationIdentity) -> Option<Arc<Cluster>> {
		let removed = self
			.clusters
			.write()
			.unwrap_or_else(PoisonError::into_inner)
			.remove(identity);
		if let Some(cluster) = &removed {
			info!(port = cluster.runtime().port(), "cluster unregistered");
		}
		removed
	}
}

/// Starts an engine, prepares its template and starts provisioning.
/// Anything started is released again if a later step fails.
#[instrument(skip_all, fields(host = %identity.config().host, port = identity.config().port))]
async fn launch_cluster(
	launcher: &dyn EngineLauncher,
	identity: &ConfigurationIdentity,
) -> Result<Cluster, ProviderError> {
	let runtime = launcher.start(identity.config()).await?;
	let template = runtime.template_database();

	if let Err(e) = identity.preparer().prepare(&template).await {
		runtime.close().await;
		return Err(e.into());
	}
	debug!(template = %template.name(), preparer = ?identity.preparer(), "template prepared");

	let pipeline = ProvisionPipeline::new(Arc::clone(&runtime), identity.config().superuser.clone());
	if let Err(e) = pipeline.start() {
		runtime.close().await;
		return Err(e);
	}

	Ok(Cluster::new(runtime, pipeline))
}
