// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! The public entry point: build a provider at test setup, ask it for fresh
//! databases, close it at teardown.
//!
//! ```ignore
//! use pgwarm::{PreparedDbProvider, SqlPreparer};
//!
//! let provider = PreparedDbProvider::builder(SqlPreparer::new(["CREATE TABLE foo (id int)"]))
//!     .customize(|config| {
//!         config.set_connect_property("connect_timeout", "20");
//!     })
//!     .build()
//!     .await?;
//!
//! let url = provider.create_database().await?;
//! provider.close().await;
//! ```

use std::fmt;
use std::hash::Hash;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use pgwarm_config::EngineConfig;
use sqlx::postgres::PgConnectOptions;
use tracing::{info, instrument, warn};

use crate::connection::ConnectionInfo;
use crate::error::Result;
use crate::identity::ConfigurationIdentity;
use crate::preparer::{PreparerKey, SchemaPreparer};
use crate::registry::{Cluster, ClusterRegistry};

type Customizer = Box<dyn Fn(&mut EngineConfig) + Send + Sync>;

pub struct ProviderBuilder {
	preparer: PreparerKey,
	customizers: Vec<Customizer>,
	base_config: Option<EngineConfig>,
	registry: Option<Arc<ClusterRegistry>>,
}

impl ProviderBuilder {
	fn new(preparer: PreparerKey) -> Self {
		Self {
			preparer,
			customizers: Vec::new(),
			base_config: None,
			registry: None,
		}
	}

	/// Adds a customizer. Customizers run in order against the base
	/// configuration and their combined effect is part of the cluster
	/// identity.
	pub fn customize(mut self, customizer: impl Fn(&mut EngineConfig) + Send + Sync + 'static) -> Self {
		self.customizers.push(Box::new(customizer));
		self
	}

	/// Starts from `config` instead of the loaded configuration.
	pub fn base_config(mut self, config: EngineConfig) -> Self {
		self.base_config = Some(config);
		self
	}

	/// Uses `registry` instead of [`ClusterRegistry::global`].
	pub fn registry(mut self, registry: Arc<ClusterRegistry>) -> Self {
		self.registry = Some(registry);
		self
	}

	/// The configuration after all customizers ran, validated.
	pub fn effective_config(&self) -> Result<EngineConfig> {
		let mut config = match &self.base_config {
			Some(config) => config.clone(),
			None => pgwarm_config::load_config()?.engine,
		};
		for customizer in &self.customizers {
			customizer(&mut config);
		}
		config.validate()?;
		Ok(config)
	}

	pub fn identity(&self) -> Result<ConfigurationIdentity> {
		Ok(ConfigurationIdentity::new(
			self.preparer.clone(),
			self.effective_config()?,
		)?)
	}

	/// Resolves or creates the cluster for this builder's identity.
	#[instrument(skip(self), fields(customizers = self.customizers.len()))]
	pub async fn build(self) -> Result<PreparedDbProvider> {
		let identity = self.identity()?;
		let registry = self.registry.unwrap_or_else(ClusterRegistry::global);
		let cluster = registry.cluster_for(&identity).await?;

		Ok(PreparedDbProvider {
			registry,
			identity,
			cluster,
			closed: AtomicBool::new(false),
		})
	}
}

impl fmt::Debug for ProviderBuilder {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("ProviderBuilder")
			.field("preparer", &self.preparer)
			.field("customizers", &self.customizers.len())
			.field("base_config", &self.base_config)
			.finish_non_exhaustive()
	}
}

/// Hands out freshly cloned databases from one cluster.
pub struct PreparedDbProvider {
	registry: Arc<ClusterRegistry>,
	identity: ConfigurationIdentity,
	cluster: Arc<Cluster>,
	closed: AtomicBool,
}

impl PreparedDbProvider {
	/// A provider with the loaded configuration and no customizers.
	pub async fn for_preparer<P: SchemaPreparer + Eq + Hash>(preparer: P) -> Result<Self> {
		Self::builder(preparer).build().await
	}

	pub fn builder<P: SchemaPreparer + Eq + Hash>(preparer: P) -> ProviderBuilder {
		ProviderBuilder::new(PreparerKey::new(preparer))
	}

	pub fn identity(&self) -> &ConfigurationIdentity {
		&self.identity
	}

	pub fn cluster(&self) -> &Arc<Cluster> {
		&self.cluster
	}

	/// Takes the next database and returns its connection descriptor,
	/// `postgresql://host:port/db?user=NAME[&key=value]*`.
	pub async fn create_database(&self) -> Result<String> {
		Ok(self.cluster.pipeline().next().await?.url())
	}

	/// Takes the next database and returns driver connect options for it.
	pub async fn create_data_source(&self) -> Result<PgConnectOptions> {
		let info = self.cluster.pipeline().next().await?;
		self.create_data_source_from_connection_info(&info)
	}

	/// Takes the next database, or `None` if provisioning it failed.
	pub async fn create_new_database(&self) -> Option<ConnectionInfo> {
		match self.cluster.pipeline().next().await {
			Ok(info) => Some(info),
			Err(e) => {
				warn!(error = %e, "failed to provision database");
				None
			}
		}
	}

	/// Connect options for a database obtained earlier. The configured
	/// password, if any, is applied; it never appears in descriptors.
	pub fn create_data_source_from_connection_info(
		&self,
		info: &ConnectionInfo,
	) -> Result<PgConnectOptions> {
		let options = info.connect_options()?;
		Ok(match &self.identity.config().password {
			Some(password) => options.password(password),
			None => options,
		})
	}

	/// Unregisters this provider's identity and shuts its cluster down.
	/// Later calls do nothing.
	///
	/// Other providers built from an equal identity share the cluster and
	/// stop working once it is closed.
	pub async fn close(&self) {
		if self.closed.swap(true, Ordering::SeqCst) {
			return;
		}
		self.registry.remove(&self.identity);
		self.cluster.shutdown().await;
		info!(port = self.cluster.runtime().port(), "provider closed");
	}
}

impl fmt::Debug for PreparedDbProvider {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("PreparedDbProvider")
			.field("identity", &self.identity)
			.field("port", &self.cluster.runtime().port())
			.field("closed", &self.closed.load(Ordering::SeqCst))
			.finish()
	}
}
