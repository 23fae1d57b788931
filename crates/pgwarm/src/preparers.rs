// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Ready-made [`SchemaPreparer`] implementations.

use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::hash::{Hash, Hasher};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;
use pgwarm_config::ConfigError;
use sqlx::migrate::Migrator;
use sqlx::postgres::PgConnection;
use sqlx::Connection;
use tracing::{debug, instrument};

use crate::engine::TemplateDatabase;
use crate::error::PreparationError;
use crate::preparer::SchemaPreparer;

pub const LOCATIONS_KEY: &str = "migrations.locations";
pub const LOCKING_KEY: &str = "migrations.locking";

/// Applies `sqlx` migrations from one or more directories, in order.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MigrationPreparer {
	locations: Vec<PathBuf>,
	locking: bool,
	properties: Option<BTreeMap<String, String>>,
}

impl MigrationPreparer {
	pub fn for_locations<I, P>(locations: I) -> Self
	where
		I: IntoIterator<Item = P>,
		P: Into<PathBuf>,
	{
		Self {
			locations: locations.into_iter().map(Into::into).collect(),
			locking: true,
			properties: None,
		}
	}

	/// Builds a preparer from a property map.
	///
	/// Recognised keys are `migrations.locations` (comma-separated, required)
	/// and `migrations.locking` (`true`/`false`, default `true`).
	pub fn from_configuration<I, K, V>(configuration: I) -> Result<Self, ConfigError>
	where
		I: IntoIterator<Item = (K, V)>,
		K: Into<String>,
		V: Into<String>,
	{
		let properties: BTreeMap<String, String> = configuration
			.into_iter()
			.map(|(k, v)| (k.into(), v.into()))
			.collect();

		if let Some(unknown) = properties
			.keys()
			.find(|k| k.as_str() != LOCATIONS_KEY && k.as_str() != LOCKING_KEY)
		{
			return Err(ConfigError::InvalidValue {
				key: unknown.clone(),
				message: "unknown migration property".to_string(),
			});
		}

		let locations: Vec<PathBuf> = properties
			.get(LOCATIONS_KEY)
			.map(|raw| {
				raw
					.split(',')
					.map(str::trim)
					.filter(|l| !l.is_empty())
					.map(PathBuf::from)
					.collect()
			})
			.unwrap_or_default();
		if locations.is_empty() {
			return Err(ConfigError::InvalidValue {
				key: LOCATIONS_KEY.to_string(),
				message: "at least one migration location is required".to_string(),
			});
		}

		let locking = match properties.get(LOCKING_KEY).map(|v| v.trim()) {
			None => true,
			Some(raw) => raw.parse::<bool>().map_err(|_| ConfigError::InvalidValue {
				key: LOCKING_KEY.to_string(),
				message: format!("expected true or false, got '{raw}'"),
			})?,
		};

		Ok(Self {
			locations,
			locking,
			properties: Some(properties),
		})
	}

	pub fn locations(&self) -> &[PathBuf] {
		&self.locations
	}

	async fn run(&self, conn: &mut PgConnection) -> Result<(), PreparationError> {
		for location in &self.locations {
			let mut migrator = Migrator::new(location.as_path()).await?;
			migrator.set_ignore_missing(true);
			migrator.set_locking(self.locking);
			debug!(
				location = %location.display(),
				migrations = migrator.iter().count(),
				"applying migrations"
			);
			migrator.run_direct(&mut *conn).await?;
		}
		Ok(())
	}
}

#[async_trait]
impl SchemaPreparer for MigrationPreparer {
	#[instrument(skip(self, template), fields(template = %template.name()))]
	async fn prepare(&self, template: &TemplateDatabase) -> Result<(), PreparationError> {
		let mut conn = template.connect().await?;
		let outcome = self.run(&mut conn).await;
		conn.close().await?;
		outcome
	}
}

/// Runs literal SQL statements one after another.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SqlPreparer {
	statements: Vec<String>,
}

impl SqlPreparer {
	pub fn new<I, S>(statements: I) -> Self
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		Self {
			statements: statements.into_iter().map(Into::into).collect(),
		}
	}

	pub fn statements(&self) -> &[String] {
		&self.statements
	}

	async fn run(&self, conn: &mut PgConnection) -> Result<(), PreparationError> {
		for statement in &self.statements {
			sqlx::query(statement).execute(&mut *conn).await?;
		}
		Ok(())
	}
}

#[async_trait]
impl SchemaPreparer for SqlPreparer {
	#[instrument(skip(self, template), fields(template = %template.name(), statements = self.statements.len()))]
	async fn prepare(&self, template: &TemplateDatabase) -> Result<(), PreparationError> {
		let mut conn = template.connect().await?;
		let outcome = self.run(&mut conn).await;
		conn.close().await?;
		outcome
	}
}

type PrepareFn =
	dyn Fn(TemplateDatabase) -> BoxFuture<'static, Result<(), PreparationError>> + Send + Sync;

static NEXT_FN_PREPARER_ID: AtomicU64 = AtomicU64::new(1);

/// A preparer backed by an async closure.
///
/// Each call to [`FnPreparer::new`] produces a distinct identity; clones of
/// one preparer share it, so reuse a clone to share a cluster.
#[derive(Clone)]
pub struct FnPreparer {
	id: u64,
	f: Arc<PrepareFn>,
}

impl FnPreparer {
	pub fn new<F, Fut>(f: F) -> Self
	where
		F: Fn(TemplateDatabase) -> Fut + Send + Sync + 'static,
		Fut: Future<Output = Result<(), PreparationError>> + Send + 'static,
	{
		Self {
			id: NEXT_FN_PREPARER_ID.fetch_add(1, Ordering::Relaxed),
			f: Arc::new(move |template| Box::pin(f(template))),
		}
	}
}

impl PartialEq for FnPreparer {
	fn eq(&self, other: &Self) -> bool {
		self.id == other.id
	}
}

impl Eq for FnPreparer {}

impl Hash for FnPreparer {
	fn hash<H: Hasher>(&self, state: &mut H) {
		self.id.hash(state);
	}
}

impl fmt::Debug for FnPreparer {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("FnPreparer").field("id", &self.id).finish()
	}
}

#[async_trait]
impl SchemaPreparer for FnPreparer {
	async fn prepare(&self, template: &TemplateDatabase) -> Result<(), PreparationError> {
		(self.f)(template.clone()).await
	}
}
