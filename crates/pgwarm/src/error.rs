// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Provider error types.

use std::time::Duration;

use pgwarm_binaries::ResolutionError;
use pgwarm_config::ConfigError;

/// The engine runtime could not be brought up. No cluster is registered.
#[derive(Debug, thiserror::Error)]
pub enum StartupError {
	#[error(transparent)]
	Resolution(#[from] ResolutionError),

	#[error("Failed to connect to the database engine: {0}")]
	Connect(#[source] sqlx::Error),

	#[error("Database engine was not reachable within {0:?}")]
	Timeout(Duration),

	#[error("Database engine rejected a setup command: {0}")]
	Command(#[source] sqlx::Error),

	#[error("Failed to start the provisioning worker: {0}")]
	Worker(#[source] std::io::Error),
}

/// The schema preparer failed against the template database.
#[derive(Debug, thiserror::Error)]
pub enum PreparationError {
	#[error("Schema preparation failed: {0}")]
	Sql(#[from] sqlx::Error),

	#[error("Schema migration failed: {0}")]
	Migrate(#[from] sqlx::migrate::MigrateError),

	#[error("Schema preparation failed: {0}")]
	Failed(String),
}

/// A single clone attempt failed. Later attempts are unaffected.
#[derive(Debug, thiserror::Error)]
#[error("Failed to create database {database}: {source}")]
pub struct ProvisioningFailure {
	pub database: String,
	#[source]
	pub source: sqlx::Error,
}

#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
	#[error(transparent)]
	Configuration(#[from] ConfigError),

	#[error(transparent)]
	Startup(#[from] StartupError),

	#[error(transparent)]
	Preparation(#[from] PreparationError),

	#[error(transparent)]
	Provisioning(#[from] ProvisioningFailure),

	#[error("Invalid connection descriptor {descriptor}: {source}")]
	InvalidDescriptor {
		descriptor: String,
		#[source]
		source: sqlx::Error,
	},

	#[error("Provisioning pipeline has been stopped")]
	PipelineStopped,
}

pub type Result<T> = std::result::Result<T, ProviderError>;
