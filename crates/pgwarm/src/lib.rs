// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Pre-warmed, isolated PostgreSQL databases for tests.
//!
//! A [`PreparedDbProvider`] is keyed by a schema preparer plus the effective
//! engine configuration. Providers with equal keys share one cluster: the
//! engine is attached, the template database is prepared once, and a
//! background worker keeps exactly one fresh clone ready ahead of demand.
//!
//! # Crates
//!
//! - [`pgwarm_config`]: layered configuration (`PGWARM_*` environment, `pgwarm.toml`)
//! - [`pgwarm_binaries`]: engine binary artifact resolution

pub mod connection;
pub mod engine;
pub mod error;
pub mod identity;
pub mod pipeline;
pub mod postgres;
pub mod preparer;
pub mod preparers;
pub mod provider;
pub mod registry;
pub mod result;
pub mod testing;

pub use connection::ConnectionInfo;
pub use engine::{AdminConnection, CloneRequest, EngineLauncher, EngineRuntime, TemplateDatabase};
pub use error::{
	PreparationError, ProviderError, ProvisioningFailure, Result, StartupError,
};
pub use identity::ConfigurationIdentity;
pub use pipeline::{PipelineState, ProvisionPipeline};
pub use postgres::{PostgresLauncher, PostgresRuntime};
pub use preparer::{PreparerKey, SchemaPreparer};
pub use preparers::{FnPreparer, MigrationPreparer, SqlPreparer};
pub use provider::{PreparedDbProvider, ProviderBuilder};
pub use registry::{Cluster, ClusterRegistry};
pub use result::ProvisionResult;

pub use pgwarm_config::{ConnectProperties, EngineConfig};
