// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! The contract between the provider and a running database engine.
//!
//! A [`EngineLauncher`] turns an [`EngineConfig`] into a running
//! [`EngineRuntime`]. The runtime owns a template database that the schema
//! preparer fills once, and hands out admin connections that clone that
//! template into fresh databases.

use std::sync::Arc;

use async_trait::async_trait;
use pgwarm_config::{ConnectProperties, EngineConfig};
use sqlx::postgres::{PgConnectOptions, PgConnection};
use sqlx::Connection;

use crate::error::StartupError;

/// The database a schema preparer runs against.
#[derive(Debug, Clone)]
pub struct TemplateDatabase {
	name: String,
	options: PgConnectOptions,
}

impl TemplateDatabase {
	/// `options` should point at the engine; the database name is filled in here.
	pub fn new(name: impl Into<String>, options: PgConnectOptions) -> Self {
		let name = name.into();
		let options = options.database(&name);
		Self { name, options }
	}

	pub fn name(&self) -> &str {
		&self.name
	}

	pub fn connect_options(&self) -> &PgConnectOptions {
		&self.options
	}

	/// Opens a new connection to the template. Callers must close it before
	/// the template is cloned, since the engine refuses to copy a database
	/// that has open sessions.
	pub async fn connect(&self) -> Result<PgConnection, sqlx::Error> {
		PgConnection::connect_with(&self.options).await
	}
}

/// One "clone the template into a new database" command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloneRequest {
	pub name: String,
	pub template: String,
	pub owner: String,
}

impl CloneRequest {
	pub fn to_sql(&self) -> String {
		format!(
			"CREATE DATABASE {} TEMPLATE {} OWNER {} ENCODING 'utf8'",
			quote_identifier(&self.name),
			quote_identifier(&self.template),
			quote_identifier(&self.owner),
		)
	}
}

/// Quotes a SQL identifier, doubling embedded quotes.
pub fn quote_identifier(identifier: &str) -> String {
	format!("\"{}\"", identifier.replace('"', "\"\""))
}

/// A short-lived administrative session on the engine.
#[async_trait]
pub trait AdminConnection: Send {
	async fn create_database(&mut self, request: &CloneRequest) -> Result<(), sqlx::Error>;

	async fn close(&mut self) -> Result<(), sqlx::Error>;
}

/// A running engine owned by exactly one cluster.
#[async_trait]
pub trait EngineRuntime: Send + Sync + 'static {
	fn host(&self) -> &str;

	fn port(&self) -> u16;

	/// Extra parameters appended to every connection descriptor.
	fn connection_properties(&self) -> &ConnectProperties;

	fn template_database(&self) -> TemplateDatabase;

	async fn admin_connection(&self, role: &str) -> Result<Box<dyn AdminConnection>, sqlx::Error>;

	/// Releases the engine and everything created on it. Best effort.
	async fn close(&self);
}

#[async_trait]
pub trait EngineLauncher: Send + Sync + 'static {
	async fn start(&self, config: &EngineConfig) -> Result<Arc<dyn EngineRuntime>, StartupError>;
}
