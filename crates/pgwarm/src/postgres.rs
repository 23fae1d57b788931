// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! PostgreSQL engine runtime over `sqlx`.
//!
//! The launcher attaches to a server that is supervised elsewhere (a local
//! install, a container, CI service). Each runtime gets its own template
//! database; clones are created from it and dropped again on close.

use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use pgwarm_binaries::{host_machine, host_system, BinaryLocator, DirectoryCatalog, OsReleaseDetector};
use pgwarm_config::{BinariesConfig, ConnectProperties, EngineConfig};
use sqlx::postgres::{PgConnectOptions, PgConnection};
use sqlx::Connection;
use tracing::{debug, info, instrument, warn};

use crate::engine::{
	quote_identifier, AdminConnection, CloneRequest, EngineLauncher, EngineRuntime, TemplateDatabase,
};
use crate::error::StartupError;
use crate::pipeline::random_database_name;

pub const TEMPLATE_PREFIX: &str = "pgwarm_tmpl_";

/// Starts [`PostgresRuntime`]s against an existing server.
///
/// With binary search paths configured, the host's engine artifact is
/// resolved first and startup fails if it cannot be found.
#[derive(Debug, Clone, Default)]
pub struct PostgresLauncher {
	binaries: BinariesConfig,
}

impl PostgresLauncher {
	pub fn new(binaries: BinariesConfig) -> Self {
		Self { binaries }
	}

	/// Uses the binaries section of the loaded configuration, or no search
	/// paths if configuration cannot be loaded.
	pub fn from_environment() -> Self {
		match pgwarm_config::load_config() {
			Ok(config) => Self::new(config.binaries),
			Err(e) => {
				warn!(error = %e, "failed to load configuration, engine binaries will not be checked");
				Self::default()
			}
		}
	}

	fn check_binaries(&self) -> Result<(), StartupError> {
		if self.binaries.search_paths.is_empty() {
			return Ok(());
		}
		let locator = BinaryLocator::new(
			DirectoryCatalog::from_config(&self.binaries),
			OsReleaseDetector::host(),
		);
		let artifact = locator.resolve(host_system(), host_machine())?;
		debug!(artifact = %artifact.path().display(), "engine binaries resolved");
		Ok(())
	}
}

#[async_trait]
impl EngineLauncher for PostgresLauncher {
	#[instrument(skip(self, config), fields(host = %config.host, port = config.port))]
	async fn start(&self, config: &EngineConfig) -> Result<Arc<dyn EngineRuntime>, StartupError> {
		self.check_binaries()?;

		let server = server_options(config);
		let mut admin = tokio::time::timeout(
			config.startup_timeout,
			PgConnection::connect_with(&server.clone().database(&config.admin_database)),
		)
		.await
		.map_err(|_| StartupError::Timeout(config.startup_timeout))?
		.map_err(StartupError::Connect)?;

		let template = format!("{TEMPLATE_PREFIX}{}", random_database_name());
		install_template(&mut admin, &template, &config.superuser).await?;
		if let Err(e) = admin.close().await {
			debug!(error = %e, "failed to close setup connection");
		}

		info!(template = %template, "engine runtime ready");
		Ok(Arc::new(PostgresRuntime {
			template: TemplateDatabase::new(template, server.clone()),
			server,
			config: config.clone(),
			clones: Arc::new(Mutex::new(Vec::new())),
		}))
	}
}

/// Runs one setup statement on an admin session.
#[async_trait]
trait SetupSession: Send {
	async fn run_statement(&mut self, statement: &str) -> Result<(), sqlx::Error>;
}

#[async_trait]
impl SetupSession for PgConnection {
	async fn run_statement(&mut self, statement: &str) -> Result<(), sqlx::Error> {
		sqlx::query(statement).execute(&mut *self).await?;
		Ok(())
	}
}

/// Creates `name` from `template0` and marks it as a template. If marking
/// fails the new database is dropped again before the error is returned.
async fn install_template<S: SetupSession>(
	session: &mut S,
	name: &str,
	owner: &str,
) -> Result<(), StartupError> {
	let create = format!(
		"CREATE DATABASE {} TEMPLATE template0 OWNER {} ENCODING 'utf8'",
		quote_identifier(name),
		quote_identifier(owner),
	);
	session
		.run_statement(&create)
		.await
		.map_err(StartupError::Command)?;

	let mark = format!("ALTER DATABASE {} WITH IS_TEMPLATE true", quote_identifier(name));
	if let Err(e) = session.run_statement(&mark).await {
		let drop = format!("DROP DATABASE IF EXISTS {}", quote_identifier(name));
		if let Err(drop_error) = session.run_statement(&drop).await {
			warn!(database = %name, error = %drop_error, "failed to drop unfinished template database");
		}
		return Err(StartupError::Command(e));
	}
	Ok(())
}

fn server_options(config: &EngineConfig) -> PgConnectOptions {
	let options = PgConnectOptions::new()
		.host(&config.host)
		.port(config.port)
		.username(&config.superuser);
	match &config.password {
		Some(password) => options.password(password),
		None => options,
	}
}

pub struct PostgresRuntime {
	server: PgConnectOptions,
	config: EngineConfig,
	template: TemplateDatabase,
	clones: Arc<Mutex<Vec<String>>>,
}

impl PostgresRuntime {
	async fn connect_admin(&self, role: &str) -> Result<PgConnection, sqlx::Error> {
		let options = self
			.server
			.clone()
			.username(role)
			.database(&self.config.admin_database);
		PgConnection::connect_with(&options).await
	}

	async fn drop_database(conn: &mut PgConnection, name: &str) {
		let statement = format!("DROP DATABASE IF EXISTS {}", quote_identifier(name));
		if let Err(e) = sqlx::query(&statement).execute(&mut *conn).await {
			warn!(database = %name, error = %e, "failed to drop database");
		}
	}
}

#[async_trait]
impl EngineRuntime for PostgresRuntime {
	fn host(&self) -> &str {
		&self.config.host
	}

	fn port(&self) -> u16 {
		self.config.port
	}

	fn connection_properties(&self) -> &ConnectProperties {
		&self.config.connect_properties
	}

	fn template_database(&self) -> TemplateDatabase {
		self.template.clone()
	}

	async fn admin_connection(&self, role: &str) -> Result<Box<dyn AdminConnection>, sqlx::Error> {
		let conn = self.connect_admin(role).await?;
		Ok(Box::new(PostgresAdminConnection {
			conn: Some(conn),
			clones: Arc::clone(&self.clones),
		}))
	}

	#[instrument(skip(self), fields(template = %self.template.name()))]
	async fn close(&self) {
		let mut conn = match self.connect_admin(&self.config.superuser).await {
			Ok(conn) => conn,
			Err(e) => {
				warn!(error = %e, "failed to connect for cleanup, leaving databases behind");
				return;
			}
		};

		let clones = std::mem::take(&mut *self.clones.lock().unwrap_or_else(PoisonError::into_inner));
		for name in &clones {
			Self::drop_database(&mut conn, name).await;
		}

		let unmark = format!(
			"ALTER DATABASE {} WITH IS_TEMPLATE false",
			quote_identifier(self.template.name())
		);
		if let Err(e) = sqlx::query(&unmark).execute(&mut conn).await {
			warn!(error = %e, "failed to unmark template database");
		}
		Self::drop_database(&mut conn, self.template.name()).await;

		if let Err(e) = conn.close().await {
			debug!(error = %e, "failed to close cleanup connection");
		}
		info!(dropped = clones.len(), "engine runtime closed");
	}
}

struct PostgresAdminConnection {
	conn: Option<PgConnection>,
	clones: Arc<Mutex<Vec<String>>>,
}

#[async_trait]
impl AdminConnection for PostgresAdminConnection {
	async fn create_database(&mut self, request: &CloneRequest) -> Result<(), sqlx::Error> {
		let conn = self
			.conn
			.as_mut()
			.ok_or_else(|| sqlx::Error::Protocol("admin connection already closed".to_string()))?;
		sqlx::query(&request.to_sql()).execute(conn).await?;
		self
			.clones
			.lock()
			.unwrap_or_else(PoisonError::into_inner)
			.push(request.name.clone());
		Ok(())
	}

	async fn close(&mut self) -> Result<(), sqlx::Error> {
		match self.conn.take() {
			Some(conn) => conn.close().await,
			None => Ok(()),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::path::PathBuf;

	#[test]
	fn test_server_options_from_config() {
		let mut config = EngineConfig::default();
		config.set_host("db.internal").set_port(6543).set_superuser("admin");
		let options = server_options(&config);
		assert_eq!(options.get_host(), "db.internal");
		assert_eq!(options.get_port(), 6543);
		assert_eq!(options.get_username(), "admin");
	}

	#[derive(Default)]
	struct ScriptedSession {
		statements: Vec<String>,
		fail_prefix: Option<&'static str>,
	}

	#[async_trait]
	impl SetupSession for ScriptedSession {
		async fn run_statement(&mut self, statement: &str) -> Result<(), sqlx::Error> {
			self.statements.push(statement.to_string());
			match self.fail_prefix {
				Some(prefix) if statement.starts_with(prefix) => {
					Err(sqlx::Error::Protocol(format!("rejected: {statement}")))
				}
				_ => Ok(()),
			}
		}
	}

	#[tokio::test]
	async fn test_install_template_creates_and_marks() {
		let mut session = ScriptedSession::default();
		install_template(&mut session, "pgwarm_tmpl_abc", "postgres")
			.await
			.unwrap();
		assert_eq!(
			session.statements,
			[
				"CREATE DATABASE \"pgwarm_tmpl_abc\" TEMPLATE template0 OWNER \"postgres\" ENCODING 'utf8'",
				"ALTER DATABASE \"pgwarm_tmpl_abc\" WITH IS_TEMPLATE true",
			]
		);
	}

	#[tokio::test]
	async fn test_failed_mark_drops_created_template() {
		let mut session = ScriptedSession {
			fail_prefix: Some("ALTER"),
			..Default::default()
		};
		let result = install_template(&mut session, "pgwarm_tmpl_abc", "postgres").await;
		assert!(matches!(result, Err(StartupError::Command(_))));
		assert_eq!(
			session.statements.last().map(String::as_str),
			Some("DROP DATABASE IF EXISTS \"pgwarm_tmpl_abc\"")
		);
	}

	#[tokio::test]
	async fn test_failed_create_leaves_nothing_to_drop() {
		let mut session = ScriptedSession {
			fail_prefix: Some("CREATE"),
			..Default::default()
		};
		let result = install_template(&mut session, "pgwarm_tmpl_abc", "postgres").await;
		assert!(matches!(result, Err(StartupError::Command(_))));
		assert_eq!(session.statements.len(), 1);
	}

	#[test]
	fn test_binary_check_skipped_without_search_paths() {
		assert!(PostgresLauncher::default().check_binaries().is_ok());
	}

	#[test]
	fn test_binary_check_fails_on_empty_directory() {
		let dir = tempfile::tempdir().unwrap();
		let launcher = PostgresLauncher::new(BinariesConfig {
			search_paths: vec![PathBuf::from(dir.path())],
		});
		assert!(matches!(
			launcher.check_binaries(),
			Err(StartupError::Resolution(_))
		));
	}

	#[tokio::test]
	async fn test_unreachable_server_is_startup_error() {
		let mut config = EngineConfig::default();
		config
			.set_host("127.0.0.1")
			.set_port(1)
			.set_startup_timeout(std::time::Duration::from_secs(5));
		match PostgresLauncher::default().start(&config).await {
			Err(StartupError::Connect(_)) | Err(StartupError::Timeout(_)) => {}
			Err(other) => panic!("unexpected error: {other}"),
			Ok(_) => panic!("expected startup to fail"),
		}
	}
}
