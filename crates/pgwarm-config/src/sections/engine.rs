// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Database engine configuration.
//!
//! [`EngineConfig`] doubles as the builder state that provider customizers
//! mutate, so it is compared and hashed by value.

use std::fmt;
use std::time::Duration;

use serde::Deserialize;

use crate::error::ConfigError;
use crate::properties::ConnectProperties;

const DEFAULT_HOST: &str = "localhost";
const DEFAULT_PORT: u16 = 5432;
const DEFAULT_SUPERUSER: &str = "postgres";
const DEFAULT_ADMIN_DATABASE: &str = "postgres";
const DEFAULT_STARTUP_TIMEOUT_SECS: u64 = 30;
const MAX_IDENTIFIER_LEN: usize = 63;

/// Engine configuration (runtime, fully resolved).
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct EngineConfig {
	pub host: String,
	pub port: u16,
	pub superuser: String,
	pub password: Option<String>,
	pub admin_database: String,
	pub startup_timeout: Duration,
	pub connect_properties: ConnectProperties,
}

impl Default for EngineConfig {
	fn default() -> Self {
		EngineConfigLayer::default().finalize()
	}
}

impl fmt::Debug for EngineConfig {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("EngineConfig")
			.field("host", &self.host)
			.field("port", &self.port)
			.field("superuser", &self.superuser)
			.field("password", &self.password.as_ref().map(|_| "[REDACTED]"))
			.field("admin_database", &self.admin_database)
			.field("startup_timeout", &self.startup_timeout)
			.field("connect_properties", &self.connect_properties)
			.finish()
	}
}

impl EngineConfig {
	pub fn set_host(&mut self, host: impl Into<String>) -> &mut Self {
		self.host = host.into();
		self
	}

	pub fn set_port(&mut self, port: u16) -> &mut Self {
		self.port = port;
		self
	}

	pub fn set_superuser(&mut self, superuser: impl Into<String>) -> &mut Self {
		self.superuser = superuser.into();
		self
	}

	pub fn set_password(&mut self, password: impl Into<String>) -> &mut Self {
		self.password = Some(password.into());
		self
	}

	pub fn set_admin_database(&mut self, database: impl Into<String>) -> &mut Self {
		self.admin_database = database.into();
		self
	}

	pub fn set_startup_timeout(&mut self, timeout: Duration) -> &mut Self {
		self.startup_timeout = timeout;
		self
	}

	/// Adds an extra connection parameter; order of first insertion is kept.
	pub fn set_connect_property(
		&mut self,
		key: impl Into<String>,
		value: impl Into<String>,
	) -> &mut Self {
		self.connect_properties.insert(key, value);
		self
	}

	/// Rejects settings that could not produce a usable cluster or a
	/// well-formed connection descriptor.
	pub fn validate(&self) -> Result<(), ConfigError> {
		if self.host.trim().is_empty() {
			return Err(ConfigError::Validation("engine host must not be empty".to_string()));
		}
		if self.port == 0 {
			return Err(ConfigError::Validation("engine port must not be 0".to_string()));
		}
		validate_identifier("superuser", &self.superuser)?;
		validate_identifier("admin_database", &self.admin_database)?;
		if self.startup_timeout.is_zero() {
			return Err(ConfigError::Validation(
				"engine startup timeout must be greater than zero".to_string(),
			));
		}

		for (key, value) in self.connect_properties.iter() {
			if key.is_empty() {
				return Err(ConfigError::InvalidValue {
					key: "connect_properties".to_string(),
					message: "property names must not be empty".to_string(),
				});
			}
			if key.chars().any(|c| matches!(c, '&' | '=' | '?' | '#') || c.is_whitespace()) {
				return Err(ConfigError::InvalidValue {
					key: format!("connect_properties.{key}"),
					message: "property name contains a reserved character".to_string(),
				});
			}
			if value.chars().any(|c| matches!(c, '&' | '?' | '#') || c.is_whitespace()) {
				return Err(ConfigError::InvalidValue {
					key: format!("connect_properties.{key}"),
					message: format!("property value '{value}' contains a reserved character"),
				});
			}
		}

		Ok(())
	}
}

/// Checks that `value` is a plain SQL identifier (letters, digits, `_`, `$`).
pub fn validate_identifier(field: &str, value: &str) -> Result<(), ConfigError> {
	let mut chars = value.chars();
	let valid_start = chars
		.next()
		.is_some_and(|c| c.is_ascii_alphabetic() || c == '_');
	let valid_rest = chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$');

	if !valid_start || !valid_rest || value.len() > MAX_IDENTIFIER_LEN {
		return Err(ConfigError::InvalidValue {
			key: field.to_string(),
			message: format!("'{value}' is not a valid identifier"),
		});
	}
	Ok(())
}

/// Engine configuration layer (partial, for merging).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EngineConfigLayer {
	#[serde(default)]
	pub host: Option<String>,
	#[serde(default)]
	pub port: Option<u16>,
	#[serde(default)]
	pub superuser: Option<String>,
	#[serde(default)]
	pub password: Option<String>,
	#[serde(default)]
	pub admin_database: Option<String>,
	#[serde(default)]
	pub startup_timeout_secs: Option<u64>,
	#[serde(default)]
	pub connect_properties: Option<ConnectProperties>,
}

impl EngineConfigLayer {
	pub fn merge(&mut self, other: EngineConfigLayer) {
		if other.host.is_some() {
			self.host = other.host;
		}
		if other.port.is_some() {
			self.port = other.port;
		}
		if other.superuser.is_some() {
			self.superuser = other.superuser;
		}
		if other.password.is_some() {
			self.password = other.password;
		}
		if other.admin_database.is_some() {
			self.admin_database = other.admin_database;
		}
		if other.startup_timeout_secs.is_some() {
			self.startup_timeout_secs = other.startup_timeout_secs;
		}
		if let Some(props) = other.connect_properties {
			match self.connect_properties.as_mut() {
				Some(existing) => existing.extend_from(&props),
				None => self.connect_properties = Some(props),
			}
		}
	}

	pub fn finalize(self) -> EngineConfig {
		EngineConfig {
			host: self.host.unwrap_or_else(|| DEFAULT_HOST.to_string()),
			port: self.port.unwrap_or(DEFAULT_PORT),
			superuser: self
				.superuser
				.unwrap_or_else(|| DEFAULT_SUPERUSER.to_string()),
			password: self.password,
			admin_database: self
				.admin_database
				.unwrap_or_else(|| DEFAULT_ADMIN_DATABASE.to_string()),
			startup_timeout: Duration::from_secs(
				self
					.startup_timeout_secs
					.unwrap_or(DEFAULT_STARTUP_TIMEOUT_SECS),
			),
			connect_properties: self.connect_properties.unwrap_or_default(),
		}
	}
}
