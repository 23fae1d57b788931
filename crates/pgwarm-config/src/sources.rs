// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Configuration sources: defaults, TOML files and environment variables.

use std::path::PathBuf;

use tracing::{debug, trace};

use crate::error::ConfigError;
use crate::layer::PgwarmConfigLayer;
use crate::properties::parse_property_list;
use crate::sections::{BinariesConfigLayer, EngineConfigLayer, LoggingConfigLayer};

const CONFIG_FILE_ENV: &str = "PGWARM_CONFIG_FILE";
const DEFAULT_CONFIG_FILE: &str = "pgwarm.toml";

/// Source precedence levels (higher = overrides lower).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Precedence {
	Defaults = 10,
	ConfigFile = 20,
	Environment = 50,
}

/// Trait for configuration sources.
pub trait ConfigSource: Send + Sync {
	fn name(&self) -> &'static str;
	fn precedence(&self) -> Precedence;
	fn load(&self) -> Result<PgwarmConfigLayer, ConfigError>;
}

/// Built-in defaults source.
pub struct DefaultsSource;

impl ConfigSource for DefaultsSource {
	fn name(&self) -> &'static str {
		"defaults"
	}

	fn precedence(&self) -> Precedence {
		Precedence::Defaults
	}

	fn load(&self) -> Result<PgwarmConfigLayer, ConfigError> {
		debug!("loading defaults");
		Ok(PgwarmConfigLayer::default())
	}
}

/// TOML file configuration source.
pub struct TomlSource {
	path: PathBuf,
}

impl TomlSource {
	pub fn new(path: impl Into<PathBuf>) -> Self {
		Self { path: path.into() }
	}

	/// `$PGWARM_CONFIG_FILE`, falling back to `./pgwarm.toml`.
	pub fn discover() -> Self {
		let path = std::env::var_os(CONFIG_FILE_ENV)
			.filter(|p| !p.is_empty())
			.map(PathBuf::from)
			.unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));
		Self::new(path)
	}
}

impl ConfigSource for TomlSource {
	fn name(&self) -> &'static str {
		"toml-config"
	}

	fn precedence(&self) -> Precedence {
		Precedence::ConfigFile
	}

	fn load(&self) -> Result<PgwarmConfigLayer, ConfigError> {
		if !self.path.exists() {
			debug!(path = %self.path.display(), "config file not found, skipping");
			return Ok(PgwarmConfigLayer::default());
		}

		debug!(path = %self.path.display(), "loading config file");
		let content = std::fs::read_to_string(&self.path).map_err(|e| ConfigError::FileRead {
			path: self.path.clone(),
			source: e,
		})?;

		let layer: PgwarmConfigLayer =
			toml::from_str(&content).map_err(|e| ConfigError::TomlParse {
				path: self.path.clone(),
				source: e,
			})?;

		trace!("parsed config layer from TOML");
		Ok(layer)
	}
}

type EnvLookup = Box<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// Environment variable source.
///
/// Convention: PGWARM_<SECTION>_<FIELD>
pub struct EnvSource {
	lookup: EnvLookup,
}

impl EnvSource {
	pub fn new() -> Self {
		Self::with_lookup(|name| std::env::var(name).ok())
	}

	/// Reads variables through `lookup` instead of the process environment.
	pub fn with_lookup(lookup: impl Fn(&str) -> Option<String> + Send + Sync + 'static) -> Self {
		Self {
			lookup: Box::new(lookup),
		}
	}

	fn var(&self, name: &str) -> Option<String> {
		(self.lookup)(name).filter(|s| !s.is_empty())
	}

	fn bool(&self, name: &str) -> Option<bool> {
		self
			.var(name)
			.map(|v| v.eq_ignore_ascii_case("true") || v == "1")
	}

	fn u16(&self, name: &str) -> Result<Option<u16>, ConfigError> {
		match self.var(name) {
			Some(v) => v.parse().map(Some).map_err(|_| ConfigError::InvalidValue {
				key: name.to_string(),
				message: format!("invalid u16 value '{v}'"),
			}),
			None => Ok(None),
		}
	}

	fn u64(&self, name: &str) -> Result<Option<u64>, ConfigError> {
		match self.var(name) {
			Some(v) => v.parse().map(Some).map_err(|_| ConfigError::InvalidValue {
				key: name.to_string(),
				message: format!("invalid u64 value '{v}'"),
			}),
			None => Ok(None),
		}
	}

	fn load_engine(&self) -> Result<EngineConfigLayer, ConfigError> {
		let connect_properties = match self.var("PGWARM_ENGINE_CONNECT_PROPERTIES") {
			Some(raw) => Some(parse_property_list(&raw).map_err(|message| {
				ConfigError::InvalidValue {
					key: "PGWARM_ENGINE_CONNECT_PROPERTIES".to_string(),
					message,
				}
			})?),
			None => None,
		};

		Ok(EngineConfigLayer {
			host: self.var("PGWARM_ENGINE_HOST"),
			port: self.u16("PGWARM_ENGINE_PORT")?,
			superuser: self.var("PGWARM_ENGINE_USER"),
			password: self.var("PGWARM_ENGINE_PASSWORD"),
			admin_database: self.var("PGWARM_ENGINE_ADMIN_DATABASE"),
			startup_timeout_secs: self.u64("PGWARM_ENGINE_STARTUP_TIMEOUT_SECS")?,
			connect_properties,
		})
	}

	fn load_binaries(&self) -> BinariesConfigLayer {
		BinariesConfigLayer {
			search_paths: self
				.var("PGWARM_BINARIES_PATH")
				.map(|raw| std::env::split_paths(&raw).collect()),
		}
	}

	fn load_logging(&self) -> LoggingConfigLayer {
		LoggingConfigLayer {
			filter: self.var("PGWARM_LOG"),
			json: self.bool("PGWARM_LOG_JSON"),
		}
	}
}

impl Default for EnvSource {
	fn default() -> Self {
		Self::new()
	}
}

impl ConfigSource for EnvSource {
	fn name(&self) -> &'static str {
		"environment"
	}

	fn precedence(&self) -> Precedence {
		Precedence::Environment
	}

	fn load(&self) -> Result<PgwarmConfigLayer, ConfigError> {
		debug!("loading environment variables");
		Ok(PgwarmConfigLayer {
			engine: Some(self.load_engine()?),
			binaries: Some(self.load_binaries()),
			logging: Some(self.load_logging()),
		})
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::collections::HashMap;
	use std::io::Write;

	fn env_from(pairs: &[(&str, &str)]) -> EnvSource {
		let vars: HashMap<String, String> = pairs
			.iter()
			.map(|(k, v)| (k.to_string(), v.to_string()))
			.collect();
		EnvSource::with_lookup(move |name| vars.get(name).cloned())
	}

	#[test]
	fn test_precedence_ordering() {
		assert!(Precedence::Defaults < Precedence::ConfigFile);
		assert!(Precedence::ConfigFile < Precedence::Environment);
	}

	#[test]
	fn test_env_source_reads_engine_section() {
		let source = env_from(&[
			("PGWARM_ENGINE_HOST", "db.test"),
			("PGWARM_ENGINE_PORT", "6543"),
			("PGWARM_ENGINE_USER", "tester"),
			("PGWARM_ENGINE_CONNECT_PROPERTIES", "connect_timeout=20,sslmode=disable"),
			("PGWARM_LOG_JSON", "1"),
		]);

		let layer = source.load().unwrap();
		let engine = layer.engine.unwrap();
		assert_eq!(engine.host.as_deref(), Some("db.test"));
		assert_eq!(engine.port, Some(6543));
		assert_eq!(engine.superuser.as_deref(), Some("tester"));
		let props = engine.connect_properties.unwrap();
		assert_eq!(props.get("connect_timeout"), Some("20"));
		assert_eq!(layer.logging.unwrap().json, Some(true));
	}

	#[test]
	fn test_env_source_rejects_bad_port() {
		let source = env_from(&[("PGWARM_ENGINE_PORT", "not-a-port")]);
		match source.load() {
			Err(ConfigError::InvalidValue { key, .. }) => assert_eq!(key, "PGWARM_ENGINE_PORT"),
			other => panic!("expected InvalidValue, got {other:?}"),
		}
	}

	#[test]
	fn test_env_source_ignores_empty_values() {
		let source = env_from(&[("PGWARM_ENGINE_HOST", "")]);
		let engine = source.load().unwrap().engine.unwrap();
		assert!(engine.host.is_none());
	}

	#[test]
	fn test_toml_source_missing_file_is_skipped() {
		let dir = tempfile::tempdir().unwrap();
		let source = TomlSource::new(dir.path().join("absent.toml"));
		let layer = source.load().unwrap();
		assert!(layer.engine.is_none());
	}

	#[test]
	fn test_toml_source_parses_sections() {
		let mut file = tempfile::NamedTempFile::new().unwrap();
		writeln!(
			file,
			r#"
[engine]
port = 15432

[engine.connect_properties]
connect_timeout = "20"

[binaries]
search_paths = ["/opt/pg"]
"#
		)
		.unwrap();

		let layer = TomlSource::new(file.path()).load().unwrap();
		let engine = layer.engine.unwrap();
		assert_eq!(engine.port, Some(15432));
		assert_eq!(
			engine.connect_properties.unwrap().get("connect_timeout"),
			Some("20")
		);
		assert_eq!(
			layer.binaries.unwrap().search_paths,
			Some(vec![PathBuf::from("/opt/pg")])
		);
	}

	#[test]
	fn test_toml_source_reports_parse_errors() {
		let mut file = tempfile::NamedTempFile::new().unwrap();
		writeln!(file, "[engine\nport = ").unwrap();
		assert!(matches!(
			TomlSource::new(file.path()).load(),
			Err(ConfigError::TomlParse { .. })
		));
	}
}
