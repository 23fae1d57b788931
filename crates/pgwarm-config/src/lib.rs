// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Configuration for pre-warmed test database clusters.
//!
//! This crate provides:
//! - Layered configuration from multiple sources (defaults, TOML file, environment)
//! - [`EngineConfig`], the value that provider customizers mutate and that
//!   takes part in cluster identity
//! - Consistent environment variable naming (`PGWARM_*`)
//!
//! # Usage
//!
//! ```ignore
//! use pgwarm_config::load_config;
//!
//! let config = load_config()?;
//! println!("engine at {}:{}", config.engine.host, config.engine.port);
//! ```

pub mod error;
pub mod layer;
pub mod properties;
pub mod sections;
pub mod sources;

pub use error::ConfigError;
pub use layer::PgwarmConfigLayer;
pub use properties::{parse_property_list, ConnectProperties};
pub use sections::*;
pub use sources::{ConfigSource, DefaultsSource, EnvSource, Precedence, TomlSource};

use tracing::{debug, info};

/// Fully resolved configuration.
#[derive(Debug, Clone, Default)]
pub struct PgwarmConfig {
	pub engine: EngineConfig,
	pub binaries: BinariesConfig,
	pub logging: LoggingConfig,
}

/// Load configuration from all sources with standard precedence.
///
/// Precedence (highest to lowest):
/// 1. Environment variables (`PGWARM_*`)
/// 2. Config file (`$PGWARM_CONFIG_FILE` or `./pgwarm.toml`)
/// 3. Built-in defaults
pub fn load_config() -> Result<PgwarmConfig, ConfigError> {
	load_from_sources(vec![
		Box::new(DefaultsSource),
		Box::new(TomlSource::discover()),
		Box::new(EnvSource::new()),
	])
}

/// Load configuration from environment only.
pub fn load_config_from_env() -> Result<PgwarmConfig, ConfigError> {
	load_from_sources(vec![Box::new(EnvSource::new())])
}

/// Load configuration with a custom config file path.
pub fn load_config_with_file(
	config_path: impl Into<std::path::PathBuf>,
) -> Result<PgwarmConfig, ConfigError> {
	load_from_sources(vec![
		Box::new(DefaultsSource),
		Box::new(TomlSource::new(config_path)),
		Box::new(EnvSource::new()),
	])
}

/// Merge the given sources in precedence order and resolve the result.
pub fn load_from_sources(
	mut sources: Vec<Box<dyn ConfigSource>>,
) -> Result<PgwarmConfig, ConfigError> {
	sources.sort_by_key(|s| s.precedence());

	let mut merged = PgwarmConfigLayer::default();
	for source in sources {
		debug!(source = source.name(), "loading configuration source");
		let layer = source.load()?;
		merged.merge(layer);
	}

	finalize(merged)
}

fn finalize(layer: PgwarmConfigLayer) -> Result<PgwarmConfig, ConfigError> {
	let engine = layer.engine.unwrap_or_default().finalize();
	let binaries = layer.binaries.unwrap_or_default().finalize();
	let logging = layer.logging.unwrap_or_default().finalize();

	engine.validate()?;

	info!(
		host = %engine.host,
		port = engine.port,
		superuser = %engine.superuser,
		connect_properties = engine.connect_properties.len(),
		binary_search_paths = binaries.search_paths.len(),
		"pgwarm configuration loaded"
	);

	Ok(PgwarmConfig {
		engine,
		binaries,
		logging,
	})
}
