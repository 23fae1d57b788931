// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use pgwarm_config::{ConfigError, EngineConfig};

use crate::preparer::PreparerKey;

/// The cache key for a cluster: a schema preparer plus the engine
/// configuration after all customizers ran.
///
/// Equal identities share one cluster; any difference in either half yields
/// a separate cluster.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConfigurationIdentity {
	preparer: PreparerKey,
	config: EngineConfig,
}

impl ConfigurationIdentity {
	pub fn new(preparer: PreparerKey, config: EngineConfig) -> Result<Self, ConfigError> {
		config.validate()?;
		Ok(Self { preparer, config })
	}

	pub fn preparer(&self) -> &PreparerKey {
		&self.preparer
	}

	pub fn config(&self) -> &EngineConfig {
		&self.config
	}
}
