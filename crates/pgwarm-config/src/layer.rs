// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Partial configuration as produced by a single source.

use serde::Deserialize;

use crate::sections::{BinariesConfigLayer, EngineConfigLayer, LoggingConfigLayer};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PgwarmConfigLayer {
	#[serde(default)]
	pub engine: Option<EngineConfigLayer>,
	#[serde(default)]
	pub binaries: Option<BinariesConfigLayer>,
	#[serde(default)]
	pub logging: Option<LoggingConfigLayer>,
}

impl PgwarmConfigLayer {
	/// Merges `other` on top of `self`; set fields in `other` win.
	pub fn merge(&mut self, other: PgwarmConfigLayer) {
		merge_section(&mut self.engine, other.engine, EngineConfigLayer::merge);
		merge_section(&mut self.binaries, other.binaries, BinariesConfigLayer::merge);
		merge_section(&mut self.logging, other.logging, LoggingConfigLayer::merge);
	}
}

fn merge_section<T>(base: &mut Option<T>, other: Option<T>, merge: fn(&mut T, T)) {
	match (base.as_mut(), other) {
		(Some(existing), Some(other)) => merge(existing, other),
		(None, Some(other)) => *base = Some(other),
		(_, None) => {}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_merge_keeps_unset_sections() {
		let mut base = PgwarmConfigLayer {
			engine: Some(EngineConfigLayer {
				host: Some("a".to_string()),
				..Default::default()
			}),
			..Default::default()
		};
		base.merge(PgwarmConfigLayer {
			engine: Some(EngineConfigLayer {
				port: Some(1),
				..Default::default()
			}),
			logging: Some(LoggingConfigLayer {
				json: Some(true),
				..Default::default()
			}),
			..Default::default()
		});

		let engine = base.engine.unwrap();
		assert_eq!(engine.host.as_deref(), Some("a"));
		assert_eq!(engine.port, Some(1));
		assert_eq!(base.logging.unwrap().json, Some(true));
		assert!(base.binaries.is_none());
	}
}
