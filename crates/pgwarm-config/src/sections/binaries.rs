// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Engine binary artifact configuration.

use std::path::PathBuf;

use serde::Deserialize;

/// Directories searched for engine binary artifacts.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BinariesConfig {
	pub search_paths: Vec<PathBuf>,
}

/// Binaries configuration layer (partial, for merging).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BinariesConfigLayer {
	#[serde(default)]
	pub search_paths: Option<Vec<PathBuf>>,
}

impl BinariesConfigLayer {
	pub fn merge(&mut self, other: BinariesConfigLayer) {
		if other.search_paths.is_some() {
			self.search_paths = other.search_paths;
		}
	}

	pub fn finalize(self) -> BinariesConfig {
		BinariesConfig {
			search_paths: self.search_paths.unwrap_or_default(),
		}
	}
}
