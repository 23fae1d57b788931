// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Artifact catalogs: where binary artifacts can be found.

use std::path::PathBuf;

use pgwarm_config::BinariesConfig;
use tracing::trace;

use crate::error::ResolutionError;

/// A source of binary artifacts addressed by file name.
pub trait ArtifactCatalog: Send + Sync {
	/// Every location holding an artifact with exactly this name.
	fn find(&self, name: &str) -> Result<Vec<PathBuf>, ResolutionError>;
}

/// Looks for artifacts directly inside a list of directories.
#[derive(Debug, Clone, Default)]
pub struct DirectoryCatalog {
	roots: Vec<PathBuf>,
}

impl DirectoryCatalog {
	pub fn new(roots: impl IntoIterator<Item = impl Into<PathBuf>>) -> Self {
		Self {
			roots: roots.into_iter().map(Into::into).collect(),
		}
	}

	pub fn from_config(config: &BinariesConfig) -> Self {
		Self::new(config.search_paths.iter().cloned())
	}

	pub fn roots(&self) -> &[PathBuf] {
		&self.roots
	}
}

impl ArtifactCatalog for DirectoryCatalog {
	fn find(&self, name: &str) -> Result<Vec<PathBuf>, ResolutionError> {
		let mut found = Vec::new();
		for root in &self.roots {
			let candidate = root.join(name);
			trace!(location = %candidate.display(), "searching for engine binaries");
			match std::fs::metadata(&candidate) {
				Ok(meta) if meta.is_file() => found.push(candidate),
				Ok(_) => {}
				Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
				Err(e) => {
					return Err(ResolutionError::Io {
						path: candidate,
						source: e,
					})
				}
			}
		}
		Ok(found)
	}
}
