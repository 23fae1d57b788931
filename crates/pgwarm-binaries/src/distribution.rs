// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Linux distribution detection.

use std::path::PathBuf;

use tracing::{error, warn};

const OS_RELEASE: &str = "/etc/os-release";

/// Reports the host distribution name used for distribution-specific artifacts.
pub trait DistributionDetector: Send + Sync {
	fn distribution(&self) -> Option<String>;
}

/// Reads `NAME=` from an os-release file.
#[derive(Debug, Clone)]
pub struct OsReleaseDetector {
	path: Option<PathBuf>,
}

impl OsReleaseDetector {
	/// Detector for the running host; yields nothing outside Linux.
	pub fn host() -> Self {
		let path = (std::env::consts::OS == "linux").then(|| PathBuf::from(OS_RELEASE));
		Self { path }
	}

	pub fn from_file(path: impl Into<PathBuf>) -> Self {
		Self {
			path: Some(path.into()),
		}
	}
}

impl DistributionDetector for OsReleaseDetector {
	fn distribution(&self) -> Option<String> {
		let path = self.path.as_ref()?;
		let content = match std::fs::read_to_string(path) {
			Ok(content) => content,
			Err(e) => {
				error!(path = %path.display(), error = %e, "unable to detect the Linux distribution");
				return None;
			}
		};

		let name = content
			.lines()
			.find_map(|line| line.strip_prefix("NAME="))
			.map(|value| value.trim().trim_matches('"').trim().to_string())
			.filter(|value| !value.is_empty());

		match name {
			Some(name) => Some(canonical_distribution(&name)),
			None => {
				warn!(path = %path.display(), "unable to detect the Linux distribution, no NAME entry");
				None
			}
		}
	}
}

/// A detector that always reports the same answer.
#[derive(Debug, Clone, Default)]
pub struct FixedDistribution(pub Option<String>);

impl DistributionDetector for FixedDistribution {
	fn distribution(&self) -> Option<String> {
		self.0.clone()
	}
}

fn canonical_distribution(name: &str) -> String {
	if name.starts_with("Debian") {
		return "Debian".to_string();
	}
	if name == "openSUSE project" {
		return "openSUSE".to_string();
	}
	name.to_string()
}
