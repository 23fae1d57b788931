// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::fs::File;
use std::path::{Path, PathBuf};

use tracing::{debug, error, info, warn};

use crate::arch::normalize_architecture;
use crate::catalog::ArtifactCatalog;
use crate::distribution::DistributionDetector;
use crate::error::ResolutionError;

const FALLBACK_ARCHITECTURE: &str = "x86_64";

/// A resolved binary artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
	path: PathBuf,
}

impl Artifact {
	pub fn path(&self) -> &Path {
		&self.path
	}

	pub fn file_name(&self) -> &str {
		self.path
			.file_name()
			.and_then(|n| n.to_str())
			.unwrap_or_default()
	}

	pub fn open(&self) -> std::io::Result<File> {
		File::open(&self.path)
	}
}

/// Picks the engine binary artifact for a system/architecture pair.
///
/// Lookup order:
/// 1. `postgres-<system>-<arch>-<distribution>.txz` when a distribution is known
/// 2. `postgres-<system>-<arch>.txz`
/// 3. `postgres-<system>-x86_64.txz` for ARM hosts on Darwin and Windows,
///    which run it under emulation
pub struct BinaryLocator<C, D> {
	catalog: C,
	detector: D,
}

impl<C: ArtifactCatalog, D: DistributionDetector> BinaryLocator<C, D> {
	pub fn new(catalog: C, detector: D) -> Self {
		Self { catalog, detector }
	}

	pub fn resolve(&self, system: &str, machine_hardware: &str) -> Result<Artifact, ResolutionError> {
		let architecture = normalize_architecture(machine_hardware)?;
		let distribution = self.detector.distribution();

		info!(
			distribution = distribution.as_deref().unwrap_or("Unknown"),
			"detected distribution"
		);

		if let Some(distribution) = &distribution {
			let name = artifact_name(&[system, &architecture, distribution]);
			match self.find_unique(&name)? {
				Some(artifact) => {
					info!(artifact = artifact.file_name(), "distribution specific engine binaries found");
					return Ok(artifact);
				}
				None => debug!(name = %name, "distribution specific engine binaries not found"),
			}
		}

		let name = artifact_name(&[system, &architecture]);
		if let Some(artifact) = self.find_unique(&name)? {
			info!(artifact = artifact.file_name(), "system specific engine binaries found");
			return Ok(artifact);
		}

		if runs_x86_64_under_emulation(system, &architecture) {
			let name = artifact_name(&[system, FALLBACK_ARCHITECTURE]);
			if let Some(artifact) = self.find_unique(&name)? {
				warn!(
					artifact = artifact.file_name(),
					"no native ARM engine binaries found, using x86_64 binaries instead; \
					 emulation must be enabled and performance may be degraded"
				);
				return Ok(artifact);
			}
		}

		error!(
			system = %system,
			architecture = %architecture,
			"no engine binaries found for this platform"
		);
		Err(ResolutionError::NotFound {
			system: system.to_string(),
			architecture,
		})
	}

	fn find_unique(&self, name: &str) -> Result<Option<Artifact>, ResolutionError> {
		let mut found = self.catalog.find(name)?;
		match found.len() {
			0 => Ok(None),
			1 => Ok(found.pop().map(|path| Artifact { path })),
			_ => {
				error!(name = %name, candidates = ?found, "multiple engine binaries of the same architecture");
				Err(ResolutionError::Ambiguous {
					name: name.to_string(),
					candidates: found,
				})
			}
		}
	}
}

/// The host's system name in the spelling artifact names use.
pub fn host_system() -> &'static str {
	match std::env::consts::OS {
		"linux" => "Linux",
		"macos" => "Darwin",
		"windows" => "Windows",
		"freebsd" => "FreeBSD",
		other => other,
	}
}

/// The host's machine hardware name.
pub fn host_machine() -> &'static str {
	std::env::consts::ARCH
}

fn runs_x86_64_under_emulation(system: &str, architecture: &str) -> bool {
	architecture == "arm_64" && (system == "Darwin" || system == "Windows")
}

/// `postgres-<parts joined by '-'>.txz`, lowercased with spaces replaced by `_`.
pub fn artifact_name(parts: &[&str]) -> String {
	let mut name = String::from("postgres");
	for part in parts {
		name.push('-');
		name.push_str(part);
	}
	name.push_str(".txz");
	name.replace(' ', "_").to_lowercase()
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::distribution::FixedDistribution;
	use std::collections::HashMap;

	#[derive(Default)]
	struct MapCatalog(HashMap<String, Vec<PathBuf>>);

	impl MapCatalog {
		fn with(mut self, name: &str, count: usize) -> Self {
			let paths = (0..count)
				.map(|i| PathBuf::from(format!("/res{i}/{name}")))
				.collect();
			self.0.insert(name.to_string(), paths);
			self
		}
	}

	impl ArtifactCatalog for MapCatalog {
		fn find(&self, name: &str) -> Result<Vec<PathBuf>, ResolutionError> {
			Ok(self.0.get(name).cloned().unwrap_or_default())
		}
	}

	fn no_distribution() -> FixedDistribution {
		FixedDistribution(None)
	}

	#[test]
	fn test_artifact_name_normalization() {
		assert_eq!(
			artifact_name(&["Linux", "x86_64", "Alpine Linux"]),
			"postgres-linux-x86_64-alpine_linux.txz"
		);
		assert_eq!(artifact_name(&["Darwin", "arm_64"]), "postgres-darwin-arm_64.txz");
	}

	#[test]
	fn test_prefers_distribution_specific() {
		let catalog = MapCatalog::default()
			.with("postgres-linux-x86_64-alpine_linux.txz", 1)
			.with("postgres-linux-x86_64.txz", 1);
		let locator = BinaryLocator::new(catalog, FixedDistribution(Some("Alpine Linux".into())));

		let artifact = locator.resolve("Linux", "amd64").unwrap();
		assert_eq!(artifact.file_name(), "postgres-linux-x86_64-alpine_linux.txz");
	}

	#[test]
	fn test_falls_back_to_system_artifact() {
		let catalog = MapCatalog::default().with("postgres-linux-x86_64.txz", 1);
		let locator = BinaryLocator::new(catalog, FixedDistribution(Some("Ubuntu".into())));

		let artifact = locator.resolve("Linux", "x86_64").unwrap();
		assert_eq!(artifact.file_name(), "postgres-linux-x86_64.txz");
	}

	#[test]
	fn test_darwin_arm_uses_x86_64() {
		let catalog = MapCatalog::default().with("postgres-darwin-x86_64.txz", 1);
		let locator = BinaryLocator::new(catalog, no_distribution());

		let artifact = locator.resolve("Darwin", "aarch64").unwrap();
		assert_eq!(artifact.file_name(), "postgres-darwin-x86_64.txz");
	}

	#[test]
	fn test_windows_arm_uses_x86_64() {
		let catalog = MapCatalog::default().with("postgres-windows-x86_64.txz", 1);
		let locator = BinaryLocator::new(catalog, no_distribution());
		assert!(locator.resolve("Windows", "arm64").is_ok());
	}

	#[test]
	fn test_linux_arm_has_no_emulation_fallback() {
		let catalog = MapCatalog::default().with("postgres-linux-x86_64.txz", 1);
		let locator = BinaryLocator::new(catalog, no_distribution());
		match locator.resolve("Linux", "aarch64") {
			Err(ResolutionError::NotFound { system, architecture }) => {
				assert_eq!(system, "Linux");
				assert_eq!(architecture, "arm_64");
			}
			other => panic!("expected NotFound, got {other:?}"),
		}
	}

	#[test]
	fn test_native_arm_preferred_over_emulation() {
		let catalog = MapCatalog::default()
			.with("postgres-darwin-arm_64.txz", 1)
			.with("postgres-darwin-x86_64.txz", 1);
		let locator = BinaryLocator::new(catalog, no_distribution());
		let artifact = locator.resolve("Darwin", "aarch64").unwrap();
		assert_eq!(artifact.file_name(), "postgres-darwin-arm_64.txz");
	}

	#[test]
	fn test_duplicates_are_ambiguous() {
		let catalog = MapCatalog::default().with("postgres-linux-x86_64.txz", 2);
		let locator = BinaryLocator::new(catalog, no_distribution());
		match locator.resolve("Linux", "x86_64") {
			Err(ResolutionError::Ambiguous { name, candidates }) => {
				assert_eq!(name, "postgres-linux-x86_64.txz");
				assert_eq!(candidates.len(), 2);
			}
			other => panic!("expected Ambiguous, got {other:?}"),
		}
	}

	#[test]
	fn test_host_system_is_known_spelling() {
		let system = host_system();
		assert!(!system.is_empty());
		assert!(!host_machine().is_empty());
	}
}
