// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Locates the platform-specific database engine binary artifact.
//!
//! Engine launchers call [`BinaryLocator::resolve`] with the host system and
//! machine hardware names. Resolution prefers a distribution-specific
//! artifact, then a generic one for the system and architecture, and finally
//! an x86_64 artifact on ARM hosts of platforms that can emulate it.

pub mod arch;
pub mod catalog;
pub mod distribution;
pub mod error;
pub mod locator;

pub use arch::normalize_architecture;
pub use catalog::{ArtifactCatalog, DirectoryCatalog};
pub use distribution::{DistributionDetector, FixedDistribution, OsReleaseDetector};
pub use error::ResolutionError;
pub use locator::{artifact_name, host_machine, host_system, Artifact, BinaryLocator};
