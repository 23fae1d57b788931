// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Binary resolution error types.

use std::path::PathBuf;

/// Errors that can occur while resolving an engine binary artifact.
#[derive(Debug, thiserror::Error)]
pub enum ResolutionError {
	/// The hardware architecture string was blank
	#[error("No architecture detected")]
	UnknownArchitecture,

	/// No artifact matches the host platform
	#[error("Missing engine binaries for system '{system}', architecture '{architecture}'")]
	NotFound {
		system: String,
		architecture: String,
	},

	/// More than one artifact matches the same normalized name
	#[error("Duplicate engine binaries named '{name}': {candidates:?}")]
	Ambiguous {
		name: String,
		candidates: Vec<PathBuf>,
	},

	/// A search location could not be read
	#[error("Failed to inspect {path}: {source}")]
	Io {
		path: PathBuf,
		#[source]
		source: std::io::Error,
	},
}
