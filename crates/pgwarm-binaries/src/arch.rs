// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Hardware architecture normalization.

use crate::error::ResolutionError;

/// Maps a machine hardware name (`uname -m`, `std::env::consts::ARCH`) to the
/// canonical token used in artifact names. Unrecognized names pass through.
pub fn normalize_architecture(machine_hardware: &str) -> Result<String, ResolutionError> {
	if machine_hardware.trim().is_empty() {
		return Err(ResolutionError::UnknownArchitecture);
	}

	let arch: String = machine_hardware
		.to_ascii_lowercase()
		.chars()
		.filter(|c| c.is_ascii_alphanumeric())
		.collect();

	let canonical = match arch.as_str() {
		"x8664" | "amd64" | "ia32e" | "em64t" | "x64" => "x86_64",
		"x8632" | "x86" | "i386" | "i486" | "i586" | "i686" | "ia32" | "x32" => "x86_32",
		"ia64" | "ia64w" | "itanium64" => "itanium_64",
		"ia64n" => "itanium_32",
		"sparcv9" | "sparc64" => "sparc_64",
		"sparc" | "sparc32" => "sparc_32",
		"mips" | "mips32" => "mips_32",
		"mipsel" | "mips32el" => "mipsel_32",
		"mips64" => "mips_64",
		"mips64el" => "mipsel_64",
		"ppc" | "ppc32" => "ppc_32",
		"ppcle" | "ppc32le" => "ppcle_32",
		"ppc64" => "ppc_64",
		"ppc64le" => "ppcle_64",
		"s390" => "s390_32",
		"s390x" => "s390_64",
		a if a.starts_with("aarch64") || a.starts_with("armv8") || a.starts_with("arm64") => {
			"arm_64"
		}
		a if a.starts_with("arm") => "arm_32",
		_ => return Ok(machine_hardware.to_string()),
	};

	Ok(canonical.to_string())
}
