// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Configuration sections.

mod binaries;
mod engine;
mod logging;

pub use binaries::{BinariesConfig, BinariesConfigLayer};
pub use engine::{validate_identifier, EngineConfig, EngineConfigLayer};
pub use logging::{LoggingConfig, LoggingConfigLayer};
