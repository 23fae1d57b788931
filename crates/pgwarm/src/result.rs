// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use crate::connection::ConnectionInfo;
use crate::error::ProvisioningFailure;

/// Outcome of one clone attempt, handed from the worker to a consumer.
#[derive(Debug)]
pub enum ProvisionResult {
	Success(ConnectionInfo),
	Failure(ProvisioningFailure),
}

impl ProvisionResult {
	pub fn is_success(&self) -> bool {
		matches!(self, ProvisionResult::Success(_))
	}

	pub fn connection_info(&self) -> Option<&ConnectionInfo> {
		match self {
			ProvisionResult::Success(info) => Some(info),
			ProvisionResult::Failure(_) => None,
		}
	}

	pub fn into_result(self) -> Result<ConnectionInfo, ProvisioningFailure> {
		match self {
			ProvisionResult::Success(info) => Ok(info),
			ProvisionResult::Failure(failure) => Err(failure),
		}
	}
}
