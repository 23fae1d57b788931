// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Connection details for a provisioned database.

use std::fmt::Write;
use std::str::FromStr;

use pgwarm_config::ConnectProperties;
use sqlx::postgres::PgConnectOptions;

use crate::error::{ProviderError, Result};

pub const DESCRIPTOR_SCHEME: &str = "postgresql";

/// Descriptor query keys the driver applies itself.
const DRIVER_PARAMETERS: &[&str] = &[
	"sslmode",
	"sslrootcert",
	"sslcert",
	"sslkey",
	"application_name",
	"options",
	"statement-cache-capacity",
];

/// Where a freshly cloned database lives and how to reach it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionInfo {
	db_name: String,
	host: String,
	port: u16,
	user: String,
	properties: ConnectProperties,
}

impl ConnectionInfo {
	pub fn new(
		db_name: impl Into<String>,
		host: impl Into<String>,
		port: u16,
		user: impl Into<String>,
		properties: ConnectProperties,
	) -> Self {
		Self {
			db_name: db_name.into(),
			host: host.into(),
			port,
			user: user.into(),
			properties,
		}
	}

	pub fn db_name(&self) -> &str {
		&self.db_name
	}

	pub fn host(&self) -> &str {
		&self.host
	}

	pub fn port(&self) -> u16 {
		self.port
	}

	pub fn user(&self) -> &str {
		&self.user
	}

	pub fn properties(&self) -> &ConnectProperties {
		&self.properties
	}

	/// `postgresql://<host>:<port>/<db>?user=<user>[&<k>=<v>]...`
	///
	/// Extra properties follow `user` in insertion order.
	pub fn url(&self) -> String {
		self.descriptor(self.properties.iter())
	}

	/// Driver connect options for this database.
	///
	/// Properties the driver understands are applied as connection
	/// parameters. Every other property is sent to the server as a run-time
	/// parameter (`-c key=value`).
	pub fn connect_options(&self) -> Result<PgConnectOptions> {
		let (driver, server): (Vec<_>, Vec<_>) = self
			.properties
			.iter()
			.partition(|(key, _)| DRIVER_PARAMETERS.contains(key));

		let options = PgConnectOptions::from_str(&self.descriptor(driver)).map_err(|source| {
			ProviderError::InvalidDescriptor {
				descriptor: self.url(),
				source,
			}
		})?;
		Ok(if server.is_empty() {
			options
		} else {
			options.options(server)
		})
	}

	fn descriptor<'a>(&self, properties: impl IntoIterator<Item = (&'a str, &'a str)>) -> String {
		let mut url = format!(
			"{DESCRIPTOR_SCHEME}://{}:{}/{}?user={}",
			self.host, self.port, self.db_name, self.user
		);
		for (key, value) in properties {
			let _ = write!(url, "&{key}={value}");
		}
		url
	}
}
