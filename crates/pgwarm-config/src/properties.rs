// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Insertion-ordered connection properties.

use std::fmt;

use serde::de::{MapAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Extra connection parameters appended to every connection descriptor.
///
/// Iteration follows insertion order. Setting a key that is already present
/// replaces its value without moving it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct ConnectProperties {
	entries: Vec<(String, String)>,
}

impl ConnectProperties {
	pub fn new() -> Self {
		Self::default()
	}

	/// Sets `key` to `value`, returning the previous value if there was one.
	pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) -> Option<String> {
		let key = key.into();
		let value = value.into();
		match self.entries.iter_mut().find(|(k, _)| *k == key) {
			Some((_, existing)) => Some(std::mem::replace(existing, value)),
			None => {
				self.entries.push((key, value));
				None
			}
		}
	}

	pub fn get(&self, key: &str) -> Option<&str> {
		self
			.entries
			.iter()
			.find(|(k, _)| k == key)
			.map(|(_, v)| v.as_str())
	}

	pub fn remove(&mut self, key: &str) -> Option<String> {
		let index = self.entries.iter().position(|(k, _)| k == key)?;
		Some(self.entries.remove(index).1)
	}

	pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
		self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
	}

	pub fn len(&self) -> usize {
		self.entries.len()
	}

	pub fn is_empty(&self) -> bool {
		self.entries.is_empty()
	}

	/// Overlays `other` on top of `self`; keys already present keep their slot.
	pub fn extend_from(&mut self, other: &ConnectProperties) {
		for (key, value) in other.iter() {
			self.insert(key, value);
		}
	}
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for ConnectProperties {
	fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
		let mut properties = ConnectProperties::new();
		for (key, value) in iter {
			properties.insert(key, value);
		}
		properties
	}
}

impl Serialize for ConnectProperties {
	fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
		serializer.collect_map(self.iter())
	}
}

impl<'de> Deserialize<'de> for ConnectProperties {
	fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
		struct PropertiesVisitor;

		impl<'de> Visitor<'de> for PropertiesVisitor {
			type Value = ConnectProperties;

			fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
				f.write_str("a table of string connection properties")
			}

			fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
				let mut properties = ConnectProperties::new();
				while let Some((key, value)) = map.next_entry::<String, String>()? {
					properties.insert(key, value);
				}
				Ok(properties)
			}
		}

		deserializer.deserialize_map(PropertiesVisitor)
	}
}

/// Parses `key=value` pairs separated by commas, e.g. `connect_timeout=20,sslmode=disable`.
pub fn parse_property_list(input: &str) -> Result<ConnectProperties, String> {
	let mut properties = ConnectProperties::new();
	for pair in input.split(',').map(str::trim).filter(|p| !p.is_empty()) {
		let (key, value) = pair
			.split_once('=')
			.ok_or_else(|| format!("expected key=value, got '{pair}'"))?;
		properties.insert(key.trim(), value.trim());
	}
	Ok(properties)
}
